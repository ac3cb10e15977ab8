use sea_orm::error::DbErr;
use serde::Serialize;

/// Marker prefix used by entity `before_save` guards when a write attempts
/// to move a row out of a terminal status. `From<DbErr>` below picks it up
/// so the violation surfaces typed instead of as a generic database error.
pub(crate) const TERMINAL_GUARD_PREFIX: &str = "terminal state violation: ";

pub(crate) fn terminal_state_violation(
    entity: &str,
    id: uuid::Uuid,
    current: impl std::fmt::Display,
    attempted: impl std::fmt::Display,
) -> DbErr {
    DbErr::Custom(format!(
        "{TERMINAL_GUARD_PREFIX}{entity} {id} is {current}, refusing status change to {attempted}"
    ))
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[source]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::Custom(msg) if msg.starts_with(TERMINAL_GUARD_PREFIX) => {
                ServiceError::ConcurrencyConflict(msg[TERMINAL_GUARD_PREFIX.len()..].to_string())
            }
            other => ServiceError::DatabaseError(other),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// True for the error kinds the presentation layer is expected to
    /// recover into user-visible messages; transitions and conflicts must
    /// abort the enclosing request instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::NotFound(_) | ServiceError::ValidationError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn terminal_guard_db_err_maps_to_concurrency_conflict() {
        let id = Uuid::new_v4();
        let err: ServiceError = terminal_state_violation("order", id, "CANCELED", "SHIPPED").into();
        match err {
            ServiceError::ConcurrencyConflict(msg) => {
                assert!(msg.contains(&id.to_string()));
                assert!(msg.contains("CANCELED"));
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
    }

    #[test]
    fn plain_db_err_stays_database_error() {
        let err: ServiceError = DbErr::Custom("connection reset".into()).into();
        assert!(matches!(err, ServiceError::DatabaseError(_)));
    }

    #[test]
    fn recoverable_classification() {
        assert!(ServiceError::NotFound("cart".into()).is_recoverable());
        assert!(ServiceError::ValidationError("qty".into()).is_recoverable());
        assert!(!ServiceError::InvalidTransition("no".into()).is_recoverable());
        assert!(!ServiceError::ConcurrencyConflict("stale".into()).is_recoverable());
    }
}
