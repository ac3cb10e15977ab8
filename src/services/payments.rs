use crate::{
    entities::{payment, Payment, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Payment record service.
///
/// Payment rows are created by checkout inside its transaction; this service
/// covers the read side and the one-way transition to FAILED. There is no
/// gateway behind any of it.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl PaymentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Moves a payment to FAILED. Already-failed payments are a no-op
    /// reported as Ok(false). The entity guard additionally rejects any
    /// later write that would move a FAILED payment elsewhere.
    #[instrument(skip(self))]
    pub async fn cancel_payment(&self, payment_id: Uuid) -> Result<bool, ServiceError> {
        let payment = Payment::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;

        if payment.status == PaymentStatus::Failed {
            return Ok(false);
        }

        let payment = mark_failed(&*self.db, payment).await?;

        self.event_sender
            .send_or_log(Event::PaymentFailed(payment.id))
            .await;

        info!("Canceled payment {} for order {}", payment.id, payment.order_id);
        Ok(true)
    }

    /// Gets the payment attached to an order, if one exists.
    #[instrument(skip(self))]
    pub async fn get_payment_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<payment::Model>, ServiceError> {
        let payment = Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?;
        Ok(payment)
    }
}

/// One-way transition to FAILED, shared by the order cancellation cascade.
/// Runs on the caller's connection so cancellation can keep it in its
/// transaction.
pub(crate) async fn mark_failed<C>(
    conn: &C,
    payment: payment::Model,
) -> Result<payment::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if payment.status == PaymentStatus::Failed {
        return Ok(payment);
    }

    let mut active: payment::ActiveModel = payment.into();
    active.status = Set(PaymentStatus::Failed);
    Ok(active.update(conn).await?)
}
