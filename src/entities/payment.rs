use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::terminal_state_violation;

/// Payment record, 1:1 with an order. Records the chosen method and status;
/// there is no gateway round-trip behind it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub payment_date: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub transaction_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    /// FAILED is terminal: reject any write that would resurrect a failed
    /// payment.
    async fn before_save<C>(self, db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if insert {
            return Ok(self);
        }

        let new_status = match &self.status {
            ActiveValue::Set(status) => *status,
            _ => return Ok(self),
        };

        let id = match &self.id {
            ActiveValue::Set(id) | ActiveValue::Unchanged(id) => *id,
            ActiveValue::NotSet => return Ok(self),
        };

        if let Some(current) = Entity::find_by_id(id).one(db).await? {
            if current.status == PaymentStatus::Failed && new_status != PaymentStatus::Failed {
                return Err(terminal_state_violation(
                    "payment",
                    id,
                    current.status,
                    new_status,
                ));
            }
        }

        Ok(self)
    }
}

/// Payment method enumeration. `FromStr` also accepts the short codes the
/// storefront's checkout form posts ("COD", "GCASH", ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "Cash on Delivery")]
    #[strum(to_string = "Cash on Delivery", serialize = "COD")]
    CashOnDelivery,
    #[sea_orm(string_value = "PayPal")]
    #[strum(to_string = "PayPal", serialize = "PAYPAL")]
    PayPal,
    #[sea_orm(string_value = "GCash")]
    #[strum(to_string = "GCash", serialize = "GCASH")]
    GCash,
    #[sea_orm(string_value = "PayMaya")]
    #[strum(to_string = "PayMaya", serialize = "PAYMAYA")]
    PayMaya,
}

impl PaymentMethod {
    /// Only cash on delivery stays pending until the courier collects;
    /// every other method is recorded as completed immediately.
    pub fn initial_status(self) -> PaymentStatus {
        match self {
            PaymentMethod::CashOnDelivery => PaymentStatus::Pending,
            _ => PaymentStatus::Completed,
        }
    }
}

/// Payment status enumeration
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    #[strum(serialize = "PENDING")]
    Pending,
    #[sea_orm(string_value = "COMPLETED")]
    #[strum(serialize = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    #[strum(serialize = "FAILED")]
    Failed,
}
