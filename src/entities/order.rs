use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::errors::terminal_state_violation;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub customer_id: Uuid,

    pub status: OrderStatus,

    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub total_price: Decimal,

    /// Free-text snapshot of the delivery address taken at checkout time,
    /// deliberately not a live reference to customer_addresses.
    #[sea_orm(column_type = "Text")]
    #[validate(length(min = 1, message = "Shipping address must not be empty"))]
    pub shipping_address: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_one = "super::payment::Entity")]
    Payment,
    #[sea_orm(has_one = "super::shipment::Entity")]
    Shipment,
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(has_many = "super::delivered_item::Entity")]
    DeliveredItems,
    #[sea_orm(has_many = "super::canceled_item::Entity")]
    CanceledItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl Related<super::shipment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shipment.def()
    }
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    /// Persistence-boundary guard: once an order is CANCELED or DELIVERED no
    /// write may move its status elsewhere, regardless of which service (or
    /// concurrent request) attempts it.
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
            if current.status.is_terminal() && current.status != new_status {
                return Err(terminal_state_violation(
                    "order",
                    id,
                    current.status,
                    new_status,
                ));
            }
        }

        Ok(self)
    }
}

/// Order status enumeration
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
pub enum OrderStatus {
    #[sea_orm(string_value = "PENDING")]
    #[strum(serialize = "PENDING")]
    Pending,
    #[sea_orm(string_value = "SHIPPED")]
    #[strum(serialize = "SHIPPED")]
    Shipped,
    #[sea_orm(string_value = "DELIVERED")]
    #[strum(serialize = "DELIVERED")]
    Delivered,
    #[sea_orm(string_value = "CANCELED")]
    #[strum(serialize = "CANCELED")]
    Canceled,
}

impl OrderStatus {
    /// Terminal statuses admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Canceled | OrderStatus::Delivered)
    }

    /// The lifecycle machine: PENDING → SHIPPED → DELIVERED, with
    /// cancellation only out of PENDING. Same-status writes are no-ops.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        match (self, next) {
            (a, b) if a == b => true,
            (OrderStatus::Pending, OrderStatus::Shipped) => true,
            (OrderStatus::Pending, OrderStatus::Delivered) => true,
            (OrderStatus::Pending, OrderStatus::Canceled) => true,
            (OrderStatus::Shipped, OrderStatus::Delivered) => true,
            _ => false,
        }
    }
}
