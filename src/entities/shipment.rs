use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::terminal_state_violation;

/// Shipment record, 1:1 with an order, created at placement time. The
/// delivery date is scheduled, not fetched from a carrier; see
/// `services::shipments`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shipments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_id: Uuid,
    pub method: String,
    pub status: ShipmentStatus,
    pub tracking_number: String,
    pub shipping_date: DateTime<Utc>,
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
    /// "Canceled" is terminal: a canceled shipment can never be revived by
    /// a later status refresh.
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
            if current.status == ShipmentStatus::Canceled && new_status != ShipmentStatus::Canceled
            {
                return Err(terminal_state_violation(
                    "shipment",
                    id,
                    current.status,
                    new_status,
                ));
            }
        }

        Ok(self)
    }
}

/// Shipment status enumeration
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
pub enum ShipmentStatus {
    #[sea_orm(string_value = "Not Shipped")]
    #[strum(serialize = "Not Shipped")]
    NotShipped,
    #[sea_orm(string_value = "Shipped")]
    #[strum(serialize = "Shipped")]
    Shipped,
    #[sea_orm(string_value = "Delivered")]
    #[strum(serialize = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Canceled")]
    #[strum(serialize = "Canceled")]
    Canceled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!(ShipmentStatus::NotShipped.to_string(), "Not Shipped");
        assert_eq!(
            "Not Shipped".parse::<ShipmentStatus>(),
            Ok(ShipmentStatus::NotShipped)
        );
        assert_eq!(
            "Canceled".parse::<ShipmentStatus>(),
            Ok(ShipmentStatus::Canceled)
        );
        assert!("Returned".parse::<ShipmentStatus>().is_err());
    }
}
