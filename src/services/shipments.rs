use crate::{
    entities::{order, shipment, Order, OrderStatus, Shipment, ShipmentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders,
};
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng, RngCore};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Length of the generated tracking code.
const TRACKING_NUMBER_LEN: usize = 8;

/// Delivery is scheduled this many days after order creation, inclusive.
const MIN_DELIVERY_OFFSET_DAYS: i64 = 3;
const MAX_DELIVERY_OFFSET_DAYS: i64 = 7;

/// A shipment is considered handed to the courier this many days before its
/// scheduled delivery date.
const TRANSIT_WINDOW_DAYS: i64 = 3;

/// Service for managing shipments. There is no carrier integration: delivery
/// dates are scheduled from an injected random source and status is derived
/// from wall-clock time, which callers pass in explicitly.
#[derive(Clone)]
pub struct ShipmentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ShipmentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates the shipment record for a freshly placed order: a uniformly
    /// random delivery date 3 to 7 days after order creation and a random
    /// 8-character alphanumeric tracking code. Runs on the caller's
    /// connection so checkout can include it in its transaction. The order
    /// is left PENDING; only the date-driven refresh advances it.
    pub async fn schedule_delivery<C, R>(
        &self,
        conn: &C,
        order: &order::Model,
        rng: &mut R,
    ) -> Result<shipment::Model, ServiceError>
    where
        C: ConnectionTrait,
        R: RngCore + ?Sized,
    {
        let offset_days = rng.gen_range(MIN_DELIVERY_OFFSET_DAYS..=MAX_DELIVERY_OFFSET_DAYS);
        let shipping_date = order.created_at + Duration::days(offset_days);
        let tracking_number = generate_tracking_number(rng);

        let shipment = shipment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            method: Set("Standard".to_string()),
            status: Set(ShipmentStatus::NotShipped),
            tracking_number: Set(tracking_number),
            shipping_date: Set(shipping_date),
        };
        let shipment = shipment.insert(conn).await?;

        info!(
            "Scheduled delivery for order {}: {} ({})",
            order.id, shipment.shipping_date, shipment.tracking_number
        );
        Ok(shipment)
    }

    /// Re-derives the shipment status (and the owning order's status) from
    /// the scheduled delivery date and the supplied wall-clock time, and
    /// persists both in one transaction.
    ///
    /// Terminal orders are left untouched: cancellation takes precedence,
    /// and a delivered order is never moved backwards. Invoked on every
    /// order-status read, so results are never cached.
    #[instrument(skip(self))]
    pub async fn refresh_status(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let shipment = Shipment::find()
            .filter(shipment::Column::OrderId.eq(order_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Shipment for order {} not found", order_id))
            })?;

        if order.status.is_terminal() {
            txn.commit().await?;
            return Ok(RefreshOutcome { shipment, order });
        }

        let (new_shipment_status, new_order_status) =
            derive_status(shipment.shipping_date, now);

        let old_order_status = order.status;
        let newly_delivered = new_order_status == OrderStatus::Delivered;

        let shipment = if shipment.status != new_shipment_status {
            let mut active: shipment::ActiveModel = shipment.into();
            active.status = Set(new_shipment_status);
            active.update(&txn).await?
        } else {
            shipment
        };

        let order = if order.status != new_order_status {
            let mut active: order::ActiveModel = order.into();
            active.status = Set(new_order_status);
            active.update(&txn).await?
        } else {
            order
        };

        if newly_delivered {
            orders::archive_items(&txn, &order, orders::ArchiveKind::Delivered).await?;
        }

        txn.commit().await?;

        if old_order_status != new_order_status {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: old_order_status.to_string(),
                    new_status: new_order_status.to_string(),
                })
                .await;
            if newly_delivered {
                self.event_sender.send_or_log(Event::OrderDelivered(order_id)).await;
            }
        }

        Ok(RefreshOutcome { shipment, order })
    }

    /// Gets the shipment attached to an order, if one exists.
    #[instrument(skip(self))]
    pub async fn get_shipment_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<shipment::Model>, ServiceError> {
        let shipment = Shipment::find()
            .filter(shipment::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?;
        Ok(shipment)
    }

    /// Finds a shipment by tracking number.
    #[instrument(skip(self))]
    pub async fn find_by_tracking_number(
        &self,
        tracking_number: &str,
    ) -> Result<Option<shipment::Model>, ServiceError> {
        let shipment = Shipment::find()
            .filter(shipment::Column::TrackingNumber.eq(tracking_number))
            .one(&*self.db)
            .await?;
        Ok(shipment)
    }
}

/// One-way transition to "Canceled", shared by the order cancellation
/// cascade. A shipment already canceled is left as-is.
pub(crate) async fn mark_canceled<C>(
    conn: &C,
    shipment: shipment::Model,
) -> Result<shipment::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if shipment.status == ShipmentStatus::Canceled {
        return Ok(shipment);
    }

    let mut active: shipment::ActiveModel = shipment.into();
    active.status = Set(ShipmentStatus::Canceled);
    Ok(active.update(conn).await?)
}

/// Marks the shipment delivered alongside an explicit order delivery.
pub(crate) async fn mark_delivered<C>(
    conn: &C,
    shipment: shipment::Model,
) -> Result<shipment::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if shipment.status == ShipmentStatus::Delivered {
        return Ok(shipment);
    }

    let mut active: shipment::ActiveModel = shipment.into();
    active.status = Set(ShipmentStatus::Delivered);
    Ok(active.update(conn).await?)
}

/// Pure derivation of (shipment status, order status) from the scheduled
/// delivery date and the current time. Calendar-day comparisons: the
/// delivery day itself counts as delivered, and the transit window opens
/// three days before it.
pub fn derive_status(
    shipping_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> (ShipmentStatus, OrderStatus) {
    let today = now.date_naive();
    let delivery_day = shipping_date.date_naive();
    let transit_day = (shipping_date - Duration::days(TRANSIT_WINDOW_DAYS)).date_naive();

    if today >= delivery_day {
        (ShipmentStatus::Delivered, OrderStatus::Delivered)
    } else if today >= transit_day {
        (ShipmentStatus::Shipped, OrderStatus::Shipped)
    } else {
        (ShipmentStatus::NotShipped, OrderStatus::Pending)
    }
}

fn generate_tracking_number<R: RngCore + ?Sized>(rng: &mut R) -> String {
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .take(TRACKING_NUMBER_LEN)
        .map(char::from)
        .collect()
}

/// Result of a status refresh
#[derive(Debug, Serialize)]
pub struct RefreshOutcome {
    pub shipment: shipment::Model,
    pub order: order::Model,
}
