use crate::{
    entities::{
        canceled_item, cart, cart_item, delivered_item, order, order_item, payment, shipment,
        CanceledItem, Cart, CartItem, DeliveredItem, Order, OrderItem, OrderStatus, Payment,
        PaymentMethod, Product, Shipment,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{payments, shipments, ShipmentService},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use rand::RngCore;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Which cart lines a checkout consumes: the whole cart, or a single
/// designated line (the "buy now" flow).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub enum CheckoutScope {
    #[default]
    FullCart,
    Line(Uuid),
}

/// Input for placing an order
#[derive(Debug, Deserialize, Validate)]
pub struct PlaceOrderInput {
    pub customer_id: Uuid,
    #[serde(default)]
    pub scope: CheckoutScope,
    /// Free-text address snapshot stored on the order as-is.
    #[validate(length(min = 1, message = "Shipping address must not be empty"))]
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
}

/// An order together with its line items
#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Order lifecycle service.
///
/// Owns the PENDING → SHIPPED → DELIVERED / CANCELED machine: checkout,
/// cancellation cascade, delivery marking, and archival of line items into
/// the delivered/canceled history tables. All multi-record writes happen in
/// a single transaction; terminal statuses are additionally guarded at the
/// persistence boundary by the entity hooks.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    shipment_service: Arc<ShipmentService>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        shipment_service: Arc<ShipmentService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            shipment_service,
        }
    }

    /// Converts cart lines into a placed order.
    ///
    /// One transaction covers the order, its items (with price snapshots),
    /// the payment record, the scheduled shipment, and the deletion of the
    /// consumed cart lines; any failure rolls the whole placement back.
    /// The cart and its lines are locked exclusively so two concurrent
    /// checkouts cannot drain the same cart twice.
    ///
    /// `rng` drives delivery-date and tracking-code generation; tests pass
    /// a seeded generator.
    #[instrument(skip(self, rng), fields(customer_id = %input.customer_id))]
    pub async fn place_order<R>(
        &self,
        input: PlaceOrderInput,
        rng: &mut R,
    ) -> Result<order::Model, ServiceError>
    where
        R: RngCore + ?Sized,
    {
        input.validate()?;

        let txn = self.db.begin().await?;

        let cart = Cart::find()
            .filter(cart::Column::CustomerId.eq(input.customer_id))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Cart for customer {} not found",
                    input.customer_id
                ))
            })?;

        let lines = match input.scope {
            CheckoutScope::FullCart => {
                CartItem::find()
                    .filter(cart_item::Column::CartId.eq(cart.id))
                    .lock_exclusive()
                    .all(&txn)
                    .await?
            }
            CheckoutScope::Line(item_id) => {
                let item = CartItem::find_by_id(item_id)
                    .lock_exclusive()
                    .one(&txn)
                    .await?
                    .filter(|item| item.cart_id == cart.id)
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "Cart item {} not found in customer's cart",
                            item_id
                        ))
                    })?;
                vec![item]
            }
        };

        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        // Resolve products and compute the total from current catalog prices.
        let mut priced_lines = Vec::with_capacity(lines.len());
        let mut total = Decimal::ZERO;
        for line in &lines {
            let product = Product::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;
            total += product.price * Decimal::from(line.quantity);
            priced_lines.push((line, product));
        }

        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(input.customer_id),
            status: Set(OrderStatus::Pending),
            total_price: Set(total),
            shipping_address: Set(input.shipping_address.clone()),
            created_at: Set(now),
        };
        let order = order.insert(&txn).await?;

        for (line, product) in &priced_lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(product.id),
                quantity: Set(line.quantity),
                price: Set(product.price),
            };
            item.insert(&txn).await?;
        }

        let payment = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            method: Set(input.payment_method),
            status: Set(input.payment_method.initial_status()),
            payment_date: Set(now),
            transaction_id: Set(None),
        };
        let payment = payment.insert(&txn).await?;

        let shipment = self
            .shipment_service
            .schedule_delivery(&txn, &order, rng)
            .await?;

        let consumed: Vec<Uuid> = lines.iter().map(|line| line.id).collect();
        CartItem::delete_many()
            .filter(cart_item::Column::Id.is_in(consumed))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderPlaced(order.id)).await;
        self.event_sender
            .send_or_log(Event::PaymentRecorded(payment.id))
            .await;
        self.event_sender
            .send_or_log(Event::ShipmentScheduled {
                order_id: order.id,
                tracking_number: shipment.tracking_number.clone(),
            })
            .await;

        info!(
            "Placed order {} for customer {}: {} line(s), total {}",
            order.id,
            input.customer_id,
            priced_lines.len(),
            order.total_price
        );
        Ok(order)
    }

    /// Cancels a PENDING order and cascades to its payment (FAILED) and
    /// shipment ("Canceled"), archiving every line into canceled_items.
    ///
    /// Returns Ok(false) when the order is already canceled (idempotent
    /// no-op). Canceling a SHIPPED or DELIVERED order is an
    /// `InvalidTransition` error.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status == OrderStatus::Canceled {
            return Ok(false);
        }
        if !order.status.can_transition_to(OrderStatus::Canceled) {
            return Err(ServiceError::InvalidTransition(format!(
                "Order {} cannot be canceled from status {}",
                order_id, order.status
            )));
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Canceled);
        let order = active.update(&txn).await?;

        let payment = Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .one(&txn)
            .await?;
        let payment = match payment {
            Some(p) => Some(payments::mark_failed(&txn, p).await?),
            None => None,
        };

        let shipment = Shipment::find()
            .filter(shipment::Column::OrderId.eq(order_id))
            .one(&txn)
            .await?;
        let shipment = match shipment {
            Some(s) => Some(shipments::mark_canceled(&txn, s).await?),
            None => None,
        };

        archive_items(&txn, &order, ArchiveKind::Canceled).await?;

        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderCancelled(order_id)).await;
        if let Some(payment) = payment {
            self.event_sender
                .send_or_log(Event::PaymentFailed(payment.id))
                .await;
        }
        if let Some(shipment) = shipment {
            self.event_sender
                .send_or_log(Event::ShipmentCancelled(shipment.id))
                .await;
        }

        info!("Canceled order {}", order_id);
        Ok(true)
    }

    /// Marks an order delivered, archiving its lines into delivered_items
    /// exactly once.
    ///
    /// Returns Ok(false) when already delivered (idempotent no-op). A
    /// canceled order cannot be delivered.
    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status == OrderStatus::Delivered {
            return Ok(false);
        }
        if !order.status.can_transition_to(OrderStatus::Delivered) {
            return Err(ServiceError::InvalidTransition(format!(
                "Order {} cannot be delivered from status {}",
                order_id, order.status
            )));
        }

        let old_status = order.status;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Delivered);
        let order = active.update(&txn).await?;

        let shipment = Shipment::find()
            .filter(shipment::Column::OrderId.eq(order_id))
            .one(&txn)
            .await?;
        if let Some(s) = shipment {
            shipments::mark_delivered(&txn, s).await?;
        }

        archive_items(&txn, &order, ArchiveKind::Delivered).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: OrderStatus::Delivered.to_string(),
            })
            .await;
        self.event_sender.send_or_log(Event::OrderDelivered(order_id)).await;

        info!("Marked order {} delivered", order_id);
        Ok(true)
    }

    /// Retrieves an order by ID.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Retrieves an order together with its line items.
    #[instrument(skip(self))]
    pub async fn get_order_with_items(
        &self,
        order_id: Uuid,
    ) -> Result<OrderWithItems, ServiceError> {
        let order = self.get_order(order_id).await?;
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(OrderWithItems { order, items })
    }

    /// Lists a customer's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(orders)
    }

    /// Lists a customer's orders in the given status, newest first. Backs
    /// the delivered-items and canceled-items history views.
    #[instrument(skip(self))]
    pub async fn list_orders_with_status(
        &self,
        customer_id: Uuid,
        status: OrderStatus,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .filter(order::Column::Status.eq(status))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(orders)
    }
}

/// Which archival table a terminal transition writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArchiveKind {
    Delivered,
    Canceled,
}

/// Snapshots every order item into the delivered/canceled history table.
/// Exactly-once: if the order already has rows in the target table the call
/// is a no-op, so repeated terminal transitions never duplicate history.
pub(crate) async fn archive_items<C>(
    conn: &C,
    order: &order::Model,
    kind: ArchiveKind,
) -> Result<u64, ServiceError>
where
    C: ConnectionTrait,
{
    let already = match kind {
        ArchiveKind::Delivered => {
            DeliveredItem::find()
                .filter(delivered_item::Column::OrderId.eq(order.id))
                .count(conn)
                .await?
        }
        ArchiveKind::Canceled => {
            CanceledItem::find()
                .filter(canceled_item::Column::OrderId.eq(order.id))
                .count(conn)
                .await?
        }
    };
    if already > 0 {
        warn!(
            "Order {} already archived ({:?}); skipping",
            order.id, kind
        );
        return Ok(0);
    }

    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .all(conn)
        .await?;

    let mut written = 0;
    for item in items {
        match kind {
            ArchiveKind::Delivered => {
                let row = delivered_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(item.order_id),
                    product_id: Set(item.product_id),
                    quantity: Set(item.quantity),
                    price: Set(item.price),
                };
                row.insert(conn).await?;
            }
            ArchiveKind::Canceled => {
                let row = canceled_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(item.order_id),
                    product_id: Set(item.product_id),
                    quantity: Set(item.quantity),
                    price: Set(item.price),
                };
                row.insert(conn).await?;
            }
        }
        written += 1;
    }

    Ok(written)
}
