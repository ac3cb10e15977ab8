//! End-to-end tests for the order lifecycle: checkout, the
//! PENDING → SHIPPED → DELIVERED / CANCELED machine, the cancellation
//! cascade, and archival into the delivered/canceled history tables.

mod common;

use chrono::Duration;
use assert_matches::assert_matches;
use common::TestApp;
use rand::{rngs::StdRng, SeedableRng};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use storefront_core::{
    entities::{
        canceled_item, delivered_item, order, CanceledItem, DeliveredItem, OrderStatus,
        PaymentMethod, PaymentStatus, ShipmentStatus,
    },
    errors::ServiceError,
    services::carts::AddItemInput,
    services::orders::{CheckoutScope, PlaceOrderInput},
};
use uuid::Uuid;

async fn add_to_cart(app: &TestApp, customer_id: Uuid, product_id: Uuid, quantity: i32) {
    app.services
        .carts
        .add_item(AddItemInput {
            customer_id,
            product_id,
            variant_id: None,
            quantity,
        })
        .await
        .unwrap();
}

async fn place(
    app: &TestApp,
    customer_id: Uuid,
    method: PaymentMethod,
    seed: u64,
) -> order::Model {
    let mut rng = StdRng::seed_from_u64(seed);
    app.services
        .orders
        .place_order(
            PlaceOrderInput {
                customer_id,
                scope: CheckoutScope::FullCart,
                shipping_address: "12 Mabini St, Davao (Landmark: beside the bakery)".to_string(),
                payment_method: method,
            },
            &mut rng,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn cod_checkout_snapshots_the_cart() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("cod@test.com").await;
    let product_a = app.seed_product("Product A", dec!(10.00)).await;
    let product_b = app.seed_product("Product B", dec!(5.00)).await;

    add_to_cart(&app, customer.id, product_a.id, 2).await;
    add_to_cart(&app, customer.id, product_b.id, 1).await;

    let order = place(&app, customer.id, PaymentMethod::CashOnDelivery, 11).await;

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_price, dec!(25.00));
    assert_eq!(
        order.shipping_address,
        "12 Mabini St, Davao (Landmark: beside the bakery)"
    );

    // Cash on delivery stays pending until the courier collects.
    let payment = app
        .services
        .payments
        .get_payment_for_order(order.id)
        .await
        .unwrap()
        .expect("payment created at checkout");
    assert_eq!(payment.method, PaymentMethod::CashOnDelivery);
    assert_eq!(payment.status, PaymentStatus::Pending);

    // Delivery scheduled 3 to 7 days out with an 8-char tracking code.
    let shipment = app
        .services
        .shipments
        .get_shipment_for_order(order.id)
        .await
        .unwrap()
        .expect("shipment created at checkout");
    assert_eq!(shipment.status, ShipmentStatus::NotShipped);
    assert_eq!(shipment.tracking_number.len(), 8);
    let offset = shipment.shipping_date - order.created_at;
    assert!(offset >= Duration::days(3) && offset <= Duration::days(7));

    // The consumed lines are gone.
    let view = app.services.carts.get_cart(customer.id).await.unwrap();
    assert!(view.is_empty());

    let with_items = app
        .services
        .orders
        .get_order_with_items(order.id)
        .await
        .unwrap();
    assert_eq!(with_items.items.len(), 2);
}

#[tokio::test]
async fn non_cash_payment_is_recorded_completed() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("gcash@test.com").await;
    let product = app.seed_product("Fountain Pen", dec!(45.00)).await;

    add_to_cart(&app, customer.id, product.id, 1).await;
    let order = place(&app, customer.id, PaymentMethod::GCash, 12).await;

    let payment = app
        .services
        .payments
        .get_payment_for_order(order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn order_items_keep_their_price_snapshot() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("snapshot@test.com").await;
    let seeded = app.seed_product("Wool Scarf", dec!(30.00)).await;

    add_to_cart(&app, customer.id, seeded.id, 2).await;
    let order = place(&app, customer.id, PaymentMethod::PayPal, 13).await;
    assert_eq!(order.total_price, dec!(60.00));

    // Reprice after checkout; the historical order must not move.
    let mut active: storefront_core::entities::product::ActiveModel = seeded.into();
    active.price = Set(dec!(99.00));
    active.update(&*app.db).await.unwrap();

    let with_items = app
        .services
        .orders
        .get_order_with_items(order.id)
        .await
        .unwrap();
    assert_eq!(with_items.order.total_price, dec!(60.00));
    assert_eq!(with_items.items[0].price, dec!(30.00));
}

#[tokio::test]
async fn single_line_checkout_leaves_the_rest_of_the_cart() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("buy-now@test.com").await;
    let keep = app.seed_product("Kept Item", dec!(5.00)).await;
    let buy = app.seed_product("Bought Item", dec!(9.00)).await;

    add_to_cart(&app, customer.id, keep.id, 1).await;
    add_to_cart(&app, customer.id, buy.id, 2).await;

    let view = app.services.carts.get_cart(customer.id).await.unwrap();
    let buy_line = view
        .lines
        .iter()
        .find(|line| line.product.id == buy.id)
        .unwrap();

    let mut rng = StdRng::seed_from_u64(14);
    let order = app
        .services
        .orders
        .place_order(
            PlaceOrderInput {
                customer_id: customer.id,
                scope: CheckoutScope::Line(buy_line.item.id),
                shipping_address: "12 Mabini St, Davao".to_string(),
                payment_method: PaymentMethod::CashOnDelivery,
            },
            &mut rng,
        )
        .await
        .unwrap();

    assert_eq!(order.total_price, dec!(18.00));

    let view = app.services.carts.get_cart(customer.id).await.unwrap();
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.lines[0].product.id, keep.id);
}

#[tokio::test]
async fn checkout_of_an_empty_cart_fails() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("empty-cart@test.com").await;
    let product = app.seed_product("Postcard", dec!(1.00)).await;

    // Create the cart, then drain it so checkout finds zero lines.
    add_to_cart(&app, customer.id, product.id, 1).await;
    let view = app.services.carts.get_cart(customer.id).await.unwrap();
    app.services
        .carts
        .remove_item(view.lines[0].item.id)
        .await
        .unwrap();

    let mut rng = StdRng::seed_from_u64(15);
    let err = app
        .services
        .orders
        .place_order(
            PlaceOrderInput {
                customer_id: customer.id,
                scope: CheckoutScope::FullCart,
                shipping_address: "12 Mabini St, Davao".to_string(),
                payment_method: PaymentMethod::CashOnDelivery,
            },
            &mut rng,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn cancel_cascades_and_archives_exactly_once() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("cancel@test.com").await;
    let product_a = app.seed_product("Product A", dec!(10.00)).await;
    let product_b = app.seed_product("Product B", dec!(5.00)).await;

    add_to_cart(&app, customer.id, product_a.id, 2).await;
    add_to_cart(&app, customer.id, product_b.id, 1).await;
    let order = place(&app, customer.id, PaymentMethod::CashOnDelivery, 16).await;

    let canceled = app.services.orders.cancel_order(order.id).await.unwrap();
    assert!(canceled);

    let order = app.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Canceled);

    let payment = app
        .services
        .payments
        .get_payment_for_order(order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);

    let shipment = app
        .services
        .shipments
        .get_shipment_for_order(order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Canceled);

    let archived = CanceledItem::find()
        .filter(canceled_item::Column::OrderId.eq(order.id))
        .count(&*app.db)
        .await
        .unwrap();
    assert_eq!(archived, 2, "one archival row per order item");

    // Second cancel is an idempotent no-op and never duplicates history.
    let canceled_again = app.services.orders.cancel_order(order.id).await.unwrap();
    assert!(!canceled_again);

    let archived = CanceledItem::find()
        .filter(canceled_item::Column::OrderId.eq(order.id))
        .count(&*app.db)
        .await
        .unwrap();
    assert_eq!(archived, 2);
}

#[tokio::test]
async fn a_shipped_order_cannot_be_canceled() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("cancel-shipped@test.com").await;
    let product = app.seed_product("Umbrella", dec!(12.00)).await;

    add_to_cart(&app, customer.id, product.id, 1).await;
    let order = place(&app, customer.id, PaymentMethod::CashOnDelivery, 17).await;

    // Push the order into the transit window so it reads SHIPPED.
    let shipment = app
        .services
        .shipments
        .get_shipment_for_order(order.id)
        .await
        .unwrap()
        .unwrap();
    let outcome = app
        .services
        .shipments
        .refresh_status(order.id, shipment.shipping_date - Duration::days(3))
        .await
        .unwrap();
    assert_eq!(outcome.order.status, OrderStatus::Shipped);

    let err = app.services.orders.cancel_order(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition(_));

    let order = app.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);
}

#[tokio::test]
async fn mark_delivered_archives_exactly_once() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("deliver@test.com").await;
    let product_a = app.seed_product("Product A", dec!(10.00)).await;
    let product_b = app.seed_product("Product B", dec!(5.00)).await;

    add_to_cart(&app, customer.id, product_a.id, 1).await;
    add_to_cart(&app, customer.id, product_b.id, 1).await;
    let order = place(&app, customer.id, PaymentMethod::CashOnDelivery, 18).await;

    let delivered = app.services.orders.mark_delivered(order.id).await.unwrap();
    assert!(delivered);

    let order = app.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);

    let shipment = app
        .services
        .shipments
        .get_shipment_for_order(order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Delivered);

    let archived = DeliveredItem::find()
        .filter(delivered_item::Column::OrderId.eq(order.id))
        .count(&*app.db)
        .await
        .unwrap();
    assert_eq!(archived, 2);

    // Repeat delivery is a no-op: no duplicate archival rows.
    let delivered_again = app.services.orders.mark_delivered(order.id).await.unwrap();
    assert!(!delivered_again);

    let archived = DeliveredItem::find()
        .filter(delivered_item::Column::OrderId.eq(order.id))
        .count(&*app.db)
        .await
        .unwrap();
    assert_eq!(archived, 2);
}

#[tokio::test]
async fn a_canceled_order_cannot_be_delivered() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("deliver-canceled@test.com").await;
    let product = app.seed_product("Raincoat", dec!(40.00)).await;

    add_to_cart(&app, customer.id, product.id, 1).await;
    let order = place(&app, customer.id, PaymentMethod::CashOnDelivery, 19).await;

    assert!(app.services.orders.cancel_order(order.id).await.unwrap());

    let err = app
        .services
        .orders
        .mark_delivered(order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition(_));

    let archived = DeliveredItem::find()
        .filter(delivered_item::Column::OrderId.eq(order.id))
        .count(&*app.db)
        .await
        .unwrap();
    assert_eq!(archived, 0);
}

#[tokio::test]
async fn terminal_status_is_enforced_at_the_persistence_boundary() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("terminal@test.com").await;
    let product = app.seed_product("Gloves", dec!(15.00)).await;

    add_to_cart(&app, customer.id, product.id, 1).await;
    let order = place(&app, customer.id, PaymentMethod::CashOnDelivery, 20).await;
    assert!(app.services.orders.cancel_order(order.id).await.unwrap());

    // A raw entity write bypassing the services must still be rejected.
    let order = app.services.orders.get_order(order.id).await.unwrap();
    let mut active: order::ActiveModel = order.into();
    active.status = Set(OrderStatus::Pending);
    let err: ServiceError = active.update(&*app.db).await.unwrap_err().into();
    assert_matches!(err, ServiceError::ConcurrencyConflict(_));

    let order_ids: Vec<Uuid> = app
        .services
        .orders
        .list_orders_with_status(customer.id, OrderStatus::Canceled)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(order_ids.len(), 1);
}

#[tokio::test]
async fn customer_order_listings() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("listing@test.com").await;
    let product = app.seed_product("Candle", dec!(4.00)).await;

    add_to_cart(&app, customer.id, product.id, 1).await;
    let first = place(&app, customer.id, PaymentMethod::CashOnDelivery, 21).await;

    add_to_cart(&app, customer.id, product.id, 2).await;
    let second = place(&app, customer.id, PaymentMethod::GCash, 22).await;

    let all = app
        .services
        .orders
        .list_orders_for_customer(customer.id)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    app.services.orders.cancel_order(second.id).await.unwrap();
    let canceled = app
        .services
        .orders
        .list_orders_with_status(customer.id, OrderStatus::Canceled)
        .await
        .unwrap();
    assert_eq!(canceled.len(), 1);
    assert_eq!(canceled[0].id, second.id);

    let pending = app
        .services
        .orders
        .list_orders_with_status(customer.id, OrderStatus::Pending)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, first.id);
}
