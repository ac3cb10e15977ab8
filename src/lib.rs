//! Storefront order/cart/fulfillment core
//!
//! This crate implements the commerce lifecycle of a single-warehouse
//! storefront: catalog reads, per-customer carts, checkout into orders with
//! payment and shipment sub-records, date-driven shipment status, and
//! archival of delivered/canceled line items. It is a library consumed by a
//! presentation layer through the services in [`services`]; there is no HTTP
//! surface here.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// The full set of storefront services wired over one connection pool and
/// one event channel. Embedding applications usually build this once at
/// startup and hand clones to their request handlers.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: services::CatalogService,
    pub customers: services::CustomerService,
    pub carts: services::CartService,
    pub orders: services::OrderService,
    pub payments: services::PaymentService,
    pub shipments: Arc<services::ShipmentService>,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<events::EventSender>) -> Self {
        let shipments = Arc::new(services::ShipmentService::new(
            db.clone(),
            event_sender.clone(),
        ));
        Self {
            catalog: services::CatalogService::new(db.clone()),
            customers: services::CustomerService::new(db.clone()),
            carts: services::CartService::new(db.clone(), event_sender.clone()),
            orders: services::OrderService::new(db.clone(), event_sender.clone(), shipments.clone()),
            payments: services::PaymentService::new(db, event_sender),
            shipments,
        }
    }
}

pub mod prelude {
    pub use crate::config::{load_config, AppConfig};
    pub use crate::db::{establish_connection, run_migrations, DbPool};
    pub use crate::entities::{OrderStatus, PaymentMethod, PaymentStatus, ShipmentStatus};
    pub use crate::errors::ServiceError;
    pub use crate::events::{Event, EventSender};
    pub use crate::services::*;
    pub use crate::AppServices;
}
