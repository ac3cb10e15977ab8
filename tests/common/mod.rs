use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use storefront_core::{
    config::AppConfig,
    db::{self, DbPool},
    entities::{category, customer, product, product_variant},
    events::{self, EventSender},
    AppServices,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test harness: the full service set over a fresh in-memory SQLite
/// database with the schema migrated.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub event_sender: Arc<EventSender>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:", "test");
        cfg.auto_migrate = true;
        // A single connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        let db = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db.clone(), event_sender.clone());

        Self {
            db,
            services,
            event_sender,
            _event_task: event_task,
        }
    }

    pub async fn seed_customer(&self, email: &str) -> customer::Model {
        customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            first_name: Set("Test".to_string()),
            last_name: Set("Customer".to_string()),
            phone: Set(None),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed customer")
    }

    #[allow(dead_code)]
    pub async fn seed_category(&self, name: &str, parent_id: Option<Uuid>) -> category::Model {
        category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            parent_id: Set(parent_id),
        }
        .insert(&*self.db)
        .await
        .expect("seed category")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal) -> product::Model {
        let category = self.seed_category(&format!("{name} category"), None).await;

        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(format!("{name} seeded for tests")),
            price: Set(price),
            stock: Set(25),
            is_active: Set(true),
            on_trend: Set(false),
            category_id: Set(category.id),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    #[allow(dead_code)]
    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        label: &str,
        stock: i32,
    ) -> product_variant::Model {
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            label: Set(label.to_string()),
            stock: Set(stock),
        }
        .insert(&*self.db)
        .await
        .expect("seed variant")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
