mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use storefront_core::{
    entities::product,
    errors::ServiceError,
    services::customers::{AddressInput, CreateCustomerInput},
};
use uuid::Uuid;

#[tokio::test]
async fn category_search_is_case_insensitive_and_walks_into_subcategories() {
    let app = TestApp::new().await;
    let shoes = app.seed_category("Shoes", None).await;
    let running = app.seed_category("Running", Some(shoes.id)).await;
    let _unrelated = app.seed_category("Kitchen", None).await;

    let found = app.services.catalog.search_categories("sHoEs").await.unwrap();

    let ids: Vec<Uuid> = found.iter().map(|c| c.id).collect();
    assert!(ids.contains(&shoes.id));
    assert!(ids.contains(&running.id), "subcategories of a match are included");
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn storefront_listings_respect_the_product_flags() {
    let app = TestApp::new().await;
    let category = app.seed_category("Apparel", None).await;

    let mut seeded = Vec::new();
    for (name, is_active, on_trend) in [
        ("Plain Tee", true, false),
        ("Viral Hoodie", true, true),
        ("Retired Jacket", false, true),
    ] {
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(format!("{name} for listing tests")),
            price: Set(dec!(20.00)),
            stock: Set(10),
            is_active: Set(is_active),
            on_trend: Set(on_trend),
            category_id: Set(category.id),
            created_at: Set(Utc::now()),
        }
        .insert(&*app.db)
        .await
        .unwrap();
        seeded.push(model);
    }

    let active = app.services.catalog.list_active_products().await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|p| p.is_active));

    // The retired jacket is trending but inactive, so the shelf skips it.
    let trending = app.services.catalog.list_trending_products().await.unwrap();
    assert_eq!(trending.len(), 1);
    assert_eq!(trending[0].name, "Viral Hoodie");

    let fetched = app.services.catalog.get_product(seeded[0].id).await.unwrap();
    assert_eq!(fetched.name, "Plain Tee");

    let err = app.services.catalog.get_product(Uuid::new_v4()).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn variant_stock_drives_the_in_stock_predicate() {
    let app = TestApp::new().await;
    let product = app.seed_product("Trail Sneaker", dec!(75.00)).await;

    // Plain product: falls back to its own counter (seeded with stock).
    assert!(app.services.catalog.is_in_stock(product.id).await.unwrap());

    // With variants present, only variant stock counts.
    app.seed_variant(product.id, "42", 0).await;
    let sold_out = app.seed_variant(product.id, "43", 0).await;
    assert!(!app.services.catalog.is_in_stock(product.id).await.unwrap());

    let mut active: storefront_core::entities::product_variant::ActiveModel = sold_out.into();
    active.stock = Set(3);
    active.update(&*app.db).await.unwrap();
    assert!(app.services.catalog.is_in_stock(product.id).await.unwrap());

    let variants = app.services.catalog.get_variants(product.id).await.unwrap();
    assert_eq!(variants.len(), 2);
}

#[tokio::test]
async fn duplicate_email_registration_is_rejected() {
    let app = TestApp::new().await;

    let input = |email: &str| CreateCustomerInput {
        email: email.to_string(),
        first_name: "Ana".to_string(),
        last_name: "Reyes".to_string(),
        phone: None,
    };

    app.services
        .customers
        .create_customer(input("ana@test.com"))
        .await
        .unwrap();

    let err = app
        .services
        .customers
        .create_customer(input("ana@test.com"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn address_upsert_feeds_the_checkout_snapshot() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("address@test.com").await;

    // No address on file yet.
    let err = app
        .services
        .customers
        .checkout_snapshot(customer.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    app.services
        .customers
        .upsert_address(
            customer.id,
            AddressInput {
                street: "12 Mabini St".to_string(),
                city: "Davao".to_string(),
                postal_code: Some("8000".to_string()),
                landmark: Some("beside the bakery".to_string()),
            },
        )
        .await
        .unwrap();

    let snapshot = app
        .services
        .customers
        .checkout_snapshot(customer.id)
        .await
        .unwrap();
    assert_eq!(snapshot, "12 Mabini St, Davao (Landmark: beside the bakery)");

    // A second save replaces the address instead of adding a sibling row.
    app.services
        .customers
        .upsert_address(
            customer.id,
            AddressInput {
                street: "7 Rizal Ave".to_string(),
                city: "Cebu".to_string(),
                postal_code: None,
                landmark: None,
            },
        )
        .await
        .unwrap();

    let snapshot = app
        .services
        .customers
        .checkout_snapshot(customer.id)
        .await
        .unwrap();
    assert_eq!(snapshot, "7 Rizal Ave, Cebu");

    let address = app
        .services
        .customers
        .get_address(customer.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(address.city, "Cebu");
}
