use crate::{
    entities::{cart, cart_item, Cart, CartItem, Customer, Product, ProductVariant},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Shopping cart service.
///
/// A customer owns at most one cart, created lazily on the first add. Lines
/// are unique per (cart, product, variant); re-adding a product increments
/// the existing line. Totals are always computed from the current catalog
/// price at read time and never stored.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Adds a product to the customer's cart, creating the cart on first
    /// use. If the (product, variant) line already exists its quantity is
    /// incremented by `input.quantity`; otherwise a new line is created.
    ///
    /// Deliberately performs no stock check; checkout does not either.
    #[instrument(skip(self))]
    pub async fn add_item(&self, input: AddItemInput) -> Result<cart_item::Model, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        Customer::find_by_id(input.customer_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", input.customer_id))
            })?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if let Some(variant_id) = input.variant_id {
            let variant = ProductVariant::find_by_id(variant_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Variant {} not found", variant_id))
                })?;
            if variant.product_id != product.id {
                return Err(ServiceError::ValidationError(format!(
                    "Variant {} does not belong to product {}",
                    variant_id, product.id
                )));
            }
        }

        let cart = self.get_or_create_cart(&txn, input.customer_id).await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .filter(match input.variant_id {
                Some(variant_id) => cart_item::Column::VariantId.eq(variant_id),
                None => cart_item::Column::VariantId.is_null(),
            })
            .one(&txn)
            .await?;

        let line = if let Some(item) = existing {
            let quantity = item.quantity + input.quantity;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.update(&txn).await?
        } else {
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                variant_id: Set(input.variant_id),
                quantity: Set(input.quantity),
            };
            item.insert(&txn).await?
        };

        let mut cart: cart::ActiveModel = cart.into();
        cart.updated_at = Set(Utc::now());
        cart.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: line.cart_id,
                product_id: line.product_id,
            })
            .await;

        info!(
            "Added product {} x{} to cart {}",
            line.product_id, input.quantity, line.cart_id
        );
        Ok(line)
    }

    /// Removes a cart line unconditionally.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, cart_item_id: Uuid) -> Result<(), ServiceError> {
        let item = CartItem::find_by_id(cart_item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Cart item {} not found", cart_item_id))
            })?;

        let cart_id = item.cart_id;
        item.delete(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id,
                item_id: cart_item_id,
            })
            .await;

        info!("Removed cart item {} from cart {}", cart_item_id, cart_id);
        Ok(())
    }

    /// Returns the customer's cart lines and live total. A customer without
    /// a cart gets an empty view, not an error.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, customer_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?;

        let Some(cart) = cart else {
            return Ok(CartView::empty());
        };

        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let mut lines = Vec::with_capacity(rows.len());
        for (item, product) in rows {
            let product = product.ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Product {} referenced by cart item {} not found",
                    item.product_id, item.id
                ))
            })?;
            let line_total = product.price * Decimal::from(item.quantity);
            lines.push(CartLine {
                item,
                product,
                line_total,
            });
        }

        let total = lines.iter().map(|line| line.line_total).sum();

        Ok(CartView {
            cart: Some(cart),
            lines,
            total,
        })
    }

    /// Deletes every line in the cart. The cart row itself stays.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Cart::find_by_id(cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;

        let mut cart: cart::ActiveModel = cart.into();
        cart.updated_at = Set(Utc::now());
        cart.update(&txn).await?;

        txn.commit().await?;

        self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;

        info!("Cleared cart: {}", cart_id);
        Ok(())
    }

    async fn get_or_create_cart(
        &self,
        conn: &impl sea_orm::ConnectionTrait,
        customer_id: Uuid,
    ) -> Result<cart::Model, ServiceError> {
        let existing = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?;

        if let Some(cart) = existing {
            return Ok(cart);
        }

        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let cart = cart.insert(conn).await?;

        self.event_sender.send_or_log(Event::CartCreated(cart.id)).await;

        Ok(cart)
    }
}

/// Input for adding an item to a cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

/// One cart line joined with its product, priced at read time
#[derive(Debug, Serialize)]
pub struct CartLine {
    pub item: cart_item::Model,
    pub product: crate::entities::product::Model,
    pub line_total: Decimal,
}

/// Cart contents and live total
#[derive(Debug, Serialize)]
pub struct CartView {
    pub cart: Option<cart::Model>,
    pub lines: Vec<CartLine>,
    pub total: Decimal,
}

impl CartView {
    fn empty() -> Self {
        Self {
            cart: None,
            lines: Vec::new(),
            total: Decimal::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_view_has_zero_total() {
        let view = CartView::empty();
        assert!(view.is_empty());
        assert!(view.cart.is_none());
        assert_eq!(view.total, Decimal::ZERO);
    }

    #[test]
    fn line_total_is_quantity_times_price() {
        let price = dec!(12.50);
        let line_total = price * Decimal::from(3);
        assert_eq!(line_total, dec!(37.50));
    }
}
