use crate::{
    entities::{category, product, product_variant, Category, Product, ProductVariant},
    errors::ServiceError,
};
use sea_orm::{
    sea_query::{Expr, Func},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Read-mostly catalog service: product lookup, storefront listings, and
/// category search over the self-referential category tree.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Retrieves a product by ID.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Lists products available on the storefront.
    #[instrument(skip(self))]
    pub async fn list_active_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        let products = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(products)
    }

    /// Lists active products flagged for the trending shelf.
    #[instrument(skip(self))]
    pub async fn list_trending_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        let products = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::OnTrend.eq(true))
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(products)
    }

    /// Case-insensitive substring search over category names. Subcategories
    /// of every direct match are included, so searching "shoes" also returns
    /// "running" and "casual" under it.
    #[instrument(skip(self))]
    pub async fn search_categories(
        &self,
        needle: &str,
    ) -> Result<Vec<category::Model>, ServiceError> {
        let pattern = format!("%{}%", needle.to_lowercase());
        let mut matches = Category::find()
            .filter(Expr::expr(Func::lower(Expr::col(category::Column::Name))).like(pattern.as_str()))
            .all(&*self.db)
            .await?;

        let parent_ids: Vec<Uuid> = matches.iter().map(|c| c.id).collect();
        if !parent_ids.is_empty() {
            let children = Category::find()
                .filter(category::Column::ParentId.is_in(parent_ids))
                .all(&*self.db)
                .await?;
            for child in children {
                if !matches.iter().any(|c| c.id == child.id) {
                    matches.push(child);
                }
            }
        }

        Ok(matches)
    }

    /// Lists the variants of a product.
    #[instrument(skip(self))]
    pub async fn get_variants(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<product_variant::Model>, ServiceError> {
        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .order_by_asc(product_variant::Column::Label)
            .all(&*self.db)
            .await?;
        Ok(variants)
    }

    /// Whether the product can currently be bought. Products with variants
    /// are in stock when any variant has stock; plain products use their own
    /// counter. Informational only: neither the cart nor checkout enforces
    /// it.
    #[instrument(skip(self))]
    pub async fn is_in_stock(&self, product_id: Uuid) -> Result<bool, ServiceError> {
        let product = self.get_product(product_id).await?;

        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?;

        if variants.is_empty() {
            Ok(product.stock > 0)
        } else {
            Ok(variants.iter().any(|v| v.stock > 0))
        }
    }
}
