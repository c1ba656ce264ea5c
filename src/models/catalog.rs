use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::slug::{slugify, unique_slug, SlugTable};
use crate::types::common::Pagination;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ProductCategory {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Decimal,
    pub image: String,
    pub stock: i32,
    pub delivery_time_info: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ProductImage {
    pub id: Uuid,
    pub product_id: Uuid,
    pub image_url: String,
    pub position: i32,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ProductSpecification {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub value: String,
    pub position: i32,
}

/// Everything the back-office submits when creating or editing a product.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProductDraft {
    pub category_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub delivery_time_info: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub specifications: Vec<SpecificationDraft>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SpecificationDraft {
    pub name: String,
    pub value: String,
}

fn default_true() -> bool {
    true
}

impl ProductDraft {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("Product name is required"));
        }
        if self.price.is_sign_negative() {
            return Err(AppError::validation("Price cannot be negative"));
        }
        if self.stock < 0 {
            return Err(AppError::validation("Stock cannot be negative"));
        }
        if self
            .specifications
            .iter()
            .any(|s| s.name.trim().is_empty() || s.value.trim().is_empty())
        {
            return Err(AppError::validation("Specifications need a name and a value"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductListing {
    #[serde(flatten)]
    pub product: Product,
    pub category: ProductCategory,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub category: ProductCategory,
    pub images: Vec<ProductImage>,
    pub specifications: Vec<ProductSpecification>,
}

/// Back-office product filter.
#[derive(Debug, Default)]
pub struct ProductFilter<'a> {
    pub category: Option<Uuid>,
    pub search: Option<&'a str>,
    pub active: Option<bool>,
}

impl ProductCategory {
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProductCategory>("SELECT * FROM product_categories ORDER BY name")
            .fetch_all(pool)
            .await
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProductCategory>("SELECT * FROM product_categories WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Blank slugs are derived from the name; clashes get a numeric suffix.
    pub async fn create(pool: &PgPool, name: &str, slug: Option<&str>) -> Result<Self, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::validation("Category name is required"));
        }
        let base = match slug.map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => slugify(slug),
            None => slugify(name),
        };

        let mut tx = pool.begin().await?;
        let slug = unique_slug(&mut tx, SlugTable::ProductCategories, &base, None).await?;
        let category = sqlx::query_as::<_, ProductCategory>(
            "INSERT INTO product_categories (id, name, slug) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name.trim())
        .bind(&slug)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("Created product category {} ({})", category.name, category.slug);
        Ok(category)
    }

    /// An explicit slug replaces the current one as given; it must be free.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        name: Option<&str>,
        slug: Option<&str>,
    ) -> Result<Self, AppError> {
        let slug = slug.map(slugify).filter(|s| !s.is_empty());
        let category = sqlx::query_as::<_, ProductCategory>(
            r#"
            UPDATE product_categories
            SET name = COALESCE($2, name), slug = COALESCE($3, slug)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name.map(str::trim))
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;
        Ok(category)
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM product_categories WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl Product {
    pub async fn list_active(pool: &PgPool) -> Result<Vec<ProductListing>, sqlx::Error> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_active ORDER BY created_at DESC",
        )
        .fetch_all(pool)
        .await?;
        Product::with_categories(pool, products).await
    }

    async fn with_categories(
        pool: &PgPool,
        products: Vec<Product>,
    ) -> Result<Vec<ProductListing>, sqlx::Error> {
        let categories = ProductCategory::list(pool).await?;
        Ok(products
            .into_iter()
            .filter_map(|product| {
                let category = categories
                    .iter()
                    .find(|c| c.id == product.category_id)?
                    .clone();
                Some(ProductListing { product, category })
            })
            .collect())
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn get_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE slug = $1")
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    pub async fn detail(pool: &PgPool, product: Product) -> Result<ProductDetail, AppError> {
        let category = ProductCategory::get(pool, product.category_id)
            .await?
            .ok_or_else(|| AppError::not_found("Category"))?;

        let images = sqlx::query_as::<_, ProductImage>(
            "SELECT * FROM product_images WHERE product_id = $1 ORDER BY position",
        )
        .bind(product.id)
        .fetch_all(pool)
        .await?;

        let specifications = sqlx::query_as::<_, ProductSpecification>(
            "SELECT * FROM product_specifications WHERE product_id = $1 ORDER BY position",
        )
        .bind(product.id)
        .fetch_all(pool)
        .await?;

        Ok(ProductDetail {
            product,
            category,
            images,
            specifications,
        })
    }

    pub async fn search(
        pool: &PgPool,
        filter: &ProductFilter<'_>,
        pagination: &Pagination,
    ) -> Result<(Vec<ProductListing>, i64), sqlx::Error> {
        fn filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter<'_>) {
            qb.push(" WHERE TRUE");
            if let Some(category) = filter.category {
                qb.push(" AND category_id = ").push_bind(category);
            }
            if let Some(active) = filter.active {
                qb.push(" AND is_active = ").push_bind(active);
            }
            if let Some(term) = filter.search {
                let pattern = format!("%{}%", term);
                qb.push(" AND (name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR description ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM products");
        filters(&mut count_query, filter);
        let total: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

        let mut query = QueryBuilder::new("SELECT * FROM products");
        filters(&mut query, filter);
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset_for(total));
        let products = query.build_query_as::<Product>().fetch_all(pool).await?;

        Ok((Product::with_categories(pool, products).await?, total))
    }

    async fn write_gallery(
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
        draft: &ProductDraft,
    ) -> Result<(), sqlx::Error> {
        for (position, url) in draft.images.iter().enumerate() {
            sqlx::query(
                "INSERT INTO product_images (id, product_id, image_url, position) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(url)
            .bind(position as i32)
            .execute(&mut **tx)
            .await?;
        }

        for (position, spec) in draft.specifications.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO product_specifications (id, product_id, name, value, position)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(spec.name.trim())
            .bind(spec.value.trim())
            .bind(position as i32)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Product, gallery and specifications are written all-or-nothing.
    pub async fn create(pool: &PgPool, draft: &ProductDraft) -> Result<Self, AppError> {
        draft.validate()?;
        let mut tx = pool.begin().await?;

        let slug = unique_slug(&mut tx, SlugTable::Products, &slugify(&draft.name), None).await?;
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (id, category_id, name, slug, description, price, image, stock,
                                  delivery_time_info, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(draft.category_id)
        .bind(draft.name.trim())
        .bind(&slug)
        .bind(&draft.description)
        .bind(draft.price)
        .bind(&draft.image)
        .bind(draft.stock)
        .bind(&draft.delivery_time_info)
        .bind(draft.is_active)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        Product::write_gallery(&mut tx, product.id, draft).await?;
        tx.commit().await?;

        info!("Created product {} ({})", product.name, product.slug);
        Ok(product)
    }

    /// Replaces the product's fields, gallery and specifications in one transaction.
    pub async fn update(pool: &PgPool, id: Uuid, draft: &ProductDraft) -> Result<Self, AppError> {
        draft.validate()?;
        let mut tx = pool.begin().await?;

        let current = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Product"))?;

        let slug = if current.name == draft.name.trim() {
            current.slug.clone()
        } else {
            unique_slug(&mut tx, SlugTable::Products, &slugify(&draft.name), Some(id)).await?
        };

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                category_id = $2, name = $3, slug = $4, description = $5, price = $6,
                image = $7, stock = $8, delivery_time_info = $9, is_active = $10
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(draft.category_id)
        .bind(draft.name.trim())
        .bind(&slug)
        .bind(&draft.description)
        .bind(draft.price)
        .bind(&draft.image)
        .bind(draft.stock)
        .bind(&draft.delivery_time_info)
        .bind(draft.is_active)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM product_images WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM product_specifications WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        Product::write_gallery(&mut tx, id, draft).await?;
        tx.commit().await?;

        debug!("Updated product {}", product.id);
        Ok(product)
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(pool: &PgPool, only_active: bool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active OR NOT $1")
            .bind(only_active)
            .fetch_one(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ProductDraft {
        serde_json::from_value(serde_json::json!({
            "category_id": Uuid::new_v4(),
            "name": "Smart Doorbell",
            "description": "Wi-Fi video doorbell",
            "price": "2499.00",
            "specifications": [{ "name": "Resolution", "value": "1080p" }]
        }))
        .unwrap()
    }

    #[test]
    fn draft_defaults_to_active_with_empty_gallery() {
        let draft = draft();
        assert!(draft.is_active);
        assert!(draft.images.is_empty());
        assert_eq!(draft.stock, 0);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn draft_rejects_negative_price_and_blank_specs() {
        let mut negative = draft();
        negative.price = Decimal::new(-100, 2);
        assert!(negative.validate().is_err());

        let mut blank = draft();
        blank.specifications.push(SpecificationDraft {
            name: "Colour".to_string(),
            value: " ".to_string(),
        });
        assert!(blank.validate().is_err());

        let mut unnamed = draft();
        unnamed.name = "   ".to_string();
        assert!(unnamed.validate().is_err());
    }
}
