use actix_web::{get, web, HttpResponse, Responder};
use std::sync::Arc;
use tracing::debug;

use crate::error::AppError;
use crate::models::catalog::{ProductDetail, ProductListing};
use crate::models::service::ServiceCategoryWithIssues;
use crate::models::{Product, ProductCategory, ServiceCategory};
use crate::AppState;

#[utoipa::path(
    context_path = "/api",
    tag = "Catalog",
    responses((status = 200, description = "Active products", body = [ProductListing]))
)]
#[get("/products")]
pub async fn list_products(
    app_state: web::Data<Arc<AppState>>,
) -> Result<impl Responder, AppError> {
    let products = Product::list_active(&app_state.pool).await?;
    debug!("Listing {} active products", products.len());
    Ok(HttpResponse::Ok().json(products))
}

#[utoipa::path(
    context_path = "/api",
    tag = "Catalog",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Product with gallery and specifications", body = ProductDetail),
        (status = 404, description = "Unknown or inactive product")
    )
)]
#[get("/products/{slug}")]
pub async fn get_product(
    app_state: web::Data<Arc<AppState>>,
    slug: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let product = Product::get_by_slug(&app_state.pool, &slug)
        .await?
        .filter(|product| product.is_active)
        .ok_or_else(|| AppError::not_found("Product"))?;

    let detail = Product::detail(&app_state.pool, product).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    context_path = "/api",
    tag = "Catalog",
    responses((status = 200, description = "Product categories", body = [ProductCategory]))
)]
#[get("/categories")]
pub async fn list_categories(
    app_state: web::Data<Arc<AppState>>,
) -> Result<impl Responder, AppError> {
    let categories = ProductCategory::list(&app_state.pool).await?;
    Ok(HttpResponse::Ok().json(categories))
}

#[utoipa::path(
    context_path = "/services/api",
    tag = "Services",
    responses((status = 200, description = "Service categories with their issues", body = [ServiceCategoryWithIssues]))
)]
#[get("/categories")]
pub async fn list_service_categories(
    app_state: web::Data<Arc<AppState>>,
) -> Result<impl Responder, AppError> {
    let categories = ServiceCategory::list_with_issues(&app_state.pool).await?;
    Ok(HttpResponse::Ok().json(categories))
}
