use actix_web::{get, post, web, HttpResponse, Responder};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::order::OrderDetail;
use crate::models::{Address, Order, OrderStatus, Product};
use crate::types::{CreateOrderRequest, SetOrderAddressRequest};
use crate::AppState;

/// Overview, items and total for one order.
pub async fn load_detail(app_state: &AppState, id: Uuid) -> Result<OrderDetail, AppError> {
    let overview = Order::overview(&app_state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;
    Order::details(&app_state.pool, vec![overview])
        .await?
        .pop()
        .ok_or_else(|| AppError::not_found("Order"))
}

async fn owned_order(
    app_state: &AppState,
    id: Uuid,
    user: &AuthenticatedUser,
) -> Result<Order, AppError> {
    Order::get_for_customer(&app_state.pool, id, user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))
}

async fn owned_address(
    app_state: &AppState,
    id: Uuid,
    user: &AuthenticatedUser,
) -> Result<Address, AppError> {
    Address::get_for_user(&app_state.pool, id, user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Address"))
}

#[utoipa::path(
    context_path = "/api/orders",
    tag = "Orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Pending order", body = OrderDetail),
        (status = 400, description = "Bad quantity or unavailable product"),
        (status = 404, description = "Unknown product or address")
    ),
    security(("bearer_auth" = []))
)]
#[post("/create")]
pub async fn create_order(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    req_body: web::Json<CreateOrderRequest>,
) -> Result<impl Responder, AppError> {
    if req_body.quantity < 1 {
        return Err(AppError::validation("Quantity must be at least 1"));
    }

    let product = Product::get_by_slug(&app_state.pool, &req_body.product_slug)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

    let address_id = match req_body.address_id {
        Some(id) => Some(owned_address(&app_state, id, &authenticated_user).await?.id),
        None => None,
    };

    let order = Order::create(
        &app_state.pool,
        authenticated_user.user_id,
        &product,
        req_body.quantity,
        address_id,
    )
    .await?;

    let detail = load_detail(&app_state, order.id).await?;
    Ok(HttpResponse::Created().json(detail))
}

#[utoipa::path(
    context_path = "/api/orders",
    tag = "Orders",
    request_body = SetOrderAddressRequest,
    responses(
        (status = 200, description = "Order detail", body = OrderDetail),
        (status = 404, description = "Not one of the caller's orders")
    ),
    security(("bearer_auth" = []))
)]
#[post("/{id}/address")]
pub async fn set_order_address(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
    req_body: web::Json<SetOrderAddressRequest>,
) -> Result<impl Responder, AppError> {
    let order = owned_order(&app_state, *id, &authenticated_user).await?;
    let address = owned_address(&app_state, req_body.address_id, &authenticated_user).await?;

    Order::set_shipping_address(&app_state.pool, order.id, address.id).await?;
    let detail = load_detail(&app_state, order.id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Payment is simulated: confirming moves the order straight into processing.
#[utoipa::path(
    context_path = "/api/orders",
    tag = "Orders",
    responses(
        (status = 200, description = "Order detail", body = OrderDetail),
        (status = 404, description = "Not one of the caller's orders")
    ),
    security(("bearer_auth" = []))
)]
#[post("/{id}/confirm")]
pub async fn confirm_order(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let order = owned_order(&app_state, *id, &authenticated_user).await?;
    Order::set_status(&app_state.pool, order.id, OrderStatus::Processing).await?;
    info!("Payment confirmed for order {}", order.id);

    let detail = load_detail(&app_state, order.id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    context_path = "/api/orders",
    tag = "Orders",
    responses((status = 200, description = "Caller's orders, newest first", body = [OrderDetail])),
    security(("bearer_auth" = []))
)]
#[get("")]
pub async fn list_orders(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let overviews = Order::list_for_customer(&app_state.pool, authenticated_user.user_id).await?;
    let details = Order::details(&app_state.pool, overviews).await?;
    Ok(HttpResponse::Ok().json(details))
}

#[utoipa::path(
    context_path = "/api/orders",
    tag = "Orders",
    responses(
        (status = 200, description = "Order detail", body = OrderDetail),
        (status = 404, description = "Not one of the caller's orders")
    ),
    security(("bearer_auth" = []))
)]
#[get("/{id}")]
pub async fn get_order(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let order = owned_order(&app_state, *id, &authenticated_user).await?;
    let detail = load_detail(&app_state, order.id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};

    use crate::models::Role;
    use crate::test_support::{bearer, test_app_state};

    #[actix_web::test]
    async fn orders_require_authentication() {
        let (app_state, authentication) = test_app_state();
        let app = test::init_service(
            App::new().app_data(web::Data::new(app_state)).service(
                web::scope("/api/orders")
                    .wrap(authentication)
                    .service(create_order)
                    .service(list_orders),
            ),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/orders").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn zero_quantity_is_rejected_before_lookup() {
        let (app_state, authentication) = test_app_state();
        let token = bearer(Role::Customer, &app_state.app_config);
        let app = test::init_service(
            App::new().app_data(web::Data::new(app_state)).service(
                web::scope("/api/orders")
                    .wrap(authentication)
                    .service(create_order),
            ),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/orders/create")
            .insert_header(("Authorization", token))
            .set_json(serde_json::json!({"product_slug": "mesh-router", "quantity": 0}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
