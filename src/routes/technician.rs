use actix_web::{get, patch, web, HttpResponse, Responder};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::TechnicianUser;
use crate::models::order::OrderDetail;
use crate::models::service::ServiceRequestOverview;
use crate::models::{Order, ServiceRequest, TechnicianRating};
use crate::routes::orders::load_detail;
use crate::routes::services::load_overview;
use crate::types::common::month_start;
use crate::types::TechnicianStats;
use crate::AppState;

#[utoipa::path(
    context_path = "/api/technician",
    tag = "Technician",
    responses(
        (status = 200, description = "Orders assigned to the caller", body = [OrderDetail]),
        (status = 403, description = "Caller is not a technician")
    ),
    security(("bearer_auth" = []))
)]
#[get("/assigned-orders")]
pub async fn assigned_orders(
    app_state: web::Data<Arc<AppState>>,
    technician: TechnicianUser,
) -> Result<impl Responder, AppError> {
    let overviews = Order::list_for_technician(&app_state.pool, technician.0.user_id).await?;
    let details = Order::details(&app_state.pool, overviews).await?;
    Ok(HttpResponse::Ok().json(details))
}

#[utoipa::path(
    context_path = "/api/technician",
    tag = "Technician",
    responses(
        (status = 200, description = "Service requests assigned to the caller", body = [ServiceRequestOverview]),
        (status = 403, description = "Caller is not a technician")
    ),
    security(("bearer_auth" = []))
)]
#[get("/assigned-services")]
pub async fn assigned_services(
    app_state: web::Data<Arc<AppState>>,
    technician: TechnicianUser,
) -> Result<impl Responder, AppError> {
    let requests = ServiceRequest::list_for_technician(&app_state.pool, technician.0.user_id).await?;
    Ok(HttpResponse::Ok().json(requests))
}

#[utoipa::path(
    context_path = "/api/technician",
    tag = "Technician",
    responses(
        (status = 200, description = "Order marked delivered", body = OrderDetail),
        (status = 404, description = "Not assigned to the caller"),
        (status = 403, description = "Caller is not a technician")
    ),
    security(("bearer_auth" = []))
)]
#[patch("/complete-order/{id}")]
pub async fn complete_order(
    app_state: web::Data<Arc<AppState>>,
    technician: TechnicianUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let order = Order::complete_by_technician(&app_state.pool, *id, technician.0.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;
    info!("Technician {} delivered order {}", technician.0.user_id, order.id);

    let detail = load_detail(&app_state, order.id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    context_path = "/api/technician",
    tag = "Technician",
    responses(
        (status = 200, description = "Request marked completed", body = ServiceRequestOverview),
        (status = 404, description = "Not assigned to the caller"),
        (status = 403, description = "Caller is not a technician")
    ),
    security(("bearer_auth" = []))
)]
#[patch("/complete-service/{id}")]
pub async fn complete_service(
    app_state: web::Data<Arc<AppState>>,
    technician: TechnicianUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let request = ServiceRequest::complete_by_technician(&app_state.pool, *id, technician.0.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Service request"))?;
    info!("Technician {} completed service request {}", technician.0.user_id, request.id);

    let overview = load_overview(&app_state, request.id).await?;
    Ok(HttpResponse::Ok().json(overview))
}

#[utoipa::path(
    context_path = "/api/technician",
    tag = "Technician",
    responses(
        (status = 200, description = "Job counts and average rating", body = TechnicianStats),
        (status = 403, description = "Caller is not a technician")
    ),
    security(("bearer_auth" = []))
)]
#[get("/stats")]
pub async fn technician_stats(
    app_state: web::Data<Arc<AppState>>,
    technician: TechnicianUser,
) -> Result<impl Responder, AppError> {
    let technician_id = technician.0.user_id;
    let since = month_start(Utc::now());

    let orders = Order::counts_for_technician(&app_state.pool, technician_id, since).await?;
    let services =
        ServiceRequest::counts_for_technician(&app_state.pool, technician_id, since).await?;
    let average_rating =
        TechnicianRating::average_for_technician(&app_state.pool, technician_id).await?;

    Ok(HttpResponse::Ok().json(TechnicianStats {
        total_orders: orders.total,
        completed_orders: orders.completed,
        total_services: services.total,
        completed_services: services.completed,
        average_rating,
        completed_this_month: orders.completed_since + services.completed_since,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};

    use crate::models::Role;
    use crate::test_support::{bearer, test_app_state};

    #[actix_web::test]
    async fn customers_cannot_complete_jobs() {
        let (app_state, authentication) = test_app_state();
        let token = bearer(Role::Customer, &app_state.app_config);
        let app = test::init_service(
            App::new().app_data(web::Data::new(app_state)).service(
                web::scope("/api/technician")
                    .wrap(authentication)
                    .service(complete_order),
            ),
        )
        .await;

        let req = test::TestRequest::patch()
            .uri(&format!("/api/technician/complete-order/{}", Uuid::new_v4()))
            .insert_header(("Authorization", token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }
}
