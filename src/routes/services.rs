use actix_web::{get, post, web, HttpResponse, Responder};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::service::{check_issue_fits, service_fee_for, ServiceRequestOverview};
use crate::models::{Address, ServiceCategory, ServiceIssue, ServiceRequest, ServiceStatus, User};
use crate::types::{CreateServiceRequest, PaymentQuote};
use crate::AppState;

pub async fn load_overview(
    app_state: &AppState,
    id: Uuid,
) -> Result<ServiceRequestOverview, AppError> {
    ServiceRequest::overview(&app_state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Service request"))
}

async fn owned_request(
    app_state: &AppState,
    id: Uuid,
    user: &AuthenticatedUser,
) -> Result<ServiceRequest, AppError> {
    ServiceRequest::get_for_customer(&app_state.pool, id, user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Service request"))
}

#[utoipa::path(
    context_path = "/services/api",
    tag = "Services",
    request_body = CreateServiceRequest,
    responses(
        (status = 201, description = "Submitted request", body = ServiceRequestOverview),
        (status = 400, description = "Issue from another category"),
        (status = 404, description = "Unknown category, issue or location")
    ),
    security(("bearer_auth" = []))
)]
#[post("/requests/create")]
pub async fn create_service_request(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    req_body: web::Json<CreateServiceRequest>,
) -> Result<impl Responder, AppError> {
    let category = ServiceCategory::get(&app_state.pool, req_body.service_category)
        .await?
        .ok_or_else(|| AppError::not_found("Service category"))?;

    let issue = match req_body.issue {
        Some(id) => Some(
            ServiceIssue::get(&app_state.pool, id)
                .await?
                .ok_or_else(|| AppError::not_found("Issue"))?,
        ),
        None => None,
    };
    check_issue_fits(issue.as_ref(), category.id)?;

    let location_id = match req_body.service_location {
        Some(id) => Some(
            Address::get_for_user(&app_state.pool, id, authenticated_user.user_id)
                .await?
                .ok_or_else(|| AppError::not_found("Address"))?
                .id,
        ),
        None => None,
    };

    let request = ServiceRequest::create(
        &app_state.pool,
        authenticated_user.user_id,
        &category,
        issue.map(|issue| issue.id),
        req_body.custom_description.trim(),
        location_id,
    )
    .await?;

    let overview = load_overview(&app_state, request.id).await?;
    Ok(HttpResponse::Created().json(overview))
}

#[utoipa::path(
    context_path = "/services/api",
    tag = "Services",
    responses(
        (status = 200, description = "Fee due before the request is dispatched", body = PaymentQuote),
        (status = 404, description = "Not one of the caller's requests")
    ),
    security(("bearer_auth" = []))
)]
#[get("/requests/{id}/payment")]
pub async fn payment_quote(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let request = owned_request(&app_state, *id, &authenticated_user).await?;
    let customer = User::get_by_id(&app_state.pool, authenticated_user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    let amount = service_fee_for(customer.role, app_state.app_config.service_fee);

    Ok(HttpResponse::Ok().json(PaymentQuote {
        service_request_id: request.id,
        amount,
        payment_required: amount > Decimal::ZERO,
    }))
}

#[utoipa::path(
    context_path = "/services/api",
    tag = "Services",
    responses(
        (status = 200, description = "Request after payment", body = ServiceRequestOverview),
        (status = 404, description = "Not one of the caller's requests")
    ),
    security(("bearer_auth" = []))
)]
#[post("/requests/{id}/confirm")]
pub async fn confirm_service_request(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let request = owned_request(&app_state, *id, &authenticated_user).await?;
    ServiceRequest::set_status(&app_state.pool, request.id, ServiceStatus::Submitted).await?;
    info!("Payment confirmed for service request {}", request.id);

    let overview = load_overview(&app_state, request.id).await?;
    Ok(HttpResponse::Ok().json(overview))
}

#[utoipa::path(
    context_path = "/services/api",
    tag = "Services",
    responses((status = 200, description = "Caller's requests, newest first", body = [ServiceRequestOverview])),
    security(("bearer_auth" = []))
)]
#[get("/requests/history")]
pub async fn service_history(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let requests =
        ServiceRequest::list_for_customer(&app_state.pool, authenticated_user.user_id).await?;
    Ok(HttpResponse::Ok().json(requests))
}
