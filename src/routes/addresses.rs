use actix_web::{delete, get, patch, post, web, HttpResponse, Responder};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::address::Removal;
use crate::models::Address;
use crate::types::common::ActionResponse;
use crate::types::{AddressRequest, AddressUpdateRequest};
use crate::AppState;

#[utoipa::path(
    context_path = "/api/addresses",
    tag = "Addresses",
    responses((status = 200, description = "Caller's addresses, oldest first", body = [Address])),
    security(("bearer_auth" = []))
)]
#[get("")]
pub async fn list_addresses(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let addresses = Address::list_for_user(&app_state.pool, authenticated_user.user_id).await?;
    Ok(HttpResponse::Ok().json(addresses))
}

#[utoipa::path(
    context_path = "/api/addresses",
    tag = "Addresses",
    request_body = AddressRequest,
    responses(
        (status = 201, description = "New address; the first one becomes the default", body = Address),
        (status = 400, description = "Bad pincode")
    ),
    security(("bearer_auth" = []))
)]
#[post("/create")]
pub async fn create_address(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    req_body: web::Json<AddressRequest>,
) -> Result<impl Responder, AppError> {
    let address = Address::create(
        &app_state.pool,
        authenticated_user.user_id,
        req_body.street_address.trim(),
        req_body.city.trim(),
        req_body.state.trim(),
        req_body.pincode.trim(),
        req_body.is_default,
    )
    .await?;
    Ok(HttpResponse::Created().json(address))
}

#[utoipa::path(
    context_path = "/api/addresses",
    tag = "Addresses",
    request_body = AddressUpdateRequest,
    responses(
        (status = 200, description = "Updated address", body = Address),
        (status = 404, description = "Not one of the caller's addresses")
    ),
    security(("bearer_auth" = []))
)]
#[patch("/{id}/update")]
pub async fn update_address(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
    req_body: web::Json<AddressUpdateRequest>,
) -> Result<impl Responder, AppError> {
    let address = Address::update(
        &app_state.pool,
        *id,
        authenticated_user.user_id,
        req_body.into_inner().into(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(address))
}

#[utoipa::path(
    context_path = "/api/addresses",
    tag = "Addresses",
    responses(
        (status = 200, description = "Address removed", body = ActionResponse),
        (status = 400, description = "Sole default address"),
        (status = 404, description = "Not one of the caller's addresses")
    ),
    security(("bearer_auth" = []))
)]
#[delete("/{id}/delete")]
pub async fn delete_address(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let removal = Address::delete(&app_state.pool, *id, authenticated_user.user_id).await?;
    let message = match removal {
        Removal::Delete => "Address deleted",
        Removal::DeleteAndPromote(_) => "Address deleted, another address is now the default",
    };
    Ok(HttpResponse::Ok().json(ActionResponse::ok(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};

    use crate::models::Role;
    use crate::test_support::{bearer, test_app_state};

    #[actix_web::test]
    async fn invalid_pincode_is_rejected() {
        let (app_state, authentication) = test_app_state();
        let token = bearer(Role::Customer, &app_state.app_config);
        let app = test::init_service(
            App::new().app_data(web::Data::new(app_state)).service(
                web::scope("/api/addresses")
                    .wrap(authentication)
                    .service(create_address),
            ),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/addresses/create")
            .insert_header(("Authorization", token))
            .set_json(serde_json::json!({
                "street_address": "12 MG Road",
                "city": "Kochi",
                "state": "Kerala",
                "pincode": "68200A"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
