use actix_web::{get, post, web, HttpResponse, Responder};
use std::sync::Arc;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::rating::RatingOverview;
use crate::models::TechnicianRating;
use crate::types::CreateRatingRequest;
use crate::AppState;

#[utoipa::path(
    context_path = "/services/api",
    tag = "Ratings",
    request_body = CreateRatingRequest,
    responses(
        (status = 201, description = "Rating recorded", body = TechnicianRating),
        (status = 400, description = "Score out of range, wrong target count, or job not rateable"),
        (status = 404, description = "Job not found for this customer"),
        (status = 409, description = "Job was rated concurrently")
    ),
    security(("bearer_auth" = []))
)]
#[post("/ratings/create")]
pub async fn create_rating(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    req_body: web::Json<CreateRatingRequest>,
) -> Result<impl Responder, AppError> {
    let rating = TechnicianRating::submit(
        &app_state.pool,
        authenticated_user.user_id,
        req_body.into_inner().into(),
    )
    .await?;
    Ok(HttpResponse::Created().json(rating))
}

#[utoipa::path(
    context_path = "/services/api",
    tag = "Ratings",
    responses((status = 200, description = "Ratings given by the caller", body = [RatingOverview])),
    security(("bearer_auth" = []))
)]
#[get("/ratings/my-ratings")]
pub async fn my_ratings(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let ratings = TechnicianRating::list_for_customer(&app_state.pool, authenticated_user.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(ratings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};

    use crate::models::Role;
    use crate::test_support::{bearer, read_error, test_app_state};

    #[actix_web::test]
    async fn out_of_range_score_is_rejected_without_a_write() {
        let (app_state, authentication) = test_app_state();
        let token = bearer(Role::Customer, &app_state.app_config);
        let app = test::init_service(
            App::new().app_data(web::Data::new(app_state)).service(
                web::scope("/services/api")
                    .wrap(authentication)
                    .service(create_rating),
            ),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/services/api/ratings/create")
            .insert_header(("Authorization", token))
            .set_json(serde_json::json!({"rating": 7, "order_id": uuid::Uuid::new_v4()}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_error(resp).await, "Rating must be between 1 and 5");
    }

    #[actix_web::test]
    async fn rating_needs_exactly_one_job() {
        let (app_state, authentication) = test_app_state();
        let token = bearer(Role::Customer, &app_state.app_config);
        let app = test::init_service(
            App::new().app_data(web::Data::new(app_state)).service(
                web::scope("/services/api")
                    .wrap(authentication)
                    .service(create_rating),
            ),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/services/api/ratings/create")
            .insert_header(("Authorization", token))
            .set_json(serde_json::json!({
                "rating": 4,
                "order_id": uuid::Uuid::new_v4(),
                "service_request_id": uuid::Uuid::new_v4()
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_error(resp).await,
            "Provide exactly one of order_id or service_request_id"
        );
    }
}
