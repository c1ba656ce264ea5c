use std::{
    future::{ready, Ready},
    sync::Arc,
};

use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{decode_token, TokenType};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::user::Role;

/// Caller identity taken from a valid access token.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: Role,
}

/// An authenticated caller with the ADMIN role.
#[derive(Debug, Clone, Copy)]
pub struct StaffUser(pub AuthenticatedUser);

/// An authenticated caller with the TECHNICIAN role.
#[derive(Debug, Clone, Copy)]
pub struct TechnicianUser(pub AuthenticatedUser);

pub struct Authentication {
    pub app_config: Arc<AppConfig>,
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticationMiddleware {
            service,
            app_config: self.app_config.clone(),
        }))
    }
}

pub struct AuthenticationMiddleware<S> {
    service: S,
    app_config: Arc<AppConfig>,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Missing or bad tokens are not rejected here; extractors decide per route
        let bearer = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match bearer {
            Some(token) => match decode_token(token, TokenType::Access, &self.app_config.jwt_keys) {
                Ok(claims) => {
                    debug!("Authenticated user {} ({:?}) for {}", claims.sub, claims.role, req.path());
                    req.extensions_mut().insert(AuthenticatedUser {
                        user_id: claims.sub,
                        role: claims.role,
                    });
                }
                Err(e) => {
                    warn!("Rejected bearer token on {}: {}", req.path(), e);
                }
            },
            None => {
                debug!("No bearer token on {}", req.path());
            }
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            Ok(res)
        })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(req.extensions().get::<AuthenticatedUser>().copied().ok_or_else(|| {
            AppError::Unauthorized("Authentication credentials were not provided".to_string())
        }))
    }
}

fn require_role(req: &HttpRequest, allowed: fn(Role) -> bool) -> Result<AuthenticatedUser, AppError> {
    let user = req
        .extensions()
        .get::<AuthenticatedUser>()
        .copied()
        .ok_or_else(|| {
            AppError::Unauthorized("Authentication credentials were not provided".to_string())
        })?;

    if !allowed(user.role) {
        warn!("User {} with role {:?} denied at {}", user.user_id, user.role, req.path());
        return Err(AppError::Forbidden(
            "You do not have permission to perform this action".to_string(),
        ));
    }
    Ok(user)
}

impl FromRequest for StaffUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(require_role(req, Role::is_staff).map(StaffUser))
    }
}

impl FromRequest for TechnicianUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(require_role(req, |role| role == Role::Technician).map(TechnicianUser))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};

    use crate::auth::issue_token_pair;
    use crate::models::User;

    async fn whoami(user: AuthenticatedUser) -> HttpResponse {
        HttpResponse::Ok().body(user.user_id.to_string())
    }

    async fn staff_only(_staff: StaffUser) -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    fn bearer_for(role: Role, app_config: &AppConfig) -> (Uuid, String) {
        let user = User {
            role,
            ..User::new("Asha", "asha@example.com")
        };
        let tokens = issue_token_pair(&user, app_config).unwrap();
        (user.id, format!("Bearer {}", tokens.access))
    }

    #[actix_web::test]
    async fn access_token_populates_the_caller() {
        let app_config = Arc::new(AppConfig::for_tests());
        let app = test::init_service(
            App::new()
                .wrap(Authentication {
                    app_config: app_config.clone(),
                })
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let (user_id, bearer) = bearer_for(Role::Customer, &app_config);
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header((AUTHORIZATION, bearer))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, user_id.to_string());

        let req = test::TestRequest::get().uri("/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn refresh_token_is_not_accepted_as_access() {
        let app_config = Arc::new(AppConfig::for_tests());
        let app = test::init_service(
            App::new()
                .wrap(Authentication {
                    app_config: app_config.clone(),
                })
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let user = User::new("Asha", "asha@example.com");
        let tokens = issue_token_pair(&user, &app_config).unwrap();
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header((AUTHORIZATION, format!("Bearer {}", tokens.refresh)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn staff_extractor_checks_role() {
        let app_config = Arc::new(AppConfig::for_tests());
        let app = test::init_service(
            App::new()
                .wrap(Authentication {
                    app_config: app_config.clone(),
                })
                .route("/staff", web::get().to(staff_only)),
        )
        .await;

        let (_, customer) = bearer_for(Role::Customer, &app_config);
        let req = test::TestRequest::get()
            .uri("/staff")
            .insert_header((AUTHORIZATION, customer))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let (_, admin) = bearer_for(Role::Admin, &app_config);
        let req = test::TestRequest::get()
            .uri("/staff")
            .insert_header((AUTHORIZATION, admin))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
