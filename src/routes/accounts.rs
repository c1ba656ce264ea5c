use actix_web::{get, patch, post, web, HttpResponse, Responder};
use rand::Rng;
use reqwest::{Client, Url};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{
    hash_password, issue_token_pair, refresh_access_token, refresh_subject, verify_password,
    TokenPair,
};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::user::{PhoneChange, UserChanges};
use crate::models::User;
use crate::types::{
    AuthResponse, GoogleCallbackQuery, GoogleTokenResponse, GoogleUserInfo, LoginRequest,
    ProfileUpdateRequest, RefreshRequest, RefreshResponse, RegisterRequest,
};
use crate::AppState;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

fn bad_credentials() -> AppError {
    AppError::Unauthorized("No active account found with the given credentials".to_string())
}

#[utoipa::path(
    context_path = "/api/auth",
    tag = "Accounts",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "New customer and token pair", body = AuthResponse),
        (status = 400, description = "Missing name, bad email or short password"),
        (status = 409, description = "Email already registered")
    )
)]
#[post("/register")]
pub async fn register(
    app_state: web::Data<Arc<AppState>>,
    req_body: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    req_body.validate()?;

    if User::get_by_email(&app_state.pool, &req_body.email).await?.is_some() {
        return Err(AppError::Conflict(
            "A user with this email already exists".to_string(),
        ));
    }

    let new_user = User {
        password_hash: Some(hash_password(&req_body.password)?),
        ..User::new(req_body.name.trim(), &req_body.email)
    };
    let user = User::create(&app_state.pool, &new_user).await?;
    let tokens = issue_token_pair(&user, &app_state.app_config)?;

    info!("Registered user {}", user.id);
    Ok(HttpResponse::Created().json(AuthResponse { user, tokens }))
}

#[utoipa::path(
    context_path = "/api/auth",
    tag = "Accounts",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 401, description = "Unknown, inactive or social-only account, or wrong password")
    )
)]
#[post("/login")]
pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    req_body: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    let user = User::get_by_email(&app_state.pool, &req_body.email)
        .await?
        .ok_or_else(bad_credentials)?;

    let Some(password_hash) = user.password_hash.as_deref() else {
        warn!("Password login attempted for social-only account {}", user.id);
        return Err(AppError::Unauthorized(
            "This account signs in with Google".to_string(),
        ));
    };

    if !user.is_active || !verify_password(&req_body.password, password_hash) {
        return Err(bad_credentials());
    }

    let tokens = issue_token_pair(&user, &app_state.app_config)?;
    info!("User {} logged in", user.id);
    Ok(HttpResponse::Ok().json(tokens))
}

#[utoipa::path(
    context_path = "/api/auth",
    tag = "Accounts",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Fresh access token", body = RefreshResponse),
        (status = 401, description = "Invalid or expired refresh token, or the account is gone or inactive")
    )
)]
#[post("/refresh")]
pub async fn refresh(
    app_state: web::Data<Arc<AppState>>,
    req_body: web::Json<RefreshRequest>,
) -> Result<impl Responder, AppError> {
    let user_id = refresh_subject(&req_body.refresh, &app_state.app_config)?;
    let user = User::get_by_id(&app_state.pool, user_id).await?;
    if user.as_ref().is_some_and(|user| !user.is_active) {
        warn!("Refresh refused for inactive user {}", user_id);
    }
    let access = refresh_access_token(user.as_ref(), &app_state.app_config)?;
    Ok(HttpResponse::Ok().json(RefreshResponse { access }))
}

async fn current_user(app_state: &AppState, caller: &AuthenticatedUser) -> Result<User, AppError> {
    User::get_by_id(&app_state.pool, caller.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

#[utoipa::path(
    context_path = "/api/auth",
    tag = "Accounts",
    responses((status = 200, description = "The caller", body = User)),
    security(("bearer_auth" = []))
)]
#[get("/user")]
pub async fn get_user(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let user = current_user(&app_state, &authenticated_user).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    context_path = "/api/users",
    tag = "Accounts",
    responses((status = 200, description = "The caller's profile", body = User)),
    security(("bearer_auth" = []))
)]
#[get("/profile")]
pub async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let user = current_user(&app_state, &authenticated_user).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    context_path = "/api/users",
    tag = "Accounts",
    request_body = ProfileUpdateRequest,
    responses((status = 200, description = "Updated profile", body = User)),
    security(("bearer_auth" = []))
)]
#[patch("/profile")]
pub async fn update_profile(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    req_body: web::Json<ProfileUpdateRequest>,
) -> Result<impl Responder, AppError> {
    let req_body = req_body.into_inner();
    if req_body.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(AppError::validation("Name cannot be blank"));
    }

    let changes = UserChanges {
        name: req_body.name.map(|name| name.trim().to_string()),
        phone: PhoneChange::from_input(req_body.phone),
        email_notifications: req_body.email_notifications,
        sms_notifications: req_body.sms_notifications,
        ..Default::default()
    };
    let user = User::update(&app_state.pool, authenticated_user.user_id, changes).await?;
    Ok(HttpResponse::Ok().json(user))
}

fn new_oauth_state() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn google_authorize_url(app_config: &AppConfig, state: &str) -> Result<Url, AppError> {
    Url::parse_with_params(
        GOOGLE_AUTHORIZE_URL,
        &[
            ("client_id", app_config.google_client_id.as_str()),
            ("redirect_uri", app_config.google_redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", state),
            ("prompt", "select_account"),
            ("access_type", "online"),
        ],
    )
    .map_err(|e| AppError::Internal(format!("Failed to build Google URL: {}", e)))
}

/// Where the SPA picks the tokens up after a social login.
fn login_success_url(frontend_url: &str, tokens: &TokenPair) -> Result<Url, AppError> {
    Url::parse_with_params(
        &format!("{}/login-success", frontend_url),
        &[("access", tokens.access.as_str()), ("refresh", tokens.refresh.as_str())],
    )
    .map_err(|e| AppError::Internal(format!("Bad FRONTEND_URL: {}", e)))
}

#[utoipa::path(
    context_path = "/api/auth",
    tag = "Accounts",
    responses((status = 302, description = "Redirect to Google's consent screen"))
)]
#[get("/google/login")]
pub async fn google_login(
    app_state: web::Data<Arc<AppState>>,
) -> Result<impl Responder, AppError> {
    let state = new_oauth_state();
    let url = google_authorize_url(&app_state.app_config, &state)?;
    app_state.oauth_states.insert(state, ()).await;

    Ok(web::Redirect::to(url.to_string()))
}

async fn exchange_code_for_user(
    code: &str,
    app_config: &AppConfig,
) -> Result<GoogleUserInfo, AppError> {
    let client = Client::new();
    let token = client
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("code", code),
            ("client_id", app_config.google_client_id.as_str()),
            ("client_secret", app_config.google_client_secret.as_str()),
            ("redirect_uri", app_config.google_redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    if !token.status().is_success() {
        let error_body = token
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());
        error!("Error response from Google token endpoint: {}", error_body);
        return Err(AppError::Upstream(
            "Failed to exchange the Google authorization code".to_string(),
        ));
    }
    let token = token.json::<GoogleTokenResponse>().await?;

    let user_info = client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(&token.access_token)
        .send()
        .await?
        .error_for_status()?
        .json::<GoogleUserInfo>()
        .await?;
    Ok(user_info)
}

#[utoipa::path(
    context_path = "/api/auth",
    tag = "Accounts",
    params(
        ("code" = Option<String>, Query, description = "Authorization code from Google"),
        ("state" = Option<String>, Query, description = "State issued by the login redirect"),
        ("error" = Option<String>, Query, description = "Set when the user declined")
    ),
    responses(
        (status = 302, description = "Redirect to the frontend with a token pair"),
        (status = 400, description = "Declined, or unknown or expired state"),
        (status = 401, description = "Unverified Google email or inactive account"),
        (status = 502, description = "Google could not be reached")
    )
)]
#[get("/google/callback")]
pub async fn google_callback(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<GoogleCallbackQuery>,
) -> Result<impl Responder, AppError> {
    if let Some(reason) = query.error.as_deref() {
        return Err(AppError::validation(format!("Google sign-in failed: {}", reason)));
    }

    let state = query.state.as_deref().unwrap_or_default();
    if app_state.oauth_states.remove(state).await.is_none() {
        warn!("Google callback with unknown or expired state");
        return Err(AppError::validation("Invalid or expired OAuth state"));
    }

    let code = query
        .code
        .as_deref()
        .ok_or_else(|| AppError::validation("Missing authorization code"))?;

    let google_user = exchange_code_for_user(code, &app_state.app_config).await?;
    if !google_user.email_verified {
        return Err(AppError::Unauthorized(
            "Google account email is not verified".to_string(),
        ));
    }

    let user = User::get_or_create_social(
        &app_state.pool,
        &google_user.email,
        google_user.name.as_deref(),
    )
    .await?;
    if !user.is_active {
        return Err(bad_credentials());
    }

    let tokens = issue_token_pair(&user, &app_state.app_config)?;
    let redirect_url = login_success_url(&app_state.app_config.frontend_url, &tokens)?;
    info!("Google login for user {}, redirecting to frontend", user.id);
    Ok(web::Redirect::to(redirect_url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::header::LOCATION, http::StatusCode, test as actix_test, App};

    use crate::test_support::{read_error, test_app_state};

    #[test]
    fn authorize_url_asks_google_for_account_choice() {
        let app_config = AppConfig::for_tests();
        let url = google_authorize_url(&app_config, "abc123").unwrap();
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(url.as_str().starts_with(GOOGLE_AUTHORIZE_URL));
        assert!(params.contains(&("prompt".to_string(), "select_account".to_string())));
        assert!(params.contains(&("access_type".to_string(), "online".to_string())));
        assert!(params.contains(&("scope".to_string(), "openid email profile".to_string())));
        assert!(params.contains(&("state".to_string(), "abc123".to_string())));
        assert!(params.contains(&("client_id".to_string(), "client-id".to_string())));
    }

    #[test]
    fn login_success_url_carries_both_tokens() {
        let tokens = TokenPair {
            access: "acc.ess".to_string(),
            refresh: "ref.resh".to_string(),
        };
        let url = login_success_url("http://127.0.0.1:5173", &tokens).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:5173/login-success?access=acc.ess&refresh=ref.resh"
        );
    }

    #[test]
    fn oauth_states_are_random_hex() {
        let first = new_oauth_state();
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, new_oauth_state());
    }

    #[actix_web::test]
    async fn google_login_remembers_the_state_it_sends() {
        let (app_state, _) = test_app_state();
        let states = app_state.oauth_states.clone();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(app_state))
                .service(web::scope("/api/auth").service(google_login)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/api/auth/google/login").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert!(resp.status().is_redirection());

        let location = resp.headers().get(LOCATION).unwrap().to_str().unwrap();
        let url = Url::parse(location).unwrap();
        let state = url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .unwrap();
        assert!(states.contains_key(&state));
    }

    #[actix_web::test]
    async fn google_callback_rejects_unknown_state() {
        let (app_state, _) = test_app_state();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(app_state))
                .service(web::scope("/api/auth").service(google_callback)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/api/auth/google/callback?code=abc&state=forged")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_error(resp).await, "Invalid or expired OAuth state");
    }

    #[actix_web::test]
    async fn short_password_is_rejected() {
        let (app_state, _) = test_app_state();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(app_state))
                .service(web::scope("/api/auth").service(register)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(serde_json::json!({
                "name": "Asha",
                "email": "asha@example.com",
                "password": "short"
            }))
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn garbage_refresh_token_is_unauthorized() {
        let (app_state, _) = test_app_state();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(app_state))
                .service(web::scope("/api/auth").service(refresh)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(serde_json::json!({"refresh": "not-a-jwt"}))
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }
}
