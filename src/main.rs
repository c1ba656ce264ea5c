use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{get, web};
use anyhow::Context;
use moka::future::Cache;
use shuttle_actix_web::ShuttleActixWeb;
use shuttle_runtime::SecretStore;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

mod auth;
mod config;
mod docs;
mod error;
mod middleware;
mod models;
mod routes;
mod slug;
mod types;

use config::AppConfig;
use docs::ApiDoc;
use middleware::auth::Authentication;
use routes::{accounts, addresses, admin, catalog, orders, ratings, services, technician};

const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);

pub struct AppState {
    pub pool: PgPool,
    pub app_config: Arc<AppConfig>,
    /// Google OAuth `state` values handed out by the login redirect.
    pub oauth_states: Cache<String, ()>,
}

impl AppState {
    fn new(pool: PgPool, app_config: Arc<AppConfig>) -> Self {
        AppState {
            pool,
            app_config,
            oauth_states: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(OAUTH_STATE_TTL)
                .build(),
        }
    }
}

#[get("/")]
async fn health() -> &'static str {
    "ok"
}

#[shuttle_runtime::main]
async fn main(
    #[shuttle_runtime::Secrets] secret_store: SecretStore,
) -> ShuttleActixWeb<impl FnOnce(&mut web::ServiceConfig) + Send + Clone + 'static> {
    let app_config = Arc::new(AppConfig::new(&secret_store)?);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&app_config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Database ready");

    let app_state = Arc::new(AppState::new(pool, app_config.clone()));

    let config = move |cfg: &mut web::ServiceConfig| {
        let authentication = || Authentication {
            app_config: app_config.clone(),
        };
        let cors = Cors::default()
            .allowed_origin(&app_config.frontend_url)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        cfg.app_data(web::Data::new(app_state.clone()))
            .service(health)
            .service(Scalar::with_url("/docs", ApiDoc::openapi()))
            .service(
                web::scope("")
                    .wrap(cors)
                    .service(
                        web::scope("/api/auth")
                            .wrap(authentication())
                            .service(accounts::register)
                            .service(accounts::login)
                            .service(accounts::refresh)
                            .service(accounts::get_user)
                            .service(accounts::google_login)
                            .service(accounts::google_callback),
                    )
                    .service(
                        web::scope("/api/users")
                            .wrap(authentication())
                            .service(accounts::get_profile)
                            .service(accounts::update_profile),
                    )
                    .service(
                        web::scope("/api/addresses")
                            .wrap(authentication())
                            .service(addresses::list_addresses)
                            .service(addresses::create_address)
                            .service(addresses::update_address)
                            .service(addresses::delete_address),
                    )
                    .service(
                        web::scope("/api/orders")
                            .wrap(authentication())
                            .service(orders::create_order)
                            .service(orders::set_order_address)
                            .service(orders::confirm_order)
                            .service(orders::list_orders)
                            .service(orders::get_order),
                    )
                    .service(
                        web::scope("/api/technician")
                            .wrap(authentication())
                            .service(technician::assigned_orders)
                            .service(technician::assigned_services)
                            .service(technician::complete_order)
                            .service(technician::complete_service)
                            .service(technician::technician_stats),
                    )
                    // Registered after the more specific /api scopes
                    .service(
                        web::scope("/api")
                            .service(catalog::list_products)
                            .service(catalog::get_product)
                            .service(catalog::list_categories),
                    )
                    .service(
                        web::scope("/services/api")
                            .wrap(authentication())
                            .service(catalog::list_service_categories)
                            .service(services::service_history)
                            .service(services::create_service_request)
                            .service(services::payment_quote)
                            .service(services::confirm_service_request)
                            .service(ratings::create_rating)
                            .service(ratings::my_ratings),
                    )
                    .service(
                        web::scope("/admin/api")
                            .wrap(authentication())
                            .service(admin::dashboard)
                            .service(admin::stats)
                            .service(admin::analytics)
                            .service(admin::list_users)
                            .service(admin::create_user)
                            .service(admin::update_user)
                            .service(admin::delete_user)
                            .service(admin::list_technicians)
                            .service(admin::list_products)
                            .service(admin::get_product)
                            .service(admin::create_product)
                            .service(admin::update_product)
                            .service(admin::delete_product)
                            .service(admin::list_categories)
                            .service(admin::create_category)
                            .service(admin::update_category)
                            .service(admin::delete_category)
                            .service(admin::list_service_categories)
                            .service(admin::create_service_category)
                            .service(admin::update_service_category)
                            .service(admin::delete_service_category)
                            .service(admin::list_orders)
                            .service(admin::get_order)
                            .service(admin::update_order)
                            .service(admin::assign_order)
                            .service(admin::delete_order)
                            .service(admin::list_services)
                            .service(admin::get_service)
                            .service(admin::update_service)
                            .service(admin::assign_service)
                            .service(admin::delete_service)
                            .service(admin::assign_technician_api)
                            .service(admin::update_order_status_api)
                            .service(admin::assign_service_technician_api)
                            .service(admin::update_service_status_api),
                    ),
            );
    };

    Ok(config.into())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use actix_web::body::MessageBody;
    use actix_web::dev::ServiceResponse;
    use sqlx::postgres::PgPoolOptions;

    use crate::auth::issue_token_pair;
    use crate::config::AppConfig;
    use crate::middleware::auth::Authentication;
    use crate::models::{Role, User};
    use crate::AppState;

    /// State backed by a pool that never connects unless a query runs.
    pub fn test_app_state() -> (Arc<AppState>, Authentication) {
        let app_config = Arc::new(AppConfig::for_tests());
        let pool = PgPoolOptions::new()
            .connect_lazy(&app_config.database_url)
            .expect("lazy pool");
        let authentication = Authentication {
            app_config: app_config.clone(),
        };
        (Arc::new(AppState::new(pool, app_config)), authentication)
    }

    pub fn bearer(role: Role, app_config: &AppConfig) -> String {
        let user = User {
            role,
            ..User::new("Test User", "test@example.com")
        };
        let tokens = issue_token_pair(&user, app_config).expect("token pair");
        format!("Bearer {}", tokens.access)
    }

    pub async fn read_error<B: MessageBody>(resp: ServiceResponse<B>) -> String {
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        body["error"].as_str().unwrap_or_default().to_string()
    }
}
