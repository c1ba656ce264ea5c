use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

use crate::auth::TokenPair;
use crate::models::catalog::{ProductDetail, ProductListing};
use crate::models::order::{OrderDetail, OrderItem, OrderOverview};
use crate::models::rating::{RatingOverview, TechnicianRating};
use crate::models::service::{ServiceCategoryWithIssues, ServiceRequestOverview};
use crate::models::{Address, OrderStatus, ProductCategory, Role, ServiceStatus, User};
use crate::routes::{accounts, addresses, catalog, orders, ratings, services, technician};
use crate::types::common::ActionResponse;
use crate::types::{
    AddressRequest, AddressUpdateRequest, AuthResponse, CreateOrderRequest, CreateRatingRequest,
    CreateServiceRequest, LoginRequest, PaymentQuote, ProfileUpdateRequest, RefreshRequest,
    RefreshResponse, RegisterRequest, SetOrderAddressRequest, TechnicianStats,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        catalog::list_products,
        catalog::get_product,
        catalog::list_categories,
        catalog::list_service_categories,
        orders::create_order,
        orders::set_order_address,
        orders::confirm_order,
        orders::list_orders,
        orders::get_order,
        services::create_service_request,
        services::payment_quote,
        services::confirm_service_request,
        services::service_history,
        ratings::create_rating,
        ratings::my_ratings,
        accounts::register,
        accounts::login,
        accounts::refresh,
        accounts::get_user,
        accounts::get_profile,
        accounts::update_profile,
        accounts::google_login,
        accounts::google_callback,
        technician::assigned_orders,
        technician::assigned_services,
        technician::complete_order,
        technician::complete_service,
        technician::technician_stats,
        addresses::list_addresses,
        addresses::create_address,
        addresses::update_address,
        addresses::delete_address,
    ),
    components(schemas(
        Role,
        User,
        TokenPair,
        AuthResponse,
        RegisterRequest,
        LoginRequest,
        RefreshRequest,
        RefreshResponse,
        ProfileUpdateRequest,
        Address,
        AddressRequest,
        AddressUpdateRequest,
        ProductCategory,
        ProductListing,
        ProductDetail,
        OrderStatus,
        OrderItem,
        OrderOverview,
        OrderDetail,
        CreateOrderRequest,
        SetOrderAddressRequest,
        ServiceStatus,
        ServiceCategoryWithIssues,
        ServiceRequestOverview,
        CreateServiceRequest,
        PaymentQuote,
        TechnicianRating,
        RatingOverview,
        CreateRatingRequest,
        TechnicianStats,
        ActionResponse,
    )),
    tags(
        (name = "Catalog", description = "Products and categories"),
        (name = "Orders", description = "Customer orders"),
        (name = "Services", description = "Service requests"),
        (name = "Ratings", description = "Technician ratings"),
        (name = "Technician", description = "Jobs assigned to the calling technician"),
        (name = "Accounts", description = "Registration, login and profile"),
        (name = "Addresses", description = "Customer addresses"),
    ),
    modifiers(&SecurityAddon),
    info(title = "TechVerse API", version = "0.1.0")
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_public_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/products/{slug}"));
        assert!(doc.paths.paths.contains_key("/services/api/ratings/create"));
        assert!(doc.paths.paths.contains_key("/api/orders/{id}/confirm"));
        assert!(doc.paths.paths.contains_key("/api/users/profile"));
        assert!(doc.paths.paths.contains_key("/api/auth/google/callback"));
        assert!(doc.paths.paths.contains_key("/api/technician/complete-order/{id}"));
        assert!(doc.paths.paths.contains_key("/api/technician/stats"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
