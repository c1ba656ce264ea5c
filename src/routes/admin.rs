use actix_web::{delete, get, patch, post, put, web, Either, HttpResponse, Responder};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::hash_password;
use crate::error::AppError;
use crate::middleware::auth::StaffUser;
use crate::models::catalog::{ProductDraft, ProductFilter};
use crate::models::service::ServiceFilter;
use crate::models::{
    Order, Product, ProductCategory, Role, ServiceCategory, ServiceRequest, TechnicianRating, User,
};
use crate::routes::orders::load_detail;
use crate::routes::services::load_overview;
use crate::types::common::{
    calendar_months, month_start, ActionResponse, Page, Pagination, TechnicianFilter,
};
use crate::types::{
    search_term, AdminUserCreateRequest, AdminUserUpdateRequest, AssignRequest,
    AssignServiceTechnicianRequest, AssignTechnicianRequest, CategoryRequest, DashboardCounts,
    DashboardResponse, MonthlyPoint, OrderListQuery, OrderUpdateRequest, ProductListQuery,
    ServiceCategoryRequest, ServiceListQuery, ServiceUpdateRequest, StatsResponse,
    UpdateOrderStatusRequest, UpdateServiceStatusRequest, UserListQuery,
};
use crate::models::{OrderStatus, ServiceStatus};
use crate::AppState;

const RECENT_LIMIT: i64 = 10;
const TOP_TECHNICIANS: i64 = 5;
const ANALYTICS_MONTHS: usize = 12;

/// Back-office forms post url-encoded bodies, scripts post JSON.
type FormOrJson<T> = Either<web::Json<T>, web::Form<T>>;

fn into_body<T>(payload: FormOrJson<T>) -> T {
    match payload {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    }
}

async fn require_technician(app_state: &AppState, id: Uuid) -> Result<User, AppError> {
    User::get_technician(&app_state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Technician"))
}

async fn require_order(app_state: &AppState, id: Uuid) -> Result<Order, AppError> {
    Order::get(&app_state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))
}

async fn require_service(app_state: &AppState, id: Uuid) -> Result<ServiceRequest, AppError> {
    ServiceRequest::get(&app_state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Service request"))
}

#[get("/dashboard")]
pub async fn dashboard(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
) -> Result<impl Responder, AppError> {
    let pool = &app_state.pool;
    let counts = DashboardCounts {
        users: User::count(pool, None).await?,
        customers: User::count(pool, Some(Role::Customer)).await?,
        technicians: User::count(pool, Some(Role::Technician)).await?,
        products: Product::count(pool, false).await?,
        active_products: Product::count(pool, true).await?,
        orders: Order::count(pool, None).await?,
        pending_orders: Order::count(pool, Some(OrderStatus::Pending)).await?,
        unassigned_orders: Order::count_unassigned(pool).await?,
        services: ServiceRequest::count(pool, None).await?,
        pending_services: ServiceRequest::count(pool, Some(ServiceStatus::Submitted)).await?,
        unassigned_services: ServiceRequest::count_unassigned(pool).await?,
    };

    let month_revenue = Order::revenue(pool, Some(month_start(Utc::now())), None).await?;

    Ok(HttpResponse::Ok().json(DashboardResponse {
        counts,
        month_revenue,
        recent_orders: Order::recent(pool, RECENT_LIMIT).await?,
        recent_services: ServiceRequest::recent(pool, RECENT_LIMIT).await?,
        top_technicians: TechnicianRating::top_technicians(pool, TOP_TECHNICIANS).await?,
    }))
}

#[get("/stats")]
pub async fn stats(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
) -> Result<impl Responder, AppError> {
    let pool = &app_state.pool;
    Ok(HttpResponse::Ok().json(StatsResponse {
        total_users: User::count(pool, None).await?,
        total_orders: Order::count(pool, None).await?,
        pending_orders: Order::count(pool, Some(OrderStatus::Pending)).await?,
        total_revenue: Order::revenue(pool, None, None).await?,
    }))
}

#[get("/analytics")]
pub async fn analytics(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
) -> Result<impl Responder, AppError> {
    let mut points = Vec::with_capacity(ANALYTICS_MONTHS);
    for (start, end) in calendar_months(Utc::now(), ANALYTICS_MONTHS) {
        points.push(MonthlyPoint {
            month: start.format("%Y-%m").to_string(),
            orders: Order::count_between(&app_state.pool, start, end).await?,
            revenue: Order::revenue(&app_state.pool, Some(start), Some(end)).await?,
        });
    }
    Ok(HttpResponse::Ok().json(points))
}

// Users

#[get("/users")]
pub async fn list_users(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    query: web::Query<UserListQuery>,
) -> Result<impl Responder, AppError> {
    let pagination = Pagination::new(query.page);
    let (users, total) = User::search(
        &app_state.pool,
        query.role,
        search_term(query.search.as_deref()),
        &pagination,
    )
    .await?;
    Ok(HttpResponse::Ok().json(Page::new(users, total, &pagination)))
}

#[get("/technicians")]
pub async fn list_technicians(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
) -> Result<impl Responder, AppError> {
    let technicians = User::list_technicians(&app_state.pool).await?;
    Ok(HttpResponse::Ok().json(technicians))
}

#[post("/users")]
pub async fn create_user(
    app_state: web::Data<Arc<AppState>>,
    staff: StaffUser,
    req_body: web::Json<AdminUserCreateRequest>,
) -> Result<impl Responder, AppError> {
    let req_body = req_body.into_inner();
    if req_body.name.trim().is_empty() || !req_body.email.contains('@') {
        return Err(AppError::validation("A name and a valid email are required"));
    }
    if User::get_by_email(&app_state.pool, &req_body.email).await?.is_some() {
        return Err(AppError::Conflict(
            "A user with this email already exists".to_string(),
        ));
    }

    let password_hash = match req_body.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };
    let new_user = User {
        phone: req_body.phone,
        role: req_body.role,
        is_active: req_body.is_active,
        password_hash,
        ..User::new(req_body.name.trim(), &req_body.email)
    };
    let user = User::create(&app_state.pool, &new_user).await?;

    info!("Admin {} created user {} as {:?}", staff.0.user_id, user.id, user.role);
    Ok(HttpResponse::Created().json(user))
}

#[patch("/users/{id}")]
pub async fn update_user(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
    req_body: web::Json<AdminUserUpdateRequest>,
) -> Result<impl Responder, AppError> {
    User::get_by_id(&app_state.pool, *id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    let user = User::update(&app_state.pool, *id, req_body.into_inner().into()).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[delete("/users/{id}")]
pub async fn delete_user(
    app_state: web::Data<Arc<AppState>>,
    staff: StaffUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let user = User::get_by_id(&app_state.pool, *id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    if user.is_superuser {
        return Err(AppError::Forbidden(
            "Superuser accounts cannot be deleted".to_string(),
        ));
    }

    User::delete(&app_state.pool, user.id).await?;
    info!("Admin {} deleted user {}", staff.0.user_id, user.id);
    Ok(HttpResponse::Ok().json(ActionResponse::ok(format!("User {} deleted", user.email))))
}

// Products

#[get("/products")]
pub async fn list_products(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    query: web::Query<ProductListQuery>,
) -> Result<impl Responder, AppError> {
    let pagination = Pagination::new(query.page);
    let filter = ProductFilter {
        category: query.category,
        search: search_term(query.search.as_deref()),
        active: query.active(),
    };
    let (products, total) = Product::search(&app_state.pool, &filter, &pagination).await?;
    Ok(HttpResponse::Ok().json(Page::new(products, total, &pagination)))
}

#[get("/products/{id}")]
pub async fn get_product(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let product = Product::get(&app_state.pool, *id)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;
    let detail = Product::detail(&app_state.pool, product).await?;
    Ok(HttpResponse::Ok().json(detail))
}

async fn require_category(app_state: &AppState, draft: &ProductDraft) -> Result<(), AppError> {
    ProductCategory::get(&app_state.pool, draft.category_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::validation("Select an existing category"))
}

#[post("/products")]
pub async fn create_product(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    req_body: web::Json<ProductDraft>,
) -> Result<impl Responder, AppError> {
    req_body.validate()?;
    require_category(&app_state, &req_body).await?;

    let product = Product::create(&app_state.pool, &req_body).await?;
    let detail = Product::detail(&app_state.pool, product).await?;
    Ok(HttpResponse::Created().json(detail))
}

#[put("/products/{id}")]
pub async fn update_product(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
    req_body: web::Json<ProductDraft>,
) -> Result<impl Responder, AppError> {
    req_body.validate()?;
    require_category(&app_state, &req_body).await?;

    let product = Product::update(&app_state.pool, *id, &req_body).await?;
    let detail = Product::detail(&app_state.pool, product).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[delete("/products/{id}")]
pub async fn delete_product(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    if Product::delete(&app_state.pool, *id).await? == 0 {
        return Err(AppError::not_found("Product"));
    }
    Ok(HttpResponse::Ok().json(ActionResponse::ok("Product deleted")))
}

// Categories

#[get("/categories")]
pub async fn list_categories(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
) -> Result<impl Responder, AppError> {
    let categories = ProductCategory::list(&app_state.pool).await?;
    Ok(HttpResponse::Ok().json(categories))
}

#[post("/categories")]
pub async fn create_category(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    payload: FormOrJson<CategoryRequest>,
) -> Result<impl Responder, AppError> {
    let body = into_body(payload);
    let category = ProductCategory::create(&app_state.pool, &body.name, body.slug.as_deref()).await?;
    Ok(HttpResponse::Created().json(category))
}

#[patch("/categories/{id}")]
pub async fn update_category(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
    payload: FormOrJson<CategoryRequest>,
) -> Result<impl Responder, AppError> {
    let body = into_body(payload);
    if body.name.trim().is_empty() {
        return Err(AppError::validation("Category name is required"));
    }
    let category =
        ProductCategory::update(&app_state.pool, *id, Some(body.name.trim()), body.slug.as_deref())
            .await?;
    Ok(HttpResponse::Ok().json(category))
}

#[delete("/categories/{id}")]
pub async fn delete_category(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    if ProductCategory::delete(&app_state.pool, *id).await? == 0 {
        return Err(AppError::not_found("Category"));
    }
    Ok(HttpResponse::Ok().json(ActionResponse::ok("Category deleted")))
}

#[get("/service-categories")]
pub async fn list_service_categories(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
) -> Result<impl Responder, AppError> {
    let categories = ServiceCategory::list_with_issues(&app_state.pool).await?;
    Ok(HttpResponse::Ok().json(categories))
}

#[post("/service-categories")]
pub async fn create_service_category(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    payload: FormOrJson<ServiceCategoryRequest>,
) -> Result<impl Responder, AppError> {
    let body = into_body(payload);
    if body.name.trim().is_empty() {
        return Err(AppError::validation("Category name is required"));
    }
    let category = ServiceCategory::create(&app_state.pool, body.name.trim()).await?;
    Ok(HttpResponse::Created().json(category))
}

#[patch("/service-categories/{id}")]
pub async fn update_service_category(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
    payload: FormOrJson<ServiceCategoryRequest>,
) -> Result<impl Responder, AppError> {
    let body = into_body(payload);
    if body.name.trim().is_empty() {
        return Err(AppError::validation("Category name is required"));
    }
    let category = ServiceCategory::rename(&app_state.pool, *id, body.name.trim()).await?;
    Ok(HttpResponse::Ok().json(category))
}

#[delete("/service-categories/{id}")]
pub async fn delete_service_category(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    if ServiceCategory::delete(&app_state.pool, *id).await? == 0 {
        return Err(AppError::not_found("Service category"));
    }
    Ok(HttpResponse::Ok().json(ActionResponse::ok("Service category deleted")))
}

// Orders

#[get("/orders")]
pub async fn list_orders(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    query: web::Query<OrderListQuery>,
) -> Result<impl Responder, AppError> {
    let pagination = Pagination::new(query.page);
    let (overviews, total) = Order::search(
        &app_state.pool,
        query.status,
        TechnicianFilter::parse(query.technician.as_deref()),
        search_term(query.search.as_deref()),
        &pagination,
    )
    .await?;
    let orders = Order::details(&app_state.pool, overviews).await?;
    Ok(HttpResponse::Ok().json(Page::new(orders, total, &pagination)))
}

#[get("/orders/{id}")]
pub async fn get_order(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let detail = load_detail(&app_state, *id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Status is applied before the technician, so the assignment rule sees the new status.
#[post("/orders/{id}")]
pub async fn update_order(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
    payload: FormOrJson<OrderUpdateRequest>,
) -> Result<impl Responder, AppError> {
    let body = into_body(payload);
    let order = require_order(&app_state, *id).await?;
    let technician = match body.technician_id {
        Some(technician_id) => Some(require_technician(&app_state, technician_id).await?),
        None => None,
    };

    if let Some(status) = body.status {
        Order::set_status(&app_state.pool, order.id, status).await?;
    }
    if let Some(technician) = technician {
        Order::assign_technician(&app_state.pool, order.id, technician.id).await?;
    }

    let detail = load_detail(&app_state, order.id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[post("/orders/{id}/assign")]
pub async fn assign_order(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
    payload: FormOrJson<AssignRequest>,
) -> Result<impl Responder, AppError> {
    let body = into_body(payload);
    let order = require_order(&app_state, *id).await?;
    let technician = require_technician(&app_state, body.technician_id).await?;

    Order::assign_technician(&app_state.pool, order.id, technician.id).await?;
    let detail = load_detail(&app_state, order.id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[delete("/orders/{id}")]
pub async fn delete_order(
    app_state: web::Data<Arc<AppState>>,
    staff: StaffUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    if Order::delete(&app_state.pool, *id).await? == 0 {
        return Err(AppError::not_found("Order"));
    }
    info!("Admin {} deleted order {}", staff.0.user_id, id);
    Ok(HttpResponse::Ok().json(ActionResponse::ok(format!("Order {} deleted", id))))
}

// Service requests

#[get("/services")]
pub async fn list_services(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    query: web::Query<ServiceListQuery>,
) -> Result<impl Responder, AppError> {
    let pagination = Pagination::new(query.page);
    let filter = ServiceFilter {
        status: query.status,
        category: query.category,
        technician: TechnicianFilter::parse(query.technician.as_deref()),
        search: search_term(query.search.as_deref()),
    };
    let (services, total) = ServiceRequest::search(&app_state.pool, &filter, &pagination).await?;
    Ok(HttpResponse::Ok().json(Page::new(services, total, &pagination)))
}

#[get("/services/{id}")]
pub async fn get_service(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let overview = load_overview(&app_state, *id).await?;
    Ok(HttpResponse::Ok().json(overview))
}

#[post("/services/{id}")]
pub async fn update_service(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
    payload: FormOrJson<ServiceUpdateRequest>,
) -> Result<impl Responder, AppError> {
    let body = into_body(payload);
    let service = require_service(&app_state, *id).await?;
    let technician = match body.technician_id {
        Some(technician_id) => Some(require_technician(&app_state, technician_id).await?),
        None => None,
    };

    if let Some(status) = body.status {
        ServiceRequest::set_status(&app_state.pool, service.id, status).await?;
    }
    if let Some(technician) = technician {
        ServiceRequest::assign_technician(&app_state.pool, service.id, technician.id).await?;
    }

    let overview = load_overview(&app_state, service.id).await?;
    Ok(HttpResponse::Ok().json(overview))
}

#[post("/services/{id}/assign")]
pub async fn assign_service(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    id: web::Path<Uuid>,
    payload: FormOrJson<AssignRequest>,
) -> Result<impl Responder, AppError> {
    let body = into_body(payload);
    let service = require_service(&app_state, *id).await?;
    let technician = require_technician(&app_state, body.technician_id).await?;

    ServiceRequest::assign_technician(&app_state.pool, service.id, technician.id).await?;
    let overview = load_overview(&app_state, service.id).await?;
    Ok(HttpResponse::Ok().json(overview))
}

#[delete("/services/{id}")]
pub async fn delete_service(
    app_state: web::Data<Arc<AppState>>,
    staff: StaffUser,
    id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    if ServiceRequest::delete(&app_state.pool, *id).await? == 0 {
        return Err(AppError::not_found("Service request"));
    }
    info!("Admin {} deleted service request {}", staff.0.user_id, id);
    Ok(HttpResponse::Ok().json(ActionResponse::ok(format!(
        "Service request {} deleted",
        id
    ))))
}

// JSON actions used by the dashboard widgets

#[post("/assign-technician")]
pub async fn assign_technician_api(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    req_body: web::Json<AssignTechnicianRequest>,
) -> Result<impl Responder, AppError> {
    let order = require_order(&app_state, req_body.order_id).await?;
    let technician = require_technician(&app_state, req_body.technician_id).await?;
    Order::assign_technician(&app_state.pool, order.id, technician.id).await?;
    Ok(HttpResponse::Ok().json(ActionResponse::ok("Technician assigned successfully")))
}

#[post("/update-order-status")]
pub async fn update_order_status_api(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    req_body: web::Json<UpdateOrderStatusRequest>,
) -> Result<impl Responder, AppError> {
    let order = require_order(&app_state, req_body.order_id).await?;
    Order::set_status(&app_state.pool, order.id, req_body.status).await?;
    Ok(HttpResponse::Ok().json(ActionResponse::ok("Order status updated successfully")))
}

#[post("/assign-service-technician")]
pub async fn assign_service_technician_api(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    req_body: web::Json<AssignServiceTechnicianRequest>,
) -> Result<impl Responder, AppError> {
    let service = require_service(&app_state, req_body.service_id).await?;
    let technician = require_technician(&app_state, req_body.technician_id).await?;
    ServiceRequest::assign_technician(&app_state.pool, service.id, technician.id).await?;
    Ok(HttpResponse::Ok().json(ActionResponse::ok("Technician assigned successfully")))
}

#[post("/update-service-status")]
pub async fn update_service_status_api(
    app_state: web::Data<Arc<AppState>>,
    _staff: StaffUser,
    req_body: web::Json<UpdateServiceStatusRequest>,
) -> Result<impl Responder, AppError> {
    let service = require_service(&app_state, req_body.service_id).await?;
    ServiceRequest::set_status(&app_state.pool, service.id, req_body.status).await?;
    Ok(HttpResponse::Ok().json(ActionResponse::ok("Service status updated successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};

    use crate::test_support::{bearer, test_app_state};

    #[actix_web::test]
    async fn back_office_is_staff_only() {
        let (app_state, authentication) = test_app_state();
        let customer = bearer(Role::Customer, &app_state.app_config);
        let technician = bearer(Role::Technician, &app_state.app_config);
        let app = test::init_service(
            App::new().app_data(web::Data::new(app_state)).service(
                web::scope("/admin/api")
                    .wrap(authentication)
                    .service(dashboard)
                    .service(delete_order),
            ),
        )
        .await;

        let req = test::TestRequest::get().uri("/admin/api/dashboard").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        for token in [customer, technician] {
            let req = test::TestRequest::get()
                .uri("/admin/api/dashboard")
                .insert_header(("Authorization", token.clone()))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

            let req = test::TestRequest::delete()
                .uri(&format!("/admin/api/orders/{}", Uuid::new_v4()))
                .insert_header(("Authorization", token))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
        }
    }

    #[actix_web::test]
    async fn unknown_status_in_edit_form_is_a_bad_request() {
        let (app_state, authentication) = test_app_state();
        let admin = bearer(Role::Admin, &app_state.app_config);
        let app = test::init_service(
            App::new().app_data(web::Data::new(app_state)).service(
                web::scope("/admin/api")
                    .wrap(authentication)
                    .service(update_order),
            ),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/admin/api/orders/{}", Uuid::new_v4()))
            .insert_header(("Authorization", admin))
            .set_form([("status", "LOST"), ("technician_id", "")])
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
