use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::order::OrderOverview;
use crate::models::rating::TechnicianScore;
use crate::models::service::ServiceRequestOverview;
use crate::models::user::{PhoneChange, Role, UserChanges};
use crate::models::{OrderStatus, ServiceStatus};
use crate::types::common::blank_as_none;

#[derive(Serialize, ToSchema)]
pub struct DashboardCounts {
    pub users: i64,
    pub customers: i64,
    pub technicians: i64,
    pub products: i64,
    pub active_products: i64,
    pub orders: i64,
    pub pending_orders: i64,
    pub unassigned_orders: i64,
    pub services: i64,
    pub pending_services: i64,
    pub unassigned_services: i64,
}

#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    pub counts: DashboardCounts,
    pub month_revenue: Decimal,
    pub recent_orders: Vec<OrderOverview>,
    pub recent_services: Vec<ServiceRequestOverview>,
    pub top_technicians: Vec<TechnicianScore>,
}

#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    pub total_users: i64,
    pub total_orders: i64,
    pub pending_orders: i64,
    pub total_revenue: Decimal,
}

#[derive(Serialize, ToSchema)]
pub struct MonthlyPoint {
    /// `YYYY-MM`
    pub month: String,
    pub orders: i64,
    pub revenue: Decimal,
}

#[derive(Deserialize)]
pub struct UserListQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub role: Option<Role>,
    pub search: Option<String>,
    pub page: Option<i64>,
}

#[derive(Deserialize)]
pub struct ProductListQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub category: Option<Uuid>,
    pub search: Option<String>,
    /// `active` or `inactive`
    pub status: Option<String>,
    pub page: Option<i64>,
}

impl ProductListQuery {
    pub fn active(&self) -> Option<bool> {
        match self.status.as_deref() {
            Some("active") => Some(true),
            Some("inactive") => Some(false),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
pub struct OrderListQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status: Option<OrderStatus>,
    pub technician: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
}

#[derive(Deserialize)]
pub struct ServiceListQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status: Option<ServiceStatus>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub category: Option<Uuid>,
    pub technician: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
}

/// Free-text filters arrive as `search=` when the box is left empty.
pub fn search_term(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|term| !term.is_empty())
}

#[derive(Deserialize, ToSchema)]
pub struct AdminUserCreateRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub password: Option<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

#[derive(Deserialize, ToSchema)]
pub struct AdminUserUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub email_notifications: Option<bool>,
    pub sms_notifications: Option<bool>,
}

impl From<AdminUserUpdateRequest> for UserChanges {
    fn from(req: AdminUserUpdateRequest) -> Self {
        UserChanges {
            name: req.name,
            email: req.email,
            phone: PhoneChange::from_input(req.phone),
            role: req.role,
            is_active: req.is_active,
            email_notifications: req.email_notifications,
            sms_notifications: req.sms_notifications,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CategoryRequest {
    pub name: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub slug: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ServiceCategoryRequest {
    pub name: String,
}

/// Body of the back-office order edit form.
#[derive(Deserialize, ToSchema)]
pub struct OrderUpdateRequest {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub technician_id: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct ServiceUpdateRequest {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status: Option<ServiceStatus>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub technician_id: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct AssignRequest {
    pub technician_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct AssignTechnicianRequest {
    pub order_id: Uuid,
    pub technician_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

#[derive(Deserialize, ToSchema)]
pub struct AssignServiceTechnicianRequest {
    pub service_id: Uuid,
    pub technician_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateServiceStatusRequest {
    pub service_id: Uuid,
    pub status: ServiceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::web::Query;

    #[test]
    fn order_filters_accept_blank_dropdowns() {
        let query = Query::<OrderListQuery>::from_query("status=&technician=unassigned&search=&page=2")
            .unwrap();
        assert!(query.status.is_none());
        assert_eq!(query.technician.as_deref(), Some("unassigned"));
        assert_eq!(search_term(query.search.as_deref()), None);
        assert_eq!(query.page, Some(2));

        let query = Query::<OrderListQuery>::from_query("status=SHIPPED").unwrap();
        assert_eq!(query.status, Some(OrderStatus::Shipped));
    }

    #[test]
    fn product_status_filter() {
        let active = Query::<ProductListQuery>::from_query("status=active").unwrap();
        assert_eq!(active.active(), Some(true));
        let any = Query::<ProductListQuery>::from_query("status=").unwrap();
        assert_eq!(any.active(), None);
    }

    #[test]
    fn order_edit_form_may_leave_fields_blank() {
        let body: OrderUpdateRequest =
            serde_json::from_str(r#"{"status": "DELIVERED", "technician_id": ""}"#).unwrap();
        assert_eq!(body.status, Some(OrderStatus::Delivered));
        assert!(body.technician_id.is_none());
    }
}
