use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::rating::NewRating;

#[derive(Deserialize, ToSchema)]
pub struct CreateServiceRequest {
    pub service_category: Uuid,
    pub issue: Option<Uuid>,
    #[serde(default)]
    pub custom_description: String,
    pub service_location: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct PaymentQuote {
    pub service_request_id: Uuid,
    pub amount: Decimal,
    pub payment_required: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateRatingRequest {
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
    pub order_id: Option<Uuid>,
    pub service_request_id: Option<Uuid>,
}

impl From<CreateRatingRequest> for NewRating {
    fn from(req: CreateRatingRequest) -> Self {
        NewRating {
            rating: req.rating,
            comment: req.comment,
            order_id: req.order_id,
            service_request_id: req.service_request_id,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TechnicianStats {
    pub total_orders: i64,
    pub completed_orders: i64,
    pub total_services: i64,
    pub completed_services: i64,
    pub average_rating: Option<f64>,
    pub completed_this_month: i64,
}
