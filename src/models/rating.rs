use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::Order;
use crate::models::service::ServiceRequest;

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct TechnicianRating {
    pub id: Uuid,
    pub technician_id: Uuid,
    pub customer_id: Uuid,
    pub order_id: Option<Uuid>,
    pub service_request_id: Option<Uuid>,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct RatingOverview {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub rating: TechnicianRating,
    pub technician_name: String,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct TechnicianScore {
    pub technician_id: Uuid,
    pub name: String,
    pub email: String,
    pub average_rating: f64,
    pub rating_count: i64,
}

/// The one job a rating is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingTarget {
    Order(Uuid),
    ServiceRequest(Uuid),
}

impl RatingTarget {
    pub fn from_ids(
        order_id: Option<Uuid>,
        service_request_id: Option<Uuid>,
    ) -> Result<Self, RatingRejection> {
        match (order_id, service_request_id) {
            (Some(id), None) => Ok(RatingTarget::Order(id)),
            (None, Some(id)) => Ok(RatingTarget::ServiceRequest(id)),
            _ => Err(RatingRejection::TargetCount),
        }
    }

    fn ids(self) -> (Option<Uuid>, Option<Uuid>) {
        match self {
            RatingTarget::Order(id) => (Some(id), None),
            RatingTarget::ServiceRequest(id) => (None, Some(id)),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RatingRejection {
    #[error("Rating must be between 1 and 5")]
    ScoreOutOfRange,
    #[error("Provide exactly one of order_id or service_request_id")]
    TargetCount,
    #[error("Job not found")]
    JobNotFound,
    #[error("No technician was assigned to this job")]
    NoTechnician,
    #[error("Only delivered orders or completed services can be rated")]
    NotFinished,
    #[error("This job has already been rated")]
    AlreadyRated,
}

impl From<RatingRejection> for AppError {
    fn from(rejection: RatingRejection) -> Self {
        match rejection {
            RatingRejection::JobNotFound => AppError::NotFound(rejection.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

pub fn validate_score(score: i32) -> Result<(), RatingRejection> {
    if (MIN_SCORE..=MAX_SCORE).contains(&score) {
        Ok(())
    } else {
        Err(RatingRejection::ScoreOutOfRange)
    }
}

/// What the eligibility check needs to know about a job.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub customer_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub rateable: bool,
    pub already_rated: bool,
}

impl From<(&Order, bool)> for JobSnapshot {
    fn from((order, already_rated): (&Order, bool)) -> Self {
        JobSnapshot {
            customer_id: order.customer_id,
            technician_id: order.technician_id,
            rateable: order.status.is_rateable(),
            already_rated,
        }
    }
}

impl From<(&ServiceRequest, bool)> for JobSnapshot {
    fn from((request, already_rated): (&ServiceRequest, bool)) -> Self {
        JobSnapshot {
            customer_id: Some(request.customer_id),
            technician_id: request.technician_id,
            rateable: request.status.is_rateable(),
            already_rated,
        }
    }
}

/// Returns the technician to credit, or the first rule the job breaks.
/// A job that belongs to someone else looks the same as a missing one.
pub fn check_eligibility(
    job: Option<&JobSnapshot>,
    requester: Uuid,
) -> Result<Uuid, RatingRejection> {
    let job = match job {
        Some(job) if job.customer_id == Some(requester) => job,
        _ => return Err(RatingRejection::JobNotFound),
    };
    let technician_id = job.technician_id.ok_or(RatingRejection::NoTechnician)?;
    if !job.rateable {
        return Err(RatingRejection::NotFinished);
    }
    if job.already_rated {
        return Err(RatingRejection::AlreadyRated);
    }
    Ok(technician_id)
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub rating: i32,
    pub comment: String,
    pub order_id: Option<Uuid>,
    pub service_request_id: Option<Uuid>,
}

impl TechnicianRating {
    async fn snapshot(
        pool: &PgPool,
        target: RatingTarget,
    ) -> Result<Option<JobSnapshot>, sqlx::Error> {
        match target {
            RatingTarget::Order(id) => {
                let Some(order) = Order::get(pool, id).await? else {
                    return Ok(None);
                };
                let rated: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM technician_ratings WHERE order_id = $1)",
                )
                .bind(id)
                .fetch_one(pool)
                .await?;
                Ok(Some(JobSnapshot::from((&order, rated))))
            }
            RatingTarget::ServiceRequest(id) => {
                let Some(request) = ServiceRequest::get(pool, id).await? else {
                    return Ok(None);
                };
                let rated: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM technician_ratings WHERE service_request_id = $1)",
                )
                .bind(id)
                .fetch_one(pool)
                .await?;
                Ok(Some(JobSnapshot::from((&request, rated))))
            }
        }
    }

    /// Runs every rating rule in order and writes the row only if all pass.
    pub async fn submit(
        pool: &PgPool,
        requester: Uuid,
        new_rating: NewRating,
    ) -> Result<Self, AppError> {
        validate_score(new_rating.rating)?;
        let target = RatingTarget::from_ids(new_rating.order_id, new_rating.service_request_id)?;

        let job = TechnicianRating::snapshot(pool, target).await?;
        let technician_id = check_eligibility(job.as_ref(), requester).map_err(|rejection| {
            warn!("Rating by {} on {:?} rejected: {}", requester, target, rejection);
            rejection
        })?;

        let (order_id, service_request_id) = target.ids();
        let rating = sqlx::query_as::<_, TechnicianRating>(
            r#"
            INSERT INTO technician_ratings (id, technician_id, customer_id, order_id,
                                            service_request_id, rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(technician_id)
        .bind(requester)
        .bind(order_id)
        .bind(service_request_id)
        .bind(new_rating.rating)
        .bind(new_rating.comment.trim())
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(RatingRejection::AlreadyRated.to_string())
            }
            other => AppError::from(other),
        })?;

        info!(
            "Technician {} rated {} by customer {}",
            technician_id, rating.rating, requester
        );
        Ok(rating)
    }

    pub async fn list_for_customer(
        pool: &PgPool,
        customer_id: Uuid,
    ) -> Result<Vec<RatingOverview>, sqlx::Error> {
        sqlx::query_as::<_, RatingOverview>(
            r#"
            SELECT r.*, t.name AS technician_name
            FROM technician_ratings r
            JOIN users t ON t.id = r.technician_id
            WHERE r.customer_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(pool)
        .await
    }

    pub async fn average_for_technician(
        pool: &PgPool,
        technician_id: Uuid,
    ) -> Result<Option<f64>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT AVG(rating)::float8 FROM technician_ratings WHERE technician_id = $1",
        )
        .bind(technician_id)
        .fetch_one(pool)
        .await
    }

    pub async fn top_technicians(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<TechnicianScore>, sqlx::Error> {
        sqlx::query_as::<_, TechnicianScore>(
            r#"
            SELECT t.id AS technician_id, t.name, t.email,
                   AVG(r.rating)::float8 AS average_rating, COUNT(r.id) AS rating_count
            FROM technician_ratings r
            JOIN users t ON t.id = r.technician_id
            GROUP BY t.id, t.name, t.email
            ORDER BY average_rating DESC, rating_count DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{total_amount, OrderItem, OrderStatus};
    use crate::models::service::ServiceStatus;

    fn finished_job(customer: Uuid, technician: Uuid) -> JobSnapshot {
        JobSnapshot {
            customer_id: Some(customer),
            technician_id: Some(technician),
            rateable: true,
            already_rated: false,
        }
    }

    #[test]
    fn score_bounds_are_inclusive() {
        assert_eq!(validate_score(0), Err(RatingRejection::ScoreOutOfRange));
        assert!(validate_score(1).is_ok());
        assert!(validate_score(5).is_ok());
        assert_eq!(validate_score(6), Err(RatingRejection::ScoreOutOfRange));
    }

    #[test]
    fn exactly_one_target_is_required() {
        let id = Uuid::new_v4();
        assert_eq!(RatingTarget::from_ids(Some(id), None), Ok(RatingTarget::Order(id)));
        assert_eq!(
            RatingTarget::from_ids(None, Some(id)),
            Ok(RatingTarget::ServiceRequest(id))
        );
        assert_eq!(RatingTarget::from_ids(None, None), Err(RatingRejection::TargetCount));
        assert_eq!(
            RatingTarget::from_ids(Some(id), Some(id)),
            Err(RatingRejection::TargetCount)
        );
    }

    #[test]
    fn someone_elses_job_is_reported_missing() {
        let job = finished_job(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            check_eligibility(Some(&job), Uuid::new_v4()),
            Err(RatingRejection::JobNotFound)
        );
        assert_eq!(check_eligibility(None, Uuid::new_v4()), Err(RatingRejection::JobNotFound));
    }

    #[test]
    fn rules_are_checked_in_order() {
        let customer = Uuid::new_v4();
        let mut job = finished_job(customer, Uuid::new_v4());
        job.technician_id = None;
        job.rateable = false;
        job.already_rated = true;
        assert_eq!(check_eligibility(Some(&job), customer), Err(RatingRejection::NoTechnician));

        job.technician_id = Some(Uuid::new_v4());
        assert_eq!(check_eligibility(Some(&job), customer), Err(RatingRejection::NotFinished));

        job.rateable = true;
        assert_eq!(check_eligibility(Some(&job), customer), Err(RatingRejection::AlreadyRated));
    }

    #[test]
    fn rejections_map_to_http_errors() {
        assert!(matches!(AppError::from(RatingRejection::JobNotFound), AppError::NotFound(_)));
        assert!(matches!(
            AppError::from(RatingRejection::ScoreOutOfRange),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn completed_service_snapshot_is_rateable() {
        let customer = Uuid::new_v4();
        let technician = Uuid::new_v4();
        let mut request = ServiceRequest {
            id: Uuid::new_v4(),
            customer_id: customer,
            technician_id: None,
            service_category_id: Uuid::new_v4(),
            issue_id: None,
            custom_description: "Laptop will not boot".to_string(),
            service_location_id: None,
            status: ServiceStatus::Submitted,
            request_date: Utc::now(),
        };

        request.status = request.status.after_technician_assigned();
        request.technician_id = Some(technician);
        assert_eq!(request.status, ServiceStatus::Assigned);
        let early = JobSnapshot::from((&request, false));
        assert_eq!(check_eligibility(Some(&early), customer), Err(RatingRejection::NotFinished));

        request.status = ServiceStatus::Completed;
        let done = JobSnapshot::from((&request, false));
        assert_eq!(check_eligibility(Some(&done), customer), Ok(technician));
    }

    #[test]
    fn order_lifecycle_ends_in_a_single_rating() {
        let customer = Uuid::new_v4();
        let technician = Uuid::new_v4();
        let mut order = Order {
            id: Uuid::new_v4(),
            customer_id: Some(customer),
            technician_id: None,
            shipping_address_id: None,
            status: OrderStatus::Pending,
            order_date: Utc::now(),
        };
        let items = vec![OrderItem {
            id: Uuid::new_v4(),
            order_id: order.id,
            product_id: Uuid::new_v4(),
            product_name: "Mesh Router".to_string(),
            product_slug: "mesh-router".to_string(),
            quantity: 2,
            price: rust_decimal::Decimal::from(100),
        }];
        assert_eq!(total_amount(&items), rust_decimal::Decimal::from(200));

        order.technician_id = Some(technician);
        order.status = order.status.after_technician_assigned();
        assert_eq!(order.status, OrderStatus::Processing);

        order.status = OrderStatus::Delivered;
        assert!(validate_score(5).is_ok());
        let first = JobSnapshot::from((&order, false));
        assert_eq!(check_eligibility(Some(&first), customer), Ok(technician));

        let second = JobSnapshot::from((&order, true));
        assert_eq!(
            check_eligibility(Some(&second), customer),
            Err(RatingRejection::AlreadyRated)
        );
    }
}
