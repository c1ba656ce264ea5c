use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Type};
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::JobCounts;
use crate::models::user::Role;
use crate::types::common::{Pagination, TechnicianFilter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "service_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Submitted,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceStatus {
    pub const ASSIGNMENT_STEP: (ServiceStatus, ServiceStatus) =
        (ServiceStatus::Submitted, ServiceStatus::Assigned);

    /// Same law as orders: only a freshly submitted request moves to ASSIGNED.
    pub fn after_technician_assigned(self) -> Self {
        let (from, to) = Self::ASSIGNMENT_STEP;
        if self == from {
            to
        } else {
            self
        }
    }

    pub fn is_rateable(self) -> bool {
        self == ServiceStatus::Completed
    }
}

/// `after_technician_assigned` evaluated against the row's status in the UPDATE itself.
const ASSIGN_TECHNICIAN: &str = "UPDATE service_requests \
     SET technician_id = $2, status = CASE WHEN status = $3 THEN $4 ELSE status END \
     WHERE id = $1 RETURNING *";

/// AMC customers are covered by their maintenance contract.
pub fn service_fee_for(role: Role, flat_fee: Decimal) -> Decimal {
    match role {
        Role::Amc => Decimal::ZERO,
        _ => flat_fee,
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ServiceCategory {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ServiceIssue {
    pub id: Uuid,
    pub category_id: Uuid,
    pub description: String,
    pub price: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceCategoryWithIssues {
    #[serde(flatten)]
    pub category: ServiceCategory,
    pub issues: Vec<ServiceIssue>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub service_category_id: Uuid,
    pub issue_id: Option<Uuid>,
    pub custom_description: String,
    pub service_location_id: Option<Uuid>,
    pub status: ServiceStatus,
    pub request_date: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct ServiceRequestOverview {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: ServiceRequest,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub category_name: String,
    pub issue_description: Option<String>,
    pub issue_price: Option<Decimal>,
    pub technician_name: Option<String>,
    pub location_street_address: Option<String>,
    pub location_city: Option<String>,
    pub location_state: Option<String>,
    pub location_pincode: Option<String>,
    pub is_rated: bool,
}

/// Back-office filters for the service request list.
#[derive(Debug, Clone, Copy)]
pub struct ServiceFilter<'a> {
    pub status: Option<ServiceStatus>,
    pub category: Option<Uuid>,
    pub technician: TechnicianFilter,
    pub search: Option<&'a str>,
}

const OVERVIEW_SELECT: &str = r#"
    SELECT s.*, c.name AS customer_name, c.email AS customer_email, c.phone AS customer_phone,
           sc.name AS category_name, i.description AS issue_description, i.price AS issue_price,
           t.name AS technician_name,
           a.street_address AS location_street_address, a.city AS location_city,
           a.state AS location_state, a.pincode AS location_pincode,
           EXISTS(SELECT 1 FROM technician_ratings r WHERE r.service_request_id = s.id) AS is_rated
    FROM service_requests s
    JOIN users c ON c.id = s.customer_id
    JOIN service_categories sc ON sc.id = s.service_category_id
    LEFT JOIN service_issues i ON i.id = s.issue_id
    LEFT JOIN users t ON t.id = s.technician_id
    LEFT JOIN addresses a ON a.id = s.service_location_id
"#;

impl ServiceCategory {
    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceCategory>("SELECT * FROM service_categories WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &PgPool, name: &str) -> Result<Self, sqlx::Error> {
        let category = sqlx::query_as::<_, ServiceCategory>(
            "INSERT INTO service_categories (id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(pool)
        .await?;
        info!("Created service category {}", category.name);
        Ok(category)
    }

    pub async fn rename(pool: &PgPool, id: Uuid, name: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ServiceCategory>(
            "UPDATE service_categories SET name = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM service_categories WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_with_issues(pool: &PgPool) -> Result<Vec<ServiceCategoryWithIssues>, sqlx::Error> {
        let categories =
            sqlx::query_as::<_, ServiceCategory>("SELECT * FROM service_categories ORDER BY name")
                .fetch_all(pool)
                .await?;
        let issues = sqlx::query_as::<_, ServiceIssue>(
            "SELECT * FROM service_issues ORDER BY description",
        )
        .fetch_all(pool)
        .await?;

        Ok(categories
            .into_iter()
            .map(|category| ServiceCategoryWithIssues {
                issues: issues
                    .iter()
                    .filter(|issue| issue.category_id == category.id)
                    .cloned()
                    .collect(),
                category,
            })
            .collect())
    }
}

impl ServiceIssue {
    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceIssue>("SELECT * FROM service_issues WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}

impl ServiceRequest {
    /// Caller has already checked that the issue and location fit.
    pub async fn create(
        pool: &PgPool,
        customer_id: Uuid,
        category: &ServiceCategory,
        issue_id: Option<Uuid>,
        custom_description: &str,
        service_location_id: Option<Uuid>,
    ) -> Result<Self, sqlx::Error> {
        let request = sqlx::query_as::<_, ServiceRequest>(
            r#"
            INSERT INTO service_requests (id, customer_id, service_category_id, issue_id,
                                          custom_description, service_location_id, status, request_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(category.id)
        .bind(issue_id)
        .bind(custom_description)
        .bind(service_location_id)
        .bind(ServiceStatus::Submitted)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

        info!("Service request {} submitted in {}", request.id, category.name);
        Ok(request)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceRequest>("SELECT * FROM service_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn get_for_customer(
        pool: &PgPool,
        id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceRequest>(
            "SELECT * FROM service_requests WHERE id = $1 AND customer_id = $2",
        )
        .bind(id)
        .bind(customer_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        status: ServiceStatus,
    ) -> Result<Self, sqlx::Error> {
        let request = sqlx::query_as::<_, ServiceRequest>(
            "UPDATE service_requests SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_one(pool)
        .await?;
        debug!("Service request {} status set to {:?}", id, status);
        Ok(request)
    }

    pub async fn assign_technician(
        pool: &PgPool,
        id: Uuid,
        technician_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let (from, to) = ServiceStatus::ASSIGNMENT_STEP;
        let request = sqlx::query_as::<_, ServiceRequest>(ASSIGN_TECHNICIAN)
            .bind(id)
            .bind(technician_id)
            .bind(from)
            .bind(to)
            .fetch_one(pool)
            .await?;

        info!(
            "Technician {} assigned to service request {} ({:?})",
            technician_id, id, request.status
        );
        Ok(request)
    }

    /// Row-level match on the technician is the whole authorization check.
    pub async fn complete_by_technician(
        pool: &PgPool,
        id: Uuid,
        technician_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceRequest>(
            "UPDATE service_requests SET status = $3 WHERE id = $1 AND technician_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(technician_id)
        .bind(ServiceStatus::Completed)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM service_requests WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn overview(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<ServiceRequestOverview>, sqlx::Error> {
        sqlx::query_as::<_, ServiceRequestOverview>(&format!("{} WHERE s.id = $1", OVERVIEW_SELECT))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_customer(
        pool: &PgPool,
        customer_id: Uuid,
    ) -> Result<Vec<ServiceRequestOverview>, sqlx::Error> {
        sqlx::query_as::<_, ServiceRequestOverview>(&format!(
            "{} WHERE s.customer_id = $1 ORDER BY s.request_date DESC",
            OVERVIEW_SELECT
        ))
        .bind(customer_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_technician(
        pool: &PgPool,
        technician_id: Uuid,
    ) -> Result<Vec<ServiceRequestOverview>, sqlx::Error> {
        sqlx::query_as::<_, ServiceRequestOverview>(&format!(
            "{} WHERE s.technician_id = $1 ORDER BY s.request_date DESC",
            OVERVIEW_SELECT
        ))
        .bind(technician_id)
        .fetch_all(pool)
        .await
    }

    pub async fn recent(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<ServiceRequestOverview>, sqlx::Error> {
        sqlx::query_as::<_, ServiceRequestOverview>(&format!(
            "{} ORDER BY s.request_date DESC LIMIT $1",
            OVERVIEW_SELECT
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn search(
        pool: &PgPool,
        filter: &ServiceFilter<'_>,
        pagination: &Pagination,
    ) -> Result<(Vec<ServiceRequestOverview>, i64), sqlx::Error> {
        fn filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ServiceFilter<'_>) {
            qb.push(" WHERE TRUE");
            if let Some(status) = filter.status {
                qb.push(" AND s.status = ").push_bind(status);
            }
            if let Some(category) = filter.category {
                qb.push(" AND s.service_category_id = ").push_bind(category);
            }
            match filter.technician {
                TechnicianFilter::Any => {}
                TechnicianFilter::Unassigned => {
                    qb.push(" AND s.technician_id IS NULL");
                }
                TechnicianFilter::Assigned(id) => {
                    qb.push(" AND s.technician_id = ").push_bind(id);
                }
            }
            if let Some(term) = filter.search {
                let pattern = format!("%{}%", term);
                qb.push(" AND (s.id::text ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR c.name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR c.email ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR s.custom_description ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let mut count_query = QueryBuilder::new(
            "SELECT COUNT(*) FROM service_requests s JOIN users c ON c.id = s.customer_id",
        );
        filters(&mut count_query, filter);
        let total: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

        let mut query = QueryBuilder::new(OVERVIEW_SELECT);
        filters(&mut query, filter);
        query
            .push(" ORDER BY s.request_date DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset_for(total));
        let requests = query
            .build_query_as::<ServiceRequestOverview>()
            .fetch_all(pool)
            .await?;

        Ok((requests, total))
    }

    pub async fn count(pool: &PgPool, status: Option<ServiceStatus>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM service_requests WHERE $1::service_status IS NULL OR status = $1",
        )
        .bind(status)
        .fetch_one(pool)
        .await
    }

    pub async fn counts_for_technician(
        pool: &PgPool,
        technician_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<JobCounts, sqlx::Error> {
        sqlx::query_as::<_, JobCounts>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = $2) AS completed,
                   COUNT(*) FILTER (WHERE status = $2 AND request_date >= $3) AS completed_since
            FROM service_requests
            WHERE technician_id = $1
            "#,
        )
        .bind(technician_id)
        .bind(ServiceStatus::Completed)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    pub async fn count_unassigned(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM service_requests WHERE technician_id IS NULL")
            .fetch_one(pool)
            .await
    }
}

/// Checks a submission against the chosen category before anything is written.
pub fn check_issue_fits(issue: Option<&ServiceIssue>, category_id: Uuid) -> Result<(), AppError> {
    match issue {
        Some(issue) if issue.category_id != category_id => Err(AppError::validation(
            "The selected issue does not belong to this service category",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ServiceStatus; 5] = [
        ServiceStatus::Submitted,
        ServiceStatus::Assigned,
        ServiceStatus::InProgress,
        ServiceStatus::Completed,
        ServiceStatus::Cancelled,
    ];

    #[test]
    fn assignment_only_advances_submitted_requests() {
        for status in ALL {
            let expected = if status == ServiceStatus::Submitted {
                ServiceStatus::Assigned
            } else {
                status
            };
            assert_eq!(status.after_technician_assigned(), expected);
        }
    }

    #[test]
    fn assignment_reads_and_writes_status_in_one_update() {
        assert!(ASSIGN_TECHNICIAN.starts_with("UPDATE service_requests "));
        assert!(!ASSIGN_TECHNICIAN.contains("SELECT"));
        assert!(ASSIGN_TECHNICIAN.contains("CASE WHEN status = $3 THEN $4 ELSE status END"));

        // The bound CASE must agree with the rule for whatever status the row holds then.
        let (from, to) = ServiceStatus::ASSIGNMENT_STEP;
        for current in ALL {
            let written = if current == from { to } else { current };
            assert_eq!(written, current.after_technician_assigned());
        }
    }

    #[test]
    fn only_completed_requests_are_rateable() {
        let rateable: Vec<_> = ALL.into_iter().filter(|s| s.is_rateable()).collect();
        assert_eq!(rateable, vec![ServiceStatus::Completed]);
    }

    #[test]
    fn in_progress_uses_snake_case_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&ServiceStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
    }

    #[test]
    fn amc_customers_pay_no_fee() {
        let fee = Decimal::from(500);
        assert_eq!(service_fee_for(Role::Amc, fee), Decimal::ZERO);
        assert_eq!(service_fee_for(Role::Customer, fee), fee);
    }

    #[test]
    fn issue_must_belong_to_category() {
        let category_id = Uuid::new_v4();
        let issue = ServiceIssue {
            id: Uuid::new_v4(),
            category_id,
            description: "Screen flicker".to_string(),
            price: Decimal::from(300),
        };
        assert!(check_issue_fits(Some(&issue), category_id).is_ok());
        assert!(check_issue_fits(Some(&issue), Uuid::new_v4()).is_err());
        assert!(check_issue_fits(None, category_id).is_ok());
    }
}
