use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Type};
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::catalog::Product;
use crate::types::common::{Pagination, TechnicianFilter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The only status that moves when a technician is assigned, and its target.
    pub const ASSIGNMENT_STEP: (OrderStatus, OrderStatus) =
        (OrderStatus::Pending, OrderStatus::Processing);

    /// Assigning a technician moves a fresh order into processing and
    /// leaves every other status as it was.
    pub fn after_technician_assigned(self) -> Self {
        let (from, to) = Self::ASSIGNMENT_STEP;
        if self == from {
            to
        } else {
            self
        }
    }

    pub fn is_rateable(self) -> bool {
        self == OrderStatus::Delivered
    }

    pub fn counts_as_revenue(self) -> bool {
        matches!(
            self,
            OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }
}

/// Applies `after_technician_assigned` to the row's current status inside the
/// UPDATE, bound with `OrderStatus::ASSIGNMENT_STEP`.
const ASSIGN_TECHNICIAN: &str = "UPDATE orders \
     SET technician_id = $2, status = CASE WHEN status = $3 THEN $4 ELSE status END \
     WHERE id = $1 RETURNING *";

/// SQL fragment matching `OrderStatus::counts_as_revenue`.
const REVENUE_STATUSES: &str = "('PROCESSING', 'SHIPPED', 'DELIVERED')";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub shipping_address_id: Option<Uuid>,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_slug: String,
    pub quantity: i32,
    pub price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Sum of quantity x price-at-purchase; never stored.
pub fn total_amount(items: &[OrderItem]) -> Decimal {
    items.iter().map(OrderItem::line_total).sum()
}

/// An order together with the names the listings show.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct OrderOverview {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub technician_name: Option<String>,
    pub is_rated: bool,
}

/// Per-technician job counters for the technician dashboard.
#[derive(Debug, Clone, Default, FromRow, Serialize, ToSchema)]
pub struct JobCounts {
    pub total: i64,
    pub completed: i64,
    pub completed_since: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub overview: OrderOverview,
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
}

const OVERVIEW_SELECT: &str = r#"
    SELECT o.*, c.name AS customer_name, c.email AS customer_email, c.phone AS customer_phone,
           t.name AS technician_name,
           EXISTS(SELECT 1 FROM technician_ratings r WHERE r.order_id = o.id) AS is_rated
    FROM orders o
    LEFT JOIN users c ON c.id = o.customer_id
    LEFT JOIN users t ON t.id = o.technician_id
"#;

impl Order {
    /// Opens a PENDING order with a single line priced at today's product price.
    pub async fn create(
        pool: &PgPool,
        customer_id: Uuid,
        product: &Product,
        quantity: i32,
        shipping_address_id: Option<Uuid>,
    ) -> Result<Self, AppError> {
        if quantity < 1 {
            return Err(AppError::validation("Quantity must be at least 1"));
        }
        if !product.is_active {
            return Err(AppError::validation("This product is not available"));
        }

        let mut tx = pool.begin().await?;
        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (id, customer_id, shipping_address_id, status, order_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(shipping_address_id)
        .bind(OrderStatus::Pending)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, quantity, price) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(product.id)
        .bind(quantity)
        .bind(product.price)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("Order {} created for customer {} ({} x {})", order.id, customer_id, quantity, product.slug);
        Ok(order)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn get_for_customer(
        pool: &PgPool,
        id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 AND customer_id = $2")
            .bind(id)
            .bind(customer_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_shipping_address(
        pool: &PgPool,
        id: Uuid,
        address_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Order>(
            "UPDATE orders SET shipping_address_id = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(address_id)
        .fetch_one(pool)
        .await
    }

    /// Staff status writes are unguarded: any status may follow any other.
    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<Self, sqlx::Error> {
        let order = sqlx::query_as::<_, Order>("UPDATE orders SET status = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(status)
            .fetch_one(pool)
            .await?;
        debug!("Order {} status set to {:?}", id, status);
        Ok(order)
    }

    /// Technician and the derived status land in the same statement, so a
    /// concurrent status change is never overwritten with a stale value.
    pub async fn assign_technician(
        pool: &PgPool,
        id: Uuid,
        technician_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let (from, to) = OrderStatus::ASSIGNMENT_STEP;
        let order = sqlx::query_as::<_, Order>(ASSIGN_TECHNICIAN)
            .bind(id)
            .bind(technician_id)
            .bind(from)
            .bind(to)
            .fetch_one(pool)
            .await?;

        info!("Technician {} assigned to order {} ({:?})", technician_id, id, order.status);
        Ok(order)
    }

    /// Only the assigned technician's row matches; the prior status is not checked.
    pub async fn complete_by_technician(
        pool: &PgPool,
        id: Uuid,
        technician_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = $3 WHERE id = $1 AND technician_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(technician_id)
        .bind(OrderStatus::Delivered)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn items_for(pool: &PgPool, order_ids: &[Uuid]) -> Result<Vec<OrderItem>, sqlx::Error> {
        sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT oi.id, oi.order_id, oi.product_id, p.name AS product_name, p.slug AS product_slug,
                   oi.quantity, oi.price
            FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = ANY($1)
            ORDER BY p.name
            "#,
        )
        .bind(order_ids)
        .fetch_all(pool)
        .await
    }

    /// Attach items and totals to a batch of overviews.
    pub async fn details(
        pool: &PgPool,
        overviews: Vec<OrderOverview>,
    ) -> Result<Vec<OrderDetail>, sqlx::Error> {
        let ids: Vec<Uuid> = overviews.iter().map(|o| o.order.id).collect();
        let mut items = Order::items_for(pool, &ids).await?;

        Ok(overviews
            .into_iter()
            .map(|overview| {
                let (mine, rest): (Vec<_>, Vec<_>) = items
                    .drain(..)
                    .partition(|item| item.order_id == overview.order.id);
                items = rest;
                OrderDetail {
                    total_amount: total_amount(&mine),
                    items: mine,
                    overview,
                }
            })
            .collect())
    }

    pub async fn overview(pool: &PgPool, id: Uuid) -> Result<Option<OrderOverview>, sqlx::Error> {
        sqlx::query_as::<_, OrderOverview>(&format!("{} WHERE o.id = $1", OVERVIEW_SELECT))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_customer(
        pool: &PgPool,
        customer_id: Uuid,
    ) -> Result<Vec<OrderOverview>, sqlx::Error> {
        sqlx::query_as::<_, OrderOverview>(&format!(
            "{} WHERE o.customer_id = $1 ORDER BY o.order_date DESC",
            OVERVIEW_SELECT
        ))
        .bind(customer_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_technician(
        pool: &PgPool,
        technician_id: Uuid,
    ) -> Result<Vec<OrderOverview>, sqlx::Error> {
        sqlx::query_as::<_, OrderOverview>(&format!(
            "{} WHERE o.technician_id = $1 ORDER BY o.order_date DESC",
            OVERVIEW_SELECT
        ))
        .bind(technician_id)
        .fetch_all(pool)
        .await
    }

    pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<OrderOverview>, sqlx::Error> {
        sqlx::query_as::<_, OrderOverview>(&format!(
            "{} ORDER BY o.order_date DESC LIMIT $1",
            OVERVIEW_SELECT
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn search(
        pool: &PgPool,
        status: Option<OrderStatus>,
        technician: TechnicianFilter,
        search: Option<&str>,
        pagination: &Pagination,
    ) -> Result<(Vec<OrderOverview>, i64), sqlx::Error> {
        fn filters(
            qb: &mut QueryBuilder<'_, Postgres>,
            status: Option<OrderStatus>,
            technician: TechnicianFilter,
            search: Option<&str>,
        ) {
            qb.push(" WHERE TRUE");
            if let Some(status) = status {
                qb.push(" AND o.status = ").push_bind(status);
            }
            match technician {
                TechnicianFilter::Any => {}
                TechnicianFilter::Unassigned => {
                    qb.push(" AND o.technician_id IS NULL");
                }
                TechnicianFilter::Assigned(id) => {
                    qb.push(" AND o.technician_id = ").push_bind(id);
                }
            }
            if let Some(term) = search {
                let pattern = format!("%{}%", term);
                qb.push(" AND (c.name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR c.email ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR o.id::text ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let mut count_query = QueryBuilder::new(
            "SELECT COUNT(*) FROM orders o LEFT JOIN users c ON c.id = o.customer_id",
        );
        filters(&mut count_query, status, technician, search);
        let total: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

        let mut query = QueryBuilder::new(OVERVIEW_SELECT);
        filters(&mut query, status, technician, search);
        query
            .push(" ORDER BY o.order_date DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset_for(total));
        let orders = query.build_query_as::<OrderOverview>().fetch_all(pool).await?;

        Ok((orders, total))
    }

    pub async fn count(pool: &PgPool, status: Option<OrderStatus>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE $1::order_status IS NULL OR status = $1")
            .bind(status)
            .fetch_one(pool)
            .await
    }

    pub async fn count_unassigned(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE technician_id IS NULL")
            .fetch_one(pool)
            .await
    }

    /// `completed_since` goes by order date, there is no completion timestamp.
    pub async fn counts_for_technician(
        pool: &PgPool,
        technician_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<JobCounts, sqlx::Error> {
        sqlx::query_as::<_, JobCounts>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = $2) AS completed,
                   COUNT(*) FILTER (WHERE status = $2 AND order_date >= $3) AS completed_since
            FROM orders
            WHERE technician_id = $1
            "#,
        )
        .bind(technician_id)
        .bind(OrderStatus::Delivered)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    pub async fn count_between(
        pool: &PgPool,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE order_date >= $1 AND order_date < $2")
            .bind(from)
            .bind(to)
            .fetch_one(pool)
            .await
    }

    /// Revenue of paid orders placed in `[from, to)`; open bounds cover everything.
    pub async fn revenue(
        pool: &PgPool,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Decimal, sqlx::Error> {
        let total: Option<Decimal> = sqlx::query_scalar(&format!(
            r#"
            SELECT SUM(oi.quantity * oi.price)
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.status IN {}
              AND ($1::timestamptz IS NULL OR o.order_date >= $1)
              AND ($2::timestamptz IS NULL OR o.order_date < $2)
            "#,
            REVENUE_STATUSES
        ))
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await?;
        Ok(total.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    fn item(order_id: Uuid, price: i64, quantity: i32) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id,
            product_id: Uuid::new_v4(),
            product_name: "Router".to_string(),
            product_slug: "router".to_string(),
            quantity,
            price: Decimal::from(price),
        }
    }

    #[test]
    fn assignment_only_advances_pending_orders() {
        for status in ALL {
            let expected = if status == OrderStatus::Pending {
                OrderStatus::Processing
            } else {
                status
            };
            assert_eq!(status.after_technician_assigned(), expected);
        }
    }

    #[test]
    fn assignment_reads_and_writes_status_in_one_update() {
        assert!(ASSIGN_TECHNICIAN.starts_with("UPDATE orders "));
        assert!(!ASSIGN_TECHNICIAN.contains("SELECT"));
        assert!(ASSIGN_TECHNICIAN.contains("CASE WHEN status = $3 THEN $4 ELSE status END"));

        // The bound CASE must agree with the rule for whatever status the row holds then.
        let (from, to) = OrderStatus::ASSIGNMENT_STEP;
        for current in ALL {
            let written = if current == from { to } else { current };
            assert_eq!(written, current.after_technician_assigned());
        }
    }

    #[test]
    fn only_delivered_orders_are_rateable() {
        let rateable: Vec<_> = ALL.into_iter().filter(|s| s.is_rateable()).collect();
        assert_eq!(rateable, vec![OrderStatus::Delivered]);
    }

    #[test]
    fn revenue_statuses_match_sql_fragment() {
        for status in ALL {
            let name = serde_json::to_string(&status).unwrap().replace('"', "'");
            assert_eq!(status.counts_as_revenue(), REVENUE_STATUSES.contains(&name));
        }
    }

    #[test]
    fn total_is_sum_of_lines() {
        let order_id = Uuid::new_v4();
        assert_eq!(total_amount(&[]), Decimal::ZERO);
        assert_eq!(total_amount(&[item(order_id, 100, 2)]), Decimal::from(200));
        assert_eq!(
            total_amount(&[item(order_id, 100, 2), item(order_id, 45, 3)]),
            Decimal::from(335)
        );
    }

    #[test]
    fn status_uses_upper_snake_case_on_the_wire() {
        assert_eq!(serde_json::to_string(&OrderStatus::Processing).unwrap(), "\"PROCESSING\"");
        let parsed: OrderStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(parsed, OrderStatus::Cancelled);
    }
}
