use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const PAGE_SIZE: i64 = 20;

/// `?page=N` for list endpoints. Bad or out-of-range pages resolve the way the
/// back-office expects: anything below 1 is page 1, anything past the end is
/// the last page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
}

impl Pagination {
    pub fn new(page: Option<i64>) -> Self {
        Self { page }
    }

    pub fn limit(&self) -> i64 {
        PAGE_SIZE
    }

    pub fn total_pages(total: i64) -> i64 {
        std::cmp::max(1, (total + PAGE_SIZE - 1) / PAGE_SIZE)
    }

    pub fn resolve(&self, total: i64) -> i64 {
        self.page
            .unwrap_or(1)
            .clamp(1, Pagination::total_pages(total))
    }

    pub fn offset_for(&self, total: i64) -> i64 {
        (self.resolve(total) - 1) * PAGE_SIZE
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub total_pages: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        Page {
            items,
            page: pagination.resolve(total),
            total_pages: Pagination::total_pages(total),
            total,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        ActionResponse {
            success: true,
            message: message.into(),
        }
    }
}

/// `?technician=` on the back-office job lists: empty, `unassigned`, or a user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechnicianFilter {
    Any,
    Unassigned,
    Assigned(Uuid),
}

impl TechnicianFilter {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => TechnicianFilter::Any,
            Some("unassigned") => TechnicianFilter::Unassigned,
            Some(other) => match Uuid::parse_str(other) {
                Ok(id) => TechnicianFilter::Assigned(id),
                Err(_) => TechnicianFilter::Any,
            },
        }
    }
}

/// Back-office forms submit unselected dropdowns as empty strings.
pub fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => serde_json::from_value(serde_json::Value::String(value.to_string()))
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Midnight UTC on the first day of the month containing `at`.
pub fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(at)
}

fn next_month(start: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(start)
}

fn previous_month(start: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if start.month() == 1 {
        (start.year() - 1, 12)
    } else {
        (start.year(), start.month() - 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(start)
}

/// The last `count` calendar months up to and including the one holding `now`,
/// oldest first, as `[start, end)` windows.
pub fn calendar_months(now: DateTime<Utc>, count: usize) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut windows = Vec::with_capacity(count);
    let mut start = month_start(now);
    for _ in 0..count {
        windows.push((start, next_month(start)));
        start = previous_month(start);
    }
    windows.reverse();
    windows
}
