use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Type};
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::common::Pagination;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Customer,
    Technician,
    Amc,
}

impl Role {
    pub fn is_staff(self) -> bool {
        self == Role::Admin
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub email_notifications: bool,
    pub sms_notifications: bool,
    pub date_joined: DateTime<Utc>,
}

impl Default for User {
    fn default() -> Self {
        User {
            id: Uuid::new_v4(),
            name: String::new(),
            email: String::new(),
            phone: None,
            role: Role::Customer,
            password_hash: None,
            is_active: true,
            is_superuser: false,
            email_notifications: true,
            sms_notifications: false,
            date_joined: Utc::now(),
        }
    }
}

/// What an update does to the stored phone number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PhoneChange {
    #[default]
    Keep,
    Clear,
    Set(String),
}

impl PhoneChange {
    /// Omitted keeps the number, a blank string clears it.
    pub fn from_input(raw: Option<String>) -> Self {
        match raw.as_deref().map(str::trim) {
            None => PhoneChange::Keep,
            Some("") => PhoneChange::Clear,
            Some(phone) => PhoneChange::Set(phone.to_string()),
        }
    }

    fn is_write(&self) -> bool {
        *self != PhoneChange::Keep
    }

    fn into_value(self) -> Option<String> {
        match self {
            PhoneChange::Set(phone) => Some(phone),
            PhoneChange::Keep | PhoneChange::Clear => None,
        }
    }
}

/// Fields an admin may change on any account.
#[derive(Debug, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: PhoneChange,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub email_notifications: Option<bool>,
    pub sms_notifications: Option<bool>,
}

impl User {
    pub fn new(name: &str, email: &str) -> Self {
        User {
            name: name.to_string(),
            email: normalize_email(email),
            ..Default::default()
        }
    }

    pub async fn create(pool: &PgPool, user: &User) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, phone, role, password_hash, is_active, is_superuser,
                               email_notifications, sms_notifications, date_joined)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.role)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .bind(user.email_notifications)
        .bind(user.sms_notifications)
        .bind(user.date_joined)
        .fetch_one(pool)
        .await?;

        info!("Created user {} with role {:?}", user.id, user.role);
        Ok(user)
    }

    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await
    }

    /// Look up the account behind a social login, creating a customer on first sight.
    pub async fn get_or_create_social(
        pool: &PgPool,
        email: &str,
        name: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        if let Some(existing_user) = User::get_by_email(pool, email).await? {
            return Ok(existing_user);
        }

        let display_name = name
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        let new_user = User::new(&display_name, email);
        debug!("First social login for {}, creating account", new_user.email);
        User::create(pool, &new_user).await
    }

    /// Resolve a user that may be assigned to jobs.
    pub async fn get_technician(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND role = $2")
            .bind(id)
            .bind(Role::Technician)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_technicians(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = $1 ORDER BY name")
            .bind(Role::Technician)
            .fetch_all(pool)
            .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, changes: UserChanges) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone = CASE WHEN $4 THEN $5 ELSE phone END,
                role = COALESCE($6, role),
                is_active = COALESCE($7, is_active),
                email_notifications = COALESCE($8, email_notifications),
                sms_notifications = COALESCE($9, sms_notifications)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.email.as_deref().map(normalize_email))
        .bind(changes.phone.is_write())
        .bind(changes.phone.into_value())
        .bind(changes.role)
        .bind(changes.is_active)
        .bind(changes.email_notifications)
        .bind(changes.sms_notifications)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Newest accounts first, optionally narrowed by role and a free-text search.
    pub async fn search(
        pool: &PgPool,
        role: Option<Role>,
        search: Option<&str>,
        pagination: &Pagination,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        fn filters(qb: &mut QueryBuilder<'_, Postgres>, role: Option<Role>, search: Option<&str>) {
            qb.push(" WHERE TRUE");
            if let Some(role) = role {
                qb.push(" AND role = ").push_bind(role);
            }
            if let Some(term) = search {
                let pattern = format!("%{}%", term);
                qb.push(" AND (name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR email ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR phone ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM users");
        filters(&mut count_query, role, search);
        let total: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

        let mut query = QueryBuilder::new("SELECT * FROM users");
        filters(&mut query, role, search);
        query
            .push(" ORDER BY date_joined DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset_for(total));
        let users = query.build_query_as::<User>().fetch_all(pool).await?;

        Ok((users, total))
    }

    pub async fn count(pool: &PgPool, role: Option<Role>) -> Result<i64, sqlx::Error> {
        match role {
            Some(role) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
                    .bind(role)
                    .fetch_one(pool)
                    .await
            }
            None => sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(pool).await,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_defaults_to_active_customer() {
        let user = User::new("Ravi", "  Ravi@Example.COM ");
        assert_eq!(user.email, "ravi@example.com");
        assert_eq!(user.role, Role::Customer);
        assert!(user.is_active);
        assert!(user.password_hash.is_none());
    }

    #[test]
    fn role_serializes_in_upper_case() {
        assert_eq!(serde_json::to_string(&Role::Amc).unwrap(), "\"AMC\"");
        let role: Role = serde_json::from_str("\"TECHNICIAN\"").unwrap();
        assert_eq!(role, Role::Technician);
        assert!(Role::Admin.is_staff());
        assert!(!Role::Technician.is_staff());
    }

    #[test]
    fn blank_phone_clears_and_missing_phone_keeps() {
        assert_eq!(PhoneChange::from_input(None), PhoneChange::Keep);
        assert_eq!(PhoneChange::from_input(Some("  ".to_string())), PhoneChange::Clear);
        assert_eq!(
            PhoneChange::from_input(Some(" 98470 12345 ".to_string())),
            PhoneChange::Set("98470 12345".to_string())
        );

        let clear = PhoneChange::Clear;
        assert!(clear.is_write());
        assert_eq!(clear.into_value(), None);
        assert!(!PhoneChange::Keep.is_write());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User {
            password_hash: Some("$argon2id$secret".to_string()),
            ..User::new("Ravi", "ravi@example.com")
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
