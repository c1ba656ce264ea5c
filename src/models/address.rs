use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AddressFields {
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub is_default: Option<bool>,
}

/// What deleting one of a user's addresses has to do to keep a default around.
#[derive(Debug, PartialEq, Eq)]
pub enum Removal {
    Delete,
    DeleteAndPromote(Uuid),
}

/// Decide how `target` may leave `addresses` (one user's addresses, oldest first).
pub fn plan_removal(addresses: &[Address], target: Uuid) -> Result<Removal, AppError> {
    let doomed = addresses
        .iter()
        .find(|a| a.id == target)
        .ok_or_else(|| AppError::not_found("Address"))?;

    if !doomed.is_default {
        return Ok(Removal::Delete);
    }

    match addresses.iter().find(|a| a.id != target) {
        Some(successor) => Ok(Removal::DeleteAndPromote(successor.id)),
        None => Err(AppError::validation(
            "Cannot delete your only default address",
        )),
    }
}

pub fn validate_pincode(pincode: &str) -> Result<(), AppError> {
    if pincode.is_empty() || pincode.len() > 6 || !pincode.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("Pincode must be up to 6 digits"));
    }
    Ok(())
}

impl Address {
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Address>(
            "SELECT * FROM addresses WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn get_for_user(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Address>("SELECT * FROM addresses WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    async fn clear_default(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        keep: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1 AND id <> $2")
            .bind(user_id)
            .bind(keep)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// A user's first address becomes the default one.
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        street_address: &str,
        city: &str,
        state: &str,
        pincode: &str,
        is_default: bool,
    ) -> Result<Self, AppError> {
        validate_pincode(pincode)?;
        let mut tx = pool.begin().await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM addresses WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        let is_default = is_default || existing == 0;

        let address = sqlx::query_as::<_, Address>(
            r#"
            INSERT INTO addresses (id, user_id, street_address, city, state, pincode, is_default, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(street_address)
        .bind(city)
        .bind(state)
        .bind(pincode)
        .bind(is_default)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        if address.is_default {
            Address::clear_default(&mut tx, user_id, address.id).await?;
        }
        tx.commit().await?;

        info!("Address {} added for user {}", address.id, user_id);
        Ok(address)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        fields: AddressFields,
    ) -> Result<Self, AppError> {
        if let Some(pincode) = fields.pincode.as_deref() {
            validate_pincode(pincode)?;
        }
        let mut tx = pool.begin().await?;

        let address = sqlx::query_as::<_, Address>(
            r#"
            UPDATE addresses SET
                street_address = COALESCE($3, street_address),
                city = COALESCE($4, city),
                state = COALESCE($5, state),
                pincode = COALESCE($6, pincode),
                is_default = COALESCE($7, is_default)
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(fields.street_address)
        .bind(fields.city)
        .bind(fields.state)
        .bind(fields.pincode)
        .bind(fields.is_default)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Address"))?;

        if address.is_default {
            Address::clear_default(&mut tx, user_id, address.id).await?;
        }
        tx.commit().await?;

        debug!("Address {} updated", address.id);
        Ok(address)
    }

    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Removal, AppError> {
        let mut tx = pool.begin().await?;

        let addresses = sqlx::query_as::<_, Address>(
            "SELECT * FROM addresses WHERE user_id = $1 ORDER BY created_at, id FOR UPDATE",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let removal = plan_removal(&addresses, id)?;

        sqlx::query("DELETE FROM addresses WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Removal::DeleteAndPromote(successor) = removal {
            sqlx::query("UPDATE addresses SET is_default = TRUE WHERE id = $1")
                .bind(successor)
                .execute(&mut *tx)
                .await?;
            info!("Promoted address {} to default for user {}", successor, user_id);
        }
        tx.commit().await?;

        Ok(removal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(is_default: bool) -> Address {
        Address {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            street_address: "12 MG Road".to_string(),
            city: "Kochi".to_string(),
            state: "Kerala".to_string(),
            pincode: "682001".to_string(),
            is_default,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn sole_default_address_cannot_be_deleted() {
        let only = address(true);
        let err = plan_removal(&[only.clone()], only.id).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn deleting_default_promotes_the_oldest_remaining() {
        let home = address(true);
        let office = address(false);
        let cabin = address(false);
        let all = vec![home.clone(), office.clone(), cabin];

        assert_eq!(
            plan_removal(&all, home.id).unwrap(),
            Removal::DeleteAndPromote(office.id)
        );
    }

    #[test]
    fn non_default_address_is_simply_deleted() {
        let home = address(true);
        let office = address(false);
        let all = vec![home, office.clone()];
        assert_eq!(plan_removal(&all, office.id).unwrap(), Removal::Delete);

        let lone = address(false);
        assert_eq!(plan_removal(&[lone.clone()], lone.id).unwrap(), Removal::Delete);
    }

    #[test]
    fn unknown_address_is_not_found() {
        let home = address(true);
        let err = plan_removal(&[home], Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn pincode_must_be_short_and_numeric() {
        assert!(validate_pincode("682001").is_ok());
        assert!(validate_pincode("1234567").is_err());
        assert!(validate_pincode("68A001").is_err());
        assert!(validate_pincode("").is_err());
    }
}
