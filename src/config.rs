use anyhow::anyhow;
use rust_decimal::Decimal;
use shuttle_runtime::SecretStore;

use crate::auth::JwtKeys;

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_keys: JwtKeys,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_uri: String,
    pub frontend_url: String,
    pub service_fee: Decimal,
}

impl AppConfig {
    pub fn new(secret_store: &SecretStore) -> Result<Self, anyhow::Error> {
        let database_url = secret_store
            .get("DATABASE_URL")
            .ok_or_else(|| anyhow!("DATABASE_URL not found"))?;

        let jwt_secret = secret_store
            .get("JWT_SECRET")
            .ok_or_else(|| anyhow!("JWT_SECRET not found"))?;

        let google_client_id = secret_store
            .get("GOOGLE_CLIENT_ID")
            .ok_or_else(|| anyhow!("GOOGLE_CLIENT_ID not found"))?;

        let google_client_secret = secret_store
            .get("GOOGLE_CLIENT_SECRET")
            .ok_or_else(|| anyhow!("GOOGLE_CLIENT_SECRET not found"))?;

        let google_redirect_uri = secret_store
            .get("GOOGLE_REDIRECT_URI")
            .ok_or_else(|| anyhow!("GOOGLE_REDIRECT_URI not found"))?;

        let frontend_url = secret_store
            .get("FRONTEND_URL")
            .ok_or_else(|| anyhow!("FRONTEND_URL not found"))?;

        // Optional knobs
        let access_token_minutes = parse_or(secret_store.get("ACCESS_TOKEN_MINUTES"), 5)?;
        let refresh_token_days = parse_or(secret_store.get("REFRESH_TOKEN_DAYS"), 1)?;
        let service_fee = parse_or(secret_store.get("SERVICE_FEE"), Decimal::from(500))?;

        Ok(AppConfig {
            database_url,
            jwt_keys: JwtKeys::new(jwt_secret.as_bytes()),
            access_token_minutes,
            refresh_token_days,
            google_client_id,
            google_client_secret,
            google_redirect_uri,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            service_fee,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        AppConfig {
            database_url: "postgres://localhost/techverse_test".to_string(),
            jwt_keys: JwtKeys::new(b"test-secret"),
            access_token_minutes: 5,
            refresh_token_days: 1,
            google_client_id: "client-id".to_string(),
            google_client_secret: "client-secret".to_string(),
            google_redirect_uri: "http://127.0.0.1:8000/api/auth/google/callback".to_string(),
            frontend_url: "http://127.0.0.1:5173".to_string(),
            service_fee: Decimal::from(500),
        }
    }
}

fn parse_or<T>(raw: Option<String>, default: T) -> Result<T, anyhow::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("invalid value {:?}: {}", value, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_to_default() {
        assert_eq!(parse_or::<i64>(None, 5).unwrap(), 5);
        assert_eq!(parse_or::<i64>(Some(" 30 ".to_string()), 5).unwrap(), 30);
        assert!(parse_or::<i64>(Some("soon".to_string()), 5).is_err());
    }

    #[test]
    fn service_fee_parses_as_decimal() {
        let fee = parse_or(Some("499.50".to_string()), Decimal::from(500)).unwrap();
        assert_eq!(fee.to_string(), "499.50");
    }
}
