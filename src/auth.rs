use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::user::{Role, User};

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub token_type: TokenType,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

fn sign(
    user_id: Uuid,
    role: Role,
    token_type: TokenType,
    ttl: Duration,
    keys: &JwtKeys,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        role,
        token_type,
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(&Header::default(), &claims, &keys.encoding)
        .map_err(|e| AppError::Internal(format!("Failed to sign JWT: {}", e)))
}

pub fn issue_token_pair(user: &User, app_config: &AppConfig) -> Result<TokenPair, AppError> {
    Ok(TokenPair {
        access: sign(
            user.id,
            user.role,
            TokenType::Access,
            Duration::minutes(app_config.access_token_minutes),
            &app_config.jwt_keys,
        )?,
        refresh: sign(
            user.id,
            user.role,
            TokenType::Refresh,
            Duration::days(app_config.refresh_token_days),
            &app_config.jwt_keys,
        )?,
    })
}

/// Subject of a valid, unexpired refresh token.
pub fn refresh_subject(refresh: &str, app_config: &AppConfig) -> Result<Uuid, AppError> {
    decode_token(refresh, TokenType::Refresh, &app_config.jwt_keys).map(|claims| claims.sub)
}

/// Access token for the account as it stands now. Role comes from the row,
/// and deleted or deactivated accounts cannot refresh.
pub fn refresh_access_token(user: Option<&User>, app_config: &AppConfig) -> Result<String, AppError> {
    let user = user
        .filter(|user| user.is_active)
        .ok_or_else(|| AppError::Unauthorized("User not found or inactive".to_string()))?;
    sign(
        user.id,
        user.role,
        TokenType::Access,
        Duration::minutes(app_config.access_token_minutes),
        &app_config.jwt_keys,
    )
}

pub fn decode_token(token: &str, expected: TokenType, keys: &JwtKeys) -> Result<Claims, AppError> {
    let claims = decode::<Claims>(token, &keys.decoding, &Validation::default())
        .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?
        .claims;

    if claims.token_type != expected {
        return Err(AppError::Unauthorized("Wrong token type".to_string()));
    }
    Ok(claims)
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            role,
            ..User::new("Asha", "asha@example.com")
        }
    }

    #[test]
    fn token_pair_round_trips_subject_and_role() {
        let config = AppConfig::for_tests();
        let technician = user(Role::Technician);
        let pair = issue_token_pair(&technician, &config).unwrap();

        let claims = decode_token(&pair.access, TokenType::Access, &config.jwt_keys).unwrap();
        assert_eq!(claims.sub, technician.id);
        assert_eq!(claims.role, Role::Technician);
    }

    #[test]
    fn refresh_token_is_not_accepted_as_access() {
        let config = AppConfig::for_tests();
        let customer = user(Role::Customer);
        let pair = issue_token_pair(&customer, &config).unwrap();

        assert!(decode_token(&pair.refresh, TokenType::Access, &config.jwt_keys).is_err());
        assert!(refresh_subject(&pair.access, &config).is_err());
        assert_eq!(refresh_subject(&pair.refresh, &config).unwrap(), customer.id);
        let access = refresh_access_token(Some(&customer), &config).unwrap();
        assert!(decode_token(&access, TokenType::Access, &config.jwt_keys).is_ok());
    }

    #[test]
    fn refreshed_access_token_carries_the_current_role() {
        let config = AppConfig::for_tests();
        let mut account = user(Role::Admin);
        let pair = issue_token_pair(&account, &config).unwrap();
        assert_eq!(refresh_subject(&pair.refresh, &config).unwrap(), account.id);

        account.role = Role::Customer;
        let access = refresh_access_token(Some(&account), &config).unwrap();
        let claims = decode_token(&access, TokenType::Access, &config.jwt_keys).unwrap();
        assert_eq!(claims.role, Role::Customer);
    }

    #[test]
    fn inactive_or_deleted_accounts_cannot_refresh() {
        let config = AppConfig::for_tests();
        let deactivated = User {
            is_active: false,
            ..user(Role::Admin)
        };

        let err = refresh_access_token(Some(&deactivated), &config).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        let err = refresh_access_token(None, &config).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let config = AppConfig::for_tests();
        let pair = issue_token_pair(&user(Role::Admin), &config).unwrap();
        let other = JwtKeys::new(b"another-secret");
        assert!(decode_token(&pair.access, TokenType::Access, &other).is_err());
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-phc-string"));
    }
}
