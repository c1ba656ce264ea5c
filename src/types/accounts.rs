use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::TokenPair;
use crate::error::AppError;
use crate::models::address::AddressFields;
use crate::models::User;

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("Name is required"));
        }
        if !self.email.contains('@') {
            return Err(AppError::validation("Enter a valid email address"));
        }
        if self.password.len() < MIN_PASSWORD_LENGTH {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Deserialize, ToSchema)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email_notifications: Option<bool>,
    pub sms_notifications: Option<bool>,
}

#[derive(Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
}

#[derive(Deserialize)]
pub struct GoogleUserInfo {
    pub email: String,
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct AddressRequest {
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct AddressUpdateRequest {
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub is_default: Option<bool>,
}

impl From<AddressUpdateRequest> for AddressFields {
    fn from(req: AddressUpdateRequest) -> Self {
        AddressFields {
            street_address: req.street_address,
            city: req.city,
            state: req.state,
            pincode: req.pincode,
            is_default: req.is_default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(name: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn registration_requires_name_email_and_long_password() {
        assert!(register("Asha", "asha@example.com", "s3cret-pass").validate().is_ok());
        assert!(register(" ", "asha@example.com", "s3cret-pass").validate().is_err());
        assert!(register("Asha", "asha.example.com", "s3cret-pass").validate().is_err());
        assert!(register("Asha", "asha@example.com", "short").validate().is_err());
    }

    #[test]
    fn auth_response_flattens_tokens() {
        let response = AuthResponse {
            user: User::new("Asha", "asha@example.com"),
            tokens: TokenPair {
                access: "a".to_string(),
                refresh: "r".to_string(),
            },
        };
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["access"], "a");
        assert_eq!(body["refresh"], "r");
        assert_eq!(body["user"]["email"], "asha@example.com");
        assert!(body["user"].get("password_hash").is_none());
    }
}
