use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::Row;

pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLE_ADMIN: &str = "admin";

const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
}

pub fn sign_token(secret: &str, user_id: &str, role: &str) -> ApiResult<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(error = %e, "jwt encode failed");
        ApiError::internal("failed to issue token")
    })
}

pub fn verify_token(secret: &str, token: &str) -> ApiResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::unauthorized("invalid token"))
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
}

fn bearer_token(headers: &HeaderMap) -> ApiResult<&str> {
    let raw = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    token.ok_or_else(|| ApiError::unauthorized("unauthorized"))
}

/// Resolve the bearer token to a live user row. The token alone is not
/// trusted for identity details; the user must still exist.
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> ApiResult<AuthUser> {
    let token = bearer_token(headers)?;
    let claims = verify_token(&state.jwt_secret, token)?;

    let users = state.table("users");
    let sql = format!("SELECT id,email,name,phone,role FROM {users} WHERE id=$1");
    let row = sqlx::query(&sql)
        .bind(&claims.sub)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db auth user lookup failed");
            ApiError::internal("database error")
        })?
        .ok_or_else(|| ApiError::unauthorized("unauthorized"))?;

    Ok(AuthUser {
        id: row.try_get("id").unwrap_or_default(),
        email: row.try_get("email").unwrap_or_default(),
        name: row.try_get("name").unwrap_or(None),
        phone: row.try_get("phone").unwrap_or(None),
        role: row
            .try_get("role")
            .unwrap_or_else(|_| ROLE_CUSTOMER.to_string()),
    })
}

pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<AuthUser> {
    let user = require_user(state, headers).await?;
    if !user.role.eq_ignore_ascii_case(ROLE_ADMIN) {
        return Err(ApiError::forbidden("forbidden"));
    }
    Ok(user)
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    if password.is_empty() {
        return Err(ApiError::bad_request("password required"));
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            ApiError::internal("failed to hash password")
        })
}

pub fn verify_password(stored_hash: &str, password: &str) -> ApiResult<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        tracing::error!(error = %e, "stored password hash unparseable");
        ApiError::internal("invalid stored credentials")
    })?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => {
            tracing::error!(error = %e, "password verification failed");
            Err(ApiError::internal("failed to verify password"))
        }
    }
}

pub fn generate_otp() -> String {
    let n: u32 = rand::thread_rng().gen_range(100_000..=999_999);
    n.to_string()
}

/// Normalize user-entered phone numbers for lookup; bare 10-digit numbers
/// are assumed to be Indian mobiles.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return trimmed.to_string();
    }
    if digits.len() == 10 {
        return format!("+91{digits}");
    }
    if digits.len() == 12 && digits.starts_with("91") {
        return format!("+{digits}");
    }
    if trimmed.starts_with('+') {
        return trimmed.to_string();
    }
    trimmed.to_string()
}

pub fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "****".to_string();
    }
    format!("*******{}", &digits[digits.len() - 2..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_preserves_claims() {
        let token = sign_token("test-secret", "user-1", ROLE_ADMIN).expect("sign");
        let claims = verify_token("test-secret", &token).expect("verify");
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, ROLE_ADMIN);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn token_fails_with_wrong_secret() {
        let token = sign_token("test-secret", "user-1", ROLE_CUSTOMER).expect("sign");
        assert!(verify_token("other-secret", &token).is_err());
        assert!(verify_token("test-secret", "not-a-token").is_err());
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("hunter22").expect("hash");
        assert_ne!(hash, "hunter22");
        assert!(verify_password(&hash, "hunter22").expect("verify"));
        assert!(!verify_password(&hash, "hunter23").expect("verify"));
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..32 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
            assert!(!otp.starts_with('0'));
        }
    }

    #[test]
    fn normalizes_indian_phone_formats() {
        assert_eq!(normalize_phone("9812345678"), "+919812345678");
        assert_eq!(normalize_phone("919812345678"), "+919812345678");
        assert_eq!(normalize_phone("+919812345678"), "+919812345678");
        assert_eq!(normalize_phone("+14155238886"), "+14155238886");
    }

    #[test]
    fn masks_all_but_last_two_digits() {
        assert_eq!(mask_phone("+919812345678"), "*******78");
        assert_eq!(mask_phone("12"), "****");
    }
}
