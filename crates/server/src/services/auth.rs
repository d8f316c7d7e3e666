use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AdminSeed,
    db::{models::Role, search_key, Database},
    error::{AppError, Result},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn create_token(
    user_id: &str,
    role: Role,
    secret: &str,
    now: DateTime<Utc>,
    ttl_days: i64,
) -> Result<String> {
    let expiration = now
        .checked_add_signed(Duration::days(ttl_days))
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        iat: now.timestamp() as usize,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

/// Verifies signature and expiry. Every failure reads as Unauthorized.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Rejected bearer token: {e}");
        AppError::Unauthorized("Invalid or expired token".to_string())
    })
}

/// Creates the configured bootstrap admin unless an account with that email
/// already exists.
pub async fn ensure_admin(db: &Database, seed: &AdminSeed) -> anyhow::Result<()> {
    let email = crate::validation::normalize_email(&seed.email)
        .ok_or_else(|| anyhow::anyhow!("ADMIN_EMAIL {:?} is not a valid address", seed.email))?;

    if db.user_by_email(&email).await?.is_some() {
        tracing::debug!("Bootstrap admin {email} already present");
        return Ok(());
    }

    let password_hash = hash_password(&seed.password).map_err(|e| anyhow::anyhow!("{e}"))?;
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, role, is_active, search_key, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&seed.username)
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::Admin)
    .bind(search_key(&[&seed.username, &email]))
    .bind(now)
    .bind(now)
    .execute(&db.pool)
    .await?;

    tracing::info!("Created bootstrap admin {email}");
    Ok(())
}
