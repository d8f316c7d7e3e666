use axum::{
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiResponse;
use crate::{
    db::{
        models::{Role, User},
        search_key,
    },
    error::{AppError, Result},
    extract::AppJson,
    middleware::auth::{auth_middleware, AuthUser},
    services::auth::{create_token, hash_password, verify_password},
    validation::FieldErrors,
    AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/profile", get(profile))
        .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .merge(protected)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct LoginData {
    pub token: String,
    pub user: User,
}

/// A validated, not yet persisted account.
#[derive(Debug)]
pub(crate) struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl RegisterRequest {
    pub(crate) fn validate(&self) -> Result<NewAccount> {
        let mut errors = FieldErrors::new();

        let username = errors.text(
            "username",
            self.username.as_deref(),
            3,
            30,
            "Username must be between 3 and 30 characters",
        );
        let email = errors.email("email", self.email.as_deref());
        let password = match self.password.as_deref() {
            Some(p) if p.chars().count() >= 6 => Some(p.to_string()),
            _ => {
                errors.add("password", "Password must be at least 6 characters");
                None
            }
        };
        let role = match self.role.as_deref() {
            None => Some(Role::SubAdmin),
            Some(raw) => match raw.parse::<Role>() {
                Ok(role) => Some(role),
                Err(()) => {
                    errors.add("role", "Role must be either admin or subadmin");
                    None
                }
            },
        };

        errors.into_result()?;
        match (username, email, password, role) {
            (Some(username), Some(email), Some(password), Some(role)) => Ok(NewAccount {
                username,
                email,
                password,
                role,
            }),
            _ => Err(AppError::Internal("Validation passed with missing fields".to_string())),
        }
    }
}

/// Stores a new account after checking both unique identities. A concurrent
/// insert that slips past the check is still caught by the unique indexes.
pub(crate) async fn insert_account(state: &AppState, account: NewAccount) -> Result<User> {
    let clash = state
        .db
        .identity_taken(Some(&account.username), Some(&account.email), None)
        .await?;
    if clash.any() {
        return Err(AppError::DuplicateKey(
            "User with this email or username already exists".to_string(),
        ));
    }

    let password_hash = hash_password(&account.password)?;
    let user_id = Uuid::new_v4().to_string();
    let now = state.clock.now();

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, role, is_active, search_key, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&account.username)
    .bind(&account.email)
    .bind(&password_hash)
    .bind(account.role)
    .bind(search_key(&[&account.username, &account.email]))
    .bind(now)
    .bind(now)
    .execute(&state.db.pool)
    .await?;

    state
        .db
        .user_by_id(&user_id)
        .await?
        .ok_or_else(|| AppError::Internal("User vanished after insert".to_string()))
}

async fn register(
    State(state): State<AppState>,
    AppJson(body): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserData>>)> {
    let account = body.validate()?;
    let user = insert_account(&state, account).await?;

    tracing::info!(user_id = %user.id, role = %user.role, "Registered user");

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("User registered successfully", UserData { user }),
    ))
}

async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginData>>> {
    let mut errors = FieldErrors::new();
    let email = errors.email("email", body.email.as_deref());
    let password = body.password.unwrap_or_default();
    if password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.into_result()?;
    let email = email.unwrap_or_default();

    // Find user by email
    let user = match state.db.user_by_email(&email).await? {
        Some(user) => user,
        None => {
            tracing::warn!("Login attempt for unknown account");
            return Err(AppError::invalid_credentials());
        }
    };

    // Verify password
    if !verify_password(&password, &user.password_hash)? {
        tracing::warn!(user_id = %user.id, "Login attempt with wrong password");
        return Err(AppError::invalid_credentials());
    }

    if !user.is_active {
        tracing::warn!(user_id = %user.id, "Login attempt for deactivated account");
        return Err(AppError::invalid_credentials());
    }

    // Create token
    let token = create_token(
        &user.id,
        user.role,
        &state.config.jwt_secret,
        state.clock.now(),
        state.config.jwt_expires_days,
    )?;

    Ok(ApiResponse::with_message(
        "Login successful",
        LoginData { token, user },
    ))
}

async fn profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<UserData>>> {
    let user = state
        .db
        .user_by_id(&auth.id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    Ok(ApiResponse::data(UserData { user }))
}
