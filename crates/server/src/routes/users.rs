use axum::{
    extract::State,
    middleware as axum_middleware,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{auth::UserData, ApiResponse};
use crate::{
    db::{
        models::{User, UserSettings},
        search_key,
    },
    error::{AppError, Result},
    extract::AppJson,
    middleware::auth::{auth_middleware, AuthUser},
    services::auth::{hash_password, verify_password},
    validation::FieldErrors,
    AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/password", put(change_password))
        .route("/settings", put(update_settings))
        .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub email_notifications: Option<bool>,
    pub two_factor_auth: Option<bool>,
    pub dark_mode: Option<bool>,
}

impl UpdateSettingsRequest {
    fn apply(&self, current: UserSettings) -> UserSettings {
        UserSettings {
            email_notifications: self
                .email_notifications
                .unwrap_or(current.email_notifications),
            two_factor_auth: self.two_factor_auth.unwrap_or(current.two_factor_auth),
            dark_mode: self.dark_mode.unwrap_or(current.dark_mode),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SettingsData {
    pub settings: UserSettings,
}

async fn current_user(state: &AppState, auth: &AuthUser) -> Result<User> {
    state
        .db
        .user_by_id(&auth.id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<UserData>>> {
    let user = current_user(&state, &auth).await?;
    Ok(ApiResponse::data(UserData { user }))
}

async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(body): AppJson<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserData>>> {
    let mut errors = FieldErrors::new();
    let username = body.username.as_deref().and_then(|u| {
        errors.text(
            "username",
            Some(u),
            3,
            30,
            "Username must be between 3 and 30 characters",
        )
    });
    let email = body
        .email
        .as_deref()
        .and_then(|e| errors.email("email", Some(e)));
    errors.into_result()?;

    let current = current_user(&state, &auth).await?;

    let clash = state
        .db
        .identity_taken(username.as_deref(), email.as_deref(), Some(&auth.id))
        .await?;
    if clash.email {
        return Err(AppError::DuplicateKey("Email already exists".to_string()));
    }
    if clash.username {
        return Err(AppError::DuplicateKey("Username already exists".to_string()));
    }

    let username = username.unwrap_or(current.username);
    let email = email.unwrap_or(current.email);

    sqlx::query(
        "UPDATE users SET username = ?, email = ?, search_key = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&username)
    .bind(&email)
    .bind(search_key(&[&username, &email]))
    .bind(state.clock.now())
    .bind(&auth.id)
    .execute(&state.db.pool)
    .await?;

    let user = current_user(&state, &auth).await?;

    Ok(ApiResponse::with_message(
        "Profile updated successfully",
        UserData { user },
    ))
}

async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(body): AppJson<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>> {
    let mut errors = FieldErrors::new();
    let current_password = body.current_password.unwrap_or_default();
    if current_password.is_empty() {
        errors.add("currentPassword", "Current password is required");
    }
    let new_password = body.new_password.unwrap_or_default();
    if new_password.chars().count() < 6 {
        errors.add(
            "newPassword",
            "New password must be at least 6 characters long",
        );
    }
    errors.into_result()?;

    let user = current_user(&state, &auth).await?;

    if !verify_password(&current_password, &user.password_hash)? {
        tracing::warn!(user_id = %user.id, "Password change with wrong current password");
        return Err(AppError::BadRequest(
            "Current password is incorrect".to_string(),
        ));
    }

    let password_hash = hash_password(&new_password)?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(state.clock.now())
        .bind(&user.id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(user_id = %user.id, "Password changed");

    Ok(ApiResponse::message("Password updated successfully"))
}

async fn update_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(body): AppJson<UpdateSettingsRequest>,
) -> Result<Json<ApiResponse<SettingsData>>> {
    let user = current_user(&state, &auth).await?;
    let settings = body.apply(user.settings);

    sqlx::query(
        "UPDATE users SET email_notifications = ?, two_factor_auth = ?, dark_mode = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(settings.email_notifications)
    .bind(settings.two_factor_auth)
    .bind(settings.dark_mode)
    .bind(state.clock.now())
    .bind(&user.id)
    .execute(&state.db.pool)
    .await?;

    Ok(ApiResponse::with_message(
        "Settings updated successfully",
        SettingsData { settings },
    ))
}
