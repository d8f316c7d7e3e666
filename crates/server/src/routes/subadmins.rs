use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use super::{
    auth::{insert_account, RegisterRequest},
    non_blank, ApiResponse, PageQuery, Pagination,
};
use crate::{
    db::{
        like_pattern, search_key,
        models::{Role, User},
    },
    error::{AppError, Result},
    extract::{AppJson, AppQuery},
    middleware::auth::{auth_middleware, authorize, AuthUser},
    validation::FieldErrors,
    AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(list_subadmins).post(create_subadmin))
        .route(
            "/:id",
            get(get_subadmin)
                .put(update_subadmin)
                .delete(delete_subadmin),
        )
        .route_layer(axum_middleware::from_fn_with_state(Role::Admin, authorize))
        .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateSubAdminRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateSubAdminRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListSubAdminsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAdminData {
    pub sub_admin: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAdminListData {
    pub sub_admins: Vec<User>,
    pub pagination: Pagination,
}

async fn find_subadmin(state: &AppState, id: &str) -> Result<User> {
    state
        .db
        .user_by_id(id)
        .await?
        .filter(|user| user.role == Role::SubAdmin)
        .ok_or_else(|| AppError::not_found("Sub-admin"))
}

async fn create_subadmin(
    State(state): State<AppState>,
    admin: AuthUser,
    AppJson(body): AppJson<CreateSubAdminRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubAdminData>>)> {
    // Same rules as self-registration, but the role is never caller-chosen.
    let account = RegisterRequest {
        username: body.username,
        email: body.email,
        password: body.password,
        role: None,
    }
    .validate()?;

    let sub_admin = insert_account(&state, account).await?;

    tracing::info!(user_id = %sub_admin.id, admin_id = %admin.id, "Created sub-admin");

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Sub-admin created successfully", SubAdminData { sub_admin }),
    ))
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, search: Option<String>) {
    builder.push(" WHERE role = ").push_bind(Role::SubAdmin);
    if let Some(search) = search {
        builder
            .push(" AND search_key LIKE ")
            .push_bind(like_pattern(&search))
            .push(" ESCAPE '\\'");
    }
}

async fn list_subadmins(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListSubAdminsQuery>,
) -> Result<Json<ApiResponse<SubAdminListData>>> {
    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let search = non_blank(&query.search).map(str::to_string);

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users");
    push_filters(&mut count, search.clone());
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&state.db.pool)
        .await?;

    let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM users");
    push_filters(&mut select, search);
    select
        .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
        .push_bind(i64::from(paging.limit()))
        .push(" OFFSET ")
        .push_bind(paging.offset());

    let sub_admins = select
        .build_query_as::<User>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(ApiResponse::data(SubAdminListData {
        sub_admins,
        pagination: paging.pagination(total),
    }))
}

async fn get_subadmin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SubAdminData>>> {
    let sub_admin = find_subadmin(&state, &id).await?;
    Ok(ApiResponse::data(SubAdminData { sub_admin }))
}

async fn update_subadmin(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<UpdateSubAdminRequest>,
) -> Result<Json<ApiResponse<SubAdminData>>> {
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

    let current = find_subadmin(&state, &id).await?;

    let clash = state
        .db
        .identity_taken(username.as_deref(), email.as_deref(), Some(&id))
        .await?;
    if clash.email {
        return Err(AppError::DuplicateKey("Email already exists".to_string()));
    }
    if clash.username {
        return Err(AppError::DuplicateKey("Username already exists".to_string()));
    }

    let username = username.unwrap_or(current.username);
    let email = email.unwrap_or(current.email);

    let result = sqlx::query(
        "UPDATE users SET username = ?, email = ?, is_active = ?, search_key = ?, updated_at = ? \
         WHERE id = ? AND role = ?",
    )
    .bind(&username)
    .bind(&email)
    .bind(body.is_active.unwrap_or(current.is_active))
    .bind(search_key(&[&username, &email]))
    .bind(state.clock.now())
    .bind(&id)
    .bind(Role::SubAdmin)
    .execute(&state.db.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Sub-admin"));
    }

    let sub_admin = find_subadmin(&state, &id).await?;

    tracing::info!(
        user_id = %id,
        admin_id = %admin.id,
        is_active = sub_admin.is_active,
        "Updated sub-admin"
    );

    Ok(ApiResponse::with_message(
        "Sub-admin updated successfully",
        SubAdminData { sub_admin },
    ))
}

async fn delete_subadmin(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let result = sqlx::query("DELETE FROM users WHERE id = ? AND role = ?")
        .bind(&id)
        .bind(Role::SubAdmin)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Sub-admin"));
    }

    tracing::info!(user_id = %id, admin_id = %admin.id, "Deleted sub-admin");

    Ok(ApiResponse::message("Sub-admin deleted successfully"))
}
