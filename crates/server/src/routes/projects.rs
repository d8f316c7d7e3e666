use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware as axum_middleware,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use super::{non_blank, ApiResponse, PageQuery, Pagination};
use crate::{
    db::{
        like_pattern, search_key,
        models::{Project, ProjectRow, ProjectStatus, PROJECT_SELECT},
    },
    error::{AppError, Result},
    extract::{AppJson, AppQuery},
    middleware::auth::{auth_middleware, AuthUser},
    services::upload::StagedImage,
    validation::FieldErrors,
    AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(list_projects))
        .route("/:id", get(get_project));

    let protected = Router::new()
        .route("/", post(create_project))
        .route("/:id", put(update_project).delete(delete_project))
        .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware));

    public.merge(protected)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub client: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    /// A ready-made data URI, for clients that encode images themselves.
    pub image: Option<String>,
}

/// Project fields after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDraft {
    pub name: String,
    pub description: String,
    pub client: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ProjectStatus,
    pub image: Option<String>,
}

impl From<&Project> for ProjectDraft {
    fn from(project: &Project) -> Self {
        Self {
            name: project.name.clone(),
            description: project.description.clone(),
            client: project.client.clone(),
            start_date: project.start_date,
            end_date: project.end_date,
            status: project.status,
            image: project.image.clone(),
        }
    }
}

impl ProjectDraft {
    fn search_key(&self) -> String {
        search_key(&[&self.name, &self.description, &self.client])
    }
}

impl ProjectInput {
    /// Validates the fields that are present. Absent fields fall back to
    /// `base` (an update) or are reported missing (a create). The date order
    /// is checked on the merged result.
    pub fn validate(&self, base: Option<&ProjectDraft>) -> Result<ProjectDraft> {
        let mut errors = FieldErrors::new();

        let name = text_or_keep(
            &mut errors,
            "name",
            self.name.as_deref(),
            100,
            "Project name must be between 1 and 100 characters",
            base.map(|b| &b.name),
        );
        let description = text_or_keep(
            &mut errors,
            "description",
            self.description.as_deref(),
            1000,
            "Description must be between 1 and 1000 characters",
            base.map(|b| &b.description),
        );
        let client = text_or_keep(
            &mut errors,
            "client",
            self.client.as_deref(),
            100,
            "Client name must be between 1 and 100 characters",
            base.map(|b| &b.client),
        );

        let start_date = match (self.start_date.as_deref(), base) {
            (None, Some(b)) => Some(b.start_date),
            (value, _) => errors.date("startDate", "Start date", value),
        };
        let end_date = match (self.end_date.as_deref(), base) {
            (None, Some(b)) => Some(b.end_date),
            (value, _) => errors.date("endDate", "End date", value),
        };

        let status = match non_blank(&self.status) {
            None => base.map_or(ProjectStatus::Active, |b| b.status),
            Some(raw) => raw.parse::<ProjectStatus>().unwrap_or_else(|()| {
                errors.add(
                    "status",
                    "Status must be active, completed, on-hold, or cancelled",
                );
                ProjectStatus::Active
            }),
        };

        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end <= start {
                errors.add("endDate", "End date must be after start date");
            }
        }

        let image = match non_blank(&self.image) {
            Some(uri) => Some(uri.to_string()),
            None => base.and_then(|b| b.image.clone()),
        };

        errors.into_result()?;
        match (name, description, client, start_date, end_date) {
            (Some(name), Some(description), Some(client), Some(start_date), Some(end_date)) => {
                Ok(ProjectDraft {
                    name,
                    description,
                    client,
                    start_date,
                    end_date,
                    status,
                    image,
                })
            }
            _ => Err(AppError::Internal(
                "Validation passed with missing fields".to_string(),
            )),
        }
    }
}

fn text_or_keep(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
    message: &str,
    fallback: Option<&String>,
) -> Option<String> {
    match (value, fallback) {
        (None, Some(existing)) => Some(existing.clone()),
        (value, _) => errors.text(field, value, 1, max, message),
    }
}

/// Create/update payload: either a JSON body or a multipart form with an
/// optional `image` file field.
pub struct ProjectForm {
    pub input: ProjectInput,
    pub image: Option<StagedImage>,
}

#[async_trait]
impl FromRequest<AppState> for ProjectForm {
    type Rejection = AppError;

    async fn from_request(request: Request, state: &AppState) -> Result<Self> {
        let is_multipart = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if !is_multipart {
            let AppJson(input) = AppJson::<ProjectInput>::from_request(request, state).await?;
            return Ok(Self { input, image: None });
        }

        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        let mut input = ProjectInput::default();
        let mut image = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();

            let file_name = field.file_name().map(str::to_string);
            if name == "image" && file_name.is_some() {
                // Browsers send an empty, untyped part when no file was picked.
                if file_name.as_deref() == Some("") {
                    continue;
                }
                if image.is_some() {
                    return Err(AppError::BadRequest(
                        "Only one image may be uploaded".to_string(),
                    ));
                }
                let staged = state.uploads.stage(field).await?;
                image = (!staged.is_empty()).then_some(staged);
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read field {name}: {e}")))?;

            let slot = match name.as_str() {
                "name" => &mut input.name,
                "description" => &mut input.description,
                "client" => &mut input.client,
                "startDate" => &mut input.start_date,
                "endDate" => &mut input.end_date,
                "status" => &mut input.status,
                "image" => &mut input.image,
                _ => continue,
            };
            *slot = Some(value);
        }

        Ok(Self { input, image })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListProjectsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectData {
    pub project: Project,
}

#[derive(Debug, Serialize)]
pub struct ProjectListData {
    pub projects: Vec<Project>,
    pub pagination: Pagination,
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, status: Option<String>, search: Option<String>) {
    builder.push(" WHERE 1 = 1");
    if let Some(status) = status {
        builder.push(" AND p.status = ").push_bind(status);
    }
    if let Some(search) = search {
        builder
            .push(" AND p.search_key LIKE ")
            .push_bind(like_pattern(&search))
            .push(" ESCAPE '\\'");
    }
}

async fn list_projects(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListProjectsQuery>,
) -> Result<Json<ApiResponse<ProjectListData>>> {
    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let status = non_blank(&query.status).map(str::to_string);
    let search = non_blank(&query.search).map(str::to_string);

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM projects p");
    push_filters(&mut count, status.clone(), search.clone());
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&state.db.pool)
        .await?;

    let mut select = QueryBuilder::<Sqlite>::new(PROJECT_SELECT);
    push_filters(&mut select, status, search);
    select
        .push(" ORDER BY p.created_at DESC, p.rowid DESC LIMIT ")
        .push_bind(i64::from(paging.limit()))
        .push(" OFFSET ")
        .push_bind(paging.offset());

    let projects = select
        .build_query_as::<ProjectRow>()
        .fetch_all(&state.db.pool)
        .await?
        .into_iter()
        .map(Project::from)
        .collect();

    Ok(ApiResponse::data(ProjectListData {
        projects,
        pagination: paging.pagination(total),
    }))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ProjectData>>> {
    let project = state
        .db
        .project_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;

    Ok(ApiResponse::data(ProjectData { project }))
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    form: ProjectForm,
) -> Result<(StatusCode, Json<ApiResponse<ProjectData>>)> {
    let ProjectForm { input, image } = form;
    let mut draft = input.validate(None)?;

    if let Some(staged) = image {
        if let Some(uri) = staged.into_data_uri().await {
            draft.image = Some(uri);
        }
    }

    let project_id = Uuid::new_v4().to_string();
    let now = state.clock.now();

    sqlx::query(
        "INSERT INTO projects (id, name, description, client, start_date, end_date, status, image, created_by, search_key, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&project_id)
    .bind(&draft.name)
    .bind(&draft.description)
    .bind(&draft.client)
    .bind(draft.start_date)
    .bind(draft.end_date)
    .bind(draft.status)
    .bind(&draft.image)
    .bind(&user.id)
    .bind(draft.search_key())
    .bind(now)
    .bind(now)
    .execute(&state.db.pool)
    .await?;

    let project = state
        .db
        .project_by_id(&project_id)
        .await?
        .ok_or_else(|| AppError::Internal("Project vanished after insert".to_string()))?;

    tracing::info!(project_id = %project.id, user_id = %user.id, "Created project");

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Project created successfully", ProjectData { project }),
    ))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    form: ProjectForm,
) -> Result<Json<ApiResponse<ProjectData>>> {
    let ProjectForm { input, image } = form;

    let existing = state
        .db
        .project_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;

    let mut draft = input.validate(Some(&ProjectDraft::from(&existing)))?;

    if let Some(staged) = image {
        if let Some(uri) = staged.into_data_uri().await {
            draft.image = Some(uri);
        }
    }

    let result = sqlx::query(
        "UPDATE projects SET name = ?, description = ?, client = ?, start_date = ?, end_date = ?, \
         status = ?, image = ?, search_key = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&draft.name)
    .bind(&draft.description)
    .bind(&draft.client)
    .bind(draft.start_date)
    .bind(draft.end_date)
    .bind(draft.status)
    .bind(&draft.image)
    .bind(draft.search_key())
    .bind(state.clock.now())
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    // Deleted between the read and the write.
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Project"));
    }

    let project = state
        .db
        .project_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;

    tracing::info!(project_id = %id, user_id = %user.id, "Updated project");

    Ok(ApiResponse::with_message(
        "Project updated successfully",
        ProjectData { project },
    ))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Project"));
    }

    tracing::info!(project_id = %id, user_id = %user.id, "Deleted project");

    Ok(ApiResponse::message("Project deleted successfully"))
}
