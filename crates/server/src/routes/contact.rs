use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::{headers::UserAgent, TypedHeader};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use super::{ApiResponse, PageQuery, Pagination};
use crate::{
    db::models::{Contact, ContactStatus},
    error::{AppError, Result},
    extract::{AppJson, AppQuery, ClientIp},
    middleware::auth::auth_middleware,
    services::{notifier::Notification, rate_limit::RateDecision},
    validation::{normalize_email, FieldErrors},
    AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    let review = Router::new()
        .route("/", get(list_contacts))
        .route("/:id/status", put(update_contact_status))
        .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/submit", post(submit_contact))
        .merge(review)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubmitContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
}

/// A submission that passed validation, normalised for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Submission {
    name: String,
    email: String,
    phone: String,
    message: String,
}

impl SubmitContactRequest {
    fn validate(&self) -> Result<Submission> {
        let mut errors = FieldErrors::new();

        let name = self.name.as_deref().map(str::trim).unwrap_or_default();
        if name.chars().count() < 2 {
            errors.add("name", "Name must be at least 2 characters long");
        }
        let email = self.email.as_deref().and_then(normalize_email);
        if email.is_none() {
            errors.add("email", "Please enter a valid email address");
        }
        let message = self.message.as_deref().map(str::trim).unwrap_or_default();
        if message.chars().count() < 10 {
            errors.add("message", "Message must be at least 10 characters long");
        }

        errors.into_map_result()?;
        Ok(Submission {
            name: name.to_string(),
            email: email.unwrap_or_default(),
            phone: self
                .phone
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            message: message.to_string(),
        })
    }
}

fn notification_for(
    to: &str,
    submission: &Submission,
    client: &str,
    user_agent: &str,
    at: DateTime<Utc>,
) -> Notification {
    let mut body = format!(
        "New Contact Form Submission\n\nSender's Name: {}\nSender's Email: {}\n",
        submission.name, submission.email
    );
    if !submission.phone.is_empty() {
        body.push_str(&format!("Phone Number: {}\n", submission.phone));
    }
    body.push_str(&format!(
        "\nMessage:\n{}\n\n---\nSubmitted on: {}\nIP Address: {}\nUser Agent: {}\n",
        submission.message,
        at.to_rfc2822(),
        client,
        user_agent
    ));

    Notification {
        to: to.to_string(),
        reply_to: Some(submission.email.clone()),
        subject: format!("New Contact Form Message from {}", submission.name),
        body,
    }
}

async fn submit_contact(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    user_agent: Option<TypedHeader<UserAgent>>,
    AppJson(body): AppJson<SubmitContactRequest>,
) -> Result<(StatusCode, Json<ApiResponse<()>>)> {
    let submission = body.validate()?;

    let now = state.clock.now();
    if state.contact_limiter.check(&client, now) == RateDecision::Deny {
        tracing::warn!(client = %client, "Contact form rate limit exceeded");
        return Err(AppError::RateLimited(
            "Too many submissions. Please try again in a minute.".to_string(),
        ));
    }

    let user_agent = user_agent
        .map(|TypedHeader(agent)| agent.as_str().to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let contact_id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO contacts (id, name, email, phone, message, ip_address, user_agent, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&contact_id)
    .bind(&submission.name)
    .bind(&submission.email)
    .bind(&submission.phone)
    .bind(&submission.message)
    .bind(&client)
    .bind(&user_agent)
    .bind(ContactStatus::New)
    .bind(now)
    .bind(now)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(contact_id = %contact_id, client = %client, "Stored contact submission");

    // The submission is already stored; a delivery failure is not the caller's problem.
    let notification = notification_for(
        &state.config.contact_notify_to,
        &submission,
        &client,
        &user_agent,
        now,
    );
    if let Err(e) = state.notifier.send(&notification).await {
        tracing::error!(contact_id = %contact_id, "Failed to send contact notification: {e:#}");
    }

    Ok((
        StatusCode::CREATED,
        ApiResponse::message(
            "Your message has been sent successfully. We will get back to you soon!",
        ),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListContactsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContactData {
    pub contact: Contact,
}

#[derive(Debug, Serialize)]
pub struct ContactListData {
    pub contacts: Vec<Contact>,
    pub pagination: Pagination,
}

fn parse_status(raw: Option<&str>) -> Result<ContactStatus> {
    raw.map(str::trim)
        .unwrap_or_default()
        .parse::<ContactStatus>()
        .map_err(|()| {
            AppError::BadRequest(
                "Status must be new, read, replied, or archived".to_string(),
            )
        })
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, status: Option<ContactStatus>) {
    if let Some(status) = status {
        builder.push(" WHERE status = ").push_bind(status);
    }
}

async fn list_contacts(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListContactsQuery>,
) -> Result<Json<ApiResponse<ContactListData>>> {
    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let status = match super::non_blank(&query.status) {
        Some(raw) => Some(parse_status(Some(raw))?),
        None => None,
    };

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM contacts");
    push_filters(&mut count, status);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&state.db.pool)
        .await?;

    let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM contacts");
    push_filters(&mut select, status);
    select
        .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
        .push_bind(i64::from(paging.limit()))
        .push(" OFFSET ")
        .push_bind(paging.offset());

    let contacts = select
        .build_query_as::<Contact>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(ApiResponse::data(ContactListData {
        contacts,
        pagination: paging.pagination(total),
    }))
}

async fn update_contact_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(body): AppJson<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<ContactData>>> {
    let status = parse_status(body.status.as_deref())?;

    let result = sqlx::query("UPDATE contacts SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(state.clock.now())
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Contact"));
    }

    let contact = sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(ApiResponse::with_message(
        "Contact status updated successfully",
        ContactData { contact },
    ))
}
