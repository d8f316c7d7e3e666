use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Duration;
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod validation;

use services::{
    clock::{Clock, SystemClock},
    notifier::Notifier,
    rate_limit::{FixedWindowLimiter, RateLimiter},
    upload::UploadService,
};

const JSON_BODY_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub uploads: UploadService,
    pub notifier: Arc<dyn Notifier>,
    pub contact_limiter: Arc<dyn RateLimiter>,
    pub global_limiter: Arc<dyn RateLimiter>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// State with in-memory limiters and the system clock.
    pub fn new(db: db::Database, config: config::Config, notifier: Arc<dyn Notifier>) -> Self {
        let global_limiter = FixedWindowLimiter::new(
            config.rate_limit_max,
            Duration::seconds(config.rate_limit_window_secs),
        );

        Self {
            db,
            uploads: UploadService::new(&config.upload_tmp_dir),
            config,
            notifier,
            contact_limiter: Arc::new(FixedWindowLimiter::contact_form()),
            global_limiter: Arc::new(global_limiter),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(health_check))
        .nest("/auth", routes::auth::router(state.clone()))
        .nest("/projects", routes::projects::router(state.clone()))
        .nest("/subadmins", routes::subadmins::router(state.clone()))
        .nest("/users", routes::users::router(state.clone()))
        .nest("/contact", routes::contact::router(state.clone()));

    Router::new()
        .nest("/api", api_router)
        .fallback(not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::errors::expose_internal_errors,
        ))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::global_rate_limit,
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("cross-origin-resource-policy"),
            HeaderValue::from_static("cross-origin"),
        ))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &config::Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "status": "ok",
        "message": "RMS Backend is running",
        "timestamp": state.clock.now().to_rfc3339(),
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "message": "Route not found" })),
    )
}
