use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    error::{AppError, Result},
    extract::ClientIp,
    services::rate_limit::RateDecision,
    AppState,
};

/// Process-wide cap on requests per client address.
pub async fn global_rate_limit(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    request: Request,
    next: Next,
) -> Result<Response> {
    match state.global_limiter.check(&ip, state.clock.now()) {
        RateDecision::Allow => Ok(next.run(request).await),
        RateDecision::Deny => {
            tracing::warn!(client = %ip, "Global rate limit exceeded");
            Err(AppError::RateLimited(
                "Too many requests from this IP, please try again later.".to_string(),
            ))
        }
    }
}
