use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    error::{ErrorBody, InternalErrorDetail},
    AppState,
};

/// Outside production, swaps the generic text of a 500 for the real cause.
pub async fn expose_internal_errors(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if state.config.is_production() {
        return response;
    }

    match response.extensions_mut().remove::<InternalErrorDetail>() {
        Some(InternalErrorDetail(detail)) => {
            let body = ErrorBody {
                success: false,
                message: "Internal Server Error".to_string(),
                errors: None,
                error: Some(detail),
            };
            (response.status(), Json(body)).into_response()
        }
        None => response,
    }
}
