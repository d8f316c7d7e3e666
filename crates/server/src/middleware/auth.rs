use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::{
    db::models::{Role, User},
    error::{AppError, Result},
    services::auth::decode_token,
    AppState,
};

/// The account behind a verified bearer token, as loaded for this request.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Rejects requests without a valid, unexpired token for an existing active
/// account. The account is re-read on every request, so deactivation applies
/// from the next request on.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let bearer = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::Unauthorized("Access denied. No token provided.".to_string()))?;

    let claims = decode_token(bearer.token(), &state.config.jwt_secret)?;

    let user = state
        .db
        .user_by_id(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid token. User not found.".to_string()))?;

    if !user.is_active {
        tracing::warn!(user_id = %user.id, "Rejected request from deactivated account");
        return Err(AppError::Unauthorized(
            "Account is deactivated.".to_string(),
        ));
    }

    request.extensions_mut().insert(AuthUser::from(&user));

    Ok(next.run(request).await)
}

/// Layered after [`auth_middleware`]: admits only users whose role equals the
/// required one. There is no hierarchy between roles.
pub async fn authorize(
    State(required): State<Role>,
    user: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response> {
    if user.role != required {
        tracing::warn!(
            user_id = %user.id,
            role = %user.role,
            required = %required,
            "Role check failed"
        );
        return Err(AppError::Forbidden(
            "Access denied. Insufficient permissions.".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

// Extractor for getting the authenticated user from request extensions
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}
