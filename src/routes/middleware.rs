use crate::{errors::AppError, state::AppState};
use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

/// Require `Authorization: Bearer <token>` when an API token is configured.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(request).await;
    };

    let authorized = matches!(
        extract_token(request.headers().get(header::AUTHORIZATION)),
        Some(token) if token.as_bytes().ct_eq(expected.as_bytes()).into()
    );
    if !authorized {
        tracing::debug!(path = %request.uri().path(), "Rejected unauthenticated request");
        return AppError::unauthorized().into_response();
    }

    next.run(request).await
}

fn extract_token(header: Option<&HeaderValue>) -> Option<&str> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?;
    Some(bearer.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_tokens_only() {
        let bearer = HeaderValue::from_static("Bearer abc");
        let basic = HeaderValue::from_static("Basic abc");
        assert_eq!(extract_token(Some(&bearer)), Some("abc"));
        assert_eq!(extract_token(Some(&basic)), None);
        assert_eq!(extract_token(None), None);
    }
}
