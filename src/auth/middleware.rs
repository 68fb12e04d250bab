//! Account-context middleware: resolves the caller's account id from a
//! request header and attaches it to the request so handlers never touch
//! the header directly. No wallet or token verification — the engine sits
//! behind a trusted gateway that owns real authentication.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;

pub const ACCOUNT_HEADER: &str = "X-Account-Id";

#[derive(Clone, Copy)]
pub struct AuthAccount {
    pub account_id: Uuid,
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.config.is_auth_disabled() {
        let account_id = request
            .headers()
            .get(ACCOUNT_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or(state.default_account_id);
        request.extensions_mut().insert(AuthAccount { account_id });
        return Ok(next.run(request).await);
    }

    let account_id = request
        .headers()
        .get(ACCOUNT_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(AuthAccount { account_id });
    Ok(next.run(request).await)
}
