//! Authentication middleware.
//!
//! Bearer tokens have the form `<user_id>:<display name>`, optionally followed
//! by `:moderator`. When `AUTH_SECRET` is configured the token must be
//! prefixed with `<secret>/` and requests without a token are refused;
//! otherwise requests without a token act as a read-only guest.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use threadline_engine::Viewer;

use crate::{error::AppError, AppState};

/// Authenticated caller extracted from the request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub viewer: Viewer,
}

impl AuthUser {
    pub fn guest() -> Self {
        Self {
            viewer: Viewer::guest(),
        }
    }
}

/// Parse the identity part of a bearer token.
pub fn parse_identity(token: &str) -> Option<Viewer> {
    let mut parts = token.splitn(3, ':');
    let id: i64 = parts.next()?.trim().parse().ok().filter(|id| *id > 0)?;
    let name = parts.next()?.trim();
    if name.is_empty() {
        return None;
    }

    let viewer = Viewer::user(id, name);
    match parts.next() {
        None => Some(viewer),
        Some("moderator") => Some(viewer.moderator()),
        Some(_) => None,
    }
}

/// Strip the shared-secret prefix when one is configured.
// TODO: replace the shared-secret prefix with signed tokens once clients can mint them.
fn authenticate(token: &str, secret: Option<&str>) -> Option<Viewer> {
    match secret {
        Some(secret) => {
            let rest = token.strip_prefix(secret)?.strip_prefix('/')?;
            parse_identity(rest)
        }
        None => parse_identity(token),
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let secret = state.config.auth_secret.as_deref();
        match auth_header {
            Some(header) if header.starts_with("Bearer ") => {
                let token = header.trim_start_matches("Bearer ").trim();
                match authenticate(token, secret) {
                    Some(viewer) => Ok(AuthUser { viewer }),
                    None => {
                        tracing::debug!("Rejected malformed bearer token");
                        Err(AppError::Unauthorized)
                    }
                }
            }
            Some(_) => Err(AppError::Unauthorized),
            None if secret.is_none() => Ok(AuthUser::guest()),
            None => Err(AppError::Unauthorized),
        }
    }
}
