//! HTTP Basic authentication for the Signaling Server's public surface
//! (§4.2: every endpoint except `/health` is gated when `basic_auth_enabled`
//! is set). There is exactly one configured user; this is not a user
//! database, just a single shared credential checked on every request.

use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};
use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;

use crate::state::AppState;

/// Hash a plaintext Basic-auth password for storage in [`crate::config::SignalingConfig`].
pub fn hash_password(password: &str) -> crate::error::Result<String> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::PasswordHasher;

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| crate::error::AppError::Config(format!("password hash failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Decode a `Basic <base64(user:pass)>` header value.
fn decode_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"selkies\"")],
        "unauthorized",
    )
        .into_response()
}

/// Axum middleware enforcing the single configured Basic-auth credential.
/// No-op when `basic_auth_enabled` is false or no password hash is set.
pub async fn basic_auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let cfg = state.config.get();
    if !cfg.signaling.basic_auth_enabled {
        return next.run(req).await;
    }
    let Some(expected_hash) = cfg.signaling.basic_auth_password_hash.as_deref() else {
        return next.run(req).await;
    };

    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header_value) = header_value else {
        return unauthorized();
    };
    let Some((user, pass)) = decode_basic(header_value) else {
        return unauthorized();
    };

    if user != cfg.signaling.basic_auth_user || !verify_password(&pass, expected_hash) {
        return unauthorized();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn decodes_basic_header() {
        let value = format!("Basic {}", STANDARD.encode(b"selkies:hunter2"));
        let (user, pass) = decode_basic(&value).unwrap();
        assert_eq!(user, "selkies");
        assert_eq!(pass, "hunter2");
    }
}
