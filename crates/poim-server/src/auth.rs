//! Request authentication.
//!
//! Clients send `Authorization: Token <key>` (`Bearer` is accepted too).
//! No header, or a header for some other scheme, means anonymous. A header
//! for our scheme that is malformed or carries an unknown key is rejected
//! outright instead of silently downgrading to anonymous.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;

use poim_shared::Principal;
use poim_store::{StoreError, User};

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::error::ServerError;

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Auth {
    pub principal: Principal,
    /// Present for authenticated callers.
    pub user: Option<User>,
    /// The key the caller presented, used by logout.
    pub token: Option<String>,
}

impl Auth {
    pub fn anonymous() -> Self {
        Self {
            principal: Principal::Anonymous,
            user: None,
            token: None,
        }
    }

    /// The user, or 401 for anonymous callers.
    pub fn require_user(&self) -> Result<&User, ServerError> {
        self.user.as_ref().ok_or(ServerError::Unauthenticated)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(key) = parse_token_header(&parts.headers)? else {
            return Ok(Auth::anonymous());
        };

        let db = state.db.lock().await;
        let user = match db.user_for_token(&key) {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                tracing::debug!("rejected unknown auth token");
                return Err(ServerError::Unauthenticated);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Auth {
            principal: Principal::User(user.account()),
            user: Some(user),
            token: Some(key),
        })
    }
}

/// Extract the token key from the `Authorization` header.
///
/// `Ok(None)` when there is no header or it names another scheme.
pub fn parse_token_header(headers: &HeaderMap) -> Result<Option<String>, ServerError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ServerError::Unauthenticated)?;

    let mut parts = value.split_whitespace();
    let Some(scheme) = parts.next() else {
        return Ok(None);
    };
    if !scheme.eq_ignore_ascii_case("token") && !scheme.eq_ignore_ascii_case("bearer") {
        return Ok(None);
    }

    match (parts.next(), parts.next()) {
        (Some(key), None) => Ok(Some(key.to_string())),
        // No credentials, or spaces inside the key.
        _ => Err(ServerError::Unauthenticated),
    }
}

/// Check the admin bearer token in constant time.
pub fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        tracing::warn!("rejected admin request with a bad token");
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }

    Ok(())
}
