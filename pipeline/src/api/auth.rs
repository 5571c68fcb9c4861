//! API key check for the protected routes.
//!
//! Callers pass their key in the `x-api-key` header. An empty key list
//! disables the check.

use crate::services::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The key a request was authenticated with, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey(pub String);

#[derive(Debug, Default)]
pub struct ApiKeys {
    keys: HashSet<String>,
}

impl ApiKeys {
    pub fn new(keys: &[String]) -> Self {
        Self {
            keys: keys.iter().cloned().collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn accepts(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

pub async fn require_api_key(
    State(keys): State<Arc<ApiKeys>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !keys.is_enabled() {
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    match presented {
        Some(key) if keys.accepts(&key) => {
            request.extensions_mut().insert(ApiKey(key));
            Ok(next.run(request).await)
        }
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected unknown API key");
            Err(AppError(common::Error::Forbidden))
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request without API key");
            Err(AppError(common::Error::Forbidden))
        }
    }
}
