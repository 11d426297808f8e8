//! Bearer-token authentication.
//!
//! Issuing tokens is someone else's job. This layer only resolves an opaque
//! bearer token to a [`Principal`] through an [`Authenticator`] and makes
//! the principal available to handlers as a request extension.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;

use crate::error::ApiError;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub name: String,
}

/// Resolves bearer tokens to principals.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns `None` for unknown, revoked or expired tokens.
    async fn authenticate(&self, token: &str) -> Option<Principal>;
}

/// Accepts a fixed set of tokens loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let tokens = pairs
            .into_iter()
            .map(|(token, name)| (token, Principal { name }))
            .collect();
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).cloned()
    }
}

/// Middleware guarding the protected routes.
pub async fn require_bearer(
    State(authenticator): State<Arc<dyn Authenticator>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::Unauthorized("Token required".to_string()))?;

    let principal = authenticator.authenticate(&token).await.ok_or_else(|| {
        tracing::debug!("rejected bearer token");
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("s3cret"));
    }

    #[tokio::test]
    async fn static_tokens_resolve_to_principals() {
        let auth = StaticTokenAuthenticator::new([("s3cret".to_string(), "alice".to_string())]);

        assert_eq!(
            auth.authenticate("s3cret").await,
            Some(Principal {
                name: "alice".into()
            })
        );
        assert_eq!(auth.authenticate("guess").await, None);
    }
}
