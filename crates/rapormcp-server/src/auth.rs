//! Authentication hook for HTTP connections.
//!
//! Providers run once per connection against the request head, before a
//! session exists. The [`AuthContext`] they return is attached to the
//! session and visible to every handler through
//! [`McpContext::auth`](rapormcp_core::McpContext::auth).

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use rapormcp_core::{AccessToken, AuthContext};

/// The parts of an HTTP request a provider may inspect.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl AuthRequest {
    /// Parses the `Authorization` header, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(AccessToken::parse)
    }
}

/// A refused connection. Sent to the client as `status` with `reason` as
/// the body; no session is created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {reason}")]
pub struct AuthRejection {
    pub status: StatusCode,
    pub reason: String,
}

impl AuthRejection {
    #[must_use]
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            reason: reason.into(),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (self.status, self.reason).into_response()
    }
}

/// Decides whether an HTTP client may open a session.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthContext, AuthRejection>;
}

/// Admits everyone as anonymous.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllAuthProvider;

#[async_trait]
impl AuthProvider for AllowAllAuthProvider {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<AuthContext, AuthRejection> {
        Ok(AuthContext::anonymous())
    }
}

/// Admits requests carrying one of a fixed set of bearer tokens.
#[derive(Debug, Clone)]
pub struct BearerTokenAuthProvider {
    tokens: Vec<(String, String)>,
}

impl BearerTokenAuthProvider {
    /// Accepts `token`, reporting `subject` as the caller.
    #[must_use]
    pub fn new(token: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            tokens: vec![(token.into(), subject.into())],
        }
    }

    /// Accepts an additional token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, subject: impl Into<String>) -> Self {
        self.tokens.push((token.into(), subject.into()));
        self
    }
}

#[async_trait]
impl AuthProvider for BearerTokenAuthProvider {
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthContext, AuthRejection> {
        let token = request
            .access_token()
            .filter(AccessToken::is_bearer)
            .ok_or_else(|| AuthRejection::unauthorized("Missing bearer token"))?;
        let (_, subject) = self
            .tokens
            .iter()
            .find(|(known, _)| *known == token.token)
            .ok_or_else(|| AuthRejection::unauthorized("Invalid bearer token"))?;
        Ok(AuthContext::with_subject(subject.clone()).with_token(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn request(authorization: Option<&str>) -> AuthRequest {
        let mut headers = HeaderMap::new();
        if let Some(value) = authorization {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        AuthRequest {
            method: Method::GET,
            uri: Uri::from_static("/sse"),
            headers,
        }
    }

    #[tokio::test]
    async fn allow_all_is_anonymous() {
        let auth = AllowAllAuthProvider.authenticate(&request(None)).await.unwrap();
        assert_eq!(auth, AuthContext::anonymous());
    }

    #[tokio::test]
    async fn bearer_provider_checks_tokens() {
        let provider = BearerTokenAuthProvider::new("rahasia", "guru").with_token("lain", "admin");

        let missing = provider.authenticate(&request(None)).await.unwrap_err();
        assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
        assert_eq!(missing.reason, "Missing bearer token");

        let wrong = provider.authenticate(&request(Some("Bearer salah"))).await.unwrap_err();
        assert_eq!(wrong.reason, "Invalid bearer token");

        let basic = provider.authenticate(&request(Some("Basic rahasia"))).await.unwrap_err();
        assert_eq!(basic.status, StatusCode::UNAUTHORIZED);

        let ok = provider.authenticate(&request(Some("Bearer lain"))).await.unwrap();
        assert_eq!(ok.subject.as_deref(), Some("admin"));
        assert_eq!(ok.token.map(|t| t.token), Some("lain".to_string()));
    }

    #[test]
    fn rejection_response_status() {
        let response = AuthRejection::forbidden("no").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
