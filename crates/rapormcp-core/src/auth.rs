//! Authentication context and access token helpers.
//!
//! These types are transport-agnostic. The HTTP listener fills them in from
//! an authentication provider; stdio sessions run without one.

use serde::{Deserialize, Serialize};

/// A credential taken from an `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// `Bearer`, `Basic`, ... as sent.
    pub scheme: String,
    pub token: String,
}

impl AccessToken {
    /// Accepts `Bearer <token>` and a bare `<token>`, which is treated as a
    /// bearer token.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (scheme, token) = match value.split_once(' ') {
            Some((scheme, token)) => (scheme.trim(), token.trim()),
            None => ("Bearer", value),
        };
        (!scheme.is_empty() && !token.is_empty()).then(|| Self {
            scheme: scheme.to_string(),
            token: token.to_string(),
        })
    }

    /// Scheme comparison ignores case.
    #[must_use]
    pub fn is_bearer(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("bearer")
    }
}

/// Authentication context attached to a session.
///
/// The context is fixed when the session is created and never changes for
/// the lifetime of that session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Who authenticated, as named by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<AccessToken>,
    /// Provider specific claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<serde_json::Value>,
}

impl AuthContext {
    /// No subject, no scopes.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_subject(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Self::default()
        }
    }

    /// Attaches the token the client authenticated with.
    #[must_use]
    pub fn with_token(mut self, token: AccessToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Adds a granted scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}
