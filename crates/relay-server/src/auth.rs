//! Bearer token resolution.
//!
//! Token validation belongs to the surrounding application; the server only
//! needs a token → user id lookup. [`StaticTokens`] serves development and
//! tests from the `auth.tokens` settings map.

use std::collections::BTreeMap;

/// Resolves a bearer token to the authenticated user id.
pub trait Authenticator: Send + Sync {
    /// The user behind `token`, or `None` if the token is not valid.
    fn authenticate(&self, token: &str) -> Option<i64>;
}

/// Fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: BTreeMap<String, i64>,
}

impl StaticTokens {
    /// Build from a token → user id map.
    pub fn new(tokens: BTreeMap<String, i64>) -> Self {
        Self { tokens }
    }

    /// Add one token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user_id: i64) -> Self {
        let _ = self.tokens.insert(token.into(), user_id);
        self
    }

    /// Number of configured tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no tokens are configured.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokens {
    fn authenticate(&self, token: &str) -> Option<i64> {
        self.tokens.get(token).copied()
    }
}
