//! Session identifiers.
//!
//! Ids embed the owning user (and chat) so log lines are readable without a
//! lookup, followed by a UUID v7 suffix that keeps them unique and
//! time-ordered.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one live connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Id for a chat session: `{user}_{chat}_{unique}`.
    pub fn chat(user_id: i64, chat_id: i64) -> Self {
        Self(format!("{user_id}_{chat_id}_{}", unique()))
    }

    /// Id for a notification session: `notification_{user}_{unique}`.
    pub fn notification(user_id: i64) -> Self {
        Self(format!("notification_{user_id}_{}", unique()))
    }

    /// Wrap an existing string.
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Borrow the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn unique() -> String {
    Uuid::now_v7().simple().to_string()
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
