use serde::{Deserialize, Serialize};

/// An authenticated user's credential record.
///
/// Created by a completed login, persisted by the session store, and removed
/// on logout.  The controller addresses every authenticated request with a
/// read-only snapshot of this record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// The server-side identifier of the logged-in user.
    #[serde(with = "crate::utils::id")]
    pub user_id: String,

    /// Bearer token presented on authenticated requests.
    pub session_token: String,

    /// Expiry as unix seconds, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Session {
    /// Create a session without an expiry.
    pub fn new(user_id: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_token: session_token.into(),
            expires_at: None,
        }
    }

    /// Set the expiry, in unix seconds.
    pub fn with_expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns true if the session carries an expiry at or before `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}
