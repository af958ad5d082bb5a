use serde::{Deserialize, Serialize};

use crate::types::Session;

/// A started OAuth login, returned by `GET /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginHandle {
    /// Identifier used to poll for completion.
    pub client_id: String,

    /// URL the user must open to authorize this client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
}

/// The state of a pending login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    /// The user has not finished authorizing yet.
    Pending,
    /// Authorization finished and produced a session.
    Complete(Session),
    /// The server answered with neither a pending marker nor a session.
    Failed(String),
}
