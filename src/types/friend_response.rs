use serde_json::Value;

/// The outcome of a friend mutation.
///
/// Non-success statuses are data here, not errors: the caller decides what to
/// tell the user, usually the server's `detail` message.
#[derive(Debug, Clone, PartialEq)]
pub struct FriendResponse {
    /// HTTP status code.
    pub status_code: u16,

    /// The parsed response body; `Value::Null` when the body was not JSON.
    pub body: Value,
}

impl FriendResponse {
    /// Create a response record.
    pub fn new(status_code: u16, body: Value) -> Self {
        Self { status_code, body }
    }

    /// The server accepted the mutation.
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// The server-provided `detail` message, if any.
    pub fn detail(&self) -> Option<&str> {
        self.body.get("detail").and_then(Value::as_str)
    }
}
