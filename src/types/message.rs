use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

/// A chat message as returned by the server.
///
/// Messages are immutable once fetched.  The server returns them newest
/// first; display order is oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// The server-side message identifier.
    #[serde(with = "crate::utils::id", default)]
    pub id: String,

    /// The user who sent the message.
    #[serde(with = "crate::utils::id")]
    pub sender_id: String,

    /// The message body.
    pub content: String,

    /// When the server recorded the message.
    #[serde(with = "crate::utils::time")]
    pub sent_at: PrimitiveDateTime,
}

impl Message {
    /// Create a new message.
    pub fn new(
        id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
        sent_at: PrimitiveDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            sent_at,
        }
    }
}

/// The envelope around a page of messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePage {
    /// Messages, newest first.
    #[serde(default)]
    pub messages: Vec<Message>,
}
