use serde::{Deserialize, Serialize};

/// Identifies the chat thread currently displayed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationRef {
    /// The server-side chatroom identifier.
    #[serde(with = "crate::utils::id")]
    pub chatroom_id: String,
}

impl ConversationRef {
    /// Create a reference to the given chatroom.
    pub fn new(chatroom_id: impl Into<String>) -> Self {
        Self {
            chatroom_id: chatroom_id.into(),
        }
    }
}

impl std::fmt::Display for ConversationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.chatroom_id)
    }
}
