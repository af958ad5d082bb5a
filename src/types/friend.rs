use serde::{Deserialize, Serialize};

/// An accepted friend, with the chatroom shared with them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Friend {
    /// The friend's user identifier.
    #[serde(with = "crate::utils::id")]
    pub id: String,

    /// Display name.
    pub name: String,

    /// The chatroom shared with this friend.
    #[serde(with = "crate::utils::id", default)]
    pub chatroom_id: String,
}

impl Friend {
    /// Create a friend entry.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        chatroom_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            chatroom_id: chatroom_id.into(),
        }
    }
}

/// A pending incoming friend request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendRequest {
    /// The requesting user's identifier.
    #[serde(with = "crate::utils::id")]
    pub id: String,

    /// Display name.
    pub name: String,
}

impl FriendRequest {
    /// Create a friend request entry.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn friend_list_deserializes() {
        let friends: Vec<Friend> = serde_json::from_value(json!([
            {"id": 3, "name": "Ada", "chatroom_id": 9, "email": "ada@example.com"},
            {"id": "4", "name": "Lin"}
        ]))
        .unwrap();
        assert_eq!(friends[0], Friend::new("3", "Ada", "9"));
        assert_eq!(friends[1].chatroom_id, "");
    }
}
