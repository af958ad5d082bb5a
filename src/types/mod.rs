// Public modules
pub mod conversation;
pub mod friend;
pub mod friend_response;
pub mod login;
pub mod message;
pub mod poll_state;
pub mod rendered_line;
pub mod session;

// Re-exports
pub use conversation::ConversationRef;
pub use friend::{Friend, FriendRequest};
pub use friend_response::FriendResponse;
pub use login::{LoginHandle, LoginStatus};
pub use message::{Message, MessagePage};
pub use poll_state::PollState;
pub use rendered_line::{Origin, RenderedLine};
pub use session::Session;
