use std::fmt;

/// Who sent a rendered message, relative to the logged-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Sent by the logged-in user.
    Own,
    /// Sent by the other participant.
    Peer,
}

/// One formatted line of the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    /// Identifier of the message this line renders.
    pub message_id: String,

    /// The send time, formatted with the configured time format.
    pub timestamp: String,

    /// Own or peer message.
    pub origin: Origin,

    /// The message body.
    pub content: String,
}

impl fmt::Display for RenderedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp, self.content)
    }
}
