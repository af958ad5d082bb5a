/// A snapshot of the polling machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollState {
    /// Whether a poll task is currently attached to the active conversation.
    pub running: bool,

    /// The current generation; any loop holding another value is stale.
    pub generation: u64,
}
