use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("chat_terminal.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter =
    Counter::new("chat_terminal.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("chat_terminal.client.request_duration_seconds");

pub(crate) static POLL_STARTS: Counter = Counter::new("chat_terminal.poll.starts");
pub(crate) static POLL_CYCLES: Counter = Counter::new("chat_terminal.poll.cycles");
pub(crate) static POLL_ERRORS: Counter = Counter::new("chat_terminal.poll.errors");
pub(crate) static POLL_STALE_DISCARDS: Counter = Counter::new("chat_terminal.poll.stale_discards");
pub(crate) static POLL_STOP_ABORTS: Counter = Counter::new("chat_terminal.poll.stop_aborts");

pub(crate) static SESSION_LOGINS: Counter = Counter::new("chat_terminal.session.logins");
pub(crate) static SESSION_LOGIN_FAILURES: Counter =
    Counter::new("chat_terminal.session.login_failures");
pub(crate) static SESSION_SAVE_FAILURES: Counter =
    Counter::new("chat_terminal.session.save_failures");
pub(crate) static MESSAGES_SENT: Counter = Counter::new("chat_terminal.messages.sent");
pub(crate) static MESSAGE_SEND_ERRORS: Counter = Counter::new("chat_terminal.messages.send_errors");
pub(crate) static FRIEND_MUTATIONS: Counter = Counter::new("chat_terminal.friends.mutations");
pub(crate) static FRIEND_MUTATION_ERRORS: Counter =
    Counter::new("chat_terminal.friends.mutation_errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&POLL_STARTS);
    collector.register_counter(&POLL_CYCLES);
    collector.register_counter(&POLL_ERRORS);
    collector.register_counter(&POLL_STALE_DISCARDS);
    collector.register_counter(&POLL_STOP_ABORTS);

    collector.register_counter(&SESSION_LOGINS);
    collector.register_counter(&SESSION_LOGIN_FAILURES);
    collector.register_counter(&SESSION_SAVE_FAILURES);
    collector.register_counter(&MESSAGES_SENT);
    collector.register_counter(&MESSAGE_SEND_ERRORS);
    collector.register_counter(&FRIEND_MUTATIONS);
    collector.register_counter(&FRIEND_MUTATION_ERRORS);
}
