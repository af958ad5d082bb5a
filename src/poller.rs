//! Background refresh of the active conversation's message log.
//!
//! A [`Poller`] owns a generation counter published on a `watch` channel.
//! Every [`Poller::start`] advances the generation and spawns a loop that
//! captures it; a loop whose captured generation is no longer current is
//! stale and exits without publishing.  The publish step re-checks the
//! generation while holding the channel's read lock, and both `start` and
//! `stop` advance it under the write lock, so once `stop` returns no callback
//! can fire for the stopped handle even if its fetch was still in flight.

use std::sync::Arc;
use std::time::Duration;

use time::PrimitiveDateTime;
use time::format_description;
use time::macros::format_description as fd;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::RemoteClient;
use crate::observability::{
    POLL_CYCLES, POLL_ERRORS, POLL_STALE_DISCARDS, POLL_STARTS, POLL_STOP_ABORTS,
};
use crate::types::{ConversationRef, Message, Origin, RenderedLine, Session};

/// How long [`Poller::stop`] waits for a loop to exit before aborting it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Receives each rendered snapshot of the message log, oldest first.
pub type UpdateFn = Arc<dyn Fn(Vec<RenderedLine>) + Send + Sync>;

/// Receives a human-readable reason when a fetch fails.
pub type ErrorFn = Arc<dyn Fn(String) + Send + Sync>;

/// A running poll loop.
///
/// Dropping a handle without passing it to [`Poller::stop`] leaves the loop
/// running until the next [`Poller::start`] makes it stale.
#[derive(Debug)]
pub struct PollHandle {
    generation: u64,
    conversation: ConversationRef,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// The generation this loop was started with.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The conversation this loop refreshes.
    pub fn conversation(&self) -> &ConversationRef {
        &self.conversation
    }

    /// Returns true once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns and cancels poll loops against a [`RemoteClient`].
pub struct Poller<C: RemoteClient + ?Sized> {
    client: Arc<C>,
    generation: watch::Sender<u64>,
    max_messages: u32,
    time_format: String,
    stop_timeout: Duration,
}

impl<C: RemoteClient + ?Sized + 'static> Poller<C> {
    /// Create a poller that fetches at most `max_messages` per cycle and
    /// formats timestamps with `time_format`.
    pub fn new(client: Arc<C>, max_messages: u32, time_format: impl Into<String>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            client,
            generation,
            max_messages,
            time_format: time_format.into(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Override how long `stop` waits before aborting a loop.
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// The current generation.  Loops holding any other value are stale.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Start polling `conversation`.
    ///
    /// The first cycle runs immediately; later cycles run every `interval`.
    /// Every older handle becomes stale.  Must be called within a tokio
    /// runtime.
    pub fn start(
        &self,
        conversation: ConversationRef,
        session: Session,
        interval: Duration,
        on_update: UpdateFn,
        on_error: ErrorFn,
    ) -> PollHandle {
        let mut generation = 0;
        self.generation.send_modify(|current| {
            *current += 1;
            generation = *current;
        });
        POLL_STARTS.click();
        debug!(chatroom_id = %conversation, generation, "starting poll loop");

        let cycle = self.cycle(conversation.clone(), session, generation, on_update, on_error);
        let rx = self.generation.subscribe();
        let task = tokio::spawn(run(cycle, rx, interval));
        PollHandle {
            generation,
            conversation,
            task,
        }
    }

    /// Stop the loop behind `handle`.
    ///
    /// Advances the generation if the handle is still current, then waits up
    /// to the stop timeout for the loop to exit, aborting it otherwise.
    pub async fn stop(&self, handle: PollHandle) {
        let PollHandle {
            generation, task, ..
        } = handle;
        self.generation.send_if_modified(|current| {
            if *current == generation {
                *current += 1;
                true
            } else {
                false
            }
        });
        let abort = task.abort_handle();
        match tokio::time::timeout(self.stop_timeout, task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_panic() => {
                warn!(generation, "poll loop panicked");
            }
            Ok(Err(_)) => {}
            Err(_) => {
                POLL_STOP_ABORTS.click();
                debug!(generation, "poll loop did not exit in time; aborting");
                abort.abort();
            }
        }
    }

    /// Run one out-of-band cycle for `conversation` under the current
    /// generation.
    ///
    /// The result is discarded if a `start` or `stop` happens before it
    /// publishes.
    pub fn refresh(
        &self,
        conversation: ConversationRef,
        session: Session,
        on_update: UpdateFn,
        on_error: ErrorFn,
    ) -> JoinHandle<()> {
        let generation = self.generation();
        let cycle = self.cycle(conversation, session, generation, on_update, on_error);
        let rx = self.generation.subscribe();
        tokio::spawn(async move {
            cycle.run_once(&rx).await;
        })
    }

    fn cycle(
        &self,
        conversation: ConversationRef,
        session: Session,
        generation: u64,
        on_update: UpdateFn,
        on_error: ErrorFn,
    ) -> Cycle<C> {
        Cycle {
            client: Arc::clone(&self.client),
            conversation,
            session,
            generation,
            max_messages: self.max_messages,
            time_format: self.time_format.clone(),
            on_update,
            on_error,
        }
    }
}

/// Everything one loop needs, captured at start.
struct Cycle<C: RemoteClient + ?Sized> {
    client: Arc<C>,
    conversation: ConversationRef,
    session: Session,
    generation: u64,
    max_messages: u32,
    time_format: String,
    on_update: UpdateFn,
    on_error: ErrorFn,
}

impl<C: RemoteClient + ?Sized> Cycle<C> {
    fn is_current(&self, rx: &watch::Receiver<u64>) -> bool {
        *rx.borrow() == self.generation
    }

    /// Fetch, render and publish once.  Returns false when stale.
    async fn run_once(&self, rx: &watch::Receiver<u64>) -> bool {
        if !self.is_current(rx) {
            return false;
        }
        POLL_CYCLES.click();
        let result = self
            .client
            .fetch_messages(
                &self.session,
                &self.conversation.chatroom_id,
                self.max_messages,
                0,
            )
            .await;
        match result {
            Ok(messages) => {
                let lines = render_messages(messages, &self.session.user_id, &self.time_format);
                self.publish(rx, || (self.on_update)(lines))
            }
            Err(err) => {
                POLL_ERRORS.click();
                debug!(chatroom_id = %self.conversation, error = %err, "poll fetch failed");
                let reason = format!("Error updating messages: {err}");
                self.publish(rx, || (self.on_error)(reason))
            }
        }
    }

    /// Call `deliver` only if this cycle's generation is still current.
    ///
    /// The channel's read guard is held across the check and the callback,
    /// so a concurrent generation change waits for delivery to finish.
    fn publish(&self, rx: &watch::Receiver<u64>, deliver: impl FnOnce()) -> bool {
        let current = rx.borrow();
        if *current != self.generation {
            POLL_STALE_DISCARDS.click();
            debug!(
                generation = self.generation,
                current = *current,
                "discarding stale poll result"
            );
            return false;
        }
        deliver();
        true
    }
}

async fn run<C: RemoteClient + ?Sized>(
    cycle: Cycle<C>,
    mut rx: watch::Receiver<u64>,
    interval: Duration,
) {
    loop {
        let _ = rx.borrow_and_update();
        if !cycle.run_once(&rx).await {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!(generation = cycle.generation, "poll loop exited");
}

/// Turn a newest-first page of messages into display lines, oldest first.
pub fn render_messages(
    mut messages: Vec<Message>,
    own_user_id: &str,
    time_format: &str,
) -> Vec<RenderedLine> {
    messages.reverse();
    messages
        .into_iter()
        .map(|message| format_message(message, own_user_id, time_format))
        .collect()
}

/// Format a single message for display.
pub fn format_message(message: Message, own_user_id: &str, time_format: &str) -> RenderedLine {
    let origin = if message.sender_id == own_user_id {
        Origin::Own
    } else {
        Origin::Peer
    };
    RenderedLine {
        message_id: message.id,
        timestamp: format_timestamp(message.sent_at, time_format),
        origin,
        content: message.content,
    }
}

/// Format `sent_at` with a `time` format description, falling back to
/// `[hour]:[minute]:[second]` when the description is unusable.
pub fn format_timestamp(sent_at: PrimitiveDateTime, time_format: &str) -> String {
    format_description::parse_borrowed::<2>(time_format)
        .ok()
        .and_then(|items| sent_at.format(&items).ok())
        .unwrap_or_else(|| {
            sent_at
                .format(fd!("[hour]:[minute]:[second]"))
                .unwrap_or_default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;
    use std::sync::Mutex;
    use time::macros::datetime;

    const INTERVAL: Duration = Duration::from_secs(1);

    type Updates = Arc<Mutex<Vec<Vec<RenderedLine>>>>;
    type Errors = Arc<Mutex<Vec<String>>>;

    fn callbacks() -> (UpdateFn, ErrorFn, Updates, Errors) {
        let updates: Updates = Arc::default();
        let errors: Errors = Arc::default();
        let u = Arc::clone(&updates);
        let e = Arc::clone(&errors);
        (
            Arc::new(move |lines| u.lock().unwrap().push(lines)),
            Arc::new(move |reason| e.lock().unwrap().push(reason)),
            updates,
            errors,
        )
    }

    fn message(id: &str, sender: &str, content: &str) -> Message {
        Message::new(id, sender, content, datetime!(2024-05-01 12:00:00))
    }

    fn session() -> Session {
        Session::new("me", "tok")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[test]
    fn newest_first_renders_oldest_first() {
        let lines = render_messages(
            vec![
                message("3", "me", "third"),
                message("2", "peer", "second"),
                message("1", "me", "first"),
            ],
            "me",
            "[hour]:[minute]",
        );
        let contents: Vec<_> = lines.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
        assert_eq!(lines[0].origin, Origin::Own);
        assert_eq!(lines[1].origin, Origin::Peer);
        assert_eq!(lines[0].timestamp, "12:00");
        assert_eq!(lines[0].to_string(), "[12:00] first");
    }

    #[test]
    fn unusable_time_format_falls_back() {
        let at = datetime!(2024-05-01 08:05:09);
        assert_eq!(format_timestamp(at, "[hour]:[minute]:[second]"), "08:05:09");
        assert_eq!(format_timestamp(at, "[bogus"), "08:05:09");
        assert_eq!(format_timestamp(at, "[offset_hour]"), "08:05:09");
        assert_eq!(format_timestamp(at, "[year]-[month]-[day]"), "2024-05-01");
    }

    #[tokio::test(start_paused = true)]
    async fn renders_immediately_then_every_interval() {
        let client = Arc::new(MockClient::new());
        client.set_messages("c1", vec![message("1", "peer", "hello")]);
        let poller = Poller::new(Arc::clone(&client), 50, "[hour]:[minute]:[second]");
        let (on_update, on_error, updates, errors) = callbacks();

        let handle = poller.start(ConversationRef::new("c1"), session(), INTERVAL, on_update, on_error);
        settle().await;
        assert_eq!(updates.lock().unwrap().len(), 1);
        assert_eq!(updates.lock().unwrap()[0][0].content, "hello");

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(updates.lock().unwrap().len(), 2);
        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(updates.lock().unwrap().len(), 4);
        assert!(errors.lock().unwrap().is_empty());

        poller.stop(handle).await;
        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(updates.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_conversation_still_renders() {
        let client = Arc::new(MockClient::new());
        let poller = Poller::new(client, 50, "[hour]");
        let (on_update, on_error, updates, _) = callbacks();
        let handle = poller.start(ConversationRef::new("c1"), session(), INTERVAL, on_update, on_error);
        settle().await;
        assert_eq!(*updates.lock().unwrap(), vec![Vec::<RenderedLine>::new()]);
        poller.stop(handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_limit_is_max_messages() {
        let client = Arc::new(MockClient::new());
        let poller = Poller::new(Arc::clone(&client), 7, "[hour]");
        let (on_update, on_error, _, _) = callbacks();
        let handle = poller.start(ConversationRef::new("c1"), session(), INTERVAL, on_update, on_error);
        settle().await;
        poller.stop(handle).await;
        assert_eq!(client.fetches()[0], ("c1".to_string(), 7));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_then_start_yields_fresh_generation() {
        let client = Arc::new(MockClient::new());
        let poller = Poller::new(client, 50, "[hour]");
        let (on_update, on_error, updates, _) = callbacks();

        let first = poller.start(
            ConversationRef::new("c1"),
            session(),
            INTERVAL,
            Arc::clone(&on_update),
            Arc::clone(&on_error),
        );
        let first_generation = first.generation();
        assert_eq!(poller.generation(), first_generation);
        settle().await;
        poller.stop(first).await;
        assert!(poller.generation() > first_generation);

        let second = poller.start(ConversationRef::new("c1"), session(), INTERVAL, on_update, on_error);
        assert!(second.generation() > first_generation);
        assert_eq!(poller.generation(), second.generation());
        settle().await;
        assert_eq!(updates.lock().unwrap().len(), 2);
        poller.stop(second).await;
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_fetch_for_superseded_generation_never_renders() {
        let client = Arc::new(MockClient::new());
        client.set_messages("a", vec![message("1", "peer", "from a")]);
        client.set_messages("b", vec![message("2", "peer", "from b")]);
        let poller = Poller::new(Arc::clone(&client), 50, "[hour]");
        let (on_update, on_error, updates, _) = callbacks();

        client.hold_fetches();
        let a = poller.start(
            ConversationRef::new("a"),
            session(),
            INTERVAL,
            Arc::clone(&on_update),
            Arc::clone(&on_error),
        );
        settle().await;
        assert_eq!(client.fetches().len(), 1);

        // Starting b supersedes a while a's fetch is still parked.
        let b = poller.start(ConversationRef::new("b"), session(), INTERVAL, on_update, on_error);
        client.release_fetches();
        settle().await;

        let seen: Vec<String> = updates
            .lock()
            .unwrap()
            .iter()
            .flat_map(|lines| lines.iter().map(|l| l.content.clone()))
            .collect();
        assert_eq!(seen, ["from b"]);
        assert!(a.is_finished());

        poller.stop(a).await;
        poller.stop(b).await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_with_fetch_in_flight_suppresses_callback() {
        let client = Arc::new(MockClient::new());
        client.set_messages("c1", vec![message("1", "peer", "late")]);
        let poller = Poller::new(Arc::clone(&client), 50, "[hour]");
        let (on_update, on_error, updates, _) = callbacks();

        client.hold_fetches();
        let handle = poller.start(ConversationRef::new("c1"), session(), INTERVAL, on_update, on_error);
        settle().await;
        poller.stop(handle).await;
        client.release_fetches();
        settle().await;
        assert!(updates.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_errors_are_reported_and_loop_continues() {
        let client = Arc::new(MockClient::new());
        client.fail_fetches(true);
        let poller = Poller::new(Arc::clone(&client), 50, "[hour]");
        let (on_update, on_error, updates, errors) = callbacks();

        let handle = poller.start(ConversationRef::new("c1"), session(), INTERVAL, on_update, on_error);
        settle().await;
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert!(errors.lock().unwrap()[0].starts_with("Error updating messages"));

        client.fail_fetches(false);
        tokio::time::sleep(INTERVAL).await;
        assert_eq!(updates.lock().unwrap().len(), 1);
        assert_eq!(errors.lock().unwrap().len(), 1);
        poller.stop(handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_publishes_under_current_generation_only() {
        let client = Arc::new(MockClient::new());
        let poller = Poller::new(Arc::clone(&client), 50, "[hour]");
        let (on_update, on_error, updates, _) = callbacks();

        poller
            .refresh(
                ConversationRef::new("c1"),
                session(),
                Arc::clone(&on_update),
                Arc::clone(&on_error),
            )
            .await
            .unwrap();
        assert_eq!(updates.lock().unwrap().len(), 1);

        client.hold_fetches();
        let pending = poller.refresh(ConversationRef::new("c1"), session(), on_update, on_error);
        settle().await;
        let handle = poller.start(
            ConversationRef::new("c2"),
            session(),
            INTERVAL,
            Arc::new(|_| {}),
            Arc::new(|_| {}),
        );
        client.release_fetches();
        pending.await.unwrap();
        assert_eq!(updates.lock().unwrap().len(), 1);
        poller.stop(handle).await;
    }
}
