//! The session controller.
//!
//! [`ChatSession`] owns the logged-in [`Session`], the active conversation,
//! the friend lists and the [`Poller`].  The REPL drives it through `&mut self`
//! methods, which makes the foreground the single control context: every
//! state transition stops the running poll loop before starting another, so
//! at most one loop is ever current.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::chat::config::ChatConfig;
use crate::client::RemoteClient;
use crate::error::{Error, Result};
use crate::observability::{
    FRIEND_MUTATION_ERRORS, FRIEND_MUTATIONS, MESSAGE_SEND_ERRORS, MESSAGES_SENT,
    SESSION_LOGIN_FAILURES, SESSION_LOGINS, SESSION_SAVE_FAILURES,
};
use crate::poller::{ErrorFn, PollHandle, Poller, UpdateFn};
use crate::render::Renderer;
use crate::store::SessionStore;
use crate::types::{
    ConversationRef, Friend, FriendRequest, LoginHandle, LoginStatus, PollState, Session,
};

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session.
    LoggedOut,
    /// Logged in, nothing selected.
    NoConversation,
    /// A conversation is selected.  `suspended` while a foreground
    /// interaction has paused polling.
    Active { suspended: bool },
}

/// How long `login` waits for the user to finish authorizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginPolicy {
    /// Number of completion checks before giving up.
    pub attempts: u32,
    /// Delay between checks.
    pub spacing: Duration,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            spacing: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
enum FriendAction {
    Send(String),
    Accept(String),
    Reject(String),
    Delete(String),
}

impl FriendAction {
    fn success_message(&self) -> &'static str {
        match self {
            FriendAction::Send(_) => "Successfully sent friend request",
            FriendAction::Accept(_) => "Successfully accepted friend request",
            FriendAction::Reject(_) => "Successfully rejected friend request",
            FriendAction::Delete(_) => "Successfully deleted friend",
        }
    }

    fn failure_message(&self) -> &'static str {
        match self {
            FriendAction::Send(_) => "Error sending friend request",
            FriendAction::Accept(_) => "Failed to accept friend request",
            FriendAction::Reject(_) => "Failed to reject friend request",
            FriendAction::Delete(_) => "Failed to delete friend",
        }
    }
}

/// Drives login, conversation selection, polling and friend management.
pub struct ChatSession<C: RemoteClient + ?Sized> {
    client: Arc<C>,
    renderer: Arc<dyn Renderer>,
    store: SessionStore,
    poller: Poller<C>,
    interval: Duration,
    login_policy: LoginPolicy,
    interrupted: Option<Arc<AtomicBool>>,
    session: Option<Session>,
    conversation: Option<ConversationRef>,
    handle: Option<PollHandle>,
    suspend_depth: u32,
    friends_open: bool,
    friends: Vec<Friend>,
    friend_requests: Vec<FriendRequest>,
}

impl<C: RemoteClient + ?Sized + 'static> ChatSession<C> {
    /// Creates a logged-out session controller.
    ///
    /// The credential record lives at [`ChatConfig::auth_path`].
    pub fn new(client: Arc<C>, renderer: Arc<dyn Renderer>, config: &ChatConfig) -> Self {
        let poller = Poller::new(
            Arc::clone(&client),
            config.max_messages,
            config.time_format.clone(),
        );
        Self {
            client,
            renderer,
            store: SessionStore::new(config.auth_path()),
            poller,
            interval: config.refresh_interval(),
            login_policy: LoginPolicy::default(),
            interrupted: None,
            session: None,
            conversation: None,
            handle: None,
            suspend_depth: 0,
            friends_open: false,
            friends: Vec::new(),
            friend_requests: Vec::new(),
        }
    }

    /// Uses `store` for the credential record.
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = store;
        self
    }

    /// Overrides how long `login` waits for authorization.
    pub fn with_login_policy(mut self, login_policy: LoginPolicy) -> Self {
        self.login_policy = login_policy;
        self
    }

    /// Attaches an interrupt flag that cancels a pending login.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> Phase {
        match (&self.session, &self.conversation) {
            (None, _) => Phase::LoggedOut,
            (Some(_), None) => Phase::NoConversation,
            (Some(_), Some(_)) => Phase::Active {
                suspended: self.suspend_depth > 0,
            },
        }
    }

    /// Whether a poll loop is attached, and the current generation.
    pub fn poll_state(&self) -> PollState {
        PollState {
            running: self.handle.is_some(),
            generation: self.poller.generation(),
        }
    }

    /// The logged-in session, if any.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The selected conversation, if any.
    pub fn conversation(&self) -> Option<&ConversationRef> {
        self.conversation.as_ref()
    }

    /// Friends in display order.
    pub fn friends(&self) -> &[Friend] {
        &self.friends
    }

    /// Pending friend requests in display order.
    pub fn friend_requests(&self) -> &[FriendRequest] {
        &self.friend_requests
    }

    /// Loads the persisted session, if there is a usable one.
    ///
    /// An expired record is removed.  Returns true when logged in afterwards.
    pub async fn restore(&mut self) -> bool {
        let Some(session) = self.store.load() else {
            return false;
        };
        if session.is_expired(OffsetDateTime::now_utc().unix_timestamp()) {
            info!(user_id = %session.user_id, "saved session has expired");
            self.store.clear();
            return false;
        }
        info!(user_id = %session.user_id, "restored saved session");
        self.session = Some(session);
        self.refresh_friends().await;
        true
    }

    /// Runs the OAuth login flow.
    ///
    /// On success the session is persisted, any conversation is dropped and
    /// the friend lists are refreshed.  On failure nothing changes.
    pub async fn login(&mut self) -> bool {
        if let Some(flag) = &self.interrupted {
            flag.store(false, Ordering::Relaxed);
        }
        let session = match self.authorize().await {
            Ok(session) => session,
            Err(err) => {
                SESSION_LOGIN_FAILURES.click();
                warn!(error = %err, "login failed");
                let message = if err.is_abort() {
                    "Login cancelled".to_string()
                } else {
                    format!("Login failed: {err}")
                };
                self.renderer.notify(&message);
                return false;
            }
        };

        self.stop_polling().await;
        self.conversation = None;
        self.suspend_depth = 0;
        self.friends_open = false;
        self.renderer.clear_message_log();
        if !self.store.save(&session) {
            SESSION_SAVE_FAILURES.click();
            self.renderer
                .notify("Logged in, but the session could not be saved");
        }
        SESSION_LOGINS.click();
        info!(user_id = %session.user_id, "logged in");
        self.session = Some(session);
        self.renderer.notify("Login successful");
        self.refresh_friends().await;
        true
    }

    async fn authorize(&self) -> Result<Session> {
        let handle = self.client.start_login().await?;
        match &handle.auth_url {
            Some(url) => self
                .renderer
                .notify(&format!("Open this URL to log in: {url}")),
            None => self.renderer.notify("Waiting for authorization"),
        }
        self.await_authorization(&handle).await
    }

    async fn await_authorization(&self, handle: &LoginHandle) -> Result<Session> {
        let LoginPolicy { attempts, spacing } = self.login_policy;
        for attempt in 0..attempts {
            if self.is_interrupted() {
                return Err(Error::abort("login cancelled"));
            }
            match self.client.poll_login(handle).await {
                Ok(LoginStatus::Pending) => {}
                Ok(LoginStatus::Complete(session)) => return Ok(session),
                Ok(LoginStatus::Failed(reason)) => return Err(Error::authentication(reason)),
                Err(err) => {
                    debug!(attempt = attempt + 1, error = %err, "authorization check failed");
                }
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(spacing).await;
            }
        }
        Err(Error::timeout(
            "authorization was not completed in time",
            Some((spacing * attempts).as_secs_f64()),
        ))
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Makes `conversation` the active one and starts polling it.
    ///
    /// Any previous loop is stopped first, including a suspended one, and the
    /// displayed log is cleared.
    pub async fn select_conversation(&mut self, conversation: ConversationRef) -> bool {
        if self.session.is_none() {
            self.renderer.notify("Log in first");
            return false;
        }
        self.stop_polling().await;
        self.suspend_depth = 0;
        self.friends_open = false;
        self.renderer.clear_message_log();
        debug!(chatroom_id = %conversation, "selected conversation");
        self.conversation = Some(conversation);
        self.start_polling();
        true
    }

    /// Selects the chatroom of the friend at `index` (0-based) in
    /// [`friends`](Self::friends).
    pub async fn select_friend(&mut self, index: usize) -> bool {
        let Some(friend) = self.friends.get(index) else {
            self.renderer.notify("No such friend");
            return false;
        };
        if friend.chatroom_id.is_empty() {
            let message = format!("No chat with {} yet", friend.name);
            self.renderer.notify(&message);
            return false;
        }
        let conversation = ConversationRef::new(friend.chatroom_id.clone());
        self.select_conversation(conversation).await
    }

    /// Pauses polling around a foreground interaction.
    ///
    /// Nested calls only deepen the suspension.
    pub async fn suspend(&mut self) {
        self.suspend_depth += 1;
        if self.suspend_depth == 1 {
            self.stop_polling().await;
        }
    }

    /// Undoes one [`suspend`](Self::suspend).  The outermost resume restarts
    /// polling of the selected conversation.
    pub fn resume(&mut self) {
        if self.suspend_depth == 0 {
            return;
        }
        self.suspend_depth -= 1;
        if self.suspend_depth == 0 && self.handle.is_none() {
            self.start_polling();
        }
    }

    /// Suspends polling and shows fresh friend lists.
    ///
    /// Opening the view again only redraws the lists.
    pub async fn open_friends(&mut self) {
        if self.session.is_none() {
            self.renderer.notify("Log in first");
            return;
        }
        if !self.friends_open {
            self.friends_open = true;
            self.suspend().await;
        }
        self.refresh_friends().await;
    }

    /// Leaves the friends view and resumes polling.
    pub fn close_friends(&mut self) {
        if self.friends_open {
            self.friends_open = false;
            self.resume();
        }
    }

    /// Stops polling and forgets the session.  Safe to call when logged out.
    pub async fn logout(&mut self) {
        self.stop_polling().await;
        let was_logged_in = self.session.take().is_some();
        self.conversation = None;
        self.suspend_depth = 0;
        self.friends_open = false;
        self.friends.clear();
        self.friend_requests.clear();
        self.renderer.clear_message_log();
        if !self.store.clear() {
            self.renderer.notify("Could not remove the saved session");
        }
        if was_logged_in {
            info!("logged out");
            self.renderer.notify("Logged out");
        }
    }

    /// Sends `content` to the active conversation.
    ///
    /// Blank content is ignored.  Returns false when nothing was sent, so the
    /// caller can keep the input.
    pub async fn send_message(&mut self, content: &str) -> bool {
        if content.trim().is_empty() {
            return false;
        }
        let (Some(session), Some(conversation)) = (&self.session, &self.conversation) else {
            self.renderer.notify("Select a conversation first");
            return false;
        };
        match self
            .client
            .send_message(session, &conversation.chatroom_id, content)
            .await
        {
            Ok(()) => {
                MESSAGES_SENT.click();
                if self.suspend_depth == 0 {
                    // Detached; a stale generation keeps it from rendering.
                    let _ = self.poller.refresh(
                        conversation.clone(),
                        session.clone(),
                        self.on_update(),
                        self.on_error(),
                    );
                }
                true
            }
            Err(err) => {
                MESSAGE_SEND_ERRORS.click();
                warn!(chatroom_id = %conversation, error = %err, "send failed");
                self.renderer
                    .notify(&format!("Failed to send message: {err}"));
                false
            }
        }
    }

    /// Asks the owner of `email` to become a friend.
    pub async fn send_friend_request(&mut self, email: &str) -> bool {
        let email = email.trim();
        if email.is_empty() {
            self.renderer.notify("Enter your friend's email");
            return false;
        }
        self.mutate_friends(FriendAction::Send(email.to_string()))
            .await
    }

    /// Accepts the request at `index` (0-based) in
    /// [`friend_requests`](Self::friend_requests).
    pub async fn accept_friend_request(&mut self, index: usize) -> bool {
        match self.friend_requests.get(index) {
            Some(request) => {
                let action = FriendAction::Accept(request.id.clone());
                self.mutate_friends(action).await
            }
            None => self.no_such_request(),
        }
    }

    /// Rejects the request at `index` (0-based) in
    /// [`friend_requests`](Self::friend_requests).
    pub async fn reject_friend_request(&mut self, index: usize) -> bool {
        match self.friend_requests.get(index) {
            Some(request) => {
                let action = FriendAction::Reject(request.id.clone());
                self.mutate_friends(action).await
            }
            None => self.no_such_request(),
        }
    }

    /// Removes the friend at `index` (0-based) in [`friends`](Self::friends).
    pub async fn delete_friend(&mut self, index: usize) -> bool {
        match self.friends.get(index) {
            Some(friend) => {
                let action = FriendAction::Delete(friend.id.clone());
                self.mutate_friends(action).await
            }
            None => {
                self.renderer.notify("No such friend");
                false
            }
        }
    }

    fn no_such_request(&self) -> bool {
        self.renderer.notify("No such friend request");
        false
    }

    async fn mutate_friends(&mut self, action: FriendAction) -> bool {
        let Some(session) = &self.session else {
            self.renderer.notify("Log in first");
            return false;
        };
        FRIEND_MUTATIONS.click();
        let result = match &action {
            FriendAction::Send(email) => self.client.send_friend_request(session, email).await,
            FriendAction::Accept(id) => self.client.accept_friend_request(session, id).await,
            FriendAction::Reject(id) => self.client.reject_friend_request(session, id).await,
            FriendAction::Delete(id) => self.client.delete_friend(session, id).await,
        };
        match result {
            Ok(response) if response.is_success() => {
                debug!(?action, "friend mutation succeeded");
                self.renderer.notify(action.success_message());
                self.refresh_friends().await;
                true
            }
            Ok(response) => {
                FRIEND_MUTATION_ERRORS.click();
                debug!(?action, status = response.status_code, "friend mutation rejected");
                self.renderer
                    .notify(response.detail().unwrap_or(action.failure_message()));
                false
            }
            Err(err) => {
                FRIEND_MUTATION_ERRORS.click();
                warn!(?action, error = %err, "friend mutation failed");
                self.renderer.notify(action.failure_message());
                false
            }
        }
    }

    /// Replaces both friend lists with the server's and renders them.
    ///
    /// A failed fetch keeps the previous list.
    pub async fn refresh_friends(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        match self.client.fetch_friends(session).await {
            Ok(friends) => self.friends = friends,
            Err(err) => {
                warn!(error = %err, "could not fetch friends");
                self.renderer
                    .notify(&format!("Failed to get friends list: {err}"));
            }
        }
        match self.client.fetch_friend_requests(session).await {
            Ok(requests) => self.friend_requests = requests,
            Err(err) => {
                warn!(error = %err, "could not fetch friend requests");
                self.renderer
                    .notify(&format!("Failed to get friend requests: {err}"));
            }
        }
        self.renderer.render_friend_list(&self.friends);
        self.renderer
            .render_friend_request_list(&self.friend_requests);
    }

    /// Stops polling with the bounded wait.  Call before exiting.
    pub async fn shutdown(&mut self) {
        self.stop_polling().await;
    }

    fn on_update(&self) -> UpdateFn {
        let renderer = Arc::clone(&self.renderer);
        Arc::new(move |lines| renderer.render_message_log(&lines))
    }

    fn on_error(&self) -> ErrorFn {
        let renderer = Arc::clone(&self.renderer);
        Arc::new(move |reason| renderer.notify(&reason))
    }

    fn start_polling(&mut self) {
        if let (Some(session), Some(conversation)) = (&self.session, &self.conversation) {
            let handle = self.poller.start(
                conversation.clone(),
                session.clone(),
                self.interval,
                self.on_update(),
                self.on_error(),
            );
            self.handle = Some(handle);
        }
    }

    async fn stop_polling(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.poller.stop(handle).await;
        }
    }
}
