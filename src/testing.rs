//! Scripted collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use crate::client::RemoteClient;
use crate::error::{Error, Result};
use crate::render::Renderer;
use crate::types::{
    Friend, FriendRequest, FriendResponse, LoginHandle, LoginStatus, Message, RenderedLine,
    Session,
};

#[derive(Default)]
struct MockState {
    messages: HashMap<String, Vec<Message>>,
    friends: Vec<Friend>,
    requests: Vec<FriendRequest>,
    login_script: VecDeque<LoginStatus>,
    fail_start_login: bool,
    login_poll_errors: usize,
    fail_fetches: bool,
    fail_sends: bool,
    fail_friend_calls: bool,
    friend_response: Option<FriendResponse>,
    fetches: Vec<(String, u32)>,
    sent: Vec<(String, String)>,
    mutations: Vec<String>,
    login_polls: usize,
    list_fetches: usize,
}

/// An in-memory [`RemoteClient`].
///
/// Message fetches can be parked with [`MockClient::hold_fetches`] to model a
/// request that is in flight while the caller changes state.
pub(crate) struct MockClient {
    state: Mutex<MockState>,
    held: watch::Sender<bool>,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        let (held, _) = watch::channel(false);
        Self {
            state: Mutex::new(MockState::default()),
            held,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Server-order (newest first) messages for `chatroom_id`.
    pub(crate) fn set_messages(&self, chatroom_id: &str, messages: Vec<Message>) {
        self.with_state(|s| {
            s.messages.insert(chatroom_id.to_string(), messages);
        });
    }

    pub(crate) fn set_friends(&self, friends: Vec<Friend>) {
        self.with_state(|s| s.friends = friends);
    }

    pub(crate) fn set_friend_requests(&self, requests: Vec<FriendRequest>) {
        self.with_state(|s| s.requests = requests);
    }

    /// Successive `poll_login` answers; `Pending` once the script runs out.
    pub(crate) fn script_login(&self, statuses: Vec<LoginStatus>) {
        self.with_state(|s| s.login_script = statuses.into());
    }

    /// Fails the next `count` `poll_login` calls before following the script.
    pub(crate) fn fail_login_polls(&self, count: usize) {
        self.with_state(|s| s.login_poll_errors = count);
    }

    pub(crate) fn fail_start_login(&self, fail: bool) {
        self.with_state(|s| s.fail_start_login = fail);
    }

    pub(crate) fn fail_fetches(&self, fail: bool) {
        self.with_state(|s| s.fail_fetches = fail);
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.with_state(|s| s.fail_sends = fail);
    }

    pub(crate) fn fail_friend_calls(&self, fail: bool) {
        self.with_state(|s| s.fail_friend_calls = fail);
    }

    /// The answer to every friend mutation; 200 with an empty body if unset.
    pub(crate) fn respond_to_friend_calls(&self, response: FriendResponse) {
        self.with_state(|s| s.friend_response = Some(response));
    }

    pub(crate) fn hold_fetches(&self) {
        self.held.send_replace(true);
    }

    pub(crate) fn release_fetches(&self) {
        self.held.send_replace(false);
    }

    /// `(chatroom_id, limit)` of every message fetch, in call order.
    pub(crate) fn fetches(&self) -> Vec<(String, u32)> {
        self.with_state(|s| s.fetches.clone())
    }

    /// `(chatroom_id, content)` of every sent message.
    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.sent.clone())
    }

    /// Friend mutations as `action:argument`.
    pub(crate) fn mutations(&self) -> Vec<String> {
        self.with_state(|s| s.mutations.clone())
    }

    pub(crate) fn login_polls(&self) -> usize {
        self.with_state(|s| s.login_polls)
    }

    /// Number of friend and friend-request list fetches.
    pub(crate) fn list_fetches(&self) -> usize {
        self.with_state(|s| s.list_fetches)
    }

    fn mutate(&self, action: &str, argument: &str) -> Result<FriendResponse> {
        self.with_state(|s| {
            if s.fail_friend_calls {
                return Err(Error::connection("connection refused", None));
            }
            s.mutations.push(format!("{action}:{argument}"));
            Ok(s
                .friend_response
                .clone()
                .unwrap_or_else(|| FriendResponse::new(200, json!({}))))
        })
    }
}

#[async_trait]
impl RemoteClient for MockClient {
    async fn start_login(&self) -> Result<LoginHandle> {
        self.with_state(|s| {
            if s.fail_start_login {
                Err(Error::connection("connection refused", None))
            } else {
                Ok(LoginHandle {
                    client_id: "client-1".to_string(),
                    auth_url: Some("https://auth.example.com/authorize".to_string()),
                })
            }
        })
    }

    async fn poll_login(&self, _: &LoginHandle) -> Result<LoginStatus> {
        self.with_state(|s| {
            s.login_polls += 1;
            if s.login_poll_errors > 0 {
                s.login_poll_errors -= 1;
                return Err(Error::connection("connection reset", None));
            }
            Ok(s.login_script.pop_front().unwrap_or(LoginStatus::Pending))
        })
    }

    async fn fetch_messages(
        &self,
        _: &Session,
        chatroom_id: &str,
        limit: u32,
        _: u32,
    ) -> Result<Vec<Message>> {
        self.with_state(|s| s.fetches.push((chatroom_id.to_string(), limit)));
        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !held).await;
        self.with_state(|s| {
            if s.fail_fetches {
                return Err(Error::connection("connection refused", None));
            }
            let mut messages = s.messages.get(chatroom_id).cloned().unwrap_or_default();
            messages.truncate(limit as usize);
            Ok(messages)
        })
    }

    async fn send_message(&self, _: &Session, chatroom_id: &str, content: &str) -> Result<()> {
        self.with_state(|s| {
            if s.fail_sends {
                return Err(Error::api(500, None, "internal error"));
            }
            s.sent.push((chatroom_id.to_string(), content.to_string()));
            Ok(())
        })
    }

    async fn fetch_friends(&self, _: &Session) -> Result<Vec<Friend>> {
        self.with_state(|s| {
            s.list_fetches += 1;
            if s.fail_friend_calls {
                return Err(Error::connection("connection refused", None));
            }
            Ok(s.friends.clone())
        })
    }

    async fn fetch_friend_requests(&self, _: &Session) -> Result<Vec<FriendRequest>> {
        self.with_state(|s| {
            s.list_fetches += 1;
            if s.fail_friend_calls {
                return Err(Error::connection("connection refused", None));
            }
            Ok(s.requests.clone())
        })
    }

    async fn send_friend_request(&self, _: &Session, email: &str) -> Result<FriendResponse> {
        self.mutate("send", email)
    }

    async fn accept_friend_request(&self, _: &Session, friend_id: &str) -> Result<FriendResponse> {
        self.mutate("accept", friend_id)
    }

    async fn reject_friend_request(&self, _: &Session, friend_id: &str) -> Result<FriendResponse> {
        self.mutate("reject", friend_id)
    }

    async fn delete_friend(&self, _: &Session, friend_id: &str) -> Result<FriendResponse> {
        self.mutate("delete", friend_id)
    }
}

/// A render instruction captured by [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Rendered {
    Log(Vec<RenderedLine>),
    ClearLog,
    Friends(Vec<Friend>),
    Requests(Vec<FriendRequest>),
    Notice(String),
}

/// A [`Renderer`] that records every instruction.
#[derive(Default)]
pub(crate) struct RecordingRenderer {
    events: Mutex<Vec<Rendered>>,
}

impl RecordingRenderer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn events(&self) -> Vec<Rendered> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn take(&self) -> Vec<Rendered> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    /// Every message-log snapshot, as lists of contents.
    pub(crate) fn logs(&self) -> Vec<Vec<String>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Rendered::Log(lines) => Some(lines.into_iter().map(|l| l.content).collect()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn notices(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Rendered::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Rendered) {
        self.events.lock().unwrap().push(event);
    }
}

impl Renderer for RecordingRenderer {
    fn render_message_log(&self, lines: &[RenderedLine]) {
        self.record(Rendered::Log(lines.to_vec()));
    }

    fn clear_message_log(&self) {
        self.record(Rendered::ClearLog);
    }

    fn render_friend_list(&self, friends: &[Friend]) {
        self.record(Rendered::Friends(friends.to_vec()));
    }

    fn render_friend_request_list(&self, requests: &[FriendRequest]) {
        self.record(Rendered::Requests(requests.to_vec()));
    }

    fn notify(&self, message: &str) {
        self.record(Rendered::Notice(message.to_string()));
    }
}
