use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::types::{
    Friend, FriendRequest, FriendResponse, LoginHandle, LoginStatus, Message, MessagePage, Session,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The remote operations the session controller depends on.
///
/// Implementations never panic across this boundary: every transport or
/// protocol failure comes back as an [`Error`].  Friend mutations report
/// non-success statuses as data in [`FriendResponse`].
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Begin an OAuth login.
    async fn start_login(&self) -> Result<LoginHandle>;

    /// Ask whether the login identified by `handle` has completed.
    async fn poll_login(&self, handle: &LoginHandle) -> Result<LoginStatus>;

    /// Fetch up to `limit` messages of a chatroom, newest first.
    async fn fetch_messages(
        &self,
        session: &Session,
        chatroom_id: &str,
        limit: u32,
        skip: u32,
    ) -> Result<Vec<Message>>;

    /// Post a message to a chatroom.
    async fn send_message(&self, session: &Session, chatroom_id: &str, content: &str)
    -> Result<()>;

    /// Fetch the user's friends.
    async fn fetch_friends(&self, session: &Session) -> Result<Vec<Friend>>;

    /// Fetch the user's pending incoming friend requests.
    async fn fetch_friend_requests(&self, session: &Session) -> Result<Vec<FriendRequest>>;

    /// Ask the owner of `email` to become a friend.
    async fn send_friend_request(&self, session: &Session, email: &str) -> Result<FriendResponse>;

    /// Accept the friend request from `friend_id`.
    async fn accept_friend_request(
        &self,
        session: &Session,
        friend_id: &str,
    ) -> Result<FriendResponse>;

    /// Reject the friend request from `friend_id`.
    async fn reject_friend_request(
        &self,
        session: &Session,
        friend_id: &str,
    ) -> Result<FriendResponse>;

    /// Remove `friend_id` from the user's friends.
    async fn delete_friend(&self, session: &Session, friend_id: &str) -> Result<FriendResponse>;
}

/// HTTP client for the chat server.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl ChatClient {
    /// Create a new client for the server at `server_url`.
    pub fn new(server_url: &str) -> Result<Self> {
        Self::with_options(server_url, None)
    }

    /// Create a new client with a custom request timeout.
    pub fn with_options(server_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let base_url = Url::parse(server_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::validation(
                format!("server URL cannot be a base: {server_url}"),
                Some("server_url".to_string()),
            ));
        }

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// The server this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the URL for a path below the server root.
    ///
    /// An empty final segment yields a trailing slash, which some endpoints
    /// require.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                Error::url(
                    format!("server URL cannot be a base: {}", self.base_url),
                    None,
                )
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn default_headers(session: Option<&Session>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(session) = session {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", session.session_token))
                .map_err(|_| Error::authentication("session token is not a valid header value"))?;
            headers.insert(header::AUTHORIZATION, bearer);
        }
        Ok(headers)
    }

    fn request(&self, method: Method, url: Url, session: Option<&Session>) -> Result<RequestBuilder> {
        Ok(self
            .client
            .request(method, url)
            .headers(Self::default_headers(session)?))
    }

    /// Send a request, mapping transport failures onto our error type.
    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(
                    format!("Request timed out: {}", e),
                    Some(self.timeout.as_secs_f64()),
                )
            } else if e.is_connect() {
                Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
            } else {
                Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
            }
        });
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        match &result {
            Ok(response) => {
                debug!(url = %response.url(), status = response.status().as_u16(), "response");
                if !response.status().is_success() {
                    CLIENT_REQUEST_ERRORS.click();
                }
            }
            Err(err) => {
                CLIENT_REQUEST_ERRORS.click();
                warn!(error = %err, "request failed");
            }
        }
        result
    }

    /// Process a non-success response into our Error type.
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value.get("detail").and_then(Value::as_str).map(String::from));
        match status_code {
            401 | 403 => Error::authentication(detail.unwrap_or(body)),
            _ => Error::api(status_code, detail, body),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        session: Option<&Session>,
    ) -> Result<T> {
        let response = self.execute(self.request(Method::GET, url, session)?).await?;
        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        response.json::<T>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    /// POST a friend mutation; any HTTP status comes back as data.
    async fn friend_mutation(
        &self,
        session: &Session,
        segments: &[&str],
        query: (&str, &str),
    ) -> Result<FriendResponse> {
        let mut url = self.endpoint(segments)?;
        url.query_pairs_mut().append_pair(query.0, query.1);
        let response = self
            .execute(self.request(Method::POST, url, Some(session))?)
            .await?;
        let status_code = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            Error::http_client(
                format!("Failed to read response: {}", e),
                Some(Box::new(e)),
            )
        })?;
        let body = serde_json::from_str(&body).unwrap_or(Value::Null);
        Ok(FriendResponse::new(status_code, body))
    }
}

/// The body of `GET /auth/token/{client_id}`.
#[derive(Deserialize)]
struct TokenPoll {
    status: Option<String>,
    #[serde(flatten)]
    session: Option<Session>,
}

#[async_trait]
impl RemoteClient for ChatClient {
    async fn start_login(&self) -> Result<LoginHandle> {
        let url = self.endpoint(&["auth", "login"])?;
        self.get_json(url, None).await
    }

    async fn poll_login(&self, handle: &LoginHandle) -> Result<LoginStatus> {
        let url = self.endpoint(&["auth", "token", &handle.client_id])?;
        let poll: TokenPoll = self.get_json(url, None).await?;
        Ok(match (poll.status.as_deref(), poll.session) {
            (Some("pending"), _) => LoginStatus::Pending,
            (_, Some(session)) => LoginStatus::Complete(session),
            (status, None) => LoginStatus::Failed(format!(
                "unexpected authorization status: {}",
                status.unwrap_or("none")
            )),
        })
    }

    async fn fetch_messages(
        &self,
        session: &Session,
        chatroom_id: &str,
        limit: u32,
        skip: u32,
    ) -> Result<Vec<Message>> {
        let mut url = self.endpoint(&["chat", "chatrooms", chatroom_id, "messages"])?;
        url.query_pairs_mut()
            .append_pair("user_id", &session.user_id)
            .append_pair("limit", &limit.to_string())
            .append_pair("skip", &skip.to_string());
        let page: MessagePage = self.get_json(url, Some(session)).await?;
        Ok(page.messages)
    }

    async fn send_message(
        &self,
        session: &Session,
        chatroom_id: &str,
        content: &str,
    ) -> Result<()> {
        let url = self.endpoint(&["chat", "messages"])?;
        let body = serde_json::json!({
            "chatroom_id": chatroom_id,
            "sender_id": session.user_id,
            "content": content,
        });
        let response = self
            .execute(self.request(Method::POST, url, Some(session))?.json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Ok(())
    }

    async fn fetch_friends(&self, session: &Session) -> Result<Vec<Friend>> {
        let mut url = self.endpoint(&["friends", ""])?;
        url.query_pairs_mut().append_pair("userId", &session.user_id);
        self.get_json(url, Some(session)).await
    }

    async fn fetch_friend_requests(&self, session: &Session) -> Result<Vec<FriendRequest>> {
        let mut url = self.endpoint(&["friends", "requests"])?;
        url.query_pairs_mut().append_pair("userId", &session.user_id);
        self.get_json(url, Some(session)).await
    }

    async fn send_friend_request(&self, session: &Session, email: &str) -> Result<FriendResponse> {
        self.friend_mutation(session, &["friends", ""], ("friend_email", email))
            .await
    }

    async fn accept_friend_request(
        &self,
        session: &Session,
        friend_id: &str,
    ) -> Result<FriendResponse> {
        self.friend_mutation(session, &["friends", "accept"], ("friend_id", friend_id))
            .await
    }

    async fn reject_friend_request(
        &self,
        session: &Session,
        friend_id: &str,
    ) -> Result<FriendResponse> {
        self.friend_mutation(session, &["friends", "reject"], ("friend_id", friend_id))
            .await
    }

    async fn delete_friend(&self, session: &Session, friend_id: &str) -> Result<FriendResponse> {
        self.friend_mutation(session, &["friends", "delete"], ("friend_id", friend_id))
            .await
    }
}
