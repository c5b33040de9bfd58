//! Authenticated request/response client for an obs-websocket v5 mixer.
//!
//! All traffic shares one connection. [`ObsClient::request`] holds the client's lock for the
//! whole send-and-await cycle, so concurrent callers queue and no caller can swallow a response
//! meant for another.

use std::sync::Arc;

use serde_json::Value;
use shared::protocol::{Envelope, OpCode, Request, RequestResponse, RequestStatus};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

pub mod auth;
pub mod error;
#[cfg(any(test, feature = "fake"))]
pub mod fake;
pub mod requests;
pub mod transport;

pub use auth::compute_auth_token;
pub use error::{ClientError, ClientResult, ConnectionError};
pub use requests::{Requests, Tagged};
pub use transport::{Connector, Session, Transport, WebSocketConnector};

const DEFAULT_REQUEST_TAG: &str = "req";

#[derive(Default)]
struct ClientState {
    session: Option<Session>,
    request_seq: u64,
}

impl ClientState {
    fn next_request_id(&mut self, tag: Option<&str>) -> String {
        self.request_seq += 1;
        let prefix = match tag {
            Some(tag) if !tag.is_empty() => tag,
            _ => DEFAULT_REQUEST_TAG,
        };
        format!("{prefix}-{}", self.request_seq)
    }

    fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_open)
    }
}

pub struct ObsClient {
    connector: Arc<dyn Connector>,
    password: Option<String>,
    inner: Mutex<ClientState>,
}

impl ObsClient {
    pub fn new(connector: Arc<dyn Connector>, password: Option<String>) -> Self {
        Self {
            connector,
            password,
            inner: Mutex::new(ClientState::default()),
        }
    }

    /// Client for a `ws://` or `wss://` endpoint.
    pub fn websocket(url: impl Into<String>, password: Option<String>) -> ClientResult<Self> {
        let connector = WebSocketConnector::new(url)?;
        Ok(Self::new(Arc::new(connector), password))
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.is_connected()
    }

    /// Connects and identifies unless an open session already exists.
    pub async fn ensure_connected(&self) -> ClientResult<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_connected_locked(&mut inner).await
    }

    async fn ensure_connected_locked(&self, inner: &mut ClientState) -> ClientResult<()> {
        if inner.is_connected() {
            return Ok(());
        }
        inner.session = None;
        let session = Session::connect(self.connector.as_ref(), self.password.as_deref()).await?;
        inner.session = Some(session);
        Ok(())
    }

    pub async fn request(
        &self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> ClientResult<RequestResponse> {
        self.request_tagged(request_type, request_data, None).await
    }

    /// Like [`ObsClient::request`], with `tag` used as the correlation id prefix.
    pub async fn request_tagged(
        &self,
        request_type: &str,
        request_data: Option<Value>,
        tag: Option<&str>,
    ) -> ClientResult<RequestResponse> {
        let mut inner = self.inner.lock().await;
        self.ensure_connected_locked(&mut inner).await?;

        let request_id = inner.next_request_id(tag);
        let frame = Envelope::new(
            OpCode::Request,
            &Request {
                request_type: request_type.to_string(),
                request_id: request_id.clone(),
                request_data,
            },
        )
        .map_err(ConnectionError::from)?;

        let Some(session) = inner.session.as_mut() else {
            return Err(ConnectionError::Closed.into());
        };
        let outcome = exchange(session, &frame, &request_id).await;
        let payload = match outcome {
            Ok(payload) => payload,
            Err(err) => {
                debug!(
                    request_type,
                    request_id = %request_id,
                    error = %err,
                    "obs: dropping session"
                );
                inner.session = None;
                return Err(err.into());
            }
        };
        settle(request_type, request_id, payload)
    }

    /// Closes the connection if one is open. Safe to call repeatedly.
    pub async fn close(&self) -> ClientResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(mut session) = inner.session.take() else {
            return Ok(());
        };
        if session.is_open() {
            session.close().await?;
            info!("obs: connection closed");
        }
        Ok(())
    }
}

/// Sends `frame` and reads until the response carrying `request_id` shows up, returning its
/// `d` payload. Everything else (events, responses to other ids) is dropped here without being
/// decoded.
async fn exchange(
    session: &mut Session,
    frame: &Envelope,
    request_id: &str,
) -> Result<Value, ConnectionError> {
    session.send(frame).await?;
    loop {
        let incoming = session.recv().await?;
        if !incoming.is(OpCode::RequestResponse) {
            trace!(op = incoming.op, "obs: skipping non-response frame");
            continue;
        }
        let received = incoming.d.get("requestId").and_then(Value::as_str);
        if received != Some(request_id) {
            trace!(expected = request_id, ?received, "obs: skipping response for another request");
            continue;
        }
        return Ok(incoming.d);
    }
}

/// Turns a matched response payload into a result. Anything but `result: true` is a remote
/// rejection; the status code is read as a number or a numeric string.
fn settle(
    request_type: &str,
    request_id: String,
    mut payload: Value,
) -> ClientResult<RequestResponse> {
    let status = payload.get("requestStatus");
    let field = |key: &str| status.and_then(|status| status.get(key));
    let code = field("code").and_then(|code| {
        code.as_i64()
            .or_else(|| code.as_str().and_then(|raw| raw.trim().parse().ok()))
    });
    let comment = field("comment").and_then(Value::as_str).map(str::to_string);

    if field("result").and_then(Value::as_bool) != Some(true) {
        return Err(ClientError::Request {
            request_type: request_type.to_string(),
            code,
            comment: comment.unwrap_or_default(),
        });
    }

    let response_type = payload
        .get("requestType")
        .and_then(Value::as_str)
        .unwrap_or(request_type)
        .to_string();
    Ok(RequestResponse {
        request_type: response_type,
        request_id,
        request_status: RequestStatus {
            result: true,
            code,
            comment,
        },
        response_data: payload.get_mut("responseData").map(Value::take),
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod transport_tests;
