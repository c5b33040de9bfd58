//! One persistent connection to the mixer and the hello/identify handshake performed on it.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::protocol::{Envelope, Hello, Identified, Identify, OpCode, JSON_SUBPROTOCOL};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        client::IntoClientRequest,
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{auth::compute_auth_token, error::ConnectionError};

/// Raw, full-duplex exchange of discrete frames.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: &Envelope) -> Result<(), ConnectionError>;
    async fn recv(&mut self) -> Result<Envelope, ConnectionError>;
    fn is_open(&self) -> bool;
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Opens fresh transports. Held by the client so it can reconnect after a closure.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Transport>, ConnectionError>;
    fn endpoint(&self) -> &str;
}

pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Result<Self, ConnectionError> {
        let url = url.into();
        let parsed = Url::parse(&url).map_err(|err| ConnectionError::InvalidUrl {
            url: url.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ConnectionError::InvalidUrl {
                reason: format!("unsupported scheme '{}', expected ws or wss", parsed.scheme()),
                url,
            });
        }
        Ok(Self { url })
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self) -> Result<Box<dyn Transport>, ConnectionError> {
        let connect_error = |source: tungstenite::Error| ConnectionError::Connect {
            url: self.url.clone(),
            source: Box::new(source),
        };
        let mut request = self.url.as_str().into_client_request().map_err(connect_error)?;
        request.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(JSON_SUBPROTOCOL),
        );
        let (stream, _) = connect_async(request).await.map_err(connect_error)?;
        Ok(Box::new(WebSocketTransport { stream, open: true }))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    open: bool,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: &Envelope) -> Result<(), ConnectionError> {
        let text = frame.to_text()?;
        if let Err(err) = self.stream.send(Message::Text(text)).await {
            self.open = false;
            return Err(err.into());
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Envelope, ConnectionError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(err)) => {
                    self.open = false;
                    return Err(err.into());
                }
                None => {
                    self.open = false;
                    return Err(ConnectionError::Closed);
                }
            };
            match message {
                Message::Text(text) => return Ok(Envelope::from_text(&text)?),
                Message::Binary(bytes) => return Ok(Envelope::from_slice(&bytes)?),
                Message::Close(frame) => {
                    debug!(?frame, "obs: close frame received");
                    self.open = false;
                    return Err(ConnectionError::Closed);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// An identified connection. Only ever constructed after the server acknowledged Identify.
pub struct Session {
    transport: Box<dyn Transport>,
    rpc_version: u32,
}

impl Session {
    pub async fn connect(
        connector: &dyn Connector,
        password: Option<&str>,
    ) -> Result<Self, ConnectionError> {
        info!(url = connector.endpoint(), "obs: connecting");
        let transport = connector.open().await?;
        let session = Self::handshake(transport, password).await?;
        info!(
            rpc_version = session.rpc_version,
            "obs: connected and identified"
        );
        Ok(session)
    }

    /// Hello, Identify, then wait for Identified while discarding anything else.
    pub async fn handshake(
        mut transport: Box<dyn Transport>,
        password: Option<&str>,
    ) -> Result<Self, ConnectionError> {
        let hello: Hello = transport.recv().await?.decode(OpCode::Hello)?;

        let password = password.filter(|password| !password.is_empty());
        let authentication = match (&hello.authentication, password) {
            (Some(challenge), Some(password)) => Some(compute_auth_token(
                password,
                &challenge.challenge,
                &challenge.salt,
            )),
            (Some(_), None) => {
                warn!("obs: server requires authentication but no password is configured");
                None
            }
            (None, _) => None,
        };

        let identify = Identify {
            rpc_version: hello.rpc_version,
            authentication,
            event_subscriptions: 0,
        };
        transport
            .send(&Envelope::new(OpCode::Identify, &identify)?)
            .await?;

        let rpc_version = loop {
            let frame = transport.recv().await?;
            if frame.is(OpCode::Identified) {
                let identified: Identified = frame.decode(OpCode::Identified)?;
                break identified
                    .negotiated_rpc_version
                    .unwrap_or(hello.rpc_version);
            }
            debug!(op = frame.op, "obs: discarding frame while awaiting identified");
        };

        Ok(Self {
            transport,
            rpc_version,
        })
    }

    pub fn rpc_version(&self) -> u32 {
        self.rpc_version
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub async fn send(&mut self, frame: &Envelope) -> Result<(), ConnectionError> {
        self.transport.send(frame).await
    }

    pub async fn recv(&mut self) -> Result<Envelope, ConnectionError> {
        self.transport.recv().await
    }

    pub async fn close(&mut self) -> Result<(), ConnectionError> {
        self.transport.close().await
    }
}
