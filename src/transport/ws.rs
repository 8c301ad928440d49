//! WebSocket push provider over `awc`.

use super::{MessageCallback, PushFrame, RealtimeProvider};
use crate::client::{ClientError, Viewer};
use actix_web::http::StatusCode;
use actix_web::rt::task::JoinHandle;
use awc::error::{WsClientError, WsProtocolError};
use awc::ws::{Frame, Message};
use futures::future::LocalBoxFuture;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::cell::RefCell;
use std::rc::Rc;
use url::Url;

type Callbacks = Rc<RefCell<Vec<MessageCallback>>>;

/// Connects to the push endpoint with the viewer's bearer token.
#[derive(Clone, Debug)]
pub struct WsProvider {
    endpoint: Url,
}

/// An open push channel. Dropping it without `disconnect` leaves the reader
/// running until the server closes the socket.
pub struct WsHandle {
    callbacks: Callbacks,
    reader: JoinHandle<()>,
}

impl WsProvider {
    /// Provider for an explicit `ws://` or `wss://` endpoint.
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    /// Provider for `/messages.ws` on the API server at `base_url`.
    pub fn for_server(base_url: &Url) -> Result<Self, ClientError> {
        let mut endpoint = crate::client::directory_url(base_url)
            .join("messages.ws")
            .map_err(|e| ClientError::Network(format!("invalid push URL: {}", e)))?;

        let scheme = match endpoint.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        endpoint
            .set_scheme(scheme)
            .map_err(|_| ClientError::Network("invalid push URL scheme".to_string()))?;

        Ok(Self::new(endpoint))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl RealtimeProvider for WsProvider {
    type Handle = WsHandle;

    fn connect(&self, viewer: &Viewer) -> LocalBoxFuture<'static, Result<WsHandle, ClientError>> {
        let endpoint = self.endpoint.clone();
        let token = viewer.token.clone();

        Box::pin(async move {
            if token.is_empty() {
                return Err(ClientError::Auth);
            }

            let (_, framed) = awc::Client::new()
                .ws(endpoint.as_str())
                .bearer_auth(&token)
                .connect()
                .await
                .map_err(|e| match e {
                    WsClientError::InvalidResponseStatus(status)
                        if status == StatusCode::UNAUTHORIZED
                            || status == StatusCode::FORBIDDEN =>
                    {
                        ClientError::Auth
                    }
                    other => ClientError::Network(other.to_string()),
                })?;

            log::info!("Push channel connected to {}", endpoint);

            let callbacks: Callbacks = Rc::new(RefCell::new(Vec::new()));
            let reader = actix_web::rt::spawn(read_frames(framed, callbacks.clone()));

            Ok(WsHandle { callbacks, reader })
        })
    }

    fn on_message(&self, handle: &WsHandle, callback: MessageCallback) {
        handle.callbacks.borrow_mut().push(callback);
    }

    fn disconnect(&self, handle: WsHandle) {
        handle.callbacks.borrow_mut().clear();
        handle.reader.abort();
        log::info!("Push channel disconnected");
    }
}

/// Pump frames until the socket closes or errors.
async fn read_frames<T>(mut framed: T, callbacks: Callbacks)
where
    T: Stream<Item = Result<Frame, WsProtocolError>>
        + Sink<Message, Error = WsProtocolError>
        + Unpin,
{
    while let Some(frame) = framed.next().await {
        match frame {
            Ok(Frame::Text(bytes)) => dispatch(&bytes, &callbacks),
            Ok(Frame::Ping(data)) => {
                if let Err(e) = framed.send(Message::Pong(data)).await {
                    log::warn!("Push channel failed to answer ping: {}", e);
                    break;
                }
            }
            Ok(Frame::Close(reason)) => {
                log::info!("Push channel closed by server: {:?}", reason);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Push channel error: {}", e);
                break;
            }
        }
    }
}

/// Parse one text frame and fan it out. Unknown frames are ignored.
fn dispatch(payload: &[u8], callbacks: &Callbacks) {
    match serde_json::from_slice::<PushFrame>(payload) {
        Ok(PushFrame::NewMessage(event)) => {
            log::debug!(
                "Push: message {} in conversation {}",
                event.message_id,
                event.conversation_id
            );
            for callback in callbacks.borrow().iter() {
                callback(event.clone());
            }
        }
        Ok(PushFrame::Pong) => {}
        Err(e) => log::debug!("Ignoring unrecognized push frame: {}", e),
    }
}
