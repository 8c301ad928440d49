//! Real-time transport: the contract the unread indicator consumes for push
//! notifications, plus the frame format shared with the push server.

pub mod ws;

use crate::client::{ClientError, ConversationSource, Viewer};
use crate::conversations::NewMessageEvent;
use crate::unread::indicator::{PushEvent, UnreadIndicator};
use actix::Addr;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

pub use self::ws::WsProvider;

/// Frames sent by the server on `/messages.ws`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushFrame {
    NewMessage(NewMessageEvent),
    Pong,
}

/// Callback invoked for every pushed message.
pub type MessageCallback = Box<dyn Fn(NewMessageEvent)>;

/// A push channel for new-message events.
///
/// Providers never reconnect on their own; a dropped connection simply stops
/// delivering events and polling carries the indicator.
pub trait RealtimeProvider {
    type Handle;

    /// Open a channel on behalf of `viewer`.
    fn connect(&self, viewer: &Viewer) -> LocalBoxFuture<'static, Result<Self::Handle, ClientError>>;

    /// Register a callback for new-message events on an open channel.
    fn on_message(&self, handle: &Self::Handle, callback: MessageCallback);

    /// Close the channel. No callbacks fire afterwards.
    fn disconnect(&self, handle: Self::Handle);
}

/// Forward every pushed message into an indicator.
pub fn bind_indicator<P, S>(provider: &P, handle: &P::Handle, indicator: Addr<UnreadIndicator<S>>)
where
    P: RealtimeProvider,
    S: ConversationSource + Unpin + 'static,
{
    provider.on_message(
        handle,
        Box::new(move |event| {
            if indicator.connected() {
                indicator.do_send(PushEvent(event));
            }
        }),
    );
}
