//! One `/messages.ws` socket.
//!
//! The socket is write-mostly: the server pushes `new_message` frames and the
//! client only has to prove it is alive, either with ping frames or with a
//! plain-text `ping` that is answered with a `pong` frame.

use super::message::{Connect, Disconnect, PushText};
use super::server::MessageServer;
use crate::constants::{WS_CLIENT_TIMEOUT, WS_HEARTBEAT_INTERVAL};
use crate::transport::PushFrame;
use actix::prelude::*;
use actix_web_actors::ws;
use std::time::Instant;

pub struct MessageConnection {
    user_id: i32,
    /// Assigned by the server once registration completes.
    conn_id: Option<usize>,
    last_seen: Instant,
    server: Addr<MessageServer>,
}

impl MessageConnection {
    pub fn new(user_id: i32, server: Addr<MessageServer>) -> Self {
        Self {
            user_id,
            conn_id: None,
            last_seen: Instant::now(),
            server,
        }
    }

    fn alive(&mut self) {
        self.last_seen = Instant::now();
    }

    fn check_alive(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if self.last_seen.elapsed() > WS_CLIENT_TIMEOUT {
            log::debug!("Push socket for user {} went quiet; closing", self.user_id);
            ctx.stop();
        } else {
            ctx.ping(b"");
        }
    }

    fn answer_text(&self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        if text.trim() != "ping" {
            return;
        }
        match serde_json::to_string(&PushFrame::Pong) {
            Ok(pong) => ctx.text(pong),
            Err(e) => log::warn!("Unable to serialize pong frame: {}", e),
        }
    }
}

impl Actor for MessageConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.run_interval(WS_HEARTBEAT_INTERVAL, Self::check_alive);

        let register = Connect {
            addr: ctx.address().recipient(),
            user_id: self.user_id,
        };

        // Frames are held back until the server knows about this socket.
        ctx.wait(self.server.send(register).into_actor(self).map(
            |registered, act, ctx| match registered {
                Ok(conn_id) => {
                    act.conn_id = Some(conn_id);
                    log::debug!("Push socket {} open for user {}", conn_id, act.user_id);
                }
                Err(e) => {
                    log::warn!("Push server rejected socket for user {}: {}", act.user_id, e);
                    ctx.stop();
                }
            },
        ));
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if let Some(id) = self.conn_id.take() {
            self.server.do_send(Disconnect { id });
        }
        Running::Stop
    }
}

impl Handler<PushText> for MessageConnection {
    type Result = ();

    fn handle(&mut self, msg: PushText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MessageConnection {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Push socket protocol error for user {}: {}", self.user_id, e);
                ctx.stop();
                return;
            }
        };

        match frame {
            ws::Message::Ping(data) => {
                self.alive();
                ctx.pong(&data);
            }
            ws::Message::Pong(_) => self.alive(),
            ws::Message::Text(text) => {
                self.alive();
                self.answer_text(&text, ctx);
            }
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            // Pushes are one-way; fragmented client frames are not supported.
            ws::Message::Continuation(_) => ctx.stop(),
            ws::Message::Binary(_) | ws::Message::Nop => {}
        }
    }
}
