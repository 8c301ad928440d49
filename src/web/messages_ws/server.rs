//! MessageServer actor: routes push frames to the connections of each user.

use super::message::{Connect, Deliver, Disconnect, GetConnectionCount, PushText};
use actix::prelude::*;
use std::collections::HashMap;

/// MessageServer tracks live WebSocket connections by user
pub struct MessageServer {
    /// Connection ID counter
    next_id: usize,
    /// Connection ID -> recipient
    connections: HashMap<usize, Recipient<PushText>>,
    /// User ID -> Connection IDs (a user may have several clients open)
    user_connections: HashMap<i32, Vec<usize>>,
}

impl MessageServer {
    pub fn new() -> Self {
        log::info!("MessageServer starting up.");
        Self {
            next_id: 0,
            connections: HashMap::new(),
            user_connections: HashMap::new(),
        }
    }

    fn send_to_user(&self, user_id: i32, frame: &str) -> usize {
        let mut sent = 0;
        if let Some(conn_ids) = self.user_connections.get(&user_id) {
            for conn_id in conn_ids {
                if let Some(recipient) = self.connections.get(conn_id) {
                    recipient.do_send(PushText(frame.to_owned()));
                    sent += 1;
                }
            }
        }
        sent
    }
}

impl Default for MessageServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for MessageServer {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.set_mailbox_capacity(256);
        log::info!("MessageServer started");
    }
}

impl Handler<Connect> for MessageServer {
    type Result = usize;

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) -> Self::Result {
        let conn_id = self.next_id;
        self.next_id += 1;

        self.connections.insert(conn_id, msg.addr);
        self.user_connections
            .entry(msg.user_id)
            .or_default()
            .push(conn_id);

        log::debug!(
            "User {} connected with connection ID {} (total connections: {})",
            msg.user_id,
            conn_id,
            self.connections.len()
        );

        conn_id
    }
}

impl Handler<Disconnect> for MessageServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        if self.connections.remove(&msg.id).is_none() {
            return;
        }

        for conn_ids in self.user_connections.values_mut() {
            conn_ids.retain(|&id| id != msg.id);
        }
        self.user_connections.retain(|_, v| !v.is_empty());

        log::debug!(
            "Connection {} disconnected (total connections: {})",
            msg.id,
            self.connections.len()
        );
    }
}

impl Handler<Deliver> for MessageServer {
    type Result = ();

    fn handle(&mut self, msg: Deliver, _: &mut Context<Self>) {
        let sent: usize = msg
            .user_ids
            .iter()
            .map(|user_id| self.send_to_user(*user_id, &msg.frame))
            .sum();

        log::debug!(
            "Delivered push frame to {} connection(s) of {} user(s)",
            sent,
            msg.user_ids.len()
        );
    }
}

impl Handler<GetConnectionCount> for MessageServer {
    type Result = usize;

    fn handle(&mut self, _: GetConnectionCount, _: &mut Context<Self>) -> Self::Result {
        self.connections.len()
    }
}

impl Supervised for MessageServer {
    fn restarting(&mut self, _: &mut Context<MessageServer>) {
        log::warn!("Restarting the MessageServer.");
    }
}
