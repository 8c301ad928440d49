//! Actor that keeps an [`UnreadTally`] current.
//!
//! On start, and whenever the viewer changes, it fetches the conversation
//! list immediately and then every [`UNREAD_POLL_INTERVAL`]. Pushed message
//! events are folded in as they arrive. The observer is called only when the
//! rendered label actually changes.

use super::{Outcome, Phase, UnreadTally};
use crate::client::{ClientError, ConversationSource, Viewer};
use crate::constants::UNREAD_POLL_INTERVAL;
use crate::conversations::{Conversation, NewMessageEvent};
use actix::prelude::*;
use std::time::Duration;

/// Called with the new badge text (`None` hides the badge).
pub type LabelObserver = Box<dyn FnMut(Option<&str>)>;

/// Replace the viewer. `None` stops polling and clears the badge.
pub struct SetViewer(pub Option<Viewer>);

impl Message for SetViewer {
    type Result = ();
}

/// A new-message event from the push channel.
pub struct PushEvent(pub NewMessageEvent);

impl Message for PushEvent {
    type Result = ();
}

/// Current badge state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BadgeSnapshot {
    pub total: u64,
    pub label: Option<String>,
    pub phase: Phase,
}

pub struct GetBadge;

impl Message for GetBadge {
    type Result = BadgeSnapshot;
}

/// Stop the indicator. In-flight fetches are dropped and the observer is
/// never called again.
pub struct Dismount;

impl Message for Dismount {
    type Result = ();
}

pub struct UnreadIndicator<S: ConversationSource + Unpin + 'static> {
    source: S,
    viewer: Option<Viewer>,
    tally: UnreadTally,
    poll_interval: Duration,
    poll_handle: Option<SpawnHandle>,
    observer: Option<LabelObserver>,
    rendered: Option<String>,
}

impl<S: ConversationSource + Unpin + 'static> UnreadIndicator<S> {
    pub fn new(source: S, viewer: Option<Viewer>) -> Self {
        Self {
            tally: UnreadTally::new(viewer.as_ref().map(|v| v.id)),
            source,
            viewer,
            poll_interval: UNREAD_POLL_INTERVAL,
            poll_handle: None,
            observer: None,
            rendered: None,
        }
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(Option<&str>) + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    #[cfg(test)]
    pub(crate) fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn snapshot(&self) -> BadgeSnapshot {
        BadgeSnapshot {
            total: self.tally.total(),
            label: self.tally.label(),
            phase: self.tally.phase(),
        }
    }

    /// Cancel any running timer and, if there is a viewer, poll now and on
    /// every interval.
    fn restart_polling(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.poll_handle.take() {
            ctx.cancel_future(handle);
        }

        if self.viewer.is_none() {
            return;
        }

        self.poll(ctx);
        self.poll_handle = Some(ctx.run_interval(self.poll_interval, |act, ctx| act.poll(ctx)));
    }

    fn poll(&mut self, ctx: &mut Context<Self>) {
        let viewer = match &self.viewer {
            Some(viewer) => viewer.clone(),
            None => return,
        };
        let ticket = match self.tally.begin_fetch() {
            Some(ticket) => ticket,
            None => return,
        };

        log::debug!("Fetching conversations for user {} (#{})", viewer.id, ticket.seq());

        ctx.spawn(
            self.source
                .list_conversations(&viewer)
                .into_actor(self)
                .map(move |result, act, _| act.settle(ticket, result)),
        );
    }

    fn settle(
        &mut self,
        ticket: super::Ticket,
        result: Result<Vec<Conversation>, ClientError>,
    ) {
        let outcome = match &result {
            Ok(conversations) => self.tally.apply_snapshot(ticket, conversations),
            Err(_) => self.tally.apply_failure(ticket),
        };

        match (outcome, result) {
            (Outcome::Discarded, _) => {
                log::debug!("Discarding stale conversation fetch #{}", ticket.seq());
            }
            (Outcome::Failed, Err(ClientError::Auth)) => {
                log::warn!("Unread count unavailable: credentials rejected");
            }
            (Outcome::Failed, Err(e)) => {
                log::warn!("Unread count unavailable: {}", e);
            }
            _ => {}
        }

        self.render();
    }

    fn render(&mut self) {
        let label = self.tally.label();
        if label == self.rendered {
            return;
        }

        self.rendered = label;
        if let Some(observer) = self.observer.as_mut() {
            observer(self.rendered.as_deref());
        }
    }
}

impl<S: ConversationSource + Unpin + 'static> Actor for UnreadIndicator<S> {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.restart_polling(ctx);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        log::debug!("Unread indicator stopped");
    }
}

impl<S: ConversationSource + Unpin + 'static> Handler<SetViewer> for UnreadIndicator<S> {
    type Result = ();

    fn handle(&mut self, msg: SetViewer, ctx: &mut Context<Self>) {
        let changed = self.tally.set_viewer(msg.0.as_ref().map(|v| v.id));
        self.viewer = msg.0;

        if changed {
            self.restart_polling(ctx);
            self.render();
        }
    }
}

impl<S: ConversationSource + Unpin + 'static> Handler<PushEvent> for UnreadIndicator<S> {
    type Result = ();

    fn handle(&mut self, msg: PushEvent, _: &mut Context<Self>) {
        if self.tally.push(&msg.0) {
            self.render();
        }
    }
}

impl<S: ConversationSource + Unpin + 'static> Handler<GetBadge> for UnreadIndicator<S> {
    type Result = MessageResult<GetBadge>;

    fn handle(&mut self, _: GetBadge, _: &mut Context<Self>) -> Self::Result {
        MessageResult(self.snapshot())
    }
}

impl<S: ConversationSource + Unpin + 'static> Handler<Dismount> for UnreadIndicator<S> {
    type Result = ();

    fn handle(&mut self, _: Dismount, ctx: &mut Context<Self>) {
        self.observer = None;
        ctx.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use futures::channel::oneshot;
    use futures::future::LocalBoxFuture;
    use futures::FutureExt;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    type Reply = Result<Vec<Conversation>, ClientError>;

    /// Answers each fetch from a queued channel. Unqueued fetches never resolve.
    #[derive(Clone, Default)]
    struct FakeSource {
        calls: Rc<RefCell<Vec<i32>>>,
        replies: Rc<RefCell<VecDeque<oneshot::Receiver<Reply>>>>,
    }

    impl FakeSource {
        fn queue(&self) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.replies.borrow_mut().push_back(rx);
            tx
        }
    }

    impl ConversationSource for FakeSource {
        fn list_conversations(&self, viewer: &Viewer) -> LocalBoxFuture<'static, Reply> {
            self.calls.borrow_mut().push(viewer.id);
            match self.replies.borrow_mut().pop_front() {
                Some(rx) => rx
                    .map(|reply| {
                        reply.unwrap_or_else(|_| Err(ClientError::Network("dropped".into())))
                    })
                    .boxed_local(),
                None => futures::future::pending().boxed_local(),
            }
        }
    }

    fn viewer(id: i32) -> Viewer {
        Viewer {
            id,
            token: format!("token-{}", id),
        }
    }

    fn conv(id: i32, unread: u32) -> Conversation {
        let at = NaiveDate::from_ymd_opt(2026, 4, 2)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        Conversation {
            id,
            participants: vec![],
            last_message: None,
            unread_count: Some(unread),
            is_archived: None,
            property_id: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn event(conversation_id: i32, message_id: i32, sender_id: i32) -> NewMessageEvent {
        NewMessageEvent {
            conversation_id,
            message_id,
            sender_id,
            content: "Can I view it Friday?".to_string(),
            sent_at: NaiveDate::from_ymd_opt(2026, 4, 2)
                .unwrap()
                .and_hms_opt(8, 31, 0)
                .unwrap(),
        }
    }

    fn recorder() -> (Rc<RefCell<Vec<Option<String>>>>, impl FnMut(Option<&str>)) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |label: Option<&str>| {
            sink.borrow_mut().push(label.map(str::to_owned))
        })
    }

    async fn settle() {
        actix_rt::time::sleep(Duration::from_millis(20)).await;
    }

    #[actix_rt::test]
    async fn test_fetches_immediately_and_renders_total() {
        let source = FakeSource::default();
        let reply = source.queue();
        let (seen, observer) = recorder();

        let addr = UnreadIndicator::new(source.clone(), Some(viewer(1)))
            .with_observer(observer)
            .start();

        let badge = addr.send(GetBadge).await.unwrap();
        assert_eq!(badge.phase, Phase::Loading);
        assert_eq!(badge.label, None);
        assert_eq!(*source.calls.borrow(), vec![1]);

        reply.send(Ok(vec![conv(1, 3), conv(2, 0), conv(3, 7)])).unwrap();
        settle().await;

        let badge = addr.send(GetBadge).await.unwrap();
        assert_eq!(badge.total, 10);
        assert_eq!(badge.label.as_deref(), Some("9+"));
        assert_eq!(badge.phase, Phase::Ready(10));
        assert_eq!(*seen.borrow(), vec![Some("9+".to_string())]);
    }

    #[actix_rt::test]
    async fn test_without_viewer_stays_idle() {
        let source = FakeSource::default();
        let addr = UnreadIndicator::new(source.clone(), None).start();
        settle().await;

        let badge = addr.send(GetBadge).await.unwrap();
        assert_eq!(badge.phase, Phase::Idle);
        assert_eq!(badge.label, None);
        assert!(source.calls.borrow().is_empty());
    }

    #[actix_rt::test]
    async fn test_polls_on_interval() {
        let source = FakeSource::default();
        let _addr = UnreadIndicator::new(source.clone(), Some(viewer(4)))
            .with_poll_interval(Duration::from_millis(15))
            .start();

        actix_rt::time::sleep(Duration::from_millis(80)).await;
        assert!(source.calls.borrow().len() >= 3);
    }

    #[actix_rt::test]
    async fn test_stale_identity_response_is_ignored() {
        let source = FakeSource::default();
        let reply_a = source.queue();
        let reply_b = source.queue();

        let addr = UnreadIndicator::new(source.clone(), Some(viewer(1))).start();
        addr.send(SetViewer(Some(viewer(2)))).await.unwrap();
        assert_eq!(*source.calls.borrow(), vec![1, 2]);

        reply_b.send(Ok(vec![conv(20, 2)])).unwrap();
        settle().await;
        let _ = reply_a.send(Ok(vec![conv(10, 50)]));
        settle().await;

        let badge = addr.send(GetBadge).await.unwrap();
        assert_eq!(badge.total, 2);
        assert_eq!(badge.label.as_deref(), Some("2"));
    }

    #[actix_rt::test]
    async fn test_dismount_drops_in_flight_fetch() {
        let source = FakeSource::default();
        let reply = source.queue();
        let (seen, observer) = recorder();

        let addr = UnreadIndicator::new(source.clone(), Some(viewer(1)))
            .with_observer(observer)
            .start();
        addr.send(Dismount).await.unwrap();
        settle().await;

        // The fetch future was dropped with the actor, so nobody is listening.
        assert!(reply.send(Ok(vec![conv(1, 5)])).is_err());
        settle().await;

        assert!(!addr.connected());
        assert!(seen.borrow().is_empty());
    }

    #[actix_rt::test]
    async fn test_failure_keeps_last_label() {
        let source = FakeSource::default();
        let first = source.queue();
        let second = source.queue();
        let (seen, observer) = recorder();

        let addr = UnreadIndicator::new(source.clone(), Some(viewer(1)))
            .with_observer(observer)
            .with_poll_interval(Duration::from_millis(30))
            .start();

        first.send(Ok(vec![conv(1, 4)])).unwrap();
        settle().await;
        actix_rt::time::sleep(Duration::from_millis(30)).await;
        second.send(Err(ClientError::Network("timed out".into()))).unwrap();
        settle().await;

        let badge = addr.send(GetBadge).await.unwrap();
        assert_eq!(badge.total, 4);
        assert_eq!(badge.label.as_deref(), Some("4"));
        assert_eq!(*seen.borrow(), vec![Some("4".to_string())]);
        addr.send(Dismount).await.unwrap();
    }

    #[actix_rt::test]
    async fn test_push_updates_without_waiting_for_poll() {
        let source = FakeSource::default();
        let reply = source.queue();
        let (seen, observer) = recorder();

        let addr = UnreadIndicator::new(source.clone(), Some(viewer(1)))
            .with_observer(observer)
            .start();
        reply.send(Ok(vec![conv(5, 1)])).unwrap();
        settle().await;

        addr.send(PushEvent(event(5, 500, 2))).await.unwrap();
        addr.send(PushEvent(event(5, 500, 2))).await.unwrap();
        addr.send(PushEvent(event(5, 501, 1))).await.unwrap();

        let badge = addr.send(GetBadge).await.unwrap();
        assert_eq!(badge.total, 2);
        assert_eq!(
            *seen.borrow(),
            vec![Some("1".to_string()), Some("2".to_string())]
        );
    }

    #[actix_rt::test]
    async fn test_logout_clears_badge_and_stops_polling() {
        let source = FakeSource::default();
        let reply = source.queue();
        let (seen, observer) = recorder();

        let addr = UnreadIndicator::new(source.clone(), Some(viewer(1)))
            .with_observer(observer)
            .with_poll_interval(Duration::from_millis(15))
            .start();
        reply.send(Ok(vec![conv(5, 3)])).unwrap();
        settle().await;

        addr.send(SetViewer(None)).await.unwrap();
        let calls = source.calls.borrow().len();
        actix_rt::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(source.calls.borrow().len(), calls);
        let badge = addr.send(GetBadge).await.unwrap();
        assert_eq!(badge.phase, Phase::Idle);
        assert_eq!(seen.borrow().last(), Some(&None));
    }
}
