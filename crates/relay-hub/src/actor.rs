//! Hub actor: the single owner of a session registry.
//!
//! Every registry mutation and every fan-out runs inside one task that drains
//! one FIFO mailbox, so requests submitted to a hub take effect in the order
//! the mailbox accepted them. Callers talk to the actor through a cloneable
//! [`Hub`] handle.
//!
//! Two flavors share the actor:
//! - [`Chat`]: keyed by conversation id, broadcasts skip the sender's sessions
//! - [`Notifications`]: keyed by recipient user id, broadcasts reach every
//!   session of that user

use std::fmt;
use std::marker::PhantomData;

use metrics::{counter, gauge};
use relay_core::{Envelope, Payload, Scope, SessionId};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::HubError;
use crate::metrics::{
    BROADCAST_DELIVERIES_TOTAL, EVICTIONS_TOTAL, SESSIONS_ACTIVE, SESSIONS_REGISTERED_TOTAL,
    SESSIONS_UNREGISTERED_TOTAL,
};
use crate::registry::{Bucket, Member, Registry, SessionList, SessionSet};

/// Which hub a flavor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubKind {
    /// Conversation-scoped hub.
    Chat,
    /// Recipient-scoped hub.
    Notifications,
}

/// Static behavior that distinguishes the two hubs.
pub trait HubFlavor: Send + Sync + 'static {
    /// Hub kind.
    const KIND: HubKind;
    /// Name used in logs and metric labels.
    const NAME: &'static str;
    /// Text of the `connected` acknowledgement.
    const CONNECTED_MESSAGE: &'static str;
    /// Per-scope session collection.
    type Bucket: Bucket;

    /// Envelope scope for a registry key.
    fn scope(scope_id: i64) -> Scope;

    /// Whether `member` should receive a broadcast sent by `sender_id`.
    fn is_recipient(member: &Member, sender_id: i64) -> bool;
}

/// Conversation hub flavor.
#[derive(Debug, Clone, Copy)]
pub struct Chat;

impl HubFlavor for Chat {
    const KIND: HubKind = HubKind::Chat;
    const NAME: &'static str = "chat";
    const CONNECTED_MESSAGE: &'static str = "Successfully connected to chat";
    type Bucket = SessionSet;

    fn scope(scope_id: i64) -> Scope {
        Scope::Chat(scope_id)
    }

    fn is_recipient(member: &Member, sender_id: i64) -> bool {
        member.user_id() != sender_id
    }
}

/// Notification hub flavor.
#[derive(Debug, Clone, Copy)]
pub struct Notifications;

impl HubFlavor for Notifications {
    const KIND: HubKind = HubKind::Notifications;
    const NAME: &'static str = "notifications";
    const CONNECTED_MESSAGE: &'static str = "Successfully connected to notifications";
    type Bucket = SessionList;

    fn scope(scope_id: i64) -> Scope {
        Scope::User(scope_id)
    }

    fn is_recipient(_member: &Member, _sender_id: i64) -> bool {
        true
    }
}

/// Registry size snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Non-empty scopes.
    pub scopes: usize,
    /// Registered sessions.
    pub sessions: usize,
}

enum Command {
    Register {
        scope_id: i64,
        member: Member,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        session_id: SessionId,
    },
    Broadcast {
        scope_id: i64,
        sender_id: i64,
        envelope: Envelope,
    },
    Presence {
        scope_id: i64,
        user_id: i64,
        reply: oneshot::Sender<bool>,
    },
    Members {
        scope_id: i64,
        reply: oneshot::Sender<Vec<SessionId>>,
    },
    Scopes {
        reply: oneshot::Sender<Vec<i64>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Cloneable handle to a running hub actor.
pub struct Hub<F: HubFlavor> {
    tx: mpsc::Sender<Command>,
    _flavor: PhantomData<F>,
}

/// Chat hub handle.
pub type ChatHub = Hub<Chat>;
/// Notification hub handle.
pub type NotificationHub = Hub<Notifications>;

impl<F: HubFlavor> Clone for Hub<F> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            _flavor: PhantomData,
        }
    }
}

impl<F: HubFlavor> fmt::Debug for Hub<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub").field("name", &F::NAME).finish()
    }
}

impl<F: HubFlavor> Hub<F> {
    /// Spawn the actor loop.
    ///
    /// The loop exits when `cancel` fires or every handle is dropped. On exit
    /// the registry is dropped, which closes every remaining session queue.
    pub fn spawn(mailbox_capacity: usize, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
        let actor = HubActor::<F> {
            registry: Registry::new(),
            mailbox: rx,
            cancel,
        };
        let handle = tokio::spawn(actor.run());
        (
            Self {
                tx,
                _flavor: PhantomData,
            },
            handle,
        )
    }

    /// Hub name.
    pub fn name(&self) -> &'static str {
        F::NAME
    }

    /// Envelope scope for a registry key of this hub.
    pub fn scope(&self, scope_id: i64) -> Scope {
        F::scope(scope_id)
    }

    async fn request(&self, command: Command) -> Result<(), HubError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| HubError::ActorStopped { hub: F::NAME })
    }

    async fn query<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, HubError> {
        let (reply, rx) = oneshot::channel();
        self.request(build(reply)).await?;
        rx.await.map_err(|_| HubError::ActorStopped { hub: F::NAME })
    }

    /// Register a member under `scope_id` and wait until the actor applied it.
    ///
    /// When this returns, the `connected` acknowledgement is already the
    /// first envelope on the member's queue.
    pub async fn register(&self, scope_id: i64, member: Member) -> Result<(), HubError> {
        self.query(|ack| Command::Register {
            scope_id,
            member,
            ack,
        })
        .await
    }

    /// Remove a session. Unknown ids are ignored.
    pub async fn unregister(&self, session_id: SessionId) {
        if self
            .request(Command::Unregister { session_id })
            .await
            .is_err()
        {
            debug!(hub = F::NAME, "unregister after hub stopped");
        }
    }

    /// Fan an envelope out to the sessions of `scope_id`.
    ///
    /// Best effort: nothing is reported back, and a recipient whose queue is
    /// full is evicted instead of waited on.
    pub async fn broadcast(&self, scope_id: i64, sender_id: i64, envelope: Envelope) {
        let command = Command::Broadcast {
            scope_id,
            sender_id,
            envelope,
        };
        if self.request(command).await.is_err() {
            debug!(hub = F::NAME, scope_id, "broadcast after hub stopped");
        }
    }

    /// Build an envelope for `scope_id` and broadcast it.
    pub async fn submit(&self, scope_id: i64, sender_id: i64, payload: Payload) {
        let envelope = Envelope::new(F::scope(scope_id), sender_id, payload);
        self.broadcast(scope_id, sender_id, envelope).await;
    }

    /// Whether `user_id` holds at least one session under `scope_id`.
    pub async fn is_session_present(&self, scope_id: i64, user_id: i64) -> Result<bool, HubError> {
        self.query(|reply| Command::Presence {
            scope_id,
            user_id,
            reply,
        })
        .await
    }

    /// Session ids registered under `scope_id`.
    pub async fn members(&self, scope_id: i64) -> Result<Vec<SessionId>, HubError> {
        self.query(|reply| Command::Members { scope_id, reply }).await
    }

    /// Non-empty scope keys, sorted.
    pub async fn scopes(&self) -> Result<Vec<i64>, HubError> {
        self.query(|reply| Command::Scopes { reply }).await
    }

    /// Registry size snapshot.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.query(|reply| Command::Stats { reply }).await
    }
}

impl Hub<Notifications> {
    /// Users that currently hold at least one notification session.
    pub async fn connected_users(&self) -> Result<Vec<i64>, HubError> {
        self.scopes().await
    }
}

/// The actor loop state. Constructed by [`Hub::spawn`].
struct HubActor<F: HubFlavor> {
    registry: Registry<F::Bucket>,
    mailbox: mpsc::Receiver<Command>,
    cancel: CancellationToken,
}

impl<F: HubFlavor> HubActor<F> {
    #[instrument(skip_all, fields(hub = F::NAME))]
    async fn run(mut self) {
        info!("hub started");
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!("hub cancelled");
                    break;
                }
                command = self.mailbox.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        debug!("all hub handles dropped");
                        break;
                    }
                },
            }
        }
        let remaining = self.registry.session_count();
        info!(remaining, "hub stopped, closing remaining sessions");
        gauge!(SESSIONS_ACTIVE, "hub" => F::NAME).set(0.0);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                scope_id,
                member,
                ack,
            } => {
                self.register(scope_id, member);
                let _ = ack.send(());
            }
            Command::Unregister { session_id } => self.unregister(&session_id),
            Command::Broadcast {
                scope_id,
                sender_id,
                envelope,
            } => self.broadcast(scope_id, sender_id, &envelope),
            Command::Presence {
                scope_id,
                user_id,
                reply,
            } => {
                let _ = reply.send(self.registry.contains_user(scope_id, user_id));
            }
            Command::Members { scope_id, reply } => {
                let ids = self.registry.members(scope_id).map(|m| m.id().clone()).collect();
                let _ = reply.send(ids);
            }
            Command::Scopes { reply } => {
                let _ = reply.send(self.registry.scope_ids());
            }
            Command::Stats { reply } => {
                let _ = reply.send(HubStats {
                    scopes: self.registry.scope_count(),
                    sessions: self.registry.session_count(),
                });
            }
        }
    }

    fn register(&mut self, scope_id: i64, member: Member) {
        let session_id = member.id().clone();
        let user_id = member.user_id();

        let ack = Envelope::system(
            F::scope(scope_id),
            Payload::Connected {
                message: F::CONNECTED_MESSAGE.to_owned(),
            },
        );
        if let Err(e) = member.try_deliver(ack) {
            warn!(%session_id, error = %e, "failed to enqueue connected acknowledgement");
        }

        if let Some(displaced) = self.registry.insert(scope_id, member) {
            warn!(session_id = %displaced.id(), "session id re-registered, dropping previous entry");
        }
        counter!(SESSIONS_REGISTERED_TOTAL, "hub" => F::NAME).increment(1);
        self.record_active();
        info!(%session_id, user_id, scope_id, "session registered");
    }

    fn unregister(&mut self, session_id: &SessionId) {
        let Some(scope_id) = self.registry.scope_of(session_id) else {
            debug!(%session_id, "unregister for unknown session");
            return;
        };
        if let Some(member) = self.registry.remove(session_id) {
            drop(member);
            counter!(SESSIONS_UNREGISTERED_TOTAL, "hub" => F::NAME).increment(1);
            self.record_active();
            info!(%session_id, scope_id, "session unregistered");
        }
    }

    fn broadcast(&mut self, scope_id: i64, sender_id: i64, envelope: &Envelope) {
        let mut delivered: u64 = 0;
        let mut evicted = Vec::new();

        for member in self.registry.members(scope_id) {
            if !F::is_recipient(member, sender_id) {
                continue;
            }
            match member.try_deliver(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    evicted.push((member.id().clone(), member.user_id(), "queue full"));
                }
                Err(TrySendError::Closed(_)) => {
                    evicted.push((member.id().clone(), member.user_id(), "queue closed"));
                }
            }
        }

        for (session_id, user_id, reason) in evicted {
            drop(self.registry.remove(&session_id));
            counter!(EVICTIONS_TOTAL, "hub" => F::NAME).increment(1);
            counter!(SESSIONS_UNREGISTERED_TOTAL, "hub" => F::NAME).increment(1);
            warn!(%session_id, user_id, scope_id, reason, "evicting unresponsive session");
        }
        self.record_active();

        counter!(BROADCAST_DELIVERIES_TOTAL, "hub" => F::NAME).increment(delivered);
        debug!(
            scope_id,
            sender_id,
            kind = envelope.kind(),
            delivered,
            "broadcast"
        );
    }

    fn record_active(&self) {
        gauge!(SESSIONS_ACTIVE, "hub" => F::NAME).set(self.registry.session_count() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use serde_json::json;

    fn spawn<F: HubFlavor>() -> (Hub<F>, CancellationToken, JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let (hub, handle) = Hub::<F>::spawn(64, cancel.clone());
        (hub, cancel, handle)
    }

    async fn join<F: HubFlavor>(
        hub: &Hub<F>,
        scope_id: i64,
        id: &str,
        user_id: i64,
        capacity: usize,
    ) -> mpsc::Receiver<Envelope> {
        let (tx, mut rx) = mpsc::channel(capacity);
        hub.register(scope_id, Member::new(SessionId::from(id), user_id, tx))
            .await
            .unwrap();
        let ack = rx.recv().await.unwrap();
        assert_eq!(ack.kind(), "connected");
        rx
    }

    fn message(chat_id: i64, sender: i64, text: &str) -> Envelope {
        Envelope::new(Scope::Chat(chat_id), sender, Payload::Message(json!(text)))
    }

    #[tokio::test]
    async fn register_sends_connected_ack() {
        let (hub, _cancel, _h) = spawn::<Chat>();
        let (tx, mut rx) = mpsc::channel(4);
        hub.register(42, Member::new(SessionId::from("a"), 1, tx))
            .await
            .unwrap();

        let ack = rx.try_recv().unwrap();
        assert_eq!(ack.scope(), Scope::Chat(42));
        assert_matches!(
            ack.payload(),
            Payload::Connected { message } if message == "Successfully connected to chat"
        );
    }

    #[tokio::test]
    async fn notification_ack_text() {
        let (hub, _cancel, _h) = spawn::<Notifications>();
        let (tx, mut rx) = mpsc::channel(4);
        hub.register(7, Member::new(SessionId::from("d"), 7, tx))
            .await
            .unwrap();
        let ack = rx.try_recv().unwrap();
        assert_eq!(ack.scope(), Scope::User(7));
        assert_matches!(
            ack.payload(),
            Payload::Connected { message } if message == "Successfully connected to notifications"
        );
    }

    #[tokio::test]
    async fn chat_broadcast_excludes_sender() {
        let (hub, _cancel, _h) = spawn::<Chat>();
        let mut a = join(&hub, 42, "a", 1, 8).await;
        let mut b = join(&hub, 42, "b", 2, 8).await;
        let mut c = join(&hub, 42, "c", 3, 8).await;

        hub.broadcast(42, 1, message(42, 1, "hi")).await;
        let _ = hub.stats().await.unwrap();

        for rx in [&mut b, &mut c] {
            let env = rx.try_recv().unwrap();
            assert_eq!(env.kind(), "message");
            assert_eq!(env.sender_id(), 1);
            assert!(rx.try_recv().is_err());
        }
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn chat_broadcast_skips_every_sender_session() {
        let (hub, _cancel, _h) = spawn::<Chat>();
        let mut phone = join(&hub, 5, "phone", 1, 8).await;
        let mut laptop = join(&hub, 5, "laptop", 1, 8).await;
        let mut other = join(&hub, 5, "other", 2, 8).await;

        hub.broadcast(5, 1, message(5, 1, "x")).await;
        let _ = hub.stats().await.unwrap();

        assert!(phone.try_recv().is_err());
        assert!(laptop.try_recv().is_err());
        assert!(other.try_recv().is_ok());
    }

    #[tokio::test]
    async fn notification_broadcast_reaches_all_devices() {
        let (hub, _cancel, _h) = spawn::<Notifications>();
        let mut d = join(&hub, 7, "d", 7, 8).await;
        let mut e = join(&hub, 7, "e", 7, 8).await;

        let payload = Payload::Custom {
            kind: "unread_count_update".into(),
            data: json!({"unread_count": 2}),
        };
        hub.submit(7, relay_core::SYSTEM_SENDER, payload).await;
        let _ = hub.stats().await.unwrap();

        assert_eq!(d.try_recv().unwrap().kind(), "unread_count_update");
        assert_eq!(e.try_recv().unwrap().kind(), "unread_count_update");
    }

    #[tokio::test]
    async fn notification_broadcast_to_offline_user_is_noop() {
        let (hub, _cancel, _h) = spawn::<Notifications>();
        hub.submit(99, 0, Payload::Pong).await;
        assert_eq!(hub.stats().await.unwrap(), HubStats::default());
    }

    #[tokio::test]
    async fn full_queue_evicts_session() {
        let (hub, _cancel, _h) = spawn::<Chat>();
        // Capacity 1 and the ack already drained: one slot left.
        let mut slow = join(&hub, 42, "slow", 2, 1).await;
        let mut fast = join(&hub, 42, "fast", 3, 8).await;

        hub.broadcast(42, 1, message(42, 1, "first")).await;
        hub.broadcast(42, 1, message(42, 1, "second")).await;

        assert_eq!(hub.members(42).await.unwrap(), vec![SessionId::from("fast")]);

        // The slow session keeps what it got before eviction, then its queue closes.
        assert_eq!(slow.recv().await.unwrap().kind(), "message");
        assert!(slow.recv().await.is_none());

        hub.broadcast(42, 1, message(42, 1, "third")).await;
        let _ = hub.stats().await.unwrap();
        let mut got = 0;
        while fast.try_recv().is_ok() {
            got += 1;
        }
        assert_eq!(got, 3);
    }

    #[tokio::test]
    async fn saturated_queue_at_default_capacity_evicts() {
        let (hub, _cancel, _h) = spawn::<Chat>();
        let mut stuck = join(&hub, 1, "stuck", 2, 256).await;
        for i in 0..256 {
            hub.broadcast(1, 1, message(1, 1, &i.to_string())).await;
        }
        assert!(hub.is_session_present(1, 2).await.unwrap());

        hub.broadcast(1, 1, message(1, 1, "overflow")).await;
        assert!(!hub.is_session_present(1, 2).await.unwrap());

        let mut drained = 0;
        while stuck.recv().await.is_some() {
            drained += 1;
        }
        assert_eq!(drained, 256);
    }

    #[tokio::test]
    async fn closed_queue_is_evicted_on_broadcast() {
        let (hub, _cancel, _h) = spawn::<Chat>();
        let rx = join(&hub, 42, "gone", 2, 8).await;
        drop(rx);
        hub.broadcast(42, 1, message(42, 1, "x")).await;
        assert_eq!(hub.stats().await.unwrap().sessions, 0);
    }

    #[tokio::test]
    async fn unregister_last_session_prunes_scope() {
        let (hub, _cancel, _h) = spawn::<Chat>();
        let mut rx = join(&hub, 42, "a", 1, 8).await;
        hub.unregister(SessionId::from("a")).await;

        assert!(rx.recv().await.is_none());
        assert_eq!(hub.scopes().await.unwrap(), Vec::<i64>::new());

        let _rx2 = join(&hub, 42, "b", 2, 8).await;
        assert_eq!(hub.members(42).await.unwrap(), vec![SessionId::from("b")]);
        assert_eq!(hub.stats().await.unwrap(), HubStats { scopes: 1, sessions: 1 });
    }

    #[tokio::test]
    async fn unregister_twice_is_noop() {
        let (hub, _cancel, _h) = spawn::<Chat>();
        let _a = join(&hub, 42, "a", 1, 8).await;
        let _b = join(&hub, 42, "b", 2, 8).await;
        hub.unregister(SessionId::from("a")).await;
        hub.unregister(SessionId::from("a")).await;
        assert_eq!(hub.stats().await.unwrap().sessions, 1);
    }

    #[tokio::test]
    async fn presence_is_per_scope() {
        let (hub, _cancel, _h) = spawn::<Chat>();
        let _a = join(&hub, 42, "a", 1, 8).await;
        assert!(hub.is_session_present(42, 1).await.unwrap());
        assert!(!hub.is_session_present(43, 1).await.unwrap());
        assert!(!hub.is_session_present(42, 2).await.unwrap());
    }

    #[tokio::test]
    async fn connected_users_lists_recipients() {
        let (hub, _cancel, _h) = spawn::<Notifications>();
        let _a = join(&hub, 9, "n9", 9, 8).await;
        let _b = join(&hub, 3, "n3", 3, 8).await;
        assert_eq!(hub.connected_users().await.unwrap(), vec![3, 9]);
    }

    #[tokio::test]
    async fn cancel_closes_queues_and_stops_actor() {
        let (hub, cancel, handle) = spawn::<Chat>();
        let mut rx = join(&hub, 1, "a", 1, 8).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(rx.recv().await.is_none());
        assert_matches!(hub.stats().await, Err(HubError::ActorStopped { hub: "chat" }));
        let (tx, _rx) = mpsc::channel(1);
        assert!(hub.register(1, Member::new(SessionId::from("b"), 2, tx)).await.is_err());
    }

    #[tokio::test]
    async fn dropping_all_handles_stops_actor() {
        let (hub, _cancel, handle) = spawn::<Notifications>();
        drop(hub);
        handle.await.unwrap();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register { session: u8, scope: u8 },
        Unregister { session: u8 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6, 0u8..3).prop_map(|(session, scope)| Op::Register { session, scope }),
            (0u8..6).prop_map(|session| Op::Unregister { session }),
        ]
    }

    proptest! {
        #[test]
        fn registry_matches_sequential_model(ops in proptest::collection::vec(op(), 0..40)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let (hub, _cancel, _h) = spawn::<Chat>();
                let mut model: BTreeMap<u8, u8> = BTreeMap::new();
                let mut queues = Vec::new();

                for op in ops {
                    match op {
                        Op::Register { session, scope } => {
                            let (tx, rx) = mpsc::channel(4);
                            queues.push(rx);
                            let id = SessionId::from_string(format!("s{session}"));
                            hub.register(i64::from(scope), Member::new(id, i64::from(session), tx))
                                .await
                                .unwrap();
                            let _ = model.insert(session, scope);
                        }
                        Op::Unregister { session } => {
                            hub.unregister(SessionId::from_string(format!("s{session}"))).await;
                            let _ = model.remove(&session);
                        }
                    }
                }

                let mut expected: BTreeMap<i64, Vec<String>> = BTreeMap::new();
                for (session, scope) in &model {
                    expected.entry(i64::from(*scope)).or_default().push(format!("s{session}"));
                }

                let scopes = hub.scopes().await.unwrap();
                assert_eq!(scopes, expected.keys().copied().collect::<Vec<_>>());
                for (scope, ids) in &expected {
                    let mut actual: Vec<String> = hub
                        .members(*scope)
                        .await
                        .unwrap()
                        .into_iter()
                        .map(|id| id.as_str().to_owned())
                        .collect();
                    actual.sort();
                    assert_eq!(&actual, ids);
                }
                assert_eq!(hub.stats().await.unwrap().sessions, model.len());
            });
        }
    }
}
