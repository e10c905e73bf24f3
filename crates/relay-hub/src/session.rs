//! Session lifecycle: one connection from registration through close.
//!
//! [`Session::start`] registers with the hub first, so the `connected`
//! acknowledgement is queued before any traffic is read, then spawns two
//! tasks:
//!
//! - the **write loop** drains the outbound queue to the transport and sends
//!   a ping every heartbeat interval. It ends when the queue closes (after a
//!   close frame) or on the first write failure, and never unregisters.
//! - the **read loop** enforces the frame size ceiling and the sliding read
//!   deadline, feeds frames to the dispatcher, and on exit performs the
//!   session's single unregister.
//!
//! The hub holds the only strong sender of the outbound queue. The session
//! keeps a weak one for direct replies (`pong`, `error`), so the queue closes
//! as soon as the hub drops the session.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use relay_core::{Envelope, Inbound, Payload, SessionId};
use relay_settings::HubSettings;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::actor::{Hub, HubFlavor};
use crate::dispatcher::{DispatchAction, SessionIdentity, dispatch};
use crate::errors::{HubError, SessionError, TransportError};
use crate::metrics::{PROTOCOL_VIOLATIONS_TOTAL, SESSION_DURATION_SECONDS};
use crate::registry::Member;
use crate::service::ChatService;
use crate::transport::{Frame, FrameSink, FrameStream};
use crate::worker::BackgroundPool;

/// Floor for the ping period.
const MIN_HEARTBEAT: Duration = Duration::from_millis(1);

/// Per-session limits and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Outbound queue capacity.
    pub queue_capacity: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_frame_bytes: usize,
    /// Idle window after which the session is closed.
    pub read_deadline: Duration,
    /// Ping period. Kept below `read_deadline` by [`SessionConfig::normalized`].
    pub heartbeat_interval: Duration,
    /// Bound on each transport write.
    pub write_timeout: Duration,
}

impl SessionConfig {
    /// Derive from hub settings.
    pub fn from_settings(settings: &HubSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity,
            max_frame_bytes: settings.max_frame_bytes,
            read_deadline: settings.read_deadline(),
            heartbeat_interval: settings.heartbeat_interval(),
            write_timeout: settings.write_timeout(),
        }
    }

    /// Repair values that would break the session loops.
    ///
    /// A heartbeat that is zero or not shorter than the read deadline is
    /// pulled to nine tenths of the deadline, and the queue holds at least
    /// one envelope.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.queue_capacity = self.queue_capacity.max(1);
        if self.heartbeat_interval.is_zero() || self.heartbeat_interval >= self.read_deadline {
            self.heartbeat_interval = (self.read_deadline * 9 / 10).max(MIN_HEARTBEAT);
        }
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&HubSettings::default())
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet acknowledged by the hub.
    Connecting,
    /// In the registry, loops not yet running.
    Registered,
    /// Both loops running.
    Active,
    /// Read loop ended, removal submitted to the hub.
    Unregistering,
    /// Queue closed and both loops finished.
    Closed,
}

/// A connection about to join a hub.
pub struct Session<F: HubFlavor> {
    hub: Hub<F>,
    identity: SessionIdentity,
    config: SessionConfig,
    chat: Option<Arc<dyn ChatService>>,
    pool: Option<BackgroundPool>,
}

impl<F: HubFlavor> Session<F> {
    /// Prepare a session for `identity` on `hub`.
    ///
    /// `config` is passed through [`SessionConfig::normalized`].
    pub fn new(hub: Hub<F>, identity: SessionIdentity, config: SessionConfig) -> Self {
        Self {
            hub,
            identity,
            config: config.normalized(),
            chat: None,
            pool: None,
        }
    }

    /// Route `read` frames to `chat`, executed on `pool`.
    #[must_use]
    pub fn with_read_receipts(mut self, chat: Arc<dyn ChatService>, pool: BackgroundPool) -> Self {
        self.chat = Some(chat);
        self.pool = Some(pool);
        self
    }

    /// Register with the hub and start both loops.
    ///
    /// Fails only when the hub is no longer running; the transport is
    /// dropped in that case.
    pub async fn start<S, K>(self, stream: S, sink: K) -> Result<SessionHandle, HubError>
    where
        S: FrameStream,
        K: FrameSink,
    {
        let Self {
            hub,
            identity,
            config,
            chat,
            pool,
        } = self;

        let (state, state_rx) = watch::channel(SessionState::Connecting);
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let replies = queue_tx.downgrade();
        let member = Member::new(identity.id.clone(), identity.user_id, queue_tx);

        hub.register(identity.scope_id, member).await?;
        let _ = state.send_replace(SessionState::Registered);

        let span = info_span!(
            "session",
            hub = F::NAME,
            session_id = %identity.id,
            user_id = identity.user_id,
            scope_id = identity.scope_id,
        );

        let (released_tx, released_rx) = oneshot::channel();
        let writer = tokio::spawn(
            write_loop(sink, queue_rx, config, released_tx).instrument(span.clone()),
        );
        let _ = state.send_replace(SessionState::Active);

        let id = identity.id.clone();
        let reader = Reader {
            hub,
            identity,
            config,
            replies,
            chat,
            pool,
        };
        let task = tokio::spawn(
            async move {
                let started = Instant::now();
                let reason = reader.read_loop(stream, released_rx).await;

                let _ = state.send_replace(SessionState::Unregistering);
                reader.hub.unregister(reader.identity.id.clone()).await;
                if let Err(e) = writer.await {
                    warn!(error = %e, "write loop panicked");
                }
                let _ = state.send_replace(SessionState::Closed);

                if reason.is_protocol_violation() {
                    counter!(PROTOCOL_VIOLATIONS_TOTAL, "hub" => F::NAME, "reason" => reason.label())
                        .increment(1);
                }
                histogram!(SESSION_DURATION_SECONDS, "hub" => F::NAME)
                    .record(started.elapsed().as_secs_f64());
                info!(reason = %reason, "session closed");
                reason
            }
            .instrument(span),
        );

        Ok(SessionHandle {
            id,
            state: state_rx,
            task,
        })
    }
}

/// Handle to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<SessionError>,
}

impl SessionHandle {
    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the session is closed and return why it ended.
    pub async fn closed(self) -> SessionError {
        match self.task.await {
            Ok(reason) => reason,
            Err(e) => SessionError::Transport(TransportError::Failed(e.to_string())),
        }
    }
}

struct Reader<F: HubFlavor> {
    hub: Hub<F>,
    identity: SessionIdentity,
    config: SessionConfig,
    replies: mpsc::WeakSender<Envelope>,
    chat: Option<Arc<dyn ChatService>>,
    pool: Option<BackgroundPool>,
}

impl<F: HubFlavor> Reader<F> {
    async fn read_loop<S: FrameStream>(
        &self,
        mut stream: S,
        mut released: oneshot::Receiver<()>,
    ) -> SessionError {
        let mut deadline = Instant::now() + self.config.read_deadline;
        loop {
            let next = tokio::select! {
                biased;
                _ = &mut released => return SessionError::TransportReleased,
                next = time::timeout_at(deadline, stream.next()) => next,
            };
            let frame = match next {
                Err(_elapsed) => return SessionError::DeadlineExpired,
                Ok(None) => return SessionError::PeerClosed,
                Ok(Some(Err(e))) => return SessionError::Transport(e),
                Ok(Some(Ok(frame))) => frame,
            };
            deadline = Instant::now() + self.config.read_deadline;

            if frame.len() > self.config.max_frame_bytes {
                warn!(size = frame.len(), limit = self.config.max_frame_bytes, "oversize frame");
                return SessionError::FrameTooLarge {
                    size: frame.len(),
                    limit: self.config.max_frame_bytes,
                };
            }

            let result = match frame {
                Frame::Text(text) => self.handle_text(&text).await,
                Frame::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => self.handle_text(&text).await,
                    Err(e) => Err(self.malformed(&e.to_string())),
                },
                Frame::Ping(_) | Frame::Pong(_) => Ok(()),
                Frame::Close => return SessionError::PeerClosed,
            };
            if let Err(reason) = result {
                return reason;
            }
        }
    }

    async fn handle_text(&self, text: &str) -> Result<(), SessionError> {
        let inbound = Inbound::parse(text).map_err(|e| self.malformed(&e.to_string()))?;
        match dispatch::<F>(&self.identity, &inbound) {
            DispatchAction::Reply(envelope) => self.reply(envelope),
            DispatchAction::Broadcast {
                scope_id,
                sender_id,
                envelope,
            } => self.hub.broadcast(scope_id, sender_id, envelope).await,
            DispatchAction::MarkRead { chat_id, user_id } => self.mark_read(chat_id, user_id),
            DispatchAction::Ignore => debug!(?inbound, "ignoring inbound frame"),
        }
        Ok(())
    }

    fn malformed(&self, detail: &str) -> SessionError {
        warn!(error = detail, "malformed inbound frame");
        self.reply(Envelope::system(
            F::scope(self.identity.scope_id),
            Payload::Error {
                message: format!("invalid message: {detail}"),
            },
        ));
        SessionError::MalformedFrame(detail.to_owned())
    }

    fn reply(&self, envelope: Envelope) {
        let Some(queue) = self.replies.upgrade() else {
            debug!("reply after queue closed");
            return;
        };
        if let Err(e) = queue.try_send(envelope) {
            debug!(error = %e, "dropping direct reply");
        }
    }

    fn mark_read(&self, chat_id: i64, user_id: i64) {
        let (Some(chat), Some(pool)) = (&self.chat, &self.pool) else {
            debug!(chat_id, "read receipt without chat service");
            return;
        };
        let chat = Arc::clone(chat);
        pool.spawn_detached("mark_messages_read", async move {
            chat.mark_messages_read(chat_id, user_id).await
        });
    }
}

async fn write_loop<K: FrameSink>(
    mut sink: K,
    mut queue: mpsc::Receiver<Envelope>,
    config: SessionConfig,
    _released: oneshot::Sender<()>,
) {
    let mut heartbeat = time::interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            next = queue.recv() => match next {
                Some(envelope) => match envelope.to_json() {
                    Ok(text) => Frame::Text(text),
                    Err(e) => {
                        warn!(kind = envelope.kind(), error = %e, "failed to serialize envelope");
                        continue;
                    }
                },
                None => {
                    if let Err(e) = write(&mut sink, Frame::Close, config.write_timeout).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    debug!("outbound queue closed");
                    return;
                }
            },
            _ = heartbeat.tick() => Frame::Ping(Vec::new()),
        };
        if let Err(e) = write(&mut sink, frame, config.write_timeout).await {
            info!(error = %e, "write failed, releasing transport");
            return;
        }
    }
}

async fn write<K: FrameSink>(sink: &mut K, frame: Frame, limit: Duration) -> Result<(), TransportError> {
    match time::timeout(limit, sink.send(frame)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(TransportError::WriteTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use relay_core::Scope;
    use tokio_util::sync::CancellationToken;

    use crate::actor::{Chat, ChatHub, Notifications};
    use crate::service::MockChatService;
    use crate::transport::{MemoryPeer, memory_pair};

    fn chat_hub() -> (ChatHub, CancellationToken) {
        let cancel = CancellationToken::new();
        let (hub, _handle) = Hub::<Chat>::spawn(64, cancel.clone());
        (hub, cancel)
    }

    fn identity(user_id: i64, scope_id: i64) -> SessionIdentity {
        SessionIdentity {
            id: SessionId::chat(user_id, scope_id),
            user_id,
            scope_id,
        }
    }

    fn envelope(frame: Frame) -> Envelope {
        match frame {
            Frame::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    async fn open<F: HubFlavor>(session: Session<F>) -> (SessionHandle, MemoryPeer) {
        let (transport, mut peer) = memory_pair();
        let handle = session
            .start(transport.incoming, transport.outgoing)
            .await
            .unwrap();
        let ack = envelope(peer.recv().await.unwrap());
        assert_eq!(ack.kind(), "connected");
        (handle, peer)
    }

    async fn open_chat(hub: &ChatHub, user_id: i64, chat_id: i64) -> (SessionHandle, MemoryPeer) {
        let session = Session::new(hub.clone(), identity(user_id, chat_id), SessionConfig::default());
        open(session).await
    }

    #[tokio::test(start_paused = true)]
    async fn registered_before_traffic() {
        let (hub, _cancel) = chat_hub();
        let (handle, _peer) = open_chat(&hub, 1, 42).await;
        assert_eq!(handle.state(), SessionState::Active);
        assert!(hub.is_session_present(42, 1).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn ping_gets_pong() {
        let (hub, _cancel) = chat_hub();
        let (_handle, mut peer) = open_chat(&hub, 1, 42).await;
        assert!(peer.send_text(r#"{"type":"ping"}"#));
        let pong = envelope(peer.recv().await.unwrap());
        assert_eq!(pong.kind(), "pong");
        assert_eq!(pong.scope(), Scope::Chat(42));
    }

    #[tokio::test(start_paused = true)]
    async fn typing_reaches_other_participants_only() {
        let (hub, _cancel) = chat_hub();
        let (_a, mut alice) = open_chat(&hub, 1, 42).await;
        let (_b, mut bob) = open_chat(&hub, 2, 42).await;

        assert!(alice.send_text(r#"{"type":"typing"}"#));
        let typing = envelope(bob.recv().await.unwrap());
        assert_eq!(
            typing.payload(),
            &Payload::Typing {
                user_id: 1,
                is_typing: true
            }
        );

        assert!(alice.send_text(r#"{"type":"ping"}"#));
        // Alice's next frame is her pong, not her own typing indicator.
        assert_eq!(envelope(alice.recv().await.unwrap()).kind(), "pong");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_type_ignored() {
        let (hub, _cancel) = chat_hub();
        let (handle, mut peer) = open_chat(&hub, 1, 42).await;
        assert!(peer.send_text(r#"{"type":"wave","data":{}}"#));
        assert!(peer.send_text(r#"{"type":"ping"}"#));
        assert_eq!(envelope(peer.recv().await.unwrap()).kind(), "pong");
        assert_eq!(handle.state(), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn oversize_frame_terminates_session() {
        let (hub, _cancel) = chat_hub();
        let (handle, mut peer) = open_chat(&hub, 1, 42).await;
        let big = format!(r#"{{"type":"ping","data":"{}"}}"#, "x".repeat(600));
        assert!(peer.send_text(big));

        assert_matches!(
            handle.closed().await,
            SessionError::FrameTooLarge { limit: 512, .. }
        );
        assert_eq!(peer.recv().await, Some(Frame::Close));
        assert_eq!(hub.stats().await.unwrap().sessions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frame_sends_error_then_closes() {
        let (hub, _cancel) = chat_hub();
        let (handle, mut peer) = open_chat(&hub, 1, 42).await;
        assert!(peer.send_text("not json"));

        let err = envelope(peer.recv().await.unwrap());
        assert_eq!(err.kind(), "error");
        assert_eq!(peer.recv().await, Some(Frame::Close));
        assert_matches!(handle.closed().await, SessionError::MalformedFrame(_));
        assert!(!hub.is_session_present(42, 1).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_closed_after_deadline() {
        let (hub, _cancel) = chat_hub();
        let start = Instant::now();
        let (handle, mut peer) = open_chat(&hub, 1, 42).await;

        assert_eq!(peer.recv().await, Some(Frame::Ping(Vec::new())));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(54) && elapsed < Duration::from_secs(60));

        assert_eq!(peer.recv().await, Some(Frame::Close));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed < Duration::from_secs(60 + 54));

        assert_eq!(handle.closed().await, SessionError::DeadlineExpired);
        assert_eq!(peer.recv().await, None);
        assert_eq!(hub.stats().await.unwrap().sessions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pongs_extend_deadline() {
        let (hub, _cancel) = chat_hub();
        let (handle, peer) = open_chat(&hub, 1, 42).await;

        for _ in 0..4 {
            time::sleep(Duration::from_secs(40)).await;
            peer.to_server
                .unbounded_send(Ok(Frame::Pong(Vec::new())))
                .unwrap();
        }
        assert_eq!(handle.state(), SessionState::Active);
        assert!(hub.is_session_present(42, 1).await.unwrap());
    }

    #[test]
    fn normalized_pulls_heartbeat_below_deadline() {
        let config = SessionConfig {
            queue_capacity: 0,
            read_deadline: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            ..SessionConfig::default()
        }
        .normalized();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(27));
        assert_eq!(config.queue_capacity, 1);

        let zero = SessionConfig {
            heartbeat_interval: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert_eq!(zero.normalized().heartbeat_interval, Duration::from_secs(54));
        assert_eq!(SessionConfig::default().normalized(), SessionConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_at_deadline_still_pings_first() {
        let (hub, _cancel) = chat_hub();
        let config = SessionConfig {
            read_deadline: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(60),
            ..SessionConfig::default()
        };
        let start = Instant::now();
        let (handle, mut peer) = open(Session::new(hub.clone(), identity(1, 42), config)).await;

        assert_eq!(peer.recv().await, Some(Frame::Ping(Vec::new())));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(handle.state(), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_hang_up_unregisters() {
        let (hub, _cancel) = chat_hub();
        let (handle, peer) = open_chat(&hub, 1, 42).await;
        peer.hang_up();
        assert_eq!(handle.closed().await, SessionError::PeerClosed);
        assert_eq!(hub.scopes().await.unwrap(), Vec::<i64>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn close_frame_unregisters() {
        let (hub, _cancel) = chat_hub();
        let (handle, peer) = open_chat(&hub, 1, 42).await;
        peer.to_server.unbounded_send(Ok(Frame::Close)).unwrap();
        let mut states = handle.subscribe();
        assert_eq!(handle.closed().await, SessionError::PeerClosed);
        assert_eq!(*states.borrow_and_update(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn read_error_unregisters() {
        let (hub, _cancel) = chat_hub();
        let (handle, peer) = open_chat(&hub, 1, 42).await;
        peer.to_server
            .unbounded_send(Err(TransportError::Failed("reset".into())))
            .unwrap();
        assert_matches!(handle.closed().await, SessionError::Transport(_));
        assert_eq!(hub.stats().await.unwrap().sessions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_ends_read_loop() {
        let (hub, _cancel) = chat_hub();
        let (transport, peer) = memory_pair();
        let MemoryPeer {
            to_server,
            from_server,
        } = peer;
        drop(from_server);

        let session = Session::new(hub.clone(), identity(1, 42), SessionConfig::default());
        let handle = session
            .start(transport.incoming, transport.outgoing)
            .await
            .unwrap();

        assert_eq!(handle.closed().await, SessionError::TransportReleased);
        assert_eq!(hub.stats().await.unwrap().sessions, 0);
        drop(to_server);
    }

    #[tokio::test(start_paused = true)]
    async fn hub_shutdown_closes_session() {
        let (hub, cancel) = chat_hub();
        let (handle, mut peer) = open_chat(&hub, 1, 42).await;
        cancel.cancel();
        assert_eq!(peer.recv().await, Some(Frame::Close));
        assert_eq!(handle.closed().await, SessionError::TransportReleased);
    }

    #[tokio::test(start_paused = true)]
    async fn start_fails_when_hub_stopped() {
        let cancel = CancellationToken::new();
        let (hub, actor) = Hub::<Chat>::spawn(4, cancel.clone());
        cancel.cancel();
        actor.await.unwrap();
        let (transport, _peer) = memory_pair();
        let session = Session::new(hub.clone(), identity(1, 42), SessionConfig::default());
        let result = session.start(transport.incoming, transport.outgoing).await;
        assert_matches!(result, Err(HubError::ActorStopped { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn read_frame_marks_messages_read() {
        let (hub, _cancel) = chat_hub();
        let mut chat = MockChatService::new();
        let _ = chat
            .expect_mark_messages_read()
            .withf(|chat_id, user_id| *chat_id == 42 && *user_id == 3)
            .times(1)
            .returning(|_, _| Ok(()));
        let pool = BackgroundPool::new(4);

        let session = Session::new(hub.clone(), identity(3, 42), SessionConfig::default())
            .with_read_receipts(Arc::new(chat), pool.clone());
        let (_handle, mut peer) = open(session).await;

        assert!(peer.send_text(r#"{"type":"read"}"#));
        assert!(peer.send_text(r#"{"type":"ping"}"#));
        assert_eq!(envelope(peer.recv().await.unwrap()).kind(), "pong");
        assert!(pool.drain(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn read_receipt_failure_keeps_session() {
        let (hub, _cancel) = chat_hub();
        let mut chat = MockChatService::new();
        let _ = chat
            .expect_mark_messages_read()
            .returning(|_, _| Err(crate::service::ServiceError::Unavailable("db down".into())));
        let pool = BackgroundPool::new(1);

        let session = Session::new(hub.clone(), identity(3, 42), SessionConfig::default())
            .with_read_receipts(Arc::new(chat), pool.clone());
        let (handle, mut peer) = open(session).await;

        assert!(peer.send_text(r#"{"type":"read"}"#));
        assert!(pool.drain(Duration::from_secs(1)).await);
        assert!(peer.send_text(r#"{"type":"ping"}"#));
        assert_eq!(envelope(peer.recv().await.unwrap()).kind(), "pong");
        assert_eq!(handle.state(), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn notification_sessions_share_user_scope() {
        let cancel = CancellationToken::new();
        let (hub, _h) = Hub::<Notifications>::spawn(16, cancel.clone());
        let mut peers = Vec::new();
        for _ in 0..2 {
            let identity = SessionIdentity {
                id: SessionId::notification(7),
                user_id: 7,
                scope_id: 7,
            };
            let session = Session::new(hub.clone(), identity, SessionConfig::default());
            peers.push(open(session).await);
        }

        hub.submit(7, 0, crate::notifications::unread_count_update(4)).await;
        for (_handle, peer) in &mut peers {
            let env = envelope(peer.recv().await.unwrap());
            assert_eq!(env.kind(), "unread_count_update");
            assert_eq!(env.scope(), Scope::User(7));
        }
    }
}
