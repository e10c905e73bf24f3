//! Router, upgrade handlers and server lifecycle.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use relay_core::SessionId;
use relay_hub::{
    BackgroundPool, Chat, ChatHub, ChatService, HubFlavor, NotificationHub, Notifications, Session, SessionConfig,
    SessionIdentity,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::errors::UpgradeError;
use crate::health;
use crate::metrics;
use crate::publish::MessagePublisher;
use crate::shutdown::ShutdownCoordinator;
use crate::socket;

/// Multiple of the configured frame limit accepted by the WebSocket codec.
/// Frames between the two limits reach the session, which closes it with a
/// protocol violation instead of a bare codec error.
const CODEC_CEILING_FACTOR: usize = 4;

/// Shared state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    chat_hub: ChatHub,
    notification_hub: NotificationHub,
    chat: Arc<dyn ChatService>,
    auth: Arc<dyn Authenticator>,
    pool: BackgroundPool,
    session: SessionConfig,
    metrics: PrometheusHandle,
    started: Instant,
}

/// `?token=` query parameter on the upgrade endpoints.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    /// Bearer token.
    pub token: Option<String>,
}

/// Both hubs plus the HTTP surface that feeds them.
pub struct RelayServer {
    config: ServerConfig,
    state: AppState,
    shutdown: ShutdownCoordinator,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RelayServer {
    /// Spawn both hub actors. Must be called inside a Tokio runtime.
    pub fn new(
        config: ServerConfig,
        chat: Arc<dyn ChatService>,
        auth: Arc<dyn Authenticator>,
        metrics: PrometheusHandle,
    ) -> Self {
        let shutdown = ShutdownCoordinator::new();
        let (chat_hub, chat_task) = ChatHub::spawn(config.mailbox_capacity, shutdown.token());
        let (notification_hub, notification_task) =
            NotificationHub::spawn(config.mailbox_capacity, shutdown.token());

        let state = AppState {
            chat_hub,
            notification_hub,
            chat,
            auth,
            pool: BackgroundPool::new(config.background_limit),
            session: config.session,
            metrics,
            started: Instant::now(),
        };
        Self {
            config,
            state,
            shutdown,
            tasks: Mutex::new(vec![chat_task, notification_task]),
        }
    }

    /// Axum router with every route.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/chats/{chat_id}/ws", get(chat_ws))
            .route("/notifications/ws", get(notification_ws))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`).
    pub async fn listen(&self) -> io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server exited with error");
            }
        });
        self.tasks.lock().push(task);

        info!(%addr, "relay server listening");
        Ok(addr)
    }

    /// Chat hub handle.
    pub fn chat_hub(&self) -> &ChatHub {
        &self.state.chat_hub
    }

    /// Notification hub handle.
    pub fn notification_hub(&self) -> &NotificationHub {
        &self.state.notification_hub
    }

    /// Publisher bound to this server's hubs and collaborator.
    pub fn publisher(&self) -> MessagePublisher {
        MessagePublisher::new(
            self.state.chat_hub.clone(),
            self.state.notification_hub.clone(),
            Arc::clone(&self.state.chat),
            self.state.pool.clone(),
        )
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    /// Stop accepting connections, stop both hubs (closing every session) and
    /// wait for background work, all within the configured timeout.
    ///
    /// Returns `false` if anything had to be aborted.
    pub async fn shutdown(&self) -> bool {
        let timeout = self.config.shutdown_timeout;
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let tasks_done = self.shutdown.graceful_shutdown(tasks, Some(timeout)).await;
        let pool_done = self.state.pool.drain(timeout).await;
        info!(tasks_done, pool_done, "relay server stopped");
        tasks_done && pool_done
    }
}

/// Resolve the chat upgrade parameters to `(chat_id, user_id)`.
///
/// Checks run in order: chat id (a positive integer), token presence, token validity,
/// participant membership. No hub state is touched.
pub async fn authorize_chat(
    chat: &dyn ChatService,
    auth: &dyn Authenticator,
    raw_chat_id: &str,
    token: Option<&str>,
) -> Result<(i64, i64), UpgradeError> {
    let chat_id = raw_chat_id
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| UpgradeError::InvalidChatId(raw_chat_id.to_owned()))?;
    let user_id = authenticate(auth, token)?;
    if !chat.is_participant(chat_id, user_id).await? {
        return Err(UpgradeError::NotParticipant { chat_id, user_id });
    }
    Ok((chat_id, user_id))
}

fn authenticate(auth: &dyn Authenticator, token: Option<&str>) -> Result<i64, UpgradeError> {
    let token = token.filter(|t| !t.is_empty()).ok_or(UpgradeError::MissingToken)?;
    auth.authenticate(token).ok_or(UpgradeError::InvalidToken)
}

fn limit_frames(ws: WebSocketUpgrade, session: &SessionConfig) -> WebSocketUpgrade {
    let ceiling = session.max_frame_bytes.saturating_mul(CODEC_CEILING_FACTOR);
    ws.max_message_size(ceiling).max_frame_size(ceiling)
}

async fn chat_ws(
    Path(raw_chat_id): Path<String>,
    Query(query): Query<TokenQuery>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, UpgradeError> {
    let (chat_id, user_id) =
        authorize_chat(&*state.chat, &*state.auth, &raw_chat_id, query.token.as_deref()).await?;
    let identity = SessionIdentity {
        id: SessionId::chat(user_id, chat_id),
        user_id,
        scope_id: chat_id,
    };
    let ws = limit_frames(ws, &state.session);
    Ok(ws
        .on_upgrade(move |socket| {
            let session = Session::new(state.chat_hub.clone(), identity, state.session)
                .with_read_receipts(Arc::clone(&state.chat), state.pool.clone());
            run_session::<Chat>(socket, session)
        })
        .into_response())
}

async fn notification_ws(
    Query(query): Query<TokenQuery>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, UpgradeError> {
    let user_id = authenticate(&*state.auth, query.token.as_deref())?;
    let identity = SessionIdentity {
        id: SessionId::notification(user_id),
        user_id,
        scope_id: user_id,
    };
    let ws = limit_frames(ws, &state.session);
    Ok(ws
        .on_upgrade(move |socket| {
            let session = Session::new(state.notification_hub.clone(), identity, state.session);
            run_session::<Notifications>(socket, session)
        })
        .into_response())
}

async fn run_session<F: HubFlavor>(socket: WebSocket, session: Session<F>) {
    let (stream, sink) = socket::split(socket);
    if let Err(e) = session.start(stream, sink).await {
        warn!(hub = F::NAME, error = %e, "session not started");
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = health::check(state.started, &state.chat_hub, &state.notification_hub).await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(&state.metrics),
    )
}
