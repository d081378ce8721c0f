//! WebSocket Game Server
//!
//! Async WebSocket server for duel connections.
//! Handles authentication, matchmaking, and routing of match actions to
//! their coordinators.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::network::auth::{authenticate, AuthConfig, Identity};
use crate::network::coordinator::{MatchError, MatchRegistry, Participant, SweepPolicy};
use crate::network::matchmaker::{EnqueueOutcome, Matchmaker};
use crate::network::protocol::{
    AuthRequest, AuthResult, ClientMessage, ErrorCode, MatchId, MatchMode, QueueStatus,
    QueueStatusInfo, Rejection, ServerError, ServerMessage,
};
use crate::network::rate_limit::{RateLimitConfig, RateLimiter};

/// Outbound queue depth per connection.
const OUTBOUND_CAPACITY: usize = 64;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Connections silent for this long are closed.
    pub idle_timeout: Duration,
    /// Queue entries older than this are dropped.
    pub queue_timeout: Duration,
    /// How long a disconnected participant may take to return.
    pub reconnect_grace: Duration,
    /// How long a finished match stays queryable.
    pub finished_linger: Duration,
    /// Inactivity after which a running match is abandoned.
    pub abandoned_ttl: Duration,
    /// Period of the background sweep.
    pub sweep_interval: Duration,
    /// Per-connection message rate limit.
    pub rate_limit: RateLimitConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            queue_timeout: Duration::from_secs(120),
            reconnect_grace: Duration::from_secs(30),
            finished_linger: Duration::from_secs(60),
            abandoned_ttl: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(5),
            rate_limit: RateLimitConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Shortest sweep period accepted.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or(key, default.as_secs()))
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("MEXICO_BIND_ADDR", defaults.bind_addr),
            max_connections: env_or("MEXICO_MAX_CONNECTIONS", defaults.max_connections),
            idle_timeout: env_secs("MEXICO_IDLE_TIMEOUT_SECS", defaults.idle_timeout),
            queue_timeout: env_secs("MEXICO_QUEUE_TIMEOUT_SECS", defaults.queue_timeout),
            reconnect_grace: env_secs("MEXICO_RECONNECT_GRACE_SECS", defaults.reconnect_grace),
            finished_linger: env_secs("MEXICO_FINISHED_LINGER_SECS", defaults.finished_linger),
            abandoned_ttl: env_secs("MEXICO_ABANDONED_TTL_SECS", defaults.abandoned_ttl),
            sweep_interval: env_secs("MEXICO_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            rate_limit: RateLimitConfig {
                burst: env_or("MEXICO_RATE_BURST", defaults.rate_limit.burst),
                refill_per_sec: env_or("MEXICO_RATE_REFILL", defaults.rate_limit.refill_per_sec),
            },
            version: defaults.version,
        }
        .sanitized()
    }

    /// Clamp values the runtime cannot work with. The sweep period must be
    /// non-zero for `tokio::time::interval`.
    pub fn sanitized(mut self) -> Self {
        if self.sweep_interval < MIN_SWEEP_INTERVAL {
            warn!("Sweep interval {:?} too short, using {:?}", self.sweep_interval, MIN_SWEEP_INTERVAL);
            self.sweep_interval = MIN_SWEEP_INTERVAL;
        }
        let rate_limit = self.rate_limit.sanitized();
        if rate_limit != self.rate_limit {
            warn!("Rate limit {:?} unusable, using {:?}", self.rate_limit, rate_limit);
            self.rate_limit = rate_limit;
        }
        self
    }

    /// Match lifetimes for the registry sweep.
    pub fn sweep_policy(&self) -> SweepPolicy {
        SweepPolicy {
            reconnect_grace: self.reconnect_grace,
            finished_linger: self.finished_linger,
            abandoned_ttl: self.abandoned_ttl,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

// =============================================================================
// SHARED STATE
// =============================================================================

/// Connected client state.
struct ConnectedClient {
    /// Identity (after auth).
    identity: Option<Identity>,
    /// Connection time.
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
    /// Inbound message budget.
    rate_limiter: RateLimiter,
    /// Message sender (for direct messaging to client).
    sender: mpsc::Sender<ServerMessage>,
}

type ClientMap = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// Everything a connection task needs.
#[derive(Clone)]
struct ServerContext {
    config: ServerConfig,
    auth: Arc<AuthConfig>,
    clients: ClientMap,
    registry: Arc<MatchRegistry>,
    matchmaker: Arc<Matchmaker>,
}

/// A match action routed to a coordinator.
#[derive(Debug, Clone, Copy)]
enum MatchAction {
    Throw { blind: bool },
    Keep,
    Reveal,
}

fn rejection(err: &MatchError) -> Rejection {
    Rejection {
        code: err.code(),
        reason: err.reason(),
        message: err.to_string(),
        retry_after_ms: None,
        state: None,
    }
}

// =============================================================================
// GAME SERVER
// =============================================================================

/// The game server.
pub struct GameServer {
    ctx: ServerContext,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, auth: AuthConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            ctx: ServerContext {
                config: config.sanitized(),
                auth: Arc::new(auth),
                clients: Arc::new(RwLock::new(BTreeMap::new())),
                registry: Arc::new(MatchRegistry::new()),
                matchmaker: Arc::new(Matchmaker::new()),
            },
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.ctx.config.bind_addr).await?;
        info!("Duel server listening on {}", self.ctx.config.bind_addr);
        if !self.ctx.auth.is_configured() {
            warn!("No auth key configured, accepting client-declared player ids");
        }

        let sweep_ctx = self.ctx.clone();
        let sweep_handle = tokio::spawn(async move {
            Self::run_sweep_loop(sweep_ctx).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.ctx.clients.read().await.len();
                            if clients_count >= self.ctx.config.max_connections {
                                warn!("{}, rejecting {}", GameServerError::ConnectionLimitReached, addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        sweep_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let ctx = self.ctx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);

            Self::register_client(&ctx, addr, msg_tx.clone()).await;

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let mut shutting_down = false;

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = tokio::time::timeout(ctx.config.idle_timeout, ws_receiver.next()) => {
                        match msg {
                            Err(_) => {
                                info!("Closing idle connection {}", addr);
                                break;
                            }
                            Ok(Some(Ok(Message::Text(text)))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError {
                                            code: ErrorCode::InvalidInput,
                                            message: "Invalid message format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(&ctx, addr, client_msg, &msg_tx).await;
                            }
                            Ok(Some(Ok(Message::Binary(_)))) => {
                                let _ = msg_tx.send(ServerMessage::Error(ServerError {
                                    code: ErrorCode::InvalidInput,
                                    message: "Binary frames are not accepted".to_string(),
                                })).await;
                            }
                            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Ok(Some(Err(e))) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            Ok(Some(Ok(_))) => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        shutting_down = true;
                        break;
                    }
                }
            }

            Self::disconnect_client(&ctx, addr).await;

            // Give the shutdown notice a moment to flush
            let mut sender_task = sender_task;
            if shutting_down {
                let _ = tokio::time::timeout(Duration::from_secs(1), &mut sender_task).await;
            }
            sender_task.abort();

            info!("Client {} cleaned up", addr);
        });
    }

    /// Track a freshly accepted connection.
    async fn register_client(ctx: &ServerContext, addr: SocketAddr, sender: mpsc::Sender<ServerMessage>) {
        let now = Instant::now();
        ctx.clients.write().await.insert(addr, ConnectedClient {
            identity: None,
            connected_at: now,
            last_activity: now,
            rate_limiter: RateLimiter::new(ctx.config.rate_limit),
            sender,
        });
    }

    /// Drop a connection: leave the queue, pause any running match.
    async fn disconnect_client(ctx: &ServerContext, addr: SocketAddr) {
        let (client, still_connected) = {
            let mut clients = ctx.clients.write().await;
            let Some(client) = clients.remove(&addr) else {
                return;
            };
            // The same identity may already be attached through a newer connection
            let still_connected = client.identity.as_ref().is_some_and(|identity| {
                clients.values().any(|c| {
                    c.identity.as_ref().map(|i| i.player_id) == Some(identity.player_id)
                })
            });
            (client, still_connected)
        };

        debug!(
            "Client {} was connected for {:?}, last active {:?} ago",
            addr,
            client.connected_at.elapsed(),
            client.last_activity.elapsed()
        );

        let Some(identity) = client.identity else {
            return;
        };
        if still_connected {
            return;
        }

        ctx.matchmaker.cancel(&identity.player_id).await;

        if let Some((match_id, coordinator)) =
            ctx.registry.active_match_for_player(&identity.player_id).await
        {
            coordinator
                .write()
                .await
                .mark_disconnected(&identity.player_id, Instant::now());
            info!(
                "Player {} dropped from match {}, holding seat for {:?}",
                identity.player_id.short_hex(),
                hex::encode(&match_id[..4]),
                ctx.config.reconnect_grace
            );
        }
    }

    /// Handle a client message.
    async fn handle_client_message(
        ctx: &ServerContext,
        addr: SocketAddr,
        msg: ClientMessage,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        // Rate limit before dispatch
        let (admitted, identity) = {
            let mut clients = ctx.clients.write().await;
            let Some(client) = clients.get_mut(&addr) else {
                return;
            };
            client.last_activity = Instant::now();
            (client.rate_limiter.check(), client.identity.clone())
        };

        if let Err(wait) = admitted {
            warn!("Rate limit exceeded for {} ({})", addr, msg.kind());
            let mut rejected = Rejection::new(ErrorCode::RateLimited, "Too many messages");
            rejected.retry_after_ms = Some(u64::try_from(wait.as_millis()).unwrap_or(u64::MAX));
            let _ = sender.send(ServerMessage::Rejected(rejected)).await;
            return;
        }

        let identity = match (&msg, identity) {
            (ClientMessage::Auth(auth), _) => {
                Self::handle_auth(ctx, addr, auth.clone(), sender).await;
                return;
            }
            (ClientMessage::Ping { timestamp }, _) => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp: *timestamp,
                    server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
                }).await;
                return;
            }
            (_, Some(identity)) => identity,
            (_, None) => {
                let _ = sender.send(ServerMessage::Rejected(Rejection::new(
                    ErrorCode::NotAuthenticated,
                    "Must authenticate first",
                ))).await;
                return;
            }
        };

        match msg {
            ClientMessage::Enqueue { mode } => {
                Self::handle_enqueue(ctx, identity, mode, sender).await;
            }
            ClientMessage::CancelQueue => {
                Self::handle_cancel_queue(ctx, &identity, sender).await;
            }
            ClientMessage::Throw { match_id, blind } => {
                Self::handle_action(ctx, &identity, match_id, MatchAction::Throw { blind }, sender).await;
            }
            ClientMessage::Keep { match_id } => {
                Self::handle_action(ctx, &identity, match_id, MatchAction::Keep, sender).await;
            }
            ClientMessage::Reveal { match_id } => {
                Self::handle_action(ctx, &identity, match_id, MatchAction::Reveal, sender).await;
            }
            ClientMessage::GetState { match_id } => {
                Self::handle_get_state(ctx, &identity, match_id, sender).await;
            }
            ClientMessage::Leave => {
                Self::handle_leave(ctx, &identity, sender).await;
            }
            ClientMessage::Auth(_) | ClientMessage::Ping { .. } => {}
        }
    }

    /// Handle authentication; re-attaches a running match if there is one.
    async fn handle_auth(
        ctx: &ServerContext,
        addr: SocketAddr,
        auth: AuthRequest,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let already = {
            let clients = ctx.clients.read().await;
            clients.get(&addr).is_some_and(|c| c.identity.is_some())
        };
        if already {
            let _ = sender.send(ServerMessage::Rejected(Rejection::new(
                ErrorCode::InvalidInput,
                "Already authenticated",
            ))).await;
            return;
        }

        let identity = match authenticate(&auth, &ctx.auth) {
            Ok(identity) => identity,
            Err(e) => {
                let code = e.code();
                warn!("Auth failed for {}: {} ({:?})", addr, e, code);
                let _ = sender.send(ServerMessage::AuthResult(AuthResult {
                    success: false,
                    player_id: None,
                    resumed_match: None,
                    error: Some(e.to_string()),
                    code: Some(code),
                    server_version: ctx.config.version.clone(),
                })).await;
                return;
            }
        };

        let player_id = identity.player_id;
        {
            let mut clients = ctx.clients.write().await;
            if let Some(client) = clients.get_mut(&addr) {
                client.identity = Some(identity.clone());
            }
        }

        let resumed = ctx.registry.active_match_for_player(&player_id).await;

        let _ = sender.send(ServerMessage::AuthResult(AuthResult {
            success: true,
            player_id: Some(player_id.0),
            resumed_match: resumed.as_ref().map(|(id, _)| *id),
            error: None,
            code: None,
            server_version: ctx.config.version.clone(),
        })).await;

        debug!("Client {} authenticated as {} ({})", addr, player_id.short_hex(), identity.name);

        if let Some((match_id, coordinator)) = resumed {
            if let Err(e) = coordinator.write().await.reconnect(&player_id, sender.clone()) {
                warn!("Could not resume match {}: {}", hex::encode(&match_id[..4]), e);
            }
        }
    }

    /// Handle a queue request. Bot mode starts a match at once.
    async fn handle_enqueue(
        ctx: &ServerContext,
        identity: Identity,
        mode: MatchMode,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let player_id = identity.player_id;

        if let Some((_, coordinator)) = ctx.registry.active_match_for_player(&player_id).await {
            let state = coordinator.read().await.view_for(&player_id).ok();
            let _ = sender.send(ServerMessage::Rejected(
                Rejection::new(ErrorCode::AlreadyInMatch, "Already in a match").with_state(state),
            )).await;
            return;
        }

        match mode {
            MatchMode::Bot => {
                if ctx.matchmaker.position(&player_id).await.is_some() {
                    let _ = sender.send(ServerMessage::Rejected(Rejection::new(
                        ErrorCode::AlreadyQueued,
                        "Cancel the queue before starting a bot match",
                    ))).await;
                    return;
                }
                let participant = Participant { identity, sender: sender.clone() };
                ctx.registry.create_match(MatchMode::Bot, participant, None).await;
            }
            MatchMode::Versus => {
                match ctx.matchmaker.enqueue(mode, identity, sender.clone()).await {
                    EnqueueOutcome::Queued { position } => {
                        let _ = sender.send(ServerMessage::Queue(QueueStatusInfo {
                            status: QueueStatus::Queued,
                            mode: Some(mode),
                            position: Some(position),
                        })).await;
                    }
                    EnqueueOutcome::AlreadyQueued { mode, position } => {
                        let _ = sender.send(ServerMessage::Rejected(Rejection::new(
                            ErrorCode::AlreadyQueued,
                            format!("Already queued for {:?} at position {}", mode, position),
                        ))).await;
                    }
                    EnqueueOutcome::Paired(first, second) => {
                        ctx.registry
                            .create_match(MatchMode::Versus, first.into(), Some(second.into()))
                            .await;
                    }
                }
            }
        }
    }

    /// Handle cancel queue.
    async fn handle_cancel_queue(
        ctx: &ServerContext,
        identity: &Identity,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let mode = ctx.matchmaker.cancel(&identity.player_id).await;
        let _ = sender.send(ServerMessage::Queue(QueueStatusInfo {
            status: QueueStatus::Cancelled,
            mode,
            position: None,
        })).await;
    }

    /// Route throw / keep / reveal to the coordinator. Successful results
    /// are pushed by the coordinator itself.
    async fn handle_action(
        ctx: &ServerContext,
        identity: &Identity,
        match_id: MatchId,
        action: MatchAction,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let player_id = identity.player_id;
        let coordinator = match ctx.registry.resolve(&player_id, &match_id).await {
            Ok(coordinator) => coordinator,
            Err(e) => {
                Self::send_match_rejection(ctx, identity, &e, sender).await;
                return;
            }
        };

        let (result, state) = {
            let mut c = coordinator.write().await;
            let result = match action {
                MatchAction::Throw { blind } => c.submit_throw(&player_id, blind).map(|_| ()),
                MatchAction::Keep => c.keep(&player_id).map(|_| ()),
                MatchAction::Reveal => c.reveal(&player_id).map(|_| ()),
            };
            let state = result.is_err().then(|| c.view_for(&player_id).ok()).flatten();
            (result, state)
        };

        if let Err(e) = result {
            debug!(
                "Rejected {:?} from {} in {}: {}",
                action,
                player_id.short_hex(),
                hex::encode(&match_id[..4]),
                e
            );
            let _ = sender.send(ServerMessage::Rejected(rejection(&e).with_state(state))).await;
        }
    }

    /// Handle a state request.
    async fn handle_get_state(
        ctx: &ServerContext,
        identity: &Identity,
        match_id: MatchId,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let player_id = identity.player_id;
        let view = match ctx.registry.resolve(&player_id, &match_id).await {
            Ok(coordinator) => coordinator.read().await.view_for(&player_id),
            Err(e) => Err(e),
        };

        match view {
            Ok(view) => {
                let _ = sender.send(ServerMessage::State(view)).await;
            }
            Err(e) => Self::send_match_rejection(ctx, identity, &e, sender).await,
        }
    }

    /// Handle player leave: drop out of the queue and forfeit a running match.
    async fn handle_leave(
        ctx: &ServerContext,
        identity: &Identity,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let player_id = identity.player_id;

        if let Some(mode) = ctx.matchmaker.cancel(&player_id).await {
            let _ = sender.send(ServerMessage::Queue(QueueStatusInfo {
                status: QueueStatus::Cancelled,
                mode: Some(mode),
                position: None,
            })).await;
        }

        if let Some((_, coordinator)) = ctx.registry.active_match_for_player(&player_id).await {
            if let Err(e) = coordinator.write().await.forfeit(&player_id) {
                debug!("Leave by {} ignored: {}", player_id.short_hex(), e);
            }
        }
    }

    /// Reject with the caller's current match view attached, if any.
    async fn send_match_rejection(
        ctx: &ServerContext,
        identity: &Identity,
        err: &MatchError,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let state = match ctx.registry.match_for_player(&identity.player_id).await {
            Some((_, coordinator)) => coordinator.read().await.view_for(&identity.player_id).ok(),
            None => None,
        };
        let _ = sender.send(ServerMessage::Rejected(rejection(err).with_state(state))).await;
    }

    /// Run the periodic sweep.
    async fn run_sweep_loop(ctx: ServerContext) {
        let mut interval = interval(ctx.config.sweep_interval);

        loop {
            interval.tick().await;
            Self::sweep(&ctx, Instant::now()).await;
        }
    }

    /// Expire queue entries, then apply match lifetimes.
    async fn sweep(ctx: &ServerContext, now: Instant) {
        for entry in ctx.matchmaker.expire(now, ctx.config.queue_timeout).await {
            debug!("Queue entry for {} timed out", entry.identity.player_id.short_hex());
            let _ = entry.sender.send(ServerMessage::Queue(QueueStatusInfo {
                status: QueueStatus::TimedOut,
                mode: Some(entry.mode),
                position: None,
            })).await;
        }

        let report = ctx.registry.sweep(now, &ctx.config.sweep_policy()).await;
        for match_id in &report.abandoned {
            info!("Removed abandoned match {}", hex::encode(&match_id[..4]));
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.ctx.clients.read().await.len()
    }

    /// Get registered match count.
    pub async fn match_count(&self) -> usize {
        self.ctx.registry.match_count().await
    }

    /// Get matchmaking queue size.
    pub async fn queue_size(&self) -> usize {
        self.ctx.matchmaker.total_len().await
    }
}
