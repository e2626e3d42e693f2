//! WebSocket Relay Server
//!
//! Async WebSocket server for two-player relay connections.
//! Connection tasks decode frames and forward them to a single relay loop,
//! which owns all session state and handles events one at a time.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::matchmaking::{Matchmaker, MatchmakerConfig, MovePolicy, DEFAULT_MAX_NAME_LEN};
use crate::game::participant::ParticipantId;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::network::relay::Relay;
use crate::network::transport::{ConnectionHub, ConnectionSender};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 2344;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound queue depth per connection.
    pub outbound_queue: usize,
    /// Close connections silent for this long. None disables.
    pub idle_timeout: Option<Duration>,
    /// Required `Origin` header value. None accepts any origin.
    pub allowed_origin: Option<String>,
    /// Matchmaker settings.
    pub matchmaker: MatchmakerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            max_connections: 1000,
            outbound_queue: 64,
            idle_timeout: None,
            allowed_origin: None,
            matchmaker: MatchmakerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ip = env_parse::<IpAddr>("BIND_ADDR").unwrap_or(defaults.bind_addr.ip());
        let port = env_parse::<u16>("PORT").unwrap_or(DEFAULT_PORT);

        Self {
            bind_addr: SocketAddr::new(ip, port),
            max_connections: env_parse("MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            outbound_queue: env_parse("OUTBOUND_QUEUE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.outbound_queue),
            idle_timeout: env_parse::<u64>("IDLE_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            allowed_origin: std::env::var("ALLOWED_ORIGIN")
                .ok()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty()),
            matchmaker: MatchmakerConfig {
                move_policy: std::env::var("MOVE_POLICY")
                    .ok()
                    .and_then(|p| MovePolicy::parse(&p))
                    .unwrap_or_default(),
                max_name_len: env_parse("MAX_NAME_LEN").unwrap_or(DEFAULT_MAX_NAME_LEN),
            },
        }
    }

    /// Whether a handshake `Origin` header is acceptable.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match (&self.allowed_origin, origin) {
            (None, _) => true,
            (Some(allowed), Some(origin)) => allowed == origin.trim_end_matches('/'),
            (Some(_), None) => false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Relay loop is no longer running.
    #[error("Relay loop stopped")]
    RelayStopped,
}

/// Events from connection tasks to the relay loop.
#[derive(Debug)]
pub enum RelayEvent {
    /// New connection with its outbound queue.
    Connected {
        /// Connection identity.
        conn: ParticipantId,
        /// Outbound queue.
        sender: ConnectionSender,
    },
    /// Decoded client message.
    Message {
        /// Connection identity.
        conn: ParticipantId,
        /// Message.
        message: ClientMessage,
    },
    /// Connection closed.
    Disconnected {
        /// Connection identity.
        conn: ParticipantId,
    },
}

/// The relay server.
pub struct RelayServer {
    /// Server configuration.
    config: ServerConfig,
    /// Live connection count.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Create a new relay server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, RelayServerError> {
        Ok(TcpListener::bind(&self.config.bind_addr).await?)
    }

    /// Bind and run until shutdown.
    pub async fn run(&self) -> Result<(), RelayServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on an already-bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayServerError> {
        info!("Relay server listening on {}", listener.local_addr()?);

        let (event_tx, event_rx) = mpsc::channel::<RelayEvent>(1024);
        let relay = Relay::new(
            Matchmaker::new(self.config.matchmaker.clone()),
            ConnectionHub::new(),
        );

        let relay_shutdown = self.shutdown_tx.subscribe();
        let relay_handle = tokio::spawn(async move {
            Self::run_relay_loop(relay, event_rx, relay_shutdown).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr, event_tx.clone());
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

        drop(event_tx);
        if relay_handle.await.is_err() {
            return Err(RelayServerError::RelayStopped);
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        events: mpsc::Sender<RelayEvent>,
    ) {
        let config = self.config.clone();
        let connections = self.connections.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            if let Err(e) = Self::run_connection(stream, addr, &config, &events, &mut shutdown_rx).await {
                debug!("Connection {} ended with error: {}", addr, e);
            }
            connections.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Drive one connection from handshake to close.
    async fn run_connection(
        stream: TcpStream,
        addr: SocketAddr,
        config: &ServerConfig,
        events: &mpsc::Sender<RelayEvent>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<(), RelayServerError> {
        let check_origin = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let origin = req
                .headers()
                .get("origin")
                .and_then(|v| v.to_str().ok());
            if config.origin_allowed(origin) {
                Ok(resp)
            } else {
                let mut reject = ErrorResponse::new(Some("Origin not allowed".to_string()));
                *reject.status_mut() = StatusCode::FORBIDDEN;
                Err(reject)
            }
        };

        let ws_stream = match accept_hdr_async(stream, check_origin).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {}: {}", addr, e);
                return Err(e.into());
            }
        };

        let conn = ParticipantId::new_v4();
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_queue);

        events
            .send(RelayEvent::Connected {
                conn,
                sender: msg_tx.clone(),
            })
            .await
            .map_err(|_| RelayServerError::RelayStopped)?;

        info!("Connection {} from {}", conn.short(), addr);

        // Spawn message sender task
        let sender_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let closing = matches!(msg, ServerMessage::Shutdown { .. });
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
                if closing {
                    let _ = ws_sender.close().await;
                    break;
                }
            }
        });

        // Handle incoming messages
        loop {
            let next = async {
                match config.idle_timeout {
                    Some(limit) => tokio::time::timeout(limit, ws_receiver.next()).await.ok(),
                    None => Some(ws_receiver.next().await),
                }
            };

            tokio::select! {
                msg = next => {
                    let decoded = match msg {
                        None => {
                            debug!("Connection {} idle, closing", conn.short());
                            break;
                        }
                        Some(Some(Ok(Message::Text(text)))) => ClientMessage::from_json(&text),
                        Some(Some(Ok(Message::Binary(data)))) => ClientMessage::from_slice(&data),
                        Some(Some(Ok(Message::Close(_)))) | Some(None) => {
                            debug!("Connection {} closed", conn.short());
                            break;
                        }
                        Some(Some(Err(e))) => {
                            debug!("WebSocket error for {}: {}", conn.short(), e);
                            break;
                        }
                        Some(Some(Ok(_))) => continue,
                    };

                    match decoded {
                        Ok(message) => {
                            if events.send(RelayEvent::Message { conn, message }).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            debug!("Invalid message from {}: {}", conn.short(), e);
                            let _ = msg_tx.try_send(ServerMessage::Error(ServerError {
                                code: ErrorCode::InvalidInput,
                                message: "Invalid message format".to_string(),
                            }));
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        // Disconnect is queued behind this connection's earlier messages
        let _ = events.send(RelayEvent::Disconnected { conn }).await;

        drop(msg_tx);
        let _ = tokio::time::timeout(Duration::from_secs(1), sender_task).await;

        info!("Connection {} cleaned up", conn.short());
        Ok(())
    }

    /// Run the relay loop. Owns all session state.
    async fn run_relay_loop(
        mut relay: Relay<ConnectionHub>,
        mut events: mpsc::Receiver<RelayEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            // Shutdown wins over disconnects it caused
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    let dropped = relay.shutdown();
                    info!("Relay shutting down, {} players dropped", dropped.len());
                    relay.transport().broadcast_all(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    });
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    Self::apply_event(&mut relay, event);
                }
            }
        }
    }

    /// Apply one event to the relay.
    fn apply_event(relay: &mut Relay<ConnectionHub>, event: RelayEvent) {
        match event {
            RelayEvent::Connected { conn, sender } => {
                relay.transport_mut().register(conn, sender);
            }
            RelayEvent::Message { conn, message } => {
                relay.handle_message(conn, message);
            }
            RelayEvent::Disconnected { conn } => {
                relay.handle_disconnect(conn);
                relay.transport_mut().unregister(&conn);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::participant::Role;
    use crate::network::protocol::JoinAck;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_connections, 1000);
        assert!(config.idle_timeout.is_none());
        assert_eq!(config.matchmaker.move_policy, MovePolicy::Permissive);
    }

    #[test]
    fn test_origin_check() {
        let open = ServerConfig::default();
        assert!(open.origin_allowed(None));
        assert!(open.origin_allowed(Some("https://evil.example")));

        let locked = ServerConfig {
            allowed_origin: Some("https://chess.example".to_string()),
            ..Default::default()
        };
        assert!(locked.origin_allowed(Some("https://chess.example")));
        assert!(locked.origin_allowed(Some("https://chess.example/")));
        assert!(!locked.origin_allowed(Some("https://evil.example")));
        assert!(!locked.origin_allowed(None));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = RelayServer::new(ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        });
        assert_eq!(server.connection_count(), 0);
        server.shutdown();
    }

    async fn start_server() -> (Arc<RelayServer>, SocketAddr, tokio::task::JoinHandle<()>) {
        start_server_with(ServerConfig::default()).await
    }

    async fn start_server_with(
        config: ServerConfig,
    ) -> (Arc<RelayServer>, SocketAddr, tokio::task::JoinHandle<()>) {
        let server = Arc::new(RelayServer::new(ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..config
        }));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let running = server.clone();
        let handle = tokio::spawn(async move {
            running.serve(listener).await.unwrap();
        });
        (server, addr, handle)
    }

    async fn send(client: &mut Client, json: &str) {
        client.send(Message::Text(json.to_string())).await.unwrap();
    }

    async fn recv(client: &mut Client) -> ServerMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for message")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(text) = frame {
                return ServerMessage::from_json(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_two_players_over_websocket() {
        let (server, addr, handle) = start_server().await;
        let url = format!("ws://{}", addr);

        let (mut a, _) = connect_async(url.as_str()).await.unwrap();
        let (mut b, _) = connect_async(url.as_str()).await.unwrap();

        send(&mut a, r#"{"type":"join","name":"A","gameID":"g1"}"#).await;
        assert_eq!(recv(&mut a).await, ServerMessage::JoinAck(JoinAck::accepted(Role::First)));
        assert!(matches!(recv(&mut a).await, ServerMessage::Welcome { opponent: None, .. }));

        send(&mut b, r#"{"type":"join","name":"B","gameID":"g1"}"#).await;
        assert_eq!(recv(&mut b).await, ServerMessage::JoinAck(JoinAck::accepted(Role::Second)));
        assert!(matches!(recv(&mut b).await, ServerMessage::Welcome { opponent: Some(_), .. }));
        assert_eq!(
            recv(&mut b).await,
            ServerMessage::message("Let's start the game. White (A) goes first")
        );

        assert!(matches!(recv(&mut a).await, ServerMessage::OpponentJoin { .. }));
        assert_eq!(
            recv(&mut a).await,
            ServerMessage::message("Let's start the game. White (A) goes first")
        );

        send(&mut a, r#"{"type":"move","from":"e2","to":"e4","gameID":"g1"}"#).await;
        assert_eq!(
            recv(&mut b).await,
            ServerMessage::OpponentMove {
                from: "e2".to_string(),
                to: "e4".to_string(),
            }
        );

        a.close(None).await.unwrap();
        assert_eq!(recv(&mut b).await, ServerMessage::message("A has left the game."));
        assert_eq!(recv(&mut b).await, ServerMessage::OpponentLeft);

        server.shutdown();
        assert!(matches!(recv(&mut b).await, ServerMessage::Shutdown { .. }));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_frame_gets_error() {
        let (server, addr, handle) = start_server().await;
        let (mut a, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        send(&mut a, r#"{"type":"teleport"}"#).await;
        match recv(&mut a).await {
            ServerMessage::Error(e) => assert_eq!(e.code, ErrorCode::InvalidInput),
            other => panic!("expected error, got {:?}", other),
        }

        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_origin_rejected_with_403() {
        let (server, addr, handle) = start_server_with(ServerConfig {
            allowed_origin: Some("https://chess.example".to_string()),
            ..Default::default()
        })
        .await;
        let url = format!("ws://{}", addr);

        let mut req = url.as_str().into_client_request().unwrap();
        req.headers_mut()
            .insert("origin", HeaderValue::from_static("https://evil.example"));
        match connect_async(req).await {
            Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
                assert_eq!(resp.status(), StatusCode::FORBIDDEN);
            }
            Err(e) => panic!("expected HTTP 403, got {}", e),
            Ok(_) => panic!("handshake with foreign origin succeeded"),
        }

        let mut req = url.as_str().into_client_request().unwrap();
        req.headers_mut()
            .insert("origin", HeaderValue::from_static("https://chess.example"));
        let (mut ok, _) = connect_async(req).await.unwrap();
        send(&mut ok, r#"{"type":"ping","timestamp":1}"#).await;
        assert!(matches!(recv(&mut ok).await, ServerMessage::Pong { timestamp: 1, .. }));

        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_limit_refuses_extra_client() {
        let (server, addr, handle) = start_server_with(ServerConfig {
            max_connections: 1,
            ..Default::default()
        })
        .await;
        let url = format!("ws://{}", addr);

        let (mut first, _) = connect_async(url.as_str()).await.unwrap();
        assert_eq!(server.connection_count(), 1);

        let second = tokio::time::timeout(Duration::from_secs(5), connect_async(url.as_str()))
            .await
            .expect("second connect hung");
        assert!(second.is_err());

        // The seated client is unaffected
        send(&mut first, r#"{"type":"ping","timestamp":2}"#).await;
        assert!(matches!(recv(&mut first).await, ServerMessage::Pong { timestamp: 2, .. }));

        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_player_disconnected_and_opponent_told() {
        let (server, addr, handle) = start_server_with(ServerConfig {
            idle_timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        })
        .await;
        let url = format!("ws://{}", addr);

        let (mut a, _) = connect_async(url.as_str()).await.unwrap();
        let (mut b, _) = connect_async(url.as_str()).await.unwrap();

        send(&mut a, r#"{"type":"join","name":"A","gameID":"g1"}"#).await;
        assert_eq!(recv(&mut a).await, ServerMessage::JoinAck(JoinAck::accepted(Role::First)));
        send(&mut b, r#"{"type":"join","name":"B","gameID":"g1"}"#).await;
        assert_eq!(recv(&mut b).await, ServerMessage::JoinAck(JoinAck::accepted(Role::Second)));

        // B keeps pinging, A goes quiet
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        let mut seen = Vec::new();
        while !seen.contains(&ServerMessage::OpponentLeft) {
            assert!(tokio::time::Instant::now() < deadline, "no opponent_left, saw {:?}", seen);
            match tokio::time::timeout(Duration::from_millis(30), b.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    seen.push(ServerMessage::from_json(&text).unwrap());
                }
                Ok(other) => panic!("unexpected frame {:?}", other),
                Err(_) => send(&mut b, r#"{"type":"ping","timestamp":0}"#).await,
            }
        }
        assert!(seen.contains(&ServerMessage::message("A has left the game.")));

        server.shutdown();
        handle.await.unwrap();
    }
}
