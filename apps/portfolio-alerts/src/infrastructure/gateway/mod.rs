//! Live Connection Gateway
//!
//! WebSocket endpoint through which logged-in clients receive price alerts.
//!
//! # Protocol
//!
//! - `GET /ws` upgrades to a WebSocket.
//! - Client → server: `{"event": "registerUser", "userID": "<id>"}` binds
//!   the socket to a user. Re-registering replaces the previous binding.
//!   Unknown events and malformed frames are ignored.
//! - Server → client: `{"message": "<alert text>"}`.
//!
//! Each socket gets a [`ClientHandle`] carrying a process-unique id and a
//! bounded outbound queue drained by a writer task. When the socket closes,
//! the registry drops whatever still maps to that handle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{AlertDeliveryPort, DeliveryFailure};
use crate::domain::alerts::AlertPayload;
use crate::domain::connections::ConnectionRegistry;
use crate::domain::market::UserId;
use crate::infrastructure::metrics;

/// Registry keyed by gateway connection handles.
pub type ClientRegistry = ConnectionRegistry<ClientHandle>;

// =============================================================================
// Client Handle
// =============================================================================

/// Writable side of one live WebSocket.
///
/// Two handles are equal iff they belong to the same socket.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: u64,
    outbound: mpsc::Sender<String>,
}

impl ClientHandle {
    /// Create a handle over an outbound queue.
    #[must_use]
    pub const fn new(id: u64, outbound: mpsc::Sender<String>) -> Self {
        Self { id, outbound }
    }

    /// Connection id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Queue `text` for the socket writer without waiting.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryFailure` if the queue is full or the socket is gone.
    pub fn try_push(&self, text: String) -> Result<(), DeliveryFailure> {
        self.outbound.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryFailure::NotWritable {
                connection: self.id.to_string(),
            },
            TrySendError::Closed(_) => DeliveryFailure::Disconnected {
                connection: self.id.to_string(),
            },
        })
    }
}

impl PartialEq for ClientHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientHandle {}

// =============================================================================
// Alert Delivery Adapter
// =============================================================================

/// Pushes alerts onto a client's outbound queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketAlertDelivery;

#[async_trait]
impl AlertDeliveryPort for WebSocketAlertDelivery {
    type Handle = ClientHandle;

    async fn deliver(
        &self,
        handle: &ClientHandle,
        payload: &AlertPayload,
    ) -> Result<(), DeliveryFailure> {
        let text = serde_json::to_string(payload).map_err(|e| DeliveryFailure::Encoding {
            message: e.to_string(),
        })?;
        handle.try_push(text)
    }
}

// =============================================================================
// Client Events
// =============================================================================

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event")]
pub enum ClientEvent {
    /// Bind this socket to a user.
    #[serde(rename = "registerUser")]
    RegisterUser {
        /// User id issued by the authentication service.
        #[serde(rename = "userID")]
        user_id: String,
    },
}

fn handle_client_frame(registry: &ClientRegistry, handle: &ClientHandle, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(connection = handle.id(), error = %e, "Ignoring client frame");
            return;
        }
    };

    match event {
        ClientEvent::RegisterUser { user_id } => {
            let user = UserId::new(user_id);
            if user.is_empty() {
                tracing::warn!(connection = handle.id(), "Rejected registration with empty user id");
                return;
            }

            match registry.register(user.clone(), handle.clone()) {
                Some(previous) if previous != *handle => tracing::info!(
                    user = %user,
                    connection = handle.id(),
                    replaced = previous.id(),
                    "User reconnected, previous connection replaced"
                ),
                Some(_) => tracing::debug!(user = %user, connection = handle.id(), "User re-registered"),
                None => tracing::info!(user = %user, connection = handle.id(), "User registered"),
            }
            metrics::set_online_connections(registry.online_count());
        }
    }
}

// =============================================================================
// Gateway State
// =============================================================================

/// Shared state for the WebSocket gateway.
pub struct GatewayState {
    registry: Arc<ClientRegistry>,
    next_id: AtomicU64,
    outbound_buffer: usize,
    cancel: CancellationToken,
}

impl GatewayState {
    /// Create new gateway state.
    #[must_use]
    pub fn new(registry: Arc<ClientRegistry>, outbound_buffer: usize, cancel: CancellationToken) -> Self {
        Self {
            registry,
            next_id: AtomicU64::new(1),
            outbound_buffer: outbound_buffer.max(1),
            cancel,
        }
    }

    fn next_connection_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Gateway routes over `state`.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(state.outbound_buffer);
    let handle = ClientHandle::new(state.next_connection_id(), tx);

    tracing::debug!(connection = handle.id(), "Client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let registry = Arc::clone(&state.registry);
    let reader = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => handle_client_frame(&registry, &reader, text.as_str()),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
        () = state.cancel.cancelled() => {
            send_task.abort();
            recv_task.abort();
        }
    }

    let removed = state.registry.unregister(&handle);
    metrics::set_online_connections(state.registry.online_count());
    tracing::debug!(connection = handle.id(), users = removed.len(), "Client disconnected");
}

// =============================================================================
// Gateway Server
// =============================================================================

/// WebSocket gateway HTTP server.
pub struct GatewayServer {
    port: u16,
    state: Arc<GatewayState>,
}

impl GatewayServer {
    /// Create a new gateway server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<GatewayState>) -> Self {
        Self { port, state }
    }

    /// Run the gateway until the state's cancellation token fires.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), GatewayError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Alert gateway listening");
        serve(listener, self.state).await
    }
}

/// Serve the gateway on an already bound listener.
///
/// # Errors
///
/// Returns `GatewayError` if the HTTP server fails while running.
pub async fn serve(listener: TcpListener, state: Arc<GatewayState>) -> Result<(), GatewayError> {
    let cancel = state.cancel.clone();

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| GatewayError::ServerFailed(e.to_string()))?;

    tracing::info!("Alert gateway stopped");
    Ok(())
}

// =============================================================================
// Errors
// =============================================================================

/// Gateway server errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
