//! WebSocket relay server.
//!
//! Mounts a subscribe endpoint, owns the subscriber pool for its
//! connections, and forwards published values to every attached observer.
//! A process-wide manager enforces that no two live relay servers share a
//! port, mount path, or server key.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use once_cell::sync::Lazy;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::lock;

use super::error::RelayError;
use super::pool::SubscriberPool;
use super::subscriber::{self, DEFAULT_QUEUE_CAPACITY, Subscriber};

static MANAGER: Lazy<ServerManager> = Lazy::new(ServerManager::new);

/// Configuration for one relay server.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Listener address. Port 0 asks the OS for an ephemeral port.
    pub addr: SocketAddr,
    /// Mount path for the subscribe route; must be non-empty.
    pub path: String,
    /// Process-unique server key.
    pub key: String,
    /// Outbound queue depth per subscriber.
    pub queue_capacity: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            path: "/relay".to_string(),
            key: "relay".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

struct ServerEntry {
    port: u16,
    path: String,
}

/// Tracks live relay servers so port, path, and key stay unique within the
/// process.
struct ServerManager {
    servers: RwLock<HashMap<String, ServerEntry>>,
}

impl ServerManager {
    fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, options: &RelayOptions) -> Result<(), RelayError> {
        let mut servers = lock::write(&self.servers, "manager.register");
        if servers.contains_key(&options.key) {
            return Err(RelayError::DuplicateServer {
                what: "key",
                value: options.key.clone(),
            });
        }
        for entry in servers.values() {
            if entry.path == options.path {
                return Err(RelayError::DuplicateServer {
                    what: "path",
                    value: options.path.clone(),
                });
            }
            // Ephemeral ports are resolved at bind time and never collide.
            if options.addr.port() != 0 && entry.port == options.addr.port() {
                return Err(RelayError::DuplicateServer {
                    what: "port",
                    value: options.addr.port().to_string(),
                });
            }
        }
        servers.insert(options.key.clone(), ServerEntry {
            port: options.addr.port(),
            path: options.path.clone(),
        });
        Ok(())
    }

    fn deregister(&self, key: &str) {
        lock::write(&self.servers, "manager.deregister").remove(key);
    }
}

type ConnectionCallback = Arc<dyn Fn(Subscriber) + Send + Sync>;

/// One relay server: a subscribe route plus the pool behind it.
pub struct RelayServer {
    options: RelayOptions,
    pool: Arc<SubscriberPool>,
    on_new_connection: RwLock<Option<ConnectionCallback>>,
    stop: Notify,
    serve_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RelayServer {
    /// Validate the options and register the server process-wide.
    pub fn new(options: RelayOptions) -> Result<Arc<Self>, RelayError> {
        let mut options = options;
        options.path = options.path.trim().trim_end_matches('/').to_string();
        if options.path.is_empty() {
            return Err(RelayError::EmptyPath);
        }
        if !options.path.starts_with('/') {
            options.path.insert(0, '/');
        }
        MANAGER.register(&options)?;

        Ok(Arc::new(Self {
            options,
            pool: Arc::new(SubscriberPool::new()),
            on_new_connection: RwLock::new(None),
            stop: Notify::new(),
            serve_task: Mutex::new(None),
        }))
    }

    /// The pool of subscribers attached to this server.
    pub fn pool(&self) -> &Arc<SubscriberPool> {
        &self.pool
    }

    /// The resolved options this server runs with.
    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    /// Install the callback fired once per accepted connection.
    ///
    /// The callback receives the new subscriber before any broadcast
    /// reaches it; sending initial state from here is the usual pattern.
    pub fn set_on_new_connection(&self, callback: impl Fn(Subscriber) + Send + Sync + 'static) {
        *lock::write(&self.on_new_connection, "set_on_new_connection") = Some(Arc::new(callback));
    }

    /// Broadcast one opaque value to every attached subscriber.
    pub fn publish(&self, msg: Value) {
        self.pool.broadcast(&msg);
    }

    /// The axum router serving this relay.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(
                &format!("{}/ws/subscribe", self.options.path),
                get(handle_subscribe),
            )
            .route("/healthz", get(|| async { "ok" }))
            .with_state(Arc::clone(self))
    }

    /// Bind the listener and serve in the background.
    ///
    /// Returns the bound address, which differs from `options.addr` when an
    /// ephemeral port was requested.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, RelayError> {
        let listener = TcpListener::bind(self.options.addr)
            .await
            .map_err(RelayError::Bind)?;
        let addr = listener.local_addr().map_err(RelayError::Bind)?;

        let router = self.router();
        let server = Arc::clone(self);
        let task = tokio::spawn(async move {
            let stop = Arc::clone(&server);
            let shutdown = async move { stop.stop.notified().await };
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %err, "relay server stopped with error");
            }
        });
        *self
            .serve_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(task);

        info!(addr = %addr, path = %self.options.path, "relay listening");
        Ok(addr)
    }

    /// Wait for the serve task to finish draining after [`RelayServer::shutdown`].
    pub async fn join(&self) {
        let task = self
            .serve_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Deregister from the process-wide manager and stop the listener.
    ///
    /// Subscriber connections drain and close; the caches feeding this
    /// relay are untouched.
    pub fn shutdown(&self) {
        MANAGER.deregister(&self.options.key);
        self.stop.notify_waiters();
        info!(path = %self.options.path, "relay shut down");
    }
}

async fn handle_subscribe(
    ws: WebSocketUpgrade,
    State(server): State<Arc<RelayServer>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, server))
}

/// Runs for the lifetime of one WebSocket connection: drains the
/// subscriber's queue onto the wire and watches the incoming side for
/// close.
async fn handle_socket(socket: WebSocket, server: Arc<RelayServer>) {
    let (subscriber, mut queue) = subscriber::channel(server.options.queue_capacity);
    let key = subscriber.key();

    if let Err(err) = server.pool.add(subscriber.clone()) {
        warn!(subscriber = %key, error = %err, "rejecting connection");
        return;
    }

    let callback = lock::read(&server.on_new_connection, "handle_socket").clone();
    match callback {
        Some(callback) => callback(subscriber),
        // The pool's clone must be the last sender standing, so that
        // removal from the pool closes the queue and ends this task.
        None => drop(subscriber),
    }

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outbound = queue.recv() => match outbound {
                Some(msg) => {
                    let frame = match serde_json::to_string(&msg) {
                        Ok(text) => Message::Text(text.into()),
                        Err(err) => {
                            error!(subscriber = %key, error = %err, "failed to serialize message");
                            continue;
                        }
                    };
                    if sink.send(frame).await.is_err() {
                        break;
                    }
                }
                // Every Subscriber clone is gone: the pool dropped us as
                // unresponsive, or the server is going away.
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // inbound frames are ignored
                Some(Err(err)) => {
                    debug!(subscriber = %key, error = %err, "receive error");
                    break;
                }
            },
        }
    }

    server.pool.remove(&key);
    info!(subscriber = %key, "subscriber disconnected");
}
