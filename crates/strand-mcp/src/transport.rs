//! Provider transports: stdio subprocess and HTTP.
//!
//! The stdio transport writes line-delimited JSON-RPC to the child's
//! stdin and matches responses to requests by ID through a pending-call
//! map. One reader task owns stdout for the life of the connection;
//! when it sees EOF the transport flips to disconnected and all later
//! requests fail fast.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::errors::McpError;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// A bidirectional JSON-RPC channel to one provider.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for its response.
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError>;

    /// Send a notification (no response).
    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError>;

    /// Tear down the connection.
    async fn close(&self);

    /// Whether the connection is still usable.
    fn is_connected(&self) -> bool;
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Stdio transport: a child process speaking line-delimited JSON-RPC.
pub struct StdioTransport {
    child: Mutex<Option<tokio::process::Child>>,
    stdin_tx: mpsc::Sender<String>,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    request_timeout_ms: u64,
}

impl StdioTransport {
    /// Spawn the provider process and start its I/O tasks.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        request_timeout_ms: u64,
    ) -> Result<Self, McpError> {
        let mut cmd = tokio::process::Command::new(command);
        let _ = cmd
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in env {
            let _ = cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| McpError::Spawn {
            message: format!("{command}: {e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::Spawn {
            message: "child has no stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::Spawn {
            message: "child has no stdout".into(),
        })?;

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(64);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        // Writer task: serialize access to the child's stdin
        let _ = tokio::spawn(async move {
            let mut writer = stdin;
            while let Some(msg) = stdin_rx.recv().await {
                if let Err(e) = writer.write_all(msg.as_bytes()).await {
                    error!(error = %e, "provider stdin write failed");
                    break;
                }
                if let Err(e) = writer.flush().await {
                    error!(error = %e, "provider stdin flush failed");
                    break;
                }
            }
        });

        // Reader task: route responses to pending calls by ID
        let pending_reader = pending.clone();
        let connected_reader = connected.clone();
        let _ = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!("provider stdout closed");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                            Ok(response) => {
                                if let Some(id) = response.id {
                                    let sender = pending_reader.lock().remove(&id);
                                    if let Some(tx) = sender {
                                        let _ = tx.send(response);
                                    }
                                }
                                // Responses without an ID and server
                                // notifications are dropped
                            }
                            Err(_) => {
                                warn!(line = %trimmed, "unparseable provider message");
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "provider stdout read failed");
                        break;
                    }
                }
            }
            connected_reader.store(false, Ordering::SeqCst);
            // Fail all in-flight requests
            pending_reader.lock().clear();
        });

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin_tx,
            pending,
            connected,
            request_timeout_ms,
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        if !self.is_connected() {
            return Err(McpError::Transport {
                message: "transport closed".into(),
            });
        }

        let (tx, rx) = oneshot::channel();
        {
            let _ = self.pending.lock().insert(request.id, tx);
        }

        let msg = serde_json::to_string(&request)? + "\n";
        let request_id = request.id;
        if self.stdin_tx.send(msg).await.is_err() {
            let _ = self.pending.lock().remove(&request_id);
            return Err(McpError::Transport {
                message: "writer task gone".into(),
            });
        }

        let timeout = Duration::from_millis(self.request_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(McpError::Transport {
                message: "connection closed mid-request".into(),
            }),
            Err(_) => {
                let _ = self.pending.lock().remove(&request_id);
                Err(McpError::Timeout {
                    timeout_ms: self.request_timeout_ms,
                })
            }
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError> {
        if !self.is_connected() {
            return Err(McpError::Transport {
                message: "transport closed".into(),
            });
        }
        let msg = serde_json::to_string(&notification)? + "\n";
        self.stdin_tx.send(msg).await.map_err(|_| McpError::Transport {
            message: "writer task gone".into(),
        })
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            let _ = child.kill().await;
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// HTTP transport: each request is one JSON-RPC POST.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
    connected: AtomicBool,
}

impl HttpTransport {
    /// Create an HTTP transport with a per-request timeout.
    #[must_use]
    pub fn new(url: String, headers: HashMap<String, String>, request_timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url,
            headers,
            connected: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        if !self.is_connected() {
            return Err(McpError::Transport {
                message: "transport closed".into(),
            });
        }
        let mut builder = self.client.post(&self.url).json(&request);
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        let response = builder.send().await?.error_for_status()?;
        Ok(response.json::<JsonRpcResponse>().await?)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError> {
        if !self.is_connected() {
            return Err(McpError::Transport {
                message: "transport closed".into(),
            });
        }
        let mut builder = self.client.post(&self.url).json(&notification);
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        let _ = builder.send().await?.error_for_status()?;
        Ok(())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
