//! Protocol client — correlates JSON-RPC requests and responses over one duplex stream.
//!
//! Every request gets the next id from a per-server counter and parks a
//! oneshot slot in the pending table. A single reader task owns the read
//! half, decodes each line and completes exactly the slot whose id matches.
//! Writes go through one async mutex so concurrent callers never interleave
//! inside a frame.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::error::McpError;
use crate::protocol::{decode_line, Envelope, Incoming, Reply, ResponseOutcome};

/// Default bound on how long a call waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type Slot = oneshot::Sender<Result<Value, McpError>>;

struct PendingCall {
    method: String,
    issued_at: Instant,
    slot: Slot,
}

struct Shared {
    server: String,
    writer: AsyncMutex<Option<BoxedWriter>>,
    pending: Mutex<HashMap<u64, PendingCall>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    timeout: Duration,
}

/// Handle to one server connection. Cheap to clone; all clones share the
/// pending table and the writer.
#[derive(Clone)]
pub struct ProtocolClient {
    shared: Arc<Shared>,
}

impl ProtocolClient {
    /// Wrap a read/write pair and spawn the reader task.
    pub fn start<R, W>(server: impl Into<String>, reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared {
            server: server.into(),
            writer: AsyncMutex::new(Some(Box::new(writer))),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            timeout,
        });
        tokio::spawn(read_loop(Arc::clone(&shared), reader));
        Self { shared }
    }

    pub fn server(&self) -> &str {
        &self.shared.server
    }

    /// True once the read side hit end of stream or an I/O error.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Calls currently waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.shared.lock_pending().len()
    }

    /// Send a request and wait for the response carrying the same id.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let shared = &self.shared;
        let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(shared.closed_error());
        }

        let line = serde_json::to_string(&Envelope::request(id, method, &params)).map_err(|e| {
            McpError::Protocol {
                server: shared.server.clone(),
                message: format!("could not encode {method} request: {e}"),
            }
        })?;

        let (tx, rx) = oneshot::channel();
        shared.lock_pending().insert(
            id,
            PendingCall {
                method: method.to_string(),
                issued_at: Instant::now(),
                slot: tx,
            },
        );
        let _guard = PendingGuard { shared, id };

        // The reader may have drained the table just before the insert.
        if self.is_closed() {
            return Err(shared.closed_error());
        }

        // One deadline covers queueing for the writer, the write and the wait.
        let deadline = tokio::time::Instant::now() + shared.timeout;
        debug!(server = %shared.server, id, method, "sending request");
        if let Err(source) = shared.write_line(&line, deadline).await {
            if source.kind() == std::io::ErrorKind::TimedOut {
                warn!(server = %shared.server, id, method, "request timed out while writing");
                return Err(shared.timeout_error(method));
            }
            return Err(McpError::Transport {
                server: shared.server.clone(),
                source,
            });
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(shared.closed_error()),
            Err(_) => {
                warn!(server = %shared.server, id, method, "request timed out");
                Err(shared.timeout_error(method))
            }
        }
    }

    /// Fire-and-forget notification. Write failures are only logged.
    pub async fn notify(&self, method: &str, params: Value) {
        let shared = &self.shared;
        let line = match serde_json::to_string(&Envelope::notification(method, &params)) {
            Ok(line) => line,
            Err(e) => {
                warn!(server = %shared.server, method, "could not encode notification: {e}");
                return;
            }
        };
        let deadline = tokio::time::Instant::now() + shared.timeout;
        if let Err(e) = shared.write_line(&line, deadline).await {
            warn!(server = %shared.server, method, "failed to send notification: {e}");
        }
    }

    /// Close our write half so the server sees end of input.
    pub async fn close_input(&self) {
        let writer = self.shared.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!(server = %self.shared.server, "error closing server input: {e}");
            }
        }
    }
}

/// Removes the pending entry when the waiting call finishes or is dropped.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.lock_pending().remove(&self.id);
    }
}

impl Shared {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u64, PendingCall>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn closed_error(&self) -> McpError {
        McpError::Closed {
            server: self.server.clone(),
        }
    }

    fn timeout_error(&self, method: &str) -> McpError {
        McpError::Timeout {
            server: self.server.clone(),
            method: method.to_string(),
            after: self.timeout,
        }
    }

    /// Write one frame before `deadline`. The lock is held across the whole
    /// line and the flush.
    ///
    /// A write cut off by the deadline may leave half a frame in the pipe,
    /// so the input is dropped and every later write fails fast.
    async fn write_line(&self, line: &str, deadline: tokio::time::Instant) -> std::io::Result<()> {
        let mut guard = tokio::time::timeout_at(deadline, self.writer.lock())
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out waiting to write"))?;
        let writer = guard.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "server input already closed")
        })?;
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');

        let written = tokio::time::timeout_at(deadline, async {
            writer.write_all(&frame).await?;
            writer.flush().await
        })
        .await;
        match written {
            Ok(result) => result,
            Err(_) => {
                warn!(server = %self.server, "tool server stopped reading its input, closing it");
                *guard = None;
                Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "tool server stopped reading its input",
                ))
            }
        }
    }

    async fn handle_line(&self, line: &str) {
        match decode_line(line) {
            Ok(Incoming::Response { id, outcome }) => self.complete(id, outcome),
            Ok(Incoming::ServerRequest { id, method }) => self.answer_server_request(id, &method).await,
            Ok(Incoming::Notification { method }) => {
                debug!(server = %self.server, method = %method, "server notification");
            }
            Err(e) => {
                warn!(server = %self.server, "discarding unreadable line: {e}");
            }
        }
    }

    fn complete(&self, id: u64, outcome: ResponseOutcome) {
        let Some(call) = self.lock_pending().remove(&id) else {
            warn!(server = %self.server, id, "discarding response with unknown id");
            return;
        };

        debug!(
            server = %self.server,
            id,
            method = %call.method,
            elapsed_ms = call.issued_at.elapsed().as_millis() as u64,
            "response matched"
        );

        let result = match outcome {
            ResponseOutcome::Result(value) => Ok(value),
            ResponseOutcome::Error(failure) => Err(McpError::Rpc {
                server: self.server.clone(),
                code: failure.code,
                message: failure.message,
            }),
            ResponseOutcome::Malformed => Err(McpError::Protocol {
                server: self.server.clone(),
                message: format!("response {id} carried neither result nor error"),
            }),
        };
        // The caller may have timed out in the meantime.
        let _ = call.slot.send(result);
    }

    async fn answer_server_request(&self, id: Value, method: &str) {
        let reply = if method == "ping" {
            Reply::result(id, serde_json::json!({}))
        } else {
            debug!(server = %self.server, method, "rejecting unsupported server request");
            Reply::method_not_found(id, method)
        };
        let line = match serde_json::to_string(&reply) {
            Ok(line) => line,
            Err(e) => {
                warn!(server = %self.server, "could not encode reply: {e}");
                return;
            }
        };
        let deadline = tokio::time::Instant::now() + self.timeout;
        if let Err(e) = self.write_line(&line, deadline).await {
            warn!(server = %self.server, method, "failed to answer server request: {e}");
        }
    }

    /// Mark the connection dead and fail everything still waiting.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<PendingCall> = self.lock_pending().drain().map(|(_, call)| call).collect();
        if !drained.is_empty() {
            warn!(server = %self.server, count = drained.len(), "failing calls on closed connection");
        }
        for call in drained {
            let _ = call.slot.send(Err(self.closed_error()));
        }
    }
}

async fn read_loop<R>(shared: Arc<Shared>, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    shared.handle_line(line).await;
                }
            }
            Ok(None) => {
                debug!(server = %shared.server, "tool server closed its output");
                break;
            }
            Err(e) => {
                warn!(server = %shared.server, "failed to read from tool server: {e}");
                break;
            }
        }
    }
    shared.close();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
