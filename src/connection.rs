use crate::discovery::DeviceAddress;
use crate::error::{Result, YeelightError};
use crate::protocol::{Message, Notification, Request, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::time::timeout;

const DIAL_TIMEOUT: Duration = Duration::from_secs(3);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared connection state
#[derive(Debug)]
struct ConnectionState {
    /// Pending calls waiting for their result, keyed by request id
    pending: HashMap<u64, oneshot::Sender<Response>>,
    /// Channel feeding the writer task; `None` once the connection is torn
    /// down, so late callers fail fast instead of parking until timeout
    line_tx: Option<mpsc::UnboundedSender<String>>,
}

/// One TCP connection to a bulb's command endpoint
///
/// Owns the socket, the monotonically increasing request-id counter, and the
/// two background tasks: a writer serializing outgoing lines and a reader
/// that resolves pending calls and forwards push notifications. The
/// notification channel holds a single slot; an update arriving while the
/// slot is occupied is dropped so the reader never stalls behind a slow
/// consumer.
#[derive(Debug)]
pub struct Connection {
    state: Arc<Mutex<ConnectionState>>,
    next_id: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
    closed_rx: watch::Receiver<bool>,
    /// Taken once by the notification consumer
    notify_rx: std::sync::Mutex<Option<mpsc::Receiver<Notification>>>,
}

/// Handle for cancelling a connection's read loop
///
/// Cancelling is idempotent; the second and later calls are no-ops.
#[derive(Clone)]
pub struct CancelHandle {
    shutdown_tx: broadcast::Sender<()>,
    closed_rx: watch::Receiver<bool>,
}

impl CancelHandle {
    /// Request teardown of the connection
    pub fn cancel(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Request teardown and wait until the socket is closed and every
    /// pending call has been resolved
    pub async fn cancel_and_wait(&mut self) {
        self.cancel();
        let _ = self.closed_rx.wait_for(|closed| *closed).await;
    }
}

impl Connection {
    /// Dial the bulb's command endpoint
    ///
    /// The dial itself runs under a bounded timeout; failure is fatal to
    /// this call and is not retried.
    pub async fn connect(addr: &DeviceAddress) -> Result<Self> {
        let addr_str = addr.to_string();
        tracing::info!("Connecting to {}", addr_str);

        let stream = match timeout(DIAL_TIMEOUT, TcpStream::connect(&addr_str)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(YeelightError::Dial {
                    addr: addr_str,
                    source: e,
                })
            }
            Err(_) => {
                return Err(YeelightError::Dial {
                    addr: addr_str,
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };

        let (read_half, write_half) = stream.into_split();
        let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();
        let (notify_tx, notify_rx) = mpsc::channel(1);
        let (shutdown_tx, _) = broadcast::channel(1);
        let (closed_tx, closed_rx) = watch::channel(false);

        let state = Arc::new(Mutex::new(ConnectionState {
            pending: HashMap::new(),
            line_tx: Some(line_tx),
        }));

        tokio::spawn(write_loop(write_half, line_rx, shutdown_tx.clone()));
        tokio::spawn(read_loop(
            read_half,
            state.clone(),
            notify_tx,
            shutdown_tx.subscribe(),
            closed_tx,
        ));

        Ok(Self {
            state,
            next_id: AtomicU64::new(1),
            shutdown_tx,
            closed_rx,
            notify_rx: std::sync::Mutex::new(Some(notify_rx)),
        })
    }

    /// Send a command and wait for its correlated result
    ///
    /// Allocates the next request id, registers a pending call, writes the
    /// encoded line and suspends until the reader resolves the call or
    /// `RESPONSE_TIMEOUT` elapses. A result arriving after the timeout is
    /// orphaned and dropped by the reader; the id is never reused.
    pub async fn send_request(&self, method: &str, params: Vec<Value>) -> Result<Response> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(id, method, params);
        let line = request.encode()?;
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state.lock().await;
            let Some(line_tx) = state.line_tx.as_ref() else {
                return Err(YeelightError::ConnectionClosed);
            };
            tracing::debug!("Sending: {}", line.trim_end());
            if line_tx.send(line).is_err() {
                return Err(YeelightError::ConnectionClosed);
            }
            state.pending.insert(id, tx);
        }

        let response = match timeout(RESPONSE_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            // Sender dropped: the connection tore down under us
            Ok(Err(_)) => return Err(YeelightError::ConnectionClosed),
            Err(_) => {
                let mut state = self.state.lock().await;
                state.pending.remove(&id);
                return Err(YeelightError::Timeout);
            }
        };

        if let Some(err) = response.error {
            // Command rejected; the connection itself stays usable
            return Err(YeelightError::Device {
                code: err.code,
                message: err.message,
            });
        }

        Ok(response)
    }

    /// Take the notification receiver
    ///
    /// The single-slot channel has exactly one consumer; this returns `None`
    /// on every call after the first.
    pub fn take_notifications(&self) -> Option<mpsc::Receiver<Notification>> {
        self.notify_rx.lock().unwrap().take()
    }

    /// Handle for cancelling this connection
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shutdown_tx: self.shutdown_tx.clone(),
            closed_rx: self.closed_rx.clone(),
        }
    }

    /// Tear the connection down and wait for the read loop to finish
    pub async fn close(&self) {
        self.cancel_handle().cancel_and_wait().await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The writer task holds its own shutdown sender, so the reader would
        // otherwise block on the socket until the bulb closes it.
        let _ = self.shutdown_tx.send(());
    }
}

/// Forwards queued lines to the socket; a write failure is fatal to the
/// whole connection, so it triggers shutdown for the reader as well
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut line_rx: mpsc::UnboundedReceiver<String>,
    shutdown_tx: broadcast::Sender<()>,
) {
    while let Some(line) = line_rx.recv().await {
        if let Err(e) = write_half.write_all(line.as_bytes()).await {
            tracing::error!("Write failed: {}", e);
            let _ = shutdown_tx.send(());
            break;
        }
    }
}

/// The sole reader of the socket
///
/// Classifies each incoming line as a result (resolve the pending call) or
/// a notification (non-blocking delivery into the single slot). On any exit
/// path it drains the pending map so no caller blocks past teardown.
async fn read_loop(
    read_half: OwnedReadHalf,
    state: Arc<Mutex<ConnectionState>>,
    notify_tx: mpsc::Sender<Notification>,
    mut shutdown_rx: broadcast::Receiver<()>,
    closed_tx: watch::Sender<bool>,
) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Connection cancelled");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => dispatch_line(&state, &notify_tx, &line).await,
                Ok(None) => {
                    tracing::info!("Connection closed by device");
                    break;
                }
                Err(e) => {
                    tracing::error!("Read error: {}", e);
                    break;
                }
            },
        }
    }

    let mut state = state.lock().await;
    // No new calls past this point; dropping the writer channel ends the
    // writer task, dropping each pending sender wakes its waiter with
    // ConnectionClosed.
    state.line_tx = None;
    state.pending.clear();
    drop(state);

    let _ = closed_tx.send(true);
}

async fn dispatch_line(
    state: &Arc<Mutex<ConnectionState>>,
    notify_tx: &mpsc::Sender<Notification>,
    line: &str,
) {
    if line.trim().is_empty() {
        return;
    }
    tracing::debug!("Received: {}", line);

    match Message::decode(line) {
        Ok(Message::Response(response)) => {
            let mut state = state.lock().await;
            match state.pending.remove(&response.id) {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                // Already timed out or never ours
                None => tracing::debug!("Dropping orphaned result for id {}", response.id),
            }
        }
        Ok(Message::Notification(notification)) => {
            match notify_tx.try_send(notification) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Single-slot mailbox: drop rather than stall the reader
                    tracing::debug!("Notification slot occupied, dropping update");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        Err(e) => tracing::warn!("Skipping malformed line: {}", e),
    }
}
