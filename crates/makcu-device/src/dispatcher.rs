//! The listener task and request/response correlation.
//!
//! The dispatcher owns the transport exclusively: a background task reads
//! the incoming byte stream continuously (so button events are delivered
//! with no polling gaps) and performs every write, serializing outgoing
//! traffic. Callers talk to the task over an `mpsc` channel; completions
//! come back over per-request `oneshot` channels, so no lock is held
//! while a completion is delivered.
//!
//! Correlation is strict FIFO: the device answers requests in the order
//! it received them, so each completed text line resolves the oldest
//! pending request that expects a response. Interleaved button bytes are
//! routed out-of-band and never consume a pending slot. Lines that
//! arrive with nothing pending are dropped.
//!
//! Each pending request carries an absolute deadline; the listener sweeps
//! expired requests every loop iteration, and its read timeout shrinks to
//! the nearest deadline so short request timeouts are honored promptly.
//! On shutdown every outstanding request fails with `Disconnected` and
//! the transport is handed back to the caller -- that is how the
//! baud-upgrade handshake regains exclusive access to the port.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use makcu_core::error::{Error, Result};
use makcu_core::profiler;
use makcu_core::transport::Transport;

use crate::protocol::{FrameEvent, Framer};

/// Sink for demultiplexed button-mask bytes.
///
/// The listener holds this instead of any reference to the device, so it
/// can deliver events without owning device state.
pub(crate) type ButtonSink = Arc<dyn Fn(u8) + Send + Sync>;

/// Read timeout when no request deadline is nearer.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);
/// Pause after a zero-length read or a read error, to avoid spinning.
const READ_ERROR_DELAY: Duration = Duration::from_millis(10);

/// A request sent from client handles to the listener task.
enum ListenerRequest {
    /// Fire-and-forget write; `done` reports only write success.
    Send {
        bytes: Vec<u8>,
        done: oneshot::Sender<Result<()>>,
    },
    /// Tracked command; `reply` completes with the correlated response.
    Request {
        text: String,
        timeout: Duration,
        expects_response: bool,
        reply: oneshot::Sender<Result<String>>,
    },
    /// Liveness probe of the underlying transport.
    Probe { reply: oneshot::Sender<bool> },
    /// Stop the listener and hand the transport back.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// A tracked command the listener is waiting to correlate.
struct PendingCommand {
    id: u64,
    command: String,
    reply: oneshot::Sender<Result<String>>,
    deadline: Instant,
    expects_response: bool,
}

/// Cheap-to-clone client side of the dispatcher.
#[derive(Clone)]
pub(crate) struct DispatcherHandle {
    cmd_tx: mpsc::Sender<ListenerRequest>,
}

impl DispatcherHandle {
    /// Fire-and-forget: write `text` + LF, report write success.
    pub async fn send(&self, text: &str) -> Result<()> {
        let started = std::time::Instant::now();
        let (done_tx, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(ListenerRequest::Send {
                bytes: terminated(text),
                done: done_tx,
            })
            .await
            .map_err(|_| Error::Disconnected)?;
        let result = done_rx.await.map_err(|_| Error::Disconnected)?;
        if profiler::is_enabled() {
            profiler::record(command_key(text), started.elapsed());
        }
        result
    }

    /// Tracked request: write `text` + LF and await the correlated
    /// response, the deadline, or disconnection.
    pub async fn request(
        &self,
        text: &str,
        expects_response: bool,
        timeout: Duration,
    ) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(ListenerRequest::Request {
                text: text.to_string(),
                timeout,
                expects_response,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Disconnected)?;
        reply_rx.await.map_err(|_| Error::Disconnected)?
    }

    /// Ask the listener whether the transport is open and the OS still
    /// backs it with a live device.
    pub async fn probe(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ListenerRequest::Probe { reply: reply_tx })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }
}

/// Owner of the listener task.
pub(crate) struct Dispatcher {
    handle: DispatcherHandle,
    task: JoinHandle<()>,
}

impl Dispatcher {
    /// Move `transport` into a new listener task.
    pub fn spawn(transport: Box<dyn Transport>, buttons: ButtonSink) -> Dispatcher {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let task = tokio::spawn(listener_loop(transport, cmd_rx, buttons));
        Dispatcher {
            handle: DispatcherHandle { cmd_tx },
            task,
        }
    }

    /// A clonable client handle.
    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Stop the listener, failing all outstanding requests with
    /// `Disconnected`, and recover the transport.
    ///
    /// Returns `None` if the listener already exited (transport closed).
    pub async fn shutdown(self) -> Option<Box<dyn Transport>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .handle
            .cmd_tx
            .send(ListenerRequest::Shutdown { reply: reply_tx })
            .await
            .is_err()
        {
            let _ = self.task.await;
            return None;
        }
        let transport = reply_rx.await.ok();
        let _ = self.task.await;
        transport
    }
}

fn terminated(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(b'\n');
    bytes
}

/// Profiler key for a command: the name up to the opening parenthesis.
fn command_key(text: &str) -> &str {
    text.split('(').next().unwrap_or(text)
}

async fn listener_loop(
    mut transport: Box<dyn Transport>,
    mut cmd_rx: mpsc::Receiver<ListenerRequest>,
    buttons: ButtonSink,
) {
    let mut framer = Framer::new();
    let mut pending: VecDeque<PendingCommand> = VecDeque::new();
    let mut next_id: u64 = 0;
    let mut shutdown_reply: Option<oneshot::Sender<Box<dyn Transport>>> = None;

    debug!("listener started");

    loop {
        let read_timeout = next_read_timeout(&pending);

        tokio::select! {
            biased;

            // Priority: outgoing traffic.
            req = cmd_rx.recv() => {
                match req {
                    Some(ListenerRequest::Send { bytes, done }) => {
                        let _ = done.send(transport.send(&bytes).await);
                    }
                    Some(ListenerRequest::Request { text, timeout, expects_response, reply }) => {
                        next_id += 1;
                        match transport.send(&terminated(&text)).await {
                            Ok(()) if expects_response => {
                                trace!(id = next_id, command = %text, "tracked request queued");
                                pending.push_back(PendingCommand {
                                    id: next_id,
                                    command: text,
                                    reply,
                                    deadline: Instant::now() + timeout,
                                    expects_response,
                                });
                            }
                            Ok(()) => {
                                // Nothing to correlate; the write is the acknowledgement.
                                let _ = reply.send(Ok(String::new()));
                            }
                            Err(e) => {
                                let _ = reply.send(Err(e));
                            }
                        }
                    }
                    Some(ListenerRequest::Probe { reply }) => {
                        let _ = reply.send(transport.is_connected() && transport.liveness());
                    }
                    Some(ListenerRequest::Shutdown { reply }) => {
                        shutdown_reply = Some(reply);
                        break;
                    }
                    None => break,
                }
            }

            // Idle: drain the incoming stream.
            events = read_events(&mut *transport, read_timeout, &mut framer) => {
                for event in events {
                    match event {
                        FrameEvent::Button(byte) => buttons(byte),
                        FrameEvent::Line(line) => complete_oldest(&mut pending, line),
                    }
                }
            }
        }

        sweep(&mut pending);
    }

    // Fail everything still outstanding.
    for cmd in pending.drain(..) {
        debug!(id = cmd.id, command = %cmd.command, "failing pending request on shutdown");
        let _ = cmd.reply.send(Err(Error::Disconnected));
    }

    match shutdown_reply {
        Some(reply) => {
            // Hand the transport back for the baud handshake; if the
            // receiver is gone, drop (and thereby close) it.
            let _ = reply.send(transport);
        }
        None => {
            let _ = transport.close().await;
        }
    }

    debug!("listener stopped");
}

/// Read some bytes and demultiplex them. Timeouts yield no events; other
/// errors pause briefly so a dead port does not spin the loop.
async fn read_events(
    transport: &mut dyn Transport,
    timeout: Duration,
    framer: &mut Framer,
) -> Vec<FrameEvent> {
    let mut buf = [0u8; 256];
    match transport.receive(&mut buf, timeout).await {
        Ok(n) if n > 0 => framer.push(&buf[..n]),
        Ok(_) => {
            tokio::time::sleep(READ_ERROR_DELAY).await;
            Vec::new()
        }
        Err(Error::TimedOut) => Vec::new(),
        Err(e) => {
            trace!(error = %e, "listener read error");
            tokio::time::sleep(READ_ERROR_DELAY).await;
            Vec::new()
        }
    }
}

/// Deliver a completed line to the oldest pending request expecting a
/// response. Unsolicited lines are dropped.
fn complete_oldest(pending: &mut VecDeque<PendingCommand>, line: String) {
    match pending.iter().position(|cmd| cmd.expects_response) {
        Some(idx) => {
            let cmd = pending.remove(idx).expect("position came from this queue");
            trace!(id = cmd.id, command = %cmd.command, "correlated response");
            let _ = cmd.reply.send(Ok(line.trim().to_string()));
        }
        None => {
            debug!(line = %line, "dropping unsolicited line");
        }
    }
}

/// Fail and remove every pending request whose deadline has passed.
fn sweep(pending: &mut VecDeque<PendingCommand>) {
    let now = Instant::now();
    let mut i = 0;
    while i < pending.len() {
        if pending[i].deadline <= now {
            let cmd = pending.remove(i).expect("index in bounds");
            warn!(id = cmd.id, command = %cmd.command, "request timed out");
            let _ = cmd.reply.send(Err(Error::TimedOut));
        } else {
            i += 1;
        }
    }
}

/// Shrink the read timeout to the nearest pending deadline so expiry is
/// detected promptly.
fn next_read_timeout(pending: &VecDeque<PendingCommand>) -> Duration {
    let now = Instant::now();
    pending
        .iter()
        .map(|cmd| cmd.deadline.saturating_duration_since(now))
        .min()
        .map(|d| d.clamp(Duration::from_millis(1), DEFAULT_READ_TIMEOUT))
        .unwrap_or(DEFAULT_READ_TIMEOUT)
}
