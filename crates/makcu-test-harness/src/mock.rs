//! Mock transport for deterministic testing of the driver without
//! hardware.
//!
//! [`MockTransport`] implements the [`Transport`] trait; the paired
//! [`MockHandle`] stays with the test and can inject unsolicited bytes
//! (button events, late responses), pre-load request→response
//! expectations, toggle the simulated device's liveness, and inspect
//! everything the driver wrote.
//!
//! Unlike a lock-step request/response mock, writes with no matching
//! expectation are simply recorded -- most of this protocol is
//! fire-and-forget traffic that the device never answers.
//!
//! # Example
//!
//! ```
//! use makcu_test_harness::MockTransport;
//!
//! let (transport, handle) = MockTransport::new("MOCK0");
//! // When the driver writes km.version()\n, answer with the version line.
//! handle.expect(b"km.version()\n", b"km.MAKCU v3.2\n");
//! // Simulate a physical button press at any time.
//! handle.push_bytes(&[0x02]);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use makcu_core::error::{Error, Result};
use makcu_core::transport::Transport;

/// A pre-loaded request/response pair.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be written.
    request: Vec<u8>,
    /// The bytes to feed back when the matching request is written.
    response: Vec<u8>,
}

struct Shared {
    port_name: String,
    /// Bytes queued for the driver to read (device → host direction).
    incoming: Mutex<VecDeque<u8>>,
    /// Everything the driver wrote, one entry per `send()` call.
    written: Mutex<Vec<Vec<u8>>>,
    /// Scripted request→response pairs, matched in insertion order.
    expectations: Mutex<VecDeque<Expectation>>,
    /// Whether the handle is open (cleared by `close()`).
    connected: AtomicBool,
    /// Whether the simulated device is still attached.
    alive: AtomicBool,
    /// When set, sends fail once this many writes have been recorded.
    fail_sends_at: Mutex<Option<usize>>,
    /// Wakes a blocked `receive()` when bytes arrive or state changes.
    notify: Notify,
}

/// A mock [`Transport`] driven by its paired [`MockHandle`].
pub struct MockTransport {
    shared: Arc<Shared>,
}

/// Test-side controller for a [`MockTransport`].
///
/// Clonable; remains valid after the transport has been moved into the
/// driver.
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a connected mock transport and its controller.
    pub fn new(port_name: &str) -> (MockTransport, MockHandle) {
        let shared = Arc::new(Shared {
            port_name: port_name.to_string(),
            incoming: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            expectations: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(true),
            alive: AtomicBool::new(true),
            fail_sends_at: Mutex::new(None),
            notify: Notify::new(),
        });
        (
            MockTransport {
                shared: shared.clone(),
            },
            MockHandle { shared },
        )
    }
}

impl MockHandle {
    /// Pre-load a request→response pair.
    ///
    /// When the driver writes bytes equal to `request`, `response` is
    /// queued on the read side. Pairs are consumed independently of
    /// unmatched writes, which are only recorded.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.shared.expectations.lock().unwrap().push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Queue bytes for the driver to read, independent of any write
    /// (button events, unsolicited lines).
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.shared.incoming.lock().unwrap().extend(bytes.iter().copied());
        self.shared.notify.notify_one();
    }

    /// Simulate the physical device being attached or removed.
    ///
    /// When `false`, `liveness()` reports `false` and reads fail with an
    /// I/O error, the way an unplugged USB adapter behaves.
    pub fn set_alive(&self, alive: bool) {
        self.shared.alive.store(alive, Ordering::Release);
        self.shared.notify.notify_one();
    }

    /// Everything the driver wrote, one entry per `send()` call.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.shared.written.lock().unwrap().clone()
    }

    /// Discard the write log.
    pub fn clear_sent(&self) {
        self.shared.written.lock().unwrap().clear();
    }

    /// Number of pre-loaded expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.shared.expectations.lock().unwrap().len()
    }

    /// Make `send()` fail once `total` writes have been recorded.
    ///
    /// `total` is an absolute count over the transport's lifetime, so to
    /// allow exactly one more write pass `handle.sent().len() + 1`.
    pub fn fail_sends_after(&self, total: usize) {
        *self.shared.fail_sends_at.lock().unwrap() = Some(total);
    }

    /// Whether `close()` has been called on the transport.
    pub fn is_open(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(Error::Disconnected);
        }
        if let Some(limit) = *self.shared.fail_sends_at.lock().unwrap() {
            if self.shared.written.lock().unwrap().len() >= limit {
                return Err(Error::PortIoFailed(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "injected write failure",
                )));
            }
        }

        self.shared.written.lock().unwrap().push(data.to_vec());

        // Answer the first scripted expectation this write matches.
        let response = {
            let mut expectations = self.shared.expectations.lock().unwrap();
            expectations
                .iter()
                .position(|e| e.request == data)
                .and_then(|idx| expectations.remove(idx))
                .map(|e| e.response)
        };
        if let Some(response) = response {
            self.shared.incoming.lock().unwrap().extend(response);
            self.shared.notify.notify_one();
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.shared.connected.load(Ordering::Acquire) {
                return Err(Error::Disconnected);
            }
            if !self.shared.alive.load(Ordering::Acquire) {
                return Err(Error::PortIoFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "device removed",
                )));
            }
            {
                let mut incoming = self.shared.incoming.lock().unwrap();
                if !incoming.is_empty() {
                    let n = buf.len().min(incoming.len());
                    for slot in buf.iter_mut().take(n) {
                        *slot = incoming.pop_front().expect("queue non-empty");
                    }
                    return Ok(n);
                }
            }
            let notified = self.shared.notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Err(Error::TimedOut),
            }
        }
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.connected.store(false, Ordering::Release);
        self.shared.notify.notify_one();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn liveness(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
            && self.shared.alive.load(Ordering::Acquire)
    }

    fn port_name(&self) -> &str {
        &self.shared.port_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expectation_answers_matching_write() {
        let (mut transport, handle) = MockTransport::new("MOCK0");
        handle.expect(b"km.version()\n", b"km.MAKCU v3.2\n");

        transport.send(b"km.version()\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = transport
            .receive(&mut buf, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"km.MAKCU v3.2\n");
        assert_eq!(handle.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn unmatched_writes_are_recorded_not_rejected() {
        let (mut transport, handle) = MockTransport::new("MOCK0");

        transport.send(b"km.left(1)\n").await.unwrap();
        transport.send(b"km.left(0)\n").await.unwrap();

        assert_eq!(
            handle.sent(),
            vec![b"km.left(1)\n".to_vec(), b"km.left(0)\n".to_vec()]
        );
    }

    #[tokio::test]
    async fn receive_without_data_times_out() {
        let (mut transport, _handle) = MockTransport::new("MOCK0");
        let mut buf = [0u8; 8];
        let result = transport.receive(&mut buf, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(Error::TimedOut)));
    }

    #[tokio::test]
    async fn pushed_bytes_wake_a_blocked_receive() {
        let (mut transport, handle) = MockTransport::new("MOCK0");

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            let n = transport
                .receive(&mut buf, Duration::from_millis(500))
                .await
                .unwrap();
            buf[..n].to_vec()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.push_bytes(&[0x02]);

        assert_eq!(reader.await.unwrap(), vec![0x02]);
    }

    #[tokio::test]
    async fn dead_device_fails_reads_and_liveness() {
        let (mut transport, handle) = MockTransport::new("MOCK0");
        handle.set_alive(false);

        assert!(!transport.liveness());
        assert!(transport.is_connected());

        let mut buf = [0u8; 8];
        let result = transport.receive(&mut buf, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(Error::PortIoFailed(_))));
    }

    #[tokio::test]
    async fn close_disconnects() {
        let (mut transport, handle) = MockTransport::new("MOCK0");
        transport.close().await.unwrap();

        assert!(!transport.is_connected());
        assert!(!handle.is_open());
        assert!(matches!(
            transport.send(b"x").await,
            Err(Error::Disconnected)
        ));
    }

    #[tokio::test]
    async fn injected_send_failures_respect_the_threshold() {
        let (mut transport, handle) = MockTransport::new("MOCK0");
        transport.send(b"a").await.unwrap();
        handle.fail_sends_after(handle.sent().len() + 1);

        transport.send(b"b").await.unwrap();
        assert!(matches!(
            transport.send(b"c").await,
            Err(Error::PortIoFailed(_))
        ));
        assert_eq!(handle.sent().len(), 2);
    }
}
