//! Transport traits for device communication.
//!
//! [`Transport`] abstracts over the physical serial link to the device.
//! The production implementation lives in `makcu-transport`; a mock for
//! deterministic testing lives in `makcu-test-harness`.
//!
//! [`TransportFactory`] abstracts over *opening* ports. The device's
//! baud-upgrade handshake closes the port and reopens it at a different
//! rate, so the driver needs "open port X at baud Y" as an injectable
//! operation rather than a one-time constructor argument.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::DeviceInfo;

/// Asynchronous byte-level transport to the device.
///
/// Implementations handle buffering and error mapping at the physical
/// layer. Protocol concerns (command framing, response correlation,
/// button-event classification) live in `makcu-device`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the device.
    ///
    /// Implementations block until all bytes have been handed to the OS
    /// transmit path.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Waits up to `timeout`
    /// for data to arrive; returns [`Error::TimedOut`](crate::Error::TimedOut)
    /// if nothing arrives within the deadline. A timeout is not fatal.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Drain OS-side output buffers.
    async fn flush(&mut self) -> Result<()>;

    /// Close the transport.
    ///
    /// Subsequent `send()` and `receive()` calls return
    /// [`Error::Disconnected`](crate::Error::Disconnected).
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport handle is open.
    fn is_connected(&self) -> bool;

    /// Whether the underlying OS handle is still backed by a live device.
    ///
    /// Distinct from [`is_connected`](Transport::is_connected): on most
    /// platforms, unplugging a USB serial adapter does not invalidate the
    /// open handle, so this queries the OS and may return `false` while
    /// `is_connected()` is still `true`. The health monitor polls this.
    fn liveness(&self) -> bool;

    /// The OS port name this transport was opened on.
    fn port_name(&self) -> &str;
}

/// Opens transports by port name and baud rate, and discovers candidate
/// device ports.
///
/// The production implementation (`SerialFactory` in `makcu-transport`)
/// wraps the OS serial enumeration; tests substitute a scripted factory.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open the named port at the given baud rate (8N1, no flow control).
    async fn open(&self, port: &str, baud: u32) -> Result<Box<dyn Transport>>;

    /// List candidate device ports, best match first.
    fn discover(&self) -> Result<Vec<DeviceInfo>>;
}
