//! Serial port transport for device communication.
//!
//! This module provides [`SerialTransport`], which implements the
//! [`Transport`] trait for the device's USB virtual COM port. The device
//! always uses 8 data bits, 1 stop bit, no parity, and no flow control;
//! only the baud rate varies (115200 on attach, 4 Mbaud after the upgrade
//! handshake), so unlike a general-purpose serial wrapper there is no
//! framing configuration to expose.
//!
//! # Example
//!
//! ```no_run
//! use makcu_transport::SerialTransport;
//! use makcu_core::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> makcu_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 115_200).await?;
//! transport.send(b"km.version()\n").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_millis(100)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

use makcu_core::error::{Error, Result};
use makcu_core::transport::{Transport, TransportFactory};
use makcu_core::types::DeviceInfo;

use crate::ports;

/// Serial transport to the device over a USB virtual COM port.
pub struct SerialTransport {
    /// The underlying serial stream, `None` after close.
    port: Option<SerialStream>,
    /// Port name for logging and for the reopen side of the baud handshake.
    port_name: String,
    /// Baud rate the port was opened (or retuned) at.
    baud_rate: u32,
}

impl SerialTransport {
    /// Open a serial port at the given baud rate with 8N1 framing and no
    /// flow control.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g., "/dev/ttyUSB0" on Linux, "COM3" on Windows)
    /// * `baud_rate` - Baud rate (115200 or the post-upgrade operational rate)
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        tracing::debug!(port = %port, baud_rate, "Opening serial port");

        let serial_stream = tokio_serial::new(port, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial port");
                Error::PortOpenFailed(format!("{port}: {e}"))
            })?;

        tracing::info!(port = %port, baud_rate, "Serial port opened");

        Ok(Self {
            port: Some(serial_stream),
            port_name: port.to_string(),
            baud_rate,
        })
    }

    /// The baud rate the port is currently configured for.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Retune the open port to a new baud rate in place.
    ///
    /// Some platform drivers reject in-place retuning; callers that need a
    /// guaranteed rate change should close and [`open`](Self::open) again,
    /// which is what the device's baud-upgrade handshake does.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::Disconnected)?;
        port.set_baud_rate(baud_rate).map_err(|e| {
            tracing::warn!(port = %self.port_name, baud_rate, error = %e, "In-place baud change rejected");
            Error::PortOpenFailed(format!("cannot retune {}: {e}", self.port_name))
        })?;
        self.baud_rate = baud_rate;
        Ok(())
    }

    /// Number of bytes waiting in the OS receive buffer.
    pub fn bytes_available(&self) -> Result<u32> {
        let port = self.port.as_ref().ok_or(Error::Disconnected)?;
        port.bytes_to_read()
            .map_err(|e| Error::ProtocolUnexpected(format!("bytes_to_read: {e}")))
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::Disconnected)?;

        tracing::trace!(port = %self.port_name, bytes = data.len(), data = ?data, "Sending data");

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to send data");
            if e.kind() == std::io::ErrorKind::BrokenPipe
                || e.kind() == std::io::ErrorKind::NotConnected
            {
                Error::Disconnected
            } else {
                Error::PortIoFailed(e)
            }
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::Disconnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, bytes = n, data = ?&buf[..n], "Received data");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "Failed to receive data");
                if e.kind() == std::io::ErrorKind::BrokenPipe
                    || e.kind() == std::io::ErrorKind::NotConnected
                {
                    Err(Error::Disconnected)
                } else {
                    Err(Error::PortIoFailed(e))
                }
            }
            Err(_) => Err(Error::TimedOut),
        }
    }

    async fn flush(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::Disconnected)?;
        port.flush().await.map_err(Error::PortIoFailed)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            tracing::debug!(port = %self.port_name, "Closing serial port");
            if let Err(e) = port.flush().await {
                tracing::warn!(port = %self.port_name, error = %e, "Flush before close failed");
            }
            // Dropping the stream closes the OS handle.
            tracing::info!(port = %self.port_name, "Serial port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn liveness(&self) -> bool {
        // An unplugged USB adapter leaves the handle "open" on most
        // platforms; asking the OS for the receive-queue depth fails once
        // the device is actually gone.
        match self.port.as_ref() {
            Some(port) => port.bytes_to_read().is_ok(),
            None => false,
        }
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            tracing::debug!(port = %self.port_name, "SerialTransport dropped, closing port");
        }
    }
}

/// Production [`TransportFactory`] backed by the OS serial stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialFactory;

#[async_trait]
impl TransportFactory for SerialFactory {
    async fn open(&self, port: &str, baud: u32) -> Result<Box<dyn Transport>> {
        Ok(Box::new(SerialTransport::open(port, baud).await?))
    }

    fn discover(&self) -> Result<Vec<DeviceInfo>> {
        ports::find_device_ports()
    }
}
