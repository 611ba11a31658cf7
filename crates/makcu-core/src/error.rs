//! Error types for the makcu library.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! lifecycle errors are all captured here.
//!
//! The fire-and-forget portion of the public [`Device`] surface folds
//! failures into `bool`; tracked requests surface their failure kind
//! through this enum.
//!
//! [`Device`]: https://docs.rs/makcu-device

/// The error type for all makcu operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No connection to the device, or the connection was torn down while
    /// the operation was in flight.
    #[error("device not connected")]
    Disconnected,

    /// The serial port could not be opened (missing, busy, config rejected,
    /// or insufficient permissions).
    #[error("failed to open port: {0}")]
    PortOpenFailed(String),

    /// An underlying serial I/O error. Transport-fatal: the health monitor
    /// will transition the device to disconnected.
    #[error("port I/O failed: {0}")]
    PortIoFailed(#[from] std::io::Error),

    /// An argument was outside the range the device accepts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Timed out waiting for a response from the device.
    #[error("timed out waiting for response")]
    TimedOut,

    /// The device sent something the protocol layer could not interpret.
    #[error("unexpected protocol data: {0}")]
    ProtocolUnexpected(String),

    /// The baud-rate upgrade handshake failed.
    #[error("baud handshake failed: {0}")]
    HandshakeFailed(String),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_disconnected() {
        assert_eq!(Error::Disconnected.to_string(), "device not connected");
    }

    #[test]
    fn error_display_port_open() {
        let e = Error::PortOpenFailed("permission denied".into());
        assert_eq!(e.to_string(), "failed to open port: permission denied");
    }

    #[test]
    fn error_display_invalid_argument() {
        let e = Error::InvalidArgument("x out of i16 range".into());
        assert_eq!(e.to_string(), "invalid argument: x out of i16 range");
    }

    #[test]
    fn error_display_timed_out() {
        assert_eq!(Error::TimedOut.to_string(), "timed out waiting for response");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::PortIoFailed(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
