//! Scripted [`TransportFactory`] for exercising the connection lifecycle.
//!
//! The driver's baud-upgrade handshake closes the port and reopens it at
//! a different rate, so lifecycle tests need control over *opening*
//! ports, not just over one transport. [`MockFactory`] records every
//! `open()` call and delegates transport construction to a test-supplied
//! closure, which typically hands out [`MockTransport`]s whose handles
//! the test keeps.
//!
//! [`MockTransport`]: crate::MockTransport

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use makcu_core::error::{Error, Result};
use makcu_core::transport::{Transport, TransportFactory};
use makcu_core::types::DeviceInfo;

type OpenFn = dyn Fn(&str, u32) -> Result<Box<dyn Transport>> + Send + Sync;

struct Shared {
    candidates: Mutex<Vec<DeviceInfo>>,
    opens: Mutex<Vec<(String, u32)>>,
    open_fn: Mutex<Option<Box<OpenFn>>>,
}

/// A [`TransportFactory`] whose discovery results and opened transports
/// are scripted by the test.
#[derive(Clone)]
pub struct MockFactory {
    shared: Arc<Shared>,
}

impl MockFactory {
    pub fn new() -> Self {
        MockFactory {
            shared: Arc::new(Shared {
                candidates: Mutex::new(Vec::new()),
                opens: Mutex::new(Vec::new()),
                open_fn: Mutex::new(None),
            }),
        }
    }

    /// Add a discoverable candidate port with the device's USB identity.
    pub fn with_candidate(self, port: &str) -> Self {
        self.shared.candidates.lock().unwrap().push(DeviceInfo {
            port: port.to_string(),
            description: "USB-Enhanced-SERIAL CH343".to_string(),
            vid: 0x1A86,
            pid: 0x55D3,
            connected: false,
        });
        self
    }

    /// Install the closure that services `open()` calls.
    pub fn on_open(
        &self,
        f: impl Fn(&str, u32) -> Result<Box<dyn Transport>> + Send + Sync + 'static,
    ) {
        *self.shared.open_fn.lock().unwrap() = Some(Box::new(f));
    }

    /// Every `(port, baud)` pair `open()` was called with, in order.
    pub fn opens(&self) -> Vec<(String, u32)> {
        self.shared.opens.lock().unwrap().clone()
    }
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn open(&self, port: &str, baud: u32) -> Result<Box<dyn Transport>> {
        self.shared
            .opens
            .lock()
            .unwrap()
            .push((port.to_string(), baud));
        let open_fn = self.shared.open_fn.lock().unwrap();
        match open_fn.as_ref() {
            Some(f) => f(port, baud),
            None => Err(Error::PortOpenFailed(format!(
                "mock factory has no open handler for {port}"
            ))),
        }
    }

    fn discover(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.shared.candidates.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockTransport;

    #[tokio::test]
    async fn records_opens_and_delegates() {
        let factory = MockFactory::new().with_candidate("MOCK0");
        factory.on_open(|port, _baud| {
            let (transport, _handle) = MockTransport::new(port);
            Ok(Box::new(transport))
        });

        let transport = factory.open("MOCK0", 115_200).await.unwrap();
        assert_eq!(transport.port_name(), "MOCK0");
        assert_eq!(factory.opens(), vec![("MOCK0".to_string(), 115_200)]);

        let candidates = factory.discover().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].vid, 0x1A86);
    }

    #[tokio::test]
    async fn open_without_handler_fails() {
        let factory = MockFactory::new();
        assert!(matches!(
            factory.open("MOCK0", 115_200).await,
            Err(Error::PortOpenFailed(_))
        ));
    }
}
