//! DeviceBuilder -- fluent construction for [`Device`] instances.
//!
//! Separates configuration from connection so callers can substitute a
//! scripted transport factory (the test harness does) or preset modes
//! before touching hardware.
//!
//! # Example
//!
//! ```no_run
//! use makcu_device::DeviceBuilder;
//!
//! # async fn example() {
//! let device = DeviceBuilder::new().high_performance(true).build();
//! if device.connect("").await {
//!     device.mouse_move(10, 10).await;
//! }
//! # }
//! ```

use makcu_core::transport::TransportFactory;
use makcu_transport::SerialFactory;

use crate::device::Device;

/// Fluent builder for [`Device`].
pub struct DeviceBuilder {
    factory: Box<dyn TransportFactory>,
    high_performance: bool,
}

impl DeviceBuilder {
    pub fn new() -> Self {
        DeviceBuilder {
            factory: Box::new(SerialFactory),
            high_performance: false,
        }
    }

    /// Substitute the transport factory (tests pass a mock here).
    pub fn transport_factory(mut self, factory: impl TransportFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    /// Start with high-performance mode enabled.
    pub fn high_performance(mut self, enabled: bool) -> Self {
        self.high_performance = enabled;
        self
    }

    /// Build an unconnected [`Device`].
    pub fn build(self) -> Device {
        Device::from_parts(self.factory, self.high_performance)
    }
}

impl Default for DeviceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use makcu_core::types::ConnectionStatus;

    #[test]
    fn builder_defaults() {
        let device = DeviceBuilder::new().build();
        assert!(!device.is_connected());
        assert_eq!(device.status(), ConnectionStatus::Disconnected);
        assert!(!device.is_high_performance_mode_enabled());
    }

    #[test]
    fn builder_presets_high_performance() {
        let device = DeviceBuilder::new().high_performance(true).build();
        assert!(device.is_high_performance_mode_enabled());
    }
}
