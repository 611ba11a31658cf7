//! makcu-transport: Serial transport and port enumeration for the makcu
//! device library.
//!
//! Provides [`SerialTransport`] (the production [`Transport`] over
//! tokio-serial), [`SerialFactory`] (the production
//! [`TransportFactory`]), and the [`ports`] module for enumerating and
//! filtering candidate device ports.
//!
//! [`Transport`]: makcu_core::Transport
//! [`TransportFactory`]: makcu_core::TransportFactory

pub mod ports;
pub mod serial;

pub use ports::{find_device_ports, find_first_device, PRODUCT_ID, VENDOR_ID};
pub use serial::{SerialFactory, SerialTransport};
