//! makcu-test-harness: Mock transport and factory for deterministic
//! driver tests without hardware.
//!
//! - [`MockTransport`] / [`MockHandle`] -- a scripted [`Transport`] with
//!   request→response expectations, unsolicited byte injection, a
//!   liveness toggle, and a write log.
//! - [`MockFactory`] -- a scripted [`TransportFactory`] that records
//!   every `open()` call, for exercising the baud-upgrade handshake and
//!   connection lifecycle.
//!
//! [`Transport`]: makcu_core::Transport
//! [`TransportFactory`]: makcu_core::TransportFactory

pub mod factory;
pub mod mock;

pub use factory::MockFactory;
pub use mock::{MockHandle, MockTransport};
