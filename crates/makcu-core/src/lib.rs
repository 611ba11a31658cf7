//! makcu-core: Core traits, types, and error definitions for the makcu
//! device library.
//!
//! This crate defines the transport-agnostic abstractions the driver is
//! built on. Applications normally depend on the `makcu` facade crate
//! rather than on this crate directly.
//!
//! # Key types
//!
//! - [`Transport`] / [`TransportFactory`] -- byte-level link to the device
//!   and the seam that lets tests substitute a scripted mock
//! - [`MouseButton`], [`LockTarget`], [`ConnectionStatus`], [`DeviceInfo`]
//!   -- the data model shared across the workspace
//! - [`Error`] / [`Result`] -- error handling
//! - [`profiler`] -- opt-in, process-wide command timing registry

pub mod error;
pub mod profiler;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use makcu_core::*`.
pub use error::{Error, Result};
pub use transport::{Transport, TransportFactory};
pub use types::{ConnectionStatus, DeviceInfo, LockTarget, MouseButton};
