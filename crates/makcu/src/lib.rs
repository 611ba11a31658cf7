//! # makcu -- Host-side Control for the MAKCU Mouse Device
//!
//! `makcu` is an asynchronous Rust library for driving a MAKCU
//! USB-attached microcontroller that emulates HID mouse input. It covers
//! the full command surface -- movement, clicks, drags, scrolling, input
//! locks, serial spoofing, and physical button monitoring -- with the
//! latency characteristics gaming automation needs: prerendered command
//! strings, fire-and-forget writes, and a 4 Mbaud serial link.
//!
//! ## Quick Start
//!
//! Add `makcu` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! makcu = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect to the first attached device and click:
//!
//! ```no_run
//! use makcu::{Device, MouseButton};
//!
//! #[tokio::main]
//! async fn main() {
//!     let device = Device::new();
//!     if !device.connect("").await {
//!         eprintln!("no device found");
//!         return;
//!     }
//!
//!     device.mouse_move(50, 20).await;
//!     device.click(MouseButton::Left).await;
//!     device.disconnect().await;
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                | Purpose                                      |
//! |----------------------|----------------------------------------------|
//! | `makcu-core`         | Types, errors, transport traits, profiler    |
//! | `makcu-transport`    | Serial transport and port enumeration        |
//! | `makcu-device`       | The driver: commands, framing, dispatcher, lifecycle |
//! | `makcu-test-harness` | Mock transport/factory for tests             |
//! | **`makcu`**          | This facade crate -- re-exports everything   |
//!
//! ## Button monitoring
//!
//! The device pushes a raw mask byte on every physical button change.
//! Install a callback to observe transitions, or poll the atomic mask:
//!
//! ```no_run
//! # async fn example(device: &makcu::Device) {
//! device.set_mouse_button_callback(|button, pressed| {
//!     println!("{button}: {}", if pressed { "down" } else { "up" });
//! });
//! let mask = device.button_mask();
//! # let _ = mask;
//! # }
//! ```
//!
//! ## Connection health
//!
//! A background monitor polls the OS for port liveness and tears the
//! connection down when the device disappears; the connection callback
//! fires exactly once per transition whether the user or the monitor
//! notices first.

pub use makcu_core::{
    profiler, ConnectionStatus, DeviceInfo, Error, LockTarget, MouseButton, Result,
};
pub use makcu_device::{
    BatchBuilder, Device, DeviceBuilder, INITIAL_BAUD_RATE, OPERATIONAL_BAUD_RATE,
};
pub use makcu_transport::{find_device_ports, find_first_device, SerialTransport};
