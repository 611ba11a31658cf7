//! makcu-device: Driver for the makcu USB mouse-emulation controller.
//!
//! This crate ties the command layer to a [`Transport`] to produce a
//! working device driver. It handles the text command grammar, the mixed
//! button-event/text-response byte stream, FIFO request/response
//! correlation, the binary baud-upgrade handshake, and connection health
//! monitoring.
//!
//! | Module       | Responsibility                                        |
//! |--------------|--------------------------------------------------------|
//! | [`commands`]  | Command string builders, validation, [`CommandCache`] |
//! | [`protocol`]  | Stream framing (button bytes vs text lines), baud frame |
//! | `dispatcher`  | Listener task, write serialization, FIFO correlation  |
//! | [`device`]    | Public [`Device`] surface and connection lifecycle    |
//! | [`batch`]     | [`BatchBuilder`] for back-to-back command submission  |
//! | [`builder`]   | [`DeviceBuilder`] construction seam                   |
//!
//! [`Transport`]: makcu_core::Transport

pub mod batch;
pub mod builder;
pub mod commands;
pub mod device;
pub mod protocol;

mod dispatcher;

pub use batch::BatchBuilder;
pub use builder::DeviceBuilder;
pub use commands::CommandCache;
pub use device::{
    ConnectionCallback, Device, MouseButtonCallback, INITIAL_BAUD_RATE, OPERATIONAL_BAUD_RATE,
};
