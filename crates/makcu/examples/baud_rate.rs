//! Exercise the baud-rate change handshake.
//!
//! Connecting already upgrades the link to 4 Mbaud; this example steps
//! through lower operational rates with validation, then returns to the
//! maximum. The device falls back to 115200 on power cycle.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p makcu --example baud_rate
//! ```

use makcu::{Device, OPERATIONAL_BAUD_RATE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let device = Device::new();
    if !device.connect("").await {
        anyhow::bail!("no device found");
    }
    println!("Connected at {OPERATIONAL_BAUD_RATE} baud: {}", device.get_version().await);

    for rate in [1_000_000u32, 2_000_000, OPERATIONAL_BAUD_RATE] {
        print!("Switching to {rate}... ");
        if device.set_baud_rate(rate, true).await {
            println!("ok, version: {}", device.get_version().await);
        } else {
            println!("failed (recovered to 115200 if possible)");
            break;
        }
    }

    device.disconnect().await;
    Ok(())
}
