//! Connect, read the firmware version, and perform a few basic actions.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p makcu --example basic_usage
//! ```

use std::time::Duration;

use makcu::{Device, MouseButton};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("Searching for a MAKCU device...");
    let Some(port) = Device::find_first_device() else {
        anyhow::bail!("no device found; is it plugged in?");
    };
    println!("Found device on {port}");

    let device = Device::new();
    if !device.connect(&port).await {
        anyhow::bail!("connection failed");
    }

    let version = device.get_version().await;
    println!("Connected: {version}");

    // A small square, clicking at each corner.
    for (x, y) in [(100, 0), (0, 100), (-100, 0), (0, -100)] {
        device.mouse_move_smooth(x, y, 20).await;
        device.click(MouseButton::Left).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    // Scroll back and forth.
    device.mouse_wheel(3).await;
    device.mouse_wheel(-3).await;

    device.disconnect().await;
    println!("Done.");
    Ok(())
}
