//! Watch physical button activity in real time.
//!
//! The device pushes a mask byte on every physical button transition;
//! this example prints each transition and the running mask for 30
//! seconds.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p makcu --example button_monitor
//! ```

use std::time::Duration;

use makcu::Device;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let device = Device::new();
    if !device.connect("").await {
        anyhow::bail!("no device found");
    }
    println!("Connected: {}", device.get_version().await);

    device.set_connection_callback(|connected| {
        if !connected {
            println!("(connection lost)");
        }
    });
    device.set_mouse_button_callback(|button, pressed| {
        println!("{button:>7} {}", if pressed { "pressed" } else { "released" });
    });

    println!("Monitoring buttons for 30 seconds; press some...");
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if !device.is_connected() {
            break;
        }
        print!("\rmask: {:#04x} ", device.button_mask());
    }
    println!();

    device.disconnect().await;
    Ok(())
}
