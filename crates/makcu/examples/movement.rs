//! Movement styles: plain, smooth, Bezier, drags, and batches.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p makcu --example movement
//! ```

use std::time::Duration;

use makcu::{profiler, Device, MouseButton};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let device = Device::new();
    if !device.connect("").await {
        anyhow::bail!("no device found");
    }
    profiler::enable(true);

    println!("Plain relative moves...");
    device.move_pattern(&[(80, 0), (0, 80), (-80, 0), (0, -80)], false, 0).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    println!("Smooth interpolated moves...");
    device.move_pattern(&[(120, 60), (-120, -60)], true, 25).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    println!("Bezier curve with a control offset...");
    device.mouse_move_bezier(150, 0, 40, 75, -60).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    println!("Smooth drag...");
    device.mouse_drag_smooth(MouseButton::Left, 60, 60, 15).await;

    println!("Batched burst...");
    device
        .batch()
        .move_by(10, 0)
        .move_by(0, 10)
        .click(MouseButton::Right)
        .scroll(-2)
        .execute()
        .await;

    for (command, stats) in profiler::stats() {
        println!("{command}: {} calls, {} us mean", stats.count, stats.mean_micros());
    }

    device.disconnect().await;
    Ok(())
}
