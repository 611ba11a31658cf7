// makcu test application -- CLI tool for exercising the library against
// real hardware or a scripted mock device.
//
// Usage:
//   makcu-test-app discover
//   makcu-test-app --port /dev/ttyUSB0 version
//   makcu-test-app click --button left
//   makcu-test-app move 100 50 --segments 20
//   makcu-test-app wheel -- -3
//   makcu-test-app lock x on
//   makcu-test-app locks
//   makcu-test-app serial set SPOOFED-01
//   makcu-test-app monitor --duration 15
//   makcu-test-app baud 2000000
//   makcu-test-app --mock version

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};

use makcu::{Device, DeviceBuilder, LockTarget, MouseButton};
use makcu_test_harness::{MockFactory, MockTransport};

/// makcu test application -- exercises the device from the command line.
#[derive(Parser)]
#[command(name = "makcu-test-app", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3). Defaults to discovery.
    #[arg(long, default_value = "")]
    port: String,

    /// Use a scripted in-process mock instead of hardware.
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ButtonArg {
    Left,
    Right,
    Middle,
    Side1,
    Side2,
}

impl From<ButtonArg> for MouseButton {
    fn from(arg: ButtonArg) -> Self {
        match arg {
            ButtonArg::Left => MouseButton::Left,
            ButtonArg::Right => MouseButton::Right,
            ButtonArg::Middle => MouseButton::Middle,
            ButtonArg::Side1 => MouseButton::Side1,
            ButtonArg::Side2 => MouseButton::Side2,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LockArg {
    X,
    Y,
    Left,
    Right,
    Middle,
    Side1,
    Side2,
}

impl From<LockArg> for LockTarget {
    fn from(arg: LockArg) -> Self {
        match arg {
            LockArg::X => LockTarget::X,
            LockArg::Y => LockTarget::Y,
            LockArg::Left => LockTarget::Left,
            LockArg::Right => LockTarget::Right,
            LockArg::Middle => LockTarget::Middle,
            LockArg::Side1 => LockTarget::Side1,
            LockArg::Side2 => LockTarget::Side2,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List candidate device ports.
    Discover,
    /// Show connected device identity.
    Info,
    /// Read the firmware version.
    Version,
    /// Click a button.
    Click {
        #[arg(long, value_enum, default_value = "left")]
        button: ButtonArg,
        /// Number of clicks.
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Move the pointer by a relative offset.
    Move {
        x: i32,
        y: i32,
        /// Interpolate in this many segments (0 = instant).
        #[arg(long, default_value_t = 0)]
        segments: u32,
    },
    /// Scroll the wheel.
    Wheel { delta: i32 },
    /// Set or clear an input lock.
    Lock {
        #[arg(value_enum)]
        target: LockArg,
        /// "on" or "off".
        state: String,
    },
    /// Show all cached lock states.
    Locks,
    /// Read, spoof, or reset the USB serial string.
    Serial {
        /// "get", "set", or "reset".
        action: String,
        /// Value for "set".
        value: Option<String>,
    },
    /// Watch physical button events.
    Monitor {
        /// Seconds to watch.
        #[arg(long, default_value_t = 10)]
        duration: u64,
    },
    /// Change the operational baud rate.
    Baud {
        rate: u32,
        /// Skip the post-change version validation.
        #[arg(long)]
        no_validate: bool,
    },
}

/// Build a device whose "hardware" is an in-process mock that answers
/// version probes and serial reads.
fn mock_device() -> Device {
    let factory = MockFactory::new().with_candidate("MOCK0");
    factory.on_open(|port, _baud| {
        let (transport, handle) = MockTransport::new(port);
        // Enough version answers for the connect probe and a few reads.
        for _ in 0..8 {
            handle.expect(b"km.version()\n", b"km.MAKCU v3.2-mock\n");
        }
        handle.expect(b"km.serial()\n", b"MOCK-SN\n");
        Ok(Box::new(transport))
    });
    DeviceBuilder::new().transport_factory(factory).build()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Command::Discover = cli.command {
        let devices = Device::find_devices();
        if devices.is_empty() {
            println!("No candidate device ports found.");
        }
        for info in devices {
            println!(
                "{}  {}  {:04x}:{:04x}",
                info.port, info.description, info.vid, info.pid
            );
        }
        return Ok(());
    }

    let device = if cli.mock { mock_device() } else { Device::new() };
    if !device.connect(&cli.port).await {
        bail!("failed to connect (port: {:?})", cli.port);
    }

    match cli.command {
        Command::Discover => unreachable!("handled above"),
        Command::Info => {
            let info = device.device_info();
            println!("port:        {}", info.port);
            println!("description: {}", info.description);
            println!("usb id:      {:04x}:{:04x}", info.vid, info.pid);
            println!("status:      {}", device.status());
        }
        Command::Version => {
            let version = device.get_version().await;
            if version.is_empty() {
                bail!("device did not answer the version probe");
            }
            println!("{version}");
        }
        Command::Click { button, count } => {
            let button: MouseButton = button.into();
            for _ in 0..count {
                if !device.click(button).await {
                    bail!("click failed");
                }
                tokio::time::sleep(Duration::from_millis(40)).await;
            }
            println!("clicked {button} x{count}");
        }
        Command::Move { x, y, segments } => {
            let ok = if segments > 0 {
                device.mouse_move_smooth(x, y, segments).await
            } else {
                device.mouse_move(x, y).await
            };
            if !ok {
                bail!("move rejected (out-of-range argument?)");
            }
        }
        Command::Wheel { delta } => {
            if !device.mouse_wheel(delta).await {
                bail!("wheel rejected");
            }
        }
        Command::Lock { target, state } => {
            let lock = match state.as_str() {
                "on" => true,
                "off" => false,
                other => bail!("expected \"on\" or \"off\", got {other:?}"),
            };
            let target: LockTarget = target.into();
            if !device.set_lock(target, lock).await {
                bail!("lock command failed");
            }
            println!("{target} locked: {}", device.is_locked(target));
        }
        Command::Locks => {
            let mut states: Vec<_> = device.all_lock_states().into_iter().collect();
            states.sort();
            for (name, locked) in states {
                println!("{name:>7}: {}", if locked { "locked" } else { "free" });
            }
        }
        Command::Serial { action, value } => match action.as_str() {
            "get" => println!("{}", device.get_mouse_serial().await),
            "set" => {
                let value = value.ok_or_else(|| anyhow::anyhow!("serial set needs a value"))?;
                if !device.set_mouse_serial(&value).await {
                    bail!("serial spoof failed");
                }
                println!("serial set to {value:?}");
            }
            "reset" => {
                if !device.reset_mouse_serial().await {
                    bail!("serial reset failed");
                }
                println!("serial reset");
            }
            other => bail!("expected get/set/reset, got {other:?}"),
        },
        Command::Monitor { duration } => {
            let count = Arc::new(Mutex::new(0u32));
            device.set_mouse_button_callback({
                let count = count.clone();
                move |button, pressed| {
                    *count.lock().unwrap() += 1;
                    println!("{button:>7} {}", if pressed { "down" } else { "up" });
                }
            });
            println!("Watching buttons for {duration}s...");
            tokio::time::sleep(Duration::from_secs(duration)).await;
            println!(
                "{} transitions, final mask {:#04x}",
                count.lock().unwrap(),
                device.button_mask()
            );
        }
        Command::Baud { rate, no_validate } => {
            if device.set_baud_rate(rate, !no_validate).await {
                println!("now running at {rate} baud");
            } else {
                bail!("baud change failed or did not validate");
            }
        }
    }

    device.disconnect().await;
    Ok(())
}
