//! Command builders and the prerendered command cache.
//!
//! This module produces the ASCII command strings the device understands.
//! All functions are pure -- they render strings without performing any
//! I/O. The dispatcher appends the LF terminator when writing.
//!
//! Commands fall into two groups:
//!
//! - **Fixed strings**, precomputed once per device into a
//!   [`CommandCache`]: button press/release and lock set/clear/query.
//!   These are the gaming hot path; looking them up is a bounds-checked
//!   array index.
//! - **Parameterized strings** (`km.move`, `km.wheel`, `km.serial`),
//!   rendered on demand into a caller-provided buffer so the hot path
//!   does not allocate per call.
//!
//! Numeric arguments are validated here: coordinates and wheel deltas
//! must fit a signed 16-bit integer and segment counts are capped, so an
//! out-of-range value fails with
//! [`InvalidArgument`](makcu_core::Error::InvalidArgument) instead of
//! being silently truncated.

use std::fmt::Write as _;

use makcu_core::error::{Error, Result};
use makcu_core::types::{LockTarget, MouseButton};

/// Command that reports the firmware version string.
pub const CMD_VERSION: &str = "km.version()";
/// Command that reads the spoofable USB serial string.
pub const CMD_SERIAL_GET: &str = "km.serial()";
/// Command that restores the factory USB serial string.
pub const CMD_SERIAL_RESET: &str = "km.serial(0)";

/// Maximum number of interpolation segments the device accepts.
pub const MAX_SEGMENTS: u32 = 1000;

/// Build a button press or release command, e.g. `km.left(1)`.
pub fn cmd_button(button: MouseButton, down: bool) -> String {
    format!("km.{}({})", button.command_name(), down as u8)
}

/// Build a lock set/clear command, e.g. `km.lock_mx(1)`.
pub fn cmd_lock(target: LockTarget, lock: bool) -> String {
    format!("km.lock_{}({})", target.command_suffix(), lock as u8)
}

/// Build a lock query command, e.g. `km.lock_mx()`.
pub fn cmd_lock_query(target: LockTarget) -> String {
    format!("km.lock_{}()", target.command_suffix())
}

/// Build the button-event stream enable/disable command.
pub fn cmd_buttons(enable: bool) -> &'static str {
    if enable {
        "km.buttons(1)"
    } else {
        "km.buttons(0)"
    }
}

/// Build the input-catch command for a button, e.g. `km.catch_ml()`.
pub fn cmd_catch(button: MouseButton) -> String {
    let suffix = match button {
        MouseButton::Left => "ml",
        MouseButton::Middle => "mm",
        MouseButton::Right => "mr",
        MouseButton::Side1 => "ms1",
        MouseButton::Side2 => "ms2",
    };
    format!("km.catch_{suffix}()")
}

fn check_i16(value: i32, what: &str) -> Result<i16> {
    i16::try_from(value)
        .map_err(|_| Error::InvalidArgument(format!("{what} {value} outside signed 16-bit range")))
}

fn check_segments(segments: u32) -> Result<u32> {
    if segments == 0 || segments > MAX_SEGMENTS {
        return Err(Error::InvalidArgument(format!(
            "segment count {segments} outside 1..={MAX_SEGMENTS}"
        )));
    }
    Ok(segments)
}

/// Render `km.move(x,y)` into `buf`.
pub fn render_move(buf: &mut String, x: i32, y: i32) -> Result<()> {
    let (x, y) = (check_i16(x, "x")?, check_i16(y, "y")?);
    let _ = write!(buf, "km.move({x},{y})");
    Ok(())
}

/// Render `km.move(x,y,n)` into `buf` (linear interpolation in `n` segments).
pub fn render_move_smooth(buf: &mut String, x: i32, y: i32, segments: u32) -> Result<()> {
    let (x, y) = (check_i16(x, "x")?, check_i16(y, "y")?);
    let segments = check_segments(segments)?;
    let _ = write!(buf, "km.move({x},{y},{segments})");
    Ok(())
}

/// Render `km.move(x,y,n,cx,cy)` into `buf` (quadratic Bezier with control
/// offset `(cx, cy)`).
pub fn render_move_bezier(
    buf: &mut String,
    x: i32,
    y: i32,
    segments: u32,
    ctrl_x: i32,
    ctrl_y: i32,
) -> Result<()> {
    let (x, y) = (check_i16(x, "x")?, check_i16(y, "y")?);
    let segments = check_segments(segments)?;
    let (cx, cy) = (check_i16(ctrl_x, "ctrl_x")?, check_i16(ctrl_y, "ctrl_y")?);
    let _ = write!(buf, "km.move({x},{y},{segments},{cx},{cy})");
    Ok(())
}

/// Render `km.wheel(delta)` into `buf`.
pub fn render_wheel(buf: &mut String, delta: i32) -> Result<()> {
    let delta = check_i16(delta, "delta")?;
    let _ = write!(buf, "km.wheel({delta})");
    Ok(())
}

/// Build `km.move(x,y)` as an owned string (batch and test convenience).
pub fn cmd_move(x: i32, y: i32) -> Result<String> {
    let mut buf = String::new();
    render_move(&mut buf, x, y)?;
    Ok(buf)
}

/// Build `km.move(x,y,n)` as an owned string.
pub fn cmd_move_smooth(x: i32, y: i32, segments: u32) -> Result<String> {
    let mut buf = String::new();
    render_move_smooth(&mut buf, x, y, segments)?;
    Ok(buf)
}

/// Build `km.move(x,y,n,cx,cy)` as an owned string.
pub fn cmd_move_bezier(x: i32, y: i32, segments: u32, ctrl_x: i32, ctrl_y: i32) -> Result<String> {
    let mut buf = String::new();
    render_move_bezier(&mut buf, x, y, segments, ctrl_x, ctrl_y)?;
    Ok(buf)
}

/// Build `km.wheel(delta)` as an owned string.
pub fn cmd_wheel(delta: i32) -> Result<String> {
    let mut buf = String::new();
    render_wheel(&mut buf, delta)?;
    Ok(buf)
}

/// Build `km.serial('<s>')`, escaping the argument for the device's
/// single-quoted string syntax.
pub fn cmd_serial_set(serial: &str) -> String {
    format!("km.serial('{}')", escape_single_quoted(serial))
}

/// Escape a string for the device's single-quoted literal syntax.
///
/// Backslash and single quote are backslash-escaped; newline, carriage
/// return, and tab become `\n`, `\r`, `\t`; any other control byte is
/// rendered as `\xHH`.
pub fn escape_single_quoted(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7F => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Prerendered command strings for the hot path.
///
/// Built once at device construction; lookups are bounds-checked array
/// indexing by enum discriminant, so pressing a button never formats.
#[derive(Debug)]
pub struct CommandCache {
    press: [String; 5],
    release: [String; 5],
    lock_set: [String; 7],
    lock_clear: [String; 7],
    lock_query: [String; 7],
}

impl CommandCache {
    /// Render every cached command.
    pub fn new() -> Self {
        CommandCache {
            press: MouseButton::ALL.map(|b| cmd_button(b, true)),
            release: MouseButton::ALL.map(|b| cmd_button(b, false)),
            lock_set: LockTarget::ALL.map(|t| cmd_lock(t, true)),
            lock_clear: LockTarget::ALL.map(|t| cmd_lock(t, false)),
            lock_query: LockTarget::ALL.map(cmd_lock_query),
        }
    }

    /// The press command for a button, e.g. `km.left(1)`.
    pub fn press(&self, button: MouseButton) -> Option<&str> {
        self.press.get(button.index()).map(String::as_str)
    }

    /// The release command for a button, e.g. `km.left(0)`.
    pub fn release(&self, button: MouseButton) -> Option<&str> {
        self.release.get(button.index()).map(String::as_str)
    }

    /// The lock-set command for a target, e.g. `km.lock_mx(1)`.
    pub fn lock_set(&self, target: LockTarget) -> Option<&str> {
        self.lock_set.get(target.index()).map(String::as_str)
    }

    /// The lock-clear command for a target, e.g. `km.lock_mx(0)`.
    pub fn lock_clear(&self, target: LockTarget) -> Option<&str> {
        self.lock_clear.get(target.index()).map(String::as_str)
    }

    /// The lock-query command for a target, e.g. `km.lock_mx()`.
    pub fn lock_query(&self, target: LockTarget) -> Option<&str> {
        self.lock_query.get(target.index()).map(String::as_str)
    }
}

impl Default for CommandCache {
    fn default() -> Self {
        Self::new()
    }
}
