//! The public [`Device`] surface: typed commands, connection lifecycle,
//! health monitoring, and callbacks.
//!
//! A `Device` is a clonable handle to shared driver state. The typed
//! command methods render (or look up) the ASCII command string and hand
//! it to the dispatcher; fire-and-forget operations fold every failure
//! into `false` so the gaming hot path never unwinds.
//!
//! # Connection lifecycle
//!
//! `connect()` opens the port at 115200 baud, performs the binary baud
//! upgrade to 4 Mbaud (send frame, flush, close, settle, reopen), enables
//! the button event stream, probes responsiveness with `km.version()`,
//! publishes the connection state behind a release store of the live
//! flag, and starts the health monitor.
//!
//! Disconnection -- user-initiated or detected by the monitor -- funnels
//! through one teardown path guarded by a compare-exchange on the live
//! flag: whichever side wins the exchange clears state and fires the
//! connection callback, so the callback observes exactly one `false` per
//! connection no matter who notices first.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use makcu_core::error::{Error, Result};
use makcu_core::transport::{Transport, TransportFactory};
use makcu_core::types::{ConnectionStatus, DeviceInfo, LockTarget, MouseButton};
use makcu_transport::ports::{PRIMARY_DESCRIPTION, PRODUCT_ID, VENDOR_ID};

use crate::batch::BatchBuilder;
use crate::commands::{self, CommandCache};
use crate::dispatcher::{ButtonSink, Dispatcher, DispatcherHandle};
use crate::protocol;

/// Baud rate the device attaches at after power-up.
pub const INITIAL_BAUD_RATE: u32 = 115_200;
/// Operational baud rate after the upgrade handshake.
pub const OPERATIONAL_BAUD_RATE: u32 = 4_000_000;

/// Settle time between closing the port and reopening at the new rate.
const BAUD_SETTLE: Duration = Duration::from_millis(50);
/// Request deadline for the connect-time responsiveness probe.
const CONNECT_PROBE_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);
/// Wall deadline for the connect-time responsiveness probe.
const CONNECT_PROBE_WALL_TIMEOUT: Duration = Duration::from_millis(150);
/// Deadline for `km.catch_*()` requests.
const CATCH_TIMEOUT: Duration = Duration::from_millis(50);
/// Deadline for reading the spoofable serial string.
const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Deadline for the post-baud-change validation probe.
const VALIDATE_TIMEOUT: Duration = Duration::from_millis(1000);
/// Substring a healthy firmware version response contains.
const VERSION_TAG: &str = "km.MAKCU";
/// (settle ms, request timeout ms) for the three `get_version` attempts.
const VERSION_ATTEMPTS: [(u64, u64); 3] = [(10, 75), (20, 150), (20, 300)];
/// Settle between drag steps unless high-performance mode is on.
const DRAG_STEP_SETTLE: Duration = Duration::from_millis(2);
/// Health monitor cadence: initial interval, backing off to the maximum.
const MONITOR_INITIAL_INTERVAL: Duration = Duration::from_millis(150);
const MONITOR_MAX_INTERVAL: Duration = Duration::from_millis(500);
/// Valid bits in a button event frame (LEFT..SIDE2).
const BUTTON_BITS: u8 = 0x1F;

/// Callback invoked on every observed physical button transition.
pub type MouseButtonCallback = Arc<dyn Fn(MouseButton, bool) + Send + Sync>;
/// Callback invoked on every connection transition (`true` = connected).
pub type ConnectionCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Shared view of physical button state.
///
/// The listener task holds an `Arc` to this and nothing else of the
/// device, which is all it needs to deliver button events.
pub(crate) struct ButtonState {
    mask: AtomicU8,
    callback: StdMutex<Option<MouseButtonCallback>>,
}

impl ButtonState {
    fn new() -> Self {
        ButtonState {
            mask: AtomicU8::new(0),
            callback: StdMutex::new(None),
        }
    }

    /// Fold one button-mask byte into the atomic mask and report each
    /// changed button to the user callback.
    pub(crate) fn handle_byte(&self, byte: u8) {
        let byte = byte & BUTTON_BITS;
        let previous = self.mask.load(Ordering::Acquire);
        let changed = previous ^ byte;
        if changed == 0 {
            return;
        }
        for button in MouseButton::ALL {
            let bit = 1u8 << button.index();
            if changed & bit == 0 {
                continue;
            }
            let pressed = byte & bit != 0;
            // Per-bit RMW so concurrent events cannot lose each other's
            // updates.
            if pressed {
                self.mask.fetch_or(bit, Ordering::AcqRel);
            } else {
                self.mask.fetch_and(!bit, Ordering::AcqRel);
            }
            trace!(%button, pressed, "button event");
            let callback = self.callback.lock().expect("button callback lock").clone();
            if let Some(callback) = callback {
                if catch_unwind(AssertUnwindSafe(|| callback(button, pressed))).is_err() {
                    warn!("mouse button callback panicked");
                }
            }
        }
    }

    fn mask(&self) -> u8 {
        self.mask.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.mask.store(0, Ordering::Release);
    }
}

struct MonitorHandle {
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

pub(crate) struct Inner {
    factory: Box<dyn TransportFactory>,
    cache: CommandCache,
    status: AtomicU8,
    live: AtomicBool,
    monitoring_enabled: AtomicBool,
    high_performance: AtomicBool,
    lock_bits: AtomicU16,
    lock_valid: AtomicBool,
    info: StdMutex<DeviceInfo>,
    /// Reused command-rendering buffer; held only while formatting.
    scratch: StdMutex<String>,
    buttons: Arc<ButtonState>,
    connection_callback: StdMutex<Option<ConnectionCallback>>,
    dispatcher: AsyncMutex<Option<Dispatcher>>,
    monitor: StdMutex<Option<MonitorHandle>>,
    /// Serializes connect / disconnect / baud changes.
    lifecycle: AsyncMutex<()>,
}

impl Inner {
    pub(crate) fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn cache(&self) -> &CommandCache {
        &self.cache
    }

    pub(crate) async fn dispatcher_handle(&self) -> Option<DispatcherHandle> {
        self.dispatcher.lock().await.as_ref().map(|d| d.handle())
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(slot) = self.monitor.get_mut() {
            if let Some(monitor) = slot.take() {
                monitor.stop.store(true, Ordering::Release);
                monitor.wake.notify_one();
                monitor.task.abort();
            }
        }
    }
}

/// A handle to one makcu device.
///
/// Clones share the same connection; the last clone dropping tears the
/// listener and monitor down.
#[derive(Clone)]
pub struct Device {
    inner: Arc<Inner>,
}

impl Device {
    /// Create an unconnected device using the OS serial stack.
    pub fn new() -> Device {
        crate::builder::DeviceBuilder::new().build()
    }

    pub(crate) fn from_parts(factory: Box<dyn TransportFactory>, high_performance: bool) -> Device {
        Device {
            inner: Arc::new(Inner {
                factory,
                cache: CommandCache::new(),
                status: AtomicU8::new(ConnectionStatus::Disconnected as u8),
                live: AtomicBool::new(false),
                monitoring_enabled: AtomicBool::new(false),
                high_performance: AtomicBool::new(high_performance),
                lock_bits: AtomicU16::new(0),
                lock_valid: AtomicBool::new(false),
                info: StdMutex::new(DeviceInfo::default()),
                scratch: StdMutex::new(String::with_capacity(64)),
                buttons: Arc::new(ButtonState::new()),
                connection_callback: StdMutex::new(None),
                dispatcher: AsyncMutex::new(None),
                monitor: StdMutex::new(None),
                lifecycle: AsyncMutex::new(()),
            }),
        }
    }

    // -----------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------

    /// All candidate device ports the OS reports.
    pub fn find_devices() -> Vec<DeviceInfo> {
        makcu_transport::find_device_ports().unwrap_or_default()
    }

    /// The first candidate device port, if any.
    pub fn find_first_device() -> Option<String> {
        makcu_transport::find_first_device().ok().flatten()
    }

    // -----------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------

    /// Connect to the device.
    ///
    /// An empty `port` selects the first discovered candidate. Returns
    /// `true` once the baud upgrade, device init, and responsiveness
    /// probe have all succeeded; on any failure the port is closed and
    /// the status is [`ConnectionError`](ConnectionStatus::ConnectionError).
    pub async fn connect(&self, port: &str) -> bool {
        let guard = self.inner.lifecycle.lock().await;
        let inner = &self.inner;

        if inner.is_live() {
            debug!("already connected");
            return true;
        }

        let target = if port.is_empty() {
            match inner.factory.discover() {
                Ok(candidates) if !candidates.is_empty() => candidates[0].port.clone(),
                Ok(_) => {
                    warn!("no candidate device port found");
                    inner.set_status(ConnectionStatus::ConnectionError);
                    return false;
                }
                Err(e) => {
                    warn!(error = %e, "port discovery failed");
                    inner.set_status(ConnectionStatus::ConnectionError);
                    return false;
                }
            }
        } else {
            port.to_string()
        };

        inner.set_status(ConnectionStatus::Connecting);
        info!(port = %target, "connecting");

        let transport = match inner.factory.open(&target, INITIAL_BAUD_RATE).await {
            Ok(t) => t,
            Err(e) => {
                warn!(port = %target, error = %e, "open failed");
                inner.set_status(ConnectionStatus::ConnectionError);
                return false;
            }
        };

        let transport =
            match upgrade_baud(inner.factory.as_ref(), transport, OPERATIONAL_BAUD_RATE).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(port = %target, error = %e, "baud upgrade failed");
                    inner.set_status(ConnectionStatus::ConnectionError);
                    return false;
                }
            };

        if !transport.is_connected() || !transport.liveness() {
            warn!(port = %target, "port not live after baud upgrade");
            let mut transport = transport;
            let _ = transport.close().await;
            inner.set_status(ConnectionStatus::ConnectionError);
            return false;
        }

        let dispatcher = Dispatcher::spawn(transport, button_sink(inner));
        let handle = dispatcher.handle();

        // Device init: enable the button event stream.
        let probe = match handle.send(commands::cmd_buttons(true)).await {
            Ok(()) => {
                // Responsiveness probe with both a request and a wall deadline.
                match tokio::time::timeout(
                    CONNECT_PROBE_WALL_TIMEOUT,
                    handle.request(
                        commands::CMD_VERSION,
                        true,
                        CONNECT_PROBE_REQUEST_TIMEOUT,
                    ),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::TimedOut),
                }
            }
            Err(e) => Err(e),
        };
        if let Err(e) = probe {
            warn!(port = %target, error = %e, "device init/probe failed");
            if let Some(mut transport) = dispatcher.shutdown().await {
                let _ = transport.close().await;
            }
            inner.set_status(ConnectionStatus::ConnectionError);
            return false;
        }

        // Publish connection state; the release store of `live` fences
        // everything written before it.
        {
            let mut device_info = inner.info.lock().expect("info lock");
            *device_info = DeviceInfo {
                port: target.clone(),
                description: PRIMARY_DESCRIPTION.to_string(),
                vid: VENDOR_ID,
                pid: PRODUCT_ID,
                connected: true,
            };
        }
        *inner.dispatcher.lock().await = Some(dispatcher);
        inner.set_status(ConnectionStatus::Connected);
        inner.monitoring_enabled.store(true, Ordering::Release);
        inner.lock_bits.store(0, Ordering::Release);
        inner.lock_valid.store(true, Ordering::Release);
        inner.live.store(true, Ordering::Release);

        self.spawn_monitor();

        drop(guard);
        fire_connection_callback(inner, true);
        info!(port = %target, "device connected");
        true
    }

    /// Connect on a background task; the handle resolves to the same
    /// result `connect()` would return.
    pub fn connect_async(&self, port: &str) -> JoinHandle<bool> {
        let device = self.clone();
        let port = port.to_string();
        tokio::spawn(async move { device.connect(&port).await })
    }

    /// Disconnect and clear all connection state.
    ///
    /// Safe to call at any time; the connection callback fires at most
    /// once per live connection regardless of races with the health
    /// monitor.
    pub async fn disconnect(&self) {
        let guard = self.inner.lifecycle.lock().await;
        let transitioned = teardown(&self.inner, false).await;
        drop(guard);
        if transitioned {
            fire_connection_callback(&self.inner, false);
        }
    }

    /// Whether the device is currently connected.
    pub fn is_connected(&self) -> bool {
        self.inner.is_live()
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    /// Identity of the connected (or last connected) device.
    pub fn device_info(&self) -> DeviceInfo {
        self.inner.info.lock().expect("info lock").clone()
    }

    /// Change the operational baud rate.
    ///
    /// The rate is clamped to the device's supported range. With
    /// `validate`, a version probe must answer at the new rate; if it
    /// does not, the driver re-runs the handshake back to 115200 baud and
    /// returns `false` (disconnecting only if even the recovery fails).
    pub async fn set_baud_rate(&self, baud_rate: u32, validate: bool) -> bool {
        let guard = self.inner.lifecycle.lock().await;
        let inner = &self.inner;
        if !inner.is_live() {
            return false;
        }
        let target = baud_rate.clamp(INITIAL_BAUD_RATE, OPERATIONAL_BAUD_RATE);

        let Some(dispatcher) = inner.dispatcher.lock().await.take() else {
            return false;
        };
        let Some(transport) = dispatcher.shutdown().await else {
            return self.abort_connection(guard).await;
        };

        let transport = match upgrade_baud(inner.factory.as_ref(), transport, target).await {
            Ok(t) => t,
            Err(e) => {
                warn!(baud = target, error = %e, "baud change handshake failed");
                return self.abort_connection(guard).await;
            }
        };

        let dispatcher = Dispatcher::spawn(transport, button_sink(inner));
        let handle = dispatcher.handle();
        *inner.dispatcher.lock().await = Some(dispatcher);
        debug!(baud = target, "running at new baud rate");

        if !validate {
            return true;
        }

        match handle
            .request(commands::CMD_VERSION, true, VALIDATE_TIMEOUT)
            .await
        {
            Ok(response) if response.contains(VERSION_TAG) => true,
            _ => {
                warn!(baud = target, "validation failed, recovering initial baud rate");
                let Some(dispatcher) = inner.dispatcher.lock().await.take() else {
                    return self.abort_connection(guard).await;
                };
                let Some(transport) = dispatcher.shutdown().await else {
                    return self.abort_connection(guard).await;
                };
                match upgrade_baud(inner.factory.as_ref(), transport, INITIAL_BAUD_RATE).await {
                    Ok(transport) => {
                        let dispatcher = Dispatcher::spawn(transport, button_sink(inner));
                        *inner.dispatcher.lock().await = Some(dispatcher);
                        false
                    }
                    Err(e) => {
                        warn!(error = %e, "recovery handshake failed");
                        self.abort_connection(guard).await
                    }
                }
            }
        }
    }

    async fn abort_connection(&self, guard: tokio::sync::MutexGuard<'_, ()>) -> bool {
        let transitioned = teardown(&self.inner, false).await;
        drop(guard);
        if transitioned {
            fire_connection_callback(&self.inner, false);
        }
        false
    }

    fn spawn_monitor(&self) {
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let task = tokio::spawn(monitor_loop(
            Arc::downgrade(&self.inner),
            stop.clone(),
            wake.clone(),
        ));
        *self.inner.monitor.lock().expect("monitor lock") = Some(MonitorHandle { stop, wake, task });
    }

    // -----------------------------------------------------------------
    // Command plumbing
    // -----------------------------------------------------------------

    pub(crate) async fn send_command(&self, text: &str) -> bool {
        if !self.inner.is_live() {
            return false;
        }
        let Some(handle) = self.inner.dispatcher_handle().await else {
            return false;
        };
        match handle.send(text).await {
            Ok(()) => true,
            Err(e) => {
                debug!(command = %text, error = %e, "command write failed");
                false
            }
        }
    }

    /// Render a command into the shared scratch buffer and send it.
    async fn send_rendered<F>(&self, render: F) -> bool
    where
        F: FnOnce(&mut String) -> Result<()>,
    {
        if !self.inner.is_live() {
            return false;
        }
        let text = {
            let mut buf = self.inner.scratch.lock().expect("scratch lock");
            buf.clear();
            match render(&mut buf) {
                Ok(()) => buf.clone(),
                Err(e) => {
                    debug!(error = %e, "rejected command");
                    return false;
                }
            }
        };
        self.send_command(&text).await
    }

    async fn request(&self, text: &str, timeout: Duration) -> Result<String> {
        if !self.inner.is_live() {
            return Err(Error::Disconnected);
        }
        let Some(handle) = self.inner.dispatcher_handle().await else {
            return Err(Error::Disconnected);
        };
        handle.request(text, true, timeout).await
    }

    // -----------------------------------------------------------------
    // Buttons
    // -----------------------------------------------------------------

    /// Press a button.
    pub async fn mouse_down(&self, button: MouseButton) -> bool {
        let Some(cmd) = self.inner.cache.press(button) else {
            return false;
        };
        self.send_command(cmd).await
    }

    /// Release a button.
    pub async fn mouse_up(&self, button: MouseButton) -> bool {
        let Some(cmd) = self.inner.cache.release(button) else {
            return false;
        };
        self.send_command(cmd).await
    }

    /// Press and release a button.
    pub async fn click(&self, button: MouseButton) -> bool {
        self.mouse_down(button).await && self.mouse_up(button).await
    }

    /// Click each button in order with a fixed delay between clicks.
    pub async fn click_sequence(&self, buttons: &[MouseButton], delay: Duration) -> bool {
        for (i, &button) in buttons.iter().enumerate() {
            if !self.click(button).await {
                return false;
            }
            if i + 1 < buttons.len() {
                tokio::time::sleep(delay).await;
            }
        }
        true
    }

    // -----------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------

    /// Move the pointer by a relative offset.
    pub async fn mouse_move(&self, x: i32, y: i32) -> bool {
        self.send_rendered(|buf| commands::render_move(buf, x, y)).await
    }

    /// Move with device-side linear interpolation in `segments` steps.
    pub async fn mouse_move_smooth(&self, x: i32, y: i32, segments: u32) -> bool {
        self.send_rendered(|buf| commands::render_move_smooth(buf, x, y, segments))
            .await
    }

    /// Move along a quadratic Bezier with control offset `(ctrl_x, ctrl_y)`.
    pub async fn mouse_move_bezier(
        &self,
        x: i32,
        y: i32,
        segments: u32,
        ctrl_x: i32,
        ctrl_y: i32,
    ) -> bool {
        self.send_rendered(|buf| commands::render_move_bezier(buf, x, y, segments, ctrl_x, ctrl_y))
            .await
    }

    /// Visit each relative offset in turn, plainly or smoothly.
    pub async fn move_pattern(&self, points: &[(i32, i32)], smooth: bool, segments: u32) -> bool {
        for &(x, y) in points {
            let ok = if smooth {
                self.mouse_move_smooth(x, y, segments).await
            } else {
                self.mouse_move(x, y).await
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Press, move, release. Stops at the first failed step.
    pub async fn mouse_drag(&self, button: MouseButton, x: i32, y: i32) -> bool {
        if !self.mouse_down(button).await {
            return false;
        }
        self.drag_settle().await;
        if !self.mouse_move(x, y).await {
            return false;
        }
        self.drag_settle().await;
        self.mouse_up(button).await
    }

    /// Press, move smoothly, release.
    pub async fn mouse_drag_smooth(
        &self,
        button: MouseButton,
        x: i32,
        y: i32,
        segments: u32,
    ) -> bool {
        if !self.mouse_down(button).await {
            return false;
        }
        self.drag_settle().await;
        if !self.mouse_move_smooth(x, y, segments).await {
            return false;
        }
        self.drag_settle().await;
        self.mouse_up(button).await
    }

    /// Press, move along a Bezier, release.
    pub async fn mouse_drag_bezier(
        &self,
        button: MouseButton,
        x: i32,
        y: i32,
        segments: u32,
        ctrl_x: i32,
        ctrl_y: i32,
    ) -> bool {
        if !self.mouse_down(button).await {
            return false;
        }
        self.drag_settle().await;
        if !self
            .mouse_move_bezier(x, y, segments, ctrl_x, ctrl_y)
            .await
        {
            return false;
        }
        self.drag_settle().await;
        self.mouse_up(button).await
    }

    async fn drag_settle(&self) {
        if !self.inner.high_performance.load(Ordering::Relaxed) {
            tokio::time::sleep(DRAG_STEP_SETTLE).await;
        }
    }

    /// Scroll the wheel by `delta` notches.
    pub async fn mouse_wheel(&self, delta: i32) -> bool {
        self.send_rendered(|buf| commands::render_wheel(buf, delta)).await
    }

    // -----------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------

    /// Set or clear an input lock.
    ///
    /// The cached lock state is updated optimistically on write success;
    /// it is invalidated on disconnect.
    pub async fn set_lock(&self, target: LockTarget, lock: bool) -> bool {
        let cmd = if lock {
            self.inner.cache.lock_set(target)
        } else {
            self.inner.cache.lock_clear(target)
        };
        let Some(cmd) = cmd else {
            return false;
        };
        let ok = self.send_command(cmd).await;
        if ok {
            if lock {
                self.inner.lock_bits.fetch_or(target.bit(), Ordering::AcqRel);
            } else {
                self.inner.lock_bits.fetch_and(!target.bit(), Ordering::AcqRel);
            }
        }
        ok
    }

    /// Cached lock state; `false` whenever the cache is invalid.
    pub fn is_locked(&self, target: LockTarget) -> bool {
        self.inner.lock_valid.load(Ordering::Acquire)
            && self.inner.lock_bits.load(Ordering::Acquire) & target.bit() != 0
    }

    /// Snapshot of every lock target's cached state, keyed by target name.
    pub fn all_lock_states(&self) -> HashMap<String, bool> {
        LockTarget::ALL
            .iter()
            .map(|&target| (target.to_string(), self.is_locked(target)))
            .collect()
    }

    pub async fn lock_x(&self, lock: bool) -> bool {
        self.set_lock(LockTarget::X, lock).await
    }

    pub async fn lock_y(&self, lock: bool) -> bool {
        self.set_lock(LockTarget::Y, lock).await
    }

    pub async fn lock_left(&self, lock: bool) -> bool {
        self.set_lock(LockTarget::Left, lock).await
    }

    pub async fn lock_right(&self, lock: bool) -> bool {
        self.set_lock(LockTarget::Right, lock).await
    }

    pub async fn lock_middle(&self, lock: bool) -> bool {
        self.set_lock(LockTarget::Middle, lock).await
    }

    pub async fn lock_side1(&self, lock: bool) -> bool {
        self.set_lock(LockTarget::Side1, lock).await
    }

    pub async fn lock_side2(&self, lock: bool) -> bool {
        self.set_lock(LockTarget::Side2, lock).await
    }

    pub fn is_x_locked(&self) -> bool {
        self.is_locked(LockTarget::X)
    }

    pub fn is_y_locked(&self) -> bool {
        self.is_locked(LockTarget::Y)
    }

    pub fn is_left_locked(&self) -> bool {
        self.is_locked(LockTarget::Left)
    }

    pub fn is_right_locked(&self) -> bool {
        self.is_locked(LockTarget::Right)
    }

    pub fn is_middle_locked(&self) -> bool {
        self.is_locked(LockTarget::Middle)
    }

    pub fn is_side1_locked(&self) -> bool {
        self.is_locked(LockTarget::Side1)
    }

    pub fn is_side2_locked(&self) -> bool {
        self.is_locked(LockTarget::Side2)
    }

    // -----------------------------------------------------------------
    // Input catching
    // -----------------------------------------------------------------

    async fn catch_button(&self, button: MouseButton) -> u8 {
        match self.request(&commands::cmd_catch(button), CATCH_TIMEOUT).await {
            Ok(response) => parse_decimal_byte(&response),
            Err(e) => {
                debug!(%button, error = %e, "catch request failed");
                0
            }
        }
    }

    pub async fn catch_mouse_left(&self) -> u8 {
        self.catch_button(MouseButton::Left).await
    }

    pub async fn catch_mouse_middle(&self) -> u8 {
        self.catch_button(MouseButton::Middle).await
    }

    pub async fn catch_mouse_right(&self) -> u8 {
        self.catch_button(MouseButton::Right).await
    }

    pub async fn catch_mouse_side1(&self) -> u8 {
        self.catch_button(MouseButton::Side1).await
    }

    pub async fn catch_mouse_side2(&self) -> u8 {
        self.catch_button(MouseButton::Side2).await
    }

    // -----------------------------------------------------------------
    // Serial spoofing
    // -----------------------------------------------------------------

    /// Read the spoofable USB serial string. Empty on failure.
    pub async fn get_mouse_serial(&self) -> String {
        self.request(commands::CMD_SERIAL_GET, SERIAL_READ_TIMEOUT)
            .await
            .unwrap_or_default()
    }

    /// Spoof the USB serial string.
    pub async fn set_mouse_serial(&self, serial: &str) -> bool {
        self.send_command(&commands::cmd_serial_set(serial)).await
    }

    /// Restore the factory USB serial string.
    pub async fn reset_mouse_serial(&self) -> bool {
        self.send_command(commands::CMD_SERIAL_RESET).await
    }

    // -----------------------------------------------------------------
    // Button monitoring
    // -----------------------------------------------------------------

    /// Enable or disable the device's button event stream.
    pub async fn enable_button_monitoring(&self, enable: bool) -> bool {
        let ok = self.send_command(commands::cmd_buttons(enable)).await;
        if ok {
            self.inner.monitoring_enabled.store(enable, Ordering::Release);
        }
        ok
    }

    /// Whether the button event stream is enabled.
    pub fn is_button_monitoring_enabled(&self) -> bool {
        self.inner.monitoring_enabled.load(Ordering::Acquire)
    }

    /// Snapshot of the last observed physical button mask.
    pub fn button_mask(&self) -> u8 {
        self.inner.buttons.mask()
    }

    /// Last observed state of one physical button.
    pub fn button_state(&self, button: MouseButton) -> bool {
        self.button_mask() & (1 << button.index()) != 0
    }

    // -----------------------------------------------------------------
    // Version
    // -----------------------------------------------------------------

    /// Firmware version string, or empty after three failed attempts.
    pub async fn get_version(&self) -> String {
        if !self.inner.is_live() {
            return String::new();
        }
        for (settle_ms, timeout_ms) in VERSION_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(settle_ms)).await;
            match self
                .request(commands::CMD_VERSION, Duration::from_millis(timeout_ms))
                .await
            {
                Ok(response) if !response.is_empty() => return response,
                Ok(_) => {}
                Err(e) => debug!(error = %e, "version attempt failed"),
            }
        }
        String::new()
    }

    // -----------------------------------------------------------------
    // Callbacks and modes
    // -----------------------------------------------------------------

    /// Install the physical-button callback.
    ///
    /// Invoked from the listener task with no internal lock held; panics
    /// inside the callback are swallowed.
    pub fn set_mouse_button_callback(
        &self,
        callback: impl Fn(MouseButton, bool) + Send + Sync + 'static,
    ) {
        *self.inner.buttons.callback.lock().expect("button callback lock") =
            Some(Arc::new(callback));
    }

    pub fn clear_mouse_button_callback(&self) {
        *self.inner.buttons.callback.lock().expect("button callback lock") = None;
    }

    /// Install the connection-transition callback.
    pub fn set_connection_callback(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        *self
            .inner
            .connection_callback
            .lock()
            .expect("callback lock") = Some(Arc::new(callback));
    }

    pub fn clear_connection_callback(&self) {
        *self
            .inner
            .connection_callback
            .lock()
            .expect("callback lock") = None;
    }

    /// Skip inter-step settles in drag sequences.
    pub fn enable_high_performance_mode(&self, enable: bool) {
        self.inner.high_performance.store(enable, Ordering::Relaxed);
    }

    pub fn is_high_performance_mode_enabled(&self) -> bool {
        self.inner.high_performance.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------
    // Batching
    // -----------------------------------------------------------------

    /// Start a command batch bound to this device.
    pub fn batch(&self) -> BatchBuilder {
        BatchBuilder::new(Arc::downgrade(&self.inner))
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::new()
    }
}

// ---------------------------------------------------------------------
// Free helpers shared by Device methods and the monitor task
// ---------------------------------------------------------------------

fn button_sink(inner: &Arc<Inner>) -> ButtonSink {
    let buttons = inner.buttons.clone();
    Arc::new(move |byte| buttons.handle_byte(byte))
}

fn fire_connection_callback(inner: &Inner, connected: bool) {
    let callback = inner
        .connection_callback
        .lock()
        .expect("callback lock")
        .clone();
    if let Some(callback) = callback {
        if catch_unwind(AssertUnwindSafe(|| callback(connected))).is_err() {
            warn!("connection callback panicked");
        }
    }
}

/// First run of ASCII digits in `response`, parsed as a byte; 0 otherwise.
fn parse_decimal_byte(response: &str) -> u8 {
    let digits: String = response
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// The baud-change handshake: write the binary frame, flush, close,
/// settle, reopen at the new rate.
async fn upgrade_baud(
    factory: &dyn TransportFactory,
    mut transport: Box<dyn Transport>,
    baud: u32,
) -> Result<Box<dyn Transport>> {
    let frame = protocol::baud_change_frame(baud);
    if let Err(e) = transport.send(&frame).await {
        let _ = transport.close().await;
        return Err(Error::HandshakeFailed(format!("command write: {e}")));
    }
    if let Err(e) = transport.flush().await {
        let _ = transport.close().await;
        return Err(Error::HandshakeFailed(format!("flush: {e}")));
    }
    let port = transport.port_name().to_string();
    let _ = transport.close().await;
    tokio::time::sleep(BAUD_SETTLE).await;
    factory
        .open(&port, baud)
        .await
        .map_err(|e| Error::HandshakeFailed(format!("reopen at {baud}: {e}")))
}

/// Tear the connection down. Returns whether this call won the live-flag
/// transition (and the caller should fire the connection callback).
///
/// Used by `disconnect()`, by failed baud changes, and by the health
/// monitor; the compare-exchange makes the state clear and callback
/// exactly-once under any race between them.
async fn teardown(inner: &Arc<Inner>, from_monitor: bool) -> bool {
    // Stop the health monitor first and wake it so it exits promptly.
    let monitor = inner.monitor.lock().expect("monitor lock").take();
    if let Some(monitor) = monitor {
        monitor.stop.store(true, Ordering::Release);
        monitor.wake.notify_one();
        if from_monitor {
            // Tearing down from inside the monitor task itself; joining
            // would deadlock on ourselves, so detach instead.
            drop(monitor.task);
        } else {
            let _ = monitor.task.await;
        }
    }

    let transitioned = inner
        .live
        .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
        .is_ok();

    inner.set_status(ConnectionStatus::Disconnected);
    let dispatcher = inner.dispatcher.lock().await.take();
    if let Some(dispatcher) = dispatcher {
        if let Some(mut transport) = dispatcher.shutdown().await {
            let _ = transport.close().await;
        }
    }
    inner.info.lock().expect("info lock").connected = false;
    inner.buttons.reset();
    inner.lock_bits.store(0, Ordering::Release);
    inner.lock_valid.store(false, Ordering::Release);
    inner.monitoring_enabled.store(false, Ordering::Release);

    if transitioned {
        info!("device disconnected");
    }
    transitioned
}

/// Health monitor loop: wakeable sleep, liveness probe, CAS-guarded
/// teardown on failure.
async fn monitor_loop(weak: Weak<Inner>, stop: Arc<AtomicBool>, wake: Arc<Notify>) {
    let mut interval = MONITOR_INITIAL_INTERVAL;
    debug!("health monitor started");
    loop {
        tokio::select! {
            _ = wake.notified() => {}
            _ = tokio::time::sleep(interval) => {}
        }
        if stop.load(Ordering::Acquire) {
            break;
        }
        let Some(inner) = weak.upgrade() else { break };
        if !inner.live.load(Ordering::Acquire) {
            break;
        }

        // A missing dispatcher means a baud change is in flight; skip
        // this round rather than mistake it for a dead device.
        let handle = inner.dispatcher_handle().await;
        if let Some(handle) = handle {
            if !handle.probe().await {
                warn!("device liveness lost");
                let transitioned = teardown(&inner, true).await;
                if transitioned {
                    fire_connection_callback(&inner, false);
                }
                break;
            }
        }

        interval = (interval * 2).min(MONITOR_MAX_INTERVAL);
    }
    debug!("health monitor stopped");
}

// ---------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DeviceBuilder;
    use makcu_test_harness::{MockFactory, MockHandle, MockTransport};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// A factory whose every opened transport answers `km.version()`,
    /// except at baud rates listed in `mute_bauds`.
    fn scripted_factory(
        mute_bauds: &'static [u32],
    ) -> (MockFactory, Arc<Mutex<Vec<MockHandle>>>) {
        let factory = MockFactory::new().with_candidate("MOCK0");
        let handles: Arc<Mutex<Vec<MockHandle>>> = Arc::new(Mutex::new(Vec::new()));
        factory.on_open({
            let handles = handles.clone();
            move |port, baud| {
                let (transport, handle) = MockTransport::new(port);
                if !mute_bauds.contains(&baud) {
                    handle.expect(b"km.version()\n", b"km.MAKCU v3.2\n");
                }
                handles.lock().unwrap().push(handle);
                Ok(Box::new(transport))
            }
        });
        (factory, handles)
    }

    async fn connected_device() -> (Device, MockFactory, Arc<Mutex<Vec<MockHandle>>>) {
        let (factory, handles) = scripted_factory(&[]);
        let device = DeviceBuilder::new()
            .transport_factory(factory.clone())
            .build();
        assert!(device.connect("").await);
        (device, factory, handles)
    }

    fn handle_at(handles: &Arc<Mutex<Vec<MockHandle>>>, index: usize) -> MockHandle {
        handles.lock().unwrap()[index].clone()
    }

    // -----------------------------------------------------------------
    // Scenario: connect, upgrade, version
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn connect_upgrades_baud_and_probes_version() {
        let (device, factory, handles) = connected_device().await;

        assert!(device.is_connected());
        assert_eq!(device.status(), ConnectionStatus::Connected);
        assert!(device.is_button_monitoring_enabled());

        // One open at 115200, one reopen at 4M.
        assert_eq!(
            factory.opens(),
            vec![
                ("MOCK0".to_string(), INITIAL_BAUD_RATE),
                ("MOCK0".to_string(), OPERATIONAL_BAUD_RATE),
            ]
        );

        // The 115200 transport saw exactly the upgrade frame.
        assert_eq!(
            handle_at(&handles, 0).sent(),
            vec![protocol::baud_change_frame(OPERATIONAL_BAUD_RATE).to_vec()]
        );

        // The 4M transport saw init then the probe.
        let sent = handle_at(&handles, 1).sent();
        assert_eq!(sent[0], b"km.buttons(1)\n".to_vec());
        assert_eq!(sent[1], b"km.version()\n".to_vec());

        let info = device.device_info();
        assert_eq!(info.port, "MOCK0");
        assert_eq!(info.vid, 0x1A86);
        assert_eq!(info.pid, 0x55D3);
        assert!(info.connected);

        // A fresh expectation serves get_version.
        handle_at(&handles, 1).expect(b"km.version()\n", b"km.MAKCU v3.2\n");
        let version = device.get_version().await;
        assert!(version.contains("km.MAKCU"));

        device.disconnect().await;
        assert_eq!(device.status(), ConnectionStatus::Disconnected);
        assert!(!device.device_info().connected);
    }

    #[tokio::test]
    async fn connect_twice_is_idempotent() {
        let (device, factory, _handles) = connected_device().await;
        assert!(device.connect("").await);
        assert_eq!(factory.opens().len(), 2);
        device.disconnect().await;
    }

    #[tokio::test]
    async fn connect_fails_without_candidates() {
        let factory = MockFactory::new();
        let device = DeviceBuilder::new()
            .transport_factory(factory.clone())
            .build();

        assert!(!device.connect("").await);
        assert_eq!(device.status(), ConnectionStatus::ConnectionError);
        assert!(factory.opens().is_empty());
    }

    #[tokio::test]
    async fn connect_fails_when_probe_is_unanswered() {
        // Mute the 4M transport so the connect-time probe times out.
        let (factory, _handles) = scripted_factory(&[OPERATIONAL_BAUD_RATE]);
        let device = DeviceBuilder::new()
            .transport_factory(factory.clone())
            .build();

        assert!(!device.connect("").await);
        assert_eq!(device.status(), ConnectionStatus::ConnectionError);
        assert!(!device.is_connected());
    }

    // -----------------------------------------------------------------
    // Scenario: click write ordering
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn click_writes_press_then_release() {
        let (device, _factory, handles) = connected_device().await;
        let link = handle_at(&handles, 1);
        link.clear_sent();

        assert!(device.click(MouseButton::Left).await);

        assert_eq!(
            link.sent(),
            vec![b"km.left(1)\n".to_vec(), b"km.left(0)\n".to_vec()]
        );
        device.disconnect().await;
    }

    #[tokio::test]
    async fn movement_commands_render_and_validate() {
        let (device, _factory, handles) = connected_device().await;
        let link = handle_at(&handles, 1);
        link.clear_sent();

        assert!(device.mouse_move(10, -20).await);
        assert!(device.mouse_move_smooth(5, 5, 10).await);
        assert!(device.mouse_move_bezier(1, 2, 3, 4, 5).await);
        assert!(device.mouse_wheel(-1).await);
        // Out-of-range arguments are rejected host-side, nothing written.
        assert!(!device.mouse_move(100_000, 0).await);
        assert!(!device.mouse_move_smooth(1, 1, 5000).await);

        assert_eq!(
            link.sent(),
            vec![
                b"km.move(10,-20)\n".to_vec(),
                b"km.move(5,5,10)\n".to_vec(),
                b"km.move(1,2,3,4,5)\n".to_vec(),
                b"km.wheel(-1)\n".to_vec(),
            ]
        );
        device.disconnect().await;
    }

    #[tokio::test]
    async fn drag_emits_press_move_release() {
        let (device, _factory, handles) = connected_device().await;
        let link = handle_at(&handles, 1);
        link.clear_sent();

        assert!(device.mouse_drag(MouseButton::Right, 30, 40).await);

        assert_eq!(
            link.sent(),
            vec![
                b"km.right(1)\n".to_vec(),
                b"km.move(30,40)\n".to_vec(),
                b"km.right(0)\n".to_vec(),
            ]
        );
        device.disconnect().await;
    }

    // -----------------------------------------------------------------
    // Scenario: button events and callback
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn button_events_update_mask_and_fire_callback() {
        let (device, _factory, handles) = connected_device().await;
        let events: Arc<Mutex<Vec<(MouseButton, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        device.set_mouse_button_callback({
            let events = events.clone();
            move |button, pressed| events.lock().unwrap().push((button, pressed))
        });

        let link = handle_at(&handles, 1);
        link.push_bytes(&[0x02]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(device.button_mask(), 0x02);
        assert!(device.button_state(MouseButton::Right));
        assert_eq!(*events.lock().unwrap(), vec![(MouseButton::Right, true)]);

        link.push_bytes(&[0x00]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(device.button_mask(), 0x00);
        assert_eq!(
            *events.lock().unwrap(),
            vec![(MouseButton::Right, true), (MouseButton::Right, false)]
        );

        device.disconnect().await;
        assert_eq!(device.button_mask(), 0x00);
    }

    #[tokio::test]
    async fn panicking_button_callback_does_not_kill_the_listener() {
        let (device, _factory, handles) = connected_device().await;
        device.set_mouse_button_callback(|_, _| panic!("user bug"));

        let link = handle_at(&handles, 1);
        link.push_bytes(&[0x01]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The listener survived; the mask still updated.
        assert_eq!(device.button_mask(), 0x01);
        link.push_bytes(&[0x00]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(device.button_mask(), 0x00);

        device.disconnect().await;
    }

    // -----------------------------------------------------------------
    // Scenario: catch timeout
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn unanswered_catch_returns_zero_promptly() {
        let (device, _factory, handles) = connected_device().await;

        let started = std::time::Instant::now();
        let value = device.catch_mouse_left().await;
        assert_eq!(value, 0);
        assert!(started.elapsed() < Duration::from_millis(150));

        // No stale pending entry survives: a fresh catch with a scripted
        // answer resolves normally.
        handle_at(&handles, 1).expect(b"km.catch_mr()\n", b"3\n");
        assert_eq!(device.catch_mouse_right().await, 3);

        device.disconnect().await;
    }

    // -----------------------------------------------------------------
    // Scenario: disconnect race, exactly-once callback
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn monitor_detects_dead_device_and_fires_callback_once() {
        let (device, _factory, handles) = connected_device().await;
        let drops = Arc::new(AtomicUsize::new(0));
        device.set_connection_callback({
            let drops = drops.clone();
            move |connected| {
                if !connected {
                    drops.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        handle_at(&handles, 1).set_alive(false);
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(!device.is_connected());
        assert_eq!(device.status(), ConnectionStatus::Disconnected);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_racing_monitor_fires_callback_exactly_once() {
        let (device, _factory, handles) = connected_device().await;
        let drops = Arc::new(AtomicUsize::new(0));
        device.set_connection_callback({
            let drops = drops.clone();
            move |connected| {
                if !connected {
                    drops.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        // Kill the device and immediately race a user disconnect against
        // the monitor's detection.
        handle_at(&handles, 1).set_alive(false);
        device.disconnect().await;
        tokio::time::sleep(Duration::from_millis(700)).await;

        assert!(!device.is_connected());
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        // A second disconnect is a no-op.
        device.disconnect().await;
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_fires_callback_with_true() {
        let (factory, _handles) = scripted_factory(&[]);
        let device = DeviceBuilder::new()
            .transport_factory(factory.clone())
            .build();
        let ups = Arc::new(AtomicUsize::new(0));
        device.set_connection_callback({
            let ups = ups.clone();
            move |connected| {
                if connected {
                    ups.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        assert!(device.connect("").await);
        assert_eq!(ups.load(Ordering::SeqCst), 1);
        device.disconnect().await;
    }

    // -----------------------------------------------------------------
    // Scenario: post-disconnect quiescence
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn no_writes_after_disconnect() {
        let (device, _factory, handles) = connected_device().await;
        let link = handle_at(&handles, 1);
        device.disconnect().await;

        let written_before = link.sent().len();
        assert!(!device.mouse_move(1, 1).await);
        assert!(!device.click(MouseButton::Left).await);
        assert_eq!(device.catch_mouse_left().await, 0);
        assert_eq!(device.get_version().await, "");
        assert_eq!(link.sent().len(), written_before);
    }

    // -----------------------------------------------------------------
    // Baud-rate changes
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn set_baud_rate_clamps_into_supported_range() {
        let (device, factory, handles) = connected_device().await;

        // 10_000 clamps up to the initial rate.
        assert!(device.set_baud_rate(10_000, false).await);
        let opens = factory.opens();
        assert_eq!(opens.last().unwrap(), &("MOCK0".to_string(), INITIAL_BAUD_RATE));

        // The old 4M link saw the handshake frame for the clamped rate.
        let old_link = handle_at(&handles, 1);
        assert_eq!(
            old_link.sent().last().unwrap(),
            &protocol::baud_change_frame(INITIAL_BAUD_RATE).to_vec()
        );
        assert!(device.is_connected());
        device.disconnect().await;
    }

    #[tokio::test]
    async fn failed_validation_recovers_initial_baud_rate() {
        // Transports opened at 2M stay silent, so validation fails there.
        let (factory, _handles) = scripted_factory(&[2_000_000]);
        let device = DeviceBuilder::new()
            .transport_factory(factory.clone())
            .build();
        assert!(device.connect("").await);

        assert!(!device.set_baud_rate(2_000_000, true).await);

        // Open sequence: connect (115200, 4M), change (2M), recovery (115200).
        let bauds: Vec<u32> = factory.opens().iter().map(|(_, b)| *b).collect();
        assert_eq!(
            bauds,
            vec![INITIAL_BAUD_RATE, OPERATIONAL_BAUD_RATE, 2_000_000, INITIAL_BAUD_RATE]
        );

        // Still connected, now at the initial rate.
        assert!(device.is_connected());
        assert_eq!(device.status(), ConnectionStatus::Connected);
        device.disconnect().await;
    }

    // -----------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn lock_commands_update_the_cache_optimistically() {
        let (device, _factory, handles) = connected_device().await;
        let link = handle_at(&handles, 1);
        link.clear_sent();

        assert!(!device.is_x_locked());
        assert!(device.lock_x(true).await);
        assert!(device.is_x_locked());
        assert!(device.lock_side2(true).await);
        assert!(device.lock_x(false).await);
        assert!(!device.is_x_locked());
        assert!(device.is_side2_locked());

        assert_eq!(
            link.sent(),
            vec![
                b"km.lock_mx(1)\n".to_vec(),
                b"km.lock_ms2(1)\n".to_vec(),
                b"km.lock_mx(0)\n".to_vec(),
            ]
        );

        let states = device.all_lock_states();
        assert_eq!(states.len(), 7);
        assert_eq!(states["SIDE2"], true);
        assert_eq!(states["X"], false);

        // Disconnect invalidates the cache.
        device.disconnect().await;
        assert!(!device.is_side2_locked());
        assert!(device.all_lock_states().values().all(|&locked| !locked));
    }

    // -----------------------------------------------------------------
    // Serial spoofing
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn serial_read_spoof_and_reset() {
        let (device, _factory, handles) = connected_device().await;
        let link = handle_at(&handles, 1);
        link.expect(b"km.serial()\n", b"SN-12345\n");

        assert_eq!(device.get_mouse_serial().await, "SN-12345");

        link.clear_sent();
        assert!(device.set_mouse_serial("it's\n").await);
        assert!(device.reset_mouse_serial().await);
        assert_eq!(
            link.sent(),
            vec![
                b"km.serial('it\\'s\\n')\n".to_vec(),
                b"km.serial(0)\n".to_vec(),
            ]
        );
        device.disconnect().await;
    }

    // -----------------------------------------------------------------
    // Monitoring toggle, modes, sequences
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn button_monitoring_toggle_tracks_state() {
        let (device, _factory, handles) = connected_device().await;
        assert!(device.is_button_monitoring_enabled());

        assert!(device.enable_button_monitoring(false).await);
        assert!(!device.is_button_monitoring_enabled());
        assert_eq!(
            handle_at(&handles, 1).sent().last().unwrap(),
            &b"km.buttons(0)\n".to_vec()
        );
        device.disconnect().await;
    }

    #[tokio::test]
    async fn click_sequence_and_move_pattern() {
        let (device, _factory, handles) = connected_device().await;
        let link = handle_at(&handles, 1);
        link.clear_sent();

        assert!(
            device
                .click_sequence(
                    &[MouseButton::Left, MouseButton::Right],
                    Duration::from_millis(1),
                )
                .await
        );
        assert!(device.move_pattern(&[(1, 1), (2, 2)], true, 5).await);

        assert_eq!(
            link.sent(),
            vec![
                b"km.left(1)\n".to_vec(),
                b"km.left(0)\n".to_vec(),
                b"km.right(1)\n".to_vec(),
                b"km.right(0)\n".to_vec(),
                b"km.move(1,1,5)\n".to_vec(),
                b"km.move(2,2,5)\n".to_vec(),
            ]
        );
        device.disconnect().await;
    }

    #[tokio::test]
    async fn high_performance_mode_flag() {
        let device = Device::new();
        assert!(!device.is_high_performance_mode_enabled());
        device.enable_high_performance_mode(true);
        assert!(device.is_high_performance_mode_enabled());
    }

    #[tokio::test]
    async fn connect_async_resolves_to_connect_result() {
        let (factory, _handles) = scripted_factory(&[]);
        let device = DeviceBuilder::new()
            .transport_factory(factory.clone())
            .build();

        assert!(device.connect_async("").await.unwrap());
        assert!(device.is_connected());
        device.disconnect().await;
    }

    // -----------------------------------------------------------------
    // ButtonState
    // -----------------------------------------------------------------

    #[test]
    fn button_state_reconstructs_mask_from_events() {
        let state = ButtonState::new();
        for byte in [0x01u8, 0x03, 0x02, 0x12, 0x10, 0x00] {
            state.handle_byte(byte);
            assert_eq!(state.mask(), byte & BUTTON_BITS);
        }
    }

    #[test]
    fn button_state_reports_only_changed_buttons() {
        let state = ButtonState::new();
        let events: Arc<Mutex<Vec<(MouseButton, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        *state.callback.lock().unwrap() = Some(Arc::new({
            let events = events.clone();
            move |button, pressed| events.lock().unwrap().push((button, pressed))
        }));

        // LEFT down, LEFT+RIGHT down, LEFT up, all up.
        state.handle_byte(0x01);
        state.handle_byte(0x03);
        state.handle_byte(0x02);
        state.handle_byte(0x00);
        // Repeat of the current state produces nothing.
        state.handle_byte(0x00);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                (MouseButton::Left, true),
                (MouseButton::Right, true),
                (MouseButton::Left, false),
                (MouseButton::Right, false),
            ]
        );
    }

    #[test]
    fn button_state_ignores_bits_above_side2() {
        let state = ButtonState::new();
        state.handle_byte(0xE1);
        assert_eq!(state.mask(), 0x01);
    }

    // -----------------------------------------------------------------
    // parse_decimal_byte
    // -----------------------------------------------------------------

    #[test]
    fn parse_decimal_byte_variants() {
        assert_eq!(parse_decimal_byte("0"), 0);
        assert_eq!(parse_decimal_byte("127"), 127);
        assert_eq!(parse_decimal_byte(">>> 42"), 42);
        assert_eq!(parse_decimal_byte("garbage"), 0);
        assert_eq!(parse_decimal_byte(""), 0);
        assert_eq!(parse_decimal_byte("999"), 0);
    }
}
