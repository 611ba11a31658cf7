//! Command batching.
//!
//! A [`BatchBuilder`] accumulates prerendered command strings and sends
//! them back-to-back, skipping per-call connection checks and rendering
//! on the submission path.
//!
//! The builder holds a weak token to its owning device rather than a
//! strong handle: every builder method checks the token and becomes a
//! no-op once the device is gone, and `execute()` re-checks before
//! writing. Commands with invalid arguments are skipped at build time,
//! mirroring the host-side validation of the direct methods.

use std::sync::Weak;

use tracing::debug;

use makcu_core::types::MouseButton;

use crate::commands;
use crate::device::Inner;

/// Accumulates prerendered commands for back-to-back submission.
///
/// Created by [`Device::batch`](crate::Device::batch).
pub struct BatchBuilder {
    device: Weak<Inner>,
    commands: Vec<String>,
}

impl BatchBuilder {
    pub(crate) fn new(device: Weak<Inner>) -> Self {
        BatchBuilder {
            device,
            commands: Vec::new(),
        }
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn alive(&self) -> bool {
        self.device.strong_count() > 0
    }

    fn queue(&mut self, command: Option<String>) {
        match command {
            Some(command) => self.commands.push(command),
            None => debug!("skipping invalid batch command"),
        }
    }

    /// Queue a relative move.
    pub fn move_by(mut self, x: i32, y: i32) -> Self {
        if self.alive() {
            self.queue(commands::cmd_move(x, y).ok());
        }
        self
    }

    /// Queue a smooth move.
    pub fn move_smooth(mut self, x: i32, y: i32, segments: u32) -> Self {
        if self.alive() {
            self.queue(commands::cmd_move_smooth(x, y, segments).ok());
        }
        self
    }

    /// Queue a Bezier move.
    pub fn move_bezier(mut self, x: i32, y: i32, segments: u32, ctrl_x: i32, ctrl_y: i32) -> Self {
        if self.alive() {
            self.queue(commands::cmd_move_bezier(x, y, segments, ctrl_x, ctrl_y).ok());
        }
        self
    }

    /// Queue a button press.
    pub fn press(mut self, button: MouseButton) -> Self {
        if let Some(inner) = self.device.upgrade() {
            self.queue(inner.cache().press(button).map(str::to_string));
        }
        self
    }

    /// Queue a button release.
    pub fn release(mut self, button: MouseButton) -> Self {
        if let Some(inner) = self.device.upgrade() {
            self.queue(inner.cache().release(button).map(str::to_string));
        }
        self
    }

    /// Queue a press and a release.
    pub fn click(self, button: MouseButton) -> Self {
        self.press(button).release(button)
    }

    /// Queue a wheel scroll.
    pub fn scroll(mut self, delta: i32) -> Self {
        if self.alive() {
            self.queue(commands::cmd_wheel(delta).ok());
        }
        self
    }

    /// Queue a drag: press, move, release.
    pub fn drag(self, button: MouseButton, x: i32, y: i32) -> Self {
        self.press(button).move_by(x, y).release(button)
    }

    /// Queue a smooth drag.
    pub fn drag_smooth(self, button: MouseButton, x: i32, y: i32, segments: u32) -> Self {
        self.press(button).move_smooth(x, y, segments).release(button)
    }

    /// Queue a Bezier drag.
    pub fn drag_bezier(
        self,
        button: MouseButton,
        x: i32,
        y: i32,
        segments: u32,
        ctrl_x: i32,
        ctrl_y: i32,
    ) -> Self {
        self.press(button)
            .move_bezier(x, y, segments, ctrl_x, ctrl_y)
            .release(button)
    }

    /// Send every queued command as fire-and-forget, in order.
    ///
    /// Stops at the first failed write and returns `false`; commands
    /// already sent are not rolled back. Returns `false` if the owning
    /// device has been dropped or disconnected.
    pub async fn execute(self) -> bool {
        let Some(inner) = self.device.upgrade() else {
            return false;
        };
        if !inner.is_live() {
            return false;
        }
        let Some(handle) = inner.dispatcher_handle().await else {
            return false;
        };
        for command in &self.commands {
            if let Err(e) = handle.send(command).await {
                debug!(command = %command, error = %e, "batch stopped at failed send");
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DeviceBuilder;
    use crate::device::Device;
    use makcu_test_harness::{MockFactory, MockHandle, MockTransport};
    use std::sync::{Arc, Mutex};

    async fn connected_device() -> (Device, Arc<Mutex<Vec<MockHandle>>>) {
        let factory = MockFactory::new().with_candidate("MOCK0");
        let handles: Arc<Mutex<Vec<MockHandle>>> = Arc::new(Mutex::new(Vec::new()));
        factory.on_open({
            let handles = handles.clone();
            move |port, _baud| {
                let (transport, handle) = MockTransport::new(port);
                handle.expect(b"km.version()\n", b"km.MAKCU v3.2\n");
                handles.lock().unwrap().push(handle);
                Ok(Box::new(transport))
            }
        });
        let device = DeviceBuilder::new().transport_factory(factory).build();
        assert!(device.connect("").await);
        (device, handles)
    }

    fn link(handles: &Arc<Mutex<Vec<MockHandle>>>) -> MockHandle {
        handles.lock().unwrap()[1].clone()
    }

    #[tokio::test]
    async fn batch_sends_commands_in_order() {
        let (device, handles) = connected_device().await;
        let link = link(&handles);
        link.clear_sent();

        let ok = device
            .batch()
            .move_by(10, 10)
            .click(MouseButton::Left)
            .scroll(-2)
            .execute()
            .await;
        assert!(ok);

        assert_eq!(
            link.sent(),
            vec![
                b"km.move(10,10)\n".to_vec(),
                b"km.left(1)\n".to_vec(),
                b"km.left(0)\n".to_vec(),
                b"km.wheel(-2)\n".to_vec(),
            ]
        );
        device.disconnect().await;
    }

    #[tokio::test]
    async fn drag_expands_to_three_commands() {
        let (device, _handles) = connected_device().await;
        let batch = device.batch().drag(MouseButton::Right, 5, 5);
        assert_eq!(batch.len(), 3);
        device.disconnect().await;
    }

    #[tokio::test]
    async fn invalid_arguments_are_skipped_at_build_time() {
        let (device, _handles) = connected_device().await;
        let batch = device.batch().move_by(100_000, 0).move_by(1, 1);
        assert_eq!(batch.len(), 1);
        device.disconnect().await;
    }

    #[tokio::test]
    async fn execute_stops_at_first_failed_send() {
        let (device, handles) = connected_device().await;
        let link = link(&handles);

        // Allow exactly one more write, then fail.
        link.fail_sends_after(link.sent().len() + 1);
        link.clear_sent();

        let ok = device
            .batch()
            .move_by(1, 1)
            .move_by(2, 2)
            .move_by(3, 3)
            .execute()
            .await;
        assert!(!ok);
        // Only the first command made it onto the wire; nothing was
        // rolled back or retried.
        assert_eq!(link.sent(), vec![b"km.move(1,1)\n".to_vec()]);

        device.disconnect().await;
    }

    #[tokio::test]
    async fn builder_methods_are_noops_after_device_drop() {
        let (device, _handles) = connected_device().await;
        let batch = device.batch();
        device.disconnect().await;
        drop(device);

        let batch = batch.move_by(1, 1).click(MouseButton::Left);
        assert!(batch.is_empty());
        assert!(!batch.execute().await);
    }

    #[tokio::test]
    async fn execute_fails_when_disconnected() {
        let (device, _handles) = connected_device().await;
        let batch = device.batch().move_by(1, 1);
        device.disconnect().await;
        assert!(!batch.execute().await);
    }
}
