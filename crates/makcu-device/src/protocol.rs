//! Byte-stream framing and the binary baud-change frame.
//!
//! The device multiplexes two kinds of traffic on one serial link:
//!
//! - **Text responses**: ASCII lines terminated by LF or CR LF.
//! - **Button events**: a single raw byte whose low 5 bits are the
//!   current state of LEFT..SIDE2, emitted whenever the physical button
//!   state changes.
//!
//! [`Framer`] separates the two incrementally. Classification rule: a
//! byte that arrives while a partial line is buffered is text; otherwise
//! a byte outside printable ASCII is a button-mask byte. Button values
//! only use the low 5 bits (0x00..=0x1F), so they can never be mistaken
//! for printable text, and the device never emits a printable byte
//! outside a line. LF and CR act as terminators only mid-line; with
//! nothing buffered they are button masks like any other non-printable
//! byte (0x0A = RIGHT+SIDE1, 0x0D = LEFT+MIDDLE+SIDE1). This tolerates
//! bursts and interleaving: a button event landing between two responses
//! is routed out-of-band without consuming a response slot.

use bytes::BytesMut;

/// One demultiplexed unit from the incoming byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A button-mask byte (low 5 bits = LEFT..SIDE2).
    Button(u8),
    /// A complete text line, terminator stripped.
    Line(String),
}

/// Incremental splitter for the device's mixed button/text byte stream.
#[derive(Debug, Default)]
pub struct Framer {
    line: BytesMut,
}

impl Framer {
    pub fn new() -> Self {
        Framer {
            line: BytesMut::with_capacity(256),
        }
    }

    /// Feed received bytes, returning the events they complete.
    ///
    /// Incomplete line data is buffered for the next call. An LF or CR
    /// with no partial line buffered is delivered as a button byte, not
    /// swallowed as a blank line: 0x0A and 0x0D are valid button masks.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<FrameEvent> {
        let mut events = Vec::new();
        for &b in bytes {
            match b {
                b'\n' if !self.line.is_empty() => {
                    events.push(FrameEvent::Line(self.take_line()));
                }
                _ if !self.line.is_empty() => {
                    // Mid-line, everything is text until the terminator.
                    self.line.extend_from_slice(&[b]);
                }
                0x20..=0x7E => {
                    self.line.extend_from_slice(&[b]);
                }
                _ => events.push(FrameEvent::Button(b)),
            }
        }
        events
    }

    /// Whether a partial line is currently buffered.
    pub fn has_partial_line(&self) -> bool {
        !self.line.is_empty()
    }

    /// Complete the buffered line, stripping the CR of a CR LF pair.
    ///
    /// Only called with a non-empty buffer, and the buffer only starts
    /// with a printable byte, so the result is never empty.
    fn take_line(&mut self) -> String {
        if self.line.last() == Some(&b'\r') {
            self.line.truncate(self.line.len() - 1);
        }
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        line
    }
}

/// Build the binary baud-change command frame.
///
/// Little-endian layout:
///
/// ```text
/// 0xDE 0xAD          header
/// 0x05 0x00          payload length (5)
/// 0xA5               opcode "set baud"
/// B0 B1 B2 B3        32-bit baud rate, little-endian
/// ```
///
/// After sending this, the host must close the port and reopen it at the
/// new rate within roughly 50 ms.
pub fn baud_change_frame(baud: u32) -> [u8; 9] {
    let b = baud.to_le_bytes();
    [0xDE, 0xAD, 0x05, 0x00, 0xA5, b[0], b[1], b[2], b[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------
    // Line framing
    // -----------------------------------------------------------------

    #[test]
    fn complete_line_lf() {
        let mut framer = Framer::new();
        let events = framer.push(b"km.MAKCU v3.2\n");
        assert_eq!(events, vec![FrameEvent::Line("km.MAKCU v3.2".into())]);
        assert!(!framer.has_partial_line());
    }

    #[test]
    fn complete_line_crlf() {
        let mut framer = Framer::new();
        let events = framer.push(b"127\r\n");
        assert_eq!(events, vec![FrameEvent::Line("127".into())]);
    }

    #[test]
    fn line_split_across_reads() {
        let mut framer = Framer::new();
        assert!(framer.push(b"km.MAK").is_empty());
        assert!(framer.has_partial_line());
        let events = framer.push(b"CU v3.2\r\n");
        assert_eq!(events, vec![FrameEvent::Line("km.MAKCU v3.2".into())]);
    }

    #[test]
    fn crlf_split_across_reads() {
        let mut framer = Framer::new();
        assert!(framer.push(b"ok\r").is_empty());
        assert_eq!(framer.push(b"\n"), vec![FrameEvent::Line("ok".into())]);
    }

    // -----------------------------------------------------------------
    // Button classification
    // -----------------------------------------------------------------

    #[test]
    fn button_byte_while_idle() {
        let mut framer = Framer::new();
        let events = framer.push(&[0x02]);
        assert_eq!(events, vec![FrameEvent::Button(0x02)]);
    }

    #[test]
    fn zero_byte_is_a_button_release() {
        let mut framer = Framer::new();
        assert_eq!(framer.push(&[0x00]), vec![FrameEvent::Button(0x00)]);
    }

    #[test]
    fn terminator_valued_masks_while_idle_are_button_bytes() {
        // 0x0A (RIGHT+SIDE1) and 0x0D (LEFT+MIDDLE+SIDE1) collide with LF
        // and CR; with no partial line they are button events, not blank
        // lines.
        let mut framer = Framer::new();
        assert_eq!(framer.push(&[0x0A]), vec![FrameEvent::Button(0x0A)]);
        assert_eq!(framer.push(&[0x0D]), vec![FrameEvent::Button(0x0D)]);
    }

    #[test]
    fn terminator_valued_masks_between_lines() {
        let mut framer = Framer::new();
        let events = framer.push(b"ok\n\x0Amid\r\n\x0Dmore\n");
        assert_eq!(
            events,
            vec![
                FrameEvent::Line("ok".into()),
                FrameEvent::Button(0x0A),
                FrameEvent::Line("mid".into()),
                FrameEvent::Button(0x0D),
                FrameEvent::Line("more".into()),
            ]
        );
    }

    #[test]
    fn button_byte_between_lines() {
        let mut framer = Framer::new();
        let events = framer.push(b"ok\n\x1Fmore\n");
        assert_eq!(
            events,
            vec![
                FrameEvent::Line("ok".into()),
                FrameEvent::Button(0x1F),
                FrameEvent::Line("more".into()),
            ]
        );
    }

    #[test]
    fn non_printable_byte_inside_partial_line_is_text() {
        // A byte received while a line is buffered is always text.
        let mut framer = Framer::new();
        assert!(framer.push(b"ab").is_empty());
        let events = framer.push(&[0x02, b'c', b'\n']);
        assert_eq!(events, vec![FrameEvent::Line("ab\u{2}c".into())]);
    }

    #[test]
    fn burst_of_button_events() {
        let mut framer = Framer::new();
        let events = framer.push(&[0x01, 0x03, 0x0A, 0x0D, 0x02, 0x00]);
        assert_eq!(
            events,
            vec![
                FrameEvent::Button(0x01),
                FrameEvent::Button(0x03),
                FrameEvent::Button(0x0A),
                FrameEvent::Button(0x0D),
                FrameEvent::Button(0x02),
                FrameEvent::Button(0x00),
            ]
        );
    }

    // -----------------------------------------------------------------
    // Baud-change frame
    // -----------------------------------------------------------------

    #[test]
    fn baud_frame_layout() {
        // 4,000,000 = 0x003D0900
        assert_eq!(
            baud_change_frame(4_000_000),
            [0xDE, 0xAD, 0x05, 0x00, 0xA5, 0x00, 0x09, 0x3D, 0x00]
        );
    }

    #[test]
    fn baud_frame_little_endian() {
        assert_eq!(
            baud_change_frame(115_200),
            [0xDE, 0xAD, 0x05, 0x00, 0xA5, 0x00, 0xC2, 0x01, 0x00]
        );
        assert_eq!(
            baud_change_frame(0x0403_0201),
            [0xDE, 0xAD, 0x05, 0x00, 0xA5, 0x01, 0x02, 0x03, 0x04]
        );
    }
}
