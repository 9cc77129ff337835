//! Frame codec: wire constants, stuff-byte insertion, and the `Frame`
//! struct shared by outgoing construction and incoming reassembly.

use crate::buffer::{BufferError, ByteBuffer};
use crate::crc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SOF: u8 = 0xAA;
pub const EOF: u8 = 0x55;
pub const STUFF: u8 = 0x55;
pub const ACK: u8 = 0xFF;
pub const NACK: u8 = 0xFE;
pub const DUMMY: u8 = 0xF0;

pub mod command {
    pub const RESERVED: u8 = 0x00;
    /// Identification/echo request; the only non-reserved command the
    /// distilled source names.
    pub const SEND_IDN: u8 = 0xCD;
}

fn clamp_command(command: u8) -> u8 {
    match command {
        command::RESERVED | command::SEND_IDN => command,
        _ => command::RESERVED,
    }
}

/// Inserts a `STUFF` byte after every non-overlapping pair of consecutive
/// `SOF` bytes in `payload`. Symmetric with the PAYLD decode logic
/// in `Context::step_payld`.
pub fn stuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut last_byte = 0u8;
    for &b in payload {
        out.push(b);
        if b == SOF && last_byte == SOF {
            out.push(STUFF);
            last_byte = STUFF;
        } else {
            last_byte = b;
        }
    }
    out
}

pub(crate) fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// One hour in the past: an outgoing frame's first transmit attempt must
/// never wait out `resend_min_time` before its first send.
fn never_sent_timestamp() -> u128 {
    now_ms().saturating_sub(60 * 60 * 1000)
}

pub struct Frame {
    pub command: u8,
    pub payload_buffer: ByteBuffer,
    pub expected_payload_length: u8,
    pub answer_buffer: ByteBuffer,
    pub crc8: u8,
    pub is_valid: bool,
    pub is_sent: bool,
    pub retries_left: u8,
    pub previous_send_timestamp: u128,
    pub last_byte: u8,
    pub last_byte_was_stuff: bool,
}

impl Frame {
    /// Builds an outgoing frame: clamps `command`, stuffs `payload` for the
    /// wire, and computes the CRC over the logical (unstuffed) input. Fails
    /// if the stuffed payload does not fit in `buffer_size` rather than
    /// panicking, so a caller-supplied payload can never crash the engine.
    pub fn outgoing(
        command: u8,
        payload: &[u8],
        retry_count: u8,
        buffer_size: usize,
    ) -> Result<Self, BufferError> {
        let command = clamp_command(command);
        let length = payload.len() as u8;
        let wire_payload = stuff(payload);

        let mut payload_buffer = ByteBuffer::new(buffer_size);
        for &b in &wire_payload {
            payload_buffer.push(b as i32)?;
        }

        Ok(Frame {
            command,
            payload_buffer,
            expected_payload_length: length,
            answer_buffer: ByteBuffer::new(buffer_size),
            crc8: crc::frame_crc8(command, length, payload),
            is_valid: false,
            is_sent: false,
            retries_left: retry_count,
            previous_send_timestamp: never_sent_timestamp(),
            last_byte: 0,
            last_byte_was_stuff: false,
        })
    }

    /// Builds the shell of an incoming frame once the CMD byte has arrived.
    /// The command byte is preserved verbatim, never clamped.
    pub fn incoming(command: u8, retry_count: u8, buffer_size: usize) -> Self {
        Frame {
            command,
            payload_buffer: ByteBuffer::new(buffer_size),
            expected_payload_length: 0,
            answer_buffer: ByteBuffer::new(buffer_size),
            crc8: 0,
            is_valid: false,
            is_sent: false,
            retries_left: retry_count,
            previous_send_timestamp: now_ms(),
            last_byte: 0,
            last_byte_was_stuff: false,
        }
    }

    /// Recomputes `crc8` over `[command, expected_payload_length, logical payload]`
    /// once the payload buffer holds the full logical payload (PAYLD finalize).
    pub fn finalize_crc(&mut self) {
        let payload: Vec<u8> = self.payload_buffer.iter().copied().collect();
        self.crc8 = crc::frame_crc8(self.command, self.expected_payload_length, &payload);
    }
}
