//! Protocol engine: owns the receive state machine, the send
//! queue, and the transmit procedure.

use std::collections::VecDeque;

use log::{debug, trace, warn};

use crate::buffer::ByteBuffer;
use crate::frame::{self, Frame, ACK, DUMMY, EOF, NACK, SOF};
use crate::interface::Transport;
use crate::state::RxState;
use crate::Config;
use crate::Error;

/// Narrow capability handed to `Application::frame_received`: the only way
/// to mutate the in-flight frame's answer buffer.
pub struct Reply<'f> {
    buffer: &'f mut ByteBuffer,
}

impl<'f> Reply<'f> {
    pub fn reply(&mut self, bytes: &[u8]) -> Result<(), crate::buffer::BufferError> {
        for &b in bytes {
            self.buffer.push(b as i32)?;
        }
        Ok(())
    }
}

pub trait Application {
    /// Invoked exactly once per successfully reassembled frame.
    /// `reply` may only be used from within this call, and only has any
    /// effect on a master-slave link.
    fn frame_received(&self, command: u8, payload: &[u8], reply: &mut Reply);

    /// Invoked once per successful master-slave send cycle that received
    /// answer bytes.
    fn reply_received(&self, bytes: &[u8]);
}

/// The protocol engine. `T` is the transport port, `A` the application
/// upcall target.
pub struct Context<'a, T, A>
where
    T: Transport,
    A: Application,
{
    pub name: String,
    hw_if: &'a T,
    app: &'a A,
    config: Config,

    rx_state: RxState,
    rx_frame: Option<Frame>,

    tx_queue: VecDeque<Frame>,

    awaiting_ack: bool,
    pending_frame: Option<Frame>,
}

impl<'a, T, A> Context<'a, T, A>
where
    T: Transport,
    A: Application,
{
    pub fn new(name: &str, hw_if: &'a T, app: &'a A, config: Config) -> Self {
        Context {
            name: name.to_string(),
            hw_if,
            app,
            config,
            rx_state: RxState::Idle,
            rx_frame: None,
            tx_queue: VecDeque::new(),
            awaiting_ack: false,
            pending_frame: None,
        }
    }

    fn is_master_slave(&self) -> bool {
        self.hw_if.describe().is_master_slave
    }

    /// Builds and enqueues an outgoing frame.
    pub fn send(&mut self, command: u8, payload: &[u8]) -> Result<(), Error> {
        if self.tx_queue.len() >= self.config.interface.max_queued_frames {
            warn!(target: format!("{}", self.name).as_str(), "send queue full, dropping command={}", command);
            return Err(Error::QueueFull);
        }
        let frame = Frame::outgoing(
            command,
            payload,
            self.config.frame.retry_count,
            self.config.frame.buffer_size,
        )
        .map_err(|_| Error::PayloadTooLarge)?;
        debug!(target: format!("{}", self.name).as_str(), "queued command={}, len={}", frame.command, frame.expected_payload_length);
        self.tx_queue.push_back(frame);
        Ok(())
    }

    /// One receive step plus, if due, one transmit attempt.
    pub fn poll(&mut self) {
        self.check_awaiting_ack_timeout();

        if let Some(byte) = self.hw_if.receive_byte() {
            self.step(byte);
        }

        let due = match self.tx_queue.front() {
            Some(frame) => {
                frame::now_ms().saturating_sub(frame.previous_send_timestamp)
                    >= self.config.interface.resend_min_time_ms as u128
            }
            None => false,
        };
        if due {
            self.transmit();
        }
    }

    /// Escapes the non-master-slave awaiting-ack park if the peer never
    /// answers: reuses the retry timer (`resend_min_time`) as the ack-wait
    /// window, so a silent link can't wedge `poll` forever.
    fn check_awaiting_ack_timeout(&mut self) {
        if !self.awaiting_ack {
            return;
        }
        let timed_out = self
            .pending_frame
            .as_ref()
            .map(|frame| {
                frame::now_ms().saturating_sub(frame.previous_send_timestamp)
                    >= self.config.interface.resend_min_time_ms as u128
            })
            .unwrap_or(false);
        if timed_out {
            self.awaiting_ack = false;
            let frame = self
                .pending_frame
                .take()
                .expect("pending_frame must be set while awaiting_ack is true");
            warn!(target: format!("{}", self.name).as_str(), "ack wait timed out (non-master-slave), command={}", frame.command);
            self.retry_or_drop(frame);
        }
    }

    fn step(&mut self, byte: u8) {
        if self.awaiting_ack {
            self.handle_awaiting_ack(byte);
            return;
        }

        trace!(target: format!("{}", self.name).as_str(), "rx byte=0x{:02x} state={:?}", byte, self.rx_state);

        self.rx_state = match self.rx_state {
            RxState::Idle => {
                if byte == SOF {
                    RxState::Sof1
                } else {
                    RxState::Idle
                }
            }
            RxState::Sof1 => {
                if byte == SOF {
                    RxState::Sof2
                } else {
                    warn!(target: format!("{}", self.name).as_str(), "expected second SOF byte, got 0x{:02x}", byte);
                    RxState::Idle
                }
            }
            RxState::Sof2 => {
                if byte == SOF {
                    RxState::Cmd
                } else {
                    warn!(target: format!("{}", self.name).as_str(), "expected third SOF byte, got 0x{:02x}", byte);
                    RxState::Idle
                }
            }
            RxState::Cmd => {
                self.rx_frame = Some(Frame::incoming(
                    byte,
                    self.config.frame.retry_count,
                    self.config.frame.buffer_size,
                ));
                RxState::Len
            }
            RxState::Len => self.step_len(byte),
            RxState::Payld => self.step_payld(byte),
            RxState::Crc => self.step_crc(byte),
            RxState::CrcFail => {
                warn!(target: format!("{}", self.name).as_str(), "CRC8 failed");
                self.rx_frame = None;
                RxState::Idle
            }
            RxState::Eof => self.step_eof(),
            RxState::Reply => self.step_reply(),
            RxState::Error => {
                warn!(target: format!("{}", self.name).as_str(), "framing error");
                if !self.is_master_slave() {
                    self.hw_if.send_byte(NACK);
                }
                self.rx_frame = None;
                RxState::Idle
            }
        };
    }

    fn step_len(&mut self, byte: u8) -> RxState {
        let is_master_slave = self.is_master_slave();
        {
            let frame = self.rx_frame.as_mut().expect("frame created at CMD state");
            frame.expected_payload_length = byte;
        }
        if byte > 0 {
            RxState::Payld
        } else {
            self.rx_frame.as_mut().unwrap().finalize_crc();
            if is_master_slave {
                self.deliver_frame();
            }
            RxState::Crc
        }
    }

    fn step_payld(&mut self, byte: u8) -> RxState {
        let is_master_slave = self.is_master_slave();
        let mut completed = false;
        {
            let frame = self.rx_frame.as_mut().expect("frame present in PAYLD state");
            if frame.last_byte_was_stuff {
                frame.last_byte_was_stuff = false;
                frame.last_byte = frame::STUFF;
                return RxState::Payld;
            }
            if byte == SOF && frame.last_byte == SOF {
                frame.last_byte_was_stuff = true;
            }
            if frame.payload_buffer.push(byte as i32).is_err() {
                return RxState::Error;
            }
            frame.last_byte = byte;
            if frame.payload_buffer.size() == frame.expected_payload_length as usize {
                completed = true;
            }
        }
        if completed {
            self.rx_frame.as_mut().unwrap().finalize_crc();
            if is_master_slave {
                self.deliver_frame();
            }
            RxState::Crc
        } else {
            RxState::Payld
        }
    }

    fn step_crc(&mut self, byte: u8) -> RxState {
        let is_master_slave = self.is_master_slave();
        let frame = self.rx_frame.as_mut().expect("frame present in CRC state");
        if byte == frame.crc8 {
            frame.is_valid = true;
            if is_master_slave {
                self.hw_if.send_byte(ACK);
            }
            RxState::Eof
        } else {
            if is_master_slave {
                self.hw_if.send_byte(NACK);
            }
            RxState::CrcFail
        }
    }

    fn step_eof(&mut self) -> RxState {
        let is_master_slave = self.is_master_slave();
        let is_valid = self.rx_frame.as_ref().map(|f| f.is_valid).unwrap_or(false);
        if !is_valid {
            return RxState::Error;
        }
        if is_master_slave {
            let size = self.rx_frame.as_ref().unwrap().answer_buffer.size() as u8;
            self.hw_if.send_byte(size);
            RxState::Reply
        } else {
            self.hw_if.send_byte(ACK);
            self.deliver_frame();
            self.rx_frame = None;
            RxState::Idle
        }
    }

    fn step_reply(&mut self) -> RxState {
        let frame = self.rx_frame.as_mut().expect("frame present in REPLY state");
        if frame.answer_buffer.size() == 0 {
            self.rx_frame = None;
            return RxState::Idle;
        }
        let byte = frame.answer_buffer.pop().expect("checked non-empty above");
        self.hw_if.send_byte(byte);
        if frame.answer_buffer.size() == 0 {
            self.rx_frame = None;
            RxState::Idle
        } else {
            RxState::Reply
        }
    }

    fn deliver_frame(&mut self) {
        let frame = self.rx_frame.as_mut().expect("frame present for delivery");
        let command = frame.command;
        let payload: Vec<u8> = frame.payload_buffer.iter().copied().collect();
        let mut reply = Reply {
            buffer: &mut frame.answer_buffer,
        };
        debug!(target: format!("{}", self.name).as_str(), "frame_received command={}, len={}", command, payload.len());
        self.app.frame_received(command, &payload, &mut reply);
    }

    fn handle_awaiting_ack(&mut self, byte: u8) {
        self.awaiting_ack = false;
        let mut frame = self
            .pending_frame
            .take()
            .expect("pending_frame must be set while awaiting_ack is true");
        match byte {
            ACK => {
                frame.is_sent = true;
                debug!(target: format!("{}", self.name).as_str(), "frame acked (non-master-slave)");
            }
            NACK => {
                warn!(target: format!("{}", self.name).as_str(), "frame nacked (non-master-slave)");
                self.retry_or_drop(frame);
            }
            other => {
                warn!(target: format!("{}", self.name).as_str(), "unexpected byte 0x{:02x} while awaiting ack", other);
                self.retry_or_drop(frame);
            }
        }
    }

    fn retry_or_drop(&mut self, mut frame: Frame) {
        if frame.retries_left > 1 {
            frame.retries_left -= 1;
            self.tx_queue.push_front(frame);
        } else {
            warn!(target: format!("{}", self.name).as_str(), "retries exhausted, dropping command={}", frame.command);
        }
    }

    /// Transmit procedure, invoked by `poll` when the head frame's
    /// retry timer has elapsed.
    fn transmit(&mut self) {
        let mut frame = match self.tx_queue.pop_front() {
            Some(f) => f,
            None => return,
        };

        if frame.retries_left == 0 {
            warn!(target: format!("{}", self.name).as_str(), "retries exhausted, dropping command={}", frame.command);
            return;
        }

        frame.previous_send_timestamp = frame::now_ms();

        debug!(target: format!("{}", self.name).as_str(), "send command={}, len={}", frame.command, frame.expected_payload_length);

        self.hw_if.send_byte(SOF);
        self.hw_if.send_byte(SOF);
        self.hw_if.send_byte(SOF);
        self.hw_if.send_byte(frame.command);
        self.hw_if.send_byte(frame.expected_payload_length);
        let wire_bytes: Vec<u8> = frame.payload_buffer.iter().copied().collect();
        for b in wire_bytes {
            self.hw_if.send_byte(b);
        }
        self.hw_if.send_byte(frame.crc8);
        let response = self.hw_if.send_byte(EOF);
        let is_master_slave = self.is_master_slave();

        match response {
            Some(ACK) if is_master_slave => {
                let answer_count = self.hw_if.send_byte(EOF).unwrap_or(0);
                let mut reply_buffer = Vec::with_capacity(answer_count as usize);
                for _ in 0..answer_count {
                    if let Some(b) = self.hw_if.send_byte(DUMMY) {
                        reply_buffer.push(b);
                    }
                }
                self.hw_if.send_byte(ACK);
                frame.is_sent = true;
                debug!(target: format!("{}", self.name).as_str(), "reply_received len={}", reply_buffer.len());
                self.app.reply_received(&reply_buffer);
            }
            Some(NACK) if is_master_slave => {
                self.hw_if.send_byte(NACK);
                self.retry_or_drop(frame);
            }
            _ if is_master_slave => {
                warn!(target: format!("{}", self.name).as_str(), "unexpected master-slave response, treating as nack");
                self.retry_or_drop(frame);
            }
            _ => {
                self.awaiting_ack = true;
                self.pending_frame = Some(frame);
            }
        }
    }

    /// Test/diagnostic helper: number of frames currently queued to send.
    pub fn queued_frame_count(&self) -> usize {
        self.tx_queue.len()
    }

    /// Test/diagnostic helper: command of the frame at the head of the send queue.
    pub fn head_command(&self) -> Option<u8> {
        self.tx_queue.front().map(|f| f.command)
    }

    /// Resets the receive state machine and drops any in-flight incoming frame.
    pub fn reset(&mut self) {
        self.rx_state = RxState::Idle;
        self.rx_frame = None;
    }

    pub fn rx_state(&self) -> RxState {
        self.rx_state
    }

    /// Exposes the byte-processing entry point directly, for tests that
    /// drive the state machine without a real transport loop.
    #[cfg(test)]
    pub(crate) fn step_for_test(&mut self, byte: u8) {
        self.step(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::ComDescription;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct NullApp;
    impl Application for NullApp {
        fn frame_received(&self, _command: u8, _payload: &[u8], _reply: &mut Reply) {}
        fn reply_received(&self, _bytes: &[u8]) {}
    }

    struct NullTransport {
        is_master_slave: bool,
        rx: RefCell<VecDeque<u8>>,
    }

    impl Transport for NullTransport {
        fn describe(&self) -> ComDescription {
            ComDescription {
                is_master_slave: self.is_master_slave,
            }
        }
        fn send_byte(&self, _byte: u8) -> Option<u8> {
            None
        }
        fn receive_byte(&self) -> Option<u8> {
            self.rx.borrow_mut().pop_front()
        }
    }

    #[test]
    fn reset_clears_in_flight_frame_and_returns_to_idle() {
        let transport = NullTransport {
            is_master_slave: false,
            rx: RefCell::new(VecDeque::new()),
        };
        let app = NullApp;
        let mut ctx = Context::new("t", &transport, &app, Config::default());
        ctx.step_for_test(SOF);
        ctx.step_for_test(SOF);
        assert_eq!(ctx.rx_state(), RxState::Sof2);
        ctx.reset();
        assert_eq!(ctx.rx_state(), RxState::Idle);
    }

    #[test]
    fn send_enqueues_and_respects_queue_capacity() {
        let transport = NullTransport {
            is_master_slave: false,
            rx: RefCell::new(VecDeque::new()),
        };
        let app = NullApp;
        let mut config = Config::default();
        config.interface.max_queued_frames = 1;
        let mut ctx = Context::new("t", &transport, &app, config);
        ctx.send(0xCD, &[]).unwrap();
        assert_eq!(ctx.send(0xCD, &[]), Err(crate::Error::QueueFull));
    }
}
