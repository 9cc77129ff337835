//! Runs the engine as the master of a clocked (SPI-like) link against a
//! small simulated peripheral. The peripheral only needs to answer the
//! three calls `Context::transmit` actually inspects the return value of
//! (the first EOF, the second EOF, and each DUMMY clock) -- every other
//! `send_byte` call's return value is discarded by the engine, so the
//! peripheral can treat those as one-way writes. It decodes the frame with
//! the same stuff-byte rule the receive state machine uses (PAYLD) so
//! it can validate the CRC and answer ACK/NACK for real.

use evomin::{Application, ComDescription, Config, Context, Reply, Transport};
use evomin::{ACK, DUMMY, NACK, SOF};
use log::info;
use std::cell::{Cell, RefCell};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    Sof1,
    Sof2,
    Sof3,
    Cmd,
    Len,
    Payload,
    Crc,
    WaitEof,
    WaitEof2,
    Dummy,
    FinalAck,
}

struct Peripheral {
    stage: Cell<Stage>,
    command: Cell<u8>,
    expected_len: Cell<u8>,
    payload: RefCell<Vec<u8>>,
    last_byte: Cell<u8>,
    last_byte_was_stuff: Cell<bool>,
    crc_received: Cell<u8>,
    answer: RefCell<Vec<u8>>,
}

impl Peripheral {
    fn new() -> Self {
        Peripheral {
            stage: Cell::new(Stage::Sof1),
            command: Cell::new(0),
            expected_len: Cell::new(0),
            payload: RefCell::new(Vec::new()),
            last_byte: Cell::new(0),
            last_byte_was_stuff: Cell::new(false),
            crc_received: Cell::new(0),
            answer: RefCell::new(Vec::new()),
        }
    }

    fn reset(&self) {
        self.stage.set(Stage::Sof1);
        self.payload.borrow_mut().clear();
        self.last_byte.set(0);
        self.last_byte_was_stuff.set(false);
    }

    /// Feeds one master-clocked byte in and decides what goes back on the
    /// same clock, mirroring the receive state machine's PAYLD decode rules.
    fn clock(&self, byte: u8) -> Option<u8> {
        match self.stage.get() {
            Stage::Sof1 => {
                self.stage.set(Stage::Sof2);
                None
            }
            Stage::Sof2 => {
                self.stage.set(Stage::Sof3);
                None
            }
            Stage::Sof3 => {
                self.command.set(byte);
                self.stage.set(Stage::Len);
                None
            }
            Stage::Len => {
                self.expected_len.set(byte);
                self.payload.borrow_mut().clear();
                self.last_byte.set(0);
                self.last_byte_was_stuff.set(false);
                if byte == 0 {
                    self.stage.set(Stage::Crc);
                } else {
                    self.stage.set(Stage::Payload);
                }
                None
            }
            Stage::Payload => {
                if self.last_byte_was_stuff.get() {
                    self.last_byte_was_stuff.set(false);
                    self.last_byte.set(evomin::STUFF);
                    return None;
                }
                if byte == SOF && self.last_byte.get() == SOF {
                    self.last_byte_was_stuff.set(true);
                }
                self.payload.borrow_mut().push(byte);
                self.last_byte.set(byte);
                if self.payload.borrow().len() == self.expected_len.get() as usize {
                    self.stage.set(Stage::Crc);
                }
                None
            }
            Stage::Crc => {
                self.crc_received.set(byte);
                self.stage.set(Stage::WaitEof);
                None
            }
            Stage::WaitEof => {
                let expected = evomin::crc::frame_crc8(
                    self.command.get(),
                    self.expected_len.get(),
                    &self.payload.borrow(),
                );
                if self.crc_received.get() == expected {
                    // Stage an answer: echo the payload back reversed.
                    let mut answer = self.payload.borrow().clone();
                    answer.reverse();
                    *self.answer.borrow_mut() = answer;
                    self.stage.set(Stage::WaitEof2);
                    Some(ACK)
                } else {
                    self.reset();
                    Some(NACK)
                }
            }
            Stage::WaitEof2 => {
                self.stage.set(Stage::Dummy);
                Some(self.answer.borrow().len() as u8)
            }
            Stage::Dummy => {
                debug_assert_eq!(byte, DUMMY);
                let mut answer = self.answer.borrow_mut();
                let reply = if answer.is_empty() { 0 } else { answer.remove(0) };
                if answer.is_empty() {
                    self.stage.set(Stage::FinalAck);
                }
                Some(reply)
            }
            Stage::FinalAck => {
                self.reset();
                None
            }
        }
    }
}

impl Transport for Peripheral {
    fn describe(&self) -> ComDescription {
        ComDescription {
            is_master_slave: true,
        }
    }

    fn send_byte(&self, byte: u8) -> Option<u8> {
        let response = self.clock(byte);
        info!(target: "peripheral", "clock in=0x{:02x} out={:?}", byte, response);
        response
    }

    fn receive_byte(&self) -> Option<u8> {
        // This demo only exercises the master's outgoing path; the
        // peripheral never initiates a frame of its own.
        None
    }
}

struct QuietApp;

impl Application for QuietApp {
    fn frame_received(&self, _command: u8, _payload: &[u8], _reply: &mut Reply) {}
    fn reply_received(&self, bytes: &[u8]) {
        println!("reply_received: {:?}", bytes);
    }
}

fn main() {
    env_logger::init();

    let peripheral = Peripheral::new();
    let app = QuietApp;
    let mut config = Config::default();
    config.interface.resend_min_time_ms = 0;
    let mut ctx = Context::new("master_slave", &peripheral, &app, config);

    ctx.send(0xCD, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    // `transmit` runs entirely inside one `poll`: the peripheral answers
    // each checkpoint byte synchronously as it is clocked in.
    ctx.poll();

    println!("frames left queued: {}", ctx.queued_frame_count());
}
