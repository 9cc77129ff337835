//! Runs the engine over a plain (non-clocked) loopback link, the way a
//! point-to-point UART would behave: `send_byte` never returns a
//! simultaneously-clocked byte, so an outgoing frame's ACK/NACK has to
//! arrive back through the ordinary receive path.

use evomin::{Application, ComDescription, Config, Context, Reply, Transport, ACK};
use log::info;
use std::cell::RefCell;
use std::collections::VecDeque;

struct LoopbackUart {
    rx: RefCell<VecDeque<u8>>,
}

impl LoopbackUart {
    fn new() -> Self {
        LoopbackUart {
            rx: RefCell::new(VecDeque::new()),
        }
    }

    fn push_incoming(&self, byte: u8) {
        self.rx.borrow_mut().push_back(byte);
    }
}

impl Transport for LoopbackUart {
    fn describe(&self) -> ComDescription {
        ComDescription {
            is_master_slave: false,
        }
    }

    fn send_byte(&self, byte: u8) -> Option<u8> {
        info!(target: "uart", "tx 0x{:02x}", byte);
        None
    }

    fn receive_byte(&self) -> Option<u8> {
        self.rx.borrow_mut().pop_front()
    }
}

struct PrintingApp {
    name: &'static str,
}

impl Application for PrintingApp {
    fn frame_received(&self, command: u8, payload: &[u8], _reply: &mut Reply) {
        println!(
            "{}: frame_received command=0x{:02x} payload={:?}",
            self.name, command, payload
        );
    }

    fn reply_received(&self, _bytes: &[u8]) {}
}

fn main() {
    env_logger::init();

    let uart = LoopbackUart::new();
    let app = PrintingApp { name: "demo" };
    let mut ctx = Context::new("point_to_point", &uart, &app, Config::default());

    // Feed in a hand-built wire frame: command 0xCD, payload DEADBEEF.
    let wire = [0xAA, 0xAA, 0xAA, 0xCD, 0x04, 0xDE, 0xAD, 0xBE, 0xEF, 0x4E, 0x55];
    for &b in &wire {
        uart.push_incoming(b);
    }
    for _ in 0..wire.len() {
        ctx.poll();
    }

    // Queue an outgoing frame of our own. Since the link isn't master-slave,
    // the engine parks in the awaiting-ACK state after transmitting and the
    // peer's ACK has to be fed back in through the normal receive path.
    ctx.send(0xCD, &[0x01, 0x02, 0x03]).unwrap();
    ctx.poll(); // transmits the frame
    uart.push_incoming(ACK);
    ctx.poll(); // observes the ACK, frame leaves the send queue
    println!("frames left queued: {}", ctx.queued_frame_count());
}
