//! End-to-end scenarios on a non-clocked (plain UART-style) link: S1, S4, S5,
//! the idempotent-reset property, and the non-master-slave awaiting-ACK path.

use evomin::{Application, ComDescription, Config, Context, Reply, Transport, ACK, NACK};
use std::cell::RefCell;
use std::collections::VecDeque;

struct FakePointToPointTransport {
    rx: RefCell<VecDeque<u8>>,
    sent: RefCell<Vec<u8>>,
}

impl FakePointToPointTransport {
    fn new(rx_bytes: &[u8]) -> Self {
        FakePointToPointTransport {
            rx: RefCell::new(rx_bytes.iter().copied().collect()),
            sent: RefCell::new(Vec::new()),
        }
    }

    fn push_incoming(&self, byte: u8) {
        self.rx.borrow_mut().push_back(byte);
    }
}

impl Transport for FakePointToPointTransport {
    fn describe(&self) -> ComDescription {
        ComDescription { is_master_slave: false }
    }

    fn send_byte(&self, byte: u8) -> Option<u8> {
        self.sent.borrow_mut().push(byte);
        None
    }

    fn receive_byte(&self) -> Option<u8> {
        self.rx.borrow_mut().pop_front()
    }
}

#[derive(Default)]
struct CapturingApp {
    frames: RefCell<Vec<(u8, Vec<u8>)>>,
}

impl Application for CapturingApp {
    fn frame_received(&self, command: u8, payload: &[u8], _reply: &mut Reply) {
        self.frames.borrow_mut().push((command, payload.to_vec()));
    }

    fn reply_received(&self, _bytes: &[u8]) {}
}

#[test]
fn s1_minimal_frame_non_master_slave_no_reply_state() {
    let wire = [0xAA, 0xAA, 0xAA, 0xCD, 0x04, 0xDE, 0xAD, 0xBE, 0xEF, 0x4E, 0x55];
    let transport = FakePointToPointTransport::new(&wire);
    let app = CapturingApp::default();
    let mut ctx = Context::new("s1", &transport, &app, Config::default());
    for _ in 0..wire.len() {
        ctx.poll();
    }
    assert_eq!(*app.frames.borrow(), vec![(0xCD, vec![0xDE, 0xAD, 0xBE, 0xEF])]);
    assert_eq!(ctx.rx_state(), evomin::RxState::Idle);
    assert!(transport.sent.borrow().contains(&ACK));
}

#[test]
fn s4_crc_failure_no_nack_on_non_master_slave() {
    let wire = [0xAA, 0xAA, 0xAA, 0xCD, 0x04, 0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x55];
    let transport = FakePointToPointTransport::new(&wire);
    let app = CapturingApp::default();
    let mut ctx = Context::new("s4", &transport, &app, Config::default());
    for _ in 0..wire.len() {
        ctx.poll();
    }
    assert!(app.frames.borrow().is_empty());
    assert!(!transport.sent.borrow().contains(&NACK));
    assert_eq!(ctx.rx_state(), evomin::RxState::Idle);
}

#[test]
fn s5_truncated_sof_run_resets_to_idle() {
    let wire = [0xAA, 0xAA, 0x11];
    let transport = FakePointToPointTransport::new(&wire);
    let app = CapturingApp::default();
    let mut ctx = Context::new("s5", &transport, &app, Config::default());
    for _ in 0..wire.len() {
        ctx.poll();
    }
    assert!(app.frames.borrow().is_empty());
    assert_eq!(ctx.rx_state(), evomin::RxState::Idle);
}

#[test]
fn idempotent_reset_matches_a_fresh_machine() {
    let transport = FakePointToPointTransport::new(&[0xAA, 0xAA]);
    let app = CapturingApp::default();
    let mut ctx = Context::new("reset", &transport, &app, Config::default());
    ctx.poll();
    ctx.poll();
    assert_eq!(ctx.rx_state(), evomin::RxState::Sof2);
    ctx.reset();
    assert_eq!(ctx.rx_state(), evomin::RxState::Idle);

    // A fresh machine fed the same S1 wire trace afterward decodes normally,
    // showing the reset state is indistinguishable from a brand new one.
    for &b in &[0xAA, 0xAA, 0xAA, 0xCD, 0x04, 0xDE, 0xAD, 0xBE, 0xEF, 0x4E, 0x55] {
        transport.push_incoming(b);
        ctx.poll();
    }
    assert_eq!(*app.frames.borrow(), vec![(0xCD, vec![0xDE, 0xAD, 0xBE, 0xEF])]);
}

#[test]
fn awaiting_ack_path_marks_sent_on_ack() {
    // Default (non-zero) resend_min_time_ms so the reinserted/consumed frame
    // in the second poll() isn't immediately retransmitted by the timer gate.
    let transport = FakePointToPointTransport::new(&[]);
    let app = CapturingApp::default();
    let mut ctx = Context::new("ack", &transport, &app, Config::default());
    ctx.send(0xCD, &[0x01]).unwrap();
    ctx.poll(); // transmits; non-master-slave send_byte always returns None, so
                // the engine parks in the awaiting-ack state instead of resolving inline.
    assert_eq!(ctx.queued_frame_count(), 0);

    transport.push_incoming(ACK);
    ctx.poll(); // the ACK arrives through the ordinary receive path
    assert_eq!(ctx.queued_frame_count(), 0);
}

#[test]
fn awaiting_ack_path_retries_on_nack() {
    let transport = FakePointToPointTransport::new(&[]);
    let app = CapturingApp::default();
    let mut ctx = Context::new("nack", &transport, &app, Config::default());
    ctx.send(0xCD, &[0x01]).unwrap();
    ctx.poll(); // transmits, parks awaiting ack

    transport.push_incoming(NACK);
    ctx.poll(); // NACK observed, frame reinserted at head for retry
    assert_eq!(ctx.queued_frame_count(), 1);
    assert_eq!(ctx.head_command(), Some(0xCD));
}
