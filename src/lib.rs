//! # evomin
//! evomin is a small framed byte-oriented protocol for connecting a
//! microcontroller to a peer over SPI, UART, or I2C. A sender packages a
//! command and an optional payload into a frame with synchronization bytes,
//! a length, a CRC, and stuff-byte escaping; a receiver reassembles frames
//! one byte at a time through a state machine and acknowledges, or on a
//! master-slave (clocked) link replies with a short answer buffer.

//! ## Example
//! ```
//! use evomin::{Application, ComDescription, Config, Context, Reply, Transport};
//! use std::cell::RefCell;
//!
//! struct LoggingApp;
//!
//! impl Application for LoggingApp {
//!     fn frame_received(&self, command: u8, payload: &[u8], _reply: &mut Reply) {
//!         println!("frame command=0x{:02x} payload={:?}", command, payload);
//!     }
//!
//!     fn reply_received(&self, bytes: &[u8]) {
//!         println!("reply={:?}", bytes);
//!     }
//! }
//!
//! struct LoopbackUart {
//!     rx: RefCell<std::collections::VecDeque<u8>>,
//! }
//!
//! impl Transport for LoopbackUart {
//!     fn describe(&self) -> ComDescription {
//!         ComDescription { is_master_slave: false }
//!     }
//!
//!     fn send_byte(&self, byte: u8) -> Option<u8> {
//!         self.rx.borrow_mut().push_back(byte);
//!         None
//!     }
//!
//!     fn receive_byte(&self) -> Option<u8> {
//!         self.rx.borrow_mut().pop_front()
//!     }
//! }
//!
//! let uart = LoopbackUart { rx: RefCell::new(std::collections::VecDeque::new()) };
//! let app = LoggingApp;
//! let mut ctx = Context::new("demo", &uart, &app, Config::default());
//! ctx.send(0xCD, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
//! for _ in 0..32 {
//!     ctx.poll();
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod context;
pub mod crc;
pub mod error;
pub mod frame;
pub mod interface;
pub mod state;

pub use buffer::{BufferError, ByteBuffer};
pub use config::{Config, FrameConfig, InterfaceConfig, LoggingConfig};
pub use context::{Application, Context, Reply};
pub use error::Error;
pub use frame::{command, Frame, ACK, DUMMY, EOF, NACK, SOF, STUFF};
pub use interface::{ComDescription, Transport};
pub use state::RxState;
