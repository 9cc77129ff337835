//! Transport capability: the abstract byte link the engine sits on.

/// Static description of the underlying link.
pub struct ComDescription {
    /// Clocked links (SPI-like) simultaneously clock a byte in on every send;
    /// `Transport::send_byte` returns that byte. Non-clocked links (UART-like)
    /// always return `None` from `send_byte`.
    pub is_master_slave: bool,
}

pub trait Transport {
    fn describe(&self) -> ComDescription;

    /// Transmits one byte. On a master-slave link, returns the byte the peer
    /// clocked in simultaneously; otherwise returns `None`.
    fn send_byte(&self, byte: u8) -> Option<u8>;

    /// Pulls the next received byte, if one is available yet.
    fn receive_byte(&self) -> Option<u8>;
}
