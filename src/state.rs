//! Receive state machine states.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    Idle,
    Sof1,
    Sof2,
    Cmd,
    Len,
    Payld,
    Crc,
    CrcFail,
    Eof,
    Reply,
    Error,
}

impl Default for RxState {
    fn default() -> Self {
        RxState::Idle
    }
}
