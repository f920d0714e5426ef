use thiserror::Error;

/// Failures of the wire codec.
///
/// Decoding errors mean the inbound command is discarded; encoding errors
/// mean the outbound event is dropped. Neither touches group state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("packet truncated: needed {needed} more byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("{0} trailing byte(s) after declared layout")]
    TrailingBytes(usize),
    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u64 },
    #[error("value {value} does not fit in {bits} bit(s) for {field}")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        bits: u8,
    },
    #[error("unknown opcode 0x{0:04X}")]
    UnknownOpcode(u16),
    #[error("opcode 0x{0:04X} is not valid in this direction")]
    WrongDirection(u16),
    #[error("string is not valid UTF-8")]
    InvalidString,
}
