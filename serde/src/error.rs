use thiserror::Error;

/// Errors that can occur while encoding or decoding wire data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Ran out of bytes while decoding
    #[error("Unexpected end of wire data: needed {needed} more bytes, {remaining} available")]
    UnexpectedEnd {
        needed: usize,
        remaining: usize,
    },

    /// The sink refused part of a write
    #[error("Wire sink accepted only {written} of {requested} bytes")]
    ShortWrite {
        written: usize,
        requested: usize,
    },

    /// A decoded string length field was out of range
    #[error("String length {length} exceeds the wire maximum of {max} bytes")]
    StringTooLong {
        length: usize,
        max: usize,
    },

    /// A decoded string was not valid UTF-8
    #[error("String payload is not valid UTF-8")]
    BadString,

    /// A decoded sequence length field was out of range
    #[error("Sequence length {length} exceeds the wire maximum of {max}")]
    SequenceTooLong {
        length: usize,
        max: usize,
    },
}
