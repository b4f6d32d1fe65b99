use thiserror::Error;

/// Errors that can occur while logging opcodes into the buffer pool
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MuxError {
    /// Every buffer in the pool is checked out or awaiting consumption
    #[error("Buffer pool exhausted: all {limit} buffers are in use. Flush the logs or raise the pool limit")]
    PoolExhausted {
        limit: usize,
    },

    /// A single opcode needs more bytes than one whole buffer holds
    #[error("Opcode of {size} bytes exceeds the buffer capacity of {capacity} bytes. No opcode may span buffers")]
    OversizeOp {
        size: usize,
        capacity: usize,
    },

    /// Write attempted after the multiplexer was closed
    #[error("Log multiplexer is closed")]
    LogClosed,
}
