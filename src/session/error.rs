use thiserror::Error;

use crate::muxer::MuxError;
use statestream_serde::WireError;

/// Errors that can occur while saving to or replaying from a session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Operation attempted on a closed stream, or one opened the wrong way
    #[error("Session stream is closed for this operation. Open it with a mode that permits it")]
    StreamClosed,

    /// Entity kind not found in the registry
    #[error("Kind {kind} is not registered. Register it with KindRegistry::register() before replaying")]
    UnknownKind {
        kind: u16,
    },

    /// An operation was not recognized by the type chain
    #[error("Operation {op} on kind {kind} was not recognized by the addressed type or the base operations")]
    UnknownOpcode {
        kind: u16,
        op: u16,
    },

    /// A handle that was never created was referenced
    #[error("Handle {handle} does not map to a live entity in this session")]
    DanglingHandle {
        handle: i32,
    },

    /// The handle table is bound to an entity of the wrong kind
    #[error("Handle {handle} is bound to kind {actual}, expected kind {expected}. The handle table is corrupt")]
    KindMismatch {
        handle: i32,
        expected: u16,
        actual: u16,
    },

    /// Buffer multiplexer failure
    #[error("Log multiplexer error: {0}")]
    Mux(#[from] MuxError),

    /// Wire encode/decode failure
    #[error("Wire format error: {0}")]
    Wire(#[from] WireError),
}

impl SessionError {
    /// Errors local to one replay iteration: logged and skipped, not fatal.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            SessionError::UnknownOpcode { .. }
                | SessionError::DanglingHandle { .. }
                | SessionError::UnknownKind { .. }
        )
    }
}
