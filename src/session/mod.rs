mod base_op;
mod command;
mod error;
mod event;
mod handle_map;
mod name_map;
#[allow(clippy::module_inception)]
mod session;

pub use base_op::{BaseOp, BASE_OP_LIMIT};
pub use command::{
    CMD_BEGIN, CMD_END, CMD_EVENT, CMD_NOOP, CMD_VERSION, CMD_VEC_SIZE, DEFAULT_VEC_SIZE,
    PROTOCOL_VERSION,
};
pub use error::SessionError;
pub use event::{Event, MAX_EVENT_ARGS};
pub use session::{LoadContext, OpSource, SaveMode, Saver, Session};
