//! # Statestream
//! Distributed object infrastructure: turns live, mutable object state into
//! a replayable, self-describing byte stream that can be shipped to other
//! execution contexts without blocking producers, and replays such streams
//! back into mutations on live objects.
//!
//! Three layers make up the core: the entity/attribute model (stable
//! identity plus thread-safe metadata), the protocol engine (handle
//! assignment, object-graph deduplication, typed operation dispatch) and the
//! concurrent log multiplexer (opcodes batched into reusable fixed-size
//! buffers across four independent logical logs).

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use statestream_serde::{
    ser_str, ByteReader, ByteWriter, Wire, WireError, WireRead, WireWrite, MAX_STRING_BYTES,
};

mod entity;
mod muxer;
mod registry;
mod session;
mod types;

pub use entity::{
    attributes::{Attr, AttrEntry, AttrKey, NameAttr, NAME_TAG, USER_TAG},
    core::EntityCore,
    flag,
    group::Group,
    streamable::{copy_base, describe_base, Dispatch, EntityRef, Streamable},
};
pub use muxer::{
    BufState, BufferSink, FlushOptions, LogMux, LogReader, MuxConfig, MuxError, OpWriter,
};
pub use registry::{EntityFactory, KindRegistry};
pub use session::{
    BaseOp, Event, LoadContext, OpSource, SaveMode, Saver, Session, SessionError,
    BASE_OP_LIMIT, CMD_BEGIN, CMD_END, CMD_EVENT, CMD_NOOP, CMD_VERSION, CMD_VEC_SIZE,
    DEFAULT_VEC_SIZE, MAX_EVENT_ARGS, PROTOCOL_VERSION,
};
pub use types::{EntityKind, Handle, LogKind, Opcode, OpenMode};
