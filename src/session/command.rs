//! Stream commands: full-word magics interleaved with packed opcodes.
//!
//! Every magic keeps its high 16 bits above [`EntityKind::MAX_VALUE`]
//! (0x07FF), so a stream command can never be mistaken for a packed
//! (kind, op) word.

/// Version of the binary protocol produced by this crate.
pub const PROTOCOL_VERSION: i32 = 1;

/// Default number of floats in a position/normal vector (geometry width).
pub const DEFAULT_VEC_SIZE: i32 = 3;

/// Skip word; emitted nowhere but tolerated everywhere.
pub const CMD_NOOP: u32 = 0;
/// Establish protocol version. Operand: version (i32).
pub const CMD_VERSION: u32 = 0x1111_1111;
/// Begin a packet. Operand: stream id (i32).
pub const CMD_BEGIN: u32 = 0x5555_5555;
/// End of packet; stops the current load.
pub const CMD_END: u32 = 0x6666_6666;
/// A logged event follows.
pub const CMD_EVENT: u32 = 0x0888_8888;
/// Establish geometry vector width. Operand: float count (i32).
pub const CMD_VEC_SIZE: u32 = 0xAAAA_AAAA;
