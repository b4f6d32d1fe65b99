//! Entity lifetime flags.
//!
//! The low bits travel on the wire with the base SetFlags operation; the high
//! bits are session bookkeeping and are never serialized.

/// Entity state has changed since the last synchronization point.
pub const CHANGED: u32 = 1 << 0;
/// Entity is disabled; traversals skip it.
pub const INACTIVE: u32 = 1 << 1;
/// Entity wants events dispatched to it during replay.
pub const WANTS_EVENTS: u32 = 1 << 2;

/// Entity is transferred to remote peers on full-scene requests.
pub const SHARED: u32 = 1 << 12;
/// Updates to the entity are logged and forwarded after transfer.
pub const GLOBAL: u32 = 1 << 13;
/// Entity has been emitted to the current output stream.
pub const SAVED: u32 = 1 << 14;
/// Entity is not owned by its attachment points.
pub const NO_FREE: u32 = 1 << 15;

/// Flags that never survive a copy or a wire round trip.
pub const TRANSIENT: u32 = NO_FREE | GLOBAL | SHARED | SAVED;

/// Flags eligible for the base SetFlags opcode during save.
pub const SERIALIZED: u32 = INACTIVE | WANTS_EVENTS;
