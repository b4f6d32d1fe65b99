use statestream_serde::{Wire, WireError, WireRead, WireWrite};

/// Small stable identifier for a serializable entity type.
///
/// Kinds are 1:1 with a factory in the [`KindRegistry`](crate::KindRegistry)
/// and occupy the high 16 bits of every packed opcode. Values must stay below
/// [`EntityKind::MAX_VALUE`] so packed opcodes can never collide with the
/// full-word stream commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityKind(u16);

impl EntityKind {
    pub const MAX_VALUE: u16 = 0x07FF;

    pub const fn new(value: u16) -> Self {
        assert!(value <= Self::MAX_VALUE);
        Self(value)
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

/// Per-session integer identity for a previously-emitted object.
///
/// Positive and unique within one session. Zero means "unassigned".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(i32);

impl Handle {
    pub const NONE: Handle = Handle(0);

    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn is_some(self) -> bool {
        self.0 > 0
    }
}

impl Wire for Handle {
    fn ser(&self, writer: &mut dyn WireWrite) -> Result<(), WireError> {
        self.0.ser(writer)
    }

    fn de(reader: &mut dyn WireRead) -> Result<Self, WireError> {
        Ok(Self(i32::de(reader)?))
    }
}

/// Packed (kind, operation) pair: one 4-byte word at the head of every opcode.
///
/// The kind is used for validation and tracing only; dispatch goes through the
/// addressed entity's [`Streamable::dispatch`](crate::Streamable::dispatch).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Opcode {
    pub kind: EntityKind,
    pub op: u16,
}

impl Opcode {
    pub fn new(kind: EntityKind, op: u16) -> Self {
        Self { kind, op }
    }

    pub fn pack(self) -> u32 {
        ((self.kind.value() as u32) << 16) | self.op as u32
    }

    pub fn unpack(word: u32) -> Self {
        Self {
            kind: EntityKind((word >> 16) as u16 & EntityKind::MAX_VALUE),
            op: word as u16,
        }
    }
}

impl Wire for Opcode {
    fn ser(&self, writer: &mut dyn WireWrite) -> Result<(), WireError> {
        self.pack().ser(writer)
    }

    fn de(reader: &mut dyn WireRead) -> Result<Self, WireError> {
        Ok(Self::unpack(u32::de(reader)?))
    }
}

/// One of the fixed set of independent logical logs multiplexed over the
/// shared buffer pool. The kinds differ only in their flush/replay semantics:
///
/// - `Priority`: remote-only. Never replayed locally; buffers are discarded
///   after the forwarding step whether or not forwarding is enabled.
/// - `Update`: property changes already applied locally. Forwarded to remote
///   peers, never replayed locally.
/// - `Event`: always retained for local replay, optionally forwarded.
/// - `Deferred`: commands destined for a different local consumer, optionally
///   forwarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogKind {
    Priority,
    Update,
    Event,
    Deferred,
}

impl LogKind {
    pub const COUNT: usize = 4;
    pub const ALL: [LogKind; Self::COUNT] = [
        LogKind::Priority,
        LogKind::Update,
        LogKind::Event,
        LogKind::Deferred,
    ];

    pub fn index(self) -> usize {
        match self {
            LogKind::Priority => 0,
            LogKind::Update => 1,
            LogKind::Event => 2,
            LogKind::Deferred => 3,
        }
    }
}

/// Session open mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

impl OpenMode {
    pub fn writable(self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::ReadWrite)
    }

    pub fn readable(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_packs_kind_high_op_low() {
        let opcode = Opcode::new(EntityKind::new(0x0042), 0x0107);
        assert_eq!(opcode.pack(), 0x0042_0107);
        assert_eq!(Opcode::unpack(0x0042_0107), opcode);
    }

    #[test]
    fn handle_zero_is_unassigned() {
        assert!(!Handle::NONE.is_some());
        assert!(!Handle::new(-3).is_some());
        assert!(Handle::new(1).is_some());
    }
}
