/// Universal operations available to every entity kind.
///
/// The load driver intercepts `Create` and `Delete`; the rest are applied by
/// the terminal base handler after a type's own dispatch declines them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum BaseOp {
    Create = 1,
    SetName = 2,
    Copy = 3,
    Delete = 4,
    Describe = 5,
    SetNameKey = 6,
    SetActive = 7,
    SetFlags = 8,
}

/// First operation id available to concrete kinds; everything below is
/// reserved for the base protocol.
pub const BASE_OP_LIMIT: u16 = 20;

impl BaseOp {
    pub fn op(self) -> u16 {
        self as u16
    }

    pub fn from_op(op: u16) -> Option<BaseOp> {
        match op {
            1 => Some(BaseOp::Create),
            2 => Some(BaseOp::SetName),
            3 => Some(BaseOp::Copy),
            4 => Some(BaseOp::Delete),
            5 => Some(BaseOp::Describe),
            6 => Some(BaseOp::SetNameKey),
            7 => Some(BaseOp::SetActive),
            8 => Some(BaseOp::SetFlags),
            _ => None,
        }
    }
}
