use std::any::Any;

/// Tag reserved for name attributes.
pub const NAME_TAG: u32 = 1;

/// First tag value available to applications.
pub const USER_TAG: u32 = 16;

/// A typed metadata value attachable to an entity.
///
/// Attributes extend an entity with application data without widening the
/// base type. They are local bookkeeping: attributes are never serialized or
/// shipped to remote peers.
pub trait Attr: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Identifies one attribute slot on an entity. At most one attribute with a
/// given (tag, key) may be attached at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttrKey {
    pub tag: u32,
    pub key: u32,
}

impl AttrKey {
    pub fn new(tag: u32, key: u32) -> Self {
        Self { tag, key }
    }
}

/// An attribute plus its ownership marker.
///
/// Ownership of the boxed value transfers to the entity on attach. When a
/// colliding (tag, key) evicts an entry, the old value is dropped — unless
/// `caller_owned` is set, in which case it is handed back to the caller
/// instead of being destroyed.
pub struct AttrEntry {
    pub caller_owned: bool,
    pub value: Box<dyn Attr>,
}

impl AttrEntry {
    pub fn new(value: Box<dyn Attr>) -> Self {
        Self {
            caller_owned: false,
            value,
        }
    }

    pub fn caller_owned(value: Box<dyn Attr>) -> Self {
        Self {
            caller_owned: true,
            value,
        }
    }
}

/// String name attached to an entity.
///
/// Key 0 is the primary name used to identify the entity in a distributed
/// scene; other keys hold secondary names.
pub struct NameAttr(pub String);

impl Attr for NameAttr {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
