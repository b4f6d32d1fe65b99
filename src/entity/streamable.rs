use std::sync::Arc;

use crate::{
    entity::{core::EntityCore, flag},
    session::{Event, LoadContext, Saver, SessionError},
    types::Handle,
};

/// Shared, thread-safe reference to a live streamable entity.
///
/// The session's handle table and name dictionary hold strong references;
/// the reference count is the `Arc` strong count, and an entity is freed when
/// the last reference is released.
pub type EntityRef = Arc<dyn Streamable>;

/// Result of offering an operation to a type's dispatch handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// Fall through to the universal base operations; if those do not know
    /// the operation either, the session reports an unknown opcode.
    Unhandled,
}

/// An object whose state can be emitted to and replayed from a session.
///
/// The session drives the base part of both directions: on save it performs
/// the dedup check, assigns the handle, emits the create/name/flag opcodes
/// and only then calls [`save_body`](Streamable::save_body); on load it
/// resolves the handle and offers each operation to
/// [`dispatch`](Streamable::dispatch) before falling back to the base
/// operations. Implementations therefore only describe the state they own.
pub trait Streamable: Send + Sync {
    fn core(&self) -> &EntityCore;

    /// Concrete-type access for same-kind operations such as copy.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Emit one opcode per piece of owned state, each carrying `handle` so
    /// the reader can locate the right live instance. Composite types
    /// recurse into children via [`Saver::save`] here.
    fn save_body(&self, handle: Handle, saver: &Saver) -> Result<(), SessionError> {
        let _ = (handle, saver);
        Ok(())
    }

    /// Apply a type-specific operation, consuming its operands from the
    /// context. Return [`Dispatch::Unhandled`] for anything unrecognized.
    fn dispatch(&self, op: u16, ctx: &mut LoadContext) -> Result<Dispatch, SessionError> {
        let _ = (op, ctx);
        Ok(Dispatch::Unhandled)
    }

    /// Copy another entity's state into this one. Overrides should copy
    /// their own fields and then call [`copy_base`].
    fn copy_from(&self, src: &EntityRef) -> bool {
        copy_base(self.core(), src.core())
    }

    /// One-line human-readable description, used by the Describe operation.
    fn describe(&self) -> String {
        describe_base(self.core())
    }

    /// React to a replayed event this entity observes.
    fn on_event(&self, event: &Event) -> bool {
        let _ = event;
        false
    }
}

/// Base copy: flags (minus session bookkeeping) and the primary name.
pub fn copy_base(dst: &EntityCore, src: &EntityCore) -> bool {
    dst.set_flags(flag::CHANGED | (src.flags() & !flag::TRANSIENT));
    let name = src.name();
    if name != dst.name() {
        dst.set_name(name.as_deref());
    }
    true
}

/// Base description: kind, handle and primary name.
pub fn describe_base(core: &EntityCore) -> String {
    let id = core.id();
    match core.name() {
        Some(name) => format!(
            "<entity kind='{}' id='{}' name='{}' />",
            core.kind().value(),
            id.raw(),
            name
        ),
        None => format!("<entity kind='{}' id='{}' />", core.kind().value(), id.raw()),
    }
}
