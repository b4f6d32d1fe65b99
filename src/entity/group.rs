use std::sync::Mutex;

use statestream_serde::Wire;

use crate::{
    entity::{
        core::EntityCore,
        streamable::{copy_base, describe_base, Dispatch, EntityRef, Streamable},
    },
    registry::KindRegistry,
    session::{LoadContext, Saver, SessionError, BASE_OP_LIMIT},
    types::{EntityKind, Handle, Opcode},
};

/// Composite entity holding an ordered list of children.
///
/// Groups are the tree-shaped case of the protocol: saving a group recurses
/// into each child's save and emits an attach opcode when the child produced
/// a new representation, so shared children are created once and referenced
/// by handle everywhere else.
pub struct Group {
    core: EntityCore,
    children: Mutex<Vec<EntityRef>>,
}

impl Group {
    pub const KIND: EntityKind = EntityKind::new(2);
    pub const OP_ATTACH: u16 = BASE_OP_LIMIT;

    pub fn new() -> Self {
        Self {
            core: EntityCore::new(Self::KIND),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn register(registry: &mut KindRegistry) {
        registry.register(Self::KIND, "Group", || std::sync::Arc::new(Group::new()));
    }

    pub fn attach_child(&self, child: EntityRef) {
        let mut children = self.children.lock().expect("group lock poisoned");
        children.push(child);
    }

    pub fn children(&self) -> Vec<EntityRef> {
        let children = self.children.lock().expect("group lock poisoned");
        children.clone()
    }

    pub fn child_count(&self) -> usize {
        let children = self.children.lock().expect("group lock poisoned");
        children.len()
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl Streamable for Group {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn save_body(&self, handle: Handle, saver: &Saver) -> Result<(), SessionError> {
        for child in self.children() {
            if let Some(child_handle) = saver.save(&child)? {
                saver.emit(Opcode::new(Self::KIND, Self::OP_ATTACH), |writer| {
                    handle.ser(writer)?;
                    child_handle.ser(writer)
                })?;
            }
        }
        Ok(())
    }

    fn dispatch(&self, op: u16, ctx: &mut LoadContext) -> Result<Dispatch, SessionError> {
        match op {
            Self::OP_ATTACH => {
                let child = ctx.read_entity()?;
                self.attach_child(child);
                Ok(Dispatch::Handled)
            }
            _ => Ok(Dispatch::Unhandled),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn copy_from(&self, src: &EntityRef) -> bool {
        // copies share children rather than duplicating the subtree
        if let Some(group) = src.as_any().downcast_ref::<Group>() {
            let theirs = group.children();
            let mut children = self.children.lock().expect("group lock poisoned");
            *children = theirs;
        }
        copy_base(self.core(), src.core())
    }

    fn describe(&self) -> String {
        format!(
            "{} children={}",
            describe_base(&self.core),
            self.child_count()
        )
    }
}
