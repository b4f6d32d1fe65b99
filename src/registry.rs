use std::collections::HashMap;

use crate::{entity::streamable::EntityRef, types::EntityKind};

/// Factory producing an empty entity of one kind, ready to receive replayed
/// operations.
pub type EntityFactory = fn() -> EntityRef;

struct KindEntry {
    name: &'static str,
    factory: EntityFactory,
}

/// Maps entity kinds to factories and display names.
///
/// The registry is an ordinary, inspectable map populated by explicit
/// [`register`](KindRegistry::register) calls at startup; sessions use it to
/// instantiate objects whose concrete type is only known at replay time.
pub struct KindRegistry {
    entries: HashMap<EntityKind, KindEntry>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a kind. Registering the same kind twice is a programming
    /// error and panics.
    pub fn register(&mut self, kind: EntityKind, name: &'static str, factory: EntityFactory) {
        if self.entries.contains_key(&kind) {
            panic!("Kind {} is already registered. Check first.", kind.value());
        }
        self.entries.insert(kind, KindEntry { name, factory });
    }

    /// Instantiate an empty entity of the given kind. Returns `None` for an
    /// unregistered kind; the caller must treat this as "cannot materialize".
    pub fn create(&self, kind: EntityKind) -> Option<EntityRef> {
        self.entries.get(&kind).map(|entry| (entry.factory)())
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn name_of(&self, kind: EntityKind) -> Option<&'static str> {
        self.entries.get(&kind).map(|entry| entry.name)
    }

    pub fn kind_named(&self, name: &str) -> Option<EntityKind> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(kind, _)| *kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::group::Group;

    #[test]
    fn create_fails_for_unregistered_kind() {
        let registry = KindRegistry::new();
        assert!(registry.create(EntityKind::new(99)).is_none());
    }

    #[test]
    fn registered_kind_is_inspectable() {
        let mut registry = KindRegistry::new();
        Group::register(&mut registry);

        assert!(registry.contains(Group::KIND));
        assert_eq!(registry.name_of(Group::KIND), Some("Group"));
        assert_eq!(registry.kind_named("Group"), Some(Group::KIND));

        let entity = registry.create(Group::KIND).expect("factory registered");
        assert_eq!(entity.core().kind(), Group::KIND);
    }

    #[test]
    #[should_panic]
    fn duplicate_registration_panics() {
        let mut registry = KindRegistry::new();
        Group::register(&mut registry);
        Group::register(&mut registry);
    }
}
