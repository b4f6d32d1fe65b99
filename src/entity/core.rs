use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI32, AtomicU32, Ordering},
        Mutex,
    },
};

use crate::{
    entity::{
        attributes::{Attr, AttrEntry, AttrKey, NameAttr, NAME_TAG},
        flag,
    },
    types::{EntityKind, Handle},
};

/// Identity, lifetime flags and metadata shared by every streamable entity.
///
/// Concrete entity types embed one of these and hand it out through
/// [`Streamable::core`](crate::Streamable::core). Flags and the session id are
/// atomics and need no locking; the attribute map is guarded by its own
/// mutex, and eviction drops the displaced value strictly after the guard
/// scope ends.
pub struct EntityCore {
    kind: EntityKind,
    id: AtomicI32,
    flags: AtomicU32,
    attrs: Mutex<HashMap<AttrKey, AttrEntry>>,
}

impl EntityCore {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            id: AtomicI32::new(0),
            flags: AtomicU32::new(flag::CHANGED),
            attrs: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    // Session id

    pub fn id(&self) -> Handle {
        Handle::new(self.id.load(Ordering::Acquire))
    }

    pub(crate) fn set_id(&self, handle: Handle) {
        self.id.store(handle.raw(), Ordering::Release);
    }

    // Flags

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    pub fn is_set(&self, mask: u32) -> bool {
        self.flags() & mask != 0
    }

    pub fn set_flags(&self, mask: u32) {
        self.flags.fetch_or(mask, Ordering::AcqRel);
    }

    pub fn clear_flags(&self, mask: u32) {
        self.flags.fetch_and(!mask, Ordering::AcqRel);
    }

    pub fn has_changed(&self) -> bool {
        self.is_set(flag::CHANGED)
    }

    pub fn set_changed(&self, changed: bool) {
        if changed {
            self.set_flags(flag::CHANGED);
        } else {
            self.clear_flags(flag::CHANGED);
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_set(flag::INACTIVE)
    }

    pub fn set_active(&self, active: bool) {
        if active {
            self.clear_flags(flag::INACTIVE);
        } else {
            self.set_flags(flag::INACTIVE);
        }
    }

    // Attributes

    /// Attach an attribute, replacing any entry with the same (tag, key).
    ///
    /// The displaced entry, if any, is dropped outside the attribute lock —
    /// or handed back when it was attached caller-owned.
    pub fn add_attr(&self, key: AttrKey, entry: AttrEntry) -> Option<Box<dyn Attr>> {
        let evicted = {
            let mut attrs = self.attrs.lock().expect("attribute lock poisoned");
            attrs.insert(key, entry)
        };
        // the non-caller-owned evicted value drops here, after the guard
        match evicted {
            Some(old) if old.caller_owned => Some(old.value),
            _ => None,
        }
    }

    /// Look at the attribute with the given (tag, key) without letting the
    /// guard escape.
    pub fn with_attr<R>(&self, key: AttrKey, f: impl FnOnce(&dyn Attr) -> R) -> Option<R> {
        let attrs = self.attrs.lock().expect("attribute lock poisoned");
        attrs.get(&key).map(|entry| f(entry.value.as_ref()))
    }

    /// Look at the first attribute carrying `tag`, whatever its key.
    pub fn with_first_attr<R>(&self, tag: u32, f: impl FnOnce(&dyn Attr) -> R) -> Option<R> {
        let attrs = self.attrs.lock().expect("attribute lock poisoned");
        attrs
            .iter()
            .find(|(key, _)| key.tag == tag)
            .map(|(_, entry)| f(entry.value.as_ref()))
    }

    pub fn has_attr(&self, key: AttrKey) -> bool {
        let attrs = self.attrs.lock().expect("attribute lock poisoned");
        attrs.contains_key(&key)
    }

    /// Detach without destroying; the caller takes ownership.
    pub fn remove_attr(&self, key: AttrKey) -> Option<AttrEntry> {
        let mut attrs = self.attrs.lock().expect("attribute lock poisoned");
        attrs.remove(&key)
    }

    /// Detach and destroy, unless the entry was attached caller-owned, in
    /// which case it is handed back instead.
    pub fn delete_attr(&self, key: AttrKey) -> Option<Box<dyn Attr>> {
        let removed = self.remove_attr(key);
        match removed {
            Some(old) if old.caller_owned => Some(old.value),
            _ => None,
        }
    }

    // Names

    /// Primary name (key 0), if any.
    pub fn name(&self) -> Option<String> {
        self.name_keyed(0)
    }

    pub fn name_keyed(&self, key: u32) -> Option<String> {
        self.with_attr(AttrKey::new(NAME_TAG, key), |attr| {
            attr.as_any()
                .downcast_ref::<NameAttr>()
                .map(|name| name.0.clone())
        })
        .flatten()
        .filter(|name| !name.is_empty())
    }

    /// Set or clear the primary name.
    pub fn set_name(&self, name: Option<&str>) {
        self.set_name_keyed(name, 0);
    }

    pub fn set_name_keyed(&self, name: Option<&str>, key: u32) {
        let attr_key = AttrKey::new(NAME_TAG, key);
        match name {
            Some(name) => {
                self.add_attr(attr_key, AttrEntry::new(Box::new(NameAttr(name.to_string()))));
            }
            None => {
                self.delete_attr(attr_key);
            }
        }
    }

    /// All names on this entity as (key, name) pairs, primary name first.
    pub fn names(&self) -> Vec<(u32, String)> {
        let attrs = self.attrs.lock().expect("attribute lock poisoned");
        let mut names: Vec<(u32, String)> = attrs
            .iter()
            .filter(|(key, _)| key.tag == NAME_TAG)
            .filter_map(|(key, entry)| {
                entry
                    .value
                    .as_any()
                    .downcast_ref::<NameAttr>()
                    .map(|name| (key.key, name.0.clone()))
            })
            .collect();
        names.sort_by_key(|(key, _)| *key);
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DropCounter(std::sync::Arc<AtomicUsize>);

    impl Attr for DropCounter {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn core() -> EntityCore {
        EntityCore::new(EntityKind::new(7))
    }

    #[test]
    fn colliding_attr_leaves_exactly_one_entry() {
        let core = core();
        let key = AttrKey::new(5, 0);
        core.add_attr(key, AttrEntry::new(Box::new(NameAttr("first".into()))));
        core.add_attr(key, AttrEntry::new(Box::new(NameAttr("second".into()))));

        let seen = core.with_attr(key, |attr| {
            attr.as_any().downcast_ref::<NameAttr>().unwrap().0.clone()
        });
        assert_eq!(seen, Some("second".to_string()));
    }

    #[test]
    fn evicted_attr_is_dropped_unless_caller_owned() {
        let drops = std::sync::Arc::new(AtomicUsize::new(0));
        let core = core();
        let key = AttrKey::new(5, 1);

        core.add_attr(key, AttrEntry::new(Box::new(DropCounter(drops.clone()))));
        let returned = core.add_attr(key, AttrEntry::new(Box::new(NameAttr("new".into()))));
        assert!(returned.is_none());
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        let kept = std::sync::Arc::new(AtomicUsize::new(0));
        core.add_attr(key, AttrEntry::caller_owned(Box::new(DropCounter(kept.clone()))));
        let returned = core.add_attr(key, AttrEntry::new(Box::new(NameAttr("newer".into()))));
        assert_eq!(kept.load(Ordering::SeqCst), 0);
        let held = returned.expect("caller-owned attribute handed back");
        drop(held);
        assert_eq!(kept.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_detaches_without_destroying() {
        let drops = std::sync::Arc::new(AtomicUsize::new(0));
        let core = core();
        let key = AttrKey::new(6, 0);

        core.add_attr(key, AttrEntry::new(Box::new(DropCounter(drops.clone()))));
        let detached = core.remove_attr(key).expect("attribute present");
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert!(!core.has_attr(key));
        drop(detached);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_attr_lookup_ignores_the_key() {
        let core = core();
        core.add_attr(
            AttrKey::new(9, 3),
            AttrEntry::new(Box::new(NameAttr("keyed".into()))),
        );

        let found = core.with_first_attr(9, |attr| {
            attr.as_any().downcast_ref::<NameAttr>().unwrap().0.clone()
        });
        assert_eq!(found, Some("keyed".to_string()));
        assert_eq!(core.with_first_attr(10, |_| ()), None);
    }

    #[test]
    fn names_are_keyed() {
        let core = core();
        core.set_name(Some("root"));
        core.set_name_keyed(Some("alias"), 3);

        assert_eq!(core.name(), Some("root".to_string()));
        assert_eq!(core.name_keyed(3), Some("alias".to_string()));
        assert_eq!(
            core.names(),
            vec![(0, "root".to_string()), (3, "alias".to_string())]
        );

        core.set_name(None);
        assert_eq!(core.name(), None);
    }

    #[test]
    fn flags_default_to_changed() {
        let core = core();
        assert!(core.has_changed());
        assert!(core.is_active());
        core.set_active(false);
        assert!(core.is_set(flag::INACTIVE));
        core.set_active(true);
        assert!(core.is_active());
    }
}
