use std::{collections::HashMap, sync::Arc};

use crate::entity::streamable::EntityRef;

/// Name dictionary: maps string names to entities for later lookup, so a
/// replayed stream (or a different merged stream) can resolve objects by
/// name instead of only by handle.
pub(crate) struct NameMap {
    inner: HashMap<String, EntityRef>,
}

impl NameMap {
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Associate a name with an entity, displacing any previous binding.
    pub fn define(&mut self, name: &str, entity: &EntityRef) {
        self.inner.insert(name.to_string(), entity.clone());
    }

    pub fn undefine(&mut self, name: &str) -> Option<EntityRef> {
        self.inner.remove(name)
    }

    /// Exact lookup, or first wildcard match when the name contains `*`.
    pub fn find(&self, name: &str) -> Option<EntityRef> {
        if !name.contains('*') {
            return self.inner.get(name).cloned();
        }
        self.inner
            .iter()
            .find(|(candidate, _)| wildcard_match(name, candidate))
            .map(|(_, entity)| entity.clone())
    }

    /// All entities whose names match the pattern; `*` matches any run of
    /// characters. An empty pattern returns every named entity.
    pub fn find_all(&self, pattern: &str) -> Vec<EntityRef> {
        self.inner
            .iter()
            .filter(|(name, _)| pattern.is_empty() || wildcard_match(pattern, name))
            .map(|(_, entity)| entity.clone())
            .collect()
    }

    /// Drop bindings that reference the given entity.
    pub fn forget(&mut self, entity: &EntityRef) {
        self.inner.retain(|_, bound| !Arc::ptr_eq(bound, entity));
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Glob-style match where `*` matches any (possibly empty) run.
pub(crate) fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((star_p, star_n)) = star {
            // backtrack: let the last star absorb one more character
            p = star_p + 1;
            n = star_n + 1;
            star = Some((star_p, star_n + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::group::Group;

    fn entity() -> EntityRef {
        Arc::new(Group::new())
    }

    #[test]
    fn wildcard_matching() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("scene.*", "scene.root"));
        assert!(wildcard_match("*.path", "camera.path"));
        assert!(wildcard_match("*cam*", "scene.camera.path"));
        assert!(!wildcard_match("*.path", "camera.route"));
        assert!(!wildcard_match("scene", "scene.root"));
        assert!(wildcard_match("scene", "scene"));
    }

    #[test]
    fn define_replaces_previous_binding() {
        let mut names = NameMap::new();
        let a = entity();
        let b = entity();
        names.define("root", &a);
        names.define("root", &b);
        assert_eq!(names.len(), 1);
        assert!(Arc::ptr_eq(&names.find("root").unwrap(), &b));
    }

    #[test]
    fn find_all_filters_by_pattern() {
        let mut names = NameMap::new();
        names.define("scene.root", &entity());
        names.define("scene.camera", &entity());
        names.define("ui.root", &entity());

        assert_eq!(names.find_all("scene.*").len(), 2);
        assert_eq!(names.find_all("*.root").len(), 2);
        assert_eq!(names.find_all("").len(), 3);
    }
}
