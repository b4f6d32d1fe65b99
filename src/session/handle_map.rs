use std::{collections::VecDeque, sync::Arc};

use log::warn;

use crate::{
    entity::{flag, streamable::EntityRef},
    types::Handle,
};

/// Handle table: maps per-session handles to live entities.
///
/// Handles are positive indices into the slot table; freed handles are
/// recycled. Detaching clears the entity's SAVED flag so it can be emitted
/// again on a later stream.
pub(crate) struct HandleMap {
    slots: Vec<Option<EntityRef>>,
    recycled: VecDeque<i32>,
    max_handle: i32,
}

impl HandleMap {
    pub fn new() -> Self {
        Self {
            slots: vec![None],
            recycled: VecDeque::new(),
            max_handle: 0,
        }
    }

    pub fn max_handle(&self) -> Handle {
        Handle::new(self.max_handle)
    }

    pub fn get(&self, handle: Handle) -> Option<EntityRef> {
        let raw = handle.raw();
        if raw <= 0 {
            return None;
        }
        self.slots.get(raw as usize).and_then(|slot| slot.clone())
    }

    /// Attach an entity, reusing its existing handle when it is already in
    /// this table. Returns the handle.
    pub fn attach(&mut self, entity: &EntityRef) -> Handle {
        let id = entity.core().id();
        if id.is_some() {
            if let Some(slot) = self.slots.get(id.raw() as usize) {
                if let Some(existing) = slot {
                    if Arc::ptr_eq(existing, entity) {
                        return id;
                    }
                }
            }
        }
        let handle = self.next_handle();
        self.place(entity, handle);
        entity.core().set_id(handle);
        handle
    }

    /// Attach at a specific handle (replay side, where the stream chose the
    /// handle).
    pub fn attach_at(&mut self, entity: &EntityRef, handle: Handle) -> Handle {
        if !handle.is_some() {
            return self.attach(entity);
        }
        self.place(entity, handle);
        if !entity.core().id().is_some() {
            entity.core().set_id(handle);
        }
        if handle.raw() > self.max_handle {
            self.max_handle = handle.raw();
        }
        handle
    }

    fn place(&mut self, entity: &EntityRef, handle: Handle) {
        let index = handle.raw() as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        if let Some(previous) = &self.slots[index] {
            if !Arc::ptr_eq(previous, entity) {
                warn!("handle {} rebound to a different entity", handle.raw());
            }
        }
        self.slots[index] = Some(entity.clone());
    }

    fn next_handle(&mut self) -> Handle {
        while let Some(candidate) = self.recycled.pop_front() {
            let free = self
                .slots
                .get(candidate as usize)
                .map(|slot| slot.is_none())
                .unwrap_or(false);
            if free {
                return Handle::new(candidate);
            }
        }
        self.max_handle += 1;
        Handle::new(self.max_handle)
    }

    /// Detach the entity at the handle; the handle becomes reusable and the
    /// entity's save status is reset.
    pub fn detach(&mut self, handle: Handle) -> Option<EntityRef> {
        let raw = handle.raw();
        if raw <= 0 || raw as usize >= self.slots.len() {
            return None;
        }
        let removed = self.slots[raw as usize].take();
        if let Some(entity) = &removed {
            entity.core().clear_flags(flag::SAVED);
            if entity.core().id() == handle {
                entity.core().set_id(Handle::NONE);
            }
            self.recycled.push_back(raw);
        }
        removed
    }

    /// Detach everything; every entity's save status and id are reset.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(entity) = slot.take() {
                entity.core().clear_flags(flag::SAVED);
                entity.core().set_id(Handle::NONE);
            }
        }
        self.slots.clear();
        self.slots.push(None);
        self.recycled.clear();
        self.max_handle = 0;
    }
}
