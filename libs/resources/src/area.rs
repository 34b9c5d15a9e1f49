// This file is part of Nitrogen.
//
// Nitrogen is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Nitrogen is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Nitrogen.  If not, see <http://www.gnu.org/licenses/>.
//
// Area id allocation mirrors `ResourceManager::AllocateArea`/`FreeArea`: a
// free-list over a dense vector, index 0 a permanent `nullptr`-equivalent
// sentinel.
use crate::id::ResourceId;
use parking_lot::Mutex;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AreaId(u32);

impl AreaId {
    pub const INVALID: AreaId = AreaId(0);

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// A group of resources with a coherent load/unload lifecycle (§3.1).
pub struct ResourceArea {
    pub(crate) resources: Vec<ResourceId>,
    pub(crate) loaded_count: usize,
    pub(crate) load_flag: bool,
}

impl ResourceArea {
    fn new(mut resources: Vec<ResourceId>) -> Self {
        resources.sort_by_key(|r| r.raw());
        resources.dedup_by_key(|r| r.raw());
        Self {
            resources,
            loaded_count: 0,
            load_flag: false,
        }
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded_count
    }

    /// An area is ready when every contained resource has finished loading
    /// (Ready or Invalid both count, §8.4 S2).
    pub fn is_ready(&self) -> bool {
        self.loaded_count == self.resources.len()
    }
}

struct Slot {
    area: Option<ResourceArea>,
}

/// Dense vector + free list, behind one mutex (§4.1.7).
pub struct AreaAllocator {
    inner: Mutex<AreaAllocatorInner>,
}

struct AreaAllocatorInner {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl AreaAllocator {
    pub fn new() -> Self {
        // Index 0 is a permanent sentinel: never allocated, never freed.
        let slots = vec![Slot { area: None }];
        Self {
            inner: Mutex::new(AreaAllocatorInner {
                slots,
                free_list: Vec::new(),
            }),
        }
    }

    pub fn allocate(&self, resources: Vec<ResourceId>) -> AreaId {
        let area = ResourceArea::new(resources);
        let mut inner = self.inner.lock();
        if let Some(index) = inner.free_list.pop() {
            inner.slots[index as usize].area = Some(area);
            AreaId::new(index)
        } else {
            let index = inner.slots.len() as u32;
            inner.slots.push(Slot { area: Some(area) });
            AreaId::new(index)
        }
    }

    /// `None` for area 0 or an already-freed slot (§7 InvalidArea — "silent
    /// no-op").
    pub fn free(&self, id: AreaId) {
        if !id.is_valid() {
            return;
        }
        let mut inner = self.inner.lock();
        let idx = id.raw() as usize;
        if idx < inner.slots.len() && inner.slots[idx].area.is_some() {
            inner.slots[idx].area = None;
            inner.free_list.push(id.raw());
        }
    }

    pub fn with_area<R>(&self, id: AreaId, f: impl FnOnce(&ResourceArea) -> R) -> Option<R> {
        if !id.is_valid() {
            return None;
        }
        let inner = self.inner.lock();
        inner
            .slots
            .get(id.raw() as usize)
            .and_then(|s| s.area.as_ref())
            .map(f)
    }

    pub fn with_area_mut<R>(
        &self,
        id: AreaId,
        f: impl FnOnce(&mut ResourceArea) -> R,
    ) -> Option<R> {
        if !id.is_valid() {
            return None;
        }
        let mut inner = self.inner.lock();
        inner
            .slots
            .get_mut(id.raw() as usize)
            .and_then(|s| s.area.as_mut())
            .map(f)
    }

    pub fn is_free(&self, id: AreaId) -> bool {
        if !id.is_valid() {
            return true;
        }
        let inner = self.inner.lock();
        inner
            .slots
            .get(id.raw() as usize)
            .map(|s| s.area.is_none())
            .unwrap_or(true)
    }
}

impl Default for AreaAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_zero_is_permanent_sentinel() {
        let alloc = AreaAllocator::new();
        assert!(alloc.is_free(AreaId::INVALID));
        alloc.free(AreaId::INVALID); // no-op, must not panic
    }

    #[test]
    fn double_create_yields_distinct_equal_lists() {
        let alloc = AreaAllocator::new();
        let r1 = ResourceId::new(crate::id::ResourceTag::Mesh, 1);
        let r2 = ResourceId::new(crate::id::ResourceTag::Mesh, 2);
        let a = alloc.allocate(vec![r1, r1, r2]);
        let b = alloc.allocate(vec![r2, r1, r1]);
        assert_ne!(a, b);
        let ra = alloc.with_area(a, |area| area.resources().to_vec()).unwrap();
        let rb = alloc.with_area(b, |area| area.resources().to_vec()).unwrap();
        assert_eq!(ra, rb);
        assert_eq!(ra, vec![r1, r2]);
    }

    #[test]
    fn free_recycles_the_slot() {
        let alloc = AreaAllocator::new();
        let a = alloc.allocate(vec![]);
        alloc.free(a);
        assert!(alloc.is_free(a));
        let b = alloc.allocate(vec![]);
        assert_eq!(a, b);
    }
}
