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
// Grounded on Engine::Core::PagedVector<T, PageBits, PageSize>: fixed-size
// pages so growth never moves an already-issued reference. Lock-free
// structures are permissible per the spec but not required; this is the
// mutex+pages version the spec explicitly allows.
use crate::id::{ResourceId, ResourceTag};
use crate::proxy::ResourceProxy;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

const PAGE_SIZE: usize = 1024;

/// `RwLock<Vec<Vec<Mutex<T>>>>`: the outer `Vec` only ever grows by pushing
/// a fully-reserved page, so existing pages (and thus existing `Mutex<T>`
/// addresses) never move. Growing the outer `Vec` itself only relocates
/// 3-word `Vec` headers, never the pages' heap buffers.
struct PagedVec<T> {
    pages: RwLock<Vec<Vec<Mutex<T>>>>,
}

impl<T> PagedVec<T> {
    fn new() -> Self {
        Self {
            pages: RwLock::new(Vec::new()),
        }
    }

    fn len(&self) -> usize {
        let pages = self.pages.read();
        let full = pages.len().saturating_sub(1) * PAGE_SIZE;
        full + pages.last().map(|p| p.len()).unwrap_or(0)
    }

    /// Push a new slot, growing by a page if the current one is full.
    /// Returns the slot's stable index.
    fn push(&self, value: T) -> u32 {
        let mut pages = self.pages.write();
        if pages.last().map(|p| p.len()) != Some(PAGE_SIZE) || pages.is_empty() {
            if pages.is_empty() || pages.last().unwrap().len() == PAGE_SIZE {
                pages.push(Vec::with_capacity(PAGE_SIZE));
            }
        }
        let page_index = pages.len() - 1;
        let page = &mut pages[page_index];
        let slot_in_page = page.len();
        page.push(Mutex::new(value));
        (page_index * PAGE_SIZE + slot_in_page) as u32
    }

    fn with<R>(&self, index: u32, f: impl FnOnce(&T) -> R) -> Option<R> {
        let pages = self.pages.read();
        let page = pages.get(index as usize / PAGE_SIZE)?;
        let slot = page.get(index as usize % PAGE_SIZE)?;
        Some(f(&slot.lock()))
    }

    fn with_mut<R>(&self, index: u32, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let pages = self.pages.read();
        let page = pages.get(index as usize / PAGE_SIZE)?;
        let slot = page.get(index as usize % PAGE_SIZE)?;
        Some(f(&mut slot.lock()))
    }
}

/// Name -> id lookup plus the paged proxy storage, one per `ResourceTag`
/// bucket so ids for different kinds never collide on index (§4.1.1).
pub struct ResourceRegistry {
    proxies: [PagedVec<ResourceProxy>; 11],
    names: Mutex<HashMap<Arc<str>, ResourceId>>,
}

fn tag_slot(tag: ResourceTag) -> usize {
    tag as usize - 1
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            proxies: Default::default(),
            names: Mutex::new(HashMap::new()),
        }
    }

    /// Find an existing proxy by name, or register a fresh `Free` one.
    /// Returns the id either way (§4.1.1 "GetResource creates on first
    /// reference").
    pub fn get_or_create(&self, name: &str, tag: ResourceTag) -> ResourceId {
        let mut names = self.names.lock();
        if let Some(id) = names.get(name) {
            return *id;
        }
        let name: Arc<str> = Arc::from(name);
        let index = self.proxies[tag_slot(tag)].push(ResourceProxy::new(name.clone(), tag));
        let id = ResourceId::new(tag, index);
        names.insert(name, id);
        id
    }

    pub fn find(&self, name: &str) -> Option<ResourceId> {
        self.names.lock().get(name).copied()
    }

    pub fn with_proxy<R>(&self, id: ResourceId, f: impl FnOnce(&ResourceProxy) -> R) -> Option<R> {
        let tag = id.tag()?;
        self.proxies[tag_slot(tag)].with(id.index(), f)
    }

    pub fn with_proxy_mut<R>(
        &self,
        id: ResourceId,
        f: impl FnOnce(&mut ResourceProxy) -> R,
    ) -> Option<R> {
        let tag = id.tag()?;
        self.proxies[tag_slot(tag)].with_mut(id.index(), f)
    }

    pub fn len_for(&self, tag: ResourceTag) -> usize {
        self.proxies[tag_slot(tag)].len()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// `[PagedVec<T>; 11]` needs a manual Default since `PagedVec` itself isn't
// `Copy`/doesn't derive Default in a way array-init can use directly.
impl<T> Default for PagedVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyState;

    #[test]
    fn same_name_returns_same_id() {
        let reg = ResourceRegistry::new();
        let a = reg.get_or_create("meshes/foo.msh", ResourceTag::Mesh);
        let b = reg.get_or_create("meshes/foo.msh", ResourceTag::Mesh);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_names_get_distinct_slots() {
        let reg = ResourceRegistry::new();
        let a = reg.get_or_create("a", ResourceTag::Texture);
        let b = reg.get_or_create("b", ResourceTag::Texture);
        assert_ne!(a, b);
        assert_eq!(reg.len_for(ResourceTag::Texture), 2);
    }

    #[test]
    fn fresh_proxy_starts_free() {
        let reg = ResourceRegistry::new();
        let id = reg.get_or_create("x", ResourceTag::Sound);
        let state = reg.with_proxy(id, |p| p.state()).unwrap();
        assert_eq!(state, ProxyState::Free);
    }

    #[test]
    fn paged_growth_preserves_existing_indices() {
        let reg = ResourceRegistry::new();
        let mut ids = Vec::new();
        for i in 0..(PAGE_SIZE + 10) {
            ids.push(reg.get_or_create(&format!("r{i}"), ResourceTag::Mesh));
        }
        for (i, id) in ids.iter().enumerate() {
            let name = reg.with_proxy(*id, |p| p.name().to_string()).unwrap();
            assert_eq!(name, format!("r{i}"));
        }
    }
}
