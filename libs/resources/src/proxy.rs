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
// Grounded on Engine::World::Resources::ResourceProxy: RESOURCE_STATE and
// RESOURCE_FLAGS enums, plus the proxy fields themselves.
use crate::area::AreaId;
use crate::id::ResourceTag;
use smallvec::SmallVec;
use std::{any::Any, sync::Arc};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProxyState {
    Free,
    Load,
    Ready,
    Invalid,
}

bitflags::bitflags! {
    pub struct ProxyFlags: u8 {
        /// Bytes for this resource never live on disk; created in-memory
        /// via `create_resource_with_data`.
        const PROCEDURAL = 0b0000_0001;
    }
}

/// One slot per registered resource. `name`'s `Arc<str>` is the registry's
/// canonical key string, cloned cheaply rather than stored as a borrow (the
/// C++ original stores a `StringView` into the hash map's key storage;
/// since our map is a `HashMap<String, _>` whose entries can move on
/// rehash, we key proxies off a ref-counted copy instead — same
/// "outlives the proxy" guarantee, no unsafe aliasing).
pub struct ResourceProxy {
    pub(crate) name: Arc<str>,
    pub(crate) tag: ResourceTag,
    pub(crate) state: ProxyState,
    pub(crate) flags: ProxyFlags,
    pub(crate) use_count: i32,
    pub(crate) data: Option<Box<dyn Any + Send + Sync>>,
    /// Sorted, deduplicated area back-references (§8.1: "no proxy has
    /// duplicate area entries").
    pub(crate) areas: SmallVec<[AreaId; 4]>,
}

impl ResourceProxy {
    pub(crate) fn new(name: Arc<str>, tag: ResourceTag) -> Self {
        Self {
            name,
            tag,
            state: ProxyState::Free,
            flags: ProxyFlags::empty(),
            use_count: 0,
            data: None,
            areas: SmallVec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> ResourceTag {
        self.tag
    }

    pub fn state(&self) -> ProxyState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ProxyState::Ready
    }

    pub fn is_procedural(&self) -> bool {
        self.flags.contains(ProxyFlags::PROCEDURAL)
    }

    pub fn use_count(&self) -> i32 {
        self.use_count
    }

    pub fn areas(&self) -> &[AreaId] {
        &self.areas
    }

    pub(crate) fn add_area(&mut self, area: AreaId) {
        if let Err(pos) = self.areas.binary_search(&area) {
            self.areas.insert(pos, area);
        }
    }

    pub(crate) fn remove_area(&mut self, area: AreaId) {
        if let Ok(pos) = self.areas.binary_search(&area) {
            self.areas.remove(pos);
        }
    }

    /// Purge decoded data and drop back to `Free`, matching `Purge()` in
    /// the original (reset resource, clear procedural flag).
    pub(crate) fn purge(&mut self) {
        self.data = None;
        self.state = ProxyState::Free;
        self.flags.remove(ProxyFlags::PROCEDURAL);
    }

    pub(crate) fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_refs_stay_sorted_and_deduped() {
        let mut p = ResourceProxy::new(Arc::from("x"), ResourceTag::Texture);
        p.add_area(AreaId::new(3));
        p.add_area(AreaId::new(1));
        p.add_area(AreaId::new(3));
        p.add_area(AreaId::new(2));
        assert_eq!(
            p.areas().iter().map(|a| a.raw()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }
}
