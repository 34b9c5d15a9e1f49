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
// Grounded on Hork/VirtualTexture/VirtualTexture.{h,cpp}: one opened VT
// file plus its indirection table and the quadtree-branch propagation
// that keeps non-cached pages mirroring their nearest cached ancestor.
use crate::address_table::AddressTable;
use crate::quadtree::QuadTreeTable;
use crate::vtfile::{LayerDescriptor, VtFileHeader};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// `indirection[p] = phys_tile | (lod << 12)`. Low 12 bits address up to
/// 4096 physical tiles, matching the physical cache's capacity ceiling.
fn pack(phys_tile: u32, lod: u32) -> u16 {
    (phys_tile as u16 & 0x0FFF) | ((lod as u16) << 12)
}

/// Per-VT indirection data plus the per-LOD dirty counters that gate GPU
/// upload (§4.2.2). Lives behind a lock because the stream thread never
/// touches it but the main thread does, from both the feedback decode
/// path (reads) and `make_page_resident`/`nonresident` (writes).
pub struct IndirectionTable {
    data: Vec<u16>,
    dirty_lods: Vec<u32>,
    num_lods: u8,
}

impl IndirectionTable {
    fn new(total_pages: u32, num_lods: u8) -> Self {
        Self {
            data: vec![0u16; total_pages as usize],
            dirty_lods: vec![0u32; num_lods as usize],
            num_lods,
        }
    }

    pub fn get(&self, abs: u32) -> u16 {
        self.data[abs as usize]
    }

    pub fn is_dirty(&self, lod: u8) -> bool {
        self.dirty_lods[lod as usize] > 0
    }

    pub fn clear_dirty(&mut self, lod: u8) {
        self.dirty_lods[lod as usize] = 0;
    }

    /// Four children of `abs` (at `lod`) living at `lod + 1`.
    fn children(&self, quadtree: &QuadTreeTable, abs: u32, lod: u32) -> [u32; 4] {
        let rel = quadtree.absolute_to_relative(abs, lod);
        let (x, y) = crate::quadtree::xy_from_relative(rel, lod);
        let child_lod = lod + 1;
        [
            quadtree.relative_to_absolute(
                crate::quadtree::relative_from_xy(2 * x, 2 * y, child_lod),
                child_lod,
            ),
            quadtree.relative_to_absolute(
                crate::quadtree::relative_from_xy(2 * x + 1, 2 * y, child_lod),
                child_lod,
            ),
            quadtree.relative_to_absolute(
                crate::quadtree::relative_from_xy(2 * x, 2 * y + 1, child_lod),
                child_lod,
            ),
            quadtree.relative_to_absolute(
                crate::quadtree::relative_from_xy(2 * x + 1, 2 * y + 1, child_lod),
                child_lod,
            ),
        ]
    }

    /// Write `bits` at `abs` and recurse into every descendant whose
    /// `Cached` bit is unset, stopping at `max_deep` levels (ports
    /// `UpdateBranch_r`).
    fn update_branch(
        &mut self,
        quadtree: &QuadTreeTable,
        pit: &super::pit::PageInfoTable,
        lod: u32,
        abs: u32,
        bits: u16,
        max_deep: u32,
    ) {
        let max_deep = max_deep.saturating_sub(1);
        if max_deep == 0 {
            return;
        }
        if pit.is_cached(abs) {
            return;
        }
        self.data[abs as usize] = bits;
        self.dirty_lods[lod as usize] += 1;
        if lod + 1 < self.num_lods as u32 {
            for child in self.children(quadtree, abs, lod) {
                self.update_branch(quadtree, pit, lod + 1, child, bits, max_deep);
            }
        }
    }

    /// Marks `abs`'s own LOD dirty unconditionally, then recurses into its
    /// children via `update_branch` (ports `UpdateChildsBranch_r`).
    fn update_children_branch(
        &mut self,
        quadtree: &QuadTreeTable,
        pit: &super::pit::PageInfoTable,
        lod: u32,
        abs: u32,
        bits: u16,
        max_deep: u32,
    ) {
        self.dirty_lods[lod as usize] += 1;
        if lod + 1 < self.num_lods as u32 {
            for child in self.children(quadtree, abs, lod) {
                self.update_branch(quadtree, pit, lod + 1, child, bits, max_deep);
            }
        }
    }
}

/// One opened virtual texture: its header-derived tables, a mutable PIT
/// and indirection table, and the bookkeeping the cache needs to touch
/// LRU times and stream new pages.
pub struct VirtualTexture {
    layers: Vec<LayerDescriptor>,
    address_table: AddressTable,
    page_stream_offset: u64,
    quadtree: QuadTreeTable,
    pit: Mutex<super::pit::PageInfoTable>,
    indirection: Mutex<IndirectionTable>,
    /// Whole file, read once at registration. The stream thread slices
    /// into it directly rather than issuing per-page syscalls; see
    /// `DESIGN.md` for why this departs from the original's `pread`.
    bytes: Arc<[u8]>,
    num_lods: u8,
    pending_update_lru: Mutex<Vec<u32>>,
    streamed_pages: Mutex<HashMap<u32, Instant>>,
}

impl VirtualTexture {
    pub fn open(bytes: Arc<[u8]>) -> anyhow::Result<Self> {
        let header = VtFileHeader::parse(&bytes)?;
        let num_lods = header.address_table.num_lods();
        let total_pages = header.pit.len() as u32;
        Ok(Self {
            quadtree: QuadTreeTable::new(),
            pit: Mutex::new(header.pit),
            indirection: Mutex::new(IndirectionTable::new(total_pages, num_lods)),
            layers: header.layers,
            address_table: header.address_table,
            page_stream_offset: header.page_stream_offset,
            bytes,
            num_lods,
            pending_update_lru: Mutex::new(Vec::new()),
            streamed_pages: Mutex::new(HashMap::new()),
        })
    }

    pub fn num_lods(&self) -> u8 {
        self.num_lods
    }

    pub fn total_pages(&self) -> u32 {
        self.indirection.lock().data.len() as u32
    }

    pub fn quadtree(&self) -> &QuadTreeTable {
        &self.quadtree
    }

    pub fn page_byte_size(&self) -> u32 {
        self.layers.iter().map(|l| l.size_in_bytes).sum()
    }

    pub fn is_cached(&self, abs: u32) -> bool {
        self.pit.lock().is_cached(abs)
    }

    pub fn max_lod_for(&self, abs: u32) -> u8 {
        self.pit.lock().max_lod(abs)
    }

    pub fn indirection_value(&self, abs: u32) -> u16 {
        self.indirection.lock().get(abs)
    }

    /// Byte offset and length of `abs`'s page payload in `self.bytes`.
    pub fn page_bytes(&self, abs: u32) -> &[u8] {
        let page_size = self.page_byte_size();
        let offset = self.address_table.physical_offset(
            &self.quadtree,
            abs,
            page_size,
            self.page_stream_offset,
        );
        let start = offset as usize;
        &self.bytes[start..start + page_size as usize]
    }

    pub fn queue_lru_touch(&self, abs: u32) {
        self.pending_update_lru.lock().push(abs);
    }

    pub fn drain_lru_touches(&self) -> Vec<u32> {
        std::mem::take(&mut self.pending_update_lru.lock())
    }

    /// De-duplicates a just-requested page against the last second of
    /// stream-thread activity (§4.2.4). Returns `true` if the request is
    /// fresh and should be forwarded.
    pub fn mark_streamed(&self, abs: u32, now: Instant) -> bool {
        let mut streamed = self.streamed_pages.lock();
        if let Some(last) = streamed.get(&abs) {
            if now.duration_since(*last).as_millis() < 1000 {
                return false;
            }
        }
        streamed.insert(abs, now);
        true
    }

    pub fn make_page_resident(&self, abs: u32, phys_tile: u32) {
        let lod = self.quadtree.lod_of(abs).expect("absolute index in range");
        let bits = pack(phys_tile, lod);
        let mut pit = self.pit.lock();
        pit.set_cached(abs, true);
        let mut indirection = self.indirection.lock();
        indirection.data[abs as usize] = bits;
        indirection.update_children_branch(&self.quadtree, &pit, lod, abs, bits, self.num_lods as u32);
    }

    pub fn make_page_nonresident(&self, abs: u32) {
        let lod = self.quadtree.lod_of(abs).expect("absolute index in range");
        let mut pit = self.pit.lock();
        pit.set_cached(abs, false);
        let bits = if lod > 0 {
            let parent = self.quadtree.parent(abs, lod);
            self.indirection.lock().get(parent)
        } else {
            0
        };
        self.indirection
            .lock()
            .update_branch(&self.quadtree, &pit, lod, abs, bits, self.num_lods as u32);
    }

    /// Dirty LODs and the data to re-upload for each, consuming the dirty
    /// flags (ports `CommitPageResidency`'s per-level full-square copy).
    pub fn take_dirty_levels(&self) -> Vec<(u8, Vec<u8>)> {
        let mut indirection = self.indirection.lock();
        let mut out = Vec::new();
        for level in 0..self.num_lods {
            if indirection.is_dirty(level) {
                let page = self.quadtree.relative_to_absolute(0, level as u32);
                let size = 1u32 << level;
                let count = (size * size) as usize;
                let mut bytes = Vec::with_capacity(count * 2);
                for i in 0..count {
                    bytes.extend_from_slice(&indirection.data[page as usize + i].to_le_bytes());
                }
                out.push((level, bytes));
                indirection.clear_dirty(level);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pit::PageFlags;
    use crate::vtfile::VT_FILE_ID;

    fn build_file(num_lods: u8) -> Arc<[u8]> {
        let quadtree = QuadTreeTable::new();
        let total = quadtree.total_pages(num_lods as u32);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&VT_FILE_ID.to_le_bytes());
        bytes.push(1);
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());

        let mut pit = crate::pit::PageInfoTable::new(total);
        for abs in 0..total {
            pit.set(abs, PageFlags::STORED, 0);
        }
        bytes.extend_from_slice(&pit.serialize());

        let at = AddressTable::new(num_lods, total);
        bytes.extend_from_slice(&at.serialize());

        bytes.extend_from_slice(&vec![0u8; 4 * total as usize]);
        bytes.into()
    }

    #[test]
    fn fresh_texture_has_zeroed_indirection() {
        let vt = VirtualTexture::open(build_file(3)).unwrap();
        assert_eq!(vt.indirection_value(0), 0);
        assert!(!vt.is_cached(1));
    }

    #[test]
    fn residency_propagates_to_uncached_children_only() {
        // L = 3 (sizes 1, 4, 16); LOD1 page at rel=0 is abs=1. Its LOD-2
        // children are abs = 5, 6, 9, 10 (matches S5 in SPEC_FULL.md).
        let vt = VirtualTexture::open(build_file(3)).unwrap();
        vt.make_page_resident(1, 7);
        let expect = pack(7, 1);
        assert_eq!(vt.indirection_value(1), expect);
        for child in [5, 6, 9, 10] {
            assert_eq!(vt.indirection_value(child), expect);
        }

        vt.make_page_resident(5, 12);
        let expect_child = pack(12, 2);
        assert_eq!(vt.indirection_value(5), expect_child);
        for sibling in [6, 9, 10] {
            assert_eq!(vt.indirection_value(sibling), expect);
        }
        assert_eq!(vt.indirection_value(1), expect);

        vt.make_page_nonresident(5);
        assert_eq!(vt.indirection_value(5), expect);
    }

    #[test]
    fn dirty_levels_drain_and_reset() {
        let vt = VirtualTexture::open(build_file(3)).unwrap();
        vt.make_page_resident(1, 7);
        let dirty = vt.take_dirty_levels();
        assert!(!dirty.is_empty());
        assert!(vt.take_dirty_levels().is_empty());
    }

    #[test]
    fn streamed_page_dedup_within_one_second() {
        let vt = VirtualTexture::open(build_file(3)).unwrap();
        let now = Instant::now();
        assert!(vt.mark_streamed(5, now));
        assert!(!vt.mark_streamed(5, now));
    }
}
