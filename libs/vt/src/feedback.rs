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
// Decodes GPU texture-feedback buffers into page requests, grounded on
// Hork/VirtualTexture/VirtualTextureAnalyzer.{h,cpp}. One analyzer per
// frame: `bind_texture` records which VT sits at which sampler unit,
// `add_feedback_data` queues a readback chain, `end` decodes, coalesces
// duplicate samples, walks each miss up to its nearest cached ancestor,
// and hands back a capped, refs-sorted request list.
use crate::vtexture::VirtualTexture;
use std::collections::HashMap;
use std::sync::Arc;

pub const VT_MAX_TEXTURE_UNITS: usize = 256;
pub const MAX_QUEUE_LENGTH: usize = 256;
pub const MAX_PENDING_PAGES: usize = 100;

/// One coalesced, resolved page request ready for the stream thread.
pub struct PendingPage {
    pub vt_index: usize,
    pub vt: Arc<VirtualTexture>,
    pub page_index: u32,
    pub refs: u32,
}

struct Binding {
    vt_index: usize,
    vt: Arc<VirtualTexture>,
}

pub struct FeedbackAnalyzer {
    bound: Vec<Option<Binding>>,
    chains: Vec<Vec<u8>>,
}

impl FeedbackAnalyzer {
    pub fn new() -> Self {
        let mut bound = Vec::with_capacity(VT_MAX_TEXTURE_UNITS);
        bound.resize_with(VT_MAX_TEXTURE_UNITS, || None);
        Self {
            bound,
            chains: Vec::new(),
        }
    }

    /// Clears last frame's bindings; callers rebind every active unit
    /// between `begin` and `end` (mirrors `Begin()` dropping the
    /// previous swap's retained refs).
    pub fn begin(&mut self) {
        for slot in &mut self.bound {
            *slot = None;
        }
        self.chains.clear();
    }

    pub fn bind_texture(&mut self, unit: usize, vt_index: usize, vt: Arc<VirtualTexture>) {
        self.bound[unit] = Some(Binding { vt_index, vt });
    }

    /// Queues one readback chain of 4-byte feedback samples.
    pub fn add_feedback_data(&mut self, data: &[u8]) {
        self.chains.push(data.to_vec());
    }

    /// Decodes every queued chain and returns a refs-sorted, capped
    /// request list, unless `suppress_submit` is set (thrash back-off is
    /// engaged), in which case queued data is dropped and nothing is
    /// returned.
    pub fn end(&mut self, suppress_submit: bool) -> Vec<PendingPage> {
        if suppress_submit {
            self.chains.clear();
            return Vec::new();
        }

        let mut order: Vec<u32> = Vec::new();
        let mut by_hash: HashMap<u32, usize> = HashMap::new();
        let mut pending: Vec<PendingPage> = Vec::new();

        for chain in self.chains.drain(..) {
            let samples: Vec<[u8; 4]> = chain
                .chunks_exact(4)
                .map(|c| [c[0], c[1], c[2], c[3]])
                .collect();

            let mut duplicates = 0u32;
            for idx in 0..samples.len() {
                if idx + 1 < samples.len() && samples[idx] == samples[idx + 1] {
                    duplicates += 1;
                    continue;
                }
                let refs = duplicates + 1;
                duplicates = 0;

                let sample = samples[idx];
                let unit = sample[0] as usize;
                let lod = (sample[1] >> 4) as u32;
                let x_hi = ((sample[1] & 0x03) as u32) << 8;
                let y_hi = ((sample[1] & 0x0C) as u32) << 6;
                let mut x = sample[3] as u32 | x_hi;
                let mut y = sample[2] as u32 | y_hi;
                let mut lod = lod;

                let Some(binding) = self.bound.get(unit).and_then(|b| b.as_ref()) else {
                    continue;
                };
                if lod >= binding.vt.num_lods() as u32 {
                    continue;
                }

                let quadtree = binding.vt.quadtree();
                let mut rel = crate::quadtree::relative_from_xy(x, y, lod);
                let mut abs = quadtree.relative_to_absolute(rel, lod);
                if !quadtree.is_index_valid(abs, lod) {
                    continue;
                }

                let max_lod = binding.vt.max_lod_for(abs) as u32;
                if max_lod < lod {
                    let diff = lod - max_lod;
                    x >>= diff;
                    y >>= diff;
                    lod = max_lod;
                    rel = crate::quadtree::relative_from_xy(x, y, lod);
                    abs = quadtree.relative_to_absolute(rel, lod);
                }

                if binding.vt.is_cached(abs) {
                    binding.vt.queue_lru_touch(abs);
                    continue;
                }

                while lod > 0 {
                    let parent = quadtree.parent(abs, lod);
                    if binding.vt.is_cached(parent) {
                        break;
                    }
                    lod -= 1;
                    abs = parent;
                }

                let hash = u32::from_le_bytes(sample);
                if let Some(&i) = by_hash.get(&hash) {
                    pending[i].refs += refs;
                } else {
                    by_hash.insert(hash, pending.len());
                    order.push(hash);
                    pending.push(PendingPage {
                        vt_index: binding.vt_index,
                        vt: binding.vt.clone(),
                        page_index: abs,
                        refs,
                    });
                }
            }
        }

        pending.sort_by(|a, b| b.refs.cmp(&a.refs));
        let cap = MAX_PENDING_PAGES.min(MAX_QUEUE_LENGTH).min(pending.len());
        pending.truncate(cap);
        pending
    }
}

impl Default for FeedbackAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_table::AddressTable;
    use crate::pit::PageFlags;
    use crate::quadtree::QuadTreeTable;
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

    fn sample(unit: u8, lod: u8, x: u32, y: u32) -> [u8; 4] {
        let byte1 = (lod << 4) | (((y >> 6) & 0x0C) as u8) | (((x >> 8) & 0x03) as u8);
        [unit, byte1, (y & 0xFF) as u8, (x & 0xFF) as u8]
    }

    #[test]
    fn coalesces_duplicate_runs_and_caps_output() {
        let vt = Arc::new(VirtualTexture::open(build_file(4)).unwrap());
        let mut analyzer = FeedbackAnalyzer::new();
        analyzer.begin();
        analyzer.bind_texture(0, 0, vt.clone());

        let mut chain = Vec::new();
        let hot = sample(0, 3, 4, 5);
        for _ in 0..900 {
            chain.extend_from_slice(&hot);
        }
        for i in 0..100u32 {
            chain.extend_from_slice(&sample(0, 3, i % 8, (i + 1) % 8));
        }

        analyzer.add_feedback_data(&chain);
        let pending = analyzer.end(false);

        assert!(pending.len() <= 101);
        assert!(pending[0].refs >= 900);
    }

    #[test]
    fn cached_page_queues_lru_touch_not_a_request() {
        let vt = Arc::new(VirtualTexture::open(build_file(3)).unwrap());
        vt.make_page_resident(0, 1);
        let mut analyzer = FeedbackAnalyzer::new();
        analyzer.begin();
        analyzer.bind_texture(0, 0, vt.clone());
        analyzer.add_feedback_data(&sample(0, 0, 0, 0));
        let pending = analyzer.end(false);
        assert!(pending.is_empty());
        assert_eq!(vt.drain_lru_touches(), vec![0]);
    }

    #[test]
    fn unbound_unit_is_ignored() {
        let mut analyzer = FeedbackAnalyzer::new();
        analyzer.begin();
        analyzer.add_feedback_data(&sample(0, 0, 0, 0));
        assert!(analyzer.end(false).is_empty());
    }

    #[test]
    fn suppressed_submit_drops_queued_data() {
        let vt = Arc::new(VirtualTexture::open(build_file(3)).unwrap());
        let mut analyzer = FeedbackAnalyzer::new();
        analyzer.begin();
        analyzer.bind_texture(0, 0, vt);
        analyzer.add_feedback_data(&sample(0, 1, 0, 0));
        assert!(analyzer.end(true).is_empty());
    }
}
