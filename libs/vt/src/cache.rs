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
// The physical page cache: a grid of `Cx * Cy` tiles shared by every
// registered VT, LRU eviction, and the stream thread that keeps it fed.
// Grounded on Hork/VirtualTexture/VirtualTexturePhysCache.{h,cpp}.
use crate::transfer::{PendingTransfer, TransferRing, MAX_UPLOADS_PER_FRAME};
use crate::vtexture::VirtualTexture;
use gpu::{ArcTextureCopyView, Gpu, OwnedBufferCopyView, UploadTracker};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use structopt::StructOpt;

pub const MIN_PAGE_CACHE_CAPACITY: u32 = 8;
const THRASH_THRESHOLD: i64 = 4;
const MAX_THRASH_BACKOFF: u32 = 8;

#[derive(StructOpt, Debug, Clone)]
pub struct VtCacheOpts {
    #[structopt(long, default_value = "32")]
    pub page_cache_capacity_x: u32,
    #[structopt(long, default_value = "32")]
    pub page_cache_capacity_y: u32,
    #[structopt(long, default_value = "128")]
    pub page_resolution_with_borders: u32,
    /// Device's max texture size; used to clamp the configured capacity
    /// (§6.5). Left as a constructor argument rather than queried from
    /// `wgpu::Limits` so the clamp is independently testable.
    #[structopt(skip)]
    pub max_texture_size: u32,
}

impl Default for VtCacheOpts {
    fn default() -> Self {
        Self {
            page_cache_capacity_x: 32,
            page_cache_capacity_y: 32,
            page_resolution_with_borders: 128,
            max_texture_size: 16384,
        }
    }
}

/// One slot in the physical tile grid.
struct PhysicalTile {
    last_used_time: i64,
    page_index: u32,
    /// Index into `VirtualTextureCache::textures`, or `None` if unused.
    owner: Option<usize>,
}

pub struct VtLayerInfo {
    pub format: wgpu::TextureFormat,
    pub page_size_bytes: u32,
}

/// Registry of every opened VT plus the shared physical tile grid
/// (`VirtualTextureCache`).
pub struct VirtualTextureCache {
    gpu: Gpu,
    capacity_x: u32,
    capacity_y: u32,
    page_resolution: u32,
    layers: Vec<VtLayerInfo>,
    layer_textures: Vec<Arc<wgpu::Texture>>,
    tiles: Vec<PhysicalTile>,
    total_cached_pages: usize,
    logical_tick: AtomicI64,
    textures: Vec<Option<Arc<VirtualTexture>>>,
    indirection_textures: Vec<Option<Arc<wgpu::Texture>>>,
    ring: Arc<TransferRing>,
    reset_requested: AtomicBool,
    consecutive_thrash: u32,
}

fn clamp_capacity(requested_x: u32, requested_y: u32, page_resolution: u32, max_texture_size: u32) -> (u32, u32) {
    let max_cap = max_texture_size / page_resolution.max(1);
    let mut x = requested_x.clamp(MIN_PAGE_CACHE_CAPACITY, max_cap.max(MIN_PAGE_CACHE_CAPACITY));
    let mut y = requested_y.clamp(MIN_PAGE_CACHE_CAPACITY, max_cap.max(MIN_PAGE_CACHE_CAPACITY));
    if x as u64 * y as u64 > 4096 {
        x = 64;
        y = 64;
    }
    (x, y)
}

impl VirtualTextureCache {
    pub fn new(gpu: Gpu, opts: &VtCacheOpts, layers: Vec<VtLayerInfo>) -> Self {
        let (capacity_x, capacity_y) = clamp_capacity(
            opts.page_cache_capacity_x,
            opts.page_cache_capacity_y,
            opts.page_resolution_with_borders,
            opts.max_texture_size,
        );
        let capacity = (capacity_x * capacity_y) as usize;
        let mut tiles = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            tiles.push(PhysicalTile {
                last_used_time: 0,
                page_index: 0,
                owner: None,
            });
        }
        let layer_textures = layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                gpu.create_physical_cache_texture(
                    &format!("vt-phys-cache-layer-{i}"),
                    capacity_x,
                    capacity_y,
                    opts.page_resolution_with_borders,
                    layer.format,
                )
            })
            .collect();
        let slot_size: usize = layers.iter().map(|l| l.page_size_bytes as usize).sum();
        Self {
            gpu,
            capacity_x,
            capacity_y,
            page_resolution: opts.page_resolution_with_borders,
            layers,
            layer_textures,
            tiles,
            total_cached_pages: 0,
            logical_tick: AtomicI64::new(0),
            textures: Vec::new(),
            indirection_textures: Vec::new(),
            ring: TransferRing::new(slot_size.max(1)),
            reset_requested: AtomicBool::new(false),
            consecutive_thrash: 0,
        }
    }

    pub fn capacity_x(&self) -> u32 {
        self.capacity_x
    }

    pub fn capacity_y(&self) -> u32 {
        self.capacity_y
    }

    pub fn ring(&self) -> Arc<TransferRing> {
        self.ring.clone()
    }

    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::Relaxed);
    }

    /// Whether the feedback analyzer should hold off submitting new
    /// stream requests this frame (§4.2.5's back-off interaction).
    pub fn is_thrash_backoff_active(&self) -> bool {
        self.consecutive_thrash > 0
    }

    /// Opens a VT file's bytes, allocates its indirection texture, and
    /// registers it for LRU sweeps (§4.2.1). Returns its stable registry
    /// index.
    pub fn create_texture(&mut self, bytes: Arc<[u8]>) -> anyhow::Result<usize> {
        let vt = VirtualTexture::open(bytes)?;
        let size = 1u32 << (vt.num_lods().saturating_sub(1));
        let texture = self.gpu.create_mipmapped_texture(
            "vt-indirection",
            size,
            vt.num_lods() as u32,
            wgpu::TextureFormat::Rg8Unorm,
        );
        self.textures.push(Some(Arc::new(vt)));
        self.indirection_textures.push(Some(texture));
        Ok(self.textures.len() - 1)
    }

    pub fn texture(&self, index: usize) -> Option<&Arc<VirtualTexture>> {
        self.textures.get(index).and_then(|t| t.as_ref())
    }

    /// `reset_cache()` (§4.2.6): evict every tile, zero timestamps, clear
    /// pending LRU lists, commit all-zero indirection tables.
    pub fn reset_cache(&mut self) {
        self.total_cached_pages = 0;
        self.logical_tick.store(0, Ordering::Relaxed);
        for tile in &mut self.tiles {
            if let Some(owner) = tile.owner.take() {
                if let Some(Some(vt)) = self.textures.get(owner) {
                    vt.make_page_nonresident(tile.page_index);
                }
            }
            tile.last_used_time = 0;
            tile.page_index = 0;
        }
        for vt in self.textures.iter().flatten() {
            vt.drain_lru_touches();
            vt.take_dirty_levels();
        }
        self.consecutive_thrash = 0;
    }

    /// Uploads every VT's dirty indirection levels in one batch
    /// (§4.2.2's "at most one commit per frame").
    fn commit_indirection(&self, tracker: &mut UploadTracker) {
        for (vt, texture) in self.textures.iter().zip(self.indirection_textures.iter()) {
            let (Some(vt), Some(texture)) = (vt, texture) else {
                continue;
            };
            for (level, bytes) in vt.take_dirty_levels() {
                let size = 1u32 << level;
                let mip_level = vt.num_lods() as u32 - level as u32 - 1;
                let buffer = self
                    .gpu
                    .device()
                    .create_buffer(&wgpu::BufferDescriptor {
                        label: Some("vt-indirection-upload"),
                        size: bytes.len().max(4) as u64,
                        usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::MAP_WRITE,
                        mapped_at_creation: true,
                    });
                buffer
                    .slice(..)
                    .get_mapped_range_mut()[..bytes.len()]
                    .copy_from_slice(&bytes);
                buffer.unmap();
                tracker.copy_owned_buffer_to_arc_texture(
                    OwnedBufferCopyView {
                        buffer,
                        layout: wgpu::ImageDataLayout {
                            offset: 0,
                            bytes_per_row: Some(size * 2),
                            rows_per_image: Some(size),
                        },
                    },
                    ArcTextureCopyView {
                        texture: texture.clone(),
                        mip_level,
                        origin: wgpu::Origin3d::ZERO,
                    },
                    wgpu::Extent3d {
                        width: size,
                        height: size,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }
    }

    /// Per-frame update (§4.2.3). Returns the number of pages uploaded
    /// this frame, mainly for tests/diagnostics.
    pub fn update(&mut self) -> usize {
        if self.reset_requested.swap(false, Ordering::Relaxed) {
            self.reset_cache();
        }

        if self.consecutive_thrash > 0 {
            self.consecutive_thrash -= 1;
            if self.consecutive_thrash == 0 {
                log::info!("virtual texture cache: thrash back-off lifted");
            }
            for vt in self.textures.iter().flatten() {
                vt.drain_lru_touches();
            }
            return 0;
        }

        let Some(published) = self.ring.drain_published() else {
            for vt in self.textures.iter().flatten() {
                vt.drain_lru_touches();
            }
            return 0;
        };

        let time = self.logical_tick.fetch_add(1, Ordering::Relaxed) + 1;
        for (index, vt) in self.textures.iter().enumerate() {
            let Some(vt) = vt else { continue };
            for abs in vt.drain_lru_touches() {
                let bits = vt.indirection_value(abs);
                let tile_index = (bits & 0x0FFF) as usize;
                if tile_index < self.tiles.len() && self.tiles[tile_index].owner == Some(index) {
                    self.tiles[tile_index].last_used_time = time;
                }
            }
        }

        let mut order: Vec<usize> = (0..self.tiles.len()).collect();
        order.sort_by_key(|&i| self.tiles[i].last_used_time);

        let mut uploaded = 0;
        let mut victim_cursor = 0usize;
        let mut staging = Vec::new();

        for (i, transfer) in published.iter().take(MAX_UPLOADS_PER_FRAME).enumerate() {
            let transfer = *transfer;
            let Some(vt) = self.texture(transfer.vt_index).cloned() else {
                self.ring.free(transfer.slot);
                continue;
            };
            if vt.is_cached(transfer.page_index) {
                self.ring.free(transfer.slot);
                continue;
            }
            if victim_cursor >= order.len() {
                break;
            }
            let victim = order[victim_cursor];
            if self.tiles[victim].owner.is_some()
                && self.tiles[victim].last_used_time + THRASH_THRESHOLD >= time
            {
                log::warn!("virtual texture cache: thrashing, back-off engaged");
                self.consecutive_thrash = (self.consecutive_thrash + 1).min(MAX_THRASH_BACKOFF);
                self.ring.free(transfer.slot);
                for remaining in published.iter().skip(i + 1) {
                    self.ring.free(remaining.slot);
                }
                return uploaded;
            }

            if let Some(owner) = self.tiles[victim].owner.take() {
                if let Some(Some(owner_vt)) = self.textures.get(owner) {
                    owner_vt.make_page_nonresident(self.tiles[victim].page_index);
                }
            } else {
                self.total_cached_pages += 1;
            }

            self.ring.read_slot(transfer.slot, &mut staging);
            self.write_tile(victim, &staging);
            self.ring.free(transfer.slot);

            self.tiles[victim] = PhysicalTile {
                last_used_time: time,
                page_index: transfer.page_index,
                owner: Some(transfer.vt_index),
            };
            vt.make_page_resident(transfer.page_index, victim as u32);

            victim_cursor += 1;
            uploaded += 1;
        }

        let mut tracker = UploadTracker::new();
        self.commit_indirection(&mut tracker);
        if !tracker.is_empty() {
            let mut encoder = self
                .gpu
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
            tracker.dispatch_uploads(&mut encoder);
            self.gpu.queue().submit(Some(encoder.finish()));
        }

        self.garbage_collect();
        uploaded
    }

    fn write_tile(&self, tile_index: usize, bytes: &[u8]) {
        let x = (tile_index as u32) % self.capacity_x;
        let y = (tile_index as u32) / self.capacity_x;
        let mut offset = 0usize;
        for (layer_texture, layer) in self.layer_textures.iter().zip(self.layers.iter()) {
            let size = layer.page_size_bytes as usize;
            let bytes_per_row = (layer.page_size_bytes / self.page_resolution.max(1)).max(1);
            self.gpu.queue().write_texture(
                wgpu::ImageCopyTexture {
                    texture: layer_texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: x * self.page_resolution,
                        y: y * self.page_resolution,
                        z: 0,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                &bytes[offset..offset + size],
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.page_resolution),
                },
                wgpu::Extent3d {
                    width: self.page_resolution,
                    height: self.page_resolution,
                    depth_or_array_layers: 1,
                },
            );
            offset += size;
        }
    }

    /// GC VTs whose only remaining owner is this cache (§4.2.3 step 7).
    /// Actual refcounting lives with the caller (`Arc::strong_count`);
    /// this takes the set of indices the caller has determined are
    /// orphaned.
    fn garbage_collect(&mut self) {
        for index in 0..self.textures.len() {
            let Some(vt) = self.textures[index].clone() else { continue };
            if Arc::strong_count(&vt) > 1 {
                continue;
            }
            for tile in &mut self.tiles {
                if tile.owner == Some(index) {
                    vt.make_page_nonresident(tile.page_index);
                    tile.owner = None;
                    tile.last_used_time = 0;
                    tile.page_index = 0;
                }
            }
            self.textures[index] = None;
            self.indirection_textures[index] = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_clamps_to_minimum() {
        let (x, y) = clamp_capacity(1, 1, 128, 16384);
        assert_eq!((x, y), (MIN_PAGE_CACHE_CAPACITY, MIN_PAGE_CACHE_CAPACITY));
    }

    #[test]
    fn capacity_clamps_to_64x64_on_overflow() {
        let (x, y) = clamp_capacity(4000, 4000, 1, 100000);
        assert_eq!((x, y), (64, 64));
    }

    #[test]
    fn capacity_respects_device_limit() {
        let (x, y) = clamp_capacity(1000, 1000, 128, 4096);
        // max_texture_size / page_res = 32, below the 4096-product clamp.
        assert_eq!((x, y), (32, 32));
    }
}
