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
// A trimmed device/texture/staging abstraction. Unlike the engine's
// windowing `Gpu`, this one only knows how to create textures and batch
// copies; it has no frame graph, no swapchain, no input handling.
mod staging_ring;
mod upload_tracker;

pub use staging_ring::PersistentStagingBuffer;
pub use upload_tracker::{ArcTextureCopyView, OwnedBufferCopyView, UploadTracker};

use std::sync::Arc;

/// Owns the wgpu device/queue handles the rest of the core uploads through.
/// Constructed once by the embedding application and passed down explicitly
/// (per the re-architecture map: no global singleton device access).
#[derive(Clone)]
pub struct Gpu {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl Gpu {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }

    /// Requests an adapter/device with no attached surface, for command-line
    /// tools and tests that need real upload/texture calls but no window.
    /// Grounded on the windowing `Gpu::new_async`'s adapter/device request,
    /// minus everything downstream of the surface.
    pub fn new_headless() -> anyhow::Result<Self> {
        futures::executor::block_on(Self::new_headless_async())
    }

    pub async fn new_headless_async() -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::Backends::PRIMARY);
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("no suitable graphics adapter"))?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default(),
                },
                None,
            )
            .await?;
        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn device_arc(&self) -> Arc<wgpu::Device> {
        self.device.clone()
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// A 2D texture with `mip_count` mips, cleared to zero, matching the
    /// per-VT indirection texture (`RG8`, one mip per LOD).
    pub fn create_mipmapped_texture(
        &self,
        label: &str,
        size: u32,
        mip_count: u32,
        format: wgpu::TextureFormat,
    ) -> Arc<wgpu::Texture> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
        });
        Arc::new(texture)
    }

    /// One 2D texture per VT layer backing the physical tile cache, large
    /// enough to hold a `capacity_x * capacity_y` grid of
    /// `page_resolution`-sized tiles.
    pub fn create_physical_cache_texture(
        &self,
        label: &str,
        capacity_x: u32,
        capacity_y: u32,
        page_resolution: u32,
        format: wgpu::TextureFormat,
    ) -> Arc<wgpu::Texture> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: capacity_x * page_resolution,
                height: capacity_y * page_resolution,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        });
        Arc::new(texture)
    }
}
