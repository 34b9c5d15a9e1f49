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
use std::sync::Arc;

#[derive(Debug)]
pub struct OwnedBufferCopyView {
    pub buffer: wgpu::Buffer,
    pub layout: wgpu::ImageDataLayout,
}

#[derive(Debug)]
pub struct ArcTextureCopyView {
    pub texture: Arc<wgpu::Texture>,
    pub mip_level: u32,
    pub origin: wgpu::Origin3d,
}

#[derive(Debug)]
struct CopyOwnedBufferToArcTextureDescriptor {
    buffer: OwnedBufferCopyView,
    texture: ArcTextureCopyView,
    extent: wgpu::Extent3d,
}

// Note: still quite limited; just precompute without dependencies.
//
// Grounded on the teacher's `gpu::upload_tracker::UploadTracker`, trimmed to
// only the buffer-to-texture path the VT cache's page transfers need.
#[derive(Debug, Default)]
pub struct UploadTracker {
    copy_owned_buffer_to_arc_texture: Vec<CopyOwnedBufferToArcTextureDescriptor>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copy_owned_buffer_to_arc_texture(
        &mut self,
        buffer: OwnedBufferCopyView,
        texture: ArcTextureCopyView,
        extent: wgpu::Extent3d,
    ) {
        self.copy_owned_buffer_to_arc_texture
            .push(CopyOwnedBufferToArcTextureDescriptor {
                buffer,
                texture,
                extent,
            });
    }

    pub fn is_empty(&self) -> bool {
        self.copy_owned_buffer_to_arc_texture.is_empty()
    }

    pub fn dispatch_uploads(mut self, encoder: &mut wgpu::CommandEncoder) {
        for desc in self.copy_owned_buffer_to_arc_texture.drain(..) {
            encoder.copy_buffer_to_texture(
                wgpu::ImageCopyBuffer {
                    buffer: &desc.buffer.buffer,
                    layout: desc.buffer.layout,
                },
                wgpu::ImageCopyTexture {
                    texture: &desc.texture.texture,
                    mip_level: desc.texture.mip_level,
                    origin: desc.texture.origin,
                    aspect: wgpu::TextureAspect::All,
                },
                desc.extent,
            );
        }
    }
}
