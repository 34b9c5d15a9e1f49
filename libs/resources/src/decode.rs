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
use crate::handle::ResourceKind;
use crate::id::ResourceTag;
use crate::types::{
    Animation, Collision, Font, Material, Mesh, NodeMotion, Skeleton, Sound, Terrain, Texture,
};
use std::any::Any;

/// Dispatch table from tag to decoder, boxed as `Any` for the proxy's
/// `data` slot. `VirtualTexture`-tagged proxies are registered but never
/// routed through this loader path (§4.2.1 opens VT files through its own
/// reader, not the generic resource loader).
pub fn decode_for_tag(tag: ResourceTag, bytes: &[u8]) -> Option<Box<dyn Any + Send + Sync>> {
    fn boxed<T: ResourceKind>(bytes: &[u8]) -> Option<Box<dyn Any + Send + Sync>> {
        T::decode(bytes).map(|v| Box::new(v) as Box<dyn Any + Send + Sync>)
    }

    match tag {
        ResourceTag::Mesh => boxed::<Mesh>(bytes),
        ResourceTag::Texture => boxed::<Texture>(bytes),
        ResourceTag::Material => boxed::<Material>(bytes),
        ResourceTag::Sound => boxed::<Sound>(bytes),
        ResourceTag::Font => boxed::<Font>(bytes),
        ResourceTag::Terrain => boxed::<Terrain>(bytes),
        ResourceTag::Skeleton => boxed::<Skeleton>(bytes),
        ResourceTag::NodeMotion => boxed::<NodeMotion>(bytes),
        ResourceTag::Collision => boxed::<Collision>(bytes),
        ResourceTag::Animation => boxed::<Animation>(bytes),
        ResourceTag::VirtualTexture => None,
    }
}

/// Calls the decoded value's `upload()` hook through its type-erased box.
/// Most kinds no-op (the default); `Texture` (GPU-backed) actually does
/// something. Dispatch is by tag since `Box<dyn Any>` alone can't tell us
/// which concrete type to downcast to.
pub fn upload_for_tag(tag: ResourceTag, data: &mut (dyn Any + Send + Sync)) {
    fn call<T: ResourceKind>(data: &mut (dyn Any + Send + Sync)) {
        if let Some(v) = data.downcast_mut::<T>() {
            v.upload();
        }
    }

    match tag {
        ResourceTag::Mesh => call::<Mesh>(data),
        ResourceTag::Texture => call::<Texture>(data),
        ResourceTag::Material => call::<Material>(data),
        ResourceTag::Sound => call::<Sound>(data),
        ResourceTag::Font => call::<Font>(data),
        ResourceTag::Terrain => call::<Terrain>(data),
        ResourceTag::Skeleton => call::<Skeleton>(data),
        ResourceTag::NodeMotion => call::<NodeMotion>(data),
        ResourceTag::Collision => call::<Collision>(data),
        ResourceTag::Animation => call::<Animation>(data),
        ResourceTag::VirtualTexture => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_texture_tag_is_unroutable() {
        assert!(decode_for_tag(ResourceTag::VirtualTexture, &[]).is_none());
    }
}
