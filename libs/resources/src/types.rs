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
// Concrete `ResourceKind`s. File magic is `('H', 'k', tag, version)`
// (§6.3); each `decode` strips and validates it before handing the rest to
// the type's own layout.
use crate::handle::ResourceKind;
use crate::id::ResourceTag;

const MAGIC_H: u8 = b'H';
const MAGIC_K: u8 = b'k';

/// Validates and strips the common 4-byte magic. `None` on bad magic or
/// unexpected version (both report as Invalid per §6.3/§7).
fn strip_magic(bytes: &[u8], tag: ResourceTag, version: u8) -> Option<&[u8]> {
    if bytes.len() < 4 {
        return None;
    }
    if bytes[0] != MAGIC_H || bytes[1] != MAGIC_K || bytes[2] != tag as u8 {
        return None;
    }
    if bytes[3] != version {
        return None;
    }
    Some(&bytes[4..])
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_le_bytes(b.try_into().unwrap()))
}

/// `ImageStorage`: `(type, format, W, H, D, mip_count, slice_count)` plus
/// one contiguous pixel payload per `(slice, mip)` (§6.3).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ImageKind {
    D1,
    D1Array,
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

impl ImageKind {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::D1,
            1 => Self::D1Array,
            2 => Self::D2,
            3 => Self::D2Array,
            4 => Self::D3,
            5 => Self::Cube,
            6 => Self::CubeArray,
            _ => return None,
        })
    }
}

pub struct Texture {
    pub kind: ImageKind,
    pub format: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_count: u32,
    pub slice_count: u32,
    /// One entry per `(slice, mip)`, slice-major, mip-minor.
    pub payloads: Vec<Vec<u8>>,
    uploaded: bool,
}

impl ResourceKind for Texture {
    const TAG: ResourceTag = ResourceTag::Texture;
    const VERSION: u8 = 1;

    fn decode(bytes: &[u8]) -> Option<Self> {
        let body = strip_magic(bytes, Self::TAG, Self::VERSION)?;
        let kind = ImageKind::from_u8(*body.get(0)?)?;
        let format = read_u32(body, 1)?;
        let width = read_u32(body, 5)?;
        let height = read_u32(body, 9)?;
        let depth = read_u32(body, 13)?;
        let mip_count = read_u32(body, 17)?;
        let slice_count = read_u32(body, 21)?;
        let mut offset = 25;
        let total = (mip_count as usize).checked_mul(slice_count as usize)?;
        let mut payloads = Vec::with_capacity(total);
        for _ in 0..total {
            let len = read_u32(body, offset)? as usize;
            offset += 4;
            let data = body.get(offset..offset + len)?.to_vec();
            offset += len;
            payloads.push(data);
        }
        Some(Self {
            kind,
            format,
            width,
            height,
            depth,
            mip_count,
            slice_count,
            payloads,
            uploaded: false,
        })
    }

    fn empty() -> Self {
        Self {
            kind: ImageKind::D2,
            format: 0,
            width: 0,
            height: 0,
            depth: 1,
            mip_count: 0,
            slice_count: 0,
            payloads: Vec::new(),
            uploaded: false,
        }
    }

    fn upload(&mut self) {
        // Real GPU upload is the caller's concern (the `gpu` crate owns
        // the device); this just marks the hook as having fired, matching
        // the "called once" contract in §4.1.4.
        self.uploaded = true;
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

pub struct Subpart {
    pub material_index: u32,
    pub index_offset: u32,
    pub index_count: u32,
}

pub struct Socket {
    pub name: String,
    pub transform: [f32; 16],
}

/// Mesh: vertex/weight/lightmap-UV/index/subpart/socket arrays, a skin
/// definition, a bounding box, an optional skeleton-reference path, a
/// skinned flag, and a BVH leaf-primitive hint (§6.3).
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub lightmap_uvs: Vec<[f32; 2]>,
    pub bone_weights: Vec<[f32; 4]>,
    pub bone_indices: Vec<[u8; 4]>,
    pub indices: Vec<u32>,
    pub subparts: Vec<Subpart>,
    pub sockets: Vec<Socket>,
    pub bbox: Aabb,
    pub skeleton_ref: Option<String>,
    pub skinned: bool,
    pub bvh_leaf_primitives: u32,
}

impl ResourceKind for Mesh {
    const TAG: ResourceTag = ResourceTag::Mesh;
    const VERSION: u8 = 1;

    fn decode(bytes: &[u8]) -> Option<Self> {
        let body = strip_magic(bytes, Self::TAG, Self::VERSION)?;
        let mut offset = 0usize;

        let vertex_count = read_u32(body, offset)? as usize;
        offset += 4;
        let mut positions = Vec::with_capacity(vertex_count);
        let mut normals = Vec::with_capacity(vertex_count);
        let mut lightmap_uvs = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            let p = read_vec3(body, offset)?;
            offset += 12;
            let n = read_vec3(body, offset)?;
            offset += 12;
            let u = read_vec2(body, offset)?;
            offset += 8;
            positions.push(p);
            normals.push(n);
            lightmap_uvs.push(u);
        }

        let weight_count = read_u32(body, offset)? as usize;
        offset += 4;
        let mut bone_weights = Vec::with_capacity(weight_count);
        let mut bone_indices = Vec::with_capacity(weight_count);
        for _ in 0..weight_count {
            let w = [
                f32::from_le_bytes(body.get(offset..offset + 4)?.try_into().ok()?),
                f32::from_le_bytes(body.get(offset + 4..offset + 8)?.try_into().ok()?),
                f32::from_le_bytes(body.get(offset + 8..offset + 12)?.try_into().ok()?),
                f32::from_le_bytes(body.get(offset + 12..offset + 16)?.try_into().ok()?),
            ];
            offset += 16;
            let idx = [
                *body.get(offset)?,
                *body.get(offset + 1)?,
                *body.get(offset + 2)?,
                *body.get(offset + 3)?,
            ];
            offset += 4;
            bone_weights.push(w);
            bone_indices.push(idx);
        }

        let index_count = read_u32(body, offset)? as usize;
        offset += 4;
        let mut indices = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            indices.push(read_u32(body, offset)?);
            offset += 4;
        }

        let subpart_count = read_u32(body, offset)? as usize;
        offset += 4;
        let mut subparts = Vec::with_capacity(subpart_count);
        for _ in 0..subpart_count {
            subparts.push(Subpart {
                material_index: read_u32(body, offset)?,
                index_offset: read_u32(body, offset + 4)?,
                index_count: read_u32(body, offset + 8)?,
            });
            offset += 12;
        }

        let socket_count = read_u32(body, offset)? as usize;
        offset += 4;
        let mut sockets = Vec::with_capacity(socket_count);
        for _ in 0..socket_count {
            let name_len = read_u16(body, offset)? as usize;
            offset += 2;
            let name = String::from_utf8(body.get(offset..offset + name_len)?.to_vec()).ok()?;
            offset += name_len;
            let mut transform = [0f32; 16];
            for t in transform.iter_mut() {
                *t = f32::from_le_bytes(body.get(offset..offset + 4)?.try_into().ok()?);
                offset += 4;
            }
            sockets.push(Socket { name, transform });
        }

        let bbox = Aabb {
            min: read_vec3(body, offset)?,
            max: read_vec3(body, offset + 12)?,
        };
        offset += 24;

        let has_skeleton = *body.get(offset)? != 0;
        offset += 1;
        let skeleton_ref = if has_skeleton {
            let len = read_u16(body, offset)? as usize;
            offset += 2;
            let s = String::from_utf8(body.get(offset..offset + len)?.to_vec()).ok()?;
            offset += len;
            Some(s)
        } else {
            None
        };

        let skinned = *body.get(offset)? != 0;
        offset += 1;
        let bvh_leaf_primitives = read_u32(body, offset)?;

        Some(Self {
            positions,
            normals,
            lightmap_uvs,
            bone_weights,
            bone_indices,
            indices,
            subparts,
            sockets,
            bbox,
            skeleton_ref,
            skinned,
            bvh_leaf_primitives,
        })
    }

    fn empty() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            lightmap_uvs: Vec::new(),
            bone_weights: Vec::new(),
            bone_indices: Vec::new(),
            indices: Vec::new(),
            subparts: Vec::new(),
            sockets: Vec::new(),
            bbox: Aabb::default(),
            skeleton_ref: None,
            skinned: false,
            bvh_leaf_primitives: 0,
        }
    }
}

fn read_vec3(bytes: &[u8], at: usize) -> Option<[f32; 3]> {
    Some([
        f32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?),
        f32::from_le_bytes(bytes.get(at + 4..at + 8)?.try_into().ok()?),
        f32::from_le_bytes(bytes.get(at + 8..at + 12)?.try_into().ok()?),
    ])
}

fn read_vec2(bytes: &[u8], at: usize) -> Option<[f32; 2]> {
    Some([
        f32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?),
        f32::from_le_bytes(bytes.get(at + 4..at + 8)?.try_into().ok()?),
    ])
}

/// Minimal stub kinds: the spec names these tags (§2) but leaves their
/// binary layouts as implementation detail outside of Mesh/Texture/VT.
/// Each is decodable only insofar as the magic checks out; payload is an
/// opaque byte blob.
macro_rules! opaque_kind {
    ($name:ident, $tag:expr) => {
        pub struct $name {
            pub bytes: Vec<u8>,
        }

        impl ResourceKind for $name {
            const TAG: ResourceTag = $tag;
            const VERSION: u8 = 1;

            fn decode(bytes: &[u8]) -> Option<Self> {
                let body = strip_magic(bytes, Self::TAG, Self::VERSION)?;
                Some(Self {
                    bytes: body.to_vec(),
                })
            }

            fn empty() -> Self {
                Self { bytes: Vec::new() }
            }
        }
    };
}

opaque_kind!(Animation, ResourceTag::Animation);
opaque_kind!(Material, ResourceTag::Material);
opaque_kind!(Sound, ResourceTag::Sound);
opaque_kind!(Font, ResourceTag::Font);
opaque_kind!(Terrain, ResourceTag::Terrain);
opaque_kind!(Skeleton, ResourceTag::Skeleton);
opaque_kind!(NodeMotion, ResourceTag::NodeMotion);
opaque_kind!(Collision, ResourceTag::Collision);

#[cfg(test)]
mod tests {
    use super::*;

    fn magic(tag: ResourceTag, version: u8) -> Vec<u8> {
        vec![b'H', b'k', tag as u8, version]
    }

    #[test]
    fn texture_roundtrip() {
        let mut bytes = magic(ResourceTag::Texture, 1);
        bytes.push(ImageKind::D2 as u8);
        bytes.extend_from_slice(&7u32.to_le_bytes()); // format
        bytes.extend_from_slice(&4u32.to_le_bytes()); // width
        bytes.extend_from_slice(&4u32.to_le_bytes()); // height
        bytes.extend_from_slice(&1u32.to_le_bytes()); // depth
        bytes.extend_from_slice(&1u32.to_le_bytes()); // mip_count
        bytes.extend_from_slice(&1u32.to_le_bytes()); // slice_count
        let payload = vec![1u8, 2, 3, 4];
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);

        let tex = Texture::decode(&bytes).expect("decode");
        assert_eq!(tex.width, 4);
        assert_eq!(tex.payloads, vec![payload]);
    }

    #[test]
    fn bad_magic_is_none() {
        let bytes = vec![b'X', b'k', ResourceTag::Texture as u8, 1];
        assert!(Texture::decode(&bytes).is_none());
    }

    #[test]
    fn wrong_version_is_none() {
        let bytes = magic(ResourceTag::Texture, 99);
        assert!(Texture::decode(&bytes).is_none());
    }

    #[test]
    fn empty_mesh_has_no_geometry() {
        let mesh = Mesh::empty();
        assert!(mesh.positions.is_empty());
        assert!(!mesh.skinned);
    }
}
