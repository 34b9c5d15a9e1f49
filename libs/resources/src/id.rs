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
// Grounded on Engine::World::Resources::ResourceID: a 32-bit tagged id,
// high byte type tag, low 24 bits slot index. Id 0 is reserved invalid.
use std::fmt;

/// Closed enum over every decodable resource kind. The tag is also the
/// high byte of the file magic `('H', 'k', tag, version)` (§6.3).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(u8)]
pub enum ResourceTag {
    Mesh = 1,
    Animation = 2,
    Texture = 3,
    Material = 4,
    Sound = 5,
    Font = 6,
    Terrain = 7,
    Skeleton = 8,
    NodeMotion = 9,
    Collision = 10,
    VirtualTexture = 11,
}

impl ResourceTag {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Mesh,
            2 => Self::Animation,
            3 => Self::Texture,
            4 => Self::Material,
            5 => Self::Sound,
            6 => Self::Font,
            7 => Self::Terrain,
            8 => Self::Skeleton,
            9 => Self::NodeMotion,
            10 => Self::Collision,
            11 => Self::VirtualTexture,
            _ => return None,
        })
    }
}

const INDEX_BITS: u32 = 24;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// 32-bit tagged identifier: high 8 bits = type tag, low 24 bits = slot
/// index in the registry's paged vector. Equality/hashing are on the raw
/// 32-bit value, matching `ResourceID::Hash()` in the original.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceId(u32);

impl ResourceId {
    pub const INVALID: ResourceId = ResourceId(0);

    pub fn new(tag: ResourceTag, index: u32) -> Self {
        debug_assert!(index <= INDEX_MASK, "resource slot index overflow");
        Self(((tag as u32) << INDEX_BITS) | (index & INDEX_MASK))
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    pub fn tag(self) -> Option<ResourceTag> {
        ResourceTag::from_u8((self.0 >> INDEX_BITS) as u8)
    }

    pub fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(
                f,
                "ResourceId({:?}:{})",
                self.tag(),
                self.index()
            )
        } else {
            write!(f, "ResourceId(invalid)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_unpacks() {
        let id = ResourceId::new(ResourceTag::Texture, 12345);
        assert_eq!(id.tag(), Some(ResourceTag::Texture));
        assert_eq!(id.index(), 12345);
        assert!(id.is_valid());
    }

    #[test]
    fn invalid_is_zero() {
        assert!(!ResourceId::INVALID.is_valid());
        assert_eq!(ResourceId::INVALID.raw(), 0);
    }
}
