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
use crate::id::{ResourceId, ResourceTag};
use std::{fmt, marker::PhantomData};

/// Anything that can be stored under a `ResourceId`. The tag doubles as the
/// high byte of the on-disk magic (`'H', 'k', TAG, version`).
pub trait ResourceKind: Send + Sync + Sized + 'static {
    const TAG: ResourceTag;
    const VERSION: u8;

    /// Decode an owned value from a resource's raw bytes (sans magic,
    /// which the loader already validated). `None` is a decode failure.
    fn decode(bytes: &[u8]) -> Option<Self>;

    /// An empty/default instance, used by `create_resource_from_file` when
    /// the open fails (§4.1.2) and by procedural defaults.
    fn empty() -> Self;

    /// Called once on the main thread right after the proxy transitions to
    /// `Ready` (§4.1.4). Most kinds no-op; GPU-backed kinds push bytes up.
    fn upload(&mut self) {}
}

/// A `ResourceId` carrying a compile-time type tag. Conversion to
/// `ResourceId` is free; conversion back requires the stored tag to match
/// `T::TAG`, otherwise the result is an invalid handle.
pub struct ResourceHandle<T: ResourceKind> {
    id: ResourceId,
    _tag: PhantomData<fn() -> T>,
}

impl<T: ResourceKind> ResourceHandle<T> {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            _tag: PhantomData,
        }
    }

    pub const fn invalid() -> Self {
        Self {
            id: ResourceId::INVALID,
            _tag: PhantomData,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.id.is_valid() && self.id.tag() == Some(T::TAG)
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Downcast a raw id to a typed handle; `None` if the tag doesn't
    /// match (the re-architecture map's "tag mismatch returns none").
    pub fn from_id(id: ResourceId) -> Option<Self> {
        if id.is_valid() && id.tag() == Some(T::TAG) {
            Some(Self::new(id))
        } else {
            None
        }
    }
}

impl<T: ResourceKind> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: ResourceKind> Copy for ResourceHandle<T> {}

impl<T: ResourceKind> PartialEq for ResourceHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T: ResourceKind> Eq for ResourceHandle<T> {}

impl<T: ResourceKind> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceHandle({:?})", self.id)
    }
}

impl<T: ResourceKind> From<ResourceHandle<T>> for ResourceId {
    fn from(h: ResourceHandle<T>) -> Self {
        h.id
    }
}
