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
mod area;
mod command;
mod decode;
mod handle;
mod id;
mod loader;
mod manager;
mod proxy;
mod registry;
mod types;

pub use area::{AreaAllocator, AreaId, ResourceArea};
pub use handle::{ResourceHandle, ResourceKind};
pub use id::{ResourceId, ResourceTag};
pub use manager::{ResourceManager, ResourceManagerOpts};
pub use proxy::{ProxyFlags, ProxyState, ResourceProxy};
pub use types::{
    Aabb, Animation, Collision, Font, ImageKind, Material, Mesh, NodeMotion, Skeleton, Socket,
    Sound, Subpart, Terrain, Texture,
};
