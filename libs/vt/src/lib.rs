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
// Virtual texture page cache: byte-exact VT file reading, the physical
// tile cache with LRU eviction, the page-transfer ring fed by a stream
// thread, and the feedback analyzer that turns GPU readback into page
// requests. Grounded throughout on Hork/VirtualTexture/*.
mod address_table;
mod cache;
mod feedback;
mod pit;
mod quadtree;
mod stream;
mod transfer;
mod vtexture;
mod vtfile;

pub use cache::{VirtualTextureCache, VtCacheOpts, VtLayerInfo, MIN_PAGE_CACHE_CAPACITY};
pub use feedback::{FeedbackAnalyzer, PendingPage, MAX_PENDING_PAGES, MAX_QUEUE_LENGTH, VT_MAX_TEXTURE_UNITS};
pub use quadtree::VT_MAX_LODS;
pub use stream::{spawn_stream, StreamChannel};
pub use transfer::{PendingTransfer, TransferRing, MAX_UPLOADS_PER_FRAME};
pub use vtexture::VirtualTexture;
pub use vtfile::{LayerDescriptor, VtFileHeader, VT_FILE_ID, VT_MAX_LAYERS, VT_PAGE_BORDER_WIDTH};
