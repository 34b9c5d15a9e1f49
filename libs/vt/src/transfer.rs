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
// Page transfer ring, grounded on VirtualTexturePhysCache's
// `CreatePageTransfer`/`MakePageTransferVisible`/`WaitForFences` SPSC
// protocol. wgpu has no persistent-coherent mapped buffer and
// `Queue::write_texture` consumes its source slice synchronously, so the
// fence-polling half of the original (`m_PageTransferEvent`,
// `ClientWait`) has no counterpart here: a slot is free again as soon as
// the main thread has copied it into a texture, not after a GPU fence
// signals. See `DESIGN.md` for the rationale.
use gpu::PersistentStagingBuffer;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const MAX_UPLOADS_PER_FRAME: usize = 64;

/// One queued page ready for the main thread to commit to a physical
/// tile. `vt_index` indexes into the cache's VT registry; carrying an
/// index rather than an `Arc<VirtualTexture>` keeps this module free of
/// a dependency on `vtexture`'s internals beyond the page size.
#[derive(Clone, Copy)]
pub struct PendingTransfer {
    pub vt_index: usize,
    pub page_index: u32,
    pub slot: usize,
}

/// Fixed-size staging ring plus the SPSC alloc/free index pair that
/// lets the stream thread claim slots while the main thread reclaims
/// them, mirroring `m_TransferAllocPoint` / `m_TransferFreePoint`.
pub struct TransferRing {
    staging: Mutex<PersistentStagingBuffer>,
    alloc_point: Mutex<usize>,
    free_point: AtomicUsize,
    alloc_cv: Condvar,
    /// Slots the stream thread has finished writing and published,
    /// consumed by the main thread's `update()` (`m_Transfers`).
    published: Mutex<Vec<PendingTransfer>>,
}

impl TransferRing {
    pub fn new(slot_size: usize) -> Arc<Self> {
        Arc::new(Self {
            staging: Mutex::new(PersistentStagingBuffer::new(slot_size, MAX_UPLOADS_PER_FRAME)),
            alloc_point: Mutex::new(0),
            free_point: AtomicUsize::new(MAX_UPLOADS_PER_FRAME),
            alloc_cv: Condvar::new(),
            published: Mutex::new(Vec::new()),
        })
    }

    /// Claims the next free slot, blocking if the ring is full. Returns
    /// the slot index; the caller writes page bytes via `write_slot`.
    pub fn alloc(&self) -> usize {
        let mut alloc_point = self.alloc_point.lock();
        loop {
            let free_point = self.free_point.load(Ordering::Acquire);
            if *alloc_point + 1 <= free_point {
                let slot = *alloc_point % MAX_UPLOADS_PER_FRAME;
                *alloc_point += 1;
                return slot;
            }
            self.alloc_cv.wait(&mut alloc_point);
        }
    }

    pub fn write_slot(&self, slot: usize, bytes: &[u8]) {
        self.staging.lock().slot_mut(slot)[..bytes.len()].copy_from_slice(bytes);
    }

    pub fn read_slot(&self, slot: usize, out: &mut Vec<u8>) {
        out.clear();
        out.extend_from_slice(self.staging.lock().slot(slot));
    }

    /// Publishes a claimed, written slot for the main thread to consume
    /// (`MakePageTransferVisible`).
    pub fn publish(&self, transfer: PendingTransfer) {
        self.published.lock().push(transfer);
    }

    /// Drains every published transfer, or `None` if nothing is ready
    /// (`LockTransfers`/`UnlockTransfers`).
    pub fn drain_published(&self) -> Option<Vec<PendingTransfer>> {
        let mut published = self.published.lock();
        if published.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut published))
    }

    /// Returns a slot to the ring and wakes anyone blocked in `alloc`.
    /// Called once the main thread has copied the slot's bytes into a
    /// texture (no GPU fence to wait on; see module docs).
    pub fn free(&self, _slot: usize) {
        self.free_point.fetch_add(1, Ordering::Release);
        self.alloc_cv.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_round_trips_bytes() {
        let ring = TransferRing::new(8);
        let slot = ring.alloc();
        ring.write_slot(slot, &[1, 2, 3, 4]);
        let mut out = Vec::new();
        ring.read_slot(slot, &mut out);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
        ring.free(slot);
    }

    #[test]
    fn publish_and_drain_round_trips() {
        let ring = TransferRing::new(8);
        let slot = ring.alloc();
        ring.publish(PendingTransfer {
            vt_index: 0,
            page_index: 5,
            slot,
        });
        let drained = ring.drain_published().unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].page_index, 5);
        assert!(ring.drain_published().is_none());
    }

    #[test]
    fn alloc_blocks_until_ring_has_room() {
        let ring = TransferRing::new(8);
        let mut slots = Vec::new();
        for _ in 0..MAX_UPLOADS_PER_FRAME {
            slots.push(ring.alloc());
        }
        let ring2 = ring.clone();
        let handle = std::thread::spawn(move || ring2.alloc());
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!handle.is_finished());
        ring.free(slots.pop().unwrap());
        handle.join().unwrap();
    }
}
