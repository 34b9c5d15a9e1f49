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
// The stream thread (§4.2.4): services the feedback analyzer's resolved
// request queue. Single worker, condvar-blocked, mirroring
// `resources::loader`'s shape. For each queued page: de-dup against the
// VT's `streamed_pages` map, resolve the physical offset via the address
// table (`VirtualTexture::page_bytes`), claim a ring slot, write the
// page's bytes into staging, and publish for the main thread to commit.
use crate::feedback::PendingPage;
use crate::transfer::{PendingTransfer, TransferRing};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<PendingPage>,
}

/// Hands a frame's resolved, refs-sorted page requests from the main
/// thread (where feedback decode happens) to the stream worker.
pub struct StreamChannel {
    state: Mutex<QueueState>,
    cv: Condvar,
    shutdown: AtomicBool,
}

impl StreamChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Queues one frame's worth of requests, in the order
    /// `FeedbackAnalyzer::end` produced (highest `refs` first).
    pub fn submit(&self, pages: Vec<PendingPage>) {
        if pages.is_empty() {
            return;
        }
        let mut guard = self.state.lock().unwrap();
        guard.queue.extend(pages);
        drop(guard);
        self.cv.notify_one();
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.cv.notify_all();
    }

    fn pop_blocking(&self) -> Option<PendingPage> {
        let mut guard = self.state.lock().unwrap();
        loop {
            if let Some(page) = guard.queue.pop_front() {
                return Some(page);
            }
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            guard = self.cv.wait(guard).unwrap();
        }
    }
}

/// Spawns the single stream worker. Returns a `JoinHandle` the owner
/// joins after calling `StreamChannel::shutdown`.
pub fn spawn_stream(channel: Arc<StreamChannel>, ring: Arc<TransferRing>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("vt-stream".into())
        .spawn(move || stream_main(&channel, &ring))
        .expect("failed to spawn VT stream thread")
}

fn stream_main(channel: &StreamChannel, ring: &TransferRing) {
    while let Some(page) = channel.pop_blocking() {
        if !page.vt.mark_streamed(page.page_index, Instant::now()) {
            continue;
        }
        let bytes = page.vt.page_bytes(page.page_index);
        let slot = ring.alloc();
        ring.write_slot(slot, bytes);
        ring.publish(PendingTransfer {
            vt_index: page.vt_index,
            page_index: page.page_index,
            slot,
        });
    }
    log::debug!("VT stream thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_table::AddressTable;
    use crate::pit::{PageFlags, PageInfoTable};
    use crate::quadtree::QuadTreeTable;
    use crate::vtexture::VirtualTexture;
    use crate::vtfile::VT_FILE_ID;
    use std::time::Duration;

    fn build_file(num_lods: u8) -> Arc<[u8]> {
        let quadtree = QuadTreeTable::new();
        let total = quadtree.total_pages(num_lods as u32);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&VT_FILE_ID.to_le_bytes());
        bytes.push(1);
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());

        let mut pit = PageInfoTable::new(total);
        for abs in 0..total {
            pit.set(abs, PageFlags::STORED, 0);
        }
        bytes.extend_from_slice(&pit.serialize());

        let mut at = AddressTable::new(num_lods, total);
        for abs in 0..total {
            at.set_byte_offset(abs, abs as u8);
        }
        bytes.extend_from_slice(&at.serialize());

        let mut payload = vec![0u8; 4 * total as usize];
        payload[12..16].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        bytes.extend_from_slice(&payload);
        bytes.into()
    }

    #[test]
    fn submitted_page_is_streamed_and_published() {
        let vt = Arc::new(VirtualTexture::open(build_file(2)).unwrap());
        let ring = TransferRing::new(4);
        let channel = StreamChannel::new();
        let handle = spawn_stream(channel.clone(), ring.clone());

        channel.submit(vec![PendingPage {
            vt_index: 0,
            vt: vt.clone(),
            page_index: 3,
            refs: 1,
        }]);

        let mut published = None;
        for _ in 0..100 {
            if let Some(p) = ring.drain_published() {
                published = Some(p);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let published = published.expect("stream thread never published a transfer");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].vt_index, 0);
        assert_eq!(published[0].page_index, 3);

        let mut out = Vec::new();
        ring.read_slot(published[0].slot, &mut out);
        assert_eq!(&out[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        ring.free(published[0].slot);

        channel.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn deduplicated_page_is_not_restreamed_within_a_second() {
        let vt = Arc::new(VirtualTexture::open(build_file(2)).unwrap());
        assert!(vt.mark_streamed(3, Instant::now()));

        let ring = TransferRing::new(4);
        let channel = StreamChannel::new();
        let handle = spawn_stream(channel.clone(), ring.clone());

        channel.submit(vec![PendingPage {
            vt_index: 0,
            vt: vt.clone(),
            page_index: 3,
            refs: 1,
        }]);
        channel.submit(vec![PendingPage {
            vt_index: 0,
            vt,
            page_index: 5,
            refs: 1,
        }]);

        let mut published = None;
        for _ in 0..100 {
            if let Some(p) = ring.drain_published() {
                published = Some(p);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let published = published.expect("stream thread never published a transfer");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].page_index, 5);

        channel.shutdown();
        handle.join().unwrap();
    }
}
