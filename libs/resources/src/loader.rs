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
// Grounded on §4.1.6: single worker thread, condvar-blocked stream queue,
// dispatch to the per-tag decoder, push the finished id onto the
// processed queue.
use crate::decode::decode_for_tag;
use crate::id::ResourceId;
use crate::registry::ResourceRegistry;
use catalog::FilesystemInterface;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<ResourceId>,
}

/// Shared between the owning `ResourceManager` and the loader thread: a
/// stream (work-in) queue and a processed (work-out) queue, each with its
/// own condvar so the loader blocks without polling and the main thread's
/// `wait_resource` can block on the processed side.
pub struct LoaderChannel {
    stream: Mutex<QueueState>,
    stream_cv: Condvar,
    processed: Mutex<QueueState>,
    processed_cv: Condvar,
    shutdown: AtomicBool,
}

impl LoaderChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stream: Mutex::new(QueueState::default()),
            stream_cv: Condvar::new(),
            processed: Mutex::new(QueueState::default()),
            processed_cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn enqueue_load(&self, id: ResourceId) {
        self.stream.lock().unwrap().queue.push_back(id);
        self.stream_cv.notify_one();
    }

    pub fn enqueue_loads(&self, ids: impl IntoIterator<Item = ResourceId>) {
        let mut guard = self.stream.lock().unwrap();
        let before = guard.queue.len();
        guard.queue.extend(ids);
        if guard.queue.len() > before {
            drop(guard);
            self.stream_cv.notify_one();
        }
    }

    /// Pop everything the loader has finished since the last call, without
    /// blocking. Used by `main_thread_update`.
    pub fn drain_processed(&self) -> Vec<ResourceId> {
        let mut guard = self.processed.lock().unwrap();
        guard.queue.drain(..).collect()
    }

    /// Block until at least one processed item is available (or shutdown).
    pub fn wait_processed(&self) {
        let guard = self.processed.lock().unwrap();
        if !guard.queue.is_empty() || self.shutdown.load(Ordering::Acquire) {
            return;
        }
        let _unused = self.processed_cv.wait(guard).unwrap();
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.stream_cv.notify_all();
        self.processed_cv.notify_all();
    }

    fn pop_stream_blocking(&self) -> Option<ResourceId> {
        let mut guard = self.stream.lock().unwrap();
        loop {
            if let Some(id) = guard.queue.pop_front() {
                return Some(id);
            }
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            guard = self.stream_cv.wait(guard).unwrap();
        }
    }

    fn push_processed(&self, id: ResourceId) {
        self.processed.lock().unwrap().queue.push_back(id);
        self.processed_cv.notify_one();
    }
}

/// Spawn the single loader worker. Returns a `JoinHandle` the manager
/// joins on shutdown.
pub fn spawn_loader(
    registry: Arc<ResourceRegistry>,
    channel: Arc<LoaderChannel>,
    fs: Arc<FilesystemInterface>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("resource-loader".into())
        .spawn(move || loader_main(&registry, &channel, &fs))
        .expect("failed to spawn resource loader thread")
}

fn loader_main(registry: &ResourceRegistry, channel: &LoaderChannel, fs: &FilesystemInterface) {
    while let Some(id) = channel.pop_stream_blocking() {
        let (tag, name) = match registry.with_proxy(id, |p| (p.tag(), p.name().to_string())) {
            Some(v) => v,
            None => continue,
        };
        // Sub-resource selector, e.g. "meshes/foo.msh#part3", is the
        // decoder's business (if any), not the file open's.
        let path = match name.find('#') {
            Some(idx) => &name[..idx],
            None => name.as_str(),
        };

        let decoded = fs.open(path).and_then(|bytes| decode_for_tag(tag, &bytes));

        registry.with_proxy_mut(id, |p| {
            p.data = decoded;
        });
        channel.push_processed(id);
    }
    log::debug!("resource loader thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ResourceTag;
    use std::time::Duration;

    #[test]
    fn enqueue_and_pop_round_trips() {
        let channel = LoaderChannel::new();
        let id = ResourceId::new(ResourceTag::Mesh, 7);
        channel.enqueue_load(id);
        assert_eq!(channel.pop_stream_blocking(), Some(id));
    }

    #[test]
    fn shutdown_unblocks_waiting_pop() {
        let channel = LoaderChannel::new();
        let channel2 = Arc::clone(&channel);
        let handle = std::thread::spawn(move || channel2.pop_stream_blocking());
        std::thread::sleep(Duration::from_millis(20));
        channel.shutdown();
        assert_eq!(handle.join().unwrap(), None);
    }
}
