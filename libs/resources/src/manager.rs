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
// Grounded on Engine::World::Resources::ResourceManager: ties the
// registry, area allocator, command buffer and loader thread together.
use crate::area::{AreaAllocator, AreaId};
use crate::command::{execute_commands, Command, CommandBuffer};
use crate::decode::upload_for_tag;
use crate::handle::{ResourceHandle, ResourceKind};
use crate::id::ResourceId;
use crate::loader::{spawn_loader, LoaderChannel};
use crate::proxy::{ProxyFlags, ProxyState};
use crate::registry::ResourceRegistry;
use catalog::FilesystemInterface;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone)]
pub struct ResourceManagerOpts {
    /// Root directory resolved for `/Root/` paths.
    #[structopt(long, default_value = ".")]
    pub resource_root: String,
}

/// The Resource Manager (§4.1): a name-keyed registry of proxies, a
/// command queue draining into a loader thread, and an area allocator for
/// coarse load/unload groups.
pub struct ResourceManager {
    registry: Arc<ResourceRegistry>,
    areas: AreaAllocator,
    commands: Mutex<CommandBuffer>,
    delayed_release: Mutex<HashSet<ResourceId>>,
    channel: Arc<LoaderChannel>,
    loader: Option<JoinHandle<()>>,
    fs: Arc<FilesystemInterface>,
}

impl ResourceManager {
    pub fn new(fs: FilesystemInterface) -> Self {
        let registry = Arc::new(ResourceRegistry::new());
        let channel = LoaderChannel::new();
        let fs = Arc::new(fs);
        let loader = spawn_loader(Arc::clone(&registry), Arc::clone(&channel), Arc::clone(&fs));
        Self {
            registry,
            areas: AreaAllocator::new(),
            commands: Mutex::new(CommandBuffer::new()),
            delayed_release: Mutex::new(HashSet::new()),
            channel,
            loader: Some(loader),
            fs,
        }
    }

    // -- §4.1.1 registration and lookup --------------------------------

    /// `None` on empty name (InvalidName, §7) or a pre-existing proxy
    /// registered under a different tag (TypeMismatch, §7); both are
    /// caller-visible invalid handles.
    pub fn get_resource<T: ResourceKind>(&self, name: &str) -> Option<ResourceHandle<T>> {
        if name.is_empty() {
            return None;
        }
        if let Some(existing) = self.registry.find(name) {
            return ResourceHandle::from_id(existing).or_else(|| {
                log::warn!("resource '{name}' requested as a different type than registered");
                None
            });
        }
        let id = self.registry.get_or_create(name, T::TAG);
        ResourceHandle::from_id(id)
    }

    pub fn find_resource(&self, name: &str) -> Option<ResourceId> {
        self.registry.find(name)
    }

    // -- §4.1.2 procedural creation -------------------------------------

    pub fn create_resource_with_data<T: ResourceKind>(
        &self,
        name: &str,
        value: T,
    ) -> Option<ResourceHandle<T>> {
        if name.is_empty() {
            return None;
        }
        let existing = self.registry.find(name);
        if let Some(id) = existing {
            if id.tag() != Some(T::TAG) {
                return None;
            }
        }
        let id = self.registry.get_or_create(name, T::TAG);
        let areas_to_bump = self.registry.with_proxy_mut(id, |p| {
            p.data = Some(Box::new(value));
            p.state = ProxyState::Ready;
            p.flags.insert(ProxyFlags::PROCEDURAL);
            p.use_count += 1;
            p.areas().to_vec()
        })?;
        for area in areas_to_bump {
            self.areas
                .with_area_mut(area, |a| a.loaded_count += 1);
        }
        ResourceHandle::from_id(id)
    }

    /// Opens `path` on the calling thread and decodes inline; an empty
    /// `T` on open failure (§4.1.2 — no Result propagates out).
    pub fn create_resource_from_file<T: ResourceKind>(&self, path: &str) -> T {
        self.fs
            .open(path)
            .and_then(|bytes| T::decode(&bytes))
            .unwrap_or_else(T::empty)
    }

    // -- §4.1.3 command submission ---------------------------------------

    pub fn load_resource(&self, id: ResourceId) {
        self.commands.lock().unwrap().push(Command::LoadResource(id));
    }

    pub fn unload_resource(&self, id: ResourceId) {
        self.commands
            .lock()
            .unwrap()
            .push(Command::UnloadResource(id));
    }

    pub fn reload_resource(&self, id: ResourceId) {
        self.commands
            .lock()
            .unwrap()
            .push(Command::ReloadResource(id));
    }

    pub fn create_area(&self, resources: Vec<ResourceId>) -> AreaId {
        let area = self.areas.allocate(resources);
        self.commands.lock().unwrap().push(Command::CreateArea(area));
        area
    }

    pub fn destroy_area(&self, area: AreaId) {
        self.commands
            .lock()
            .unwrap()
            .push(Command::UnloadArea(area));
        self.commands
            .lock()
            .unwrap()
            .push(Command::DestroyArea(area));
    }

    pub fn load_area(&self, area: AreaId) {
        self.commands.lock().unwrap().push(Command::LoadArea(area));
    }

    pub fn unload_area(&self, area: AreaId) {
        self.commands
            .lock()
            .unwrap()
            .push(Command::UnloadArea(area));
    }

    pub fn reload_area(&self, area: AreaId) {
        self.commands
            .lock()
            .unwrap()
            .push(Command::ReloadArea(area));
    }

    pub fn is_area_ready(&self, area: AreaId) -> bool {
        self.areas.with_area(area, |a| a.is_ready()).unwrap_or(true)
    }

    // -- §4.1.4 main-thread update ---------------------------------------

    /// Drains commands, pumps finished loads into `Ready`/`Invalid`, and
    /// sweeps `delayed_release`. `time_budget` of `None` disables the
    /// wall-clock cutoff (used by the wait helpers).
    pub fn main_thread_update(&self, time_budget: Option<Duration>) {
        let start = Instant::now();

        let pending = self.commands.lock().unwrap().take();
        if !pending.is_empty() {
            let mut delayed = self.delayed_release.lock().unwrap();
            let outcome = execute_commands(pending, &self.registry, &self.areas, &mut delayed);
            if outcome.should_wake_loader {
                self.channel.enqueue_loads(outcome.newly_queued);
            }
        }

        loop {
            if let Some(budget) = time_budget {
                if start.elapsed() >= budget {
                    break;
                }
            }
            let processed = self.channel.drain_processed();
            if processed.is_empty() {
                break;
            }
            for id in processed {
                let areas_to_bump = self.registry.with_proxy_mut(id, |p| {
                    if p.has_data() {
                        p.state = ProxyState::Ready;
                        let tag = p.tag();
                        if let Some(data) = p.data.as_deref_mut() {
                            upload_for_tag(tag, data);
                        }
                    } else {
                        p.state = ProxyState::Invalid;
                    }
                    p.areas().to_vec()
                });
                if let Some(areas) = areas_to_bump {
                    for area in areas {
                        self.areas.with_area_mut(area, |a| a.loaded_count += 1);
                    }
                }
            }
        }

        self.sweep_delayed_release();
    }

    /// Any `delayed_release` entry whose state has left `Load` (it settled
    /// to `Ready` or `Invalid` in the pump above) is released now (§4.1.4
    /// step 3).
    fn sweep_delayed_release(&self) {
        let mut delayed = self.delayed_release.lock().unwrap();
        let finished: Vec<ResourceId> = delayed
            .iter()
            .filter(|r| {
                self.registry
                    .with_proxy(**r, |p| p.state() != ProxyState::Load)
                    .unwrap_or(true)
            })
            .copied()
            .collect();
        for r in finished {
            delayed.remove(&r);
            let owning = self
                .registry
                .with_proxy_mut(r, |p| {
                    let owning = p.areas().to_vec();
                    p.purge();
                    owning
                })
                .unwrap_or_default();
            for area in owning {
                self.areas
                    .with_area_mut(area, |a| a.loaded_count = a.loaded_count.saturating_sub(1));
            }
        }
    }

    // -- §4.1.5 wait helpers ----------------------------------------------

    /// Main-thread-only: blocks until `id`'s proxy leaves `Load`.
    pub fn wait_resource(&self, id: ResourceId) {
        loop {
            self.main_thread_update(None);
            let settled = self
                .registry
                .with_proxy(id, |p| p.state() != ProxyState::Load)
                .unwrap_or(true);
            if settled {
                return;
            }
            self.channel.wait_processed();
        }
    }

    pub fn wait_area(&self, area: AreaId) {
        loop {
            self.main_thread_update(None);
            if self.is_area_ready(area) {
                return;
            }
            self.channel.wait_processed();
        }
    }

    pub(crate) fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.channel.shutdown();
        if let Some(handle) = self.loader.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Texture;
    use catalog::Catalog;
    use std::time::Duration;

    fn tiny_texture_bytes() -> Vec<u8> {
        let mut bytes = vec![b'H', b'k', ResourceTag::Texture as u8, 1];
        bytes.push(2); // ImageKind::D2
        bytes.extend_from_slice(&0u32.to_le_bytes()); // format
        bytes.extend_from_slice(&1u32.to_le_bytes()); // width
        bytes.extend_from_slice(&1u32.to_le_bytes()); // height
        bytes.extend_from_slice(&1u32.to_le_bytes()); // depth
        bytes.extend_from_slice(&1u32.to_le_bytes()); // mip_count
        bytes.extend_from_slice(&1u32.to_le_bytes()); // slice_count
        let payload = vec![0xffu8];
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        bytes
    }

    fn manager_with_temp_file() -> (ResourceManager, String) {
        let dir = std::env::temp_dir().join(format!(
            "argon_resources_test_{:?}",
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("tex.hk");
        std::fs::write(&file, tiny_texture_bytes()).unwrap();
        let fs = FilesystemInterface::new(dir, Catalog::empty());
        let name = format!("/FS/{}", file.display());
        (ResourceManager::new(fs), name)
    }

    // S1. Basic load/unload.
    #[test]
    fn s1_basic_load_unload() {
        let (mgr, name) = manager_with_temp_file();
        let handle: ResourceHandle<Texture> = mgr.get_resource(&name).unwrap();
        mgr.load_resource(handle.id());
        mgr.wait_resource(handle.id());

        let (state, use_count) = mgr
            .registry()
            .with_proxy(handle.id(), |p| (p.state(), p.use_count()))
            .unwrap();
        assert_eq!(state, ProxyState::Ready);
        assert_eq!(use_count, 1);

        mgr.unload_resource(handle.id());
        mgr.main_thread_update(Some(Duration::from_millis(100)));

        let state = mgr.registry().with_proxy(handle.id(), |p| p.state()).unwrap();
        assert_eq!(state, ProxyState::Free);
    }

    // S2. Area gating.
    #[test]
    fn s2_area_gating() {
        let (mgr, name) = manager_with_temp_file();
        let r1: ResourceHandle<Texture> = mgr.get_resource(&name).unwrap();
        let r2: ResourceHandle<Texture> = mgr.get_resource(&format!("{name}#other")).unwrap();

        let area = mgr.create_area(vec![r1.id(), r1.id(), r2.id()]);
        mgr.load_area(area);
        mgr.wait_area(area);

        assert!(mgr.is_area_ready(area));

        mgr.unload_area(area);
        mgr.destroy_area(area);
        mgr.main_thread_update(Some(Duration::from_millis(100)));

        assert!(mgr.areas.is_free(area));
    }

    #[test]
    fn empty_name_is_invalid() {
        let (mgr, _name) = manager_with_temp_file();
        assert!(mgr.get_resource::<Texture>("").is_none());
    }

    #[test]
    fn missing_file_settles_to_invalid() {
        let (mgr, name) = manager_with_temp_file();
        let missing = format!("{name}.missing");
        let handle: ResourceHandle<Texture> = mgr.get_resource(&missing).unwrap();
        mgr.load_resource(handle.id());
        mgr.wait_resource(handle.id());
        let state = mgr.registry().with_proxy(handle.id(), |p| p.state()).unwrap();
        assert_eq!(state, ProxyState::Invalid);
    }
}
