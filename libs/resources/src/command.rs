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
// Command aggregation per the spec's §4.1.3 drain algorithm. This is the
// one piece of the original ResourceManager that is pure bookkeeping logic
// rather than I/O, so it's ported as closely as the type system allows.
use crate::area::{AreaAllocator, AreaId};
use crate::proxy::ProxyState;
use crate::registry::ResourceRegistry;
use crate::id::ResourceId;
use std::collections::{HashMap, HashSet};

pub enum Command {
    CreateArea(AreaId),
    DestroyArea(AreaId),
    LoadResource(ResourceId),
    UnloadResource(ResourceId),
    LoadArea(AreaId),
    UnloadArea(AreaId),
    ReloadResource(ResourceId),
    ReloadArea(AreaId),
}

/// Mutex-protected FIFO; `main_thread_update` swaps this out and drains it
/// under `execute_commands`.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    pub fn push(&mut self, cmd: Command) {
        self.commands.push(cmd);
    }

    pub fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

/// Everything the loader-side state machine needs as output from a drain:
/// which resources got newly enqueued for load (to push onto the stream
/// queue) and whether the loader condvar should be signalled at all.
pub struct DrainOutcome {
    pub newly_queued: Vec<ResourceId>,
    pub should_wake_loader: bool,
}

/// Runs the §4.1.3 aggregation pass. `delayed_release` persists across
/// calls (owned by the caller, typically the `ResourceManager`) since a
/// release can be delayed across many drains while a load is in flight.
pub fn execute_commands(
    commands: Vec<Command>,
    registry: &ResourceRegistry,
    areas: &AreaAllocator,
    delayed_release: &mut HashSet<ResourceId>,
) -> DrainOutcome {
    let mut refs: HashMap<ResourceId, i64> = HashMap::new();
    let mut reload_set: HashSet<ResourceId> = HashSet::new();

    for cmd in commands {
        match cmd {
            Command::CreateArea(area) => {
                if let Some(resources) = areas.with_area(area, |a| a.resources().to_vec()) {
                    for r in &resources {
                        registry.with_proxy_mut(*r, |p| p.add_area(area));
                    }
                    let ready_count = resources
                        .iter()
                        .filter(|r| {
                            registry
                                .with_proxy(**r, |p| {
                                    matches!(p.state(), ProxyState::Ready | ProxyState::Invalid)
                                })
                                .unwrap_or(false)
                        })
                        .count();
                    areas.with_area_mut(area, |a| a.loaded_count = ready_count);
                }
            }
            Command::DestroyArea(area) => {
                if let Some(resources) = areas.with_area(area, |a| a.resources().to_vec()) {
                    for r in &resources {
                        registry.with_proxy_mut(*r, |p| p.remove_area(area));
                    }
                }
                areas.free(area);
            }
            Command::LoadResource(r) => {
                *refs.entry(r).or_insert(0) += 1;
            }
            Command::UnloadResource(r) => {
                *refs.entry(r).or_insert(0) -= 1;
            }
            Command::LoadArea(area) => {
                let already = areas
                    .with_area(area, |a| a.load_flag)
                    .unwrap_or(true);
                if !already {
                    areas.with_area_mut(area, |a| a.load_flag = true);
                    if let Some(resources) = areas.with_area(area, |a| a.resources().to_vec()) {
                        for r in resources {
                            *refs.entry(r).or_insert(0) += 1;
                        }
                    }
                }
            }
            Command::UnloadArea(area) => {
                let already = areas
                    .with_area(area, |a| a.load_flag)
                    .unwrap_or(false);
                if already {
                    areas.with_area_mut(area, |a| a.load_flag = false);
                    if let Some(resources) = areas.with_area(area, |a| a.resources().to_vec()) {
                        for r in resources {
                            *refs.entry(r).or_insert(0) -= 1;
                        }
                    }
                }
            }
            Command::ReloadResource(r) => {
                reload_set.insert(r);
            }
            Command::ReloadArea(area) => {
                if let Some(resources) = areas.with_area(area, |a| a.resources().to_vec()) {
                    reload_set.extend(resources);
                }
            }
        }
    }

    let mut newly_queued = Vec::new();

    for (r, delta) in refs {
        if delta > 0 {
            let transitioned = registry
                .with_proxy_mut(r, |p| {
                    let prev = p.use_count;
                    p.use_count += delta as i32;
                    if prev == 0 {
                        if delayed_release.remove(&r) {
                            false
                        } else if p.state() != ProxyState::Load {
                            p.state = ProxyState::Load;
                            true
                        } else {
                            false
                        }
                    } else {
                        false
                    }
                })
                .unwrap_or(false);
            if transitioned {
                newly_queued.push(r);
            }
        } else if delta < 0 {
            registry.with_proxy_mut(r, |p| {
                p.use_count += delta as i32;
                debug_assert!(p.use_count >= 0, "use_count underflow");
                if p.use_count == 0 {
                    if p.state() == ProxyState::Load {
                        delayed_release.insert(r);
                    } else {
                        release_now(p, areas);
                    }
                }
            });
        }
    }

    for r in reload_set {
        delayed_release.remove(&r);
        let needs_queue = registry
            .with_proxy_mut(r, |p| match p.state() {
                ProxyState::Load => false,
                ProxyState::Ready | ProxyState::Invalid => {
                    decrement_owner_areas(r, registry, areas);
                    p.purge();
                    p.state = ProxyState::Load;
                    true
                }
                ProxyState::Free => {
                    p.state = ProxyState::Load;
                    true
                }
            })
            .unwrap_or(false);
        if needs_queue {
            newly_queued.push(r);
        }
    }

    let should_wake_loader = !newly_queued.is_empty();
    DrainOutcome {
        newly_queued,
        should_wake_loader,
    }
}

fn decrement_owner_areas(r: ResourceId, registry: &ResourceRegistry, areas: &AreaAllocator) {
    let owning = registry.with_proxy(r, |p| p.areas().to_vec()).unwrap_or_default();
    for area in owning {
        areas.with_area_mut(area, |a| {
            a.loaded_count = a.loaded_count.saturating_sub(1);
        });
    }
}

fn release_now(p: &mut crate::proxy::ResourceProxy, areas: &AreaAllocator) {
    p.purge();
    for area in p.areas().to_vec() {
        areas.with_area_mut(area, |a| {
            a.loaded_count = a.loaded_count.saturating_sub(1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ResourceTag;

    fn setup() -> (ResourceRegistry, AreaAllocator) {
        (ResourceRegistry::new(), AreaAllocator::new())
    }

    #[test]
    fn load_then_unload_releases_immediately_when_free() {
        let (reg, areas) = setup();
        let r = reg.get_or_create("a", ResourceTag::Mesh);
        let mut delayed = HashSet::new();

        let outcome = execute_commands(
            vec![Command::LoadResource(r)],
            &reg,
            &areas,
            &mut delayed,
        );
        assert_eq!(outcome.newly_queued, vec![r]);
        assert_eq!(reg.with_proxy(r, |p| p.state()).unwrap(), ProxyState::Load);

        // Simulate the loader finishing and the main thread marking Ready.
        reg.with_proxy_mut(r, |p| p.state = ProxyState::Ready);

        let outcome2 = execute_commands(
            vec![Command::UnloadResource(r)],
            &reg,
            &areas,
            &mut delayed,
        );
        assert!(outcome2.newly_queued.is_empty());
        assert_eq!(reg.with_proxy(r, |p| p.state()).unwrap(), ProxyState::Free);
        assert!(delayed.is_empty());
    }

    #[test]
    fn unload_while_loading_is_delayed() {
        let (reg, areas) = setup();
        let r = reg.get_or_create("a", ResourceTag::Mesh);
        let mut delayed = HashSet::new();

        execute_commands(vec![Command::LoadResource(r)], &reg, &areas, &mut delayed);
        execute_commands(vec![Command::UnloadResource(r)], &reg, &areas, &mut delayed);

        assert!(delayed.contains(&r));
        // Still Load: the delayed release hasn't fired yet.
        assert_eq!(reg.with_proxy(r, |p| p.state()).unwrap(), ProxyState::Load);
    }

    #[test]
    fn reload_while_loading_coalesces_as_noop() {
        let (reg, areas) = setup();
        let r = reg.get_or_create("a", ResourceTag::Mesh);
        let mut delayed = HashSet::new();

        let outcome = execute_commands(vec![Command::LoadResource(r)], &reg, &areas, &mut delayed);
        assert_eq!(outcome.newly_queued, vec![r]);

        let outcome2 = execute_commands(
            vec![Command::ReloadResource(r)],
            &reg,
            &areas,
            &mut delayed,
        );
        assert!(outcome2.newly_queued.is_empty());
        assert_eq!(reg.with_proxy(r, |p| p.state()).unwrap(), ProxyState::Load);
    }

    #[test]
    fn reload_on_ready_purges_and_requeues() {
        let (reg, areas) = setup();
        let r = reg.get_or_create("a", ResourceTag::Mesh);
        reg.with_proxy_mut(r, |p| {
            p.state = ProxyState::Ready;
            p.data = Some(Box::new(42u32));
        });
        let mut delayed = HashSet::new();

        let outcome = execute_commands(
            vec![Command::ReloadResource(r)],
            &reg,
            &areas,
            &mut delayed,
        );
        assert_eq!(outcome.newly_queued, vec![r]);
        assert_eq!(reg.with_proxy(r, |p| p.state()).unwrap(), ProxyState::Load);
        assert!(!reg.with_proxy(r, |p| p.has_data()).unwrap());
    }
}
