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
// A minimal demo binary: opens a resource manager and a virtual texture
// cache against a directory and runs a bounded number of update ticks,
// logging progress. No windowing, no ECS, no render passes — see
// DESIGN.md for why those are out of scope for this core.
use anyhow::Result;
use catalog::{Catalog, FilesystemInterface};
use gpu::Gpu;
use resources::{ResourceManager, ResourceManagerOpts};
use std::time::Duration;
use structopt::StructOpt;

#[derive(Clone, Debug, StructOpt)]
struct Opt {
    #[structopt(flatten)]
    resources: ResourceManagerOpts,

    #[structopt(flatten)]
    vt_cache: vt::VtCacheOpts,

    /// Number of update ticks to run before exiting.
    #[structopt(long, default_value = "60")]
    ticks: u32,
}

fn main() -> Result<()> {
    env_logger::init();
    let mut opt = Opt::from_args();

    let fs = FilesystemInterface::new(opt.resources.resource_root.clone(), Catalog::empty());
    let manager = ResourceManager::new(fs);

    let gpu = Gpu::new_headless()?;
    opt.vt_cache.max_texture_size = gpu.device().limits().max_texture_dimension_2d;
    let mut vt_cache = vt::VirtualTextureCache::new(gpu, &opt.vt_cache, Vec::new());

    let stream_channel = vt::StreamChannel::new();
    let stream_handle = vt::spawn_stream(stream_channel.clone(), vt_cache.ring());
    let mut feedback = vt::FeedbackAnalyzer::new();

    log::info!("argon: running {} update ticks", opt.ticks);
    for tick in 0..opt.ticks {
        manager.main_thread_update(Some(Duration::from_millis(8)));

        feedback.begin();
        // A renderer would bind each active VT's sampler unit and queue
        // its feedback readback here; this headless demo registers no
        // textures, so `end` always resolves to an empty request list.
        let pending = feedback.end(vt_cache.is_thrash_backoff_active());
        stream_channel.submit(pending);

        let uploaded = vt_cache.update();
        if uploaded > 0 {
            log::info!("tick {tick}: uploaded {uploaded} pages");
        }
    }

    stream_channel.shutdown();
    stream_handle.join().expect("VT stream thread panicked");

    Ok(())
}
