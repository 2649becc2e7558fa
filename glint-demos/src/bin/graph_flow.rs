//! Render graph flow demo: builds a small frame graph against a headless
//! Vulkan device (a shadow depth pass feeding a lighting pass into an
//! offscreen target, plus a dead pass that the compiler culls), then runs a
//! few frames to show transient pooling and frames-in-flight pacing.
//! Requires a Vulkan 1.3 capable driver; no window needed.

use glint_rdg::{FrameSyncManager, GraphConfig, PassCallback, RenderGraph, SamplerKind, TransientPool};
use glint_rhi::{
    Access, ClearColor, CommandPoolManager, Device, ImageLayout, LoadOp, PipelineStages, StoreOp,
    TextureDescriptor, TextureFormat, TextureUsage, VulkanDevice,
};
use std::sync::Arc;

fn main() {
    env_logger::init();

    let config = GraphConfig::default();
    let device: Arc<dyn Device> = VulkanDevice::new().expect("VulkanDevice::new");
    let pools = Arc::new(CommandPoolManager::new(device.clone()));
    let transients = TransientPool::with_max_idle_frames(device.clone(), config.pool_max_idle_frames);
    let mut sync =
        FrameSyncManager::new(&device, config.frames_in_flight).expect("FrameSyncManager::new");

    let offscreen: Arc<dyn glint_rhi::Texture> = device
        .create_texture(&TextureDescriptor {
            label: Some("offscreen target"),
            size: (1280, 720, 1),
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
            ..Default::default()
        })
        .expect("offscreen target")
        .into();
    let mut offscreen_layout = ImageLayout::Undefined;

    for frame in 0..3u32 {
        let mut graph = RenderGraph::new(device.clone(), pools.clone(), transients.clone());

        let target =
            graph.import_external_texture(offscreen.clone(), "offscreen target", offscreen_layout);
        let shadow = graph.create_transient_texture(&TextureDescriptor {
            label: Some("shadow depth"),
            size: (1024, 1024, 1),
            format: TextureFormat::D32Float,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        });
        // Nobody consumes this one; the compiler culls its producer and the
        // pool never sees an allocation for it.
        let scratch = graph.create_transient_texture(&TextureDescriptor {
            label: Some("unused scratch"),
            size: (1280, 720, 1),
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        });

        graph
            .add_pass("shadow", PassCallback::noop())
            .write_depth_stencil_attachment(
                shadow,
                LoadOp::Clear,
                StoreOp::Store,
                LoadOp::DontCare,
                StoreOp::DontCare,
                1.0,
                0,
            );

        graph.add_pass("scratch", PassCallback::noop()).write_color_attachment(
            scratch,
            LoadOp::Clear,
            StoreOp::DontCare,
            ClearColor::TRANSPARENT,
        );

        graph
            .add_pass(
                "lighting",
                PassCallback::with_resources(move |_cmd, resources| {
                    // A real pass would bind a pipeline and draw; here we just
                    // prove the accessor resolves what the callback needs.
                    let depth = resources.texture(shadow);
                    let _ = depth.format();
                    let _pcf = resources.sampler(SamplerKind::ShadowPcf)?;
                    Ok(())
                }),
            )
            .read_texture(shadow, PipelineStages::FRAGMENT_SHADER, Access::SHADER_READ)
            .write_color_attachment(
                target,
                LoadOp::Clear,
                StoreOp::Store,
                ClearColor { r: 0.05, g: 0.05, b: 0.08, a: 1.0 },
            );

        graph.execute(Some(sync.current())).expect("graph execute");
        offscreen_layout = ImageLayout::ColorAttachment;

        println!(
            "frame {}: submitted, {} transient textures pooled",
            frame,
            transients.pooled_texture_count()
        );
        sync.advance().expect("sync advance");
    }

    sync.wait_all().expect("wait_all");
    println!("graph flow OK");
}
