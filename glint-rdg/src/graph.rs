//! The render graph object: a single-use, per-frame recorder that compiles
//! and executes itself. Resource declaration and pass recording happen in
//! any order before `execute`; the graph is consumed by execution.

use crate::compile;
use crate::execute;
use crate::handle::{BufferHandle, TextureHandle};
use crate::pass::{PassBuilder, PassCallback, PassRecord};
use crate::pool::TransientPool;
use crate::registry::ResourceRegistry;
use crate::sync::SyncBundle;
use crate::RdgResult;
use glint_rhi::{
    Buffer, BufferDescriptor, CommandPoolManager, Device, ImageLayout, Swapchain, Texture,
    TextureDescriptor,
};
use std::sync::Arc;

pub struct RenderGraph {
    #[allow(dead_code)]
    device: Arc<dyn Device>,
    pools: Arc<CommandPoolManager>,
    pub(crate) transients: Arc<TransientPool>,
    pub(crate) registry: ResourceRegistry,
    pub(crate) passes: Vec<PassRecord>,
}

impl RenderGraph {
    /// A fresh graph for one frame. The pool manager and transient pool are
    /// the long-lived collaborators shared by every frame's graph.
    pub fn new(
        device: Arc<dyn Device>,
        pools: Arc<CommandPoolManager>,
        transients: Arc<TransientPool>,
    ) -> Self {
        Self {
            device,
            pools,
            transients,
            registry: ResourceRegistry::new(),
            passes: Vec::new(),
        }
    }

    /// Declare a graph-owned texture. No memory is bound until compile, and
    /// none ever is if no surviving pass touches it.
    pub fn create_transient_texture(&mut self, desc: &TextureDescriptor) -> TextureHandle {
        self.registry.declare_texture(desc)
    }

    /// Declare a graph-owned buffer.
    pub fn create_transient_buffer(&mut self, desc: &BufferDescriptor) -> BufferHandle {
        self.registry.declare_buffer(desc)
    }

    /// Import a caller-owned texture in its current layout. The graph
    /// transitions it as passes require and never frees it.
    pub fn import_external_texture(
        &mut self,
        texture: Arc<dyn Texture>,
        name: &str,
        current_layout: ImageLayout,
    ) -> TextureHandle {
        self.registry.import_texture(texture, name, current_layout)
    }

    /// Import a caller-owned buffer.
    pub fn import_external_buffer(&mut self, buffer: Arc<dyn Buffer>, name: &str) -> BufferHandle {
        self.registry.import_buffer(buffer, name)
    }

    /// Import an acquired swapchain image. The graph transitions it into
    /// attachment layout before first use and into present layout at the end
    /// of the frame.
    pub fn import_swapchain_image(
        &mut self,
        swapchain: &dyn Swapchain,
        image_index: u32,
    ) -> TextureHandle {
        self.registry.import_swapchain_image(swapchain, image_index)
    }

    /// Append a pass. Passes execute in the order they are added (after
    /// culling); the returned builder records its read/write declarations.
    pub fn add_pass(&mut self, name: &str, callback: PassCallback) -> PassBuilder<'_> {
        let index = self.passes.len();
        self.passes.push(PassRecord::new(name, callback));
        PassBuilder::new(self, index)
    }

    /// Compile and submit the frame. Returns once the command buffer is
    /// handed to the queue; completion is observed through the sync bundle's
    /// fence. Transient backings retire into the pool for the next frame.
    pub fn execute(mut self, sync: Option<&SyncBundle>) -> RdgResult<()> {
        let compiled = compile::compile(&self.passes, &mut self.registry, &self.transients)?;
        execute::execute(
            &self.pools,
            &mut self.registry,
            &mut self.passes,
            &compiled,
            &self.transients,
            sync,
        )?;
        self.transients.end_frame();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_rhi::{test_graph, test_graph_shared, Event, TestSwapchain};
    use crate::{FrameSyncManager, SamplerKind};
    use glint_rhi::{
        Access, BufferUsage, ClearColor, ComputePipelineDescriptor, DescriptorSetLayoutBinding,
        DescriptorType, LoadOp, PipelineStages, ShaderStage, ShaderStages, StoreOp, TextureFormat,
        TextureUsage,
    };

    fn color_desc(label: &'static str) -> TextureDescriptor {
        TextureDescriptor {
            label: Some(label),
            size: (256, 256, 1),
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        }
    }

    #[test]
    fn empty_graph_submits_an_empty_command_buffer() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (graph, device) = test_graph();
        graph.execute(None).unwrap();
        let events = device.events();
        assert_eq!(events, vec![Event::Begin, Event::End, Event::Submit { command_buffers: 1, waits: 0, signals: 0, fenced: false }]);
    }

    #[test]
    fn fully_culled_graph_behaves_like_an_empty_one() {
        let (mut graph, device) = test_graph();
        let t1 = graph.create_transient_texture(&color_desc("t1"));
        graph
            .add_pass("dead", PassCallback::noop())
            .write_color_attachment(t1, LoadOp::Clear, StoreOp::Store, ClearColor::TRANSPARENT);
        graph.execute(None).unwrap();
        let names: Vec<&'static str> = device.events().iter().map(Event::name).collect();
        assert_eq!(names, vec!["begin", "end", "submit"]);
        assert_eq!(device.texture_allocations(), 0);
    }

    #[test]
    fn single_pass_to_swapchain_records_draw_between_transitions() {
        let (mut graph, device) = test_graph();
        let swapchain = TestSwapchain::new(3, (800, 600));
        let target = graph.import_swapchain_image(&swapchain, 0);
        graph
            .add_pass(
                "triangle",
                PassCallback::plain(|cmd| {
                    cmd.draw(3, 1, 0, 0);
                    Ok(())
                }),
            )
            .write_color_attachment(
                target,
                LoadOp::Clear,
                StoreOp::Store,
                ClearColor { r: 0.1, g: 0.1, b: 0.1, a: 1.0 },
            );
        graph.execute(None).unwrap();

        let events = device.events();
        let names: Vec<&'static str> = events.iter().map(Event::name).collect();
        assert_eq!(
            names,
            vec!["begin", "barrier", "begin_rendering", "draw", "end_rendering", "barrier", "end", "submit"]
        );
        // First barrier: Undefined -> ColorAttachment.
        match &events[1] {
            Event::Barrier { textures, .. } => {
                assert_eq!(textures.len(), 1);
                assert_eq!(textures[0].old_layout, ImageLayout::Undefined);
                assert_eq!(textures[0].new_layout, ImageLayout::ColorAttachment);
            }
            other => panic!("expected barrier, got {:?}", other),
        }
        // Rendering scope opened with the attachment already in attachment layout.
        match &events[2] {
            Event::BeginRendering { color_layouts, render_area, .. } => {
                assert_eq!(color_layouts, &[ImageLayout::ColorAttachment]);
                assert_eq!(*render_area, (800, 600));
            }
            other => panic!("expected begin_rendering, got {:?}", other),
        }
        // Trailing barrier: ColorAttachment -> PresentSrc.
        match &events[5] {
            Event::Barrier { textures, .. } => {
                assert_eq!(textures[0].old_layout, ImageLayout::ColorAttachment);
                assert_eq!(textures[0].new_layout, ImageLayout::PresentSrc);
            }
            other => panic!("expected barrier, got {:?}", other),
        }
    }

    #[test]
    fn compute_pass_dispatches_outside_rendering_scopes() {
        let (mut graph, device) = test_graph();
        let swapchain = TestSwapchain::new(2, (640, 480));
        let pipeline = device
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some("particle update"),
                shader: ShaderStage {
                    source: vec![0u8; 16],
                    entry_point: "main".to_string(),
                },
                layout_bindings: vec![DescriptorSetLayoutBinding {
                    binding: 0,
                    descriptor_type: DescriptorType::StorageBuffer,
                    count: 1,
                    stages: ShaderStages::COMPUTE,
                }],
            })
            .unwrap();
        let particles = graph.create_transient_buffer(&BufferDescriptor {
            label: Some("particles"),
            size: 1 << 16,
            usage: BufferUsage::STORAGE,
            memory: Default::default(),
        });
        let target = graph.import_swapchain_image(&swapchain, 0);
        graph
            .add_pass(
                "particle update",
                PassCallback::with_resources(move |cmd, resources| {
                    assert_eq!(resources.buffer(particles).size(), 1 << 16);
                    cmd.set_compute_pipeline(pipeline.as_ref());
                    cmd.dispatch(256, 1, 1);
                    Ok(())
                }),
            )
            .write_storage_buffer(particles, PipelineStages::COMPUTE_SHADER, Access::SHADER_WRITE);
        graph
            .add_pass("draw particles", PassCallback::noop())
            .read_buffer(particles, PipelineStages::VERTEX_SHADER, Access::SHADER_READ)
            .write_color_attachment(target, LoadOp::Clear, StoreOp::Store, ClearColor::TRANSPARENT);
        graph.execute(None).unwrap();

        let events = device.events();
        let names: Vec<&'static str> = events.iter().map(Event::name).collect();
        // The compute pass records with no rendering scope around it; the
        // consumer's single barrier call carries the buffer hazard alongside
        // the attachment transition.
        assert_eq!(
            names,
            vec![
                "begin",
                "bind_compute_pipeline",
                "dispatch",
                "barrier",
                "begin_rendering",
                "end_rendering",
                "barrier",
                "end",
                "submit"
            ]
        );
        assert!(events.contains(&Event::Dispatch { x: 256, y: 1, z: 1 }));
        match &events[3] {
            Event::Barrier { buffers, .. } => assert_eq!(*buffers, 1),
            other => panic!("expected barrier, got {:?}", other),
        }
    }

    #[test]
    fn failing_callback_does_not_poison_the_frame() {
        let (mut graph, device) = test_graph();
        let swapchain = TestSwapchain::new(2, (640, 480));
        let target = graph.import_swapchain_image(&swapchain, 0);
        graph
            .add_pass("first", PassCallback::plain(|cmd| {
                cmd.draw(3, 1, 0, 0);
                Ok(())
            }))
            .write_color_attachment(target, LoadOp::Clear, StoreOp::Store, ClearColor::TRANSPARENT);
        graph
            .add_pass("middle", PassCallback::plain(|_| Err("shader blew up".to_string())))
            .write_color_attachment(target, LoadOp::Load, StoreOp::Store, ClearColor::TRANSPARENT);
        graph
            .add_pass("last", PassCallback::plain(|cmd| {
                cmd.draw(3, 1, 0, 0);
                Ok(())
            }))
            .write_color_attachment(target, LoadOp::Load, StoreOp::Store, ClearColor::TRANSPARENT);
        graph.execute(None).unwrap();

        let events = device.events();
        let renders = events.iter().filter(|e| e.name() == "begin_rendering").count();
        let closes = events.iter().filter(|e| e.name() == "end_rendering").count();
        let draws = events.iter().filter(|e| e.name() == "draw").count();
        let submits = events.iter().filter(|e| e.name() == "submit").count();
        // All three scopes opened and closed, outer draws recorded, one submission.
        assert_eq!(renders, 3);
        assert_eq!(closes, 3);
        assert_eq!(draws, 2);
        assert_eq!(submits, 1);
        assert_eq!(events.last().map(Event::name), Some("submit"));
    }

    #[test]
    fn accessor_resolves_backings_layouts_and_samplers() {
        let (mut graph, device) = test_graph();
        let swapchain = TestSwapchain::new(2, (640, 480));
        let shadow = graph.create_transient_texture(&TextureDescriptor {
            label: Some("shadow"),
            size: (1024, 1024, 1),
            format: TextureFormat::D32Float,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        });
        let target = graph.import_swapchain_image(&swapchain, 0);
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
        graph
            .add_pass(
                "lighting",
                PassCallback::with_resources(move |_cmd, resources| {
                    // The transient has a live backing and sits in the layout
                    // the preceding barrier moved it to.
                    let texture = resources.texture(shadow);
                    assert_eq!(texture.format(), TextureFormat::D32Float);
                    assert_eq!(resources.texture_layout(shadow), ImageLayout::ShaderReadOnly);
                    let _pcf = resources.sampler(SamplerKind::ShadowPcf)?;
                    Ok(())
                }),
            )
            .read_texture(shadow, PipelineStages::FRAGMENT_SHADER, Access::SHADER_READ)
            .write_color_attachment(target, LoadOp::Clear, StoreOp::Store, ClearColor::TRANSPARENT);
        graph.execute(None).unwrap();
        assert_eq!(device.sampler_allocations(), 1);
    }

    #[test]
    fn second_frame_reuses_pooled_transients() {
        let (device, pools, transients) = test_graph_shared();
        for _ in 0..2 {
            let mut graph = RenderGraph::new(device.clone(), pools.clone(), transients.clone());
            let swapchain = TestSwapchain::new(2, (640, 480));
            let scratch = graph.create_transient_texture(&color_desc("scratch"));
            let target = graph.import_swapchain_image(&swapchain, 0);
            graph
                .add_pass("scratch", PassCallback::noop())
                .write_color_attachment(scratch, LoadOp::Clear, StoreOp::Store, ClearColor::TRANSPARENT);
            graph
                .add_pass("composite", PassCallback::noop())
                .read_texture(scratch, PipelineStages::FRAGMENT_SHADER, Access::SHADER_READ)
                .write_color_attachment(target, LoadOp::Clear, StoreOp::Store, ClearColor::TRANSPARENT);
            graph.execute(None).unwrap();
        }
        assert_eq!(device.texture_allocations(), 1);
    }

    #[test]
    fn execute_with_sync_bundle_wires_semaphores_and_fence() {
        let (device, pools, transients) = test_graph_shared();
        let dyn_device: Arc<dyn Device> = device.clone();
        let mut sync = FrameSyncManager::new(&dyn_device, 2).unwrap();
        let swapchain = TestSwapchain::new(2, (640, 480));

        let (available, finished) = sync.swapchain_semaphores(sync.slot());
        sync.current_mut()
            .wait(available, PipelineStages::COLOR_ATTACHMENT_OUTPUT)
            .signal(finished);

        let mut graph = RenderGraph::new(device.clone(), pools, transients);
        let target = graph.import_swapchain_image(&swapchain, 0);
        graph
            .add_pass("present", PassCallback::noop())
            .write_color_attachment(target, LoadOp::Clear, StoreOp::Store, ClearColor::TRANSPARENT);
        graph.execute(Some(sync.current())).unwrap();

        let events = device.events();
        match events.last().unwrap() {
            Event::Submit { command_buffers, waits, signals, fenced } => {
                assert_eq!(*command_buffers, 1);
                assert_eq!(*waits, 1);
                assert_eq!(*signals, 1);
                assert!(*fenced);
            }
            other => panic!("expected submit, got {:?}", other),
        }
        // The mock queue signals the fence on submit, so advance never blocks.
        sync.advance().unwrap();
        sync.advance().unwrap();
    }

    #[test]
    fn discarded_graph_touches_nothing() {
        let (mut graph, device) = test_graph();
        let external = device.make_texture(&color_desc("offscreen"));
        let handle = graph.import_external_texture(external, "offscreen", ImageLayout::ShaderReadOnly);
        graph
            .add_pass("reader", PassCallback::noop())
            .read_texture(handle, PipelineStages::FRAGMENT_SHADER, Access::SHADER_READ);
        drop(graph);
        assert!(device.events().is_empty());
        assert_eq!(device.texture_allocations(), 1); // only the external itself
    }
}
