//! In-memory RHI double for graph tests: records every command the executor
//! issues into a journal, counts allocations, and signals fences on submit so
//! frame loops never block.

use crate::graph::RenderGraph;
use crate::pool::TransientPool;
use glint_rhi::{
    Access, Buffer, BufferBarrier, BufferDescriptor, BufferUsage, CommandList, CommandPool,
    CommandPoolManager, ComputePipeline, ComputePipelineDescriptor, DescriptorPool,
    DescriptorPoolDescriptor, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutBinding,
    Device, DeviceLimits, Fence, GraphicsPipeline, GraphicsPipelineDescriptor, ImageLayout,
    IndexFormat, PipelineStages, Queue, RenderingInfo, ResourceId, Sampler, SamplerDescriptor,
    Semaphore, Swapchain, Texture, TextureAspects, TextureBarrier, TextureDescriptor,
    TextureDimension, TextureFormat, TextureUsage,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TexBarrierEvent {
    pub id: ResourceId,
    pub src_stages: PipelineStages,
    pub src_access: Access,
    pub dst_stages: PipelineStages,
    pub dst_access: Access,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub aspects: TextureAspects,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Begin,
    End,
    Barrier {
        textures: Vec<TexBarrierEvent>,
        buffers: usize,
    },
    BeginRendering {
        color_ids: Vec<ResourceId>,
        color_layouts: Vec<ImageLayout>,
        depth_id: Option<ResourceId>,
        render_area: (u32, u32),
    },
    EndRendering,
    Draw,
    BindComputePipeline,
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    Submit {
        command_buffers: usize,
        waits: usize,
        signals: usize,
        fenced: bool,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Begin => "begin",
            Event::End => "end",
            Event::Barrier { .. } => "barrier",
            Event::BeginRendering { .. } => "begin_rendering",
            Event::EndRendering => "end_rendering",
            Event::Draw => "draw",
            Event::BindComputePipeline => "bind_compute_pipeline",
            Event::Dispatch { .. } => "dispatch",
            Event::Submit { .. } => "submit",
        }
    }
}

type Journal = Arc<Mutex<Vec<Event>>>;

fn push(journal: &Journal, event: Event) {
    if let Ok(mut events) = journal.lock() {
        events.push(event);
    }
}

#[derive(Debug)]
struct FenceState {
    signaled: AtomicBool,
    waits: AtomicUsize,
}

pub(crate) struct TestDevice {
    journal: Journal,
    next_id: AtomicU64,
    texture_allocs: AtomicUsize,
    buffer_allocs: AtomicUsize,
    sampler_allocs: AtomicUsize,
    fences: Mutex<Vec<Arc<FenceState>>>,
    queue: TestQueue,
}

impl std::fmt::Debug for TestDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDevice").finish()
    }
}

impl TestDevice {
    pub fn new() -> Arc<Self> {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        Arc::new(Self {
            queue: TestQueue { journal: Arc::clone(&journal) },
            journal,
            next_id: AtomicU64::new(1),
            texture_allocs: AtomicUsize::new(0),
            buffer_allocs: AtomicUsize::new(0),
            sampler_allocs: AtomicUsize::new(0),
            fences: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn texture_allocations(&self) -> usize {
        self.texture_allocs.load(Ordering::Relaxed)
    }

    pub fn buffer_allocations(&self) -> usize {
        self.buffer_allocs.load(Ordering::Relaxed)
    }

    pub fn sampler_allocations(&self) -> usize {
        self.sampler_allocs.load(Ordering::Relaxed)
    }

    /// Times the n-th created fence has been waited on.
    pub fn fence_wait_count(&self, index: usize) -> usize {
        self.fences
            .lock()
            .ok()
            .and_then(|fences| fences.get(index).map(|f| f.waits.load(Ordering::Relaxed)))
            .unwrap_or(0)
    }

    /// An externally owned texture for import tests.
    pub fn make_texture(&self, desc: &TextureDescriptor) -> Arc<dyn Texture> {
        self.create_texture(desc).unwrap().into()
    }

    fn next_id(&self) -> ResourceId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Device for TestDevice {
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<Box<dyn Buffer>, String> {
        self.buffer_allocs.fetch_add(1, Ordering::Relaxed);
        let id = self.next_id();
        Ok(Box::new(TestBuffer {
            id,
            size: desc.size,
            usage: desc.usage,
            device_address: desc
                .usage
                .contains(BufferUsage::DEVICE_ADDRESS)
                .then_some(id.wrapping_mul(0x1000)),
        }))
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<Box<dyn Texture>, String> {
        self.texture_allocs.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(TestTexture {
            id: self.next_id(),
            desc: *desc,
        }))
    }

    fn create_sampler(&self, _desc: &SamplerDescriptor) -> Result<Box<dyn Sampler>, String> {
        self.sampler_allocs.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(TestSampler))
    }

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>, String> {
        let state = Arc::new(FenceState {
            signaled: AtomicBool::new(signaled),
            waits: AtomicUsize::new(0),
        });
        if let Ok(mut fences) = self.fences.lock() {
            fences.push(Arc::clone(&state));
        }
        Ok(Box::new(TestFence { state }))
    }

    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>, String> {
        Ok(Box::new(TestSemaphore))
    }

    fn create_command_pool(&self) -> Result<Box<dyn CommandPool>, String> {
        Ok(Box::new(TestCommandPool { journal: Arc::clone(&self.journal) }))
    }

    fn create_graphics_pipeline(
        &self,
        _desc: &GraphicsPipelineDescriptor,
    ) -> Result<Box<dyn GraphicsPipeline>, String> {
        Err("test device has no pipelines".to_string())
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<Box<dyn ComputePipeline>, String> {
        if desc.shader.source.len() % 4 != 0 {
            return Err("SPIR-V must be 4-byte aligned".to_string());
        }
        Ok(Box::new(TestComputePipeline))
    }

    fn create_descriptor_set_layout(
        &self,
        _bindings: &[DescriptorSetLayoutBinding],
    ) -> Result<Box<dyn DescriptorSetLayout>, String> {
        Err("test device has no descriptors".to_string())
    }

    fn create_descriptor_pool(
        &self,
        _desc: &DescriptorPoolDescriptor,
    ) -> Result<Box<dyn DescriptorPool>, String> {
        Err("test device has no descriptors".to_string())
    }

    fn queue(&self) -> &dyn Queue {
        &self.queue
    }

    fn limits(&self) -> DeviceLimits {
        DeviceLimits { max_sampler_anisotropy: 16.0 }
    }

    fn write_buffer(&self, _buffer: &dyn Buffer, _offset: u64, _data: &[u8]) -> Result<(), String> {
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), String> {
        Ok(())
    }
}

struct TestQueue {
    journal: Journal,
}

impl std::fmt::Debug for TestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestQueue").finish()
    }
}

impl Queue for TestQueue {
    fn submit(
        &self,
        command_lists: &[&dyn CommandList],
        wait_semaphores: &[(&dyn Semaphore, PipelineStages)],
        signal_semaphores: &[&dyn Semaphore],
        signal_fence: Option<&dyn Fence>,
    ) -> Result<(), String> {
        push(
            &self.journal,
            Event::Submit {
                command_buffers: command_lists.len(),
                waits: wait_semaphores.len(),
                signals: signal_semaphores.len(),
                fenced: signal_fence.is_some(),
            },
        );
        // The pretend GPU finishes instantly.
        if let Some(fence) = signal_fence.and_then(|f| f.as_any().downcast_ref::<TestFence>()) {
            fence.state.signaled.store(true, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct TestTexture {
    id: ResourceId,
    desc: TextureDescriptor,
}

impl Texture for TestTexture {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn format(&self) -> TextureFormat {
        self.desc.format
    }
    fn size(&self) -> (u32, u32, u32) {
        self.desc.size
    }
    fn dimension(&self) -> TextureDimension {
        self.desc.dimension
    }
    fn mip_level_count(&self) -> u32 {
        self.desc.mip_level_count
    }
    fn sample_count(&self) -> u32 {
        self.desc.sample_count
    }
    fn usage(&self) -> TextureUsage {
        self.desc.usage
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug)]
struct TestBuffer {
    id: ResourceId,
    size: u64,
    usage: BufferUsage,
    device_address: Option<u64>,
}

impl Buffer for TestBuffer {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn size(&self) -> u64 {
        self.size
    }
    fn usage(&self) -> BufferUsage {
        self.usage
    }
    fn host_visible(&self) -> bool {
        false
    }
    fn device_address(&self) -> Option<u64> {
        self.device_address
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug)]
struct TestSampler;

impl Sampler for TestSampler {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug)]
struct TestComputePipeline;

impl ComputePipeline for TestComputePipeline {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug)]
struct TestFence {
    state: Arc<FenceState>,
}

impl Fence for TestFence {
    fn wait(&self, _timeout_ns: u64) -> Result<(), String> {
        self.state.waits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn reset(&self) -> Result<(), String> {
        self.state.signaled.store(false, Ordering::Relaxed);
        Ok(())
    }
    fn is_signaled(&self) -> Result<bool, String> {
        Ok(self.state.signaled.load(Ordering::Relaxed))
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug)]
struct TestSemaphore;

impl Semaphore for TestSemaphore {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug)]
struct TestCommandPool {
    journal: Journal,
}

impl CommandPool for TestCommandPool {
    fn allocate(&self) -> Result<Box<dyn CommandList>, String> {
        Ok(Box::new(TestCommandList { journal: Arc::clone(&self.journal) }))
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug)]
struct TestCommandList {
    journal: Journal,
}

impl CommandList for TestCommandList {
    fn begin(&mut self) -> Result<(), String> {
        push(&self.journal, Event::Begin);
        Ok(())
    }

    fn end(&mut self) -> Result<(), String> {
        push(&self.journal, Event::End);
        Ok(())
    }

    fn pipeline_barrier(&mut self, textures: &[TextureBarrier<'_>], buffers: &[BufferBarrier<'_>]) {
        if textures.is_empty() && buffers.is_empty() {
            return;
        }
        push(
            &self.journal,
            Event::Barrier {
                textures: textures
                    .iter()
                    .map(|b| TexBarrierEvent {
                        id: b.texture.id(),
                        src_stages: b.src_stages,
                        src_access: b.src_access,
                        dst_stages: b.dst_stages,
                        dst_access: b.dst_access,
                        old_layout: b.old_layout,
                        new_layout: b.new_layout,
                        aspects: b.range.aspects,
                    })
                    .collect(),
                buffers: buffers.len(),
            },
        );
    }

    fn begin_rendering(&mut self, info: &RenderingInfo<'_>) -> Result<(), String> {
        push(
            &self.journal,
            Event::BeginRendering {
                color_ids: info.color_attachments.iter().map(|a| a.texture.id()).collect(),
                color_layouts: info.color_attachments.iter().map(|a| a.layout).collect(),
                depth_id: info.depth_attachment.as_ref().map(|d| d.texture.id()),
                render_area: info.render_area,
            },
        );
        Ok(())
    }

    fn end_rendering(&mut self) {
        push(&self.journal, Event::EndRendering);
    }

    fn set_viewport(&mut self, _width: u32, _height: u32) {}

    fn set_graphics_pipeline(&mut self, _pipeline: &dyn GraphicsPipeline) {}

    fn set_compute_pipeline(&mut self, _pipeline: &dyn ComputePipeline) {
        push(&self.journal, Event::BindComputePipeline);
    }
    fn bind_graphics_descriptor_set(&mut self, _set_index: u32, _set: &dyn DescriptorSet) {}
    fn bind_compute_descriptor_set(&mut self, _set_index: u32, _set: &dyn DescriptorSet) {}
    fn set_vertex_buffer(&mut self, _index: u32, _buffer: &dyn Buffer, _offset: u64) {}
    fn set_index_buffer(&mut self, _buffer: &dyn Buffer, _offset: u64, _format: IndexFormat) {}

    fn draw(&mut self, _vertex_count: u32, _instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        push(&self.journal, Event::Draw);
    }

    fn draw_indexed(
        &mut self,
        _index_count: u32,
        _instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        push(&self.journal, Event::Draw);
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        push(&self.journal, Event::Dispatch { x, y, z });
    }

    fn copy_buffer_to_buffer(
        &mut self,
        _src: &dyn Buffer,
        _src_offset: u64,
        _dst: &dyn Buffer,
        _dst_offset: u64,
        _size: u64,
    ) {
    }

    fn copy_buffer_to_texture(
        &mut self,
        _src: &dyn Buffer,
        _src_offset: u64,
        _dst: &dyn Texture,
        _dst_mip: u32,
        _dst_origin: (u32, u32, u32),
        _size: (u32, u32, u32),
    ) {
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Pretend swapchain with a fixed image set; ids start high so they never
/// collide with device-created resources in assertions.
pub(crate) struct TestSwapchain {
    images: Vec<Arc<TestTexture>>,
    extent: (u32, u32),
    acquired: u32,
}

impl std::fmt::Debug for TestSwapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSwapchain").finish()
    }
}

impl TestSwapchain {
    pub fn new(image_count: u32, extent: (u32, u32)) -> Self {
        let images = (0..image_count)
            .map(|i| {
                Arc::new(TestTexture {
                    id: 1_000_000 + i as ResourceId,
                    desc: TextureDescriptor {
                        label: None,
                        size: (extent.0, extent.1, 1),
                        format: TextureFormat::Bgra8Unorm,
                        usage: TextureUsage::RENDER_ATTACHMENT,
                        ..Default::default()
                    },
                })
            })
            .collect();
        Self { images, extent, acquired: 0 }
    }
}

impl Swapchain for TestSwapchain {
    fn acquire_next_image(&mut self, _signal: Option<&dyn Semaphore>) -> Result<u32, String> {
        let index = self.acquired % self.images.len() as u32;
        self.acquired += 1;
        Ok(index)
    }

    fn present(&self, _image_index: u32, _wait: Option<&dyn Semaphore>) -> Result<(), String> {
        Ok(())
    }

    fn extent(&self) -> (u32, u32) {
        self.extent
    }

    fn format(&self) -> TextureFormat {
        TextureFormat::Bgra8Unorm
    }

    fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn image(&self, index: u32) -> Arc<dyn Texture> {
        self.images[index as usize].clone()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Fresh device + pool manager + transient pool + graph, for one-frame tests.
pub(crate) fn test_graph() -> (RenderGraph, Arc<TestDevice>) {
    let (device, pools, transients) = test_graph_shared();
    let graph = RenderGraph::new(device.clone(), pools, transients);
    (graph, device)
}

/// The long-lived pieces alone, for multi-frame tests.
pub(crate) fn test_graph_shared() -> (Arc<TestDevice>, Arc<CommandPoolManager>, Arc<TransientPool>) {
    let device = TestDevice::new();
    let pools = Arc::new(CommandPoolManager::new(device.clone()));
    let transients = TransientPool::new(device.clone());
    (device, pools, transients)
}
