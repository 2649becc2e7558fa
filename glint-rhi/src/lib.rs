//! Glint RHI: backend-agnostic Rendering Hardware Interface.
//! Defines the traits and plain-data types the render graph records against,
//! plus the Vulkan 1.3 backend (feature "vulkan", on by default).
//!
//! Synchronization is expressed with explicit stage/access masks and image
//! layouts so callers (notably the render dependency graph in `glint-rdg`)
//! can synthesize pipeline barriers themselves; the backend only translates.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

pub mod command;

pub use command::{CommandBufferHandle, CommandPoolManager};

/// Unique identifier for a GPU resource.
pub type ResourceId = u64;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const COPY_SRC = 1 << 4;
        const COPY_DST = 1 << 5;
        const INDIRECT = 1 << 6;
        /// Buffer may be queried for a GPU-visible address.
        const DEVICE_ADDRESS = 1 << 7;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const TEXTURE_BINDING = 1 << 2;
        const STORAGE_BINDING = 1 << 3;
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

bitflags::bitflags! {
    /// Pipeline stage mask for barriers and semaphore waits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 4;
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        const LATE_FRAGMENT_TESTS = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const COMPUTE_SHADER = 1 << 8;
        const TRANSFER = 1 << 9;
        const BOTTOM_OF_PIPE = 1 << 10;
        const ALL_COMMANDS = 1 << 11;
    }
}

bitflags::bitflags! {
    /// Memory access mask for barriers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const UNIFORM_READ = 1 << 3;
        const INPUT_ATTACHMENT_READ = 1 << 4;
        const SHADER_READ = 1 << 5;
        const SHADER_WRITE = 1 << 6;
        const COLOR_ATTACHMENT_READ = 1 << 7;
        const COLOR_ATTACHMENT_WRITE = 1 << 8;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 9;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 10;
        const TRANSFER_READ = 1 << 11;
        const TRANSFER_WRITE = 1 << 12;
        const MEMORY_READ = 1 << 13;
        const MEMORY_WRITE = 1 << 14;
    }
}

impl Access {
    /// True if the mask contains any write access.
    pub fn is_write(self) -> bool {
        self.intersects(
            Access::SHADER_WRITE
                | Access::COLOR_ATTACHMENT_WRITE
                | Access::DEPTH_STENCIL_ATTACHMENT_WRITE
                | Access::TRANSFER_WRITE
                | Access::MEMORY_WRITE,
        )
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureAspects: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TextureFormat {
    #[default]
    Undefined,
    Rgba8Unorm,
    Bgra8Unorm,
    R16Float,
    R32Float,
    Rgba16Float,
    Rgba32Float,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::D32Float | TextureFormat::D24UnormS8Uint | TextureFormat::D32FloatS8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            TextureFormat::D24UnormS8Uint | TextureFormat::D32FloatS8Uint
        )
    }

    /// Image aspects implied by the format (color, depth, or depth+stencil).
    pub fn aspects(self) -> TextureAspects {
        if self.is_depth() {
            if self.has_stencil() {
                TextureAspects::DEPTH | TextureAspects::STENCIL
            } else {
                TextureAspects::DEPTH
            }
        } else {
            TextureAspects::COLOR
        }
    }
}

/// Texture dimension / type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    #[default]
    D2,
    D2Array,
    D3,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureTiling {
    #[default]
    Optimal,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub label: Option<&'static str>,
    /// (width, height, depth_or_layers). For 2D: depth=1. For 2DArray: depth=array_layers. For 3D: depth=depth.
    pub size: (u32, u32, u32),
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub dimension: TextureDimension,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub tiling: TextureTiling,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: (1, 1, 1),
            format: TextureFormat::Undefined,
            usage: TextureUsage::empty(),
            dimension: TextureDimension::D2,
            mip_level_count: 1,
            sample_count: 1,
            tiling: TextureTiling::Optimal,
        }
    }
}

impl TextureDescriptor {
    /// Format must be declared and the extent positive.
    pub fn is_valid(&self) -> bool {
        self.format != TextureFormat::Undefined
            && self.size.0 > 0
            && self.size.1 > 0
            && self.size.2 > 0
    }

    /// Array layer count implied by dimension and extent.
    pub fn array_layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D2 | TextureDimension::D3 => 1,
            TextureDimension::D2Array => self.size.2.max(1),
            TextureDimension::Cube => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferMemoryPreference {
    #[default]
    DeviceLocal,
    HostVisible,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferDescriptor {
    pub label: Option<&'static str>,
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: BufferMemoryPreference,
}

impl BufferDescriptor {
    pub fn is_valid(&self) -> bool {
        self.size > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ClearColor {
    pub const TRANSPARENT: Self = Self { r: 0.0, g: 0.0, b: 0.0, a: 0.0 };
}

/// Subresource selection for image barriers. `REMAINING` selects all
/// levels/layers from the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceRange {
    pub aspects: TextureAspects,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    pub const REMAINING: u32 = u32::MAX;

    /// All mips, all layers of the given aspects.
    pub fn all(aspects: TextureAspects) -> Self {
        Self {
            aspects,
            base_mip_level: 0,
            level_count: Self::REMAINING,
            base_array_layer: 0,
            layer_count: Self::REMAINING,
        }
    }
}

/// Image memory barrier with an optional layout transition.
#[derive(Clone, Copy)]
pub struct TextureBarrier<'a> {
    pub texture: &'a dyn Texture,
    pub src_stages: PipelineStages,
    pub src_access: Access,
    pub dst_stages: PipelineStages,
    pub dst_access: Access,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub range: SubresourceRange,
}

/// Buffer memory barrier. `size` of 0 covers the rest of the buffer.
#[derive(Clone, Copy)]
pub struct BufferBarrier<'a> {
    pub buffer: &'a dyn Buffer,
    pub src_stages: PipelineStages,
    pub src_access: Access,
    pub dst_stages: PipelineStages,
    pub dst_access: Access,
    pub offset: u64,
    pub size: u64,
}

/// Color attachment for a dynamic rendering scope.
pub struct RenderingColorAttachment<'a> {
    pub texture: &'a dyn Texture,
    pub layout: ImageLayout,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear: ClearColor,
}

/// Depth-stencil attachment for a dynamic rendering scope.
pub struct RenderingDepthAttachment<'a> {
    pub texture: &'a dyn Texture,
    pub layout: ImageLayout,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

/// Attachment set for `CommandList::begin_rendering` (dynamic rendering;
/// attachments are declared at record time, there is no render pass object).
pub struct RenderingInfo<'a> {
    pub render_area: (u32, u32),
    pub layer_count: u32,
    pub color_attachments: Vec<RenderingColorAttachment<'a>>,
    pub depth_attachment: Option<RenderingDepthAttachment<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    #[default]
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerDescriptor {
    pub label: Option<&'static str>,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    /// Max anisotropy; None disables anisotropic filtering.
    pub anisotropy_clamp: Option<f32>,
    /// Depth-compare sampler (shadow PCF) when set.
    pub compare: Option<CompareOp>,
}

/// Device limits the graph and samplers care about.
#[derive(Debug, Clone, Copy)]
pub struct DeviceLimits {
    pub max_sampler_anisotropy: f32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self { max_sampler_anisotropy: 1.0 }
    }
}

#[derive(Debug, Clone)]
pub struct ShaderStage {
    pub source: Vec<u8>, // SPIR-V bytes
    pub entry_point: String,
}

#[derive(Debug, Clone, Default)]
pub struct VertexInputDescriptor {
    pub attributes: Vec<VertexAttribute>,
    pub bindings: Vec<VertexBinding>,
}

#[derive(Debug, Clone)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexFormat {
    #[default]
    Float32x3,
    Float32x2,
    Float32x4,
    Uint32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

#[derive(Debug, Clone, Default)]
pub struct RasterizationState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub polygon_mode: PolygonMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub blend: Option<BlendState>,
}

#[derive(Debug, Clone)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

#[derive(Debug, Clone, Copy)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOp,
}

#[derive(Debug, Clone, Copy)]
pub enum BlendFactor {
    One,
    Zero,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy)]
pub enum BlendOp {
    Add,
    Subtract,
}

#[derive(Debug, Clone)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareOp,
}

/// Descriptor for creating a graphics pipeline. Color/depth target formats
/// feed the dynamic-rendering pipeline state; there is no render pass.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptor {
    pub label: Option<&'static str>,
    pub vertex_shader: ShaderStage,
    pub fragment_shader: Option<ShaderStage>,
    pub vertex_input: VertexInputDescriptor,
    pub primitive_topology: PrimitiveTopology,
    pub rasterization: RasterizationState,
    pub color_targets: Vec<ColorTargetState>,
    pub depth_stencil: Option<DepthStencilState>,
    /// Descriptor set layout bindings for UBO/sampled image etc. Used to create pipeline layout.
    pub layout_bindings: Vec<DescriptorSetLayoutBinding>,
}

#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    pub label: Option<&'static str>,
    pub shader: ShaderStage,
    pub layout_bindings: Vec<DescriptorSetLayoutBinding>,
}

/// Descriptor binding type for layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    StorageImage,
    SampledImage,
    CombinedImageSampler,
}

#[derive(Debug, Clone)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStages,
}

#[derive(Debug, Clone, Default)]
pub struct DescriptorPoolDescriptor {
    pub max_sets: u32,
    /// Per-type capacity overrides; unlisted types get a default derived from max_sets.
    pub pool_sizes: Vec<(DescriptorType, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// The core device trait that all backends must implement.
pub trait Device: Send + Sync + Debug {
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<Box<dyn Buffer>, String>;
    fn create_texture(&self, desc: &TextureDescriptor) -> Result<Box<dyn Texture>, String>;
    fn create_sampler(&self, desc: &SamplerDescriptor) -> Result<Box<dyn Sampler>, String>;

    /// Create a fence for CPU-GPU synchronization.
    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>, String>;
    /// Create a binary semaphore for GPU-GPU synchronization.
    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>, String>;

    /// Create a command pool. Command lists allocated from it may only be
    /// recorded on the thread that owns the pool.
    fn create_command_pool(&self) -> Result<Box<dyn CommandPool>, String>;

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<Box<dyn GraphicsPipeline>, String>;
    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<Box<dyn ComputePipeline>, String>;
    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorSetLayoutBinding],
    ) -> Result<Box<dyn DescriptorSetLayout>, String>;
    fn create_descriptor_pool(
        &self,
        desc: &DescriptorPoolDescriptor,
    ) -> Result<Box<dyn DescriptorPool>, String>;

    /// Create a swapchain for presentation (only supported when the device was
    /// created with a window/surface). Returns Err for headless devices.
    fn create_swapchain(
        &self,
        extent: (u32, u32),
        old_swapchain: Option<&dyn Swapchain>,
    ) -> Result<Box<dyn Swapchain>, String> {
        let _ = (extent, old_swapchain);
        Err("Swapchain not supported (device created without surface)".to_string())
    }

    /// The main graphics queue for submissions.
    fn queue(&self) -> &dyn Queue;

    fn limits(&self) -> DeviceLimits;

    /// Write data into a host-visible buffer (CPU to GPU).
    fn write_buffer(&self, buffer: &dyn Buffer, offset: u64, data: &[u8]) -> Result<(), String>;

    /// Wait for the device to become idle (all submitted work finished).
    fn wait_idle(&self) -> Result<(), String>;
}

/// Fence: CPU can wait for GPU to complete submitted work.
pub trait Fence: Send + Sync + Debug {
    fn wait(&self, timeout_ns: u64) -> Result<(), String>;
    fn reset(&self) -> Result<(), String>;
    /// Non-blocking signal query.
    fn is_signaled(&self) -> Result<bool, String>;
    fn as_any(&self) -> &dyn Any;
}

/// Binary semaphore: GPU-GPU synchronization between submission and present/acquire.
pub trait Semaphore: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

/// Queue for submitting work. Non-blocking; each wait semaphore carries the
/// pipeline stages that block on it.
pub trait Queue: Send + Sync + Debug {
    fn submit(
        &self,
        command_lists: &[&dyn CommandList],
        wait_semaphores: &[(&dyn Semaphore, PipelineStages)],
        signal_semaphores: &[&dyn Semaphore],
        signal_fence: Option<&dyn Fence>,
    ) -> Result<(), String>;
}

pub trait Buffer: Send + Sync + Debug {
    fn id(&self) -> ResourceId;
    fn size(&self) -> u64;
    fn usage(&self) -> BufferUsage;
    fn host_visible(&self) -> bool;
    /// GPU-visible address; Some only when created with `BufferUsage::DEVICE_ADDRESS`.
    fn device_address(&self) -> Option<u64>;
    fn as_any(&self) -> &dyn Any;
}

pub trait Texture: Send + Sync + Debug {
    fn id(&self) -> ResourceId;
    fn format(&self) -> TextureFormat;
    fn size(&self) -> (u32, u32, u32);
    fn dimension(&self) -> TextureDimension;
    fn mip_level_count(&self) -> u32;
    fn sample_count(&self) -> u32;
    fn usage(&self) -> TextureUsage;
    fn as_any(&self) -> &dyn Any;
}

pub trait Sampler: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

pub trait GraphicsPipeline: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

pub trait ComputePipeline: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

pub trait DescriptorSetLayout: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

pub trait DescriptorPool: Send + Sync + Debug {
    fn allocate_set(&self, layout: &dyn DescriptorSetLayout) -> Result<Box<dyn DescriptorSet>, String>;
}

pub trait DescriptorSet: Send + Sync + Debug {
    fn write_buffer(&mut self, binding: u32, buffer: &dyn Buffer, offset: u64, size: u64) -> Result<(), String>;
    fn write_texture(&mut self, binding: u32, texture: &dyn Texture) -> Result<(), String>;
    fn write_sampled_image(
        &mut self,
        binding: u32,
        texture: &dyn Texture,
        sampler: &dyn Sampler,
    ) -> Result<(), String>;
    fn as_any(&self) -> &dyn Any;
}

/// Allocates primary command lists. One pool per recording thread.
pub trait CommandPool: Send + Debug {
    fn allocate(&self) -> Result<Box<dyn CommandList>, String>;
    fn as_any(&self) -> &dyn Any;
}

/// A primary command list: begin, record, end, then hand to `Queue::submit`.
/// `begin` implicitly resets previously recorded contents.
pub trait CommandList: Send + Debug {
    fn begin(&mut self) -> Result<(), String>;
    fn end(&mut self) -> Result<(), String>;

    /// Emit all barriers in one pipeline-barrier call.
    fn pipeline_barrier(&mut self, textures: &[TextureBarrier<'_>], buffers: &[BufferBarrier<'_>]);

    /// Open a dynamic rendering scope. Attachment layouts must already hold.
    fn begin_rendering(&mut self, info: &RenderingInfo<'_>) -> Result<(), String>;
    fn end_rendering(&mut self);

    /// Set full-extent viewport and scissor (pipelines use dynamic viewport state).
    fn set_viewport(&mut self, width: u32, height: u32);

    fn set_graphics_pipeline(&mut self, pipeline: &dyn GraphicsPipeline);
    fn set_compute_pipeline(&mut self, pipeline: &dyn ComputePipeline);
    fn bind_graphics_descriptor_set(&mut self, set_index: u32, set: &dyn DescriptorSet);
    fn bind_compute_descriptor_set(&mut self, set_index: u32, set: &dyn DescriptorSet);
    fn set_vertex_buffer(&mut self, index: u32, buffer: &dyn Buffer, offset: u64);
    fn set_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64, format: IndexFormat);
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    fn copy_buffer_to_buffer(
        &mut self,
        src: &dyn Buffer,
        src_offset: u64,
        dst: &dyn Buffer,
        dst_offset: u64,
        size: u64,
    );
    fn copy_buffer_to_texture(
        &mut self,
        src: &dyn Buffer,
        src_offset: u64,
        dst: &dyn Texture,
        dst_mip: u32,
        dst_origin: (u32, u32, u32),
        size: (u32, u32, u32),
    );

    fn as_any(&self) -> &dyn Any;
}

/// Swapchain for presenting to a window. Acquire an image index, render to
/// `image(index)`, then present.
pub trait Swapchain: Send + Sync + Debug {
    /// Acquire the next image index. The semaphore (if any) is signaled when
    /// the image is actually available.
    fn acquire_next_image(&mut self, signal: Option<&dyn Semaphore>) -> Result<u32, String>;
    /// Present the image. The wait semaphore should be signaled when rendering
    /// to that image is done.
    fn present(&self, image_index: u32, wait: Option<&dyn Semaphore>) -> Result<(), String>;
    /// Current extent (width, height). May change on resize.
    fn extent(&self) -> (u32, u32);
    fn format(&self) -> TextureFormat;
    fn image_count(&self) -> u32;
    /// Image by acquired index; valid as a color attachment.
    fn image(&self, index: u32) -> Arc<dyn Texture>;
    fn as_any(&self) -> &dyn Any;
}

#[cfg(feature = "vulkan")]
pub mod vulkan;

#[cfg(feature = "vulkan")]
pub use vulkan::VulkanDevice;
