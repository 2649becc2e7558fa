//! Pass records and the fluent declaration builder.
//! Declarations are the graph's edges: the compiler resolves them on demand,
//! so the order of declarations within a pass does not matter, but the order
//! passes are added seeds the execution order.

use crate::accessor::ResourceAccessor;
use crate::graph::RenderGraph;
use crate::handle::{BufferHandle, TextureHandle};
use glint_rhi::{Access, ClearColor, CommandList, ImageLayout, LoadOp, PipelineStages, StoreOp};

/// Command-recording callback for a pass. The accessor shape additionally
/// receives a [`ResourceAccessor`] scoped to the pass's execution.
pub enum PassCallback {
    Plain(Box<dyn FnOnce(&mut dyn CommandList) -> Result<(), String>>),
    WithResources(
        Box<dyn for<'a> FnOnce(&mut dyn CommandList, &ResourceAccessor<'a>) -> Result<(), String>>,
    ),
}

impl PassCallback {
    pub fn plain(f: impl FnOnce(&mut dyn CommandList) -> Result<(), String> + 'static) -> Self {
        Self::Plain(Box::new(f))
    }

    pub fn with_resources(
        f: impl for<'a> FnOnce(&mut dyn CommandList, &ResourceAccessor<'a>) -> Result<(), String>
            + 'static,
    ) -> Self {
        Self::WithResources(Box::new(f))
    }

    /// A callback that records nothing. Useful for passes whose only effect
    /// is the clears and layout transitions the graph performs for them.
    pub fn noop() -> Self {
        Self::plain(|_| Ok(()))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TextureUse {
    pub handle: TextureHandle,
    pub stages: PipelineStages,
    pub access: Access,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferUse {
    pub handle: BufferHandle,
    pub stages: PipelineStages,
    pub access: Access,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ColorAttachment {
    pub handle: TextureHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear: ClearColor,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct DepthStencilAttachment {
    pub handle: TextureHandle,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

pub(crate) struct PassRecord {
    pub name: String,
    pub callback: Option<PassCallback>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil: Option<DepthStencilAttachment>,
    pub texture_reads: Vec<TextureUse>,
    pub buffer_reads: Vec<BufferUse>,
    pub storage_texture_writes: Vec<TextureUse>,
    pub storage_buffer_writes: Vec<BufferUse>,
}

impl PassRecord {
    pub fn new(name: &str, callback: PassCallback) -> Self {
        Self {
            name: name.to_string(),
            callback: Some(callback),
            color_attachments: Vec::new(),
            depth_stencil: None,
            texture_reads: Vec::new(),
            buffer_reads: Vec::new(),
            storage_texture_writes: Vec::new(),
            storage_buffer_writes: Vec::new(),
        }
    }

    /// Graphics passes get a dynamic rendering scope around their callback.
    pub fn is_graphics(&self) -> bool {
        !self.color_attachments.is_empty() || self.depth_stencil.is_some()
    }
}

/// Layout a sampled read wants, inferred from its access flags.
pub(crate) fn read_layout_for_access(access: Access) -> ImageLayout {
    if access.intersects(Access::SHADER_READ | Access::INPUT_ATTACHMENT_READ) {
        ImageLayout::ShaderReadOnly
    } else {
        ImageLayout::General
    }
}

/// Fluent declaration handle for the pass just added; borrow ends with the
/// statement.
pub struct PassBuilder<'g> {
    graph: &'g mut RenderGraph,
    pass: usize,
}

impl<'g> PassBuilder<'g> {
    pub(crate) fn new(graph: &'g mut RenderGraph, pass: usize) -> Self {
        Self { graph, pass }
    }

    /// Declare a sampled/uniform texture read.
    pub fn read_texture(self, handle: TextureHandle, stages: PipelineStages, access: Access) -> Self {
        self.graph.registry.texture(handle); // fail fast on unknown handles
        self.graph.passes[self.pass].texture_reads.push(TextureUse { handle, stages, access });
        self
    }

    /// Declare a uniform/storage buffer read.
    pub fn read_buffer(self, handle: BufferHandle, stages: PipelineStages, access: Access) -> Self {
        self.graph.registry.buffer(handle);
        self.graph.passes[self.pass].buffer_reads.push(BufferUse { handle, stages, access });
        self
    }

    /// Append a color attachment; this pass becomes its unique writer.
    pub fn write_color_attachment(
        self,
        handle: TextureHandle,
        load_op: LoadOp,
        store_op: StoreOp,
        clear: ClearColor,
    ) -> Self {
        self.graph.registry.texture(handle);
        self.graph.passes[self.pass].color_attachments.push(ColorAttachment {
            handle,
            load_op,
            store_op,
            clear,
        });
        self
    }

    /// Set the depth-stencil attachment. At most one per pass.
    #[allow(clippy::too_many_arguments)]
    pub fn write_depth_stencil_attachment(
        self,
        handle: TextureHandle,
        depth_load_op: LoadOp,
        depth_store_op: StoreOp,
        stencil_load_op: LoadOp,
        stencil_store_op: StoreOp,
        clear_depth: f32,
        clear_stencil: u32,
    ) -> Self {
        self.graph.registry.texture(handle);
        let pass = &mut self.graph.passes[self.pass];
        assert!(
            pass.depth_stencil.is_none(),
            "pass '{}' already has a depth-stencil attachment",
            pass.name
        );
        pass.depth_stencil = Some(DepthStencilAttachment {
            handle,
            depth_load_op,
            depth_store_op,
            stencil_load_op,
            stencil_store_op,
            clear_depth,
            clear_stencil,
        });
        self
    }

    /// Declare a storage texture write (layout General).
    pub fn write_storage_texture(
        self,
        handle: TextureHandle,
        stages: PipelineStages,
        access: Access,
    ) -> Self {
        self.graph.registry.texture(handle);
        self.graph.passes[self.pass]
            .storage_texture_writes
            .push(TextureUse { handle, stages, access });
        self
    }

    /// Declare a storage buffer write.
    pub fn write_storage_buffer(
        self,
        handle: BufferHandle,
        stages: PipelineStages,
        access: Access,
    ) -> Self {
        self.graph.registry.buffer(handle);
        self.graph.passes[self.pass]
            .storage_buffer_writes
            .push(BufferUse { handle, stages, access });
        self
    }
}
