//! Per-pass resource accessor handed to pass callbacks: resolves handles to
//! their physical backings and hands out the graph's convenience samplers.
//! Only valid while the owning pass's callback runs.

use crate::handle::{BufferHandle, TextureHandle};
use crate::pool::TransientPool;
use crate::registry::ResourceRegistry;
use glint_rhi::{Buffer, ImageLayout, Sampler, Texture};
use std::sync::Arc;

/// The closed set of graph-owned samplers, created lazily on first use.
/// Imported textures are expected to carry their own samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    NearestClamp,
    NearestRepeat,
    LinearClamp,
    LinearRepeat,
    AnisotropicClamp,
    AnisotropicRepeat,
    ShadowPcf,
}

pub struct ResourceAccessor<'a> {
    registry: &'a ResourceRegistry,
    pool: &'a TransientPool,
}

impl<'a> ResourceAccessor<'a> {
    pub(crate) fn new(registry: &'a ResourceRegistry, pool: &'a TransientPool) -> Self {
        Self { registry, pool }
    }

    /// The physical image backing a texture handle.
    pub fn texture(&self, handle: TextureHandle) -> &dyn Texture {
        let record = self.registry.texture(handle);
        record
            .binding
            .as_deref()
            .unwrap_or_else(|| panic!("texture '{}' has no physical backing", record.name))
    }

    /// The layout the texture is in at this point of the frame.
    pub fn texture_layout(&self, handle: TextureHandle) -> ImageLayout {
        self.registry.texture(handle).layout
    }

    /// The physical buffer backing a buffer handle.
    pub fn buffer(&self, handle: BufferHandle) -> &dyn Buffer {
        let record = self.registry.buffer(handle);
        record
            .binding
            .as_deref()
            .unwrap_or_else(|| panic!("buffer '{}' has no physical backing", record.name))
    }

    /// GPU-visible address of a buffer declared with
    /// `BufferUsage::DEVICE_ADDRESS`; panics otherwise.
    pub fn buffer_device_address(&self, handle: BufferHandle) -> u64 {
        let record = self.registry.buffer(handle);
        self.buffer(handle).device_address().unwrap_or_else(|| {
            panic!(
                "buffer '{}' was not declared with device-address usage",
                record.name
            )
        })
    }

    /// One of the graph's convenience samplers.
    pub fn sampler(&self, kind: SamplerKind) -> Result<Arc<dyn Sampler>, String> {
        self.pool.sampler(kind)
    }
}
