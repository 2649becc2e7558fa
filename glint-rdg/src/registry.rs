//! Per-frame resource registry: the authoritative table mapping handles to
//! transient or imported physical resources, their lifetimes, and (for
//! textures) the layout they are currently in.

use crate::handle::{BufferHandle, TextureHandle};
use glint_rhi::{
    Buffer, BufferDescriptor, ImageLayout, Swapchain, Texture, TextureDescriptor, TextureDimension,
    TextureTiling,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceOrigin {
    /// Owned by the graph for this frame; backing comes from the transient pool.
    Transient,
    /// Owned by the caller; the graph borrows the backing and never frees it.
    External,
}

/// Inclusive pass-index interval over which a resource is alive.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Lifetime {
    pub first: usize,
    pub last: usize,
    pub used: bool,
}

impl Lifetime {
    pub fn touch(&mut self, pass_index: usize) {
        if self.used {
            self.first = self.first.min(pass_index);
            self.last = self.last.max(pass_index);
        } else {
            self.first = pass_index;
            self.last = pass_index;
            self.used = true;
        }
    }

    pub fn overlaps(&self, other: &Lifetime) -> bool {
        self.used && other.used && self.first <= other.last && other.first <= self.last
    }
}

pub(crate) struct TextureRecord {
    pub name: String,
    pub desc: TextureDescriptor,
    pub origin: ResourceOrigin,
    pub binding: Option<Arc<dyn Texture>>,
    pub layout: ImageLayout,
    pub lifetime: Lifetime,
    /// Acquired swapchain image index, when this texture is a swapchain slot.
    pub swapchain_index: Option<u32>,
}

pub(crate) struct BufferRecord {
    pub name: String,
    pub desc: BufferDescriptor,
    pub origin: ResourceOrigin,
    pub binding: Option<Arc<dyn Buffer>>,
    pub lifetime: Lifetime,
}

#[derive(Default)]
pub(crate) struct ResourceRegistry {
    textures: Vec<TextureRecord>,
    buffers: Vec<BufferRecord>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_texture(&mut self, desc: &TextureDescriptor) -> TextureHandle {
        assert!(
            desc.is_valid(),
            "transient texture {:?} has an invalid descriptor (undefined format or zero extent)",
            desc.label
        );
        let handle = TextureHandle::from_index(self.textures.len());
        self.textures.push(TextureRecord {
            name: desc.label.unwrap_or("transient texture").to_string(),
            desc: *desc,
            origin: ResourceOrigin::Transient,
            binding: None,
            layout: ImageLayout::Undefined,
            lifetime: Lifetime::default(),
            swapchain_index: None,
        });
        handle
    }

    pub fn declare_buffer(&mut self, desc: &BufferDescriptor) -> BufferHandle {
        assert!(
            desc.is_valid(),
            "transient buffer {:?} has an invalid descriptor (zero size)",
            desc.label
        );
        let handle = BufferHandle::from_index(self.buffers.len());
        self.buffers.push(BufferRecord {
            name: desc.label.unwrap_or("transient buffer").to_string(),
            desc: *desc,
            origin: ResourceOrigin::Transient,
            binding: None,
            lifetime: Lifetime::default(),
        });
        handle
    }

    pub fn import_texture(
        &mut self,
        texture: Arc<dyn Texture>,
        name: &str,
        current_layout: ImageLayout,
    ) -> TextureHandle {
        let desc = descriptor_from_backing(texture.as_ref());
        let handle = TextureHandle::from_index(self.textures.len());
        self.textures.push(TextureRecord {
            name: name.to_string(),
            desc,
            origin: ResourceOrigin::External,
            binding: Some(texture),
            layout: current_layout,
            lifetime: Lifetime::default(),
            swapchain_index: None,
        });
        handle
    }

    pub fn import_buffer(&mut self, buffer: Arc<dyn Buffer>, name: &str) -> BufferHandle {
        let desc = BufferDescriptor {
            label: None,
            size: buffer.size(),
            usage: buffer.usage(),
            memory: Default::default(),
        };
        let handle = BufferHandle::from_index(self.buffers.len());
        self.buffers.push(BufferRecord {
            name: name.to_string(),
            desc,
            origin: ResourceOrigin::External,
            binding: Some(buffer),
            lifetime: Lifetime::default(),
        });
        handle
    }

    /// Import an acquired swapchain image. The image starts in Undefined and
    /// is transitioned into attachment and present layouts by synthesized
    /// barriers.
    pub fn import_swapchain_image(
        &mut self,
        swapchain: &dyn Swapchain,
        image_index: u32,
    ) -> TextureHandle {
        let (width, height) = swapchain.extent();
        let image = swapchain.image(image_index);
        let handle = TextureHandle::from_index(self.textures.len());
        self.textures.push(TextureRecord {
            name: format!("swapchain image {}", image_index),
            desc: TextureDescriptor {
                label: None,
                size: (width, height, 1),
                format: swapchain.format(),
                usage: glint_rhi::TextureUsage::RENDER_ATTACHMENT,
                dimension: TextureDimension::D2,
                mip_level_count: 1,
                sample_count: 1,
                tiling: TextureTiling::Optimal,
            },
            origin: ResourceOrigin::External,
            binding: Some(image),
            layout: ImageLayout::Undefined,
            lifetime: Lifetime::default(),
            swapchain_index: Some(image_index),
        });
        handle
    }

    pub fn texture(&self, handle: TextureHandle) -> &TextureRecord {
        assert!(handle.is_valid(), "invalid texture handle");
        self.textures
            .get(handle.index())
            .unwrap_or_else(|| panic!("unknown texture handle {:?}", handle))
    }

    pub fn texture_mut(&mut self, handle: TextureHandle) -> &mut TextureRecord {
        assert!(handle.is_valid(), "invalid texture handle");
        self.textures
            .get_mut(handle.index())
            .unwrap_or_else(|| panic!("unknown texture handle {:?}", handle))
    }

    pub fn buffer(&self, handle: BufferHandle) -> &BufferRecord {
        assert!(handle.is_valid(), "invalid buffer handle");
        self.buffers
            .get(handle.index())
            .unwrap_or_else(|| panic!("unknown buffer handle {:?}", handle))
    }

    pub fn buffer_mut(&mut self, handle: BufferHandle) -> &mut BufferRecord {
        assert!(handle.is_valid(), "invalid buffer handle");
        self.buffers
            .get_mut(handle.index())
            .unwrap_or_else(|| panic!("unknown buffer handle {:?}", handle))
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn textures(&self) -> impl Iterator<Item = (TextureHandle, &TextureRecord)> {
        self.textures
            .iter()
            .enumerate()
            .map(|(i, r)| (TextureHandle::from_index(i), r))
    }

    pub fn buffers(&self) -> impl Iterator<Item = (BufferHandle, &BufferRecord)> {
        self.buffers
            .iter()
            .enumerate()
            .map(|(i, r)| (BufferHandle::from_index(i), r))
    }
}

fn descriptor_from_backing(texture: &dyn Texture) -> TextureDescriptor {
    TextureDescriptor {
        label: None,
        size: texture.size(),
        format: texture.format(),
        usage: texture.usage(),
        dimension: texture.dimension(),
        mip_level_count: texture.mip_level_count(),
        sample_count: texture.sample_count(),
        tiling: TextureTiling::Optimal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_rhi::{TextureFormat, TextureUsage};

    fn desc() -> TextureDescriptor {
        TextureDescriptor {
            label: Some("t"),
            size: (4, 4, 1),
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        }
    }

    #[test]
    fn lifetime_touch_and_overlap() {
        let mut a = Lifetime::default();
        a.touch(2);
        a.touch(5);
        assert_eq!((a.first, a.last), (2, 5));
        let mut b = Lifetime::default();
        b.touch(6);
        assert!(!a.overlaps(&b));
        b.touch(4);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&Lifetime::default()));
    }

    #[test]
    fn declared_textures_start_unbound_and_undefined() {
        let mut registry = ResourceRegistry::new();
        let h = registry.declare_texture(&desc());
        let record = registry.texture(h);
        assert!(record.binding.is_none());
        assert_eq!(record.layout, ImageLayout::Undefined);
        assert!(!record.lifetime.used);
    }

    #[test]
    #[should_panic(expected = "invalid descriptor")]
    fn declaring_undefined_format_panics() {
        let mut registry = ResourceRegistry::new();
        registry.declare_texture(&TextureDescriptor {
            label: Some("bad"),
            size: (4, 4, 1),
            ..Default::default()
        });
    }

    #[test]
    #[should_panic(expected = "unknown texture handle")]
    fn unknown_handle_panics() {
        let registry = ResourceRegistry::new();
        registry.texture(TextureHandle::from_index(7));
    }
}
