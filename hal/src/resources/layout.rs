//! Resource layouts, resource sets and bindable resources.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::{Buffer, BufferRange, ResourceCore, Sampler, TextureView};
use crate::device::GraphicsDevice;
use crate::native::{NativeBinding, RawDescriptorSet, RawObject};
use crate::types::{ResourceLayoutDescription, ResourceLayoutElement};

/// Immutable ordered list of binding slots.
///
/// Layouts compare and hash by description so pipeline descriptions that
/// reference equal layouts share a cache entry.
pub struct ResourceLayout {
    pub(crate) core: Arc<ResourceCore>,
    pub(crate) device: Arc<GraphicsDevice>,
    description: ResourceLayoutDescription,
}

impl ResourceLayout {
    pub(crate) fn new(device: Arc<GraphicsDevice>, description: ResourceLayoutDescription) -> Self {
        Self {
            core: Arc::new(ResourceCore::new("ResourceLayout", description.label.clone())),
            device,
            description,
        }
    }

    pub fn description(&self) -> &ResourceLayoutDescription {
        &self.description
    }

    /// Elements in slot order.
    pub fn elements(&self) -> &[ResourceLayoutElement] {
        &self.description.elements
    }

    /// Number of elements taking dynamic offsets.
    pub fn dynamic_count(&self) -> usize {
        self.description.dynamic_count()
    }

    /// Whether a set built for `other` can be bound where this layout is
    /// expected.
    pub fn is_compatible(&self, other: &ResourceLayout) -> bool {
        self.description.is_compatible(&other.description)
    }

    pub(crate) fn raw_objects(&self) -> Vec<RawObject> {
        Vec::new()
    }
}

super::impl_device_resource!(ResourceLayout);

impl PartialEq for ResourceLayout {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description
    }
}

impl Eq for ResourceLayout {}

impl Hash for ResourceLayout {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.description.hash(state);
    }
}

impl std::fmt::Debug for ResourceLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLayout")
            .field("id", &self.core.id())
            .field("description", &self.description)
            .finish()
    }
}

/// A resource bound at one slot of a [`ResourceSet`].
#[derive(Debug, Clone)]
pub enum BindableResource {
    Buffer(Arc<Buffer>),
    BufferRange(BufferRange),
    TextureView(Arc<TextureView>),
    Sampler(Arc<Sampler>),
}

impl BindableResource {
    /// Short name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::BufferRange(_) => "buffer range",
            Self::TextureView(_) => "texture view",
            Self::Sampler(_) => "sampler",
        }
    }

    /// Buffer and byte window for buffer-backed resources.
    pub fn buffer_window(&self) -> Option<(&Arc<Buffer>, u64, u64)> {
        match self {
            Self::Buffer(buffer) => Some((buffer, 0, buffer.size())),
            Self::BufferRange(range) => Some((&range.buffer, range.offset, range.size)),
            Self::TextureView(_) | Self::Sampler(_) => None,
        }
    }

    pub(crate) fn core(&self) -> &Arc<ResourceCore> {
        match self {
            Self::Buffer(buffer) => buffer.core(),
            Self::BufferRange(range) => range.buffer.core(),
            Self::TextureView(view) => view.core(),
            Self::Sampler(sampler) => sampler.core(),
        }
    }

    /// Native binding with a dynamic offset added to buffer windows.
    pub(crate) fn native_binding(&self, dynamic_offset: u32) -> NativeBinding {
        match self {
            Self::TextureView(view) => view.native_binding(),
            Self::Sampler(sampler) => NativeBinding::Sampler(sampler.raw_handle()),
            Self::Buffer(buffer) => NativeBinding::Buffer {
                buffer: buffer.raw_handle(),
                offset: dynamic_offset as u64,
                size: buffer.size(),
            },
            Self::BufferRange(range) => NativeBinding::Buffer {
                buffer: range.buffer.raw_handle(),
                offset: range.offset + dynamic_offset as u64,
                size: range.size,
            },
        }
    }
}

impl From<Arc<Buffer>> for BindableResource {
    fn from(buffer: Arc<Buffer>) -> Self {
        Self::Buffer(buffer)
    }
}

impl From<BufferRange> for BindableResource {
    fn from(range: BufferRange) -> Self {
        Self::BufferRange(range)
    }
}

impl From<Arc<TextureView>> for BindableResource {
    fn from(view: Arc<TextureView>) -> Self {
        Self::TextureView(view)
    }
}

impl From<Arc<Sampler>> for BindableResource {
    fn from(sampler: Arc<Sampler>) -> Self {
        Self::Sampler(sampler)
    }
}

/// A layout together with one bound resource per slot.
///
/// The bound kinds match the layout position for position; this is checked
/// when the set is created.
pub struct ResourceSet {
    pub(crate) core: Arc<ResourceCore>,
    pub(crate) device: Arc<GraphicsDevice>,
    layout: Arc<ResourceLayout>,
    resources: Vec<BindableResource>,
    descriptor_set: Option<RawDescriptorSet>,
}

impl ResourceSet {
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        layout: Arc<ResourceLayout>,
        resources: Vec<BindableResource>,
        descriptor_set: Option<RawDescriptorSet>,
        label: Option<String>,
    ) -> Self {
        Self {
            core: Arc::new(ResourceCore::new("ResourceSet", label)),
            device,
            layout,
            resources,
            descriptor_set,
        }
    }

    pub fn layout(&self) -> &Arc<ResourceLayout> {
        &self.layout
    }

    /// Bound resources in slot order.
    pub fn resources(&self) -> &[BindableResource] {
        &self.resources
    }

    /// Native descriptor set, on backends that bind whole sets.
    pub fn raw_descriptor_set(&self) -> Option<RawDescriptorSet> {
        self.descriptor_set
    }

    pub(crate) fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    /// Native binding of element `index` with a dynamic offset applied.
    pub(crate) fn binding(&self, index: usize, dynamic_offset: u32) -> Option<NativeBinding> {
        self.resources.get(index).map(|r| r.native_binding(dynamic_offset))
    }

    pub(crate) fn raw_objects(&self) -> Vec<RawObject> {
        self.descriptor_set.map(RawObject::DescriptorSet).into_iter().collect()
    }
}

super::impl_device_resource!(ResourceSet);

impl std::fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSet")
            .field("id", &self.core.id())
            .field("layout", &self.layout.core.id())
            .field("resources", &self.resources.iter().map(|r| r.kind_name()).collect::<Vec<_>>())
            .finish()
    }
}

static_assertions::assert_impl_all!(ResourceLayout: Send, Sync);
static_assertions::assert_impl_all!(ResourceSet: Send, Sync);
