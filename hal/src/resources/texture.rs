//! GPU texture and texture view resources.

use std::fmt;
use std::sync::Arc;

use super::{MapTracker, ResourceCore};
use crate::device::GraphicsDevice;
use crate::native::{NativeAttachment, NativeBinding, NativeViewRange, RawObject, RawTexture, RawTextureView};
use crate::types::{Extent3d, TextureDescription, TextureFormat, TextureUsage};

/// Who owns the native texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextureOrigin {
    /// Created by the device, destroyed through the disposal queue.
    Owned,
    /// A swapchain image, destroyed with its swapchain.
    Swapchain,
}

/// A GPU texture resource.
///
/// Textures are created by
/// [`ResourceFactory::create_texture`](crate::ResourceFactory::create_texture)
/// and are reference-counted. They hold a strong reference to their parent
/// device, keeping it alive.
///
/// # Example
///
/// ```ignore
/// let texture = device.create_texture(&TextureDescription::new_2d(
///     1920, 1080,
///     TextureFormat::Rgba8Unorm,
///     TextureUsage::RENDER_TARGET,
/// ))?;
/// println!("Texture size: {}x{}", texture.width(), texture.height());
/// ```
pub struct Texture {
    pub(crate) core: Arc<ResourceCore>,
    pub(crate) device: Arc<GraphicsDevice>,
    description: TextureDescription,
    raw: RawTexture,
    origin: TextureOrigin,
    pub(crate) mapping: MapTracker,
}

impl Texture {
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        description: TextureDescription,
        raw: RawTexture,
        origin: TextureOrigin,
    ) -> Self {
        Self {
            core: Arc::new(ResourceCore::new("Texture", description.label.clone())),
            device,
            description,
            raw,
            origin,
            mapping: MapTracker::default(),
        }
    }

    /// Get the texture description.
    pub fn description(&self) -> &TextureDescription {
        &self.description
    }

    /// Get the texture size.
    pub fn size(&self) -> Extent3d {
        self.description.size
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.description.size.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.description.size.height
    }

    /// Get the texture depth.
    pub fn depth(&self) -> u32 {
        self.description.size.depth
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.description.format
    }

    /// Get the usage flags.
    pub fn usage(&self) -> TextureUsage {
        self.description.usage
    }

    /// Get the mip level count.
    pub fn mip_levels(&self) -> u32 {
        self.description.mip_levels
    }

    /// Get the array layer count.
    pub fn array_layers(&self) -> u32 {
        self.description.array_layers
    }

    /// Whether this texture is a swapchain image.
    pub fn is_swapchain_image(&self) -> bool {
        self.origin == TextureOrigin::Swapchain
    }

    /// Native handle.
    pub fn raw_handle(&self) -> RawTexture {
        self.raw
    }

    pub(crate) fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    pub(crate) fn attachment(&self, mip_level: u32, array_layer: u32) -> NativeAttachment {
        NativeAttachment {
            texture: self.raw,
            mip_level,
            array_layer,
        }
    }

    pub(crate) fn raw_objects(&self) -> Vec<RawObject> {
        match self.origin {
            TextureOrigin::Owned => vec![RawObject::Texture(self.raw)],
            TextureOrigin::Swapchain => Vec::new(),
        }
    }
}

super::impl_device_resource!(Texture);

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.core.id())
            .field("size", &self.description.size)
            .field("format", &self.description.format)
            .field("usage", &self.description.usage)
            .field("label", &self.description.label)
            .finish()
    }
}

/// Native object backing a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ViewTarget {
    /// The view covers the parent exactly and reuses its handle.
    Parent,
    /// A distinct native view owned by this object.
    Owned(RawTextureView),
}

/// A view over a range of a texture's mips and layers.
///
/// Whether the view needs its own native object is decided once, at
/// creation: a view covering every mip and layer in the parent's format
/// borrows the parent's handle, anything else owns a distinct native view.
pub struct TextureView {
    pub(crate) core: Arc<ResourceCore>,
    pub(crate) device: Arc<GraphicsDevice>,
    texture: Arc<Texture>,
    range: NativeViewRange,
    target: ViewTarget,
}

impl TextureView {
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        texture: Arc<Texture>,
        label: Option<String>,
        range: NativeViewRange,
        target: ViewTarget,
    ) -> Self {
        Self {
            core: Arc::new(ResourceCore::new("TextureView", label)),
            device,
            texture,
            range,
            target,
        }
    }

    /// The viewed texture.
    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    /// Format the view reads and writes.
    pub fn format(&self) -> TextureFormat {
        self.range.format
    }

    pub fn base_mip_level(&self) -> u32 {
        self.range.base_mip_level
    }

    pub fn mip_levels(&self) -> u32 {
        self.range.mip_levels
    }

    pub fn base_array_layer(&self) -> u32 {
        self.range.base_array_layer
    }

    pub fn array_layers(&self) -> u32 {
        self.range.array_layers
    }

    /// Whether this view owns a distinct native view object.
    pub fn owns_native_view(&self) -> bool {
        matches!(self.target, ViewTarget::Owned(_))
    }

    pub(crate) fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    pub(crate) fn native_binding(&self) -> NativeBinding {
        NativeBinding::Texture {
            texture: self.texture.raw_handle(),
            view: match self.target {
                ViewTarget::Parent => None,
                ViewTarget::Owned(view) => Some(view),
            },
        }
    }

    pub(crate) fn raw_objects(&self) -> Vec<RawObject> {
        match self.target {
            ViewTarget::Parent => Vec::new(),
            ViewTarget::Owned(view) => vec![RawObject::TextureView(view)],
        }
    }
}

super::impl_device_resource!(TextureView);

impl fmt::Debug for TextureView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureView")
            .field("id", &self.core.id())
            .field("texture", &self.texture.core.id())
            .field("range", &self.range)
            .field("owned", &self.owns_native_view())
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);
static_assertions::assert_impl_all!(TextureView: Send, Sync);
