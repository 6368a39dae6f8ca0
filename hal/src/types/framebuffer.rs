//! Framebuffer and swapchain descriptions.

use std::fmt;
use std::sync::Arc;

use super::TextureFormat;
use crate::native::NativeSurface;
use crate::resources::Texture;

/// One attachment of a framebuffer.
#[derive(Debug, Clone)]
pub struct FramebufferAttachment {
    pub target: Arc<Texture>,
    pub mip_level: u32,
    pub array_layer: u32,
}

impl FramebufferAttachment {
    /// Attach mip 0, layer 0 of a texture.
    pub fn new(target: Arc<Texture>) -> Self {
        Self {
            target,
            mip_level: 0,
            array_layer: 0,
        }
    }

    /// Attach a specific mip and layer.
    pub fn with_subresource(mut self, mip_level: u32, array_layer: u32) -> Self {
        self.mip_level = mip_level;
        self.array_layer = array_layer;
        self
    }
}

/// Description for creating a framebuffer.
#[derive(Debug, Clone, Default)]
pub struct FramebufferDescription {
    pub color_targets: Vec<FramebufferAttachment>,
    pub depth_target: Option<FramebufferAttachment>,
}

impl FramebufferDescription {
    /// Framebuffer with the given color targets and no depth.
    pub fn new(color_targets: Vec<FramebufferAttachment>) -> Self {
        Self {
            color_targets,
            depth_target: None,
        }
    }

    /// Add a depth target.
    pub fn with_depth(mut self, depth: FramebufferAttachment) -> Self {
        self.depth_target = Some(depth);
        self
    }
}

/// Description for creating a swapchain.
#[derive(Clone)]
pub struct SwapchainDescription {
    /// Surface the swapchain presents to.
    pub surface: Arc<dyn NativeSurface>,
    pub width: u32,
    pub height: u32,
    pub color_format: TextureFormat,
    /// Shared depth attachment format, if any.
    pub depth_format: Option<TextureFormat>,
    pub vsync: bool,
}

impl SwapchainDescription {
    /// Create a swapchain description for a surface.
    pub fn new(surface: Arc<dyn NativeSurface>, width: u32, height: u32) -> Self {
        Self {
            surface,
            width,
            height,
            color_format: TextureFormat::Bgra8Unorm,
            depth_format: None,
            vsync: true,
        }
    }

    /// Request a shared depth attachment.
    pub fn with_depth(mut self, format: TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Set the color format.
    pub fn with_color_format(mut self, format: TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }
}

impl fmt::Debug for SwapchainDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapchainDescription")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("color_format", &self.color_format)
            .field("depth_format", &self.depth_format)
            .field("vsync", &self.vsync)
            .finish()
    }
}
