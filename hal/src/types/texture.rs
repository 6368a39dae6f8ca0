//! Texture types and descriptions.

use bitflags::bitflags;

use super::Extent3d;

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    // 8-bit formats
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,

    // 16-bit formats
    /// 16-bit red channel, float.
    R16Float,

    // 32-bit formats
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,

    // 64-bit formats
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RG channels, float.
    Rg32Float,

    // 128-bit formats
    /// 32-bit RGBA channels, float.
    Rgba32Float,

    // Depth/stencil formats
    /// 16-bit depth.
    Depth16Unorm,
    /// 24-bit depth.
    Depth24Plus,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit depth, float.
    Depth32Float,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm | Self::Depth24Plus | Self::Depth24PlusStencil8 | Self::Depth32Float
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8)
    }

    /// Returns true for sRGB-encoded formats.
    pub fn is_srgb(&self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb)
    }

    /// Returns the size in bytes per texel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R16Float | Self::Depth16Unorm => 2,
            Self::R32Float
            | Self::R32Uint
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Depth24Plus
            | Self::Depth24PlusStencil8
            | Self::Depth32Float => 4,
            Self::Rgba16Float | Self::Rg32Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Read through a sampler.
        const SAMPLED = 1 << 0;
        /// Read-write storage image.
        const STORAGE = 1 << 1;
        /// Color render target.
        const RENDER_TARGET = 1 << 2;
        /// Depth/stencil render target.
        const DEPTH_STENCIL = 1 << 3;
        /// Six-faced cube layers.
        const CUBEMAP = 1 << 4;
        /// CPU-visible staging texture.
        const STAGING = 1 << 5;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureKind {
    D1,
    #[default]
    D2,
    D3,
}

/// Description for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescription {
    /// Debug label.
    pub label: Option<String>,
    /// Size of mip level zero.
    pub size: Extent3d,
    /// Mip level count.
    pub mip_levels: u32,
    /// Array layer count (multiple of six for cubemaps).
    pub array_layers: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
    /// Dimensionality.
    pub kind: TextureKind,
    /// Sample count for multisampling.
    pub sample_count: u32,
}

impl TextureDescription {
    /// Create a 2D texture description.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(width, height),
            mip_levels: 1,
            array_layers: 1,
            format,
            usage,
            kind: TextureKind::D2,
            sample_count: 1,
        }
    }

    /// Create a 3D texture description.
    pub fn new_3d(
        width: u32,
        height: u32,
        depth: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            size: Extent3d::new(width, height, depth),
            kind: TextureKind::D3,
            ..Self::new_2d(width, height, format, usage)
        }
    }

    /// Create a cubemap description (six layers).
    pub fn new_cube(size: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            array_layers: 6,
            usage: usage | TextureUsage::CUBEMAP,
            ..Self::new_2d(size, size, format, usage)
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Set the array layer count.
    pub fn with_array_layers(mut self, layers: u32) -> Self {
        self.array_layers = layers;
        self
    }

    /// Set the sample count.
    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Maximum mip count for this size.
    pub fn max_mip_levels(&self) -> u32 {
        let largest = self.size.width.max(self.size.height).max(match self.kind {
            TextureKind::D3 => self.size.depth,
            _ => 1,
        });
        32 - largest.max(1).leading_zeros()
    }

    /// Number of subresources (mips times layers).
    pub fn subresource_count(&self) -> u32 {
        self.mip_levels * self.array_layers
    }

    /// Subresource index for a mip level and array layer.
    pub fn subresource_index(&self, mip_level: u32, array_layer: u32) -> u32 {
        mip_level + array_layer * self.mip_levels
    }

    /// Inverse of [`subresource_index`](Self::subresource_index).
    pub fn subresource_coords(&self, subresource: u32) -> (u32, u32) {
        (subresource % self.mip_levels, subresource / self.mip_levels)
    }

    /// Byte size of one subresource, tightly packed.
    pub fn subresource_size(&self, mip_level: u32) -> u64 {
        let extent = self.mip_extent(mip_level);
        extent.volume() * self.format.block_size() as u64
    }

    /// Extent of a mip level (depth kept at 1 for non-3D textures).
    pub fn mip_extent(&self, mip_level: u32) -> Extent3d {
        let mut extent = self.size.mip_level(mip_level);
        if self.kind != TextureKind::D3 {
            extent.depth = 1;
        }
        extent
    }
}

/// Description for creating a texture view.
///
/// `None` ranges cover the rest of the parent texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextureViewDescription {
    /// Debug label.
    pub label: Option<String>,
    /// First visible mip.
    pub base_mip_level: u32,
    /// Visible mip count.
    pub mip_levels: Option<u32>,
    /// First visible layer.
    pub base_array_layer: u32,
    /// Visible layer count.
    pub array_layers: Option<u32>,
    /// Reinterpreted format.
    pub format: Option<TextureFormat>,
}

impl TextureViewDescription {
    /// A view of the whole texture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a mip range.
    pub fn with_mips(mut self, base: u32, count: u32) -> Self {
        self.base_mip_level = base;
        self.mip_levels = Some(count);
        self
    }

    /// Restrict to a layer range.
    pub fn with_layers(mut self, base: u32, count: u32) -> Self {
        self.base_array_layer = base;
        self.array_layers = Some(count);
        self
    }

    /// Reinterpret the format.
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_properties() {
        assert!(TextureFormat::Depth32Float.is_depth_stencil());
        assert!(!TextureFormat::Rgba8Unorm.is_depth_stencil());
        assert!(TextureFormat::Depth24PlusStencil8.has_stencil());
        assert_eq!(TextureFormat::Rgba32Float.block_size(), 16);
        assert_eq!(TextureFormat::R8Unorm.block_size(), 1);
    }

    #[test]
    fn test_subresource_index() {
        let desc = TextureDescription::new_2d(64, 64, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED)
            .with_mip_levels(4)
            .with_array_layers(3);
        assert_eq!(desc.subresource_index(0, 0), 0);
        assert_eq!(desc.subresource_index(2, 1), 6);
        assert_eq!(desc.subresource_coords(6), (2, 1));
        assert_eq!(desc.subresource_count(), 12);
    }

    #[test]
    fn test_max_mip_levels() {
        let desc = TextureDescription::new_2d(256, 64, TextureFormat::R8Unorm, TextureUsage::SAMPLED);
        assert_eq!(desc.max_mip_levels(), 9);
        let desc = TextureDescription::new_3d(8, 8, 32, TextureFormat::R32Float, TextureUsage::STORAGE);
        assert_eq!(desc.max_mip_levels(), 6);
    }

    #[test]
    fn test_mip_extent_ignores_depth_for_2d() {
        let desc = TextureDescription::new_cube(32, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED);
        assert_eq!(desc.array_layers, 6);
        assert!(desc.usage.contains(TextureUsage::CUBEMAP));
        assert_eq!(desc.mip_extent(1), Extent3d::new(16, 16, 1));
        assert_eq!(desc.subresource_size(0), 32 * 32 * 4);
    }
}
