//! Common types shared across descriptions.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

/// Unique identifier assigned to every resource at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Allocate a fresh, process-unique identifier.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A 3D extent (width, height, depth).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 3D extent.
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Create a 2D extent (depth = 1).
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self::new(width, height, 1)
    }

    /// Extent of the given mip level (each dimension clamped to 1).
    pub fn mip_level(&self, level: u32) -> Self {
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
            depth: (self.depth >> level).max(1),
        }
    }

    /// Number of texels.
    pub fn volume(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }
}

/// RGBA color with float components.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Self = Self::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Self = Self::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Self = Self::new(0.0, 0.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Create a new color.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Components as an array.
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Build from an array.
    pub fn from_array(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

// Colors participate in pipeline cache keys (blend constants).
impl Hash for Color {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.to_array() {
            c.to_bits().hash(state);
        }
    }
}

/// Viewport in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Create a new viewport.
    pub fn new(x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth,
            max_depth,
        }
    }

    /// Full-target viewport with depth range [0, 1].
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32, 0.0, 1.0)
    }
}

/// Scissor rectangle in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    /// Create a new scissor rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

bitflags! {
    /// Shader stages a resource is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

impl Default for ShaderStages {
    fn default() -> Self {
        Self::empty()
    }
}

/// Index element format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    U16,
    #[default]
    U32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Access mode requested when mapping a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    Read,
    Write,
    ReadWrite,
}

impl MapMode {
    /// Whether the mapping observes current contents.
    pub fn reads(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Whether the mapping is written back on unmap.
    pub fn writes(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Native image layouts tracked on explicit backends.
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

/// Device capabilities that callers may query before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Features {
    /// Compute pipelines and dispatch.
    pub compute_shaders: bool,
    /// Dynamic offsets on uniform/structured buffer bindings.
    pub dynamic_binding_offsets: bool,
    /// Cube views bound as read-write storage images.
    pub storage_cube_images: bool,
    /// Per-target blend state.
    pub independent_blend: bool,
    /// Debug groups and markers reach the driver.
    pub debug_markers: bool,
}

impl Features {
    /// Everything supported.
    pub const fn all() -> Self {
        Self {
            compute_shaders: true,
            dynamic_binding_offsets: true,
            storage_cube_images: true,
            independent_blend: true,
            debug_markers: true,
        }
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::all()
    }
}

/// Numeric limits reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limits {
    /// Required alignment for uniform buffer binding offsets.
    pub uniform_offset_alignment: u32,
    /// Required alignment for structured buffer binding offsets.
    pub structured_offset_alignment: u32,
    /// Largest texture dimension.
    pub max_texture_dimension: u32,
    /// Largest buffer in bytes.
    pub max_buffer_size: u64,
    /// Maximum number of resource sets per pipeline.
    pub max_resource_sets: u32,
    /// Maximum compute workgroup size per dimension.
    pub max_workgroup_size: [u32; 3],
    /// Maximum bound color targets.
    pub max_color_targets: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            uniform_offset_alignment: 256,
            structured_offset_alignment: 64,
            max_texture_dimension: 16384,
            max_buffer_size: 1 << 30, // 1 GB
            max_resource_sets: 8,
            max_workgroup_size: [1024, 1024, 64],
            max_color_targets: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_mip_level() {
        let extent = Extent3d::new(256, 128, 32);
        assert_eq!(extent.mip_level(0), extent);
        assert_eq!(extent.mip_level(3), Extent3d::new(32, 16, 4));
        assert_eq!(extent.mip_level(10), Extent3d::new(1, 1, 1));
    }

    #[test]
    fn test_resource_ids_unique() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_map_mode() {
        assert!(MapMode::Read.reads());
        assert!(!MapMode::Read.writes());
        assert!(MapMode::ReadWrite.reads() && MapMode::ReadWrite.writes());
    }
}
