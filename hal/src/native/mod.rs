//! Interfaces of the native binding layer.
//!
//! The HAL never calls a graphics API directly. Explicit backends (Vulkan,
//! Metal, Direct3D 11) are driven through [`NativeDevice`] and
//! [`NativeCommandBuffer`]; the context-based OpenGL backend is driven through
//! [`GlContext`], which is only ever touched from the device worker thread.
//!
//! Native objects are identified by opaque `u64` handles.

mod explicit;
mod gl;

pub use explicit::{NativeCommandBuffer, NativeDevice, SubmitCallback};
pub use gl::{GlContext, GlContextFactory};

use std::fmt;

use crate::types::{ResourceKind, ShaderStages, TextureFormat};

macro_rules! raw_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

raw_handle!(
    /// Native buffer.
    RawBuffer,
    /// Native texture or image.
    RawTexture,
    /// Distinct native view over a texture.
    RawTextureView,
    /// Native sampler.
    RawSampler,
    /// Native descriptor set (explicit backends with set binding).
    RawDescriptorSet,
    /// Native pipeline state object.
    RawPipeline,
    /// Linked GL program.
    RawProgram,
    /// Native swapchain.
    RawSwapchain,
);

/// Any destroyable native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawObject {
    Buffer(RawBuffer),
    Texture(RawTexture),
    TextureView(RawTextureView),
    Sampler(RawSampler),
    DescriptorSet(RawDescriptorSet),
    Pipeline(RawPipeline),
    Program(RawProgram),
}

// ============================================================================
// Binding slots
// ============================================================================

/// Metal argument table classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentClass {
    Buffer,
    Texture,
    Sampler,
}

/// Direct3D 11 register classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterClass {
    /// `b#`
    ConstantBuffer,
    /// `t#`
    ShaderResource,
    /// `s#`
    Sampler,
    /// `u#`
    UnorderedAccess,
}

impl RegisterClass {
    /// HLSL register prefix.
    pub fn prefix(&self) -> char {
        match self {
            Self::ConstantBuffer => 'b',
            Self::ShaderResource => 't',
            Self::Sampler => 's',
            Self::UnorderedAccess => 'u',
        }
    }
}

/// Backend-native binding point of one layout element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeSlot {
    /// Vulkan `{set, binding}`.
    Descriptor { set: u32, binding: u32 },
    /// Metal argument index.
    Argument { class: ArgumentClass, index: u32 },
    /// Direct3D 11 register.
    Register { class: RegisterClass, index: u32 },
}

impl fmt::Display for NativeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Descriptor { set, binding } => write!(f, "set={set},binding={binding}"),
            Self::Argument { class, index } => write!(f, "{class:?}[{index}]"),
            Self::Register { class, index } => write!(f, "{}{index}", class.prefix()),
        }
    }
}

/// A resource as seen by the driver at a binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeBinding {
    Buffer {
        buffer: RawBuffer,
        offset: u64,
        size: u64,
    },
    /// `view` is `None` when the whole texture is bound through its own handle.
    Texture {
        texture: RawTexture,
        view: Option<RawTextureView>,
    },
    Sampler(RawSampler),
}

/// Declaration of one translated binding, handed to pipeline creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeBindingDecl {
    pub name: String,
    pub kind: ResourceKind,
    pub stages: ShaderStages,
    pub slot: NativeSlot,
}

/// One write into a native descriptor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeDescriptorWrite {
    pub binding: u32,
    pub kind: ResourceKind,
    pub dynamic: bool,
    pub resource: NativeBinding,
}

/// Sub-range of a texture covered by a distinct view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeViewRange {
    pub base_mip_level: u32,
    pub mip_levels: u32,
    pub base_array_layer: u32,
    pub array_layers: u32,
    pub format: TextureFormat,
}

/// A single texture subresource used as a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeAttachment {
    pub texture: RawTexture,
    pub mip_level: u32,
    pub array_layer: u32,
}

/// Render targets of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NativeRenderTargets {
    pub colors: Vec<NativeAttachment>,
    pub depth: Option<NativeAttachment>,
    pub width: u32,
    pub height: u32,
}

/// Texture subresource region for copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeTextureRegion {
    pub texture: RawTexture,
    pub mip_level: u32,
    pub array_layer: u32,
    pub origin: [u32; 3],
}

/// Swapchain creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeSwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub image_count: u32,
    pub vsync: bool,
}

// ============================================================================
// Surfaces
// ============================================================================

/// A presentation surface supplied by the windowing layer.
pub trait NativeSurface: Send + Sync {
    /// Current drawable extent in pixels.
    fn extent(&self) -> (u32, u32);

    /// Whether the surface has been destroyed by the window system.
    fn is_lost(&self) -> bool {
        false
    }

    /// Receive a presented frame.
    ///
    /// Only software presentation paths call this; hardware swapchains
    /// present through the driver.
    fn receive_frame(&self, width: u32, height: u32, format: TextureFormat, data: &[u8]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_display() {
        let slot = NativeSlot::Register {
            class: RegisterClass::UnorderedAccess,
            index: 2,
        };
        assert_eq!(slot.to_string(), "u2");
        let slot = NativeSlot::Descriptor { set: 1, binding: 3 };
        assert_eq!(slot.to_string(), "set=1,binding=3");
    }
}
