//! # RedLilium HAL
//!
//! Multi-backend GPU hardware abstraction layer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsDevice`] - One backend plus its submission timeline and disposal queue
//! - [`ResourceFactory`] - Buffers, textures, pipelines, resource sets and swapchains
//! - [`CommandList`] - Backend-neutral command recording
//! - [`Swapchain`] - Presentation with resize and surface-loss recovery
//! - [`soft`] - A software driver that reports itself as any supported backend
//!
//! Explicit backends (Vulkan, Metal, Direct3D 11) record into native command
//! buffers as commands arrive. OpenGL records into a command log that a
//! dedicated worker thread replays against its context.
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_hal::{BackendKind, DeviceOptions, ResourceFactory};
//! use redlilium_hal::soft::{KernelLibrary, SoftGpu};
//!
//! let gpu = SoftGpu::new(KernelLibrary::new());
//! let device = gpu.create_device(BackendKind::Vulkan, DeviceOptions::default())?;
//! let mut list = device.create_command_list()?;
//! list.begin()?;
//! // Record...
//! list.end()?;
//! device.submit_commands(&mut list, None)?;
//! device.wait_for_idle()?;
//! ```

mod binding;
mod command;
pub mod config;
mod device;
mod disposal;
pub mod error;
mod factory;
pub mod native;
pub mod profiling;
pub mod resources;
pub mod soft;
mod swapchain;
mod sync;
pub mod types;
mod worker;

// Re-export main types for convenience
pub use command::{CommandList, CommandListState, TextureLocation};
pub use config::{BackendKind, DeviceOptions, ValidationMode};
pub use device::{GraphicsDevice, MapTarget, MappedResource};
pub use error::{BackendError, HalError, HalResult, UsageError};
pub use factory::ResourceFactory;
pub use resources::{
    BindableResource, Buffer, BufferRange, Fence, Framebuffer, Pipeline, ResourceLayout, ResourceSet, Sampler,
    Texture, TextureView,
};
pub use swapchain::{Swapchain, SwapchainState};
pub use types::*;

/// HAL library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
