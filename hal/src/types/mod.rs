//! Backend-agnostic resource descriptions.
//!
//! Everything here is plain data: descriptions are validated by the device
//! and realized by the active backend.

mod buffer;
mod common;
mod framebuffer;
mod layout;
mod pipeline;
mod sampler;
mod texture;

pub use buffer::*;
pub use common::*;
pub use framebuffer::*;
pub use layout::*;
pub use pipeline::*;
pub use sampler::*;
pub use texture::*;
