//! Context-based driver surface (OpenGL).
//!
//! A [`GlContext`] is bound to the thread that created it. The device creates
//! it on its worker thread through a [`GlContextFactory`] and every call below
//! happens there.

use std::sync::Arc;

use super::{
    NativeAttachment, NativeRenderTargets, NativeSurface, NativeTextureRegion, NativeViewRange,
    RawBuffer, RawObject, RawProgram, RawSampler, RawTexture, RawTextureView,
};
use crate::error::BackendError;
use crate::types::{
    BufferDescription, Color, Extent3d, Features, IndexFormat, Limits, PipelineDescription,
    SamplerDescription, ScissorRect, TextureDescription, Viewport,
};

/// Creates the context on the worker thread.
pub type GlContextFactory = Box<dyn FnOnce() -> Result<Box<dyn GlContext>, BackendError> + Send>;

/// Immediate-mode context calls.
pub trait GlContext {
    fn features(&self) -> Features;
    fn limits(&self) -> Limits;

    // Objects
    fn create_buffer(&mut self, desc: &BufferDescription) -> Result<RawBuffer, BackendError>;
    fn create_texture(&mut self, desc: &TextureDescription) -> Result<RawTexture, BackendError>;
    fn create_texture_view(
        &mut self,
        texture: RawTexture,
        range: &NativeViewRange,
    ) -> Result<RawTextureView, BackendError>;
    fn create_sampler(&mut self, desc: &SamplerDescription) -> Result<RawSampler, BackendError>;
    /// Compile and link every stage of the pipeline into one program.
    fn create_program(&mut self, desc: &PipelineDescription) -> Result<RawProgram, BackendError>;
    fn destroy(&mut self, object: RawObject);
    fn object_label(&mut self, object: RawObject, label: &str);

    // Program reflection
    fn uniform_block_index(&mut self, program: RawProgram, name: &str) -> Option<u32>;
    fn uniform_block_size(&mut self, program: RawProgram, block: u32) -> u32;
    fn uniform_location(&mut self, program: RawProgram, name: &str) -> Option<u32>;
    fn storage_block_index(&mut self, program: RawProgram, name: &str) -> Option<u32>;
    /// Names of every active resource, for diagnostics.
    fn active_resource_names(&mut self, program: RawProgram) -> Vec<String>;

    // Program binding assignment
    fn uniform_block_binding(&mut self, program: RawProgram, block: u32, binding: u32);
    fn storage_block_binding(&mut self, program: RawProgram, block: u32, binding: u32);
    /// `glUniform1i` on a sampler uniform.
    fn set_sampler_unit(&mut self, program: RawProgram, location: u32, unit: u32);
    /// `glUniform1i` on an image uniform.
    fn set_image_unit(&mut self, program: RawProgram, location: u32, unit: u32);

    // State
    fn use_program(&mut self, program: RawProgram, desc: &PipelineDescription);
    fn bind_uniform_buffer(&mut self, binding: u32, buffer: RawBuffer, offset: u64, size: u64);
    fn bind_storage_buffer(&mut self, binding: u32, buffer: RawBuffer, offset: u64, size: u64);
    fn bind_texture_unit(&mut self, unit: u32, texture: RawTexture, view: Option<RawTextureView>);
    fn bind_image_unit(&mut self, unit: u32, texture: RawTexture, view: Option<RawTextureView>);
    fn bind_sampler_unit(&mut self, unit: u32, sampler: RawSampler);
    fn bind_vertex_buffer(&mut self, index: u32, buffer: RawBuffer, offset: u64);
    fn bind_index_buffer(&mut self, buffer: RawBuffer, format: IndexFormat, offset: u64);
    /// `None` binds the default framebuffer.
    fn bind_framebuffer(&mut self, targets: Option<&NativeRenderTargets>);
    fn set_viewport(&mut self, index: u32, viewport: Viewport);
    fn set_scissor(&mut self, index: u32, rect: ScissorRect);

    // Commands
    fn clear_color(&mut self, index: u32, color: Color);
    fn clear_depth(&mut self, depth: f32, stencil: u8);
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    fn memory_barrier(&mut self);
    fn push_debug_group(&mut self, label: &str);
    fn pop_debug_group(&mut self);
    fn insert_debug_marker(&mut self, label: &str);

    // Transfers
    fn buffer_sub_data(&mut self, buffer: RawBuffer, offset: u64, data: &[u8]) -> Result<(), BackendError>;
    fn get_buffer_sub_data(&mut self, buffer: RawBuffer, offset: u64, len: u64) -> Result<Vec<u8>, BackendError>;
    fn tex_sub_image(
        &mut self,
        region: NativeTextureRegion,
        extent: Extent3d,
        data: &[u8],
    ) -> Result<(), BackendError>;
    fn get_tex_image(
        &mut self,
        texture: RawTexture,
        mip_level: u32,
        array_layer: u32,
    ) -> Result<Vec<u8>, BackendError>;
    fn copy_buffer(
        &mut self,
        source: RawBuffer,
        source_offset: u64,
        destination: RawBuffer,
        destination_offset: u64,
        size: u64,
    );
    fn copy_texture(
        &mut self,
        source: NativeTextureRegion,
        destination: NativeTextureRegion,
        extent: Extent3d,
    );
    fn blit_resolve(&mut self, source: NativeAttachment, destination: NativeAttachment);

    /// Copy a back-buffer texture to the surface and swap.
    fn swap_buffers(
        &mut self,
        surface: &Arc<dyn NativeSurface>,
        back_buffer: RawTexture,
    ) -> Result<(), BackendError>;

    /// `glFinish`.
    fn finish(&mut self);

    /// `glGetError`: the first failure of a command that returns nothing,
    /// cleared by the call.
    fn take_error(&mut self) -> Option<BackendError>;
}
