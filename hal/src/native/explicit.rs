//! Explicit-API driver surface (Vulkan, Metal, Direct3D 11).

use std::any::Any;
use std::sync::Arc;

use super::{
    NativeAttachment, NativeBinding, NativeBindingDecl, NativeDescriptorWrite, NativeRenderTargets,
    NativeSlot, NativeSurface, NativeSwapchainDesc, NativeTextureRegion, NativeViewRange, RawBuffer,
    RawDescriptorSet, RawObject, RawPipeline, RawSampler, RawSwapchain, RawTexture, RawTextureView,
};
use crate::config::BackendKind;
use crate::error::{BackendError, HalError};
use crate::types::{
    BufferDescription, Color, Extent3d, Features, ImageLayout, IndexFormat, Limits,
    PipelineDescription, SamplerDescription, ScissorRect, TextureDescription, Viewport,
};

/// Invoked once the GPU has finished executing a submission, with the
/// outcome of the execution.
pub type SubmitCallback = Box<dyn FnOnce(Result<(), BackendError>) + Send>;

/// A native device of an explicit backend.
///
/// Submissions complete in submission order.
pub trait NativeDevice: Send + Sync {
    /// Which API this device speaks.
    fn kind(&self) -> BackendKind;
    fn features(&self) -> Features;
    fn limits(&self) -> Limits;

    fn create_buffer(&self, desc: &BufferDescription) -> Result<RawBuffer, BackendError>;
    fn create_texture(&self, desc: &TextureDescription) -> Result<RawTexture, BackendError>;
    fn create_texture_view(
        &self,
        texture: RawTexture,
        range: &NativeViewRange,
    ) -> Result<RawTextureView, BackendError>;
    fn create_sampler(&self, desc: &SamplerDescription) -> Result<RawSampler, BackendError>;
    /// Only called on backends whose bindings are
    /// [`NativeSlot::Descriptor`] slots.
    fn create_descriptor_set(&self, writes: &[NativeDescriptorWrite]) -> Result<RawDescriptorSet, BackendError>;
    fn create_pipeline(
        &self,
        desc: &PipelineDescription,
        bindings: &[NativeBindingDecl],
    ) -> Result<RawPipeline, BackendError>;
    fn destroy(&self, object: RawObject);
    fn set_object_name(&self, object: RawObject, name: &str);

    fn create_command_buffer(&self) -> Result<Box<dyn NativeCommandBuffer>, BackendError>;
    /// Queue a finished command buffer. `on_complete` runs once it retires.
    fn submit(
        &self,
        commands: Box<dyn NativeCommandBuffer>,
        on_complete: SubmitCallback,
    ) -> Result<(), BackendError>;
    /// Block until every submission has retired.
    fn wait_idle(&self) -> Result<(), BackendError>;

    fn read_buffer(&self, buffer: RawBuffer, offset: u64, len: u64) -> Result<Vec<u8>, BackendError>;
    fn write_buffer(&self, buffer: RawBuffer, offset: u64, data: &[u8]) -> Result<(), BackendError>;
    fn read_texture(
        &self,
        texture: RawTexture,
        mip_level: u32,
        array_layer: u32,
    ) -> Result<Vec<u8>, BackendError>;
    fn write_texture(
        &self,
        texture: RawTexture,
        mip_level: u32,
        array_layer: u32,
        data: &[u8],
    ) -> Result<(), BackendError>;

    fn create_swapchain(
        &self,
        surface: &Arc<dyn NativeSurface>,
        desc: &NativeSwapchainDesc,
    ) -> Result<RawSwapchain, BackendError>;
    /// Images owned by the swapchain, destroyed with it.
    fn swapchain_images(&self, swapchain: RawSwapchain) -> Result<Vec<RawTexture>, BackendError>;
    /// Returns [`HalError::SwapchainOutOfDate`] or [`HalError::SurfaceLost`]
    /// when the swapchain no longer matches its surface.
    fn acquire_next_image(&self, swapchain: RawSwapchain) -> Result<u32, HalError>;
    fn present(&self, swapchain: RawSwapchain, image_index: u32) -> Result<(), HalError>;
    fn destroy_swapchain(&self, swapchain: RawSwapchain);
}

/// A native command buffer. Calls map 1:1 onto driver commands.
pub trait NativeCommandBuffer: Send {
    fn bind_pipeline(&mut self, pipeline: RawPipeline);
    fn bind_descriptor_set(&mut self, index: u32, set: RawDescriptorSet, dynamic_offsets: &[u32]);
    fn bind_resource(&mut self, slot: NativeSlot, resource: NativeBinding);
    fn bind_vertex_buffer(&mut self, index: u32, buffer: RawBuffer, offset: u64);
    fn bind_index_buffer(&mut self, buffer: RawBuffer, format: IndexFormat, offset: u64);

    fn begin_rendering(&mut self, targets: &NativeRenderTargets);
    fn end_rendering(&mut self);
    fn clear_color(&mut self, attachment: NativeAttachment, color: Color);
    fn clear_depth(&mut self, attachment: NativeAttachment, depth: f32, stencil: u8);
    fn set_viewport(&mut self, index: u32, viewport: Viewport);
    fn set_scissor(&mut self, index: u32, rect: ScissorRect);

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

    fn update_buffer(&mut self, buffer: RawBuffer, offset: u64, data: &[u8]);
    fn update_texture(&mut self, region: NativeTextureRegion, extent: Extent3d, data: &[u8]);
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
    fn resolve_texture(&mut self, source: NativeAttachment, destination: NativeAttachment);
    fn transition_texture(&mut self, texture: RawTexture, from: ImageLayout, to: ImageLayout);
    fn memory_barrier(&mut self);

    fn push_debug_group(&mut self, label: &str);
    fn pop_debug_group(&mut self);
    fn insert_debug_marker(&mut self, label: &str);

    /// Close the buffer for submission.
    fn finish(&mut self);

    /// Recover the concrete buffer when its device receives it back in
    /// [`NativeDevice::submit`].
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}
