//! Encoder translating operations 1:1 into a native command buffer.

use std::sync::Arc;

use super::{CommandEncoder, Submission, TextureLocation};
use crate::binding::SlotModel;
use crate::error::{BackendError, HalResult};
use crate::native::{NativeCommandBuffer, NativeDevice, NativeRenderTargets, NativeTextureRegion};
use crate::resources::{Buffer, Framebuffer, Pipeline, RealizedPipeline, ResourceSet, Texture};
use crate::types::{Color, Extent3d, IndexFormat, ScissorRect, Viewport};

/// Records into a native command buffer of an explicit backend.
///
/// Render passes are opened lazily on the first draw or clear after a
/// framebuffer is bound, and closed before any operation that must run
/// outside a pass.
pub(crate) struct NativeEncoder {
    device: Arc<dyn NativeDevice>,
    model: SlotModel,
    commands: Option<Box<dyn NativeCommandBuffer>>,
    targets: Option<NativeRenderTargets>,
    rendering: bool,
}

impl NativeEncoder {
    pub fn new(device: Arc<dyn NativeDevice>, model: SlotModel) -> Self {
        Self {
            device,
            model,
            commands: None,
            targets: None,
            rendering: false,
        }
    }

    fn commands(&mut self) -> Option<&mut Box<dyn NativeCommandBuffer>> {
        self.commands.as_mut()
    }

    fn ensure_rendering(&mut self) {
        if self.rendering {
            return;
        }
        if let (Some(commands), Some(targets)) = (self.commands.as_mut(), self.targets.as_ref()) {
            commands.begin_rendering(targets);
            self.rendering = true;
        }
    }

    fn end_rendering(&mut self) {
        if self.rendering {
            if let Some(commands) = self.commands.as_mut() {
                commands.end_rendering();
            }
            self.rendering = false;
        }
    }

    fn region(location: &TextureLocation) -> NativeTextureRegion {
        NativeTextureRegion {
            texture: location.texture.raw_handle(),
            mip_level: location.mip_level,
            array_layer: location.array_layer,
            origin: location.origin,
        }
    }
}

impl CommandEncoder for NativeEncoder {
    fn begin(&mut self) -> HalResult<()> {
        self.commands = Some(self.device.create_command_buffer()?);
        self.targets = None;
        self.rendering = false;
        Ok(())
    }

    fn set_pipeline(&mut self, _pipeline: &Arc<Pipeline>, realized: &RealizedPipeline) {
        if let (Some(commands), RealizedPipeline::Explicit { raw, .. }) = (self.commands.as_mut(), realized) {
            commands.bind_pipeline(*raw);
        }
    }

    fn set_resource_set(
        &mut self,
        index: u32,
        set: &Arc<ResourceSet>,
        dynamic_offsets: &[u32],
        realized: &RealizedPipeline,
    ) {
        let RealizedPipeline::Explicit { bindings, .. } = realized else {
            return;
        };
        let model = self.model;
        let Some(commands) = self.commands.as_mut() else {
            return;
        };

        if model == SlotModel::Descriptor {
            if let Some(raw) = set.raw_descriptor_set() {
                commands.bind_descriptor_set(index, raw, dynamic_offsets);
            }
            return;
        }

        let mut offsets = dynamic_offsets.iter();
        for (element_index, element) in set.layout().elements().iter().enumerate() {
            let offset = if element.is_dynamic() {
                offsets.next().copied().unwrap_or(0)
            } else {
                0
            };
            let slot = bindings.slot(index as usize, element_index);
            let binding = set.binding(element_index, offset);
            if let (Some(slot), Some(binding)) = (slot, binding) {
                commands.bind_resource(slot, binding);
            }
        }
    }

    fn set_framebuffer(&mut self, framebuffer: &Arc<Framebuffer>) {
        self.end_rendering();
        self.targets = Some(framebuffer.render_targets().clone());
    }

    fn set_vertex_buffer(&mut self, index: u32, buffer: &Arc<Buffer>, offset: u64) {
        if let Some(commands) = self.commands() {
            commands.bind_vertex_buffer(index, buffer.raw_handle(), offset);
        }
    }

    fn set_index_buffer(&mut self, buffer: &Arc<Buffer>, format: IndexFormat, offset: u64) {
        if let Some(commands) = self.commands() {
            commands.bind_index_buffer(buffer.raw_handle(), format, offset);
        }
    }

    fn set_viewport(&mut self, index: u32, viewport: Viewport) {
        if let Some(commands) = self.commands() {
            commands.set_viewport(index, viewport);
        }
    }

    fn set_scissor(&mut self, index: u32, rect: ScissorRect) {
        if let Some(commands) = self.commands() {
            commands.set_scissor(index, rect);
        }
    }

    fn clear_color(&mut self, index: u32, color: Color) {
        self.ensure_rendering();
        let attachment = self
            .targets
            .as_ref()
            .and_then(|targets| targets.colors.get(index as usize))
            .copied();
        if let (Some(commands), Some(attachment)) = (self.commands.as_mut(), attachment) {
            commands.clear_color(attachment, color);
        }
    }

    fn clear_depth(&mut self, depth: f32, stencil: u8) {
        self.ensure_rendering();
        let attachment = self.targets.as_ref().and_then(|targets| targets.depth);
        if let (Some(commands), Some(attachment)) = (self.commands.as_mut(), attachment) {
            commands.clear_depth(attachment, depth, stencil);
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.ensure_rendering();
        if let Some(commands) = self.commands() {
            commands.draw(vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.ensure_rendering();
        if let Some(commands) = self.commands() {
            commands.draw_indexed(index_count, instance_count, first_index, vertex_offset, first_instance);
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.end_rendering();
        if let Some(commands) = self.commands() {
            commands.dispatch(x, y, z);
        }
    }

    fn update_buffer(&mut self, buffer: &Arc<Buffer>, offset: u64, data: &[u8]) {
        self.end_rendering();
        if let Some(commands) = self.commands() {
            commands.update_buffer(buffer.raw_handle(), offset, data);
        }
    }

    fn copy_buffer(
        &mut self,
        source: &Arc<Buffer>,
        source_offset: u64,
        destination: &Arc<Buffer>,
        destination_offset: u64,
        size: u64,
    ) {
        self.end_rendering();
        if let Some(commands) = self.commands() {
            commands.copy_buffer(
                source.raw_handle(),
                source_offset,
                destination.raw_handle(),
                destination_offset,
                size,
            );
        }
    }

    fn copy_texture(&mut self, source: &TextureLocation, destination: &TextureLocation, extent: Extent3d) {
        self.end_rendering();
        let (source, destination) = (Self::region(source), Self::region(destination));
        if let Some(commands) = self.commands() {
            commands.copy_texture(source, destination, extent);
        }
    }

    fn resolve_texture(&mut self, source: &Arc<Texture>, destination: &Arc<Texture>) {
        self.end_rendering();
        if let Some(commands) = self.commands() {
            commands.resolve_texture(source.attachment(0, 0), destination.attachment(0, 0));
        }
    }

    fn memory_barrier(&mut self) {
        if let Some(commands) = self.commands() {
            commands.memory_barrier();
        }
    }

    fn push_debug_group(&mut self, label: &str) {
        if let Some(commands) = self.commands() {
            commands.push_debug_group(label);
        }
    }

    fn pop_debug_group(&mut self) {
        if let Some(commands) = self.commands() {
            commands.pop_debug_group();
        }
    }

    fn insert_debug_marker(&mut self, label: &str) {
        if let Some(commands) = self.commands() {
            commands.insert_debug_marker(label);
        }
    }

    fn end(&mut self) -> HalResult<()> {
        self.end_rendering();
        let commands = self
            .commands
            .as_mut()
            .ok_or_else(|| BackendError::Internal("no native command buffer to close".into()))?;
        commands.finish();
        Ok(())
    }

    fn take_submission(&mut self) -> Option<Submission> {
        self.targets = None;
        self.commands.take().map(Submission::Native)
    }

    fn reset(&mut self) {
        self.commands = None;
        self.targets = None;
        self.rendering = false;
    }
}
