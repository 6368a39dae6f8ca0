//! Worker-side execution of a [`CommandLog`].

use super::entry::{CommandEntry, CommandLog, LoggedRegion};
use crate::binding::{GlBindings, GlTextureBinding};
use crate::error::BackendError;
use crate::native::{GlContext, NativeBinding, NativeTextureRegion};
use crate::resources::{RealizedPipeline, ResourceSet};

/// Execute every entry of `log` against `ctx`, in order.
///
/// Stops at the first entry that cannot be executed.
pub(crate) fn replay(ctx: &mut dyn GlContext, log: &CommandLog) -> Result<(), BackendError> {
    crate::profile_scope!("gl_replay");

    let mut program: Option<&GlBindings> = None;

    for entry in log.entries() {
        match *entry {
            CommandEntry::SetPipeline { pipeline } => {
                let pipeline = log.pipeline(pipeline).ok_or_else(|| missing("pipeline"))?;
                let Some(RealizedPipeline::Gl(bindings)) = pipeline.realized_state() else {
                    return Err(BackendError::Internal(format!(
                        "pipeline {} replayed before it was realized",
                        pipeline.core().id()
                    )));
                };
                ctx.use_program(bindings.program, pipeline.description());
                program = Some(bindings);
            }
            CommandEntry::SetResourceSet { index, set, offsets } => {
                let bindings = program.ok_or_else(|| missing("bound program"))?;
                let set = log.resource_set(set).ok_or_else(|| missing("resource set"))?;
                bind_set(ctx, bindings, index as usize, set, log.offsets(offsets));
            }
            CommandEntry::SetFramebuffer { framebuffer } => {
                let framebuffer = log.framebuffer(framebuffer).ok_or_else(|| missing("framebuffer"))?;
                ctx.bind_framebuffer(Some(framebuffer.render_targets()));
            }
            CommandEntry::SetVertexBuffer { index, buffer, offset } => {
                let buffer = log.buffer(buffer).ok_or_else(|| missing("vertex buffer"))?;
                ctx.bind_vertex_buffer(index, buffer.raw_handle(), offset);
            }
            CommandEntry::SetIndexBuffer { buffer, format, offset } => {
                let buffer = log.buffer(buffer).ok_or_else(|| missing("index buffer"))?;
                ctx.bind_index_buffer(buffer.raw_handle(), format, offset);
            }
            CommandEntry::SetViewport { index, viewport } => ctx.set_viewport(index, viewport),
            CommandEntry::SetScissor { index, rect } => ctx.set_scissor(index, rect),
            CommandEntry::ClearColor { index, color } => ctx.clear_color(index, color),
            CommandEntry::ClearDepth { depth, stencil } => ctx.clear_depth(depth, stencil),
            CommandEntry::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => ctx.draw(vertex_count, instance_count, first_vertex, first_instance),
            CommandEntry::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            } => ctx.draw_indexed(index_count, instance_count, first_index, vertex_offset, first_instance),
            CommandEntry::Dispatch { x, y, z } => ctx.dispatch(x, y, z),
            CommandEntry::UpdateBuffer { buffer, offset, data } => {
                let buffer = log.buffer(buffer).ok_or_else(|| missing("buffer"))?;
                ctx.buffer_sub_data(buffer.raw_handle(), offset, log.bytes(data))?;
            }
            CommandEntry::CopyBuffer {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            } => {
                let source = log.buffer(source).ok_or_else(|| missing("copy source"))?;
                let destination = log.buffer(destination).ok_or_else(|| missing("copy destination"))?;
                ctx.copy_buffer(
                    source.raw_handle(),
                    source_offset,
                    destination.raw_handle(),
                    destination_offset,
                    size,
                );
            }
            CommandEntry::CopyTexture {
                source,
                destination,
                extent,
            } => {
                let source = region(log, source)?;
                let destination = region(log, destination)?;
                ctx.copy_texture(source, destination, extent);
            }
            CommandEntry::ResolveTexture { source, destination } => {
                let source = log.texture(source).ok_or_else(|| missing("resolve source"))?;
                let destination = log.texture(destination).ok_or_else(|| missing("resolve destination"))?;
                ctx.blit_resolve(source.attachment(0, 0), destination.attachment(0, 0));
            }
            CommandEntry::MemoryBarrier => ctx.memory_barrier(),
            CommandEntry::PushDebugGroup { label } => ctx.push_debug_group(log.label(label)),
            CommandEntry::PopDebugGroup => ctx.pop_debug_group(),
            CommandEntry::InsertDebugMarker { label } => ctx.insert_debug_marker(log.label(label)),
        }
    }
    Ok(())
}

fn missing(what: &str) -> BackendError {
    BackendError::Internal(format!("command log references a missing {what}"))
}

fn region(log: &CommandLog, region: LoggedRegion) -> Result<NativeTextureRegion, BackendError> {
    let texture = log.texture(region.texture).ok_or_else(|| missing("texture"))?;
    Ok(NativeTextureRegion {
        texture: texture.raw_handle(),
        mip_level: region.mip_level,
        array_layer: region.array_layer,
        origin: region.origin,
    })
}

/// Apply the reflected bindings of set `index` to the resources of `set`.
fn bind_set(ctx: &mut dyn GlContext, bindings: &GlBindings, index: usize, set: &ResourceSet, offsets: &[u32]) {
    let Some(table) = bindings.sets.get(index) else {
        return;
    };
    let mut offsets = offsets.iter();

    for (element_index, element) in set.layout().elements().iter().enumerate() {
        let dynamic_offset = if element.is_dynamic() {
            offsets.next().copied().unwrap_or(0)
        } else {
            0
        };
        let Some(binding) = set.binding(element_index, dynamic_offset) else {
            continue;
        };

        if let Some(uniform) = table.uniforms.get(&element_index) {
            if let NativeBinding::Buffer { buffer, offset, size } = binding {
                let size = match uniform.block_size {
                    0 => size,
                    block => size.min(block as u64),
                };
                ctx.bind_uniform_buffer(uniform.binding, buffer, offset, size);
            }
        } else if let Some(texture) = table.textures.get(&element_index) {
            if let NativeBinding::Texture { texture: raw, view } = binding {
                match *texture {
                    GlTextureBinding::Sampled { unit } => ctx.bind_texture_unit(unit, raw, view),
                    GlTextureBinding::Image { unit } => ctx.bind_image_unit(unit, raw, view),
                }
            }
        } else if let Some(units) = table.samplers.get(&element_index) {
            if let NativeBinding::Sampler(sampler) = binding {
                for unit in units {
                    ctx.bind_sampler_unit(*unit, sampler);
                }
            }
        } else if let Some(storage) = table.storage.get(&element_index) {
            if let NativeBinding::Buffer { buffer, offset, size } = binding {
                ctx.bind_storage_buffer(*storage, buffer, offset, size);
            }
        }
    }
}
