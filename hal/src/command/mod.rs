//! Command recording.
//!
//! A [`CommandList`] records work between [`begin`](CommandList::begin) and
//! [`end`](CommandList::end); nothing takes effect until the list is handed
//! to [`GraphicsDevice::submit_commands`](crate::GraphicsDevice::submit_commands).
//!
//! The same API is backed by one of two encoders:
//!
//! - [`NativeEncoder`] (Vulkan, Metal, Direct3D 11) translates each
//!   operation into a native command buffer call.
//! - [`DeferredEncoder`] (OpenGL) appends small tagged entries to a
//!   [`CommandLog`] that the device worker thread replays in order.
//!
//! Validation lives here so both encoders only ever see well-formed
//! commands.

mod entry;
mod native;
mod replay;

pub(crate) use entry::{CommandLog, DeferredEncoder, LogPool};
pub(crate) use native::NativeEncoder;
pub(crate) use replay::replay;

use std::collections::HashSet;
use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::error::{HalError, HalResult, UsageError};
use crate::native::NativeCommandBuffer;
use crate::resources::{
    BindableResource, Buffer, Framebuffer, Pipeline, RealizedPipeline, ResourceCore,
    ResourceSet, Texture,
};
use crate::types::{
    BufferUsage, Color, Extent3d, IndexFormat, ResourceId, ResourceKind, ScissorRect, Viewport,
};

/// Finished recording handed to the device.
pub(crate) enum Submission {
    Native(Box<dyn NativeCommandBuffer>),
    Deferred(CommandLog),
}

/// Backend half of a command list.
pub(crate) trait CommandEncoder: Send {
    /// Start a fresh recording.
    fn begin(&mut self) -> HalResult<()>;
    fn set_pipeline(&mut self, pipeline: &Arc<Pipeline>, realized: &RealizedPipeline);
    fn set_resource_set(
        &mut self,
        index: u32,
        set: &Arc<ResourceSet>,
        dynamic_offsets: &[u32],
        realized: &RealizedPipeline,
    );
    fn set_framebuffer(&mut self, framebuffer: &Arc<Framebuffer>);
    fn set_vertex_buffer(&mut self, index: u32, buffer: &Arc<Buffer>, offset: u64);
    fn set_index_buffer(&mut self, buffer: &Arc<Buffer>, format: IndexFormat, offset: u64);
    fn set_viewport(&mut self, index: u32, viewport: Viewport);
    fn set_scissor(&mut self, index: u32, rect: ScissorRect);
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
    fn update_buffer(&mut self, buffer: &Arc<Buffer>, offset: u64, data: &[u8]);
    fn copy_buffer(
        &mut self,
        source: &Arc<Buffer>,
        source_offset: u64,
        destination: &Arc<Buffer>,
        destination_offset: u64,
        size: u64,
    );
    fn copy_texture(&mut self, source: &TextureLocation, destination: &TextureLocation, extent: Extent3d);
    fn resolve_texture(&mut self, source: &Arc<Texture>, destination: &Arc<Texture>);
    fn memory_barrier(&mut self);
    fn push_debug_group(&mut self, label: &str);
    fn pop_debug_group(&mut self);
    fn insert_debug_marker(&mut self, label: &str);
    /// Close the recording.
    fn end(&mut self) -> HalResult<()>;
    fn take_submission(&mut self) -> Option<Submission>;
    /// Discard whatever has been recorded.
    fn reset(&mut self);
}

/// A texture subresource and texel origin used by copies.
#[derive(Debug, Clone)]
pub struct TextureLocation {
    pub texture: Arc<Texture>,
    pub mip_level: u32,
    pub array_layer: u32,
    pub origin: [u32; 3],
}

impl TextureLocation {
    /// Mip 0, layer 0, origin zero.
    pub fn new(texture: Arc<Texture>) -> Self {
        Self {
            texture,
            mip_level: 0,
            array_layer: 0,
            origin: [0; 3],
        }
    }

    pub fn with_subresource(mut self, mip_level: u32, array_layer: u32) -> Self {
        self.mip_level = mip_level;
        self.array_layer = array_layer;
        self
    }

    pub fn with_origin(mut self, x: u32, y: u32, z: u32) -> Self {
        self.origin = [x, y, z];
        self
    }
}

/// Recording lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    /// Created or submitted; ready for [`CommandList::begin`].
    Initial,
    Recording,
    /// Closed and ready for submission.
    Ended,
    Submitted,
}

/// Resources referenced by an open recording.
///
/// Every tracked resource has one pending reference on its core, which keeps
/// the disposal queue from destroying it until the recording is submitted
/// (the core then records the submission value) or discarded.
#[derive(Default)]
struct ResourceTracker {
    cores: Vec<Arc<ResourceCore>>,
    seen: HashSet<ResourceId>,
}

impl ResourceTracker {
    fn track(&mut self, core: &Arc<ResourceCore>) -> HalResult<()> {
        core.ensure_live()?;
        if self.seen.insert(core.id()) {
            core.add_pending();
            self.cores.push(Arc::clone(core));
        }
        Ok(())
    }

    fn track_set(&mut self, set: &ResourceSet) -> HalResult<()> {
        self.track(set.core())?;
        for resource in set.resources() {
            self.track(resource.core())?;
            if let BindableResource::TextureView(view) = resource {
                self.track(view.texture().core())?;
            }
        }
        Ok(())
    }

    fn track_framebuffer(&mut self, framebuffer: &Framebuffer) -> HalResult<()> {
        self.track(framebuffer.core())?;
        for texture in framebuffer.textures() {
            self.track(texture.core())?;
        }
        Ok(())
    }

    fn mark_submitted(&mut self, value: u64) {
        for core in self.cores.drain(..) {
            core.record_use(value);
            core.release_pending();
        }
        self.seen.clear();
    }

    fn release(&mut self) {
        for core in self.cores.drain(..) {
            core.release_pending();
        }
        self.seen.clear();
    }

    fn len(&self) -> usize {
        self.cores.len()
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        self.release();
    }
}

struct BoundSet {
    set: Arc<ResourceSet>,
    offsets: Vec<u32>,
    dirty: bool,
}

#[derive(Default)]
struct BindState {
    pipeline: Option<Arc<Pipeline>>,
    sets: Vec<Option<BoundSet>>,
    framebuffer: Option<Arc<Framebuffer>>,
    index_buffer: Option<IndexFormat>,
}

/// Records GPU work for later submission.
///
/// Not safe for concurrent recording; wrap in a lock to share.
pub struct CommandList {
    pub(crate) core: Arc<ResourceCore>,
    pub(crate) device: Arc<GraphicsDevice>,
    state: CommandListState,
    encoder: Box<dyn CommandEncoder>,
    bind: BindState,
    tracker: ResourceTracker,
}

impl CommandList {
    pub(crate) fn new(device: Arc<GraphicsDevice>, encoder: Box<dyn CommandEncoder>, label: Option<String>) -> Self {
        Self {
            core: Arc::new(ResourceCore::new("CommandList", label)),
            device,
            state: CommandListState::Initial,
            encoder,
            bind: BindState::default(),
            tracker: ResourceTracker::default(),
        }
    }

    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// Number of distinct resources the open recording references.
    pub fn tracked_resources(&self) -> usize {
        self.tracker.len()
    }

    fn ensure_recording(&self, operation: &str) -> HalResult<()> {
        self.core.ensure_live()?;
        if self.state != CommandListState::Recording {
            return Err(HalError::invalid_state(format!(
                "{operation} requires a recording command list (state {:?})",
                self.state
            )));
        }
        Ok(())
    }

    /// Open a new recording, discarding all bound state.
    pub fn begin(&mut self) -> HalResult<()> {
        self.core.ensure_live()?;
        if self.state == CommandListState::Recording {
            return Err(HalError::invalid_state("begin called on a command list that is already recording"));
        }
        self.tracker.release();
        self.bind = BindState::default();
        self.encoder.reset();
        self.encoder.begin()?;
        self.state = CommandListState::Recording;
        Ok(())
    }

    /// Close the recording.
    pub fn end(&mut self) -> HalResult<()> {
        self.ensure_recording("end")?;
        self.encoder.end()?;
        self.state = CommandListState::Ended;
        Ok(())
    }

    /// Bind a pipeline, realizing it on first use.
    ///
    /// Sets bound for the previous pipeline stay bound where the new
    /// pipeline's layout is compatible.
    pub fn set_pipeline(&mut self, pipeline: &Arc<Pipeline>) -> HalResult<()> {
        self.ensure_recording("set_pipeline")?;
        self.tracker.track(pipeline.core())?;
        let realized = pipeline.realized()?;
        self.encoder.set_pipeline(pipeline, realized);

        let layouts = pipeline.resource_layouts();
        self.bind.sets.resize_with(layouts.len(), || None);
        for (slot, layout) in self.bind.sets.iter_mut().zip(layouts) {
            let compatible = slot.as_ref().is_some_and(|bound| layout.is_compatible(bound.set.layout()));
            if !compatible {
                *slot = None;
            } else if let Some(bound) = slot.as_mut() {
                bound.dirty = true;
            }
        }
        self.bind.pipeline = Some(Arc::clone(pipeline));
        Ok(())
    }

    /// Bind a resource set at `index` of the current pipeline.
    ///
    /// `dynamic_offsets` supplies one byte offset per dynamic element of the
    /// set's layout, in element order.
    pub fn set_resource_set(
        &mut self,
        index: u32,
        set: &Arc<ResourceSet>,
        dynamic_offsets: &[u32],
    ) -> HalResult<()> {
        self.ensure_recording("set_resource_set")?;
        let pipeline = self
            .bind
            .pipeline
            .as_ref()
            .ok_or_else(|| HalError::invalid_state("set_resource_set requires a bound pipeline"))?;

        let layouts = pipeline.resource_layouts();
        let layout = layouts.get(index as usize).ok_or(UsageError::SetIndexOutOfRange {
            index,
            count: layouts.len() as u32,
        })?;
        if !layout.is_compatible(set.layout()) {
            return Err(UsageError::IncompatibleLayout { set: index }.into());
        }

        let expected = set.layout().dynamic_count();
        if dynamic_offsets.len() != expected {
            return Err(UsageError::ArgumentCount {
                what: "dynamic offsets",
                expected,
                found: dynamic_offsets.len(),
            }
            .into());
        }
        self.validate_dynamic_offsets(set, dynamic_offsets)?;
        self.tracker.track_set(set)?;

        self.bind.sets[index as usize] = Some(BoundSet {
            set: Arc::clone(set),
            offsets: dynamic_offsets.to_vec(),
            dirty: true,
        });
        Ok(())
    }

    fn validate_dynamic_offsets(&self, set: &ResourceSet, offsets: &[u32]) -> HalResult<()> {
        let limits = self.device.limits();
        let dynamic = set
            .layout()
            .elements()
            .iter()
            .zip(set.resources())
            .filter(|(element, _)| element.is_dynamic());

        for ((element, resource), offset) in dynamic.zip(offsets) {
            let alignment = match element.kind {
                ResourceKind::UniformBuffer => limits.uniform_offset_alignment,
                _ => limits.structured_offset_alignment,
            };
            if *offset % alignment != 0 {
                return Err(HalError::invalid_parameter(format!(
                    "dynamic offset {offset} of `{}` is not a multiple of {alignment}",
                    element.name
                )));
            }
            if let Some((buffer, base, size)) = resource.buffer_window() {
                if base + *offset as u64 + size > buffer.size() {
                    return Err(HalError::invalid_parameter(format!(
                        "dynamic offset {offset} moves `{}` past the end of its buffer",
                        element.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Bind render targets. Also resets the viewport and scissor to the
    /// full target.
    pub fn set_framebuffer(&mut self, framebuffer: &Arc<Framebuffer>) -> HalResult<()> {
        self.ensure_recording("set_framebuffer")?;
        self.tracker.track_framebuffer(framebuffer)?;
        self.encoder.set_framebuffer(framebuffer);
        let (width, height) = (framebuffer.width(), framebuffer.height());
        for index in 0..framebuffer.color_target_count().max(1) as u32 {
            self.encoder.set_viewport(index, Viewport::full(width, height));
            self.encoder.set_scissor(index, ScissorRect::new(0, 0, width, height));
        }
        self.bind.framebuffer = Some(Arc::clone(framebuffer));
        Ok(())
    }

    pub fn set_vertex_buffer(&mut self, index: u32, buffer: &Arc<Buffer>, offset: u64) -> HalResult<()> {
        self.ensure_recording("set_vertex_buffer")?;
        if !buffer.usage().contains(BufferUsage::VERTEX) {
            return Err(HalError::invalid_parameter(format!(
                "{} was not created with VERTEX usage",
                buffer.core().describe()
            )));
        }
        self.tracker.track(buffer.core())?;
        self.encoder.set_vertex_buffer(index, buffer, offset);
        Ok(())
    }

    pub fn set_index_buffer(&mut self, buffer: &Arc<Buffer>, format: IndexFormat, offset: u64) -> HalResult<()> {
        self.ensure_recording("set_index_buffer")?;
        if !buffer.usage().contains(BufferUsage::INDEX) {
            return Err(HalError::invalid_parameter(format!(
                "{} was not created with INDEX usage",
                buffer.core().describe()
            )));
        }
        self.tracker.track(buffer.core())?;
        self.encoder.set_index_buffer(buffer, format, offset);
        self.bind.index_buffer = Some(format);
        Ok(())
    }

    pub fn set_viewport(&mut self, index: u32, viewport: Viewport) -> HalResult<()> {
        self.ensure_recording("set_viewport")?;
        self.encoder.set_viewport(index, viewport);
        Ok(())
    }

    /// Set the full-target viewport on every color target.
    pub fn set_full_viewports(&mut self) -> HalResult<()> {
        self.ensure_recording("set_full_viewports")?;
        let framebuffer = self.bound_framebuffer("set_full_viewports")?;
        let viewport = Viewport::full(framebuffer.width(), framebuffer.height());
        let count = framebuffer.color_target_count().max(1) as u32;
        for index in 0..count {
            self.encoder.set_viewport(index, viewport);
        }
        Ok(())
    }

    pub fn set_scissor(&mut self, index: u32, rect: ScissorRect) -> HalResult<()> {
        self.ensure_recording("set_scissor")?;
        self.encoder.set_scissor(index, rect);
        Ok(())
    }

    fn bound_framebuffer(&self, operation: &str) -> HalResult<Arc<Framebuffer>> {
        self.bind
            .framebuffer
            .clone()
            .ok_or_else(|| HalError::invalid_state(format!("{operation} requires a bound framebuffer")))
    }

    /// Clear color target `index` of the bound framebuffer.
    pub fn clear_color_target(&mut self, index: u32, color: Color) -> HalResult<()> {
        self.ensure_recording("clear_color_target")?;
        let framebuffer = self.bound_framebuffer("clear_color_target")?;
        if index as usize >= framebuffer.color_target_count() {
            return Err(HalError::invalid_parameter(format!(
                "color target {index} out of range ({} targets)",
                framebuffer.color_target_count()
            )));
        }
        self.encoder.clear_color(index, color);
        Ok(())
    }

    /// Clear the depth target of the bound framebuffer.
    pub fn clear_depth_stencil(&mut self, depth: f32, stencil: u8) -> HalResult<()> {
        self.ensure_recording("clear_depth_stencil")?;
        let framebuffer = self.bound_framebuffer("clear_depth_stencil")?;
        if framebuffer.depth_target().is_none() {
            return Err(HalError::invalid_state("bound framebuffer has no depth target"));
        }
        self.encoder.clear_depth(depth, stencil);
        Ok(())
    }

    /// Check the pipeline kind and emit any resource sets bound since the
    /// last draw or dispatch.
    fn flush_bindings(&mut self, compute: bool, operation: &str) -> HalResult<()> {
        let pipeline = self
            .bind
            .pipeline
            .clone()
            .ok_or_else(|| HalError::invalid_state(format!("{operation} requires a bound pipeline")))?;
        if pipeline.is_compute() != compute {
            let expected = if compute { "compute" } else { "graphics" };
            return Err(HalError::invalid_state(format!("{operation} requires a {expected} pipeline")));
        }
        if !compute && self.bind.framebuffer.is_none() {
            return Err(HalError::invalid_state(format!("{operation} requires a bound framebuffer")));
        }

        let realized = pipeline.realized()?;
        for (index, slot) in self.bind.sets.iter_mut().enumerate() {
            let bound = slot.as_mut().ok_or_else(|| {
                HalError::invalid_state(format!("{operation}: resource set {index} is not bound"))
            })?;
            if bound.dirty {
                self.encoder
                    .set_resource_set(index as u32, &bound.set, &bound.offsets, realized);
                bound.dirty = false;
            }
        }
        Ok(())
    }

    pub fn draw(&mut self, vertex_count: u32) -> HalResult<()> {
        self.draw_instanced(vertex_count, 1, 0, 0)
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> HalResult<()> {
        self.ensure_recording("draw")?;
        self.flush_bindings(false, "draw")?;
        self.encoder
            .draw(vertex_count, instance_count, first_vertex, first_instance);
        Ok(())
    }

    pub fn draw_indexed(&mut self, index_count: u32) -> HalResult<()> {
        self.draw_indexed_instanced(index_count, 1, 0, 0, 0)
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> HalResult<()> {
        self.ensure_recording("draw_indexed")?;
        if self.bind.index_buffer.is_none() {
            return Err(HalError::invalid_state("draw_indexed requires a bound index buffer"));
        }
        self.flush_bindings(false, "draw_indexed")?;
        self.encoder
            .draw_indexed(index_count, instance_count, first_index, vertex_offset, first_instance);
        Ok(())
    }

    /// Dispatch `x * y * z` workgroups.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> HalResult<()> {
        self.ensure_recording("dispatch")?;
        self.flush_bindings(true, "dispatch")?;
        self.encoder.dispatch(x, y, z);
        Ok(())
    }

    /// Write `data` into `buffer` at `offset` when the list executes.
    pub fn update_buffer(&mut self, buffer: &Arc<Buffer>, offset: u64, data: &[u8]) -> HalResult<()> {
        self.ensure_recording("update_buffer")?;
        check_buffer_range(buffer, offset, data.len() as u64)?;
        self.tracker.track(buffer.core())?;
        self.encoder.update_buffer(buffer, offset, data);
        Ok(())
    }

    /// [`update_buffer`](Self::update_buffer) with a plain-old-data slice.
    pub fn update_buffer_with<T: bytemuck::Pod>(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
        data: &[T],
    ) -> HalResult<()> {
        self.update_buffer(buffer, offset, bytemuck::cast_slice(data))
    }

    pub fn copy_buffer(
        &mut self,
        source: &Arc<Buffer>,
        source_offset: u64,
        destination: &Arc<Buffer>,
        destination_offset: u64,
        size: u64,
    ) -> HalResult<()> {
        self.ensure_recording("copy_buffer")?;
        check_buffer_range(source, source_offset, size)?;
        check_buffer_range(destination, destination_offset, size)?;
        self.tracker.track(source.core())?;
        self.tracker.track(destination.core())?;
        self.encoder
            .copy_buffer(source, source_offset, destination, destination_offset, size);
        Ok(())
    }

    pub fn copy_texture(
        &mut self,
        source: &TextureLocation,
        destination: &TextureLocation,
        extent: Extent3d,
    ) -> HalResult<()> {
        self.ensure_recording("copy_texture")?;
        check_texture_region(source, extent)?;
        check_texture_region(destination, extent)?;
        if source.texture.format().block_size() != destination.texture.format().block_size() {
            return Err(HalError::invalid_parameter(format!(
                "cannot copy between {:?} and {:?}",
                source.texture.format(),
                destination.texture.format()
            )));
        }
        self.tracker.track(source.texture.core())?;
        self.tracker.track(destination.texture.core())?;
        self.encoder.copy_texture(source, destination, extent);
        Ok(())
    }

    /// Resolve a multisampled texture into a single-sampled one.
    pub fn resolve_texture(&mut self, source: &Arc<Texture>, destination: &Arc<Texture>) -> HalResult<()> {
        self.ensure_recording("resolve_texture")?;
        let (src, dst) = (source.description(), destination.description());
        if src.sample_count <= 1 || dst.sample_count != 1 {
            return Err(HalError::invalid_parameter(
                "resolve requires a multisampled source and a single-sampled destination",
            ));
        }
        if src.size != dst.size || src.format != dst.format {
            return Err(HalError::invalid_parameter("resolve requires matching size and format"));
        }
        self.tracker.track(source.core())?;
        self.tracker.track(destination.core())?;
        self.encoder.resolve_texture(source, destination);
        Ok(())
    }

    /// Make writes of earlier commands visible to later ones.
    pub fn memory_barrier(&mut self) -> HalResult<()> {
        self.ensure_recording("memory_barrier")?;
        self.encoder.memory_barrier();
        Ok(())
    }

    pub fn push_debug_group(&mut self, label: &str) -> HalResult<()> {
        self.ensure_recording("push_debug_group")?;
        if self.device.features().debug_markers {
            self.encoder.push_debug_group(label);
        }
        Ok(())
    }

    pub fn pop_debug_group(&mut self) -> HalResult<()> {
        self.ensure_recording("pop_debug_group")?;
        if self.device.features().debug_markers {
            self.encoder.pop_debug_group();
        }
        Ok(())
    }

    pub fn insert_debug_marker(&mut self, label: &str) -> HalResult<()> {
        self.ensure_recording("insert_debug_marker")?;
        if self.device.features().debug_markers {
            self.encoder.insert_debug_marker(label);
        }
        Ok(())
    }

    /// Take the closed recording. Leaves the list in `Submitted`.
    pub(crate) fn take_submission(&mut self) -> HalResult<Submission> {
        self.core.ensure_live()?;
        if self.state != CommandListState::Ended {
            return Err(HalError::invalid_state(format!(
                "only ended command lists can be submitted (state {:?})",
                self.state
            )));
        }
        let submission = self
            .encoder
            .take_submission()
            .ok_or_else(|| HalError::invalid_state("command list has no recorded commands"))?;
        self.state = CommandListState::Submitted;
        self.bind = BindState::default();
        Ok(submission)
    }

    /// Stamp every tracked resource with the submission value.
    pub(crate) fn mark_submitted(&mut self, value: u64) {
        self.tracker.mark_submitted(value);
    }

    /// Release tracked resources of a submission that never reached the
    /// backend.
    pub(crate) fn abandon(&mut self) {
        self.tracker.release();
    }

    pub fn id(&self) -> ResourceId {
        self.core.id()
    }

    pub fn name(&self) -> Option<String> {
        self.core.name()
    }

    pub fn set_name(&self, name: &str) {
        self.core.set_name(name);
    }

    /// Discard the list. Later operations fail with
    /// [`UsageError::ResourceDisposed`].
    pub fn dispose(&mut self) {
        if self.core.begin_disposal() {
            self.tracker.release();
            self.encoder.reset();
            self.core.mark_destroyed();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }
}

impl std::fmt::Debug for CommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("id", &self.core.id())
            .field("state", &self.state)
            .field("tracked", &self.tracker.len())
            .finish()
    }
}

fn check_buffer_range(buffer: &Buffer, offset: u64, size: u64) -> HalResult<()> {
    if offset.checked_add(size).map_or(true, |end| end > buffer.size()) {
        return Err(HalError::invalid_parameter(format!(
            "range {offset}+{size} exceeds {} of {} bytes",
            buffer.core().describe(),
            buffer.size()
        )));
    }
    Ok(())
}

fn check_texture_region(location: &TextureLocation, extent: Extent3d) -> HalResult<()> {
    let desc = location.texture.description();
    if location.mip_level >= desc.mip_levels || location.array_layer >= desc.array_layers {
        return Err(HalError::invalid_parameter(format!(
            "subresource (mip {}, layer {}) out of range for {}",
            location.mip_level,
            location.array_layer,
            location.texture.core().describe()
        )));
    }
    let mip = desc.mip_extent(location.mip_level);
    let [x, y, z] = location.origin;
    let fits = |origin: u32, len: u32, limit: u32| origin.checked_add(len).is_some_and(|end| end <= limit);
    if !fits(x, extent.width, mip.width) || !fits(y, extent.height, mip.height) || !fits(z, extent.depth, mip.depth) {
        return Err(HalError::invalid_parameter(format!(
            "region {:?}+{extent:?} exceeds mip {} extent {mip:?}",
            location.origin, location.mip_level
        )));
    }
    Ok(())
}

static_assertions::assert_impl_all!(CommandList: Send);
