//! Soft device for the explicit backends.
//!
//! One implementation serves Vulkan, Metal and Direct3D 11; they differ
//! only in how bindings arrive. Vulkan binds whole descriptor sets, the
//! other two bind individual resources to argument or register slots.
//! Vulkan additionally validates image layout transitions.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use super::executor;
use super::kernel::{Bindings, Bound, LinkedProgram};
use super::memory::{object_id, SoftBuffer, SoftObject, SoftTexture, SoftView, Store};
use super::raster::{self, DrawCall, RenderState};
use super::surface::SoftSwapchain;
use super::SoftShared;
use crate::config::BackendKind;
use crate::error::{BackendError, HalError};
use crate::native::{
    NativeAttachment, NativeBinding, NativeBindingDecl, NativeCommandBuffer, NativeDescriptorWrite, NativeDevice,
    NativeRenderTargets, NativeSlot, NativeSurface, NativeSwapchainDesc, NativeTextureRegion, NativeViewRange,
    RawBuffer, RawDescriptorSet, RawObject, RawPipeline, RawSampler, RawSwapchain, RawTexture, RawTextureView,
    SubmitCallback,
};
use crate::types::{
    BufferDescription, Color, Extent3d, Features, ImageLayout, IndexFormat, Limits, PipelineDescription,
    SamplerDescription, ScissorRect, TextureDescription, TextureUsage, Viewport,
};

/// Linked program plus the slot every interface name was declared at.
pub(crate) struct SoftPipeline {
    pub program: LinkedProgram,
    pub slots: HashMap<String, NativeSlot>,
}

#[derive(Debug)]
enum Command {
    BindPipeline(u64),
    BindDescriptorSet {
        index: u32,
        set: u64,
        offsets: Vec<u32>,
    },
    BindResource {
        slot: NativeSlot,
        resource: NativeBinding,
    },
    BindVertexBuffer {
        index: u32,
        buffer: u64,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: u64,
        format: IndexFormat,
        offset: u64,
    },
    BeginRendering(NativeRenderTargets),
    EndRendering,
    ClearColor(NativeAttachment, Color),
    ClearDepth(NativeAttachment, f32),
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    Draw(DrawCall),
    Dispatch([u32; 3]),
    UpdateBuffer {
        buffer: u64,
        offset: u64,
        data: Vec<u8>,
    },
    UpdateTexture {
        region: NativeTextureRegion,
        extent: Extent3d,
        data: Vec<u8>,
    },
    CopyBuffer {
        source: u64,
        source_offset: u64,
        destination: u64,
        destination_offset: u64,
        size: u64,
    },
    CopyTexture {
        source: NativeTextureRegion,
        destination: NativeTextureRegion,
        extent: Extent3d,
    },
    Resolve {
        source: NativeAttachment,
        destination: NativeAttachment,
    },
    Transition {
        texture: u64,
        from: ImageLayout,
        to: ImageLayout,
    },
    Barrier,
    PushDebugGroup(String),
    PopDebugGroup,
    DebugMarker(String),
}

/// Recorded commands, executed at submission.
#[derive(Debug, Default)]
pub(crate) struct SoftCommandBuffer {
    commands: Vec<Command>,
    finished: bool,
}

impl SoftCommandBuffer {
    fn push(&mut self, command: Command) {
        if self.finished {
            log::warn!("soft: command {command:?} recorded after finish; ignored");
            return;
        }
        self.commands.push(command);
    }
}

impl NativeCommandBuffer for SoftCommandBuffer {
    fn bind_pipeline(&mut self, pipeline: RawPipeline) {
        self.push(Command::BindPipeline(pipeline.0));
    }

    fn bind_descriptor_set(&mut self, index: u32, set: RawDescriptorSet, dynamic_offsets: &[u32]) {
        self.push(Command::BindDescriptorSet {
            index,
            set: set.0,
            offsets: dynamic_offsets.to_vec(),
        });
    }

    fn bind_resource(&mut self, slot: NativeSlot, resource: NativeBinding) {
        self.push(Command::BindResource { slot, resource });
    }

    fn bind_vertex_buffer(&mut self, index: u32, buffer: RawBuffer, offset: u64) {
        self.push(Command::BindVertexBuffer {
            index,
            buffer: buffer.0,
            offset,
        });
    }

    fn bind_index_buffer(&mut self, buffer: RawBuffer, format: IndexFormat, offset: u64) {
        self.push(Command::BindIndexBuffer {
            buffer: buffer.0,
            format,
            offset,
        });
    }

    fn begin_rendering(&mut self, targets: &NativeRenderTargets) {
        self.push(Command::BeginRendering(targets.clone()));
    }

    fn end_rendering(&mut self) {
        self.push(Command::EndRendering);
    }

    fn clear_color(&mut self, attachment: NativeAttachment, color: Color) {
        self.push(Command::ClearColor(attachment, color));
    }

    fn clear_depth(&mut self, attachment: NativeAttachment, depth: f32, _stencil: u8) {
        self.push(Command::ClearDepth(attachment, depth));
    }

    fn set_viewport(&mut self, index: u32, viewport: Viewport) {
        // Single viewport.
        if index == 0 {
            self.push(Command::SetViewport(viewport));
        }
    }

    fn set_scissor(&mut self, index: u32, rect: ScissorRect) {
        if index == 0 {
            self.push(Command::SetScissor(rect));
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.push(Command::Draw(DrawCall {
            count: vertex_count,
            instance_count,
            first: first_vertex,
            vertex_offset: 0,
            first_instance,
            indexed: false,
        }));
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.push(Command::Draw(DrawCall {
            count: index_count,
            instance_count,
            first: first_index,
            vertex_offset,
            first_instance,
            indexed: true,
        }));
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push(Command::Dispatch([x, y, z]));
    }

    fn update_buffer(&mut self, buffer: RawBuffer, offset: u64, data: &[u8]) {
        self.push(Command::UpdateBuffer {
            buffer: buffer.0,
            offset,
            data: data.to_vec(),
        });
    }

    fn update_texture(&mut self, region: NativeTextureRegion, extent: Extent3d, data: &[u8]) {
        self.push(Command::UpdateTexture {
            region,
            extent,
            data: data.to_vec(),
        });
    }

    fn copy_buffer(
        &mut self,
        source: RawBuffer,
        source_offset: u64,
        destination: RawBuffer,
        destination_offset: u64,
        size: u64,
    ) {
        self.push(Command::CopyBuffer {
            source: source.0,
            source_offset,
            destination: destination.0,
            destination_offset,
            size,
        });
    }

    fn copy_texture(&mut self, source: NativeTextureRegion, destination: NativeTextureRegion, extent: Extent3d) {
        self.push(Command::CopyTexture {
            source,
            destination,
            extent,
        });
    }

    fn resolve_texture(&mut self, source: NativeAttachment, destination: NativeAttachment) {
        self.push(Command::Resolve { source, destination });
    }

    fn transition_texture(&mut self, texture: RawTexture, from: ImageLayout, to: ImageLayout) {
        self.push(Command::Transition {
            texture: texture.0,
            from,
            to,
        });
    }

    fn memory_barrier(&mut self) {
        self.push(Command::Barrier);
    }

    fn push_debug_group(&mut self, label: &str) {
        self.push(Command::PushDebugGroup(label.to_string()));
    }

    fn pop_debug_group(&mut self) {
        self.push(Command::PopDebugGroup);
    }

    fn insert_debug_marker(&mut self, label: &str) {
        self.push(Command::DebugMarker(label.to_string()));
    }

    fn finish(&mut self) {
        self.finished = true;
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Binding state accumulated while executing one command buffer.
#[derive(Default)]
struct ExecutionState {
    pipeline: Option<u64>,
    sets: HashMap<u32, (u64, Vec<u32>)>,
    slots: HashMap<NativeSlot, NativeBinding>,
    vertex_buffers: HashMap<u32, (u64, u64)>,
    index_buffer: Option<(u64, IndexFormat, u64)>,
    targets: Option<NativeRenderTargets>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    debug_groups: Vec<String>,
}

pub(crate) fn bound(store: &Store, binding: NativeBinding) -> Result<Bound, BackendError> {
    Ok(match binding {
        NativeBinding::Buffer { buffer, offset, size } => Bound::Buffer {
            buffer: buffer.0,
            offset,
            size,
        },
        NativeBinding::Texture { texture, view } => Bound::Texture {
            texture: texture.0,
            view: view.map(|view| view.0),
            sampler: None,
        },
        NativeBinding::Sampler(sampler) => Bound::Sampler(store.sampler(sampler.0)?.clone()),
    })
}

/// Resolve every interface name of the bound pipeline to a resource.
fn resolve(store: &Store, pipeline: &SoftPipeline, state: &ExecutionState) -> Result<Bindings, BackendError> {
    let mut bindings = Bindings::new();
    for (name, slot) in &pipeline.slots {
        let resource = match *slot {
            NativeSlot::Descriptor { set, binding } => {
                let Some((raw, offsets)) = state.sets.get(&set) else {
                    continue;
                };
                let writes = store.descriptor_set(*raw)?;
                let Some(write) = writes.iter().find(|write| write.binding == binding) else {
                    continue;
                };
                let mut resource = write.resource;
                if write.dynamic {
                    // Dynamic offsets are consumed in binding order.
                    let position = writes
                        .iter()
                        .filter(|other| other.dynamic && other.binding < binding)
                        .count();
                    if let (NativeBinding::Buffer { offset, .. }, Some(dynamic)) = (&mut resource, offsets.get(position)) {
                        *offset += *dynamic as u64;
                    }
                }
                resource
            }
            other => match state.slots.get(&other) {
                Some(resource) => *resource,
                None => continue,
            },
        };
        bindings.insert(name.clone(), bound(store, resource)?);
    }
    Ok(bindings)
}

fn bound_program(store: &Store, state: &ExecutionState) -> Result<(LinkedProgram, Bindings), BackendError> {
    let id = state
        .pipeline
        .ok_or_else(|| BackendError::Internal("no pipeline bound".into()))?;
    let pipeline = store.pipeline(id)?;
    Ok((pipeline.program.clone(), resolve(store, pipeline, state)?))
}

fn execute(store: &mut Store, kind: BackendKind, commands: &[Command]) -> Result<(), BackendError> {
    crate::profile_scope!("soft_execute");

    let mut state = ExecutionState::default();
    for command in commands {
        match command {
            Command::BindPipeline(pipeline) => state.pipeline = Some(*pipeline),
            Command::BindDescriptorSet { index, set, offsets } => {
                state.sets.insert(*index, (*set, offsets.clone()));
            }
            Command::BindResource { slot, resource } => {
                state.slots.insert(*slot, *resource);
            }
            Command::BindVertexBuffer { index, buffer, offset } => {
                state.vertex_buffers.insert(*index, (*buffer, *offset));
            }
            Command::BindIndexBuffer { buffer, format, offset } => {
                state.index_buffer = Some((*buffer, *format, *offset));
            }
            Command::BeginRendering(targets) => state.targets = Some(targets.clone()),
            Command::EndRendering => state.targets = None,
            Command::ClearColor(attachment, color) => executor::clear_color(store, *attachment, *color)?,
            Command::ClearDepth(attachment, depth) => executor::clear_depth(store, *attachment, *depth)?,
            Command::SetViewport(viewport) => state.viewport = Some(*viewport),
            Command::SetScissor(rect) => state.scissor = Some(*rect),
            Command::Draw(call) => {
                let targets = state
                    .targets
                    .as_ref()
                    .ok_or_else(|| BackendError::Internal("draw outside a render pass".into()))?;
                let (program, bindings) = bound_program(store, &state)?;
                let render = RenderState {
                    targets,
                    viewport: state.viewport,
                    scissor: state.scissor,
                    vertex_buffers: &state.vertex_buffers,
                    index_buffer: state.index_buffer,
                };
                raster::draw(store, &program, &bindings, &render, call)?;
            }
            Command::Dispatch(groups) => {
                let (program, bindings) = bound_program(store, &state)?;
                executor::dispatch(store, &program, &bindings, *groups)?;
            }
            Command::UpdateBuffer { buffer, offset, data } => executor::update_buffer(store, *buffer, *offset, data)?,
            Command::UpdateTexture { region, extent, data } => {
                executor::update_texture(store, *region, *extent, data)?
            }
            Command::CopyBuffer {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            } => executor::copy_buffer(store, *source, *source_offset, *destination, *destination_offset, *size)?,
            Command::CopyTexture {
                source,
                destination,
                extent,
            } => executor::copy_texture(store, *source, *destination, *extent)?,
            Command::Resolve { source, destination } => executor::resolve(store, *source, *destination)?,
            Command::Transition { texture, from, to } => {
                let target = store.texture_mut(*texture)?;
                if kind.tracks_image_layouts() && *from != ImageLayout::Undefined && target.layout != *from {
                    return Err(BackendError::Internal(format!(
                        "texture #{texture} transitioned from {from:?} but is in {:?}",
                        target.layout
                    )));
                }
                target.layout = *to;
            }
            Command::Barrier => {}
            Command::PushDebugGroup(label) => state.debug_groups.push(label.clone()),
            Command::PopDebugGroup => {
                state.debug_groups.pop();
            }
            Command::DebugMarker(label) => {
                log::trace!("soft {}: marker {label:?} in {:?}", kind.name(), state.debug_groups);
            }
        }
    }
    Ok(())
}

// ============================================================================
// Device
// ============================================================================

/// [`NativeDevice`] over the shared soft store.
pub(crate) struct SoftDevice {
    kind: BackendKind,
    shared: Arc<SoftShared>,
}

impl SoftDevice {
    pub fn new(kind: BackendKind, shared: Arc<SoftShared>) -> Self {
        Self { kind, shared }
    }
}

impl NativeDevice for SoftDevice {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn features(&self) -> Features {
        super::features(self.kind)
    }

    fn limits(&self) -> Limits {
        super::limits(self.kind)
    }

    fn create_buffer(&self, desc: &BufferDescription) -> Result<RawBuffer, BackendError> {
        let id = self.shared.store.lock().insert(SoftObject::Buffer(SoftBuffer::new(desc)));
        Ok(RawBuffer(id))
    }

    fn create_texture(&self, desc: &TextureDescription) -> Result<RawTexture, BackendError> {
        let texture = SoftTexture::new(desc)?;
        Ok(RawTexture(self.shared.store.lock().insert(SoftObject::Texture(texture))))
    }

    fn create_texture_view(&self, texture: RawTexture, range: &NativeViewRange) -> Result<RawTextureView, BackendError> {
        let mut store = self.shared.store.lock();
        store.texture(texture.0)?;
        let id = store.insert(SoftObject::View(SoftView {
            texture: texture.0,
            range: *range,
        }));
        Ok(RawTextureView(id))
    }

    fn create_sampler(&self, desc: &SamplerDescription) -> Result<RawSampler, BackendError> {
        Ok(RawSampler(self.shared.store.lock().insert(SoftObject::Sampler(desc.clone()))))
    }

    fn create_descriptor_set(&self, writes: &[NativeDescriptorWrite]) -> Result<RawDescriptorSet, BackendError> {
        let id = self.shared.store.lock().insert(SoftObject::DescriptorSet(writes.to_vec()));
        Ok(RawDescriptorSet(id))
    }

    fn create_pipeline(
        &self,
        desc: &PipelineDescription,
        bindings: &[NativeBindingDecl],
    ) -> Result<RawPipeline, BackendError> {
        let program = self.shared.kernels.link(desc)?;
        let mut slots = HashMap::new();
        for (name, class) in program.interface.entries() {
            let decl = bindings
                .iter()
                .find(|decl| &decl.name == name)
                .ok_or_else(|| BackendError::ShaderLinkFailed(format!("`{name}` has no declared binding")))?;
            if !class.accepts(decl.kind) {
                return Err(BackendError::ShaderLinkFailed(format!(
                    "`{name}` is declared as {:?} but used as {class:?}",
                    decl.kind
                )));
            }
            slots.insert(name.clone(), decl.slot);
        }
        let id = self
            .shared
            .store
            .lock()
            .insert(SoftObject::Pipeline(SoftPipeline { program, slots }));
        Ok(RawPipeline(id))
    }

    fn destroy(&self, object: RawObject) {
        if self.shared.store.lock().remove(object_id(object)).is_none() {
            log::warn!("soft {}: destroying unknown object {object:?}", self.kind.name());
        }
    }

    fn set_object_name(&self, object: RawObject, name: &str) {
        self.shared.store.lock().set_label(object_id(object), name);
    }

    fn create_command_buffer(&self) -> Result<Box<dyn NativeCommandBuffer>, BackendError> {
        Ok(Box::<SoftCommandBuffer>::default())
    }

    fn submit(&self, commands: Box<dyn NativeCommandBuffer>, on_complete: SubmitCallback) -> Result<(), BackendError> {
        let buffer = commands
            .into_any()
            .downcast::<SoftCommandBuffer>()
            .map_err(|_| BackendError::Internal("command buffer from a different device".into()))?;
        if !buffer.finished {
            return Err(BackendError::Internal("command buffer submitted before finish".into()));
        }

        let (kind, shared) = (self.kind, Arc::clone(&self.shared));
        self.shared.enqueue(Box::new(move || {
            let result = execute(&mut shared.store.lock(), kind, &buffer.commands);
            if let Err(e) = &result {
                log::error!("soft {}: submission failed: {e}", kind.name());
            }
            on_complete(result);
        }));
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), BackendError> {
        self.shared.wait_idle();
        Ok(())
    }

    fn read_buffer(&self, buffer: RawBuffer, offset: u64, len: u64) -> Result<Vec<u8>, BackendError> {
        executor::read_buffer(&self.shared.store.lock(), buffer.0, offset, len)
    }

    fn write_buffer(&self, buffer: RawBuffer, offset: u64, data: &[u8]) -> Result<(), BackendError> {
        executor::update_buffer(&mut self.shared.store.lock(), buffer.0, offset, data)
    }

    fn read_texture(&self, texture: RawTexture, mip_level: u32, array_layer: u32) -> Result<Vec<u8>, BackendError> {
        executor::read_texture(&self.shared.store.lock(), texture.0, mip_level, array_layer)
    }

    fn write_texture(
        &self,
        texture: RawTexture,
        mip_level: u32,
        array_layer: u32,
        data: &[u8],
    ) -> Result<(), BackendError> {
        executor::write_texture(&mut self.shared.store.lock(), texture.0, mip_level, array_layer, data)
    }

    fn create_swapchain(
        &self,
        surface: &Arc<dyn NativeSurface>,
        desc: &NativeSwapchainDesc,
    ) -> Result<RawSwapchain, BackendError> {
        if surface.is_lost() {
            return Err(BackendError::ResourceCreationFailed("surface is lost".into()));
        }
        let image = TextureDescription::new_2d(desc.width, desc.height, desc.format, TextureUsage::RENDER_TARGET);
        let mut store = self.shared.store.lock();
        let mut images = Vec::with_capacity(desc.image_count as usize);
        for _ in 0..desc.image_count.max(1) {
            images.push(store.insert(SoftObject::Texture(SoftTexture::new(&image)?)));
        }
        let id = store.insert(SoftObject::Swapchain(SoftSwapchain {
            surface: Arc::clone(surface),
            width: desc.width,
            height: desc.height,
            format: desc.format,
            images,
            next: 0,
        }));
        log::debug!(
            "soft {}: swapchain #{id} {}x{} with {} images",
            self.kind.name(),
            desc.width,
            desc.height,
            desc.image_count
        );
        Ok(RawSwapchain(id))
    }

    fn swapchain_images(&self, swapchain: RawSwapchain) -> Result<Vec<RawTexture>, BackendError> {
        let store = self.shared.store.lock();
        Ok(store.swapchain(swapchain.0)?.images.iter().copied().map(RawTexture).collect())
    }

    fn acquire_next_image(&self, swapchain: RawSwapchain) -> Result<u32, HalError> {
        let mut store = self.shared.store.lock();
        let chain = store.swapchain_mut(swapchain.0)?;
        if chain.surface.is_lost() {
            return Err(HalError::SurfaceLost);
        }
        if !chain.matches_surface() {
            return Err(HalError::SwapchainOutOfDate);
        }
        let index = chain.next;
        chain.next = (chain.next + 1) % chain.images.len().max(1) as u32;
        Ok(index)
    }

    fn present(&self, swapchain: RawSwapchain, image_index: u32) -> Result<(), HalError> {
        let image = {
            let store = self.shared.store.lock();
            let chain = store.swapchain(swapchain.0)?;
            if chain.surface.is_lost() {
                return Err(HalError::SurfaceLost);
            }
            if !chain.matches_surface() {
                return Err(HalError::SwapchainOutOfDate);
            }
            *chain
                .images
                .get(image_index as usize)
                .ok_or_else(|| HalError::invalid_parameter(format!("swapchain image {image_index} out of range")))?
        };

        // The frame is read once preceding submissions have run.
        let (kind, shared) = (self.kind, Arc::clone(&self.shared));
        self.shared.enqueue(Box::new(move || {
            let store = shared.store.lock();
            let frame = store.swapchain(swapchain.0).and_then(|chain| {
                let texture = store.texture(image)?;
                if kind.tracks_image_layouts() && texture.layout != ImageLayout::PresentSrc {
                    return Err(BackendError::Internal(format!(
                        "presented image #{image} is in {:?}",
                        texture.layout
                    )));
                }
                let data = texture.subresource(0, 0)?.to_vec();
                Ok((Arc::clone(&chain.surface), chain.width, chain.height, chain.format, data))
            });
            match frame {
                Ok((surface, width, height, format, data)) => {
                    drop(store);
                    surface.receive_frame(width, height, format, &data);
                }
                Err(e) => log::error!("soft {}: present failed: {e}", kind.name()),
            }
        }));
        Ok(())
    }

    fn destroy_swapchain(&self, swapchain: RawSwapchain) {
        let mut store = self.shared.store.lock();
        if store.swapchain(swapchain.0).is_err() {
            log::warn!("soft {}: destroying unknown swapchain {swapchain:?}", self.kind.name());
            return;
        }
        if let Some(SoftObject::Swapchain(chain)) = store.remove(swapchain.0) {
            for image in chain.images {
                store.remove(image);
            }
        }
    }
}

static_assertions::assert_impl_all!(SoftDevice: Send, Sync);
static_assertions::assert_impl_all!(SoftCommandBuffer: Send);
