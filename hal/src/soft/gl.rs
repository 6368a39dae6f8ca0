//! Soft OpenGL context.
//!
//! Programs expose their kernel interface to reflection: every interface
//! entry is active, and its index doubles as block index and uniform
//! location. Samplers are not active resources; they reach kernels through
//! the texture unit they are bound to.

use std::collections::HashMap;
use std::sync::Arc;

use super::executor;
use super::kernel::{Bindings, Bound, InterfaceClass, LinkedProgram};
use super::memory::{object_id, SoftBuffer, SoftObject, SoftTexture, SoftView, Store};
use super::raster::{self, DrawCall, RenderState};
use super::SoftShared;
use crate::config::BackendKind;
use crate::error::BackendError;
use crate::native::{
    GlContext, NativeAttachment, NativeRenderTargets, NativeSurface, NativeTextureRegion, NativeViewRange,
    RawBuffer, RawObject, RawProgram, RawSampler, RawTexture, RawTextureView,
};
use crate::types::{
    BufferDescription, Color, Extent3d, Features, IndexFormat, Limits, PipelineDescription, SamplerDescription,
    ScissorRect, TextureDescription, Viewport,
};

/// Linked program and its binding point assignments.
pub(crate) struct SoftProgram {
    pub program: LinkedProgram,
    /// Uniform block index to binding.
    pub block_bindings: HashMap<u32, u32>,
    /// Storage block index to binding.
    pub storage_bindings: HashMap<u32, u32>,
    /// Texture or image uniform location to unit.
    pub units: HashMap<u32, u32>,
}

impl SoftProgram {
    /// Interface index of `name` when its class satisfies `filter`.
    fn find(&self, name: &str, filter: impl Fn(InterfaceClass) -> bool) -> Option<u32> {
        self.program
            .interface
            .find(name)
            .filter(|(_, class)| filter(*class))
            .map(|(index, _)| index)
    }
}

type BufferRange = (u64, u64, u64);
type TextureUnit = (u64, Option<u64>);

/// Context state of one soft GL context.
pub(crate) struct SoftGlContext {
    shared: Arc<SoftShared>,
    program: Option<u64>,
    uniform_buffers: HashMap<u32, BufferRange>,
    storage_buffers: HashMap<u32, BufferRange>,
    texture_units: HashMap<u32, TextureUnit>,
    image_units: HashMap<u32, TextureUnit>,
    sampler_units: HashMap<u32, u64>,
    vertex_buffers: HashMap<u32, (u64, u64)>,
    index_buffer: Option<(u64, IndexFormat, u64)>,
    framebuffer: Option<NativeRenderTargets>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    debug_groups: Vec<String>,
    /// First failure since the last `take_error`.
    error: Option<BackendError>,
}

impl SoftGlContext {
    pub fn new(shared: Arc<SoftShared>) -> Self {
        Self {
            shared,
            program: None,
            uniform_buffers: HashMap::new(),
            storage_buffers: HashMap::new(),
            texture_units: HashMap::new(),
            image_units: HashMap::new(),
            sampler_units: HashMap::new(),
            vertex_buffers: HashMap::new(),
            index_buffer: None,
            framebuffer: None,
            viewport: None,
            scissor: None,
            debug_groups: Vec::new(),
            error: None,
        }
    }

    fn report(&mut self, what: &str, result: Result<(), BackendError>) {
        if let Err(e) = result {
            log::error!("soft OpenGL: {what} failed: {e} (groups {:?})", self.debug_groups);
            self.error.get_or_insert(e);
        }
    }

    fn with_program<R>(&self, program: RawProgram, f: impl FnOnce(&SoftProgram) -> R) -> Option<R> {
        let store = self.shared.store.lock();
        match store.program(program.0) {
            Ok(program) => Some(f(program)),
            Err(e) => {
                log::error!("soft OpenGL: {e}");
                None
            }
        }
    }

    fn with_program_mut(&self, program: RawProgram, f: impl FnOnce(&mut SoftProgram)) {
        let mut store = self.shared.store.lock();
        match store.program_mut(program.0) {
            Ok(program) => f(program),
            Err(e) => log::error!("soft OpenGL: {e}"),
        }
    }

    /// Resolve the interface of the current program through the binding
    /// points and units.
    fn resolve(&self, store: &Store) -> Result<(LinkedProgram, Bindings), BackendError> {
        let id = self
            .program
            .ok_or_else(|| BackendError::Internal("no program in use".into()))?;
        let program = store.program(id)?;
        let mut bindings = Bindings::new();

        for (index, (name, class)) in program.program.interface.entries().iter().enumerate() {
            let index = index as u32;
            // Unassigned blocks and units read binding point zero.
            let buffer = |assigned: &HashMap<u32, u32>, bound: &HashMap<u32, BufferRange>| {
                let binding = assigned.get(&index).copied().unwrap_or(0);
                bound.get(&binding).map(|&(buffer, offset, size)| Bound::Buffer { buffer, offset, size })
            };
            let unit = program.units.get(&index).copied().unwrap_or(0);
            let resolved = match class {
                InterfaceClass::UniformBlock { .. } => buffer(&program.block_bindings, &self.uniform_buffers),
                InterfaceClass::StorageBlock => buffer(&program.storage_bindings, &self.storage_buffers),
                InterfaceClass::Texture => self.texture_units.get(&unit).map(|&(texture, view)| Bound::Texture {
                    texture,
                    view,
                    sampler: self
                        .sampler_units
                        .get(&unit)
                        .and_then(|sampler| store.sampler(*sampler).ok().cloned()),
                }),
                InterfaceClass::Image => self.image_units.get(&unit).map(|&(texture, view)| Bound::Texture {
                    texture,
                    view,
                    sampler: None,
                }),
                InterfaceClass::Sampler => None,
            };
            if let Some(resolved) = resolved {
                bindings.insert(name.clone(), resolved);
            }
        }
        Ok((program.program.clone(), bindings))
    }

    fn draw_call(&mut self, call: DrawCall) {
        let Some(targets) = self.framebuffer.as_ref() else {
            log::trace!("soft OpenGL: draw into the default framebuffer discarded");
            return;
        };
        let result = {
            let mut store = self.shared.store.lock();
            self.resolve(&store).and_then(|(program, bindings)| {
                let render = RenderState {
                    targets,
                    viewport: self.viewport,
                    scissor: self.scissor,
                    vertex_buffers: &self.vertex_buffers,
                    index_buffer: self.index_buffer,
                };
                raster::draw(&mut store, &program, &bindings, &render, &call)
            })
        };
        self.report("draw", result);
    }

    fn target(&self, index: Option<u32>) -> Option<NativeAttachment> {
        let framebuffer = self.framebuffer.as_ref()?;
        match index {
            Some(index) => framebuffer.colors.get(index as usize).copied(),
            None => framebuffer.depth,
        }
    }
}

impl GlContext for SoftGlContext {
    fn features(&self) -> Features {
        super::features(BackendKind::OpenGl)
    }

    fn limits(&self) -> Limits {
        super::limits(BackendKind::OpenGl)
    }

    fn create_buffer(&mut self, desc: &BufferDescription) -> Result<RawBuffer, BackendError> {
        Ok(RawBuffer(self.shared.store.lock().insert(SoftObject::Buffer(SoftBuffer::new(desc)))))
    }

    fn create_texture(&mut self, desc: &TextureDescription) -> Result<RawTexture, BackendError> {
        let texture = SoftTexture::new(desc)?;
        Ok(RawTexture(self.shared.store.lock().insert(SoftObject::Texture(texture))))
    }

    fn create_texture_view(
        &mut self,
        texture: RawTexture,
        range: &NativeViewRange,
    ) -> Result<RawTextureView, BackendError> {
        let mut store = self.shared.store.lock();
        store.texture(texture.0)?;
        Ok(RawTextureView(store.insert(SoftObject::View(SoftView {
            texture: texture.0,
            range: *range,
        }))))
    }

    fn create_sampler(&mut self, desc: &SamplerDescription) -> Result<RawSampler, BackendError> {
        Ok(RawSampler(self.shared.store.lock().insert(SoftObject::Sampler(desc.clone()))))
    }

    fn create_program(&mut self, desc: &PipelineDescription) -> Result<RawProgram, BackendError> {
        let program = self.shared.kernels.link(desc)?;
        let id = self.shared.store.lock().insert(SoftObject::Program(SoftProgram {
            program,
            block_bindings: HashMap::new(),
            storage_bindings: HashMap::new(),
            units: HashMap::new(),
        }));
        Ok(RawProgram(id))
    }

    fn destroy(&mut self, object: RawObject) {
        let id = object_id(object);
        if self.program == Some(id) {
            self.program = None;
        }
        if self.shared.store.lock().remove(id).is_none() {
            log::warn!("soft OpenGL: destroying unknown object {object:?}");
        }
    }

    fn object_label(&mut self, object: RawObject, label: &str) {
        self.shared.store.lock().set_label(object_id(object), label);
    }

    fn uniform_block_index(&mut self, program: RawProgram, name: &str) -> Option<u32> {
        self.with_program(program, |p| p.find(name, |class| matches!(class, InterfaceClass::UniformBlock { .. })))
            .flatten()
    }

    fn uniform_block_size(&mut self, program: RawProgram, block: u32) -> u32 {
        self.with_program(program, |p| match p.program.interface.entries().get(block as usize) {
            Some((_, InterfaceClass::UniformBlock { size })) => *size,
            _ => 0,
        })
        .unwrap_or(0)
    }

    fn uniform_location(&mut self, program: RawProgram, name: &str) -> Option<u32> {
        self.with_program(program, |p| {
            p.find(name, |class| matches!(class, InterfaceClass::Texture | InterfaceClass::Image))
        })
        .flatten()
    }

    fn storage_block_index(&mut self, program: RawProgram, name: &str) -> Option<u32> {
        self.with_program(program, |p| p.find(name, |class| class == InterfaceClass::StorageBlock))
            .flatten()
    }

    fn active_resource_names(&mut self, program: RawProgram) -> Vec<String> {
        self.with_program(program, |p| {
            p.program
                .interface
                .entries()
                .iter()
                .filter(|(_, class)| *class != InterfaceClass::Sampler)
                .map(|(name, _)| name.clone())
                .collect()
        })
        .unwrap_or_default()
    }

    fn uniform_block_binding(&mut self, program: RawProgram, block: u32, binding: u32) {
        self.with_program_mut(program, |p| {
            p.block_bindings.insert(block, binding);
        });
    }

    fn storage_block_binding(&mut self, program: RawProgram, block: u32, binding: u32) {
        self.with_program_mut(program, |p| {
            p.storage_bindings.insert(block, binding);
        });
    }

    fn set_sampler_unit(&mut self, program: RawProgram, location: u32, unit: u32) {
        self.with_program_mut(program, |p| {
            p.units.insert(location, unit);
        });
    }

    fn set_image_unit(&mut self, program: RawProgram, location: u32, unit: u32) {
        self.with_program_mut(program, |p| {
            p.units.insert(location, unit);
        });
    }

    fn use_program(&mut self, program: RawProgram, _desc: &PipelineDescription) {
        self.program = Some(program.0);
    }

    fn bind_uniform_buffer(&mut self, binding: u32, buffer: RawBuffer, offset: u64, size: u64) {
        self.uniform_buffers.insert(binding, (buffer.0, offset, size));
    }

    fn bind_storage_buffer(&mut self, binding: u32, buffer: RawBuffer, offset: u64, size: u64) {
        self.storage_buffers.insert(binding, (buffer.0, offset, size));
    }

    fn bind_texture_unit(&mut self, unit: u32, texture: RawTexture, view: Option<RawTextureView>) {
        self.texture_units.insert(unit, (texture.0, view.map(|v| v.0)));
    }

    fn bind_image_unit(&mut self, unit: u32, texture: RawTexture, view: Option<RawTextureView>) {
        self.image_units.insert(unit, (texture.0, view.map(|v| v.0)));
    }

    fn bind_sampler_unit(&mut self, unit: u32, sampler: RawSampler) {
        self.sampler_units.insert(unit, sampler.0);
    }

    fn bind_vertex_buffer(&mut self, index: u32, buffer: RawBuffer, offset: u64) {
        self.vertex_buffers.insert(index, (buffer.0, offset));
    }

    fn bind_index_buffer(&mut self, buffer: RawBuffer, format: IndexFormat, offset: u64) {
        self.index_buffer = Some((buffer.0, format, offset));
    }

    fn bind_framebuffer(&mut self, targets: Option<&NativeRenderTargets>) {
        self.framebuffer = targets.cloned();
    }

    fn set_viewport(&mut self, index: u32, viewport: Viewport) {
        if index == 0 {
            self.viewport = Some(viewport);
        }
    }

    fn set_scissor(&mut self, index: u32, rect: ScissorRect) {
        if index == 0 {
            self.scissor = Some(rect);
        }
    }

    fn clear_color(&mut self, index: u32, color: Color) {
        if let Some(attachment) = self.target(Some(index)) {
            let result = executor::clear_color(&mut self.shared.store.lock(), attachment, color);
            self.report("clear", result);
        }
    }

    fn clear_depth(&mut self, depth: f32, _stencil: u8) {
        if let Some(attachment) = self.target(None) {
            let result = executor::clear_depth(&mut self.shared.store.lock(), attachment, depth);
            self.report("depth clear", result);
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.draw_call(DrawCall {
            count: vertex_count,
            instance_count,
            first: first_vertex,
            vertex_offset: 0,
            first_instance,
            indexed: false,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.draw_call(DrawCall {
            count: index_count,
            instance_count,
            first: first_index,
            vertex_offset,
            first_instance,
            indexed: true,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        let result = {
            let mut store = self.shared.store.lock();
            self.resolve(&store)
                .and_then(|(program, bindings)| executor::dispatch(&mut store, &program, &bindings, [x, y, z]))
        };
        self.report("dispatch", result);
    }

    fn memory_barrier(&mut self) {}

    fn push_debug_group(&mut self, label: &str) {
        self.debug_groups.push(label.to_string());
    }

    fn pop_debug_group(&mut self) {
        self.debug_groups.pop();
    }

    fn insert_debug_marker(&mut self, label: &str) {
        log::trace!("soft OpenGL: marker {label:?} in {:?}", self.debug_groups);
    }

    fn buffer_sub_data(&mut self, buffer: RawBuffer, offset: u64, data: &[u8]) -> Result<(), BackendError> {
        executor::update_buffer(&mut self.shared.store.lock(), buffer.0, offset, data)
    }

    fn get_buffer_sub_data(&mut self, buffer: RawBuffer, offset: u64, len: u64) -> Result<Vec<u8>, BackendError> {
        executor::read_buffer(&self.shared.store.lock(), buffer.0, offset, len)
    }

    fn tex_sub_image(
        &mut self,
        region: NativeTextureRegion,
        extent: Extent3d,
        data: &[u8],
    ) -> Result<(), BackendError> {
        executor::update_texture(&mut self.shared.store.lock(), region, extent, data)
    }

    fn get_tex_image(&mut self, texture: RawTexture, mip_level: u32, array_layer: u32) -> Result<Vec<u8>, BackendError> {
        executor::read_texture(&self.shared.store.lock(), texture.0, mip_level, array_layer)
    }

    fn copy_buffer(
        &mut self,
        source: RawBuffer,
        source_offset: u64,
        destination: RawBuffer,
        destination_offset: u64,
        size: u64,
    ) {
        let result = executor::copy_buffer(
            &mut self.shared.store.lock(),
            source.0,
            source_offset,
            destination.0,
            destination_offset,
            size,
        );
        self.report("buffer copy", result);
    }

    fn copy_texture(&mut self, source: NativeTextureRegion, destination: NativeTextureRegion, extent: Extent3d) {
        let result = executor::copy_texture(&mut self.shared.store.lock(), source, destination, extent);
        self.report("texture copy", result);
    }

    fn blit_resolve(&mut self, source: NativeAttachment, destination: NativeAttachment) {
        let result = executor::resolve(&mut self.shared.store.lock(), source, destination);
        self.report("resolve", result);
    }

    fn swap_buffers(&mut self, surface: &Arc<dyn NativeSurface>, back_buffer: RawTexture) -> Result<(), BackendError> {
        let (extent, format, data) = {
            let store = self.shared.store.lock();
            let texture = store.texture(back_buffer.0)?;
            (texture.extent(0), texture.format(), texture.subresource(0, 0)?.to_vec())
        };
        surface.receive_frame(extent.width, extent.height, format, &data);
        Ok(())
    }

    fn finish(&mut self) {
        self.shared.wait_resumed();
    }

    fn take_error(&mut self) -> Option<BackendError> {
        self.error.take()
    }
}
