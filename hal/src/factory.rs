//! Resource creation.
//!
//! [`ResourceFactory`] validates descriptions against the device features
//! and limits, creates the native objects and wraps them in resource
//! objects. It is implemented for `Arc<GraphicsDevice>` so every resource
//! can hold a strong reference to its device.

use std::collections::HashSet;
use std::sync::Arc;

use crate::binding::SlotModel;
use crate::command::{CommandEncoder, CommandList, DeferredEncoder, NativeEncoder};
use crate::device::{DeviceBackend, GraphicsDevice};
use crate::error::{BackendError, HalError, HalResult, UsageError};
use crate::native::{GlContext, NativeDescriptorWrite, NativeDevice, NativeViewRange};
use crate::resources::{
    BindableResource, Buffer, Fence, Framebuffer, Pipeline, ResourceCore, ResourceLayout, ResourceSet,
    Sampler, Texture, TextureOrigin, TextureView, ViewTarget,
};
use crate::swapchain::Swapchain;
use crate::types::{
    BufferDescription, BufferUsage, FramebufferAttachment, FramebufferDescription, PipelineDescription,
    ResourceKind, ResourceLayoutDescription, SamplerDescription, ShaderStages, SwapchainDescription,
    TextureDescription, TextureKind, TextureUsage, TextureViewDescription,
};

/// Creates device resources from descriptions.
pub trait ResourceFactory {
    fn create_buffer(&self, desc: &BufferDescription) -> HalResult<Arc<Buffer>>;
    fn create_texture(&self, desc: &TextureDescription) -> HalResult<Arc<Texture>>;
    fn create_texture_view(
        &self,
        texture: &Arc<Texture>,
        desc: &TextureViewDescription,
    ) -> HalResult<Arc<TextureView>>;
    fn create_sampler(&self, desc: &SamplerDescription) -> HalResult<Arc<Sampler>>;
    /// Validate a pipeline description. Native state is built on first use.
    fn create_pipeline(&self, desc: &PipelineDescription) -> HalResult<Arc<Pipeline>>;
    fn create_resource_layout(&self, desc: &ResourceLayoutDescription) -> HalResult<Arc<ResourceLayout>>;
    /// Bind one resource per layout element, in element order.
    fn create_resource_set(
        &self,
        layout: &Arc<ResourceLayout>,
        resources: &[BindableResource],
    ) -> HalResult<Arc<ResourceSet>>;
    fn create_framebuffer(&self, desc: &FramebufferDescription) -> HalResult<Arc<Framebuffer>>;
    fn create_swapchain(&self, desc: &SwapchainDescription) -> HalResult<Swapchain>;
    fn create_command_list(&self) -> HalResult<CommandList>;
    fn create_fence(&self, signaled: bool) -> HalResult<Arc<Fence>>;
}

/// Run a driver call on whichever surface the device uses.
fn driver_call<T, N, G>(device: &GraphicsDevice, native: N, gl: G) -> HalResult<T>
where
    T: Send + 'static,
    N: FnOnce(&dyn NativeDevice) -> Result<T, BackendError>,
    G: FnOnce(&mut dyn GlContext) -> Result<T, BackendError> + Send + 'static,
{
    match device.backend_impl() {
        DeviceBackend::Native(driver) => Ok(native(driver.as_ref())?),
        DeviceBackend::Deferred(worker) => Ok(worker.call(gl)??),
    }
}

fn ensure_usable(device: &GraphicsDevice, owner: &Arc<GraphicsDevice>, core: &ResourceCore) -> HalResult<()> {
    device.ensure_owner(owner)?;
    core.ensure_live()
}

impl ResourceFactory for Arc<GraphicsDevice> {
    fn create_buffer(&self, desc: &BufferDescription) -> HalResult<Arc<Buffer>> {
        let limits = self.limits();
        if desc.size == 0 {
            return Err(HalError::invalid_parameter("buffer size cannot be zero"));
        }
        if desc.size > limits.max_buffer_size {
            return Err(HalError::invalid_parameter(format!(
                "buffer size {} exceeds maximum {}",
                desc.size, limits.max_buffer_size
            )));
        }
        if desc.usage.is_empty() {
            return Err(HalError::invalid_parameter("buffer usage cannot be empty"));
        }
        if desc.usage.contains(BufferUsage::UNIFORM) && desc.size % 16 != 0 {
            return Err(HalError::invalid_parameter(format!(
                "uniform buffer size {} is not a multiple of 16",
                desc.size
            )));
        }
        if desc.usage.is_structured() && desc.structure_stride == 0 {
            return Err(HalError::invalid_parameter(
                "structured buffers need a non-zero structure stride",
            ));
        }

        let gl_desc = desc.clone();
        let raw = driver_call(
            self,
            |native| native.create_buffer(desc),
            move |ctx| ctx.create_buffer(&gl_desc),
        )?;
        let buffer = Arc::new(Buffer::new(Arc::clone(self), desc.clone(), raw));
        log::trace!("Created buffer {:?}, size={}", desc.label, desc.size);
        if let Some(label) = &desc.label {
            self.label_objects(&buffer.raw_objects(), label);
        }
        Ok(buffer)
    }

    fn create_texture(&self, desc: &TextureDescription) -> HalResult<Arc<Texture>> {
        validate_texture(self, desc)?;

        let gl_desc = desc.clone();
        let raw = driver_call(
            self,
            |native| native.create_texture(desc),
            move |ctx| ctx.create_texture(&gl_desc),
        )?;
        let texture = Arc::new(Texture::new(Arc::clone(self), desc.clone(), raw, TextureOrigin::Owned));
        log::trace!(
            "Created texture {:?}, {}x{}x{} {:?}",
            desc.label,
            desc.size.width,
            desc.size.height,
            desc.size.depth,
            desc.format
        );
        if let Some(label) = &desc.label {
            self.label_objects(&texture.raw_objects(), label);
        }
        Ok(texture)
    }

    fn create_texture_view(
        &self,
        texture: &Arc<Texture>,
        desc: &TextureViewDescription,
    ) -> HalResult<Arc<TextureView>> {
        ensure_usable(self, &texture.device, texture.core())?;
        let parent = texture.description();

        let mip_levels = desc
            .mip_levels
            .unwrap_or_else(|| parent.mip_levels.saturating_sub(desc.base_mip_level));
        let array_layers = desc
            .array_layers
            .unwrap_or_else(|| parent.array_layers.saturating_sub(desc.base_array_layer));
        if mip_levels == 0 || desc.base_mip_level + mip_levels > parent.mip_levels {
            return Err(HalError::invalid_parameter(format!(
                "view mips {}..{} out of range ({} levels)",
                desc.base_mip_level,
                desc.base_mip_level + mip_levels,
                parent.mip_levels
            )));
        }
        if array_layers == 0 || desc.base_array_layer + array_layers > parent.array_layers {
            return Err(HalError::invalid_parameter(format!(
                "view layers {}..{} out of range ({} layers)",
                desc.base_array_layer,
                desc.base_array_layer + array_layers,
                parent.array_layers
            )));
        }
        let format = desc.format.unwrap_or(parent.format);
        if format.block_size() != parent.format.block_size()
            || format.is_depth_stencil() != parent.format.is_depth_stencil()
        {
            return Err(HalError::invalid_parameter(format!(
                "view format {format:?} is incompatible with {:?}",
                parent.format
            )));
        }
        if parent.usage.contains(TextureUsage::CUBEMAP | TextureUsage::STORAGE)
            && !self.features().storage_cube_images
        {
            return Err(UsageError::FeatureNotSupported("storage_cube_images").into());
        }

        let range = NativeViewRange {
            base_mip_level: desc.base_mip_level,
            mip_levels,
            base_array_layer: desc.base_array_layer,
            array_layers,
            format,
        };
        let identity = desc.base_mip_level == 0
            && mip_levels == parent.mip_levels
            && desc.base_array_layer == 0
            && array_layers == parent.array_layers
            && format == parent.format;

        let target = if identity {
            ViewTarget::Parent
        } else {
            let raw_texture = texture.raw_handle();
            let view = driver_call(
                self,
                |native| native.create_texture_view(raw_texture, &range),
                move |ctx| ctx.create_texture_view(raw_texture, &range),
            )?;
            ViewTarget::Owned(view)
        };

        let view = Arc::new(TextureView::new(
            Arc::clone(self),
            Arc::clone(texture),
            desc.label.clone(),
            range,
            target,
        ));
        log::trace!(
            "Created texture view {:?} of {} (owned native view: {})",
            desc.label,
            texture.core().describe(),
            !identity
        );
        if let Some(label) = &desc.label {
            self.label_objects(&view.raw_objects(), label);
        }
        Ok(view)
    }

    fn create_sampler(&self, desc: &SamplerDescription) -> HalResult<Arc<Sampler>> {
        let gl_desc = desc.clone();
        let raw = driver_call(
            self,
            |native| native.create_sampler(desc),
            move |ctx| ctx.create_sampler(&gl_desc),
        )?;
        let sampler = Arc::new(Sampler::new(Arc::clone(self), desc.clone(), raw));
        log::trace!("Created sampler {:?}", desc.label);
        if let Some(label) = &desc.label {
            self.label_objects(&sampler.raw_objects(), label);
        }
        Ok(sampler)
    }

    fn create_pipeline(&self, desc: &PipelineDescription) -> HalResult<Arc<Pipeline>> {
        validate_pipeline(self, desc)?;

        let pipeline = Arc::new(Pipeline::new(Arc::clone(self), desc.clone()));
        log::trace!("Created pipeline {:?}", desc.label());
        Ok(pipeline)
    }

    fn create_resource_layout(&self, desc: &ResourceLayoutDescription) -> HalResult<Arc<ResourceLayout>> {
        let mut names = HashSet::new();
        for element in &desc.elements {
            if !names.insert(element.name.as_str()) {
                return Err(HalError::invalid_parameter(format!(
                    "duplicate layout element name `{}`",
                    element.name
                )));
            }
            if element.stages.is_empty() {
                return Err(HalError::invalid_parameter(format!(
                    "layout element `{}` is visible to no stage",
                    element.name
                )));
            }
            if element.is_dynamic() {
                if !element.kind.is_buffer() {
                    return Err(HalError::invalid_parameter(format!(
                        "dynamic binding on non-buffer element `{}`",
                        element.name
                    )));
                }
                if !self.features().dynamic_binding_offsets {
                    return Err(UsageError::FeatureNotSupported("dynamic_binding_offsets").into());
                }
            }
        }

        let layout = Arc::new(ResourceLayout::new(Arc::clone(self), desc.clone()));
        log::trace!("Created resource layout {:?} ({} elements)", desc.label, desc.elements.len());
        Ok(layout)
    }

    fn create_resource_set(
        &self,
        layout: &Arc<ResourceLayout>,
        resources: &[BindableResource],
    ) -> HalResult<Arc<ResourceSet>> {
        ensure_usable(self, &layout.device, &layout.core)?;
        let elements = layout.elements();
        if resources.len() != elements.len() {
            return Err(UsageError::ArgumentCount {
                what: "resources",
                expected: elements.len(),
                found: resources.len(),
            }
            .into());
        }

        for (slot, (element, resource)) in elements.iter().zip(resources).enumerate() {
            validate_binding(self, slot as u32, element.kind, resource)?;
        }

        let descriptor_set = match self.native() {
            Some(native) if SlotModel::for_backend(self.backend()) == Some(SlotModel::Descriptor) => {
                let writes: Vec<_> = elements
                    .iter()
                    .zip(resources)
                    .enumerate()
                    .map(|(binding, (element, resource))| NativeDescriptorWrite {
                        binding: binding as u32,
                        kind: element.kind,
                        dynamic: element.is_dynamic(),
                        resource: resource.native_binding(0),
                    })
                    .collect();
                Some(native.create_descriptor_set(&writes)?)
            }
            _ => None,
        };

        let label = layout.description().label.clone();
        let set = Arc::new(ResourceSet::new(
            Arc::clone(self),
            Arc::clone(layout),
            resources.to_vec(),
            descriptor_set,
            label,
        ));
        log::trace!("Created resource set {} for {}", set.core().id(), layout.core.describe());
        Ok(set)
    }

    fn create_framebuffer(&self, desc: &FramebufferDescription) -> HalResult<Arc<Framebuffer>> {
        if desc.color_targets.is_empty() && desc.depth_target.is_none() {
            return Err(HalError::invalid_parameter("framebuffer needs at least one attachment"));
        }
        if desc.color_targets.len() > self.limits().max_color_targets as usize {
            return Err(HalError::invalid_parameter(format!(
                "{} color targets exceed the limit of {}",
                desc.color_targets.len(),
                self.limits().max_color_targets
            )));
        }

        let mut extent = None;
        let mut check = |attachment: &FramebufferAttachment, depth: bool| -> HalResult<()> {
            let texture = &attachment.target;
            ensure_usable(self, &texture.device, texture.core())?;
            let (usage, what) = if depth {
                (TextureUsage::DEPTH_STENCIL, "DEPTH_STENCIL")
            } else {
                (TextureUsage::RENDER_TARGET, "RENDER_TARGET")
            };
            if !texture.usage().contains(usage) || texture.format().is_depth_stencil() != depth {
                return Err(HalError::invalid_parameter(format!(
                    "{} cannot be attached: needs {what} usage and a matching format",
                    texture.core().describe()
                )));
            }
            if attachment.mip_level >= texture.mip_levels() || attachment.array_layer >= texture.array_layers() {
                return Err(HalError::invalid_parameter(format!(
                    "attachment subresource (mip {}, layer {}) out of range for {}",
                    attachment.mip_level,
                    attachment.array_layer,
                    texture.core().describe()
                )));
            }
            let size = texture.description().mip_extent(attachment.mip_level);
            match extent {
                None => extent = Some((size.width, size.height)),
                Some(expected) if expected != (size.width, size.height) => {
                    return Err(HalError::invalid_parameter(format!(
                        "attachment size {}x{} differs from {}x{}",
                        size.width, size.height, expected.0, expected.1
                    )));
                }
                Some(_) => {}
            }
            Ok(())
        };

        for attachment in &desc.color_targets {
            check(attachment, false)?;
        }
        if let Some(depth) = &desc.depth_target {
            check(depth, true)?;
        }
        let (width, height) = extent.unwrap_or((0, 0));

        let framebuffer = Arc::new(Framebuffer::new(Arc::clone(self), desc.clone(), width, height));
        log::trace!(
            "Created framebuffer {}x{} with {} color targets",
            width,
            height,
            desc.color_targets.len()
        );
        Ok(framebuffer)
    }

    fn create_swapchain(&self, desc: &SwapchainDescription) -> HalResult<Swapchain> {
        Swapchain::new(Arc::clone(self), desc.clone())
    }

    fn create_command_list(&self) -> HalResult<CommandList> {
        let encoder: Box<dyn CommandEncoder> = match self.backend_impl() {
            DeviceBackend::Native(native) => {
                let model = SlotModel::for_backend(self.backend())
                    .ok_or_else(|| HalError::invalid_state("backend has no explicit slot model"))?;
                Box::new(NativeEncoder::new(Arc::clone(native), model))
            }
            DeviceBackend::Deferred(_) => Box::new(DeferredEncoder::new(
                Arc::clone(self.log_pool()),
                self.options().command_log_capacity,
            )),
        };
        Ok(CommandList::new(Arc::clone(self), encoder, None))
    }

    fn create_fence(&self, signaled: bool) -> HalResult<Arc<Fence>> {
        Ok(Arc::new(Fence::new(Arc::clone(self), signaled)))
    }
}

fn validate_texture(device: &GraphicsDevice, desc: &TextureDescription) -> HalResult<()> {
    let max = device.limits().max_texture_dimension;
    let size = desc.size;
    if size.width == 0 || size.height == 0 || size.depth == 0 {
        return Err(HalError::invalid_parameter(format!("texture size {size:?} has a zero dimension")));
    }
    if size.width > max || size.height > max || size.depth > max {
        return Err(HalError::invalid_parameter(format!(
            "texture size {size:?} exceeds maximum dimension {max}"
        )));
    }
    if desc.kind != TextureKind::D3 && size.depth != 1 {
        return Err(HalError::invalid_parameter("only 3D textures have depth"));
    }
    if desc.mip_levels == 0 || desc.mip_levels > desc.max_mip_levels() {
        return Err(HalError::invalid_parameter(format!(
            "{} mip levels requested, {} possible",
            desc.mip_levels,
            desc.max_mip_levels()
        )));
    }
    if desc.array_layers == 0 {
        return Err(HalError::invalid_parameter("texture needs at least one array layer"));
    }
    if desc.usage.is_empty() {
        return Err(HalError::invalid_parameter("texture usage cannot be empty"));
    }
    if desc.usage.contains(TextureUsage::CUBEMAP) && (desc.array_layers % 6 != 0 || size.width != size.height) {
        return Err(HalError::invalid_parameter(
            "cubemaps need square faces and a multiple of six layers",
        ));
    }
    if !matches!(desc.sample_count, 1 | 2 | 4 | 8) {
        return Err(HalError::invalid_parameter(format!(
            "unsupported sample count {}",
            desc.sample_count
        )));
    }
    if desc.sample_count > 1 && (desc.mip_levels > 1 || desc.usage.contains(TextureUsage::STORAGE)) {
        return Err(HalError::invalid_parameter(
            "multisampled textures cannot have mips or storage usage",
        ));
    }
    if desc.usage.contains(TextureUsage::DEPTH_STENCIL) && !desc.format.is_depth_stencil() {
        return Err(HalError::invalid_parameter(format!(
            "DEPTH_STENCIL usage needs a depth format, got {:?}",
            desc.format
        )));
    }
    if desc.usage.intersects(TextureUsage::RENDER_TARGET | TextureUsage::STORAGE) && desc.format.is_depth_stencil() {
        return Err(HalError::invalid_parameter(format!(
            "depth format {:?} cannot be a color or storage target",
            desc.format
        )));
    }
    if desc.usage.contains(TextureUsage::STORAGE | TextureUsage::CUBEMAP) && !device.features().storage_cube_images {
        return Err(UsageError::FeatureNotSupported("storage_cube_images").into());
    }
    Ok(())
}

fn validate_pipeline(device: &Arc<GraphicsDevice>, desc: &PipelineDescription) -> HalResult<()> {
    let limits = device.limits();
    let layouts = desc.resource_layouts();
    if layouts.len() > limits.max_resource_sets as usize {
        return Err(HalError::invalid_parameter(format!(
            "{} resource layouts exceed the limit of {}",
            layouts.len(),
            limits.max_resource_sets
        )));
    }
    for layout in layouts {
        ensure_usable(device, &layout.device, &layout.core)?;
    }

    match desc {
        PipelineDescription::Compute(compute) => {
            if !device.features().compute_shaders {
                return Err(UsageError::FeatureNotSupported("compute_shaders").into());
            }
            if compute.shader.stage != ShaderStages::COMPUTE {
                return Err(HalError::invalid_parameter("compute pipelines take a compute shader"));
            }
            let fits = compute
                .workgroup_size
                .iter()
                .zip(limits.max_workgroup_size)
                .all(|(size, max)| *size >= 1 && *size <= max);
            if !fits {
                return Err(HalError::invalid_parameter(format!(
                    "workgroup size {:?} outside 1..={:?}",
                    compute.workgroup_size, limits.max_workgroup_size
                )));
            }
        }
        PipelineDescription::Graphics(graphics) => {
            let has = |stage: ShaderStages| graphics.shaders.iter().filter(|s| s.stage == stage).count() == 1;
            if !has(ShaderStages::VERTEX) || !has(ShaderStages::FRAGMENT) {
                return Err(HalError::invalid_parameter(
                    "graphics pipelines need exactly one vertex and one fragment shader",
                ));
            }
            if graphics.outputs.color_formats.len() > limits.max_color_targets as usize {
                return Err(HalError::invalid_parameter(format!(
                    "{} color outputs exceed the limit of {}",
                    graphics.outputs.color_formats.len(),
                    limits.max_color_targets
                )));
            }
            if graphics.blend.attachments.len() > 1 && !device.features().independent_blend {
                return Err(UsageError::FeatureNotSupported("independent_blend").into());
            }
        }
    }
    Ok(())
}

/// Check that `resource` can be bound where `kind` is expected.
fn validate_binding(
    device: &Arc<GraphicsDevice>,
    slot: u32,
    kind: ResourceKind,
    resource: &BindableResource,
) -> HalResult<()> {
    let mismatch = || -> HalError {
        UsageError::ResourceKindMismatch {
            slot,
            expected: kind,
            found: resource.kind_name(),
        }
        .into()
    };

    match (kind, resource) {
        (ResourceKind::Sampler, BindableResource::Sampler(sampler)) => {
            ensure_usable(device, &sampler.device, sampler.core())
        }
        (ResourceKind::TextureReadOnly | ResourceKind::TextureReadWrite, BindableResource::TextureView(view)) => {
            ensure_usable(device, &view.device, view.core())?;
            let required = if kind == ResourceKind::TextureReadOnly {
                TextureUsage::SAMPLED
            } else {
                TextureUsage::STORAGE
            };
            if !view.texture().usage().contains(required) {
                return Err(HalError::invalid_parameter(format!(
                    "slot {slot}: {} lacks {required:?} usage",
                    view.texture().core().describe()
                )));
            }
            Ok(())
        }
        (kind, BindableResource::Buffer(_) | BindableResource::BufferRange(_)) if kind.is_buffer() => {
            let Some((buffer, offset, size)) = resource.buffer_window() else {
                return Err(mismatch());
            };
            ensure_usable(device, &buffer.device, buffer.core())?;
            let (required, alignment) = match kind {
                ResourceKind::UniformBuffer => (BufferUsage::UNIFORM, device.limits().uniform_offset_alignment),
                ResourceKind::StructuredBufferReadOnly => (
                    BufferUsage::STRUCTURED_READ_ONLY | BufferUsage::STRUCTURED_READ_WRITE,
                    device.limits().structured_offset_alignment,
                ),
                _ => (
                    BufferUsage::STRUCTURED_READ_WRITE,
                    device.limits().structured_offset_alignment,
                ),
            };
            if !buffer.usage().intersects(required) {
                return Err(HalError::invalid_parameter(format!(
                    "slot {slot}: {} lacks {required:?} usage",
                    buffer.core().describe()
                )));
            }
            if size == 0 || offset + size > buffer.size() {
                return Err(HalError::invalid_parameter(format!(
                    "slot {slot}: range {offset}+{size} exceeds buffer of {} bytes",
                    buffer.size()
                )));
            }
            if offset % alignment as u64 != 0 {
                return Err(HalError::invalid_parameter(format!(
                    "slot {slot}: range offset {offset} is not a multiple of {alignment}"
                )));
            }
            Ok(())
        }
        _ => Err(mismatch()),
    }
}
