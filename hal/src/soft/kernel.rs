//! Shader kernels of the software driver.
//!
//! Shader entry points resolve to Rust closures registered on a
//! [`KernelLibrary`]. Each kernel declares a [`ProgramInterface`]: the names
//! and classes of the resources it touches. GL reflection sees exactly that
//! interface, and explicit pipelines must declare a binding for every name
//! in it.
//!
//! ```ignore
//! let kernels = KernelLibrary::new().with_compute(
//!     "fill",
//!     ProgramInterface::new()
//!         .uniform_block("params", 16)
//!         .image("target"),
//!     |invocation, resources| {
//!         let value: f32 = resources.uniform("params").unwrap_or(0.0);
//!         resources.store("target", invocation.global_id, Vec4::splat(value));
//!     },
//! );
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use glam::{UVec3, Vec2, Vec4};

use super::memory::{SoftTexture, Store};
use crate::error::BackendError;
use crate::types::{
    AddressMode, BlendState, DepthStencilState, FilterMode, GraphicsPipelineDescription, PipelineDescription,
    PrimitiveTopology, RasterizerState, ResourceKind, SamplerDescription, ShaderDescription, ShaderStages,
    TextureKind, VertexLayout,
};

// ============================================================================
// Interface
// ============================================================================

/// Class of a resource a kernel uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceClass {
    /// Uniform block of `size` bytes.
    UniformBlock { size: u32 },
    /// Sampled texture.
    Texture,
    /// Read-write storage image.
    Image,
    /// Structured (storage) buffer.
    StorageBlock,
    /// Standalone sampler. Invisible to GL reflection.
    Sampler,
}

impl InterfaceClass {
    /// Whether a layout element of `kind` can feed this resource.
    pub fn accepts(&self, kind: ResourceKind) -> bool {
        match self {
            Self::UniformBlock { .. } => kind == ResourceKind::UniformBuffer,
            Self::Texture => kind == ResourceKind::TextureReadOnly,
            Self::Image => kind == ResourceKind::TextureReadWrite,
            Self::StorageBlock => matches!(
                kind,
                ResourceKind::StructuredBufferReadOnly | ResourceKind::StructuredBufferReadWrite
            ),
            Self::Sampler => kind == ResourceKind::Sampler,
        }
    }
}

/// Named resources a kernel accesses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramInterface {
    entries: Vec<(String, InterfaceClass)>,
}

impl ProgramInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uniform_block(self, name: impl Into<String>, size: u32) -> Self {
        self.with(name, InterfaceClass::UniformBlock { size })
    }

    pub fn texture(self, name: impl Into<String>) -> Self {
        self.with(name, InterfaceClass::Texture)
    }

    pub fn image(self, name: impl Into<String>) -> Self {
        self.with(name, InterfaceClass::Image)
    }

    pub fn storage_block(self, name: impl Into<String>) -> Self {
        self.with(name, InterfaceClass::StorageBlock)
    }

    pub fn sampler(self, name: impl Into<String>) -> Self {
        self.with(name, InterfaceClass::Sampler)
    }

    fn with(mut self, name: impl Into<String>, class: InterfaceClass) -> Self {
        self.entries.push((name.into(), class));
        self
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[(String, InterfaceClass)] {
        &self.entries
    }

    /// Position and class of `name`.
    pub fn find(&self, name: &str) -> Option<(u32, InterfaceClass)> {
        self.entries
            .iter()
            .position(|(n, _)| n == name)
            .map(|index| (index as u32, self.entries[index].1))
    }

    /// Union of two stage interfaces. A name used with two classes does not
    /// link.
    fn merged(&self, other: &Self) -> Result<Self, BackendError> {
        let mut merged = self.clone();
        for (name, class) in &other.entries {
            match merged.find(name) {
                Some((_, existing)) if existing != *class => {
                    return Err(BackendError::ShaderLinkFailed(format!(
                        "`{name}` declared as {existing:?} and {class:?}"
                    )));
                }
                Some(_) => {}
                None => merged.entries.push((name.clone(), *class)),
            }
        }
        Ok(merged)
    }
}

// ============================================================================
// Kernel signatures
// ============================================================================

/// Built-in inputs of one compute invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeInvocation {
    pub global_id: UVec3,
    pub local_id: UVec3,
    pub workgroup_id: UVec3,
}

/// Inputs of one vertex invocation.
#[derive(Debug, Clone)]
pub struct VertexInput<'a> {
    pub vertex_index: u32,
    pub instance_index: u32,
    pub(crate) attributes: Vec<(&'a str, Vec4)>,
}

impl VertexInput<'_> {
    /// Fetched attribute `name`, zero when the pipeline declares none.
    pub fn attribute(&self, name: &str) -> Vec4 {
        self.attributes
            .iter()
            .find(|(n, _)| *n == name)
            .map_or(Vec4::ZERO, |(_, value)| *value)
    }
}

/// Result of a vertex invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexOutput {
    /// Clip-space position.
    pub position: Vec4,
    /// Interpolated into [`FragmentInput::varying`].
    pub varying: Vec4,
}

impl VertexOutput {
    pub fn new(position: Vec4) -> Self {
        Self {
            position,
            varying: Vec4::ZERO,
        }
    }

    pub fn with_varying(mut self, varying: Vec4) -> Self {
        self.varying = varying;
        self
    }
}

/// Inputs of one fragment invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentInput {
    /// Window position (pixel center) with depth in `z`.
    pub position: Vec4,
    pub varying: Vec4,
    pub front_facing: bool,
}

pub type ComputeKernel = dyn Fn(&ComputeInvocation, &mut ShaderResources<'_>) + Send + Sync;
pub type VertexKernel = dyn Fn(&VertexInput<'_>, &ShaderResources<'_>) -> VertexOutput + Send + Sync;
/// Returns the color written to every target, or `None` to discard.
pub type FragmentKernel = dyn Fn(&FragmentInput, &ShaderResources<'_>) -> Option<Vec4> + Send + Sync;

#[derive(Clone)]
enum KernelBody {
    Compute(Arc<ComputeKernel>),
    Vertex(Arc<VertexKernel>),
    Fragment(Arc<FragmentKernel>),
}

impl KernelBody {
    fn stage(&self) -> ShaderStages {
        match self {
            Self::Compute(_) => ShaderStages::COMPUTE,
            Self::Vertex(_) => ShaderStages::VERTEX,
            Self::Fragment(_) => ShaderStages::FRAGMENT,
        }
    }
}

#[derive(Clone)]
struct KernelEntry {
    interface: ProgramInterface,
    body: KernelBody,
}

/// Entry points available to pipelines, by name.
#[derive(Clone, Default)]
pub struct KernelLibrary {
    entries: HashMap<String, KernelEntry>,
}

impl KernelLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compute(
        mut self,
        entry_point: impl Into<String>,
        interface: ProgramInterface,
        kernel: impl Fn(&ComputeInvocation, &mut ShaderResources<'_>) + Send + Sync + 'static,
    ) -> Self {
        let body = KernelBody::Compute(Arc::new(kernel));
        self.entries.insert(entry_point.into(), KernelEntry { interface, body });
        self
    }

    pub fn with_vertex(
        mut self,
        entry_point: impl Into<String>,
        interface: ProgramInterface,
        kernel: impl Fn(&VertexInput<'_>, &ShaderResources<'_>) -> VertexOutput + Send + Sync + 'static,
    ) -> Self {
        let body = KernelBody::Vertex(Arc::new(kernel));
        self.entries.insert(entry_point.into(), KernelEntry { interface, body });
        self
    }

    pub fn with_fragment(
        mut self,
        entry_point: impl Into<String>,
        interface: ProgramInterface,
        kernel: impl Fn(&FragmentInput, &ShaderResources<'_>) -> Option<Vec4> + Send + Sync + 'static,
    ) -> Self {
        let body = KernelBody::Fragment(Arc::new(kernel));
        self.entries.insert(entry_point.into(), KernelEntry { interface, body });
        self
    }

    pub fn contains(&self, entry_point: &str) -> bool {
        self.entries.contains_key(entry_point)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn stage(&self, shader: &ShaderDescription) -> Result<&KernelEntry, BackendError> {
        let entry = self
            .entries
            .get(&shader.entry_point)
            .ok_or_else(|| BackendError::ShaderLinkFailed(format!("no kernel named `{}`", shader.entry_point)))?;
        if entry.body.stage() != shader.stage {
            return Err(BackendError::ShaderLinkFailed(format!(
                "`{}` is a {:?} kernel, used as {:?}",
                shader.entry_point,
                entry.body.stage(),
                shader.stage
            )));
        }
        Ok(entry)
    }

    /// Resolve every stage of `desc` into a linked program.
    pub(crate) fn link(&self, desc: &PipelineDescription) -> Result<LinkedProgram, BackendError> {
        match desc {
            PipelineDescription::Compute(compute) => {
                let entry = self.stage(&compute.shader)?;
                let KernelBody::Compute(body) = &entry.body else {
                    return Err(BackendError::ShaderLinkFailed("compute stage expected".into()));
                };
                Ok(LinkedProgram {
                    stages: LinkedStages::Compute {
                        body: Arc::clone(body),
                        workgroup_size: compute.workgroup_size,
                    },
                    interface: entry.interface.clone(),
                    graphics: None,
                })
            }
            PipelineDescription::Graphics(graphics) => {
                let find = |stage: ShaderStages| {
                    graphics
                        .shaders
                        .iter()
                        .find(|s| s.stage == stage)
                        .ok_or_else(|| BackendError::ShaderLinkFailed(format!("missing {stage:?} stage")))
                };
                let vertex = self.stage(find(ShaderStages::VERTEX)?)?;
                let fragment = self.stage(find(ShaderStages::FRAGMENT)?)?;
                let (KernelBody::Vertex(vertex_body), KernelBody::Fragment(fragment_body)) =
                    (&vertex.body, &fragment.body)
                else {
                    return Err(BackendError::ShaderLinkFailed("vertex and fragment stages expected".into()));
                };
                Ok(LinkedProgram {
                    stages: LinkedStages::Graphics {
                        vertex: Arc::clone(vertex_body),
                        fragment: Arc::clone(fragment_body),
                    },
                    interface: vertex.interface.merged(&fragment.interface)?,
                    graphics: Some(GraphicsState::from(graphics)),
                })
            }
        }
    }
}

impl fmt::Debug for KernelLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("KernelLibrary").field("entries", &names).finish()
    }
}

// ============================================================================
// Linked programs
// ============================================================================

#[derive(Clone)]
pub(crate) enum LinkedStages {
    Compute {
        body: Arc<ComputeKernel>,
        workgroup_size: [u32; 3],
    },
    Graphics {
        vertex: Arc<VertexKernel>,
        fragment: Arc<FragmentKernel>,
    },
}

/// Fixed-function state copied out of a graphics description.
#[derive(Debug, Clone)]
pub(crate) struct GraphicsState {
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
    pub rasterizer: RasterizerState,
    pub topology: PrimitiveTopology,
    pub vertex_layouts: Vec<VertexLayout>,
}

impl From<&GraphicsPipelineDescription> for GraphicsState {
    fn from(desc: &GraphicsPipelineDescription) -> Self {
        Self {
            blend: desc.blend.clone(),
            depth_stencil: desc.depth_stencil,
            rasterizer: desc.rasterizer,
            topology: desc.topology,
            vertex_layouts: desc.vertex_layouts.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct LinkedProgram {
    pub stages: LinkedStages,
    pub interface: ProgramInterface,
    pub graphics: Option<GraphicsState>,
}

// ============================================================================
// Resource access
// ============================================================================

/// A resource resolved for one interface name.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Bound {
    Buffer {
        buffer: u64,
        offset: u64,
        size: u64,
    },
    Texture {
        texture: u64,
        view: Option<u64>,
        /// Sampler attached to the texture unit (GL).
        sampler: Option<SamplerDescription>,
    },
    Sampler(SamplerDescription),
}

/// Interface name to resolved resource.
pub(crate) type Bindings = HashMap<String, Bound>;

enum StoreRef<'a> {
    Shared(&'a Store),
    Exclusive(&'a mut Store),
}

/// Resources visible to a running kernel, addressed by interface name.
///
/// Reads of unbound names return `None`; writes to unbound names, or from
/// graphics stages, are dropped and return `false`.
pub struct ShaderResources<'a> {
    store: StoreRef<'a>,
    bindings: &'a Bindings,
}

impl<'a> ShaderResources<'a> {
    pub(crate) fn shared(store: &'a Store, bindings: &'a Bindings) -> Self {
        Self {
            store: StoreRef::Shared(store),
            bindings,
        }
    }

    pub(crate) fn exclusive(store: &'a mut Store, bindings: &'a Bindings) -> Self {
        Self {
            store: StoreRef::Exclusive(store),
            bindings,
        }
    }

    fn store_ref(&self) -> &Store {
        match &self.store {
            StoreRef::Shared(store) => store,
            StoreRef::Exclusive(store) => store,
        }
    }

    fn store_mut(&mut self) -> Option<&mut Store> {
        match &mut self.store {
            StoreRef::Shared(_) => None,
            StoreRef::Exclusive(store) => Some(store),
        }
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bytes of the buffer window bound to `name`.
    pub fn buffer_bytes(&self, name: &str) -> Option<&[u8]> {
        let Some(Bound::Buffer { buffer, offset, size }) = self.bindings.get(name) else {
            return None;
        };
        let data = &self.store_ref().buffer(*buffer).ok()?.data;
        let start = (*offset as usize).min(data.len());
        let end = start.saturating_add(*size as usize).min(data.len());
        Some(&data[start..end])
    }

    /// First `T` of a uniform block.
    pub fn uniform<T: bytemuck::Pod>(&self, name: &str) -> Option<T> {
        self.read(name, 0)
    }

    /// Element `index` of a buffer viewed as `[T]`.
    pub fn read<T: bytemuck::Pod>(&self, name: &str, index: usize) -> Option<T> {
        let bytes = self.buffer_bytes(name)?;
        let size = std::mem::size_of::<T>();
        let start = index.checked_mul(size)?;
        let chunk = bytes.get(start..start + size)?;
        Some(bytemuck::pod_read_unaligned(chunk))
    }

    /// Number of whole `T` elements in the bound window.
    pub fn element_count<T: bytemuck::Pod>(&self, name: &str) -> usize {
        self.buffer_bytes(name)
            .map_or(0, |bytes| bytes.len() / std::mem::size_of::<T>().max(1))
    }

    /// Write element `index` of a storage buffer viewed as `[T]`.
    pub fn write<T: bytemuck::Pod>(&mut self, name: &str, index: usize, value: T) -> bool {
        let Some(Bound::Buffer { buffer, offset, size }) = self.bindings.get(name).cloned() else {
            return false;
        };
        let element = std::mem::size_of::<T>();
        let Some(start) = index.checked_mul(element) else {
            return false;
        };
        if (start + element) as u64 > size {
            return false;
        }
        let Some(store) = self.store_mut() else {
            return false;
        };
        match store.buffer_mut(buffer) {
            Ok(target) => match target.range_mut(offset + start as u64, element as u64) {
                Ok(bytes) => {
                    bytes.copy_from_slice(bytemuck::bytes_of(&value));
                    true
                }
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    /// Texture, mip and first layer behind `name`.
    fn texture_target(&self, name: &str) -> Option<(u64, u32, u32)> {
        let Some(Bound::Texture { texture, view, .. }) = self.bindings.get(name) else {
            return None;
        };
        match view {
            Some(view) => {
                let view = self.store_ref().view(*view).ok()?;
                Some((view.texture, view.range.base_mip_level, view.range.base_array_layer))
            }
            None => Some((*texture, 0, 0)),
        }
    }

    /// Split `coord` into texel coordinate and layer offset.
    fn locate(texture: &SoftTexture, coord: UVec3) -> (UVec3, u32) {
        if texture.desc.kind == TextureKind::D3 {
            (coord, 0)
        } else {
            (UVec3::new(coord.x, coord.y, 0), coord.z)
        }
    }

    /// Texel fetch. `coord.z` is the depth slice of 3D textures and the
    /// array layer otherwise.
    pub fn load(&self, name: &str, coord: UVec3) -> Option<Vec4> {
        let (id, mip, layer) = self.texture_target(name)?;
        let texture = self.store_ref().texture(id).ok()?;
        let (texel, layer_offset) = Self::locate(texture, coord);
        texture.load(mip, layer + layer_offset, texel)
    }

    /// Texel store into a storage image.
    pub fn store(&mut self, name: &str, coord: UVec3, value: Vec4) -> bool {
        let Some((id, mip, layer)) = self.texture_target(name) else {
            return false;
        };
        let Some(store) = self.store_mut() else {
            return false;
        };
        match store.texture_mut(id) {
            Ok(texture) => {
                let (texel, layer_offset) = Self::locate(texture, coord);
                texture.store(mip, layer + layer_offset, texel, value)
            }
            Err(_) => false,
        }
    }

    /// Extent of the viewed mip.
    pub fn dimensions(&self, name: &str) -> Option<UVec3> {
        let (id, mip, _) = self.texture_target(name)?;
        let extent = self.store_ref().texture(id).ok()?.extent(mip);
        Some(UVec3::new(extent.width, extent.height, extent.depth))
    }

    /// Filtered 2D read at normalized `uv`.
    ///
    /// Uses the sampler bound to `sampler`, falling back to the sampler
    /// attached to the texture's unit, then to point sampling.
    pub fn sample(&self, texture: &str, sampler: &str, uv: Vec2) -> Option<Vec4> {
        let attached = match self.bindings.get(texture) {
            Some(Bound::Texture { sampler, .. }) => sampler.as_ref(),
            _ => None,
        };
        let point = SamplerDescription::point();
        let sampler = match self.bindings.get(sampler) {
            Some(Bound::Sampler(desc)) => desc,
            _ => attached.unwrap_or(&point),
        };
        let (id, mip, layer) = self.texture_target(texture)?;
        let texture = self.store_ref().texture(id).ok()?;
        Some(sample_2d(texture, mip, layer, sampler, uv))
    }
}

fn address(coord: i32, size: u32, mode: AddressMode) -> Option<u32> {
    let n = size.max(1) as i32;
    match mode {
        AddressMode::ClampToEdge => Some(coord.clamp(0, n - 1) as u32),
        AddressMode::Repeat => Some(coord.rem_euclid(n) as u32),
        AddressMode::MirrorRepeat => {
            let m = coord.rem_euclid(2 * n);
            Some(if m < n { m } else { 2 * n - 1 - m } as u32)
        }
        AddressMode::ClampToBorder => (0..n).contains(&coord).then_some(coord as u32),
    }
}

fn sample_2d(texture: &SoftTexture, mip: u32, layer: u32, sampler: &SamplerDescription, uv: Vec2) -> Vec4 {
    let extent = texture.extent(mip);
    let fetch = |x: i32, y: i32| -> Vec4 {
        let x = address(x, extent.width, sampler.address_mode_u);
        let y = address(y, extent.height, sampler.address_mode_v);
        match (x, y) {
            (Some(x), Some(y)) => texture.load(mip, layer, UVec3::new(x, y, 0)).unwrap_or(Vec4::ZERO),
            _ => Vec4::from_array(sampler.border_color.to_array()),
        }
    };

    let position = uv * Vec2::new(extent.width as f32, extent.height as f32);
    match sampler.mag_filter {
        FilterMode::Nearest => {
            let p = position.floor();
            fetch(p.x as i32, p.y as i32)
        }
        FilterMode::Linear => {
            let p = position - 0.5;
            let base = p.floor();
            let t = p - base;
            let (x, y) = (base.x as i32, base.y as i32);
            let top = fetch(x, y).lerp(fetch(x + 1, y), t.x);
            let bottom = fetch(x, y + 1).lerp(fetch(x + 1, y + 1), t.x);
            top.lerp(bottom, t.y)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::memory::{SoftBuffer, SoftObject, SoftTexture};
    use crate::types::{
        BufferDescription, BufferUsage, ComputePipelineDescription, OutputDescription, TextureDescription,
        TextureFormat, TextureUsage,
    };

    fn library() -> KernelLibrary {
        KernelLibrary::new()
            .with_compute("noop", ProgramInterface::new().storage_block("data"), |_, _| {})
            .with_vertex(
                "vs",
                ProgramInterface::new().uniform_block("camera", 64),
                |input, _| VertexOutput::new(input.attribute("position")),
            )
            .with_fragment(
                "fs",
                ProgramInterface::new().uniform_block("camera", 64).texture("albedo"),
                |_, _| Some(Vec4::ONE),
            )
            .with_fragment(
                "fs_conflict",
                ProgramInterface::new().storage_block("camera"),
                |_, _| None,
            )
    }

    #[test]
    fn test_link_compute() {
        let program = library()
            .link(&ComputePipelineDescription::new("noop", [8, 8, 1]).into())
            .unwrap();
        assert!(matches!(program.stages, LinkedStages::Compute { workgroup_size: [8, 8, 1], .. }));
        assert_eq!(program.interface.find("data"), Some((0, InterfaceClass::StorageBlock)));
    }

    #[test]
    fn test_link_merges_stage_interfaces() {
        let desc = GraphicsPipelineDescription::new("vs", "fs", OutputDescription::color(TextureFormat::Rgba8Unorm));
        let program = library().link(&desc.into()).unwrap();
        assert_eq!(program.interface.entries().len(), 2);
        assert_eq!(program.interface.find("albedo"), Some((1, InterfaceClass::Texture)));
        assert!(program.graphics.is_some());
    }

    #[test]
    fn test_link_failures() {
        let lib = library();
        let missing = ComputePipelineDescription::new("absent", [1, 1, 1]);
        assert!(matches!(lib.link(&missing.into()), Err(BackendError::ShaderLinkFailed(_))));

        let wrong_stage = ComputePipelineDescription::new("vs", [1, 1, 1]);
        assert!(matches!(lib.link(&wrong_stage.into()), Err(BackendError::ShaderLinkFailed(_))));

        let conflict = GraphicsPipelineDescription::new(
            "vs",
            "fs_conflict",
            OutputDescription::color(TextureFormat::Rgba8Unorm),
        );
        assert!(matches!(lib.link(&conflict.into()), Err(BackendError::ShaderLinkFailed(_))));
    }

    #[test]
    fn test_resources_read_write_by_name() {
        let mut store = Store::default();
        let buffer = store.insert(SoftObject::Buffer(SoftBuffer::new(&BufferDescription::new(
            64,
            BufferUsage::STRUCTURED_READ_WRITE,
        ))));
        let texture = store.insert(SoftObject::Texture(
            SoftTexture::new(&TextureDescription::new_2d(2, 2, TextureFormat::R32Float, TextureUsage::STORAGE))
                .unwrap(),
        ));
        let mut bindings = Bindings::new();
        bindings.insert("data".into(), Bound::Buffer { buffer, offset: 16, size: 32 });
        bindings.insert(
            "image".into(),
            Bound::Texture {
                texture,
                view: None,
                sampler: None,
            },
        );

        {
            let mut resources = ShaderResources::exclusive(&mut store, &bindings);
            assert!(resources.write("data", 1, 7u32));
            assert!(!resources.write("data", 8, 7u32));
            assert!(!resources.write("missing", 0, 7u32));
            assert!(resources.store("image", UVec3::new(1, 0, 0), Vec4::splat(2.5)));
            assert_eq!(resources.element_count::<u32>("data"), 8);
        }

        let resources = ShaderResources::shared(&store, &bindings);
        assert_eq!(resources.read::<u32>("data", 1), Some(7));
        assert_eq!(resources.load("image", UVec3::new(1, 0, 0)).map(|v| v.x), Some(2.5));
        assert_eq!(resources.dimensions("image"), Some(UVec3::new(2, 2, 1)));
        assert_eq!(store.buffer(buffer).unwrap().data[20..24], 7u32.to_le_bytes());
    }

    #[test]
    fn test_shared_resources_drop_writes() {
        let mut store = Store::default();
        let buffer = store.insert(SoftObject::Buffer(SoftBuffer::new(&BufferDescription::new(
            16,
            BufferUsage::STRUCTURED_READ_WRITE,
        ))));
        let mut bindings = Bindings::new();
        bindings.insert("data".into(), Bound::Buffer { buffer, offset: 0, size: 16 });
        let mut resources = ShaderResources::shared(&store, &bindings);
        assert!(!resources.write("data", 0, 1u32));
    }

    #[test]
    fn test_address_modes() {
        assert_eq!(address(-1, 4, AddressMode::ClampToEdge), Some(0));
        assert_eq!(address(5, 4, AddressMode::Repeat), Some(1));
        assert_eq!(address(4, 4, AddressMode::MirrorRepeat), Some(3));
        assert_eq!(address(4, 4, AddressMode::ClampToBorder), None);
    }
}
