//! Binding assignment by program reflection (OpenGL).
//!
//! The context backend has no binding model of its own: every layout element
//! is looked up by name in the linked program and then given a binding
//! point. Counters run across the whole pipeline:
//!
//! | Element | Lookup | Assignment |
//! |---|---|---|
//! | `UniformBuffer` | uniform block index + size | next uniform binding |
//! | `TextureReadOnly` | uniform location | next texture unit |
//! | `TextureReadWrite` | uniform location | next image unit |
//! | `StructuredBuffer*` | storage block index | next storage binding |
//! | `Sampler` | none | texture units opened since the previous sampler |

use std::collections::HashMap;

use crate::config::ValidationMode;
use crate::error::{HalResult, UsageError};
use crate::native::{GlContext, RawProgram};
use crate::types::{ResourceKind, ResourceLayoutElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lookup {
    UniformBlock,
    Uniform,
    StorageBlock,
}

/// Memoized `(program, name) -> handle` lookups.
pub(crate) struct ProgramReflector<'a> {
    ctx: &'a mut dyn GlContext,
    program: RawProgram,
    cache: HashMap<(Lookup, String), Option<u32>>,
}

impl<'a> ProgramReflector<'a> {
    pub fn new(ctx: &'a mut dyn GlContext, program: RawProgram) -> Self {
        Self {
            ctx,
            program,
            cache: HashMap::new(),
        }
    }

    fn lookup(&mut self, lookup: Lookup, name: &str) -> Option<u32> {
        let key = (lookup, name.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return *hit;
        }
        let resolved = match lookup {
            Lookup::UniformBlock => self.ctx.uniform_block_index(self.program, name),
            Lookup::Uniform => self.ctx.uniform_location(self.program, name),
            Lookup::StorageBlock => self.ctx.storage_block_index(self.program, name),
        };
        self.cache.insert(key, resolved);
        resolved
    }

    pub fn uniform_block(&mut self, name: &str) -> Option<u32> {
        self.lookup(Lookup::UniformBlock, name)
    }

    pub fn uniform(&mut self, name: &str) -> Option<u32> {
        self.lookup(Lookup::Uniform, name)
    }

    pub fn storage_block(&mut self, name: &str) -> Option<u32> {
        self.lookup(Lookup::StorageBlock, name)
    }

    /// Number of distinct lookups issued against the context.
    pub fn lookup_count(&self) -> usize {
        self.cache.len()
    }

    fn context(&mut self) -> &mut dyn GlContext {
        &mut *self.ctx
    }
}

/// Uniform block binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GlUniformBinding {
    pub binding: u32,
    /// Size the program declares for the block.
    pub block_size: u32,
}

/// Texture unit kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GlTextureBinding {
    Sampled { unit: u32 },
    Image { unit: u32 },
}

/// Bindings of one layout, keyed by element index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct GlSetBindings {
    pub uniforms: HashMap<usize, GlUniformBinding>,
    pub textures: HashMap<usize, GlTextureBinding>,
    /// Texture units each sampler applies to.
    pub samplers: HashMap<usize, Vec<u32>>,
    pub storage: HashMap<usize, u32>,
}

/// Realized program with its binding tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GlBindings {
    pub program: RawProgram,
    pub sets: Vec<GlSetBindings>,
}

#[derive(Default)]
struct Counters {
    uniform_binding: u32,
    texture_unit: u32,
    image_unit: u32,
    storage_binding: u32,
}

/// Resolve and assign every element of every layout against `program`.
///
/// In strict mode the first unresolved name fails with
/// [`UsageError::UnresolvedBinding`]; in lenient mode it is logged and the
/// element is left unbound.
pub(crate) fn reflect_bindings<'a>(
    ctx: &mut dyn GlContext,
    program: RawProgram,
    layouts: impl IntoIterator<Item = &'a [ResourceLayoutElement]>,
    mode: ValidationMode,
) -> HalResult<GlBindings> {
    crate::profile_scope!("reflect_bindings");

    let mut reflector = ProgramReflector::new(ctx, program);
    let mut counters = Counters::default();
    let mut sets = Vec::new();

    for elements in layouts {
        let mut set = GlSetBindings::default();
        let mut open_units = Vec::new();

        for (index, element) in elements.iter().enumerate() {
            let name = element.name.as_str();
            let resolved = match element.kind {
                ResourceKind::UniformBuffer => reflector.uniform_block(name).map(|block| {
                    let binding = counters.uniform_binding;
                    counters.uniform_binding += 1;
                    let ctx = reflector.context();
                    let block_size = ctx.uniform_block_size(program, block);
                    ctx.uniform_block_binding(program, block, binding);
                    set.uniforms.insert(index, GlUniformBinding { binding, block_size });
                }),
                ResourceKind::TextureReadOnly => reflector.uniform(name).map(|location| {
                    let unit = counters.texture_unit;
                    counters.texture_unit += 1;
                    reflector.context().set_sampler_unit(program, location, unit);
                    set.textures.insert(index, GlTextureBinding::Sampled { unit });
                    open_units.push(unit);
                }),
                ResourceKind::TextureReadWrite => reflector.uniform(name).map(|location| {
                    let unit = counters.image_unit;
                    counters.image_unit += 1;
                    reflector.context().set_image_unit(program, location, unit);
                    set.textures.insert(index, GlTextureBinding::Image { unit });
                }),
                ResourceKind::StructuredBufferReadOnly | ResourceKind::StructuredBufferReadWrite => {
                    reflector.storage_block(name).map(|block| {
                        let binding = counters.storage_binding;
                        counters.storage_binding += 1;
                        reflector.context().storage_block_binding(program, block, binding);
                        set.storage.insert(index, binding);
                    })
                }
                ResourceKind::Sampler => {
                    set.samplers.insert(index, std::mem::take(&mut open_units));
                    Some(())
                }
            };

            if resolved.is_none() {
                match mode {
                    ValidationMode::Lenient => {
                        log::warn!("Binding `{name}` ({:?}) not found in program; leaving it unbound", element.kind);
                    }
                    ValidationMode::Strict => {
                        let available = reflector.context().active_resource_names(program);
                        return Err(UsageError::UnresolvedBinding {
                            name: name.to_string(),
                            available,
                        }
                        .into());
                    }
                }
            }
        }
        sets.push(set);
    }

    log::debug!(
        "Reflected program {:?}: {} sets, {} lookups",
        program,
        sets.len(),
        reflector.lookup_count()
    );
    Ok(GlBindings { program, sets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HalError;
    use crate::soft::{KernelLibrary, ProgramInterface, SoftGpu};
    use crate::types::{ComputePipelineDescription, ShaderStages};

    fn context() -> (Box<dyn GlContext>, RawProgram) {
        let interface = ProgramInterface::new()
            .uniform_block("params", 16)
            .texture("albedo")
            .texture("normals")
            .sampler("material_sampler")
            .image("output")
            .storage_block("particles");
        let gpu = SoftGpu::new(KernelLibrary::new().with_compute("reflect", interface, |_, _| {}));
        let mut ctx = gpu.gl_context();
        let program = ctx
            .create_program(&ComputePipelineDescription::new("reflect", [1, 1, 1]).into())
            .unwrap();
        (ctx, program)
    }

    fn element(name: &str, kind: ResourceKind) -> ResourceLayoutElement {
        ResourceLayoutElement::new(name, kind, ShaderStages::COMPUTE)
    }

    #[test]
    fn test_counters_run_across_layouts() {
        let (mut ctx, program) = context();
        let first = vec![
            element("params", ResourceKind::UniformBuffer),
            element("albedo", ResourceKind::TextureReadOnly),
            element("normals", ResourceKind::TextureReadOnly),
            element("material_sampler", ResourceKind::Sampler),
        ];
        let second = vec![
            element("output", ResourceKind::TextureReadWrite),
            element("particles", ResourceKind::StructuredBufferReadWrite),
        ];

        let bindings = reflect_bindings(
            ctx.as_mut(),
            program,
            [first.as_slice(), second.as_slice()],
            ValidationMode::Strict,
        )
        .unwrap();

        assert_eq!(bindings.sets.len(), 2);
        let set = &bindings.sets[0];
        assert_eq!(set.uniforms[&0], GlUniformBinding { binding: 0, block_size: 16 });
        assert_eq!(set.textures[&1], GlTextureBinding::Sampled { unit: 0 });
        assert_eq!(set.textures[&2], GlTextureBinding::Sampled { unit: 1 });
        assert_eq!(set.samplers[&3], vec![0, 1]);

        let set = &bindings.sets[1];
        assert_eq!(set.textures[&0], GlTextureBinding::Image { unit: 0 });
        assert_eq!(set.storage[&1], 0);
    }

    #[test]
    fn test_sampler_takes_only_units_opened_since_previous_sampler() {
        let (mut ctx, program) = context();
        let elements = vec![
            element("albedo", ResourceKind::TextureReadOnly),
            element("material_sampler", ResourceKind::Sampler),
            element("normals", ResourceKind::TextureReadOnly),
            element("material_sampler", ResourceKind::Sampler),
            element("material_sampler", ResourceKind::Sampler),
        ];
        let bindings =
            reflect_bindings(ctx.as_mut(), program, [elements.as_slice()], ValidationMode::Strict).unwrap();
        let set = &bindings.sets[0];
        assert_eq!(set.samplers[&1], vec![0]);
        assert_eq!(set.samplers[&3], vec![1]);
        assert!(set.samplers[&4].is_empty());
    }

    #[test]
    fn test_unresolved_name_strict_lists_active_resources() {
        let (mut ctx, program) = context();
        let elements = vec![element("missing", ResourceKind::UniformBuffer)];
        let err = reflect_bindings(ctx.as_mut(), program, [elements.as_slice()], ValidationMode::Strict).unwrap_err();
        match err {
            HalError::Usage(UsageError::UnresolvedBinding { name, available }) => {
                assert_eq!(name, "missing");
                assert!(available.contains(&"params".to_string()));
                assert!(!available.contains(&"material_sampler".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unresolved_name_lenient_leaves_element_unbound() {
        let (mut ctx, program) = context();
        let elements = vec![
            element("missing", ResourceKind::UniformBuffer),
            element("params", ResourceKind::UniformBuffer),
        ];
        let bindings =
            reflect_bindings(ctx.as_mut(), program, [elements.as_slice()], ValidationMode::Lenient).unwrap();
        let set = &bindings.sets[0];
        assert!(!set.uniforms.contains_key(&0));
        assert_eq!(set.uniforms[&1].binding, 0);
    }

    #[test]
    fn test_class_mismatch_does_not_resolve() {
        let (mut ctx, program) = context();
        // A storage block is not a uniform block.
        let elements = vec![element("particles", ResourceKind::UniformBuffer)];
        let result = reflect_bindings(ctx.as_mut(), program, [elements.as_slice()], ValidationMode::Strict);
        assert!(result.is_err());
    }

    #[test]
    fn test_lookups_are_memoized() {
        let (mut ctx, program) = context();
        let mut reflector = ProgramReflector::new(ctx.as_mut(), program);
        assert_eq!(reflector.uniform("albedo"), Some(1));
        assert_eq!(reflector.uniform("albedo"), Some(1));
        assert_eq!(reflector.storage_block("albedo"), None);
        assert_eq!(reflector.lookup_count(), 2);
    }
}
