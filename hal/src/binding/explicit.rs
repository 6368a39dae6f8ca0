//! Static slot assignment for explicit backends.
//!
//! Explicit backends know every binding point up front, so translation is a
//! single walk over the pipeline's layouts in set order, element order.

use crate::config::BackendKind;
use crate::native::{ArgumentClass, NativeBindingDecl, NativeSlot, RegisterClass};
use crate::types::{ResourceKind, ResourceLayoutElement};

/// How an explicit backend addresses bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotModel {
    /// `{set, binding}` descriptors.
    Descriptor,
    /// Per-class argument tables.
    Argument,
    /// Per-class register files.
    Register,
}

impl SlotModel {
    /// `None` for backends that resolve bindings by reflection.
    pub fn for_backend(kind: BackendKind) -> Option<Self> {
        match kind {
            BackendKind::Vulkan => Some(Self::Descriptor),
            BackendKind::Metal => Some(Self::Argument),
            BackendKind::Direct3D11 => Some(Self::Register),
            BackendKind::OpenGl => None,
        }
    }
}

/// Translated binding points of one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ExplicitBindings {
    /// `sets[set][element]`.
    pub sets: Vec<Vec<NativeSlot>>,
    /// Flat declaration list handed to pipeline creation.
    pub decls: Vec<NativeBindingDecl>,
}

impl ExplicitBindings {
    pub fn slot(&self, set: usize, element: usize) -> Option<NativeSlot> {
        self.sets.get(set).and_then(|slots| slots.get(element)).copied()
    }
}

#[derive(Default)]
struct Counters {
    buffers: u32,
    textures: u32,
    samplers: u32,
    constant_buffers: u32,
    shader_resources: u32,
    unordered_access: u32,
}

impl Counters {
    fn next(counter: &mut u32) -> u32 {
        let index = *counter;
        *counter += 1;
        index
    }

    fn argument(&mut self, kind: ResourceKind) -> NativeSlot {
        let (class, index) = match kind {
            ResourceKind::UniformBuffer
            | ResourceKind::StructuredBufferReadOnly
            | ResourceKind::StructuredBufferReadWrite => (ArgumentClass::Buffer, Self::next(&mut self.buffers)),
            ResourceKind::TextureReadOnly | ResourceKind::TextureReadWrite => {
                (ArgumentClass::Texture, Self::next(&mut self.textures))
            }
            ResourceKind::Sampler => (ArgumentClass::Sampler, Self::next(&mut self.samplers)),
        };
        NativeSlot::Argument { class, index }
    }

    fn register(&mut self, kind: ResourceKind) -> NativeSlot {
        let (class, index) = match kind {
            ResourceKind::UniformBuffer => {
                (RegisterClass::ConstantBuffer, Self::next(&mut self.constant_buffers))
            }
            ResourceKind::TextureReadOnly | ResourceKind::StructuredBufferReadOnly => {
                (RegisterClass::ShaderResource, Self::next(&mut self.shader_resources))
            }
            ResourceKind::Sampler => (RegisterClass::Sampler, Self::next(&mut self.samplers)),
            ResourceKind::TextureReadWrite | ResourceKind::StructuredBufferReadWrite => {
                (RegisterClass::UnorderedAccess, Self::next(&mut self.unordered_access))
            }
        };
        NativeSlot::Register { class, index }
    }
}

/// Assign a native slot to every element of every layout.
pub(crate) fn translate<'a>(
    model: SlotModel,
    layouts: impl IntoIterator<Item = &'a [ResourceLayoutElement]>,
) -> ExplicitBindings {
    crate::profile_scope!("translate_bindings");

    let mut counters = Counters::default();
    let mut bindings = ExplicitBindings::default();

    for (set, elements) in layouts.into_iter().enumerate() {
        let mut slots = Vec::with_capacity(elements.len());
        for (binding, element) in elements.iter().enumerate() {
            let slot = match model {
                SlotModel::Descriptor => NativeSlot::Descriptor {
                    set: set as u32,
                    binding: binding as u32,
                },
                SlotModel::Argument => counters.argument(element.kind),
                SlotModel::Register => counters.register(element.kind),
            };
            slots.push(slot);
            bindings.decls.push(NativeBindingDecl {
                name: element.name.clone(),
                kind: element.kind,
                stages: element.stages,
                slot,
            });
        }
        bindings.sets.push(slots);
    }

    log::trace!(
        "Translated {} bindings across {} sets ({model:?})",
        bindings.decls.len(),
        bindings.sets.len()
    );
    bindings
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::types::ShaderStages;

    fn element(name: &str, kind: ResourceKind) -> ResourceLayoutElement {
        ResourceLayoutElement::new(name, kind, ShaderStages::GRAPHICS)
    }

    fn layouts() -> Vec<Vec<ResourceLayoutElement>> {
        vec![
            vec![
                element("Camera", ResourceKind::UniformBuffer),
                element("Albedo", ResourceKind::TextureReadOnly),
                element("AlbedoSampler", ResourceKind::Sampler),
            ],
            vec![
                element("Lights", ResourceKind::StructuredBufferReadOnly),
                element("Output", ResourceKind::TextureReadWrite),
                element("Counters", ResourceKind::StructuredBufferReadWrite),
                element("Material", ResourceKind::UniformBuffer),
            ],
        ]
    }

    fn translate_all(model: SlotModel) -> ExplicitBindings {
        let layouts = layouts();
        translate(model, layouts.iter().map(Vec::as_slice))
    }

    #[test]
    fn test_descriptor_slots_follow_set_and_element() {
        let bindings = translate_all(SlotModel::Descriptor);
        assert_eq!(bindings.sets.len(), 2);
        assert_eq!(bindings.slot(1, 2), Some(NativeSlot::Descriptor { set: 1, binding: 2 }));
        assert_eq!(bindings.decls.len(), 7);
        assert_eq!(bindings.decls[3].name, "Lights");
    }

    #[rstest]
    #[case::camera(0, 0, ArgumentClass::Buffer, 0)]
    #[case::albedo(0, 1, ArgumentClass::Texture, 0)]
    #[case::sampler(0, 2, ArgumentClass::Sampler, 0)]
    #[case::lights(1, 0, ArgumentClass::Buffer, 1)]
    #[case::output(1, 1, ArgumentClass::Texture, 1)]
    #[case::counters(1, 2, ArgumentClass::Buffer, 2)]
    #[case::material(1, 3, ArgumentClass::Buffer, 3)]
    fn test_argument_indices_count_across_sets(
        #[case] set: usize,
        #[case] element: usize,
        #[case] class: ArgumentClass,
        #[case] index: u32,
    ) {
        let bindings = translate_all(SlotModel::Argument);
        assert_eq!(bindings.slot(set, element), Some(NativeSlot::Argument { class, index }));
    }

    #[rstest]
    #[case::camera(0, 0, "b0")]
    #[case::albedo(0, 1, "t0")]
    #[case::sampler(0, 2, "s0")]
    #[case::lights(1, 0, "t1")]
    #[case::output(1, 1, "u0")]
    #[case::counters(1, 2, "u1")]
    #[case::material(1, 3, "b1")]
    fn test_register_classes(#[case] set: usize, #[case] element: usize, #[case] register: &str) {
        let bindings = translate_all(SlotModel::Register);
        let slot = bindings.slot(set, element).unwrap();
        assert_eq!(slot.to_string(), register);
    }

    #[test]
    fn test_backend_models() {
        assert_eq!(SlotModel::for_backend(BackendKind::Vulkan), Some(SlotModel::Descriptor));
        assert_eq!(SlotModel::for_backend(BackendKind::Metal), Some(SlotModel::Argument));
        assert_eq!(SlotModel::for_backend(BackendKind::Direct3D11), Some(SlotModel::Register));
        assert_eq!(SlotModel::for_backend(BackendKind::OpenGl), None);
    }
}
