//! Resource layout descriptions.

use bitflags::bitflags;

use super::ShaderStages;

/// Kind of resource bound at a layout slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    UniformBuffer,
    StructuredBufferReadOnly,
    StructuredBufferReadWrite,
    TextureReadOnly,
    TextureReadWrite,
    Sampler,
}

impl ResourceKind {
    /// Buffer-backed kinds.
    pub fn is_buffer(&self) -> bool {
        matches!(
            self,
            Self::UniformBuffer | Self::StructuredBufferReadOnly | Self::StructuredBufferReadWrite
        )
    }

    /// Texture-backed kinds.
    pub fn is_texture(&self) -> bool {
        matches!(self, Self::TextureReadOnly | Self::TextureReadWrite)
    }
}

bitflags! {
    /// Per-element options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ElementOptions: u32 {
        /// The binding offset is supplied at `set_resource_set` time.
        const DYNAMIC_BINDING = 1 << 0;
    }
}

impl Default for ElementOptions {
    fn default() -> Self {
        Self::empty()
    }
}

/// One slot of a resource layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLayoutElement {
    /// Name the shader uses for this resource.
    pub name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Stages the resource is visible to.
    pub stages: ShaderStages,
    /// Extra options.
    pub options: ElementOptions,
}

impl ResourceLayoutElement {
    /// Create a new element.
    pub fn new(name: impl Into<String>, kind: ResourceKind, stages: ShaderStages) -> Self {
        Self {
            name: name.into(),
            kind,
            stages,
            options: ElementOptions::empty(),
        }
    }

    /// Mark the element as taking a dynamic offset.
    pub fn dynamic(mut self) -> Self {
        self.options |= ElementOptions::DYNAMIC_BINDING;
        self
    }

    /// Whether the element takes a dynamic offset.
    pub fn is_dynamic(&self) -> bool {
        self.options.contains(ElementOptions::DYNAMIC_BINDING)
    }
}

/// Ordered sequence of layout elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResourceLayoutDescription {
    /// Debug label.
    pub label: Option<String>,
    /// Elements in slot order.
    pub elements: Vec<ResourceLayoutElement>,
}

impl ResourceLayoutDescription {
    /// Create a description from elements.
    pub fn new(elements: Vec<ResourceLayoutElement>) -> Self {
        Self {
            label: None,
            elements,
        }
    }

    /// Append an element.
    pub fn with_element(mut self, element: ResourceLayoutElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Number of elements taking dynamic offsets.
    pub fn dynamic_count(&self) -> usize {
        self.elements.iter().filter(|e| e.is_dynamic()).count()
    }

    /// Structural equality: same kinds, stages and options in the same order.
    ///
    /// Labels and element names do not participate.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.elements.len() == other.elements.len()
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(a, b)| a.kind == b.kind && a.stages == b.stages && a.options == b.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(kinds: &[ResourceKind]) -> ResourceLayoutDescription {
        ResourceLayoutDescription::new(
            kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| ResourceLayoutElement::new(format!("r{i}"), *kind, ShaderStages::COMPUTE))
                .collect(),
        )
    }

    #[test]
    fn test_compatibility_is_structural() {
        let a = layout(&[ResourceKind::UniformBuffer, ResourceKind::TextureReadOnly]);
        let mut b = a.clone();
        b.elements[0].name = "renamed".into();
        assert!(a.is_compatible(&b));

        let c = layout(&[ResourceKind::UniformBuffer, ResourceKind::Sampler]);
        assert!(!a.is_compatible(&c));

        let d = layout(&[ResourceKind::UniformBuffer]);
        assert!(!a.is_compatible(&d));
    }

    #[test]
    fn test_dynamic_count() {
        let mut desc = layout(&[ResourceKind::UniformBuffer, ResourceKind::StructuredBufferReadOnly]);
        assert_eq!(desc.dynamic_count(), 0);
        desc.elements[1] = desc.elements[1].clone().dynamic();
        assert_eq!(desc.dynamic_count(), 1);
        assert!(!desc.is_compatible(&layout(&[
            ResourceKind::UniformBuffer,
            ResourceKind::StructuredBufferReadOnly
        ])));
    }
}
