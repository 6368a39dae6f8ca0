//! Pipeline descriptions.
//!
//! Descriptions are pure data. Two descriptions that compare equal produce
//! interchangeable pipelines, which is what the device pipeline cache relies
//! on.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use bitflags::bitflags;

use super::{Color, ShaderStages, TextureFormat};
use crate::resources::ResourceLayout;

// ============================================================================
// Shaders
// ============================================================================

/// One shader stage of a pipeline.
///
/// `bytecode` is opaque to the HAL and handed to the backend unchanged; the
/// backend locates the stage by `entry_point`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDescription {
    pub stage: ShaderStages,
    pub entry_point: String,
    pub bytecode: Arc<[u8]>,
}

impl ShaderDescription {
    /// Create a shader description without bytecode.
    pub fn new(stage: ShaderStages, entry_point: impl Into<String>) -> Self {
        Self {
            stage,
            entry_point: entry_point.into(),
            bytecode: Arc::from(Vec::new()),
        }
    }

    /// Attach backend bytecode.
    pub fn with_bytecode(mut self, bytecode: impl Into<Arc<[u8]>>) -> Self {
        self.bytecode = bytecode.into();
        self
    }
}

// ============================================================================
// Vertex input
// ============================================================================

/// Format of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementFormat {
    Float1,
    Float2,
    Float3,
    Float4,
    UInt1,
    UInt2,
    UInt4,
    Byte4Norm,
}

impl VertexElementFormat {
    /// Size in bytes.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float1 | Self::UInt1 | Self::Byte4Norm => 4,
            Self::Float2 | Self::UInt2 => 8,
            Self::Float3 => 12,
            Self::Float4 | Self::UInt4 => 16,
        }
    }
}

/// One attribute within a vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub name: String,
    pub format: VertexElementFormat,
    pub offset: u32,
}

/// Layout of one bound vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub stride: u32,
    pub elements: Vec<VertexElement>,
    /// Zero for per-vertex data, otherwise instances per element.
    pub instance_step_rate: u32,
}

impl VertexLayout {
    /// Packed per-vertex layout with offsets computed from element sizes.
    pub fn packed(elements: &[(&str, VertexElementFormat)]) -> Self {
        let mut offset = 0;
        let elements = elements
            .iter()
            .map(|(name, format)| {
                let element = VertexElement {
                    name: (*name).to_string(),
                    format: *format,
                    offset,
                };
                offset += format.size();
                element
            })
            .collect();
        Self {
            stride: offset,
            elements,
            instance_step_rate: 0,
        }
    }
}

// ============================================================================
// Fixed-function state
// ============================================================================

/// Blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SourceAlpha,
    InverseSourceAlpha,
    DestinationAlpha,
    InverseDestinationAlpha,
    SourceColor,
    InverseSourceColor,
    DestinationColor,
    InverseDestinationColor,
    BlendFactor,
    InverseBlendFactor,
}

/// Blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Minimum,
    Maximum,
}

bitflags! {
    /// Channels written to a color target.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = 0b1111;
    }
}

/// Blend settings for one color target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendAttachment {
    pub enabled: bool,
    pub write_mask: ColorWriteMask,
    pub source_color: BlendFactor,
    pub destination_color: BlendFactor,
    pub color_operation: BlendOperation,
    pub source_alpha: BlendFactor,
    pub destination_alpha: BlendFactor,
    pub alpha_operation: BlendOperation,
}

impl BlendAttachment {
    /// Source replaces destination.
    pub const OVERRIDE: Self = Self {
        enabled: false,
        write_mask: ColorWriteMask::ALL,
        source_color: BlendFactor::One,
        destination_color: BlendFactor::Zero,
        color_operation: BlendOperation::Add,
        source_alpha: BlendFactor::One,
        destination_alpha: BlendFactor::Zero,
        alpha_operation: BlendOperation::Add,
    };

    /// Classic `src * a + dst * (1 - a)`.
    pub const ALPHA_BLEND: Self = Self {
        enabled: true,
        write_mask: ColorWriteMask::ALL,
        source_color: BlendFactor::SourceAlpha,
        destination_color: BlendFactor::InverseSourceAlpha,
        color_operation: BlendOperation::Add,
        source_alpha: BlendFactor::SourceAlpha,
        destination_alpha: BlendFactor::InverseSourceAlpha,
        alpha_operation: BlendOperation::Add,
    };

    /// `src + dst`.
    pub const ADDITIVE: Self = Self {
        enabled: true,
        write_mask: ColorWriteMask::ALL,
        source_color: BlendFactor::One,
        destination_color: BlendFactor::One,
        color_operation: BlendOperation::Add,
        source_alpha: BlendFactor::One,
        destination_alpha: BlendFactor::One,
        alpha_operation: BlendOperation::Add,
    };
}

/// Blend state for all color targets.
#[derive(Debug, Clone, PartialEq, Hash)]
pub struct BlendState {
    /// Constant used by [`BlendFactor::BlendFactor`].
    pub blend_factor: Color,
    /// One entry per color target. A single entry applies to all targets.
    pub attachments: Vec<BlendAttachment>,
}

impl Eq for BlendState {}

impl BlendState {
    /// Single overriding attachment.
    pub fn single_override() -> Self {
        Self {
            blend_factor: Color::TRANSPARENT,
            attachments: vec![BlendAttachment::OVERRIDE],
        }
    }

    /// Single alpha-blended attachment.
    pub fn single_alpha_blend() -> Self {
        Self {
            blend_factor: Color::TRANSPARENT,
            attachments: vec![BlendAttachment::ALPHA_BLEND],
        }
    }

    /// Attachment settings for a target index.
    pub fn attachment(&self, index: usize) -> BlendAttachment {
        self.attachments
            .get(index)
            .or_else(|| self.attachments.first())
            .copied()
            .unwrap_or(BlendAttachment::OVERRIDE)
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::single_override()
    }
}

/// Depth comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComparisonKind {
    Never,
    Less,
    Equal,
    #[default]
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl ComparisonKind {
    /// Evaluate `value <op> reference`.
    pub fn passes(&self, value: f32, reference: f32) -> bool {
        match self {
            Self::Never => false,
            Self::Less => value < reference,
            Self::Equal => value == reference,
            Self::LessEqual => value <= reference,
            Self::Greater => value > reference,
            Self::NotEqual => value != reference,
            Self::GreaterEqual => value >= reference,
            Self::Always => true,
        }
    }
}

/// Depth test and write state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub comparison: ComparisonKind,
}

impl DepthStencilState {
    /// No depth test, no depth write.
    pub const DISABLED: Self = Self {
        depth_test: false,
        depth_write: false,
        comparison: ComparisonKind::Always,
    };

    /// Test and write with `LessEqual`.
    pub const LESS_EQUAL: Self = Self {
        depth_test: true,
        depth_write: true,
        comparison: ComparisonKind::LessEqual,
    };
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self::DISABLED
    }
}

/// Triangle culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

/// Winding considered front-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    Clockwise,
    #[default]
    CounterClockwise,
}

/// Polygon fill mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonFill {
    #[default]
    Solid,
    Wireframe,
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub fill: PolygonFill,
    pub depth_clip: bool,
    pub scissor_test: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            fill: PolygonFill::Solid,
            depth_clip: true,
            scissor_test: false,
        }
    }
}

/// Primitive assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
}

/// Formats a pipeline renders into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct OutputDescription {
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    pub sample_count: u32,
}

impl OutputDescription {
    /// Single color target without depth.
    pub fn color(format: TextureFormat) -> Self {
        Self {
            color_formats: vec![format],
            depth_format: None,
            sample_count: 1,
        }
    }

    /// Add a depth target.
    pub fn with_depth(mut self, format: TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }
}

// ============================================================================
// Pipelines
// ============================================================================

/// Description of a graphics pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineDescription {
    pub label: Option<String>,
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
    pub rasterizer: RasterizerState,
    pub topology: PrimitiveTopology,
    pub vertex_layouts: Vec<VertexLayout>,
    pub shaders: Vec<ShaderDescription>,
    pub resource_layouts: Vec<Arc<ResourceLayout>>,
    pub outputs: OutputDescription,
}

impl GraphicsPipelineDescription {
    /// Vertex + fragment pipeline with default fixed-function state.
    pub fn new(
        vertex_entry: impl Into<String>,
        fragment_entry: impl Into<String>,
        outputs: OutputDescription,
    ) -> Self {
        Self {
            label: None,
            blend: BlendState::default(),
            depth_stencil: DepthStencilState::default(),
            rasterizer: RasterizerState::default(),
            topology: PrimitiveTopology::TriangleList,
            vertex_layouts: Vec::new(),
            shaders: vec![
                ShaderDescription::new(ShaderStages::VERTEX, vertex_entry),
                ShaderDescription::new(ShaderStages::FRAGMENT, fragment_entry),
            ],
            resource_layouts: Vec::new(),
            outputs,
        }
    }

    /// Append a resource layout (next set index).
    pub fn with_resource_layout(mut self, layout: Arc<ResourceLayout>) -> Self {
        self.resource_layouts.push(layout);
        self
    }

    /// Append a vertex buffer layout.
    pub fn with_vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layouts.push(layout);
        self
    }

    /// Set the blend state.
    pub fn with_blend(mut self, blend: BlendState) -> Self {
        self.blend = blend;
        self
    }

    /// Set the depth state.
    pub fn with_depth_stencil(mut self, state: DepthStencilState) -> Self {
        self.depth_stencil = state;
        self
    }

    /// Set the rasterizer state.
    pub fn with_rasterizer(mut self, state: RasterizerState) -> Self {
        self.rasterizer = state;
        self
    }

    /// Set the primitive topology.
    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Description of a compute pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineDescription {
    pub label: Option<String>,
    pub shader: ShaderDescription,
    pub resource_layouts: Vec<Arc<ResourceLayout>>,
    pub workgroup_size: [u32; 3],
}

impl ComputePipelineDescription {
    /// Create a compute pipeline description.
    pub fn new(entry_point: impl Into<String>, workgroup_size: [u32; 3]) -> Self {
        Self {
            label: None,
            shader: ShaderDescription::new(ShaderStages::COMPUTE, entry_point),
            resource_layouts: Vec::new(),
            workgroup_size,
        }
    }

    /// Append a resource layout (next set index).
    pub fn with_resource_layout(mut self, layout: Arc<ResourceLayout>) -> Self {
        self.resource_layouts.push(layout);
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Either pipeline kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineDescription {
    Graphics(GraphicsPipelineDescription),
    Compute(ComputePipelineDescription),
}

impl PipelineDescription {
    /// Resource layouts in set order.
    pub fn resource_layouts(&self) -> &[Arc<ResourceLayout>] {
        match self {
            Self::Graphics(desc) => &desc.resource_layouts,
            Self::Compute(desc) => &desc.resource_layouts,
        }
    }

    /// Debug label.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Graphics(desc) => desc.label.as_deref(),
            Self::Compute(desc) => desc.label.as_deref(),
        }
    }

    /// Whether this is a compute pipeline.
    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Compute(_))
    }

    /// Shader stages in declaration order.
    pub fn shaders(&self) -> &[ShaderDescription] {
        match self {
            Self::Graphics(desc) => &desc.shaders,
            Self::Compute(desc) => std::slice::from_ref(&desc.shader),
        }
    }

    /// Hash used as the pipeline cache key.
    pub fn cache_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl From<GraphicsPipelineDescription> for PipelineDescription {
    fn from(desc: GraphicsPipelineDescription) -> Self {
        Self::Graphics(desc)
    }
}

impl From<ComputePipelineDescription> for PipelineDescription {
    fn from(desc: ComputePipelineDescription) -> Self {
        Self::Compute(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_vertex_layout() {
        let layout = VertexLayout::packed(&[
            ("position", VertexElementFormat::Float3),
            ("color", VertexElementFormat::Byte4Norm),
            ("uv", VertexElementFormat::Float2),
        ]);
        assert_eq!(layout.stride, 24);
        assert_eq!(layout.elements[1].offset, 12);
        assert_eq!(layout.elements[2].offset, 16);
    }

    #[test]
    fn test_comparison() {
        assert!(ComparisonKind::Less.passes(0.2, 0.5));
        assert!(!ComparisonKind::Less.passes(0.5, 0.5));
        assert!(ComparisonKind::LessEqual.passes(0.5, 0.5));
        assert!(!ComparisonKind::Never.passes(0.0, 1.0));
    }

    #[test]
    fn test_cache_key_stable_for_equal_descriptions() {
        let a = PipelineDescription::from(ComputePipelineDescription::new("fill", [16, 16, 1]));
        let b = PipelineDescription::from(ComputePipelineDescription::new("fill", [16, 16, 1]));
        let c = PipelineDescription::from(ComputePipelineDescription::new("fill", [8, 8, 1]));
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a, c);
    }

    #[test]
    fn test_blend_attachment_fallback() {
        let blend = BlendState::single_alpha_blend();
        assert_eq!(blend.attachment(3), BlendAttachment::ALPHA_BLEND);
    }
}
