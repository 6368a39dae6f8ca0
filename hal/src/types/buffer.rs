//! Buffer types and descriptions.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex input.
        const VERTEX = 1 << 0;
        /// Index input.
        const INDEX = 1 << 1;
        /// Bound as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Bound as a read-only structured buffer.
        const STRUCTURED_READ_ONLY = 1 << 3;
        /// Bound as a read-write structured buffer.
        const STRUCTURED_READ_WRITE = 1 << 4;
        /// Indirect draw/dispatch arguments.
        const INDIRECT = 1 << 5;
        /// CPU-visible staging memory.
        const STAGING = 1 << 6;
        /// Frequently updated from the CPU.
        const DYNAMIC = 1 << 7;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

impl BufferUsage {
    /// Either structured usage.
    pub fn is_structured(&self) -> bool {
        self.intersects(Self::STRUCTURED_READ_ONLY | Self::STRUCTURED_READ_WRITE)
    }
}

/// Description for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescription {
    /// Debug label.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Element stride for structured buffers, zero otherwise.
    pub structure_stride: u32,
}

impl BufferDescription {
    /// Create a new buffer description.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            structure_stride: 0,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the structured element stride.
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.structure_stride = stride;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_description_builder() {
        let desc = BufferDescription::new(1024, BufferUsage::STRUCTURED_READ_ONLY)
            .with_label("particles")
            .with_stride(16);
        assert_eq!(desc.size, 1024);
        assert_eq!(desc.structure_stride, 16);
        assert_eq!(desc.label.as_deref(), Some("particles"));
        assert!(desc.usage.is_structured());
        assert!(!BufferUsage::UNIFORM.is_structured());
    }
}
