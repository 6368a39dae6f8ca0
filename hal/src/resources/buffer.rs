//! GPU buffer resource.

use std::fmt;
use std::sync::Arc;

use super::{MapTracker, ResourceCore};
use crate::device::GraphicsDevice;
use crate::native::{RawBuffer, RawObject};
use crate::types::{BufferDescription, BufferUsage};

/// A GPU buffer resource.
///
/// Created by [`ResourceFactory::create_buffer`](crate::ResourceFactory::create_buffer).
pub struct Buffer {
    pub(crate) core: Arc<ResourceCore>,
    pub(crate) device: Arc<GraphicsDevice>,
    description: BufferDescription,
    raw: RawBuffer,
    pub(crate) mapping: MapTracker,
}

impl Buffer {
    pub(crate) fn new(device: Arc<GraphicsDevice>, description: BufferDescription, raw: RawBuffer) -> Self {
        Self {
            core: Arc::new(ResourceCore::new("Buffer", description.label.clone())),
            device,
            description,
            raw,
            mapping: MapTracker::default(),
        }
    }

    /// Get the buffer description.
    pub fn description(&self) -> &BufferDescription {
        &self.description
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.description.size
    }

    /// Usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.description.usage
    }

    /// Native handle, for interop with the binding layer.
    pub fn raw_handle(&self) -> RawBuffer {
        self.raw
    }

    pub(crate) fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    pub(crate) fn raw_objects(&self) -> Vec<RawObject> {
        vec![RawObject::Buffer(self.raw)]
    }
}

super::impl_device_resource!(Buffer);

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.core.id())
            .field("name", &self.core.name())
            .field("size", &self.description.size)
            .field("usage", &self.description.usage)
            .finish()
    }
}

/// A byte range of a buffer bound in place of the whole buffer.
#[derive(Debug, Clone)]
pub struct BufferRange {
    pub buffer: Arc<Buffer>,
    pub offset: u64,
    pub size: u64,
}

impl BufferRange {
    /// Create a buffer range.
    pub fn new(buffer: Arc<Buffer>, offset: u64, size: u64) -> Self {
        Self {
            buffer,
            offset,
            size,
        }
    }

    /// The rest of the buffer starting at `offset`.
    pub fn from_offset(buffer: Arc<Buffer>, offset: u64) -> Self {
        let size = buffer.size().saturating_sub(offset);
        Self::new(buffer, offset, size)
    }
}
