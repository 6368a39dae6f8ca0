//! Deferred command log.
//!
//! The context backend cannot touch the driver from the recording thread, so
//! a command list records small fixed-layout [`CommandEntry`] values into a
//! [`CommandLog`] that the worker thread replays later. Entries refer to
//! resources by index into the log's resource table, which keeps one strong
//! reference per distinct resource until the log is recycled. Variable-size
//! payloads (update data, labels, dynamic offsets) live in two arenas.
//!
//! Logs are pooled per device and reused across frames; clearing keeps the
//! allocations.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{CommandEncoder, Submission, TextureLocation};
use crate::error::HalResult;
use crate::resources::{Buffer, Framebuffer, Pipeline, RealizedPipeline, ResourceSet, Texture};
use crate::types::{Color, Extent3d, IndexFormat, ResourceId, ScissorRect, Viewport};

/// A range inside one of the log arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ArenaRange {
    pub start: u32,
    pub len: u32,
}

impl ArenaRange {
    fn range(&self) -> std::ops::Range<usize> {
        self.start as usize..(self.start + self.len) as usize
    }
}

/// Texture subresource region referencing the resource table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoggedRegion {
    pub texture: u32,
    pub mip_level: u32,
    pub array_layer: u32,
    pub origin: [u32; 3],
}

/// One recorded operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum CommandEntry {
    SetPipeline {
        pipeline: u32,
    },
    SetResourceSet {
        index: u32,
        set: u32,
        offsets: ArenaRange,
    },
    SetFramebuffer {
        framebuffer: u32,
    },
    SetVertexBuffer {
        index: u32,
        buffer: u32,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: u32,
        format: IndexFormat,
        offset: u64,
    },
    SetViewport {
        index: u32,
        viewport: Viewport,
    },
    SetScissor {
        index: u32,
        rect: ScissorRect,
    },
    ClearColor {
        index: u32,
        color: Color,
    },
    ClearDepth {
        depth: f32,
        stencil: u8,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    UpdateBuffer {
        buffer: u32,
        offset: u64,
        data: ArenaRange,
    },
    CopyBuffer {
        source: u32,
        source_offset: u64,
        destination: u32,
        destination_offset: u64,
        size: u64,
    },
    CopyTexture {
        source: LoggedRegion,
        destination: LoggedRegion,
        extent: Extent3d,
    },
    ResolveTexture {
        source: u32,
        destination: u32,
    },
    MemoryBarrier,
    PushDebugGroup {
        label: ArenaRange,
    },
    PopDebugGroup,
    InsertDebugMarker {
        label: ArenaRange,
    },
}

/// Strong reference held by the log for the lifetime of a recording.
#[derive(Debug, Clone)]
pub(crate) enum LoggedResource {
    Buffer(Arc<Buffer>),
    Texture(Arc<Texture>),
    Pipeline(Arc<Pipeline>),
    ResourceSet(Arc<ResourceSet>),
    Framebuffer(Arc<Framebuffer>),
}

impl LoggedResource {
    fn id(&self) -> ResourceId {
        match self {
            Self::Buffer(r) => r.core().id(),
            Self::Texture(r) => r.core().id(),
            Self::Pipeline(r) => r.core().id(),
            Self::ResourceSet(r) => r.core().id(),
            Self::Framebuffer(r) => r.core().id(),
        }
    }
}

/// Append-only, reusable command log.
#[derive(Debug, Default)]
pub(crate) struct CommandLog {
    entries: Vec<CommandEntry>,
    resources: Vec<LoggedResource>,
    resource_index: HashMap<ResourceId, u32>,
    bytes: Vec<u8>,
    offsets: Vec<u32>,
}

macro_rules! logged_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self, index: u32) -> Option<&Arc<$ty>> {
            match self.resources.get(index as usize) {
                Some(LoggedResource::$variant(resource)) => Some(resource),
                _ => None,
            }
        }
    };
}

impl CommandLog {
    pub fn with_capacity(entries: usize) -> Self {
        Self {
            entries: Vec::with_capacity(entries),
            resources: Vec::with_capacity(entries / 4),
            resource_index: HashMap::with_capacity(entries / 4),
            bytes: Vec::new(),
            offsets: Vec::new(),
        }
    }

    /// Drop every entry and resource reference, keeping allocations.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.resources.clear();
        self.resource_index.clear();
        self.bytes.clear();
        self.offsets.clear();
    }

    pub fn push(&mut self, entry: CommandEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Index of `resource` in the resource table, adding it on first use.
    pub fn intern(&mut self, resource: LoggedResource) -> u32 {
        let id = resource.id();
        if let Some(index) = self.resource_index.get(&id) {
            return *index;
        }
        let index = self.resources.len() as u32;
        self.resources.push(resource);
        self.resource_index.insert(id, index);
        index
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn push_bytes(&mut self, data: &[u8]) -> ArenaRange {
        let start = self.bytes.len() as u32;
        self.bytes.extend_from_slice(data);
        ArenaRange {
            start,
            len: data.len() as u32,
        }
    }

    pub fn push_offsets(&mut self, offsets: &[u32]) -> ArenaRange {
        let start = self.offsets.len() as u32;
        self.offsets.extend_from_slice(offsets);
        ArenaRange {
            start,
            len: offsets.len() as u32,
        }
    }

    pub fn bytes(&self, range: ArenaRange) -> &[u8] {
        &self.bytes[range.range()]
    }

    pub fn offsets(&self, range: ArenaRange) -> &[u32] {
        &self.offsets[range.range()]
    }

    pub fn label(&self, range: ArenaRange) -> &str {
        std::str::from_utf8(self.bytes(range)).unwrap_or("<invalid label>")
    }

    logged_accessor!(buffer, Buffer, Buffer);
    logged_accessor!(texture, Texture, Texture);
    logged_accessor!(pipeline, Pipeline, Pipeline);
    logged_accessor!(resource_set, ResourceSet, ResourceSet);
    logged_accessor!(framebuffer, Framebuffer, Framebuffer);
}

/// Per-device pool of recycled logs.
#[derive(Debug, Default)]
pub(crate) struct LogPool {
    logs: Mutex<Vec<CommandLog>>,
}

impl LogPool {
    const MAX_POOLED: usize = 8;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, capacity: usize) -> CommandLog {
        self.logs
            .lock()
            .pop()
            .unwrap_or_else(|| CommandLog::with_capacity(capacity))
    }

    /// Clear `log` and keep it for reuse.
    pub fn recycle(&self, mut log: CommandLog) {
        log.clear();
        let mut logs = self.logs.lock();
        if logs.len() < Self::MAX_POOLED {
            logs.push(log);
        }
    }

    #[cfg(test)]
    pub fn pooled(&self) -> usize {
        self.logs.lock().len()
    }
}

/// Encoder recording into a [`CommandLog`].
pub(crate) struct DeferredEncoder {
    pool: Arc<LogPool>,
    capacity: usize,
    log: Option<CommandLog>,
}

impl DeferredEncoder {
    pub fn new(pool: Arc<LogPool>, capacity: usize) -> Self {
        Self {
            pool,
            capacity,
            log: None,
        }
    }

    fn log(&mut self) -> &mut CommandLog {
        let (pool, capacity) = (&self.pool, self.capacity);
        self.log.get_or_insert_with(|| pool.acquire(capacity))
    }

    fn region(&mut self, location: &TextureLocation) -> LoggedRegion {
        let texture = self.log().intern(LoggedResource::Texture(Arc::clone(&location.texture)));
        LoggedRegion {
            texture,
            mip_level: location.mip_level,
            array_layer: location.array_layer,
            origin: location.origin,
        }
    }
}

impl CommandEncoder for DeferredEncoder {
    fn begin(&mut self) -> HalResult<()> {
        match self.log.as_mut() {
            Some(log) => log.clear(),
            None => self.log = Some(self.pool.acquire(self.capacity)),
        }
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: &Arc<Pipeline>, _realized: &RealizedPipeline) {
        let log = self.log();
        let pipeline = log.intern(LoggedResource::Pipeline(Arc::clone(pipeline)));
        log.push(CommandEntry::SetPipeline { pipeline });
    }

    fn set_resource_set(
        &mut self,
        index: u32,
        set: &Arc<ResourceSet>,
        dynamic_offsets: &[u32],
        _realized: &RealizedPipeline,
    ) {
        let log = self.log();
        let set = log.intern(LoggedResource::ResourceSet(Arc::clone(set)));
        let offsets = log.push_offsets(dynamic_offsets);
        log.push(CommandEntry::SetResourceSet { index, set, offsets });
    }

    fn set_framebuffer(&mut self, framebuffer: &Arc<Framebuffer>) {
        let log = self.log();
        let framebuffer = log.intern(LoggedResource::Framebuffer(Arc::clone(framebuffer)));
        log.push(CommandEntry::SetFramebuffer { framebuffer });
    }

    fn set_vertex_buffer(&mut self, index: u32, buffer: &Arc<Buffer>, offset: u64) {
        let log = self.log();
        let buffer = log.intern(LoggedResource::Buffer(Arc::clone(buffer)));
        log.push(CommandEntry::SetVertexBuffer { index, buffer, offset });
    }

    fn set_index_buffer(&mut self, buffer: &Arc<Buffer>, format: IndexFormat, offset: u64) {
        let log = self.log();
        let buffer = log.intern(LoggedResource::Buffer(Arc::clone(buffer)));
        log.push(CommandEntry::SetIndexBuffer { buffer, format, offset });
    }

    fn set_viewport(&mut self, index: u32, viewport: Viewport) {
        self.log().push(CommandEntry::SetViewport { index, viewport });
    }

    fn set_scissor(&mut self, index: u32, rect: ScissorRect) {
        self.log().push(CommandEntry::SetScissor { index, rect });
    }

    fn clear_color(&mut self, index: u32, color: Color) {
        self.log().push(CommandEntry::ClearColor { index, color });
    }

    fn clear_depth(&mut self, depth: f32, stencil: u8) {
        self.log().push(CommandEntry::ClearDepth { depth, stencil });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.log().push(CommandEntry::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
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
        self.log().push(CommandEntry::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.log().push(CommandEntry::Dispatch { x, y, z });
    }

    fn update_buffer(&mut self, buffer: &Arc<Buffer>, offset: u64, data: &[u8]) {
        let log = self.log();
        let buffer = log.intern(LoggedResource::Buffer(Arc::clone(buffer)));
        let data = log.push_bytes(data);
        log.push(CommandEntry::UpdateBuffer { buffer, offset, data });
    }

    fn copy_buffer(
        &mut self,
        source: &Arc<Buffer>,
        source_offset: u64,
        destination: &Arc<Buffer>,
        destination_offset: u64,
        size: u64,
    ) {
        let log = self.log();
        let source = log.intern(LoggedResource::Buffer(Arc::clone(source)));
        let destination = log.intern(LoggedResource::Buffer(Arc::clone(destination)));
        log.push(CommandEntry::CopyBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        });
    }

    fn copy_texture(&mut self, source: &TextureLocation, destination: &TextureLocation, extent: Extent3d) {
        let source = self.region(source);
        let destination = self.region(destination);
        self.log().push(CommandEntry::CopyTexture {
            source,
            destination,
            extent,
        });
    }

    fn resolve_texture(&mut self, source: &Arc<Texture>, destination: &Arc<Texture>) {
        let log = self.log();
        let source = log.intern(LoggedResource::Texture(Arc::clone(source)));
        let destination = log.intern(LoggedResource::Texture(Arc::clone(destination)));
        log.push(CommandEntry::ResolveTexture { source, destination });
    }

    fn memory_barrier(&mut self) {
        self.log().push(CommandEntry::MemoryBarrier);
    }

    fn push_debug_group(&mut self, label: &str) {
        let log = self.log();
        let label = log.push_bytes(label.as_bytes());
        log.push(CommandEntry::PushDebugGroup { label });
    }

    fn pop_debug_group(&mut self) {
        self.log().push(CommandEntry::PopDebugGroup);
    }

    fn insert_debug_marker(&mut self, label: &str) {
        let log = self.log();
        let label = log.push_bytes(label.as_bytes());
        log.push(CommandEntry::InsertDebugMarker { label });
    }

    fn end(&mut self) -> HalResult<()> {
        Ok(())
    }

    fn take_submission(&mut self) -> Option<Submission> {
        self.log.take().map(Submission::Deferred)
    }

    fn reset(&mut self) {
        if let Some(log) = self.log.take() {
            self.pool.recycle(log);
        }
    }
}

impl Drop for DeferredEncoder {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arenas() {
        let mut log = CommandLog::with_capacity(16);
        let label = log.push_bytes(b"shadow pass");
        let data = log.push_bytes(&[1, 2, 3, 4]);
        let offsets = log.push_offsets(&[256, 512]);
        log.push(CommandEntry::PushDebugGroup { label });
        log.push(CommandEntry::Dispatch { x: 1, y: 2, z: 3 });

        assert_eq!(log.label(label), "shadow pass");
        assert_eq!(log.bytes(data), &[1, 2, 3, 4]);
        assert_eq!(log.offsets(offsets), &[256, 512]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut log = CommandLog::with_capacity(64);
        for _ in 0..10 {
            log.push(CommandEntry::MemoryBarrier);
        }
        log.clear();
        assert!(log.is_empty());
        assert!(log.capacity() >= 64);
    }

    #[test]
    fn test_pool_reuses_logs() {
        let pool = LogPool::new();
        let mut log = pool.acquire(32);
        log.push(CommandEntry::PopDebugGroup);
        pool.recycle(log);
        assert_eq!(pool.pooled(), 1);

        let log = pool.acquire(32);
        assert!(log.is_empty());
        assert!(log.capacity() >= 32);
        assert_eq!(pool.pooled(), 0);
    }
}
