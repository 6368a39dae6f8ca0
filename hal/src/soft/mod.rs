//! Software reference driver.
//!
//! [`SoftGpu`] emulates one GPU in host memory and exposes it through both
//! driver surfaces: explicit devices that report themselves as Vulkan, Metal
//! or Direct3D 11, and an OpenGL context. Shaders are Rust closures
//! registered in a [`KernelLibrary`] under their entry point names.
//!
//! All devices created from one `SoftGpu` share its object store and its
//! queue. The queue executes submissions in order, either immediately or,
//! while paused, when [`SoftGpu::resume`] is called. Pausing keeps work in
//! flight so callers can observe deferred disposal and fence waits.
//!
//! ```ignore
//! let kernels = KernelLibrary::new().with_compute("fill", interface, |invocation, resources| {
//!     resources.store("volume", invocation.global_id, Vec4::splat(1.0));
//! });
//! let gpu = SoftGpu::new(kernels);
//! let device = gpu.create_device(BackendKind::Vulkan, DeviceOptions::default())?;
//! ```

mod explicit;
mod executor;
mod format;
mod gl;
mod kernel;
mod memory;
mod raster;
mod surface;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

pub use kernel::{
    ComputeInvocation, ComputeKernel, FragmentInput, FragmentKernel, InterfaceClass, KernelLibrary,
    ProgramInterface, ShaderResources, VertexInput, VertexKernel, VertexOutput,
};
pub use surface::{HeadlessSurface, PresentedFrame};

use self::explicit::SoftDevice;
use self::gl::SoftGlContext;
use self::memory::{object_id, Store};
use crate::config::{BackendKind, DeviceOptions};
use crate::device::GraphicsDevice;
use crate::error::{BackendError, HalResult};
use crate::native::{GlContext, GlContextFactory, NativeDevice, RawObject, RawTexture};
use crate::types::{Features, ImageLayout, Limits};

type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct QueueState {
    paused: bool,
    pending: VecDeque<Job>,
}

/// State shared by every device of one [`SoftGpu`].
pub(crate) struct SoftShared {
    pub store: Mutex<Store>,
    pub kernels: KernelLibrary,
    queue: Mutex<QueueState>,
    resumed: Condvar,
}

impl SoftShared {
    fn new(kernels: KernelLibrary) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            kernels,
            queue: Mutex::new(QueueState::default()),
            resumed: Condvar::new(),
        }
    }

    /// Run `job` now, or after the queue resumes.
    pub fn enqueue(&self, job: Job) {
        let mut queue = self.queue.lock();
        if queue.paused {
            queue.pending.push_back(job);
        } else {
            // The queue lock keeps concurrent submissions in order.
            job();
        }
    }

    fn pause(&self) {
        self.queue.lock().paused = true;
    }

    fn resume(&self) {
        let mut queue = self.queue.lock();
        queue.paused = false;
        while let Some(job) = queue.pending.pop_front() {
            job();
        }
        self.resumed.notify_all();
    }

    fn is_paused(&self) -> bool {
        self.queue.lock().paused
    }

    /// Block until no queued work is pending.
    pub fn wait_idle(&self) {
        let mut queue = self.queue.lock();
        while queue.paused && !queue.pending.is_empty() {
            self.resumed.wait(&mut queue);
        }
    }

    /// Block while the queue is paused.
    pub fn wait_resumed(&self) {
        let mut queue = self.queue.lock();
        while queue.paused {
            self.resumed.wait(&mut queue);
        }
    }
}

pub(crate) fn features(kind: BackendKind) -> Features {
    match kind {
        BackendKind::Metal => Features {
            storage_cube_images: false,
            ..Features::all()
        },
        _ => Features::all(),
    }
}

pub(crate) fn limits(kind: BackendKind) -> Limits {
    let structured_offset_alignment = match kind {
        BackendKind::Vulkan | BackendKind::OpenGl => 64,
        BackendKind::Metal | BackendKind::Direct3D11 => 16,
    };
    Limits {
        uniform_offset_alignment: 256,
        structured_offset_alignment,
        ..Limits::default()
    }
}

/// A GPU emulated in host memory.
///
/// Cloning yields another handle to the same GPU.
#[derive(Clone)]
pub struct SoftGpu {
    shared: Arc<SoftShared>,
}

impl SoftGpu {
    pub fn new(kernels: KernelLibrary) -> Self {
        Self {
            shared: Arc::new(SoftShared::new(kernels)),
        }
    }

    /// Explicit driver reporting itself as `kind`.
    pub fn native_device(&self, kind: BackendKind) -> Result<Arc<dyn NativeDevice>, BackendError> {
        if kind == BackendKind::OpenGl {
            return Err(BackendError::Unsupported(
                "OpenGL is a context driver, use SoftGpu::gl_context_factory".into(),
            ));
        }
        Ok(Arc::new(SoftDevice::new(kind, Arc::clone(&self.shared))))
    }

    /// A context on the calling thread.
    pub fn gl_context(&self) -> Box<dyn GlContext> {
        Box::new(SoftGlContext::new(Arc::clone(&self.shared)))
    }

    pub fn gl_context_factory(&self) -> GlContextFactory {
        let shared = Arc::clone(&self.shared);
        Box::new(move || Ok(Box::new(SoftGlContext::new(shared)) as Box<dyn GlContext>))
    }

    /// Create a [`GraphicsDevice`] over this GPU for any backend.
    pub fn create_device(&self, kind: BackendKind, options: DeviceOptions) -> HalResult<Arc<GraphicsDevice>> {
        match kind {
            BackendKind::OpenGl => GraphicsDevice::new_gl(self.gl_context_factory(), options),
            _ => GraphicsDevice::new_native(self.native_device(kind)?, options),
        }
    }

    /// Hold every following submission and present until [`Self::resume`].
    pub fn pause(&self) {
        self.shared.pause();
    }

    /// Execute held work in submission order.
    pub fn resume(&self) {
        crate::profile_function!();
        self.shared.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    /// Layout a texture was last transitioned to. Only explicit devices
    /// that track layouts change it.
    pub fn texture_layout(&self, texture: RawTexture) -> Option<ImageLayout> {
        self.shared.store.lock().texture(texture.0).ok().map(|t| t.layout)
    }

    /// Debug label attached to a driver object.
    pub fn object_label(&self, object: RawObject) -> Option<String> {
        self.shared.store.lock().label(object_id(object)).map(str::to_string)
    }

    /// Whether the driver object was created and then destroyed.
    pub fn is_destroyed(&self, object: RawObject) -> bool {
        self.shared.store.lock().is_destroyed(object_id(object))
    }

    pub fn is_live(&self, object: RawObject) -> bool {
        self.shared.store.lock().contains(object_id(object))
    }

    /// Number of driver objects currently alive.
    pub fn live_objects(&self) -> usize {
        self.shared.store.lock().live_count()
    }
}

impl std::fmt::Debug for SoftGpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftGpu")
            .field("kernels", &self.shared.kernels)
            .field("live_objects", &self.live_objects())
            .field("paused", &self.is_paused())
            .finish()
    }
}

static_assertions::assert_impl_all!(SoftGpu: Send, Sync, Clone);
