//! Graphics device.
//!
//! The [`GraphicsDevice`] composes one backend with the submission timeline,
//! the disposal coordinator and the pipeline cache. Resources are created
//! through [`ResourceFactory`](crate::ResourceFactory), which is implemented
//! for `Arc<GraphicsDevice>`.
//!
//! Explicit backends submit native command buffers directly. The OpenGL
//! backend hands command logs to its context thread and replays them there:
//!
//! ```text
//! submit_commands(list)
//!   native:   NativeDevice::submit(command buffer, on_complete)
//!   deferred: worker <- job { replay(log); finish(); on_complete(result) }
//! on_complete: record fault; fence.set(); timeline.signal(value)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::binding::{reflect_bindings, translate, SlotModel};
use crate::command::{replay, CommandList, LogPool, Submission};
use crate::config::{BackendKind, DeviceOptions};
use crate::disposal::{DisposalEntry, DisposalQueue};
use crate::error::{BackendError, HalError, HalResult};
use crate::native::{
    GlContext, GlContextFactory, NativeCommandBuffer, NativeDevice, NativeTextureRegion, RawObject,
};
use crate::resources::{
    Buffer, Fence, MapTracker, Pipeline, RealizedPipeline, ResourceCore, SharedPipeline, Texture,
};
use crate::sync::Timeline;
use crate::types::{BufferUsage, Features, Limits, MapMode, PipelineDescription, TextureUsage};
use crate::worker::GlWorker;

/// Name of the OpenGL context thread.
const GL_WORKER_NAME: &str = "redlilium-gl";

/// How the device reaches its driver.
pub(crate) enum DeviceBackend {
    Native(Arc<dyn NativeDevice>),
    Deferred(GlWorker),
}

/// A GPU device bound to one backend.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync`. Submissions are serialized internally;
/// command lists are recorded independently on any thread.
///
/// # Example
///
/// ```ignore
/// let gpu = SoftGpu::new(KernelLibrary::new());
/// let device = gpu.create_device(BackendKind::Vulkan, DeviceOptions::default())?;
///
/// let mut list = device.create_command_list()?;
/// list.begin()?;
/// list.update_buffer(&buffer, 0, &[1, 2, 3, 4])?;
/// list.end()?;
/// device.submit_commands_blocking(&mut list)?;
/// ```
pub struct GraphicsDevice {
    kind: BackendKind,
    backend: DeviceBackend,
    options: DeviceOptions,
    features: Features,
    limits: Limits,
    timeline: Arc<Timeline>,
    submit_lock: Mutex<()>,
    disposal: DisposalQueue,
    pipeline_cache: PipelineCache,
    log_pool: Arc<LogPool>,
}

impl GraphicsDevice {
    /// Create a device over an explicit native device.
    pub fn new_native(native: Arc<dyn NativeDevice>, options: DeviceOptions) -> HalResult<Arc<Self>> {
        let kind = native.kind();
        if SlotModel::for_backend(kind).is_none() {
            return Err(HalError::invalid_parameter(format!(
                "{} devices are created with GraphicsDevice::new_gl",
                kind.name()
            )));
        }
        let (features, limits) = (native.features(), native.limits());
        Ok(Self::assemble(kind, DeviceBackend::Native(native), options, features, limits))
    }

    /// Create an OpenGL device. The context is created by `factory` on a
    /// dedicated thread that performs every later context call.
    pub fn new_gl(factory: GlContextFactory, options: DeviceOptions) -> HalResult<Arc<Self>> {
        let worker = GlWorker::spawn(factory, GL_WORKER_NAME)?;
        let (features, limits) = (worker.features(), worker.limits());
        Ok(Self::assemble(
            BackendKind::OpenGl,
            DeviceBackend::Deferred(worker),
            options,
            features,
            limits,
        ))
    }

    fn assemble(
        kind: BackendKind,
        backend: DeviceBackend,
        options: DeviceOptions,
        features: Features,
        limits: Limits,
    ) -> Arc<Self> {
        log::info!(
            "Created {} device {:?} (validation {:?}, pipeline cache {})",
            kind.name(),
            options.label.as_deref().unwrap_or("unnamed"),
            options.validation,
            if options.pipeline_cache { "on" } else { "off" }
        );
        Arc::new(Self {
            kind,
            backend,
            options,
            features,
            limits,
            timeline: Arc::new(Timeline::new()),
            submit_lock: Mutex::new(()),
            disposal: DisposalQueue::new(),
            pipeline_cache: PipelineCache::default(),
            log_pool: Arc::new(LogPool::new()),
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Active backend.
    pub fn backend(&self) -> BackendKind {
        self.kind
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn options(&self) -> &DeviceOptions {
        &self.options
    }

    /// Highest submission value known complete.
    pub fn completed_submission(&self) -> u64 {
        self.timeline.completed()
    }

    /// Value of the most recent submission.
    pub fn last_submission(&self) -> u64 {
        self.timeline.last_submitted()
    }

    /// Resources waiting for the GPU before destruction.
    pub fn pending_disposals(&self) -> usize {
        self.disposal.len()
    }

    /// Native pipeline objects currently shared through the cache.
    pub fn cached_pipelines(&self) -> usize {
        self.pipeline_cache.len()
    }

    pub(crate) fn native(&self) -> Option<&Arc<dyn NativeDevice>> {
        match &self.backend {
            DeviceBackend::Native(native) => Some(native),
            DeviceBackend::Deferred(_) => None,
        }
    }

    pub(crate) fn backend_impl(&self) -> &DeviceBackend {
        &self.backend
    }

    pub(crate) fn log_pool(&self) -> &Arc<LogPool> {
        &self.log_pool
    }

    pub(crate) fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipeline_cache
    }

    fn is_worker_thread(&self) -> bool {
        matches!(&self.backend, DeviceBackend::Deferred(worker) if worker.is_worker_thread())
    }

    /// Fail unless `owner` is this device.
    pub(crate) fn ensure_owner(&self, owner: &Arc<GraphicsDevice>) -> HalResult<()> {
        if !std::ptr::eq(self, Arc::as_ptr(owner)) {
            return Err(HalError::invalid_parameter("resource belongs to a different device"));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resource lifetime
    // ------------------------------------------------------------------

    /// Queue a resource for destruction once the GPU is done with it.
    /// Repeated calls for the same resource are ignored.
    pub(crate) fn retire(&self, core: &Arc<ResourceCore>, objects: Vec<RawObject>) {
        if !core.begin_disposal() {
            return;
        }
        self.disposal
            .enqueue(Arc::clone(core), objects, self.timeline.last_submitted());
    }

    /// Like [`retire`](Self::retire) for a resource whose native object may
    /// be shared with other resources.
    pub(crate) fn retire_shared(&self, core: &Arc<ResourceCore>, state: Option<Arc<SharedPipeline>>) {
        if !core.begin_disposal() {
            return;
        }
        let marker = self.timeline.last_submitted();
        match state {
            Some(state) => self.disposal.enqueue_shared(Arc::clone(core), state, marker),
            None => self.disposal.enqueue(Arc::clone(core), Vec::new(), marker),
        }
    }


    /// Forward a debug name to the driver.
    pub(crate) fn label_objects(&self, objects: &[RawObject], name: &str) {
        if objects.is_empty() {
            return;
        }
        match &self.backend {
            DeviceBackend::Native(native) => {
                for object in objects {
                    native.set_object_name(*object, name);
                }
            }
            DeviceBackend::Deferred(worker) => {
                let objects = objects.to_vec();
                let label = name.to_string();
                let job = Box::new(move |ctx: &mut dyn GlContext| {
                    for object in objects {
                        ctx.object_label(object, &label);
                    }
                });
                if worker.execute(job).is_err() {
                    log::warn!("Dropped debug label {name:?}: GL worker is gone");
                }
            }
        }
    }

    /// Destroy every queued resource whose last use has completed.
    /// Returns the number of destroyed resources.
    pub fn poll_disposals(&self) -> usize {
        self.collect_disposals()
    }

    fn collect_disposals(&self) -> usize {
        let entries = self.disposal.take_eligible(self.timeline.completed());
        let count = entries.len();
        for entry in entries {
            self.destroy_entry(entry);
        }
        if count > 0 {
            crate::profile_plot!("hal_pending_disposals", self.disposal.len());
        }
        count
    }

    fn destroy_entry(&self, entry: DisposalEntry) {
        let what = entry.core.describe();
        self.destroy_objects(entry.objects, &what);
        if let Some(state) = entry.shared {
            if state.release() {
                self.destroy_objects(vec![state.realized().raw_object()], "shared pipeline");
            }
        }
        entry.core.mark_destroyed();
        log::trace!("Destroyed {what}");
    }

    fn destroy_objects(&self, objects: Vec<RawObject>, what: &str) {
        if objects.is_empty() {
            return;
        }
        match &self.backend {
            DeviceBackend::Native(native) => {
                for object in &objects {
                    native.destroy(*object);
                }
            }
            DeviceBackend::Deferred(worker) => {
                let job = Box::new(move |ctx: &mut dyn GlContext| {
                    for object in objects {
                        ctx.destroy(object);
                    }
                });
                if worker.execute(job).is_err() {
                    log::warn!("GL worker gone; leaking {what}");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Pipelines
    // ------------------------------------------------------------------

    /// Build native state for a pipeline description.
    pub(crate) fn realize_pipeline(&self, desc: &PipelineDescription) -> HalResult<RealizedPipeline> {
        match &self.backend {
            DeviceBackend::Native(native) => {
                let model = SlotModel::for_backend(self.kind)
                    .ok_or_else(|| HalError::invalid_state("backend has no explicit slot model"))?;
                let bindings = translate(model, desc.resource_layouts().iter().map(|l| l.elements()));
                let raw = native.create_pipeline(desc, &bindings.decls)?;
                Ok(RealizedPipeline::Explicit { raw, bindings })
            }
            DeviceBackend::Deferred(worker) => {
                let desc = desc.clone();
                let mode = self.options.validation;
                let bindings = worker.call(move |ctx| -> HalResult<_> {
                    let program = ctx.create_program(&desc)?;
                    let layouts = desc.resource_layouts();
                    match reflect_bindings(ctx, program, layouts.iter().map(|l| l.elements()), mode) {
                        Ok(bindings) => Ok(bindings),
                        Err(e) => {
                            ctx.destroy(RawObject::Program(program));
                            Err(e)
                        }
                    }
                })??;
                Ok(RealizedPipeline::Gl(bindings))
            }
        }
    }

    /// Realize a pipeline now instead of on first bind.
    pub fn prepare_pipeline(&self, pipeline: &Arc<Pipeline>) -> HalResult<()> {
        self.ensure_owner(&pipeline.device)?;
        pipeline.realized().map(|_| ())
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Submit an ended command list. Returns the submission's timeline value.
    ///
    /// When `fence` is given it is reset now and signalled once the
    /// submission completes. Never blocks on the GPU.
    pub fn submit_commands(&self, list: &mut CommandList, fence: Option<&Fence>) -> HalResult<u64> {
        crate::profile_function!();

        self.ensure_owner(&list.device)?;
        if let Some(fence) = fence {
            self.ensure_owner(&fence.device)?;
            fence.core.ensure_live()?;
        }
        self.check_fault()?;
        let submission = list.take_submission()?;

        let value = {
            let _guard = self.submit_lock.lock();
            let value = self.timeline.peek_next();
            let signal = fence.map(|fence| {
                fence.signal.reset();
                fence.signal.attach(value);
                Arc::clone(&fence.signal)
            });
            let timeline = Arc::clone(&self.timeline);
            let on_complete = move |result: Result<(), BackendError>| {
                if let Err(e) = result {
                    timeline.record_fault(e);
                }
                if let Some(signal) = signal {
                    signal.set();
                }
                timeline.signal(value);
            };

            let result = match (&self.backend, submission) {
                (DeviceBackend::Native(native), Submission::Native(commands)) => native
                    .submit(commands, Box::new(on_complete))
                    .map_err(HalError::from),
                (DeviceBackend::Deferred(worker), Submission::Deferred(commands)) => {
                    let pool = Arc::clone(&self.log_pool);
                    worker
                        .execute(Box::new(move |ctx| {
                            log::trace!("Replaying {} entries (submission {value})", commands.len());
                            let result = replay(ctx, &commands);
                            ctx.finish();
                            let pending = ctx.take_error();
                            let result = result.and_then(|()| pending.map_or(Ok(()), Err));
                            if let Err(e) = &result {
                                log::error!("Command replay of submission {value} failed: {e}");
                            }
                            on_complete(result);
                            pool.recycle(commands);
                        }))
                        .map_err(HalError::from)
                }
                _ => Err(HalError::invalid_state(
                    "command list was recorded for a different backend",
                )),
            };
            if let Err(e) = result {
                list.abandon();
                return Err(e);
            }
            self.timeline.mark_submitted(value);
            value
        };

        list.mark_submitted(value);
        self.collect_disposals();
        Ok(value)
    }

    /// Submit and wait for completion.
    pub fn submit_commands_blocking(&self, list: &mut CommandList) -> HalResult<()> {
        let value = self.submit_commands(list, None)?;
        self.wait_for_value(value)?;
        self.collect_disposals();
        Ok(())
    }

    /// Submit a device-internal native command buffer, ordered with
    /// command list submissions. `used` cores record the submission.
    pub(crate) fn submit_native_commands(
        &self,
        mut commands: Box<dyn NativeCommandBuffer>,
        used: &[&Arc<ResourceCore>],
    ) -> HalResult<u64> {
        let native = self
            .native()
            .ok_or_else(|| HalError::invalid_state("native submission on a deferred backend"))?;
        commands.finish();

        let _guard = self.submit_lock.lock();
        let value = self.timeline.peek_next();
        let timeline = Arc::clone(&self.timeline);
        native.submit(
            commands,
            Box::new(move |result: Result<(), BackendError>| {
                if let Err(e) = result {
                    timeline.record_fault(e);
                }
                timeline.signal(value);
            }),
        )?;
        self.timeline.mark_submitted(value);
        for core in used {
            core.record_use(value);
        }
        Ok(value)
    }

    /// Report an execution failure recorded since the last check.
    ///
    /// Submitted work fails on the GPU timeline, long after the call that
    /// queued it returned. The first such failure is returned once, from the
    /// next submit or wait.
    fn check_fault(&self) -> HalResult<()> {
        match self.timeline.take_fault() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn wait_timeline(&self, value: u64, timeout: Option<Duration>) -> HalResult<bool> {
        if self.timeline.is_complete(value) {
            self.check_fault()?;
            return Ok(true);
        }
        match &self.backend {
            DeviceBackend::Deferred(worker) if worker.is_worker_thread() => {
                return Err(HalError::invalid_state("blocking wait issued from the GL context thread"));
            }
            DeviceBackend::Native(native) if timeout.is_none() => native.wait_idle()?,
            _ => {}
        }
        let done = match timeout {
            None => {
                self.timeline.wait(value);
                true
            }
            Some(timeout) => self.timeline.wait_timeout(value, timeout),
        };
        self.check_fault()?;
        Ok(done)
    }

    pub(crate) fn wait_for_value(&self, value: u64) -> HalResult<()> {
        self.wait_timeline(value, None).map(|_| ())
    }

    /// Block until all submitted work has completed and drain every
    /// disposal that became eligible.
    pub fn wait_for_idle(&self) -> HalResult<()> {
        crate::profile_function!();
        self.wait_for_value(self.timeline.last_submitted())?;
        self.collect_disposals();
        if let DeviceBackend::Deferred(worker) = &self.backend {
            // Queued destroys and uploads have run once this returns.
            worker.call(|_| ())?;
        }
        self.check_fault()
    }

    // ------------------------------------------------------------------
    // Fences
    // ------------------------------------------------------------------

    pub fn reset_fence(&self, fence: &Fence) -> HalResult<()> {
        self.ensure_owner(&fence.device)?;
        fence.core.ensure_live()?;
        fence.signal.reset();
        Ok(())
    }

    /// Wait for a fence. `None` waits without limit. Returns whether the
    /// fence is signalled.
    ///
    /// A fence with no pending submission returns its current state
    /// immediately.
    pub fn wait_for_fence(&self, fence: &Fence, timeout: Option<Duration>) -> HalResult<bool> {
        self.ensure_owner(&fence.device)?;
        if fence.is_signaled() {
            self.check_fault()?;
            return Ok(true);
        }
        let value = fence.submission();
        if value == 0 || self.timeline.is_complete(value) {
            self.check_fault()?;
            return Ok(fence.is_signaled());
        }
        let done = self.wait_timeline(value, timeout)?;
        Ok(done && fence.is_signaled())
    }

    /// Wait for all (or any) of `fences`.
    pub fn wait_for_fences(
        &self,
        fences: &[&Fence],
        wait_all: bool,
        timeout: Option<Duration>,
    ) -> HalResult<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        if wait_all {
            for fence in fences {
                let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
                if !self.wait_for_fence(fence, remaining)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }

        for fence in fences {
            self.ensure_owner(&fence.device)?;
        }
        if fences.iter().any(|f| f.is_signaled()) {
            return Ok(true);
        }
        // Fences signal before the timeline advances, so reaching the
        // earliest pending value means that fence is set.
        let earliest = fences
            .iter()
            .map(|f| f.submission())
            .filter(|v| *v != 0 && !self.timeline.is_complete(*v))
            .min();
        let Some(earliest) = earliest else {
            return Ok(false);
        };
        self.wait_timeline(earliest, timeout)?;
        Ok(fences.iter().any(|f| f.is_signaled()))
    }

    // ------------------------------------------------------------------
    // Uploads
    // ------------------------------------------------------------------

    /// Write `data` into a buffer, ordered after earlier submissions.
    pub fn update_buffer(&self, buffer: &Arc<Buffer>, offset: u64, data: &[u8]) -> HalResult<()> {
        self.ensure_owner(&buffer.device)?;
        buffer.core.ensure_live()?;
        if offset.checked_add(data.len() as u64).map_or(true, |end| end > buffer.size()) {
            return Err(HalError::invalid_parameter(format!(
                "update of {} bytes at {offset} exceeds {} of {} bytes",
                data.len(),
                buffer.core.describe(),
                buffer.size()
            )));
        }
        if data.is_empty() {
            return Ok(());
        }

        match &self.backend {
            DeviceBackend::Native(native) => {
                let mut commands = native.create_command_buffer()?;
                commands.update_buffer(buffer.raw_handle(), offset, data);
                self.submit_native_commands(commands, &[&buffer.core])?;
            }
            DeviceBackend::Deferred(worker) => {
                let target = Arc::clone(buffer);
                let timeline = Arc::clone(&self.timeline);
                let data = data.to_vec();
                worker.execute(Box::new(move |ctx| {
                    if let Err(e) = ctx.buffer_sub_data(target.raw_handle(), offset, &data) {
                        log::error!("Upload to {} failed: {e}", target.core.describe());
                        timeline.record_fault(e);
                    }
                }))?;
            }
        }
        Ok(())
    }

    /// Replace one subresource of a texture with tightly packed texels.
    pub fn update_texture(
        &self,
        texture: &Arc<Texture>,
        mip_level: u32,
        array_layer: u32,
        data: &[u8],
    ) -> HalResult<()> {
        self.ensure_owner(&texture.device)?;
        texture.core.ensure_live()?;
        let desc = texture.description();
        if mip_level >= desc.mip_levels || array_layer >= desc.array_layers {
            return Err(HalError::invalid_parameter(format!(
                "subresource (mip {mip_level}, layer {array_layer}) out of range for {}",
                texture.core.describe()
            )));
        }
        let expected = desc.subresource_size(mip_level);
        if data.len() as u64 != expected {
            return Err(HalError::invalid_parameter(format!(
                "texture update needs {expected} bytes, got {}",
                data.len()
            )));
        }

        let region = NativeTextureRegion {
            texture: texture.raw_handle(),
            mip_level,
            array_layer,
            origin: [0; 3],
        };
        let extent = desc.mip_extent(mip_level);
        match &self.backend {
            DeviceBackend::Native(native) => {
                let mut commands = native.create_command_buffer()?;
                commands.update_texture(region, extent, data);
                self.submit_native_commands(commands, &[&texture.core])?;
            }
            DeviceBackend::Deferred(worker) => {
                let target = Arc::clone(texture);
                let timeline = Arc::clone(&self.timeline);
                let data = data.to_vec();
                worker.execute(Box::new(move |ctx| {
                    if let Err(e) = ctx.tex_sub_image(region, extent, &data) {
                        log::error!("Upload to {} failed: {e}", target.core.describe());
                        timeline.record_fault(e);
                    }
                }))?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mapping
    // ------------------------------------------------------------------

    /// Map subresource 0 of a buffer or texture.
    pub fn map(&self, target: impl Into<MapTarget>, mode: MapMode) -> HalResult<MappedResource> {
        self.map_subresource(target, mode, 0)
    }

    /// Map one subresource (`mip + layer * mip_levels` for textures).
    ///
    /// Blocks until the last submission using the resource has completed.
    pub fn map_subresource(
        &self,
        target: impl Into<MapTarget>,
        mode: MapMode,
        subresource: u32,
    ) -> HalResult<MappedResource> {
        crate::profile_function!();
        let target = target.into();
        self.ensure_owner(target.device())?;
        target.core().ensure_live()?;
        target.check_mappable(mode, subresource)?;

        target.tracker().claim(subresource)?;
        match self.read_for_map(&target, mode, subresource) {
            Ok(data) => Ok(MappedResource {
                target,
                mode,
                subresource,
                data,
            }),
            Err(e) => {
                target.tracker().release(subresource);
                Err(e)
            }
        }
    }

    fn read_for_map(&self, target: &MapTarget, mode: MapMode, subresource: u32) -> HalResult<Vec<u8>> {
        self.wait_for_value(target.core().last_use())?;
        if !mode.reads() {
            return Ok(vec![0; target.subresource_size(subresource) as usize]);
        }
        match (target, &self.backend) {
            (MapTarget::Buffer(buffer), DeviceBackend::Native(native)) => {
                Ok(native.read_buffer(buffer.raw_handle(), 0, buffer.size())?)
            }
            (MapTarget::Buffer(buffer), DeviceBackend::Deferred(worker)) => {
                let (raw, size) = (buffer.raw_handle(), buffer.size());
                Ok(worker.call(move |ctx| ctx.get_buffer_sub_data(raw, 0, size))??)
            }
            (MapTarget::Texture(texture), DeviceBackend::Native(native)) => {
                let (mip, layer) = texture.description().subresource_coords(subresource);
                Ok(native.read_texture(texture.raw_handle(), mip, layer)?)
            }
            (MapTarget::Texture(texture), DeviceBackend::Deferred(worker)) => {
                let (mip, layer) = texture.description().subresource_coords(subresource);
                let raw = texture.raw_handle();
                Ok(worker.call(move |ctx| ctx.get_tex_image(raw, mip, layer))??)
            }
        }
    }

    /// Release a mapping, writing its contents back if the mode writes.
    pub fn unmap(&self, mapped: MappedResource) -> HalResult<()> {
        self.ensure_owner(mapped.target.device())?;
        if !mapped.mode.writes() {
            return Ok(());
        }
        match (&mapped.target, &self.backend) {
            (MapTarget::Buffer(buffer), DeviceBackend::Native(native)) => {
                native.write_buffer(buffer.raw_handle(), 0, &mapped.data)?;
            }
            (MapTarget::Buffer(buffer), DeviceBackend::Deferred(worker)) => {
                let raw = buffer.raw_handle();
                let data = mapped.data.clone();
                worker.call(move |ctx| ctx.buffer_sub_data(raw, 0, &data))??;
            }
            (MapTarget::Texture(texture), DeviceBackend::Native(native)) => {
                let (mip, layer) = texture.description().subresource_coords(mapped.subresource);
                native.write_texture(texture.raw_handle(), mip, layer, &mapped.data)?;
            }
            (MapTarget::Texture(texture), DeviceBackend::Deferred(worker)) => {
                let desc = texture.description();
                let (mip_level, array_layer) = desc.subresource_coords(mapped.subresource);
                let region = NativeTextureRegion {
                    texture: texture.raw_handle(),
                    mip_level,
                    array_layer,
                    origin: [0; 3],
                };
                let extent = desc.mip_extent(mip_level);
                let data = mapped.data.clone();
                worker.call(move |ctx| ctx.tex_sub_image(region, extent, &data))??;
            }
        }
        Ok(())
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        if !self.is_worker_thread() {
            if let Err(e) = self.wait_for_idle() {
                log::error!("Device shutdown: wait for idle failed: {e}");
            }
        }
        self.pipeline_cache.clear();
        for entry in self.disposal.take_eligible(u64::MAX) {
            self.destroy_entry(entry);
        }
        if !self.disposal.is_empty() {
            log::warn!("Device shutdown with {} resources still referenced", self.disposal.len());
        }
        if let DeviceBackend::Deferred(worker) = &self.backend {
            worker.shutdown();
        }
        log::info!("Destroyed {} device", self.kind.name());
    }
}

impl fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.kind)
            .field("label", &self.options.label)
            .field("last_submission", &self.timeline.last_submitted())
            .field("completed", &self.timeline.completed())
            .field("pending_disposals", &self.disposal.len())
            .finish()
    }
}

// ============================================================================
// Pipeline cache
// ============================================================================

/// Realized pipeline state keyed by description hash.
///
/// Holds weak references only. A hit registers the asking pipeline as one
/// more user of the state, so the native object outlives every pipeline
/// sharing it.
#[derive(Debug, Default)]
pub(crate) struct PipelineCache {
    entries: Mutex<HashMap<u64, Vec<(PipelineDescription, Weak<SharedPipeline>)>>>,
}

impl PipelineCache {
    /// Return live state realized for an equal description, or cache the
    /// state `realize` builds.
    pub fn get_or_realize(
        &self,
        desc: &PipelineDescription,
        realize: impl FnOnce() -> HalResult<RealizedPipeline>,
    ) -> HalResult<Arc<SharedPipeline>> {
        let mut entries = self.entries.lock();
        let bucket = entries.entry(desc.cache_key()).or_default();
        bucket.retain(|(_, weak)| weak.upgrade().is_some_and(|state| state.in_use()));

        let hit = bucket
            .iter()
            .filter(|(cached, _)| cached == desc)
            .filter_map(|(_, weak)| weak.upgrade())
            .find(|state| state.acquire());
        if let Some(state) = hit {
            log::trace!("Pipeline cache hit for {:?}", desc.label());
            return Ok(state);
        }

        let state = Arc::new(SharedPipeline::new(realize()?));
        bucket.push((desc.clone(), Arc::downgrade(&state)));
        Ok(state)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .flatten()
            .filter_map(|(_, weak)| weak.upgrade())
            .filter(|state| state.in_use())
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ============================================================================
// Mapping
// ============================================================================

/// A mappable resource.
#[derive(Debug, Clone)]
pub enum MapTarget {
    Buffer(Arc<Buffer>),
    Texture(Arc<Texture>),
}

impl MapTarget {
    fn device(&self) -> &Arc<GraphicsDevice> {
        match self {
            Self::Buffer(buffer) => &buffer.device,
            Self::Texture(texture) => &texture.device,
        }
    }

    fn core(&self) -> &Arc<ResourceCore> {
        match self {
            Self::Buffer(buffer) => &buffer.core,
            Self::Texture(texture) => &texture.core,
        }
    }

    fn tracker(&self) -> &MapTracker {
        match self {
            Self::Buffer(buffer) => &buffer.mapping,
            Self::Texture(texture) => &texture.mapping,
        }
    }

    fn subresource_size(&self, subresource: u32) -> u64 {
        match self {
            Self::Buffer(buffer) => buffer.size(),
            Self::Texture(texture) => {
                let desc = texture.description();
                desc.subresource_size(desc.subresource_coords(subresource).0)
            }
        }
    }

    /// Buffers map when STAGING (or DYNAMIC for write-only access);
    /// textures map when STAGING.
    fn check_mappable(&self, mode: MapMode, subresource: u32) -> HalResult<()> {
        match self {
            Self::Buffer(buffer) => {
                let usage = buffer.usage();
                let allowed = usage.contains(BufferUsage::STAGING)
                    || (usage.contains(BufferUsage::DYNAMIC) && !mode.reads());
                if !allowed {
                    return Err(HalError::invalid_parameter(format!(
                        "{} cannot be mapped for {mode:?} (usage {usage:?})",
                        buffer.core.describe()
                    )));
                }
                if subresource != 0 {
                    return Err(HalError::invalid_parameter(format!(
                        "buffers have a single subresource, got {subresource}"
                    )));
                }
            }
            Self::Texture(texture) => {
                if !texture.usage().contains(TextureUsage::STAGING) {
                    return Err(HalError::invalid_parameter(format!(
                        "{} is not a staging texture",
                        texture.core.describe()
                    )));
                }
                let count = texture.description().subresource_count();
                if subresource >= count {
                    return Err(HalError::invalid_parameter(format!(
                        "subresource {subresource} out of range ({count} subresources)"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl From<Arc<Buffer>> for MapTarget {
    fn from(buffer: Arc<Buffer>) -> Self {
        Self::Buffer(buffer)
    }
}

impl From<&Arc<Buffer>> for MapTarget {
    fn from(buffer: &Arc<Buffer>) -> Self {
        Self::Buffer(Arc::clone(buffer))
    }
}

impl From<Arc<Texture>> for MapTarget {
    fn from(texture: Arc<Texture>) -> Self {
        Self::Texture(texture)
    }
}

impl From<&Arc<Texture>> for MapTarget {
    fn from(texture: &Arc<Texture>) -> Self {
        Self::Texture(Arc::clone(texture))
    }
}

/// CPU copy of a mapped subresource.
///
/// Writes reach the GPU resource on
/// [`GraphicsDevice::unmap`] when the mode writes. Dropping without
/// unmapping discards them.
pub struct MappedResource {
    target: MapTarget,
    mode: MapMode,
    subresource: u32,
    data: Vec<u8>,
}

impl MappedResource {
    pub fn mode(&self) -> MapMode {
        self.mode
    }

    pub fn subresource(&self) -> u32 {
        self.subresource
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Decode the contents as plain-old-data values.
    pub fn read_as<T: bytemuck::Pod>(&self) -> Vec<T> {
        bytemuck::pod_collect_to_vec(&self.data)
    }

    /// Copy `values` in at byte `offset`.
    pub fn write_from<T: bytemuck::Pod>(&mut self, offset: usize, values: &[T]) -> HalResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                HalError::invalid_parameter(format!(
                    "write of {} bytes at {offset} exceeds mapping of {} bytes",
                    bytes.len(),
                    self.data.len()
                ))
            })?;
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl Drop for MappedResource {
    fn drop(&mut self) {
        self.target.tracker().release(self.subresource);
    }
}

impl fmt::Debug for MappedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedResource")
            .field("resource", &self.target.core().id())
            .field("mode", &self.mode)
            .field("subresource", &self.subresource)
            .field("len", &self.data.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);
static_assertions::assert_impl_all!(MappedResource: Send, Sync);
