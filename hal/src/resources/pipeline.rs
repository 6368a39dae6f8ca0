//! Pipeline resource with lazy realization.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::{DeviceResource, ResourceCore, ResourceLayout};
use crate::binding::{ExplicitBindings, GlBindings};
use crate::device::GraphicsDevice;
use crate::error::HalResult;
use crate::native::{RawObject, RawPipeline};
use crate::types::{PipelineDescription, ResourceId};

/// Native state of a realized pipeline.
#[derive(Debug)]
pub(crate) enum RealizedPipeline {
    /// Pipeline object of an explicit backend with its slot table.
    Explicit { raw: RawPipeline, bindings: ExplicitBindings },
    /// Linked program with its reflected binding tables.
    Gl(GlBindings),
}

impl RealizedPipeline {
    pub(crate) fn raw_object(&self) -> RawObject {
        match self {
            Self::Explicit { raw, .. } => RawObject::Pipeline(*raw),
            Self::Gl(bindings) => RawObject::Program(bindings.program),
        }
    }
}

/// Realized state shared by every pipeline realized with an equal
/// description.
///
/// Counts the pipelines whose disposal has not completed yet. The native
/// object is destroyed when the count drops to zero, and the state can no
/// longer be acquired afterwards.
#[derive(Debug)]
pub(crate) struct SharedPipeline {
    realized: RealizedPipeline,
    users: AtomicU32,
}

impl SharedPipeline {
    pub fn new(realized: RealizedPipeline) -> Self {
        Self {
            realized,
            users: AtomicU32::new(1),
        }
    }

    pub fn realized(&self) -> &RealizedPipeline {
        &self.realized
    }

    /// Register one more pipeline. Fails once the native object is gone.
    pub fn acquire(&self) -> bool {
        self.users
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n > 0).then_some(n + 1))
            .is_ok()
    }

    pub fn in_use(&self) -> bool {
        self.users.load(Ordering::Acquire) > 0
    }

    /// Unregister a pipeline. Returns true for the last one.
    pub fn release(&self) -> bool {
        self.users.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

/// A graphics or compute pipeline.
///
/// Creation only validates the description. The native pipeline (and its
/// translated binding table) is built the first time the pipeline is bound,
/// or eagerly through
/// [`GraphicsDevice::prepare_pipeline`](crate::GraphicsDevice::prepare_pipeline).
///
/// With the pipeline cache enabled, pipelines with equal descriptions share
/// one native object. Each pipeline still has its own identity and is
/// disposed on its own; the native object goes with the last of them.
pub struct Pipeline {
    pub(crate) core: Arc<ResourceCore>,
    pub(crate) device: Arc<GraphicsDevice>,
    description: PipelineDescription,
    realized: OnceLock<Arc<SharedPipeline>>,
    realize_lock: Mutex<()>,
}

impl Pipeline {
    pub(crate) fn new(device: Arc<GraphicsDevice>, description: PipelineDescription) -> Self {
        Self {
            core: Arc::new(ResourceCore::new(
                "Pipeline",
                description.label().map(str::to_string),
            )),
            device,
            description,
            realized: OnceLock::new(),
            realize_lock: Mutex::new(()),
        }
    }

    pub fn description(&self) -> &PipelineDescription {
        &self.description
    }

    pub fn is_compute(&self) -> bool {
        self.description.is_compute()
    }

    /// Layouts in set order.
    pub fn resource_layouts(&self) -> &[Arc<ResourceLayout>] {
        self.description.resource_layouts()
    }

    /// Number of resource sets that can be bound.
    pub fn set_count(&self) -> u32 {
        self.description.resource_layouts().len() as u32
    }

    /// Whether native state has been built.
    pub fn is_realized(&self) -> bool {
        self.realized.get().is_some()
    }

    pub(crate) fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    /// Realize on first use. Concurrent callers wait for the first one.
    pub(crate) fn realized(&self) -> HalResult<&RealizedPipeline> {
        if let Some(state) = self.realized.get() {
            return Ok(state.realized());
        }

        let _guard = self.realize_lock.lock();
        if let Some(state) = self.realized.get() {
            return Ok(state.realized());
        }
        self.core.ensure_live()?;

        crate::profile_scope!("realize_pipeline");
        let realize = || -> HalResult<RealizedPipeline> {
            let realized = self.device.realize_pipeline(&self.description)?;
            log::debug!("Realized {}", self.core.describe());
            if let Some(name) = self.core.name() {
                self.device.label_objects(&[realized.raw_object()], &name);
            }
            Ok(realized)
        };
        let state = if self.device.options().pipeline_cache {
            self.device.pipeline_cache().get_or_realize(&self.description, realize)?
        } else {
            Arc::new(SharedPipeline::new(realize()?))
        };
        Ok(self.realized.get_or_init(|| state).realized())
    }

    /// Native state if already realized. Never realizes.
    pub(crate) fn realized_state(&self) -> Option<&RealizedPipeline> {
        self.realized.get().map(|state| state.realized())
    }

    pub(crate) fn raw_objects(&self) -> Vec<RawObject> {
        self.realized_state().map(RealizedPipeline::raw_object).into_iter().collect()
    }

    fn retire(&self) {
        // A pipeline realized after this point would escape its entry.
        let _guard = self.realize_lock.lock();
        self.device.retire_shared(&self.core, self.realized.get().cloned());
    }
}

impl DeviceResource for Pipeline {
    fn id(&self) -> ResourceId {
        self.core.id()
    }

    fn name(&self) -> Option<String> {
        self.core.name()
    }

    fn set_name(&self, name: &str) {
        self.core.set_name(name);
        self.device.label_objects(&self.raw_objects(), name);
    }

    fn dispose(&self) {
        self.retire();
    }

    fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.core.is_disposed() {
            self.retire();
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.core.id())
            .field("label", &self.description.label())
            .field("compute", &self.is_compute())
            .field("realized", &self.is_realized())
            .finish()
    }
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);
