//! Deferred destruction of native objects.
//!
//! GPU work runs behind the CPU, so dropping or disposing a resource cannot
//! destroy its native objects right away. Instead the device queues them
//! here together with the timeline value last submitted at that moment:
//!
//! ```text
//! dispose(resource)
//!   -> entry { core, native objects, marker = last submitted value }
//!
//! after every submit / on wait_for_idle
//!   -> destroy every entry with
//!        completed >= max(marker, core.last_use)
//!        and no open command list still referencing it
//!      in enqueue order
//! ```
//!
//! The queue holds resource cores and raw handles only, never the resource
//! objects, so entries cannot keep the device alive.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::native::RawObject;
use crate::resources::{ResourceCore, SharedPipeline};

/// One queued disposal.
#[derive(Debug)]
pub(crate) struct DisposalEntry {
    pub core: Arc<ResourceCore>,
    pub objects: Vec<RawObject>,
    /// Last submitted timeline value when the entry was queued.
    pub marker: u64,
    /// Pipeline state this resource shares with others. Released, not
    /// destroyed, with the entry.
    pub shared: Option<Arc<SharedPipeline>>,
}

impl DisposalEntry {
    fn is_eligible(&self, completed: u64) -> bool {
        completed >= self.marker.max(self.core.last_use()) && self.core.pending_refs() == 0
    }
}

/// FIFO of resources waiting for the GPU to let go of them.
#[derive(Debug, Default)]
pub(crate) struct DisposalQueue {
    entries: Mutex<VecDeque<DisposalEntry>>,
}

impl DisposalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a disposal. Never blocks on the GPU.
    pub fn enqueue(&self, core: Arc<ResourceCore>, objects: Vec<RawObject>, marker: u64) {
        self.push(DisposalEntry {
            core,
            objects,
            marker,
            shared: None,
        });
    }

    /// Queue a resource whose native state is shared through `state`.
    pub fn enqueue_shared(&self, core: Arc<ResourceCore>, state: Arc<SharedPipeline>, marker: u64) {
        self.push(DisposalEntry {
            core,
            objects: Vec::new(),
            marker,
            shared: Some(state),
        });
    }

    fn push(&self, entry: DisposalEntry) {
        log::trace!("Queued {} for disposal at marker {}", entry.core.describe(), entry.marker);
        self.entries.lock().push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove every entry that may be destroyed once `completed` has
    /// retired, preserving enqueue order.
    pub fn take_eligible(&self, completed: u64) -> Vec<DisposalEntry> {
        let mut entries = self.entries.lock();
        let mut eligible = Vec::new();
        let mut remaining = VecDeque::with_capacity(entries.len());
        for entry in entries.drain(..) {
            if entry.is_eligible(completed) {
                eligible.push(entry);
            } else {
                remaining.push_back(entry);
            }
        }
        *entries = remaining;
        eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::RawBuffer;

    fn core(name: &str) -> Arc<ResourceCore> {
        Arc::new(ResourceCore::new("Buffer", Some(name.to_string())))
    }

    #[test]
    fn test_waits_for_marker_and_last_use() {
        let queue = DisposalQueue::new();
        let a = core("a");
        let b = core("b");
        b.record_use(5);
        queue.enqueue(Arc::clone(&a), vec![RawObject::Buffer(RawBuffer(1))], 2);
        queue.enqueue(Arc::clone(&b), vec![RawObject::Buffer(RawBuffer(2))], 3);

        assert!(queue.take_eligible(1).is_empty());
        let first = queue.take_eligible(3);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].core.id(), a.id());
        assert_eq!(queue.len(), 1);

        let second = queue.take_eligible(5);
        assert_eq!(second[0].core.id(), b.id());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_preserves_enqueue_order() {
        let queue = DisposalQueue::new();
        let cores: Vec<_> = (0..4).map(|i| core(&format!("r{i}"))).collect();
        for (i, core) in cores.iter().enumerate() {
            queue.enqueue(Arc::clone(core), Vec::new(), i as u64);
        }
        let taken: Vec<_> = queue.take_eligible(10).into_iter().map(|e| e.core.id()).collect();
        assert_eq!(taken, cores.iter().map(|c| c.id()).collect::<Vec<_>>());
    }

    #[test]
    fn test_open_recordings_hold_entries() {
        let queue = DisposalQueue::new();
        let a = core("a");
        a.add_pending();
        queue.enqueue(Arc::clone(&a), Vec::new(), 0);
        assert!(queue.take_eligible(100).is_empty());
        a.release_pending();
        assert_eq!(queue.take_eligible(100).len(), 1);
    }
}
