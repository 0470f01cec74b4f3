//! Native-side memory arena handles and spill routing.
//!
//! One spillable allocator exists per execution. The native engine reports
//! memory pressure through [`AllocatorRegistry::spill`], which forwards to
//! the output iterator servicing that execution. The iterator does not exist
//! yet when the allocator is created, so the slot is an explicit two-phase
//! state machine: `Unwired -> Wired`. A callback while `Unwired` is a
//! control-flow ordering bug and surfaces as
//! [`NvqError::PrematureSpill`](nvq_common::NvqError) rather than a dangling
//! reference.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use nvq_common::{AllocatorId, NvqError, Result};
use tracing::warn;

/// Something that can release memory on request.
///
/// Implemented by the output iterator's shared pipeline state.
pub trait SpillTarget: Send + Sync {
    /// Releases up to `requested_bytes`, returning bytes actually freed.
    fn spill(&self, requested_bytes: u64) -> Result<u64>;
}

enum SlotState {
    Unwired,
    Wired(Weak<dyn SpillTarget>),
}

/// Late-bound spill destination for one allocator.
pub struct SpillSlot {
    state: Mutex<SlotState>,
}

impl SpillSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Unwired),
        }
    }

    /// Wires the slot to its output iterator.
    ///
    /// Holds a weak reference so the slot never extends the iterator's
    /// lifetime past close.
    pub fn wire(&self, target: &Arc<dyn SpillTarget>) {
        let mut state = self.state.lock().expect("spill slot poisoned");
        *state = SlotState::Wired(Arc::downgrade(target));
    }

    /// Forwards one spill request to the wired target.
    ///
    /// The lock guards only the state read; the target call runs outside it,
    /// so a spill from a native thread cannot deadlock against the host
    /// thread blocked in `has_next()`.
    pub fn on_spill(&self, requested_bytes: u64, forced: bool) -> Result<u64> {
        let target = {
            let state = self.state.lock().expect("spill slot poisoned");
            match &*state {
                SlotState::Unwired => {
                    return Err(NvqError::PrematureSpill(format!(
                        "spill({requested_bytes}, forced={forced}) before the output \
                         iterator was wired"
                    )));
                }
                SlotState::Wired(weak) => weak.upgrade(),
            }
        };
        match target {
            Some(target) => target.spill(requested_bytes),
            None => {
                // Target already torn down; nothing left to free.
                warn!(requested_bytes, "spill request after target teardown");
                Ok(0)
            }
        }
    }
}

/// Process-local table of live spillable allocators.
///
/// Ids are monotonically increasing integers; the native side holds the id,
/// never the slot. Exactly one create/release pair per execution.
pub struct AllocatorRegistry {
    next_id: AtomicU64,
    slots: Mutex<HashMap<u64, Arc<SpillSlot>>>,
}

impl AllocatorRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// Allocates a spillable arena handle with an unwired spill slot.
    pub fn create_spillable(&self) -> (AllocatorId, Arc<SpillSlot>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(SpillSlot::new());
        self.slots
            .lock()
            .expect("allocator table poisoned")
            .insert(id, Arc::clone(&slot));
        (AllocatorId(id), slot)
    }

    /// Entry point for the native engine's memory-pressure callback.
    pub fn spill(&self, id: AllocatorId, requested_bytes: u64, forced: bool) -> Result<u64> {
        let slot = self
            .slots
            .lock()
            .expect("allocator table poisoned")
            .get(&id.0)
            .cloned()
            .ok_or_else(|| {
                NvqError::NativeBridge(format!("spill request for released allocator {id}"))
            })?;
        slot.on_spill(requested_bytes, forced)
    }

    /// Releases one arena handle. Releasing twice is a no-op.
    pub fn release(&self, id: AllocatorId) {
        self.slots
            .lock()
            .expect("allocator table poisoned")
            .remove(&id.0);
    }

    /// Number of live allocators (leak checks in tests).
    #[must_use]
    pub fn live(&self) -> usize {
        self.slots.lock().expect("allocator table poisoned").len()
    }
}
