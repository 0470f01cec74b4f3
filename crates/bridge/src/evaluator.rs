//! Plan validation and native pipeline creation.

use std::path::Path;
use std::sync::Arc;

use arrow_schema::SchemaRef;
use nvq_common::{AllocatorId, BridgeConfig, Result, SessionConfig, TaskSpec};
use nvq_plan::{conf_extension_bytes, PlanDocument};
use tracing::{debug, info};

use crate::allocator::{AllocatorRegistry, SpillTarget};
use crate::boundary::{NativeBoundary, PipelineSpec, ValidationInfo};
use crate::iterator::{ColumnarBatchOutIterator, PipelineCore, RecordBatchSource};
use crate::scratch;

/// Releases an allocator on drop unless disarmed.
///
/// Any failure between arena allocation and pipeline-handle receipt must not
/// leak the arena; this guard covers every early-exit path.
struct ArenaGuard<'a> {
    allocators: &'a AllocatorRegistry,
    id: AllocatorId,
    armed: bool,
}

impl ArenaGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ArenaGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.allocators.release(self.id);
        }
    }
}

/// Front door for running plan fragments natively.
///
/// Validation is a pure query; `create_pipeline` starts exactly one native
/// pipeline per call and hands back the output iterator that owns its
/// handles.
pub struct PlanEvaluator {
    boundary: Arc<dyn NativeBoundary>,
    allocators: Arc<AllocatorRegistry>,
    config: BridgeConfig,
}

impl PlanEvaluator {
    /// Evaluator over a boundary implementation and a shared allocator
    /// registry.
    ///
    /// The registry is shared with the native side, which routes its
    /// memory-pressure callbacks through [`AllocatorRegistry::spill`].
    pub fn new(
        boundary: Arc<dyn NativeBoundary>,
        allocators: Arc<AllocatorRegistry>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            boundary,
            allocators,
            config,
        }
    }

    /// Checks whether the native engine supports `plan_bytes`.
    #[must_use]
    pub fn validate(&self, plan_bytes: &[u8]) -> bool {
        self.boundary.do_validate(plan_bytes)
    }

    /// Checks support and returns ordered fallback reasons on rejection.
    #[must_use]
    pub fn validate_with_diagnostics(&self, plan_bytes: &[u8]) -> ValidationInfo {
        let outcome = self.boundary.do_validate_with_diagnostics(plan_bytes);
        if !outcome.supported {
            info!(
                reasons = outcome.fallback_reasons.len(),
                "native validation rejected plan"
            );
        }
        outcome
    }

    /// Serializes `plan`, starts a native pipeline over `inputs`, and wraps
    /// the resulting handle in an output iterator.
    ///
    /// The allocator is created first with an unwired spill slot; the slot is
    /// wired to the iterator as the final step, after the pipeline handle
    /// exists. A spill request from the native side in between is a fatal
    /// ordering violation surfaced by the allocator, not recovered here.
    pub fn create_pipeline(
        &self,
        plan: &PlanDocument,
        inputs: Vec<RecordBatchSource>,
        out_schema: SchemaRef,
        task: TaskSpec,
        session: &SessionConfig,
    ) -> Result<ColumnarBatchOutIterator> {
        let (alloc_id, slot) = self.allocators.create_spillable();
        let guard = ArenaGuard {
            allocators: &self.allocators,
            id: alloc_id,
            armed: true,
        };

        let spill_dir = scratch::create_spill_dir(Path::new(&self.config.spill_root), task)?;
        let plan_bytes = plan.to_bytes();
        let conf_bytes = conf_extension_bytes(&session.native_subset());

        let pipeline = self.boundary.create_pipeline(
            PipelineSpec {
                allocator: alloc_id,
                plan_bytes,
                task,
                save_input: self.config.save_input,
                spill_dir,
                conf_bytes,
            },
            inputs,
        )?;

        // Handle received; the iterator owns the release paths from here on.
        guard.disarm();
        let core = PipelineCore::new(
            pipeline,
            alloc_id,
            Arc::clone(&self.boundary),
            Arc::clone(&self.allocators),
        );
        let target: Arc<dyn SpillTarget> = core.clone();
        slot.wire(&target);
        debug!(%pipeline, allocator = %alloc_id, task = %task, "native pipeline created");
        Ok(ColumnarBatchOutIterator::new(core, out_schema))
    }
}
