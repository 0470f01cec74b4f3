//! The call surface the bridge crosses into the native engine.
//!
//! Every handle in this contract is a process-local integer token; the host
//! never dereferences native memory. Implementations must be thread-safe:
//! spill requests arrive on native threads concurrently with the host thread
//! blocked in `pipeline_has_next`/`pipeline_next`.

use std::path::PathBuf;

use arrow::record_batch::RecordBatch;
use nvq_common::{AllocatorId, PipelineId, Result, TaskSpec};
use serde::{Deserialize, Serialize};

use crate::iterator::RecordBatchSource;

/// Structured outcome of a native validation pass.
///
/// Validation failures are data, not errors: the host reads the reasons and
/// picks a non-native execution path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationInfo {
    /// Whether the native engine can execute the plan.
    pub supported: bool,
    /// Human-readable fallback reasons, in the order the validator found
    /// them. Empty when `supported` is true.
    pub fallback_reasons: Vec<String>,
}

impl ValidationInfo {
    /// A passing validation result.
    #[must_use]
    pub fn supported() -> Self {
        Self {
            supported: true,
            fallback_reasons: Vec::new(),
        }
    }

    /// A failing validation result with ordered reasons.
    #[must_use]
    pub fn unsupported(fallback_reasons: Vec<String>) -> Self {
        Self {
            supported: false,
            fallback_reasons,
        }
    }
}

/// Everything the native engine needs to start one pipeline, minus the input
/// adapters.
#[derive(Debug)]
pub struct PipelineSpec {
    /// Arena this pipeline allocates from.
    pub allocator: AllocatorId,
    /// Serialized plan document.
    pub plan_bytes: Vec<u8>,
    /// Passthrough task identity.
    pub task: TaskSpec,
    /// When set, the native side persists its inputs for offline debugging.
    pub save_input: bool,
    /// Scratch directory for this execution's spill files.
    pub spill_dir: PathBuf,
    /// Serialized session configuration map.
    pub conf_bytes: Vec<u8>,
}

/// The boundary the bridge calls across into the native engine.
///
/// Calls are blocking from the host thread's perspective. Failures carry the
/// native diagnostic message as
/// [`NvqError::NativeBridge`](nvq_common::NvqError).
pub trait NativeBoundary: Send + Sync {
    /// Checks plan compatibility without executing it. Pure query.
    fn do_validate(&self, plan_bytes: &[u8]) -> bool;

    /// Checks plan compatibility and reports structured fallback reasons.
    /// Pure query; safe to call repeatedly and concurrently.
    fn do_validate_with_diagnostics(&self, plan_bytes: &[u8]) -> ValidationInfo;

    /// Starts exactly one native pipeline and returns its handle.
    fn create_pipeline(
        &self,
        spec: PipelineSpec,
        inputs: Vec<RecordBatchSource>,
    ) -> Result<PipelineId>;

    /// Blocks until the pipeline knows whether another batch exists.
    fn pipeline_has_next(&self, pipeline: PipelineId) -> Result<bool>;

    /// Takes the next native-produced batch. Only valid after a `true`
    /// `pipeline_has_next`.
    fn pipeline_next(&self, pipeline: PipelineId) -> Result<RecordBatch>;

    /// Asks the pipeline to shrink its arena; returns bytes actually freed.
    fn pipeline_spill(&self, pipeline: PipelineId, requested_bytes: u64) -> Result<u64>;

    /// Destroys the pipeline instance. Called exactly once per handle.
    fn pipeline_close(&self, pipeline: PipelineId) -> Result<()>;
}
