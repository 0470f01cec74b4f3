//! In-process stand-in for the native compute engine.
//!
//! Implements [`NativeBoundary`] over a handle table, the same arena+index
//! discipline the real engine uses: callers only ever see integer tokens.
//! The kernel passes input batches through unchanged, which is enough to
//! exercise the bridge's handle lifecycle, spill routing, and iterator
//! protocol.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arrow::record_batch::RecordBatch;
use nvq_bridge::{AllocatorRegistry, NativeBoundary, PipelineSpec, RecordBatchSource, ValidationInfo};
use nvq_common::{AllocatorId, NvqError, PipelineId, Result};
use nvq_plan::{PlanDocument, RelNode};

/// Failure-injection knobs for one kernel instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelFaults {
    /// Reject `create_pipeline` with a native diagnostic.
    pub fail_create: bool,
    /// Demand this many bytes from the allocator during the boundary call
    /// itself, before the host can wire the output iterator.
    pub spill_during_create: Option<u64>,
}

struct PipelineState {
    allocator: AllocatorId,
    output: VecDeque<RecordBatch>,
    freeable_bytes: u64,
}

/// Handle-table test kernel.
pub struct TestKernel {
    allocators: Arc<AllocatorRegistry>,
    faults: KernelFaults,
    next_handle: AtomicU64,
    pipelines: Mutex<HashMap<u64, PipelineState>>,
    last_allocator: Mutex<Option<AllocatorId>>,
}

impl TestKernel {
    pub fn new(allocators: Arc<AllocatorRegistry>) -> Arc<Self> {
        Self::with_faults(allocators, KernelFaults::default())
    }

    pub fn with_faults(allocators: Arc<AllocatorRegistry>, faults: KernelFaults) -> Arc<Self> {
        Arc::new(Self {
            allocators,
            faults,
            next_handle: AtomicU64::new(1),
            pipelines: Mutex::new(HashMap::new()),
            last_allocator: Mutex::new(None),
        })
    }

    /// Allocator id of the most recently created pipeline.
    pub fn last_allocator(&self) -> Option<AllocatorId> {
        *self.last_allocator.lock().unwrap()
    }

    /// Number of pipelines not yet closed.
    pub fn live_pipelines(&self) -> usize {
        self.pipelines.lock().unwrap().len()
    }

    /// The registry this kernel routes spill callbacks through.
    pub fn allocators(&self) -> Arc<AllocatorRegistry> {
        Arc::clone(&self.allocators)
    }

    fn collect_reasons(rel: &RelNode, reasons: &mut Vec<String>) {
        if let RelNode::Aggregate(_) = rel {
            reasons.push("aggregate execution is not available in this kernel".to_string());
        }
        for child in rel.children() {
            Self::collect_reasons(child, reasons);
        }
    }

    fn state<T>(
        &self,
        pipeline: PipelineId,
        f: impl FnOnce(&mut PipelineState) -> Result<T>,
    ) -> Result<T> {
        let mut pipelines = self.pipelines.lock().unwrap();
        let state = pipelines
            .get_mut(&pipeline.0)
            .ok_or_else(|| NvqError::NativeBridge(format!("unknown pipeline handle {pipeline}")))?;
        f(state)
    }
}

impl NativeBoundary for TestKernel {
    fn do_validate(&self, plan_bytes: &[u8]) -> bool {
        self.do_validate_with_diagnostics(plan_bytes).supported
    }

    fn do_validate_with_diagnostics(&self, plan_bytes: &[u8]) -> ValidationInfo {
        let doc = match PlanDocument::from_bytes(plan_bytes) {
            Ok(doc) => doc,
            Err(e) => {
                return ValidationInfo::unsupported(vec![format!("plan bytes rejected: {e}")]);
            }
        };
        let mut reasons = Vec::new();
        for rel in &doc.rels {
            Self::collect_reasons(rel, &mut reasons);
        }
        if reasons.is_empty() {
            ValidationInfo::supported()
        } else {
            ValidationInfo::unsupported(reasons)
        }
    }

    fn create_pipeline(
        &self,
        spec: PipelineSpec,
        inputs: Vec<RecordBatchSource>,
    ) -> Result<PipelineId> {
        if self.faults.fail_create {
            return Err(NvqError::NativeBridge(
                "simulated native pipeline-creation failure".to_string(),
            ));
        }
        if let Some(bytes) = self.faults.spill_during_create {
            // Memory pressure inside the boundary call; the host has not
            // wired the iterator yet.
            self.allocators.spill(spec.allocator, bytes, false)?;
        }
        PlanDocument::from_bytes(&spec.plan_bytes)
            .map_err(|e| NvqError::NativeBridge(format!("plan rejected at creation: {e}")))?;

        let mut output = VecDeque::new();
        let mut freeable_bytes = 0_u64;
        for input in &inputs {
            while let Some(batch) = input.next_batch() {
                let batch = batch?;
                freeable_bytes += batch.get_array_memory_size() as u64;
                output.push_back(batch);
            }
        }

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.pipelines.lock().unwrap().insert(
            handle,
            PipelineState {
                allocator: spec.allocator,
                output,
                freeable_bytes,
            },
        );
        *self.last_allocator.lock().unwrap() = Some(spec.allocator);
        Ok(PipelineId(handle))
    }

    fn pipeline_has_next(&self, pipeline: PipelineId) -> Result<bool> {
        self.state(pipeline, |s| Ok(!s.output.is_empty()))
    }

    fn pipeline_next(&self, pipeline: PipelineId) -> Result<RecordBatch> {
        self.state(pipeline, |s| {
            s.output.pop_front().ok_or_else(|| {
                NvqError::NativeBridge("pipeline_next past end of output".to_string())
            })
        })
    }

    fn pipeline_spill(&self, pipeline: PipelineId, requested_bytes: u64) -> Result<u64> {
        self.state(pipeline, |s| {
            let freed = requested_bytes.min(s.freeable_bytes);
            s.freeable_bytes -= freed;
            Ok(freed)
        })
    }

    fn pipeline_close(&self, pipeline: PipelineId) -> Result<()> {
        let removed = self.pipelines.lock().unwrap().remove(&pipeline.0);
        let state = removed.ok_or_else(|| {
            NvqError::NativeBridge(format!("close of unknown pipeline handle {pipeline}"))
        })?;
        // Close must come before allocator release; the arena must still be
        // live while the pipeline tears down.
        assert!(
            self.allocators.spill(state.allocator, 0, false).is_ok(),
            "allocator released before pipeline close"
        );
        Ok(())
    }
}
