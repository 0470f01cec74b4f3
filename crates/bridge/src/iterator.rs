//! The columnar iterator protocol on both sides of the boundary.
//!
//! [`RecordBatchSource`] exposes host batches to the native engine on pull;
//! [`ColumnarBatchOutIterator`] pulls native-produced batches back, services
//! spill requests, and releases the pipeline and allocator handles exactly
//! once.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use nvq_common::{AllocatorId, NvqError, PipelineId, Result};
use tracing::debug;

use crate::allocator::{AllocatorRegistry, SpillTarget};
use crate::boundary::NativeBoundary;

/// Pull adapter over a host-side batch source.
///
/// Ownership of the underlying batches stays with the host; the adapter
/// never mutates them. End-of-stream is idempotent: once `has_next` returns
/// false it stays false no matter how often the native side polls.
pub struct RecordBatchSource {
    schema: SchemaRef,
    state: Mutex<SourceState>,
}

struct SourceState {
    iter: Box<dyn Iterator<Item = Result<RecordBatch>> + Send>,
    peeked: Option<Result<RecordBatch>>,
    exhausted: bool,
}

impl RecordBatchSource {
    /// Adapter over a lazy host iterator.
    pub fn new(
        schema: SchemaRef,
        iter: Box<dyn Iterator<Item = Result<RecordBatch>> + Send>,
    ) -> Self {
        Self {
            schema,
            state: Mutex::new(SourceState {
                iter,
                peeked: None,
                exhausted: false,
            }),
        }
    }

    /// Adapter over already-materialized batches.
    #[must_use]
    pub fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        let queue: VecDeque<RecordBatch> = batches.into();
        Self::new(schema, Box::new(queue.into_iter().map(Ok)))
    }

    /// Schema of every batch this source yields.
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Whether another batch (or a pending error) is available.
    pub fn has_next(&self) -> bool {
        let mut state = self.state.lock().expect("input source poisoned");
        if state.exhausted {
            return false;
        }
        if state.peeked.is_none() {
            state.peeked = state.iter.next();
            if state.peeked.is_none() {
                state.exhausted = true;
            }
        }
        state.peeked.is_some()
    }

    /// Takes the next batch. Returns `None` after exhaustion, repeatedly.
    pub fn next_batch(&self) -> Option<Result<RecordBatch>> {
        let mut state = self.state.lock().expect("input source poisoned");
        if state.exhausted {
            return None;
        }
        let item = match state.peeked.take() {
            Some(item) => Some(item),
            None => state.iter.next(),
        };
        if item.is_none() {
            state.exhausted = true;
        }
        item
    }
}

/// State shared between the output iterator and the spill slot.
///
/// Kept behind an `Arc` so the allocator's spill path can reach the pipeline
/// without tying its lifetime to the iterator value the host holds. No lock
/// is held across boundary calls; `closed` is the only synchronization
/// point, so a spill on a native thread cannot deadlock against the host
/// thread blocked in `has_next`.
pub(crate) struct PipelineCore {
    pipeline: PipelineId,
    allocator: AllocatorId,
    boundary: Arc<dyn NativeBoundary>,
    allocators: Arc<AllocatorRegistry>,
    closed: AtomicBool,
}

impl PipelineCore {
    pub(crate) fn new(
        pipeline: PipelineId,
        allocator: AllocatorId,
        boundary: Arc<dyn NativeBoundary>,
        allocators: Arc<AllocatorRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            allocator,
            boundary,
            allocators,
            closed: AtomicBool::new(false),
        })
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let closed = self.boundary.pipeline_close(self.pipeline);
        // The arena goes away even if the pipeline teardown complained.
        self.allocators.release(self.allocator);
        debug!(pipeline = %self.pipeline, allocator = %self.allocator, "pipeline closed");
        closed
    }
}

impl SpillTarget for PipelineCore {
    fn spill(&self, requested_bytes: u64) -> Result<u64> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(0);
        }
        self.boundary.pipeline_spill(self.pipeline, requested_bytes)
    }
}

impl Drop for PipelineCore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Lazy, finite, forward-only sequence of native-produced columnar batches.
///
/// Not restartable. Must be closed exactly once; `close` is idempotent and
/// `Drop` closes as well, so abandonment (host-side task cancellation)
/// cannot leak the pipeline or its arena.
pub struct ColumnarBatchOutIterator {
    core: Arc<PipelineCore>,
    schema: SchemaRef,
}

impl std::fmt::Debug for ColumnarBatchOutIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnarBatchOutIterator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl ColumnarBatchOutIterator {
    pub(crate) fn new(core: Arc<PipelineCore>, schema: SchemaRef) -> Self {
        Self { core, schema }
    }

    /// Expected output schema supplied at construction.
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Blocking check for a next batch. False forever once closed.
    pub fn has_next(&self) -> Result<bool> {
        if self.core.closed.load(Ordering::Acquire) {
            return Ok(false);
        }
        self.core.boundary.pipeline_has_next(self.core.pipeline)
    }

    /// Takes the next batch, re-tagged with the expected output schema.
    ///
    /// Arrow columns are refcounted, so the re-tag copies the batch header,
    /// not the data.
    pub fn next_batch(&mut self) -> Result<RecordBatch> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(NvqError::NativeBridge(
                "next_batch on a closed iterator".to_string(),
            ));
        }
        let native = self.core.boundary.pipeline_next(self.core.pipeline)?;
        RecordBatch::try_new(self.schema.clone(), native.columns().to_vec()).map_err(|e| {
            NvqError::NativeBridge(format!(
                "native batch does not match expected output schema: {e}"
            ))
        })
    }

    /// Forwards a reclamation request to the native pipeline.
    ///
    /// Never fails the caller after wiring: freeing zero bytes is a valid
    /// outcome. Safe to call concurrently with iteration.
    pub fn spill(&self, requested_bytes: u64) -> Result<u64> {
        self.core.spill(requested_bytes)
    }

    /// Releases the pipeline handle and the allocator handle.
    ///
    /// Idempotent: task-abandonment paths may close twice.
    pub fn close(&mut self) -> Result<()> {
        self.core.close()
    }
}

impl Iterator for ColumnarBatchOutIterator {
    type Item = Result<RecordBatch>;

    /// A boundary failure ends the stream: the pipeline is closed and the
    /// error is yielded once, so `for batch in iter` cannot spin on a
    /// persistently failing kernel.
    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.has_next() {
            Ok(true) => self.next_batch(),
            Ok(false) => return None,
            Err(e) => Err(e),
        };
        if item.is_err() {
            let _ = self.core.close();
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{PipelineSpec, ValidationInfo};
    use arrow::array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};

    fn test_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]))
    }

    fn test_batch(values: Vec<i64>) -> RecordBatch {
        RecordBatch::try_new(test_schema(), vec![Arc::new(Int64Array::from(values))])
            .expect("batch")
    }

    #[test]
    fn source_end_of_stream_is_idempotent() {
        let source = RecordBatchSource::from_batches(test_schema(), vec![test_batch(vec![1, 2])]);
        assert!(source.has_next());
        assert!(source.has_next());
        let batch = source.next_batch().expect("one batch").expect("ok");
        assert_eq!(batch.num_rows(), 2);
        assert!(!source.has_next());
        assert!(!source.has_next());
        assert!(source.next_batch().is_none());
        assert!(source.next_batch().is_none());
    }

    #[test]
    fn source_surfaces_pending_errors_through_next() {
        let items: Vec<Result<RecordBatch>> = vec![
            Ok(test_batch(vec![1])),
            Err(NvqError::NativeBridge("decode failed".to_string())),
        ];
        let source = RecordBatchSource::new(test_schema(), Box::new(items.into_iter()));
        assert!(source.has_next());
        assert!(source.next_batch().unwrap().is_ok());
        assert!(source.has_next());
        assert!(source.next_batch().unwrap().is_err());
        assert!(!source.has_next());
    }

    #[test]
    fn empty_source_is_immediately_exhausted() {
        let source = RecordBatchSource::from_batches(test_schema(), vec![]);
        assert!(!source.has_next());
        assert!(source.next_batch().is_none());
    }

    /// Boundary whose pipeline calls always fail, as after a kernel crash.
    struct DeadKernel;

    impl NativeBoundary for DeadKernel {
        fn do_validate(&self, _plan_bytes: &[u8]) -> bool {
            false
        }

        fn do_validate_with_diagnostics(&self, _plan_bytes: &[u8]) -> ValidationInfo {
            ValidationInfo::unsupported(vec!["kernel unavailable".to_string()])
        }

        fn create_pipeline(
            &self,
            _spec: PipelineSpec,
            _inputs: Vec<RecordBatchSource>,
        ) -> Result<PipelineId> {
            Err(NvqError::NativeBridge("kernel unavailable".to_string()))
        }

        fn pipeline_has_next(&self, _pipeline: PipelineId) -> Result<bool> {
            Err(NvqError::NativeBridge("kernel unavailable".to_string()))
        }

        fn pipeline_next(&self, _pipeline: PipelineId) -> Result<RecordBatch> {
            Err(NvqError::NativeBridge("kernel unavailable".to_string()))
        }

        fn pipeline_spill(&self, _pipeline: PipelineId, _requested_bytes: u64) -> Result<u64> {
            Ok(0)
        }

        fn pipeline_close(&self, _pipeline: PipelineId) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn iterator_adapter_terminates_after_boundary_failure() {
        let allocators = AllocatorRegistry::new();
        let (alloc_id, _slot) = allocators.create_spillable();
        let core = PipelineCore::new(
            PipelineId(7),
            alloc_id,
            Arc::new(DeadKernel),
            Arc::clone(&allocators),
        );
        let mut iter = ColumnarBatchOutIterator::new(core, test_schema());

        let first = iter.next().expect("error yielded once");
        assert!(matches!(first, Err(NvqError::NativeBridge(_))));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
        assert_eq!(allocators.live(), 0);
    }
}
