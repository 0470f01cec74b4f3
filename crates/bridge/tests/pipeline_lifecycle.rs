mod support;

use std::sync::Arc;
use std::thread;

use arrow::array::{Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use nvq_bridge::{AllocatorRegistry, PlanEvaluator, RecordBatchSource};
use nvq_common::{
    AttemptId, BridgeConfig, NvqError, PartitionId, SessionConfig, StageId, TaskSpec,
};
use nvq_plan::{Expr, FilterRel, LiteralNode, PlanBuilder, PlanDocument, RelNode, ScanRel, TypeKind, TypeNode};

use support::{KernelFaults, TestKernel};

fn scan_rel() -> ScanRel {
    ScanRel {
        source: "t".to_string(),
        fields: vec![
            ("id".to_string(), TypeNode::scalar(TypeKind::I64, false)),
            ("name".to_string(), TypeNode::scalar(TypeKind::Utf8, false)),
        ],
    }
}

fn out_schema() -> SchemaRef {
    // The attribute list the host expects, derived from the plan's scan.
    Arc::new(scan_rel().arrow_schema().expect("mappable kinds"))
}

fn batch(ids: Vec<i64>, names: Vec<&str>) -> RecordBatch {
    RecordBatch::try_new(
        out_schema(),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(names)),
        ],
    )
    .expect("batch")
}

fn passthrough_plan() -> PlanDocument {
    let mut session = SessionConfig::new();
    session.set("spill.threshold", "128MB");
    PlanBuilder::new()
        .rel(RelNode::Filter(FilterRel {
            predicate: Expr::Literal(LiteralNode::boolean(true)),
            input: Box::new(RelNode::Scan(scan_rel())),
        }))
        .conf_extension(&session.native_subset())
        .build()
}

fn task() -> TaskSpec {
    TaskSpec {
        stage: StageId(1),
        partition: PartitionId(0),
        attempt: AttemptId(0),
    }
}

fn bridge_config() -> BridgeConfig {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    BridgeConfig {
        spill_root: std::env::temp_dir()
            .join(format!("nvq_bridge_test_{nanos}"))
            .to_string_lossy()
            .into_owned(),
        ..BridgeConfig::default()
    }
}

fn evaluator(kernel: &Arc<TestKernel>) -> PlanEvaluator {
    PlanEvaluator::new(kernel.clone(), kernel.allocators(), bridge_config())
}

#[test]
fn pipeline_runs_to_exhaustion_and_double_close_is_a_noop() {
    let allocators = AllocatorRegistry::new();
    let kernel = TestKernel::new(allocators.clone());
    let evaluator = evaluator(&kernel);

    let inputs = vec![RecordBatchSource::from_batches(
        out_schema(),
        vec![batch(vec![1, 2], vec!["a", "b"]), batch(vec![3], vec!["c"])],
    )];
    let mut iter = evaluator
        .create_pipeline(
            &passthrough_plan(),
            inputs,
            out_schema(),
            task(),
            &SessionConfig::new(),
        )
        .expect("pipeline");

    let mut rows = 0;
    while iter.has_next().expect("has_next") {
        let batch = iter.next_batch().expect("next");
        assert_eq!(batch.schema(), out_schema());
        rows += batch.num_rows();
    }
    assert_eq!(rows, 3);
    assert!(!iter.has_next().expect("idempotent end"));

    iter.close().expect("first close");
    iter.close().expect("second close is a no-op");
    assert_eq!(allocators.live(), 0);
    assert_eq!(kernel.live_pipelines(), 0);
}

#[test]
fn iterator_interface_yields_batches_in_production_order() {
    let allocators = AllocatorRegistry::new();
    let kernel = TestKernel::new(allocators.clone());
    let evaluator = evaluator(&kernel);

    let inputs = vec![RecordBatchSource::from_batches(
        out_schema(),
        vec![batch(vec![10], vec!["x"]), batch(vec![20], vec!["y"])],
    )];
    let iter = evaluator
        .create_pipeline(
            &passthrough_plan(),
            inputs,
            out_schema(),
            task(),
            &SessionConfig::new(),
        )
        .expect("pipeline");

    let firsts: Vec<i64> = iter
        .map(|b| {
            let b = b.expect("batch");
            b.column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .expect("int64 column")
                .value(0)
        })
        .collect();
    assert_eq!(firsts, vec![10, 20]);
}

#[test]
fn abandoning_the_iterator_releases_native_resources() {
    let allocators = AllocatorRegistry::new();
    let kernel = TestKernel::new(allocators.clone());
    let evaluator = evaluator(&kernel);

    let inputs = vec![RecordBatchSource::from_batches(
        out_schema(),
        vec![batch(vec![1], vec!["a"])],
    )];
    let iter = evaluator
        .create_pipeline(
            &passthrough_plan(),
            inputs,
            out_schema(),
            task(),
            &SessionConfig::new(),
        )
        .expect("pipeline");

    // Task cancellation path: the host never iterates, never calls close.
    drop(iter);
    assert_eq!(allocators.live(), 0);
    assert_eq!(kernel.live_pipelines(), 0);
}

#[test]
fn create_failure_does_not_leak_the_arena() {
    let allocators = AllocatorRegistry::new();
    let kernel = TestKernel::with_faults(
        allocators.clone(),
        KernelFaults {
            fail_create: true,
            ..KernelFaults::default()
        },
    );
    let evaluator = evaluator(&kernel);

    let err = evaluator
        .create_pipeline(
            &passthrough_plan(),
            vec![],
            out_schema(),
            task(),
            &SessionConfig::new(),
        )
        .unwrap_err();
    assert!(matches!(err, NvqError::NativeBridge(_)), "{err}");
    assert_eq!(allocators.live(), 0);
}

#[test]
fn spill_during_boundary_call_is_fatal_and_leak_free() {
    let allocators = AllocatorRegistry::new();
    let kernel = TestKernel::with_faults(
        allocators.clone(),
        KernelFaults {
            spill_during_create: Some(1000),
            ..KernelFaults::default()
        },
    );
    let evaluator = evaluator(&kernel);

    let err = evaluator
        .create_pipeline(
            &passthrough_plan(),
            vec![],
            out_schema(),
            task(),
            &SessionConfig::new(),
        )
        .unwrap_err();
    assert!(matches!(err, NvqError::PrematureSpill(_)), "{err}");
    assert_eq!(allocators.live(), 0);
}

#[test]
fn spill_after_wiring_returns_bounded_byte_count() {
    let allocators = AllocatorRegistry::new();
    let kernel = TestKernel::new(allocators.clone());
    let evaluator = evaluator(&kernel);

    let data = batch(vec![1, 2, 3], vec!["a", "b", "c"]);
    let freeable = data.get_array_memory_size() as u64;
    let inputs = vec![RecordBatchSource::from_batches(out_schema(), vec![data])];
    let mut iter = evaluator
        .create_pipeline(
            &passthrough_plan(),
            inputs,
            out_schema(),
            task(),
            &SessionConfig::new(),
        )
        .expect("pipeline");

    // The callback path the native engine takes: registry -> slot -> iterator.
    let alloc_id = kernel.last_allocator().expect("allocator recorded");
    let freed = allocators.spill(alloc_id, 1000, false).expect("spill");
    assert!(freed <= 1000);
    assert!(freed <= freeable);

    // Requesting zero is a valid no-op, not an error.
    assert_eq!(allocators.spill(alloc_id, 0, true).expect("noop"), 0);
    iter.close().expect("close");
}

#[test]
fn spill_is_safe_concurrently_with_iteration() {
    let allocators = AllocatorRegistry::new();
    let kernel = TestKernel::new(allocators.clone());
    let evaluator = evaluator(&kernel);

    let batches: Vec<RecordBatch> = (0..64)
        .map(|i| batch(vec![i], vec!["row"]))
        .collect();
    let inputs = vec![RecordBatchSource::from_batches(out_schema(), batches)];
    let mut iter = evaluator
        .create_pipeline(
            &passthrough_plan(),
            inputs,
            out_schema(),
            task(),
            &SessionConfig::new(),
        )
        .expect("pipeline");

    let alloc_id = kernel.last_allocator().expect("allocator recorded");
    let spiller = {
        let allocators = allocators.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                allocators.spill(alloc_id, 64, false).expect("live spill");
            }
        })
    };

    let mut rows = 0;
    while iter.has_next().expect("has_next") {
        rows += iter.next_batch().expect("next").num_rows();
    }
    spiller.join().expect("spiller thread");
    assert_eq!(rows, 64);
    iter.close().expect("close");
    assert_eq!(allocators.live(), 0);
}
