//! Native-execution bridge for NVQ.
//!
//! Architecture role:
//! - crosses serialized plan fragments and host batch sources into a native,
//!   vectorized compute engine
//! - manages the per-execution memory arena, including spill callbacks that
//!   arrive from native threads
//! - surfaces native output as a pull-based columnar iterator with
//!   exactly-once handle release
//!
//! Key modules:
//! - [`boundary`]: the opaque-handle call surface ([`NativeBoundary`])
//! - [`allocator`]: arena registry and two-phase spill wiring
//! - [`iterator`]: input adapter and output iterator
//! - [`evaluator`]: validation and pipeline creation ([`PlanEvaluator`])
//! - [`scratch`]: per-task spill directory layout

pub mod allocator;
pub mod boundary;
pub mod evaluator;
pub mod iterator;
pub mod scratch;

pub use allocator::{AllocatorRegistry, SpillSlot, SpillTarget};
pub use boundary::{NativeBoundary, PipelineSpec, ValidationInfo};
pub use evaluator::PlanEvaluator;
pub use iterator::{ColumnarBatchOutIterator, RecordBatchSource};
