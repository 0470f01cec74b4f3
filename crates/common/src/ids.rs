//! Typed identifiers crossing the host/native boundary.
//!
//! All handles are process-local integers; the host never holds a raw native
//! pointer. Wrapper objects own exactly one handle and release it exactly
//! once.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable stage identifier, passed through to the native side as a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable partition identifier within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task attempt number for one partition execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token for a native memory arena scoped to one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocatorId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for AllocatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token for a running native pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task-identifying tokens for one execution request.
///
/// Consumed by the native side only for diagnostics and spill-file naming;
/// the bridge itself treats them as opaque passthrough values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Stage this task belongs to.
    pub stage: StageId,
    /// Partition this task processes.
    pub partition: PartitionId,
    /// Attempt number (re-executions increment this).
    pub attempt: AttemptId,
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.stage, self.partition, self.attempt)
    }
}
