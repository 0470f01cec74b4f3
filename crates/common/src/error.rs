use thiserror::Error;

/// Canonical NVQ error taxonomy used across crates.
///
/// Classification guidance:
/// - [`NvqError::TypeMismatch`]: literal/type construction contract violations
///   discovered while building a plan; a programming error in plan
///   construction, never retried
/// - [`NvqError::NativeBridge`]: failures signaled by the native boundary
///   call, carrying the native diagnostic text; fallback is the caller's call
/// - [`NvqError::PrematureSpill`]: internal ordering violation, the native
///   side requested memory before the output iterator was wired; fatal to the
///   execution
/// - [`NvqError::InvalidConfig`]: configuration/contract violations on the
///   host side (bad handles, malformed plan bytes, option misuse)
/// - [`NvqError::Io`]: raw filesystem IO failures from std APIs
#[derive(Debug, Error)]
pub enum NvqError {
    /// A literal's declared type and its runtime value disagree.
    ///
    /// Examples:
    /// - value out of range for the declared integer width
    /// - explicit type node of a different kind than the value
    /// - decimal unscaled value exceeding its declared precision
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Failure reported by the native compute engine across the boundary.
    ///
    /// Examples:
    /// - plan rejected at pipeline creation
    /// - pipeline handle no longer valid
    /// - batch production failure inside the native kernel
    #[error("native bridge error: {0}")]
    NativeBridge(String),

    /// Spill callback fired before the output iterator was wired.
    ///
    /// Indicates a control-flow ordering bug in the bridge, not a recoverable
    /// memory-pressure condition. Must abort the execution.
    #[error("premature spill: {0}")]
    PrematureSpill(String),

    /// Invalid or inconsistent configuration/contract state.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard NVQ result alias.
pub type Result<T> = std::result::Result<T, NvqError>;
