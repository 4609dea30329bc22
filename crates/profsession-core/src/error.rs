//! Error taxonomy for profiling sessions and collector plugins.

use tracing::debug;

/// Error type for session and plugin failures.
///
/// Only `LockUnavailable` and `PlatformUnsupported` ever become the status of a
/// session. The plugin variants stay local to the plugin that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfilerError {
    /// Another session holds the lock, or profiling is disabled.
    LockUnavailable(String),
    /// Profiling is not implemented for this build target.
    PlatformUnsupported(String),
    /// A plugin failed to start.
    StartFailed(String),
    /// A plugin failed to stop.
    StopFailed(String),
    /// A plugin failed to export its data.
    CollectFailed(String),
}

impl ProfilerError {
    pub fn is_lock_unavailable(&self) -> bool {
        matches!(self, ProfilerError::LockUnavailable(_))
    }

    pub fn is_platform_unsupported(&self) -> bool {
        matches!(self, ProfilerError::PlatformUnsupported(_))
    }
}

impl std::fmt::Display for ProfilerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfilerError::LockUnavailable(msg) => write!(f, "profiler lock unavailable: {}", msg),
            ProfilerError::PlatformUnsupported(msg) => write!(f, "unimplemented: {}", msg),
            ProfilerError::StartFailed(msg) => write!(f, "start failed: {}", msg),
            ProfilerError::StopFailed(msg) => write!(f, "stop failed: {}", msg),
            ProfilerError::CollectFailed(msg) => write!(f, "collect failed: {}", msg),
        }
    }
}

impl std::error::Error for ProfilerError {}

/// Best-effort completion of a plugin operation.
///
/// Teardown must always reach the lock release, so stop and collect failures
/// are logged and dropped here instead of being returned.
pub trait IgnoreError {
    /// Logs the failure, if any, and discards it.
    fn ignore_error(self, profiler: &str, phase: &'static str);
}

impl IgnoreError for Result<(), ProfilerError> {
    fn ignore_error(self, profiler: &str, phase: &'static str) {
        if let Err(e) = self {
            debug!(profiler, phase, error = %e, "ignoring profiler error");
        }
    }
}
