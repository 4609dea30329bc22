//! Interface implemented by every data collector a session drives.

use crate::error::ProfilerError;
use crate::xspace::XSpace;

/// A pluggable collector of one category of profiling data.
///
/// A session calls `start` once, then `stop` and `collect_data` in that order.
/// Implementations must tolerate `stop` without a successful `start` and
/// `collect_data` after `stop`.
pub trait CollectorPlugin: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Starts collection. A failure only disables this plugin.
    fn start(&mut self) -> Result<(), ProfilerError>;

    /// Stops collection. Errors are logged and ignored by the session.
    fn stop(&mut self) -> Result<(), ProfilerError>;

    /// Appends collected events to `space`. Errors are logged and ignored.
    fn collect_data(&mut self, space: &mut XSpace) -> Result<(), ProfilerError>;
}
