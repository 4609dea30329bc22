//! Process-wide exclusivity for profiling sessions.
//!
//! A [`ProfilerGate`] is one lock domain. At most one [`ProfilerLock`] per gate
//! is active at any time; acquiring a second one fails until the first is
//! released. [`ProfilerGate::global`] is the domain shared by the whole
//! process and the one sessions use by default.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use tracing::{debug, warn};

use crate::error::ProfilerError;

/// Environment variable that permanently disables profiling in this process.
pub const DISABLE_PROFILING_ENV: &str = "PROFSESSION_DISABLE_PROFILING";

const CONTENTION_MESSAGE: &str = "Another profiling session active.";

/// Cached result of the kill-switch lookup.
static PROFILING_DISABLED: LazyLock<bool> = LazyLock::new(|| {
    env::var(DISABLE_PROFILING_ENV)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
});

static GLOBAL_GATE: LazyLock<ProfilerGate> = LazyLock::new(ProfilerGate::new);

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// A lock domain: shared handle to one exclusivity flag.
#[derive(Debug, Clone, Default)]
pub struct ProfilerGate {
    active: Arc<AtomicBool>,
}

impl ProfilerGate {
    /// Creates an independent lock domain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide lock domain.
    pub fn global() -> Self {
        GLOBAL_GATE.clone()
    }

    /// Returns `true` while some lock of this domain is active.
    pub fn has_active_session(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Claims the exclusivity token of this domain.
    pub fn acquire(&self) -> Result<ProfilerLock, ProfilerError> {
        if *PROFILING_DISABLED {
            warn!(
                "profiling is disabled by {}; session will not start",
                DISABLE_PROFILING_ENV
            );
            return Err(ProfilerError::LockUnavailable(format!(
                "profiling is permanently disabled by env var {}",
                DISABLE_PROFILING_ENV
            )));
        }

        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ProfilerError::LockUnavailable(CONTENTION_MESSAGE.to_string()))?;

        debug!("profiler lock acquired");
        Ok(ProfilerLock {
            active: Some(Arc::clone(&self.active)),
        })
    }
}

/// Handle to an acquired exclusivity token.
///
/// Released at most once, either explicitly or when dropped.
#[derive(Debug, Default)]
pub struct ProfilerLock {
    active: Option<Arc<AtomicBool>>,
}

impl ProfilerLock {
    /// A handle that holds nothing.
    pub fn released() -> Self {
        Self::default()
    }

    /// Returns whether this handle still holds the token.
    pub fn active(&self) -> bool {
        self.active.is_some()
    }

    /// Releases the token if this handle still holds it.
    pub fn release_if_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.store(false, Ordering::Release);
            debug!("profiler lock released");
        }
    }
}

impl Drop for ProfilerLock {
    fn drop(&mut self) {
        self.release_if_active();
    }
}
