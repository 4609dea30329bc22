//! Collector of the profiled process's own CPU usage from `/proc/self/stat`.
//!
//! Samples the stat file when the session starts and when it stops, and
//! exports the difference as one event on the `/host:process` plane.

use std::path::{Path, PathBuf};

use profsession_core::clock;
use profsession_core::{
    CollectorPlugin, PluginRegistry, ProfileOptions, ProfilerError, XSpace, XStatValue,
};
use tracing::debug;

use crate::fs::{FileSystem, RealFs};

/// Plane the collector exports into.
pub const PROCESS_PLANE_NAME: &str = "/host:process";

/// Error type for stat parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// CPU counters of one `/proc/[pid]/stat` sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuSample {
    /// User-mode time in clock ticks.
    pub utime: u64,
    /// Kernel-mode time in clock ticks.
    pub stime: u64,
    pub num_threads: i64,
}

/// Parses the CPU fields of `/proc/[pid]/stat`.
///
/// `comm` may contain spaces and parentheses, so fields are counted from the
/// last `)`.
pub fn parse_cpu_sample(content: &str) -> Result<CpuSample, ParseError> {
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;
    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();

    // fields[0] is `state` (field 3 of the file).
    if fields.len() < 18 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 18+, got {}",
            fields.len()
        )));
    }

    let parse_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(CpuSample {
        utime: parse_u64(11, "utime")?,
        stime: parse_u64(12, "stime")?,
        num_threads: fields[17]
            .parse()
            .map_err(|_| ParseError::new("invalid num_threads"))?,
    })
}

/// Samples process CPU counters at session start and stop.
pub struct ProcStatCollector<F: FileSystem> {
    fs: F,
    stat_path: PathBuf,
    started: Option<(i64, CpuSample)>,
    stopped: Option<(i64, CpuSample)>,
}

impl<F: FileSystem> ProcStatCollector<F> {
    /// Creates a collector for the calling process.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl AsRef<Path>) -> Self {
        Self {
            fs,
            stat_path: proc_path.as_ref().join("self").join("stat"),
            started: None,
            stopped: None,
        }
    }

    fn sample(&self) -> Result<(i64, CpuSample), String> {
        let content = self
            .fs
            .read_to_string(&self.stat_path)
            .map_err(|e| format!("{}: {}", self.stat_path.display(), e))?;
        let sample = parse_cpu_sample(&content).map_err(|e| e.to_string())?;
        Ok((clock::now_nanos(), sample))
    }
}

impl<F: FileSystem> CollectorPlugin for ProcStatCollector<F> {
    fn name(&self) -> &str {
        "proc_stat"
    }

    fn start(&mut self) -> Result<(), ProfilerError> {
        let sample = self.sample().map_err(ProfilerError::StartFailed)?;
        self.started = Some(sample);
        self.stopped = None;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ProfilerError> {
        if self.started.is_none() || self.stopped.is_some() {
            return Ok(());
        }
        let sample = self.sample().map_err(ProfilerError::StopFailed)?;
        self.stopped = Some(sample);
        Ok(())
    }

    fn collect_data(&mut self, space: &mut XSpace) -> Result<(), ProfilerError> {
        let Some((start_ns, start)) = self.started.take() else {
            return Ok(());
        };
        let Some((stop_ns, stop)) = self.stopped.take() else {
            return Err(ProfilerError::CollectFailed(
                "no stop sample; stop() failed or was not called".to_string(),
            ));
        };
        debug!(
            utime = stop.utime.saturating_sub(start.utime),
            stime = stop.stime.saturating_sub(start.stime),
            "process cpu collected"
        );

        space
            .find_or_add_plane(PROCESS_PLANE_NAME)
            .find_or_add_line(0, "cpu", start_ns)
            .add_event("process_cpu", 0, (stop_ns - start_ns) * 1000)
            .add_stat(
                "utime_ticks",
                XStatValue::Uint64(stop.utime.saturating_sub(start.utime)),
            )
            .add_stat(
                "stime_ticks",
                XStatValue::Uint64(stop.stime.saturating_sub(start.stime)),
            )
            .add_stat("num_threads", XStatValue::Int64(stop.num_threads));
        Ok(())
    }
}

/// Adds the built-in collectors to `registry`.
///
/// The process CPU collector is host-side and only runs when host tracing is
/// enabled.
pub fn register_builtin_collectors(registry: &PluginRegistry, proc_path: &str) {
    let proc_path = proc_path.to_string();
    registry.register(move |options: &ProfileOptions| {
        (options.host_tracer_level > 0).then(|| {
            Box::new(ProcStatCollector::new(RealFs::new(), &proc_path)) as Box<dyn CollectorPlugin>
        })
    });
}
