//! Profiling options and their resolution rules.

use serde::{Deserialize, Serialize};

/// Device class a session targets.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Unspecified,
    Cpu,
    Gpu,
    Tpu,
    PluggableDevice,
}

/// Options recognized by a profiling session.
///
/// A value with `version == 0` is treated as "not fully specified": only
/// `include_dataset_ops` is honored and everything else comes from
/// [`ProfileOptions::default_options`].
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProfileOptions {
    /// Nonzero when the caller supplies a complete configuration.
    pub version: u32,
    pub device_type: DeviceType,
    /// Whether dataset pipeline ops are traced.
    pub include_dataset_ops: bool,
    /// 0 disables host tracing; higher levels trace more.
    pub host_tracer_level: u32,
    /// 0 disables device tracing.
    pub device_tracer_level: u32,
    /// 0 disables the python tracer.
    pub python_tracer_level: u32,
    pub enable_hlo_proto: bool,
    /// Wall-clock nanoseconds since the Unix epoch at which tracing should
    /// start. Values `<= 0` mean "start now".
    pub start_timestamp_ns: i64,
    /// Requested profiling window, for callers that drive their own timer.
    pub duration_ms: u64,
    /// Directory where a caller persists collected traces.
    pub repository_path: String,
}

impl ProfileOptions {
    /// Built-in configuration used when the caller leaves `version` unset.
    pub fn default_options() -> Self {
        Self {
            version: 1,
            device_type: DeviceType::Unspecified,
            include_dataset_ops: true,
            host_tracer_level: 2,
            device_tracer_level: 1,
            python_tracer_level: 0,
            enable_hlo_proto: true,
            start_timestamp_ns: 0,
            duration_ms: 0,
            repository_path: String::new(),
        }
    }

    /// Returns the effective options for a session.
    pub fn resolve(&self) -> Self {
        if self.version != 0 {
            return self.clone();
        }
        let mut options = Self::default_options();
        options.include_dataset_ops = self.include_dataset_ops;
        options
    }

    /// Sets the wall-clock instant at which tracing should start.
    pub fn start_at(mut self, timestamp_ns: i64) -> Self {
        self.start_timestamp_ns = timestamp_ns;
        self
    }

    pub fn with_dataset_ops(mut self, include: bool) -> Self {
        self.include_dataset_ops = include;
        self
    }
}
