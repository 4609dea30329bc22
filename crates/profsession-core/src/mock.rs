//! Recording collector plugins for testing sessions without real tracers.
//!
//! `RecordingPlugin` writes every lifecycle call into a shared
//! [`PluginJournal`], so tests can assert on call order across plugins, and
//! can be told to fail any phase.

use std::sync::{Arc, Mutex, PoisonError};

use crate::clock;
use crate::error::ProfilerError;
use crate::plugin::CollectorPlugin;
use crate::xspace::XSpace;

/// Default plane recording plugins export into.
pub const RECORDING_PLANE: &str = "/host:recording";

/// Ordered log of `"<plugin>:<phase>"` entries shared between plugins.
#[derive(Debug, Clone, Default)]
pub struct PluginJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl PluginJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, plugin: &str, phase: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("{}:{}", plugin, phase));
    }

    /// Returns a copy of all entries so far.
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the entries for one phase, in call order.
    pub fn phase(&self, phase: &str) -> Vec<String> {
        let suffix = format!(":{}", phase);
        self.entries()
            .into_iter()
            .filter(|e| e.ends_with(&suffix))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Plugin that records its lifecycle and exports one event per session.
///
/// The event spans start to stop and is only exported if `start` succeeded.
#[derive(Debug)]
pub struct RecordingPlugin {
    name: String,
    plane: String,
    journal: PluginJournal,
    fail_start: bool,
    fail_stop: bool,
    fail_collect: bool,
    started_ns: Option<i64>,
    stopped_ns: Option<i64>,
}

impl RecordingPlugin {
    pub fn new(name: impl Into<String>, journal: &PluginJournal) -> Self {
        Self {
            name: name.into(),
            plane: RECORDING_PLANE.to_string(),
            journal: journal.clone(),
            fail_start: false,
            fail_stop: false,
            fail_collect: false,
            started_ns: None,
            stopped_ns: None,
        }
    }

    /// Exports into `plane` instead of [`RECORDING_PLANE`].
    pub fn with_plane(mut self, plane: impl Into<String>) -> Self {
        self.plane = plane.into();
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn failing_collect(mut self) -> Self {
        self.fail_collect = true;
        self
    }
}

impl CollectorPlugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<(), ProfilerError> {
        self.journal.record(&self.name, "start");
        if self.fail_start {
            return Err(ProfilerError::StartFailed(format!(
                "{} refused to start",
                self.name
            )));
        }
        self.started_ns = Some(clock::now_nanos());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ProfilerError> {
        self.journal.record(&self.name, "stop");
        if self.fail_stop {
            return Err(ProfilerError::StopFailed(format!(
                "{} refused to stop",
                self.name
            )));
        }
        if self.started_ns.is_some() && self.stopped_ns.is_none() {
            self.stopped_ns = Some(clock::now_nanos());
        }
        Ok(())
    }

    fn collect_data(&mut self, space: &mut XSpace) -> Result<(), ProfilerError> {
        self.journal.record(&self.name, "collect");
        if self.fail_collect {
            return Err(ProfilerError::CollectFailed(format!(
                "{} lost its buffer",
                self.name
            )));
        }
        let Some(started_ns) = self.started_ns.take() else {
            return Ok(());
        };
        let stopped_ns = self.stopped_ns.take().unwrap_or(started_ns);

        let plane = space.find_or_add_plane(&self.plane);
        let line_id = plane.lines.iter().map(|l| l.id + 1).max().unwrap_or(0);
        plane
            .find_or_add_line(line_id, self.name.clone(), started_ns)
            .add_event(self.name.clone(), 0, (stopped_ns - started_ns) * 1000);
        Ok(())
    }
}
