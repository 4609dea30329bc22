//! Trace artifact filled by collector plugins.
//!
//! ```text
//! XSpace
//!  └─ XPlane   one per source (host threads, a device, ...)
//!      └─ XLine    one per timeline (thread, stream)
//!          └─ XEvent   offset/duration in picoseconds from the line timestamp
//! ```

use serde::{Deserialize, Serialize};

/// Value of a stat attached to a plane or event.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum XStatValue {
    Int64(i64),
    Uint64(u64),
    Double(f64),
    Str(String),
}

/// A named stat.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct XStat {
    pub name: String,
    pub value: XStatValue,
}

/// A single timed event on a line.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct XEvent {
    pub name: String,
    /// Offset from the owning line's `timestamp_ns`, in picoseconds.
    pub offset_ps: i64,
    pub duration_ps: i64,
    pub stats: Vec<XStat>,
}

impl XEvent {
    pub fn add_stat(&mut self, name: impl Into<String>, value: XStatValue) -> &mut Self {
        self.stats.push(XStat {
            name: name.into(),
            value,
        });
        self
    }

    /// Returns the stat with the given name.
    pub fn stat(&self, name: &str) -> Option<&XStatValue> {
        self.stats.iter().find(|s| s.name == name).map(|s| &s.value)
    }
}

/// A timeline of events.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct XLine {
    pub id: i64,
    pub name: String,
    /// Base timestamp of the line; events are offsets from it.
    pub timestamp_ns: i64,
    pub events: Vec<XEvent>,
}

impl XLine {
    pub fn add_event(
        &mut self,
        name: impl Into<String>,
        offset_ps: i64,
        duration_ps: i64,
    ) -> &mut XEvent {
        self.events.push(XEvent {
            name: name.into(),
            offset_ps,
            duration_ps,
            stats: Vec::new(),
        });
        let last = self.events.len() - 1;
        &mut self.events[last]
    }
}

/// Events of one source.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct XPlane {
    pub id: i64,
    pub name: String,
    pub lines: Vec<XLine>,
    pub stats: Vec<XStat>,
}

impl XPlane {
    /// Returns the line with `id`, creating it with `name` and `timestamp_ns`
    /// if it does not exist yet.
    pub fn find_or_add_line(
        &mut self,
        id: i64,
        name: impl Into<String>,
        timestamp_ns: i64,
    ) -> &mut XLine {
        let index = match self.lines.iter().position(|l| l.id == id) {
            Some(index) => index,
            None => {
                self.lines.push(XLine {
                    id,
                    name: name.into(),
                    timestamp_ns,
                    events: Vec::new(),
                });
                self.lines.len() - 1
            }
        };
        &mut self.lines[index]
    }

    pub fn find_line(&self, name: &str) -> Option<&XLine> {
        self.lines.iter().find(|l| l.name == name)
    }

    pub fn event_count(&self) -> usize {
        self.lines.iter().map(|l| l.events.len()).sum()
    }
}

/// The unified output of one profiling session.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct XSpace {
    pub planes: Vec<XPlane>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub hostnames: Vec<String>,
}

impl XSpace {
    pub fn find_plane(&self, name: &str) -> Option<&XPlane> {
        self.planes.iter().find(|p| p.name == name)
    }

    pub fn find_plane_mut(&mut self, name: &str) -> Option<&mut XPlane> {
        self.planes.iter_mut().find(|p| p.name == name)
    }

    /// Returns the plane named `name`, appending a new one if needed.
    ///
    /// New planes get the next free id.
    pub fn find_or_add_plane(&mut self, name: &str) -> &mut XPlane {
        let index = match self.planes.iter().position(|p| p.name == name) {
            Some(index) => index,
            None => {
                let id = self.planes.iter().map(|p| p.id + 1).max().unwrap_or(0);
                self.planes.push(XPlane {
                    id,
                    name: name.to_string(),
                    ..Default::default()
                });
                self.planes.len() - 1
            }
        };
        &mut self.planes[index]
    }

    /// Total number of events across all planes.
    pub fn event_count(&self) -> usize {
        self.planes.iter().map(XPlane::event_count).sum()
    }
}
