//! Normalization of a trace collected on a single host.
//!
//! Runs after the session released its guard, on the caller's thread:
//! 1. secondary host planes are merged into the host threads plane,
//! 2. line timestamps are shifted to be relative to the session start,
//! 3. lines and events are sorted.

use std::cmp::Reverse;

use tracing::debug;

use crate::xspace::{XLine, XPlane, XSpace};

/// Plane holding host thread events.
pub const HOST_THREADS_PLANE_NAME: &str = "/host:CPU";
/// Host-side driver API events, merged into the host threads plane.
pub const CUPTI_DRIVER_API_PLANE_NAME: &str = "/host:CUPTI";
/// Python tracer events, merged into the host threads plane.
pub const PYTHON_TRACER_PLANE_NAME: &str = "/host:python-tracer";

const MERGED_HOST_PLANES: [&str; 2] = [CUPTI_DRIVER_API_PLANE_NAME, PYTHON_TRACER_PLANE_NAME];

/// Post-processes `space` using the session anchor `start_time_ns`.
pub fn post_process_single_host_xspace(space: &mut XSpace, start_time_ns: i64) {
    merge_host_planes(space);
    normalize_timestamps(space, start_time_ns);
    sort_xspace(space);
}

fn merge_host_planes(space: &mut XSpace) {
    let (merged, kept): (Vec<XPlane>, Vec<XPlane>) = std::mem::take(&mut space.planes)
        .into_iter()
        .partition(|p| MERGED_HOST_PLANES.contains(&p.name.as_str()));
    space.planes = kept;

    if merged.is_empty() {
        return;
    }

    let host = space.find_or_add_plane(HOST_THREADS_PLANE_NAME);
    for plane in merged {
        host.stats.extend(plane.stats);
        for line in plane.lines {
            merge_line(host, line);
        }
    }
    host.lines.sort_by(|a, b| a.name.cmp(&b.name));
}

/// Moves the events of `src` into the line with the same id in `dst`.
///
/// Both lines end up on the earlier of the two base timestamps. If the gap
/// between the bases does not fit in picoseconds the events are appended
/// without rebasing.
fn merge_line(dst: &mut XPlane, mut src: XLine) {
    let Some(index) = dst.lines.iter().position(|l| l.id == src.id) else {
        dst.lines.push(src);
        return;
    };
    let target = &mut dst.lines[index];

    if src.timestamp_ns < target.timestamp_ns {
        match shift_ps(target.timestamp_ns, src.timestamp_ns) {
            Some(shift) => {
                shift_events(target, shift);
                target.timestamp_ns = src.timestamp_ns;
            }
            None => debug!(line = %target.name, "line bases too far apart, not rebasing"),
        }
    } else {
        match shift_ps(src.timestamp_ns, target.timestamp_ns) {
            Some(shift) => shift_events(&mut src, shift),
            None => debug!(line = %target.name, "line bases too far apart, not rebasing"),
        }
    }
    target.events.append(&mut src.events);
}

/// Distance from `earlier_ns` to `later_ns` in picoseconds.
fn shift_ps(later_ns: i64, earlier_ns: i64) -> Option<i64> {
    later_ns.checked_sub(earlier_ns)?.checked_mul(1000)
}

fn shift_events(line: &mut XLine, shift_ps: i64) {
    for event in &mut line.events {
        event.offset_ps = event.offset_ps.saturating_add(shift_ps);
    }
}

/// Shifts every line that starts at or after `start_time_ns` onto a timeline
/// beginning at the session start.
fn normalize_timestamps(space: &mut XSpace, start_time_ns: i64) {
    for plane in &mut space.planes {
        for line in &mut plane.lines {
            if line.timestamp_ns >= start_time_ns {
                line.timestamp_ns -= start_time_ns;
            }
        }
    }
}

fn sort_xspace(space: &mut XSpace) {
    for plane in &mut space.planes {
        for line in &mut plane.lines {
            line.events.sort_by_key(|e| (e.offset_ps, Reverse(e.duration_ps)));
        }
    }
}
