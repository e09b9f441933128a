//! Snap resolution for edit points.
//!
//! A candidate time is pulled to the nearest significant position within a
//! tolerance. Target categories are tried in a fixed priority order (beats,
//! clip edges, grid, playhead) so behavior stays predictable when two
//! targets sit at equal distance.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::Seconds;

pub const SNAP_THRESHOLD: Seconds = 0.1;
pub const GRID_INTERVAL: Seconds = 1.0;

/// Snapping configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapSettings {
    /// Enable snapping
    pub enabled: bool,

    /// Snap tolerance in seconds
    pub threshold: Seconds,

    /// Snap to beat positions
    pub to_beats: bool,

    /// Snap to other clips' edges
    pub to_clip_edges: bool,

    /// Snap to grid multiples
    pub to_grid: bool,

    /// Snap to the playhead
    pub to_playhead: bool,

    /// Grid spacing in seconds
    pub grid_interval: Seconds,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: SNAP_THRESHOLD,
            to_beats: true,
            to_clip_edges: true,
            to_grid: true,
            to_playhead: true,
            grid_interval: GRID_INTERVAL,
        }
    }
}

impl SnapSettings {
    /// Toggle snapping on/off
    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapTarget {
    Beat,
    ClipEdge,
    Grid,
    Playhead,
}

/// Result of a snap resolution, with the matched target for UI indicators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult {
    pub time: Seconds,
    pub original: Seconds,
    pub target: Option<SnapTarget>,
}

impl SnapResult {
    pub fn did_snap(&self) -> bool {
        self.target.is_some()
    }

    pub fn delta(&self) -> Seconds {
        self.time - self.original
    }

    fn passthrough(time: Seconds) -> Self {
        Self {
            time,
            original: time,
            target: None,
        }
    }
}

/// Candidate snap positions gathered by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapInputs<'a> {
    pub beats: &'a [Seconds],
    pub clip_edges: &'a [Seconds],
    pub playhead: Option<Seconds>,
}

pub struct SnapEngine<'a> {
    settings: &'a SnapSettings,
}

impl<'a> SnapEngine<'a> {
    pub fn new(settings: &'a SnapSettings) -> Self {
        Self { settings }
    }

    /// Resolve `candidate` against the inputs.
    ///
    /// The first category with a target inside the threshold wins, even when
    /// a lower-priority target is closer. Results are rounded to 2 decimal
    /// places; with snapping disabled the candidate passes through untouched.
    pub fn resolve(&self, candidate: Seconds, inputs: &SnapInputs<'_>) -> SnapResult {
        let s = self.settings;
        if !s.enabled || s.threshold <= 0.0 {
            return SnapResult::passthrough(candidate);
        }

        let hit = |target: Seconds| (target - candidate).abs() <= s.threshold;

        if s.to_beats {
            if let Some(beat) = nearest(inputs.beats, candidate).filter(|t| hit(*t)) {
                return self.snapped(candidate, beat, SnapTarget::Beat);
            }
        }

        if s.to_clip_edges {
            if let Some(edge) = nearest(inputs.clip_edges, candidate).filter(|t| hit(*t)) {
                return self.snapped(candidate, edge, SnapTarget::ClipEdge);
            }
        }

        if s.to_grid && s.grid_interval > 0.0 {
            let grid = (candidate / s.grid_interval).round() * s.grid_interval;
            if hit(grid) {
                return self.snapped(candidate, grid, SnapTarget::Grid);
            }
        }

        if s.to_playhead {
            if let Some(playhead) = inputs.playhead.filter(|t| hit(*t)) {
                return self.snapped(candidate, playhead, SnapTarget::Playhead);
            }
        }

        SnapResult {
            time: round2(candidate),
            original: candidate,
            target: None,
        }
    }

    fn snapped(&self, original: Seconds, time: Seconds, target: SnapTarget) -> SnapResult {
        SnapResult {
            time: round2(time),
            original,
            target: Some(target),
        }
    }
}

fn nearest(targets: &[Seconds], candidate: Seconds) -> Option<Seconds> {
    targets.iter().copied().min_by(|a, b| {
        let da = (a - candidate).abs();
        let db = (b - candidate).abs();
        da.partial_cmp(&db).unwrap_or(Ordering::Equal)
    })
}

pub(crate) fn round2(time: Seconds) -> Seconds {
    (time * 100.0).round() / 100.0
}
