//! Viewport state: zoom, time↔pixel conversion, playhead, ruler marks.

use serde::{Deserialize, Serialize};

use crate::{ClipId, Seconds};

pub const PIXELS_PER_SECOND: f64 = 100.0;
pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 5.0;

const ZOOM_STEP: f64 = 1.5;
/// Ruler marks never pack tighter than this on screen.
const MIN_MARK_SPACING_PX: f32 = 60.0;
const RULER_STEPS: [Seconds; 10] = [0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 15.0, 30.0, 60.0];

#[derive(Debug, Clone, PartialEq)]
pub struct RulerMark {
    pub time: Seconds,
    pub label: String,
    pub major: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineController {
    duration: Seconds,
    current_time: Seconds,
    zoom: f64,
    pub selected_clip: Option<ClipId>,
    pub hovered_time: Option<Seconds>,
}

impl TimelineController {
    pub fn new(duration: Seconds) -> Self {
        Self {
            duration: duration.max(0.0),
            current_time: 0.0,
            zoom: 1.0,
            selected_clip: None,
            hovered_time: None,
        }
    }

    pub fn duration(&self) -> Seconds {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Seconds) {
        self.duration = duration.max(0.0);
        self.current_time = self.current_time.min(self.duration);
    }

    pub fn current_time(&self) -> Seconds {
        self.current_time
    }

    pub fn set_current_time(&mut self, time: Seconds) {
        self.current_time = time.clamp(0.0, self.duration);
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom * ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom / ZOOM_STEP);
    }

    pub fn pixels_to_time(&self, px: f32) -> Seconds {
        px as f64 / (self.zoom * PIXELS_PER_SECOND)
    }

    pub fn time_to_pixels(&self, time: Seconds) -> f32 {
        (time * self.zoom * PIXELS_PER_SECOND) as f32
    }

    pub fn select(&mut self, clip: ClipId) {
        self.selected_clip = Some(clip);
    }

    pub fn deselect(&mut self) {
        self.selected_clip = None;
    }

    pub fn set_hover(&mut self, time: Option<Seconds>) {
        self.hovered_time = time.map(|t| t.clamp(0.0, self.duration));
    }

    /// Mark spacing for the current zoom: the smallest step that still
    /// leaves readable room between labels.
    pub fn ruler_interval(&self) -> Seconds {
        for step in RULER_STEPS {
            if self.time_to_pixels(step) >= MIN_MARK_SPACING_PX {
                return step;
            }
        }
        RULER_STEPS[RULER_STEPS.len() - 1]
    }

    /// Ruler marks covering `[from, to]`, clamped to the timeline. Every
    /// 5th mark is major and labeled.
    pub fn ruler_marks(&self, from: Seconds, to: Seconds) -> Vec<RulerMark> {
        let step = self.ruler_interval();
        let from = from.max(0.0);
        let to = to.min(self.duration);
        if to < from || step <= 0.0 {
            return Vec::new();
        }
        let first = (from / step).ceil() as i64;
        let last = (to / step).floor() as i64;
        (first..=last)
            .map(|index| {
                let time = index as f64 * step;
                let major = index % 5 == 0;
                RulerMark {
                    time,
                    label: format_time(time),
                    major,
                }
            })
            .collect()
    }
}

/// Compact clock label: "42.5s" under a minute, "1:23.0" beyond.
pub fn format_time(time: Seconds) -> String {
    let time = time.max(0.0);
    let minutes = (time / 60.0).floor() as u64;
    let seconds = time - minutes as f64 * 60.0;
    if minutes > 0 {
        format!("{}:{:04.1}", minutes, seconds)
    } else {
        format!("{:.1}s", seconds)
    }
}
