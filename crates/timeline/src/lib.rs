use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod beats;
pub use beats::*;
mod edit_ops;
mod history;
pub use history::*;
mod interaction;
pub use interaction::*;
mod layers;
pub use layers::*;
mod snap;
pub use snap::*;
mod store;
pub use store::*;
mod viewport;
pub use viewport::*;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("clip duration {0:.3}s is below the minimum")]
    DurationTooShort(f64),
    #[error("clip duration {0:.3}s is above the maximum")]
    DurationTooLong(f64),
    #[error("clip overlaps an existing clip on layer {0}")]
    Overlap(LayerId),
    #[error("clip kind is not allowed on layer {0}")]
    LayerTypeMismatch(LayerId),
    #[error("layer is locked: {0}")]
    LayerLocked(LayerId),
    #[error("layer capacity reached for {0} layers")]
    LayerCapacityExceeded(LayerKind),
    #[error("layer still holds clips: {0}")]
    LayerNotEmpty(LayerId),
    #[error("cannot remove the last {0} layer")]
    LastLayerOfType(LayerKind),
    #[error("clip not found: {0}")]
    ClipNotFound(ClipId),
    #[error("layer not found: {0}")]
    LayerNotFound(LayerId),
    #[error("split point outside clip: {0:.3}")]
    SplitPointOutOfRange(f64),
    #[error("clips are not adjacent")]
    NotAdjacent,
    #[error("clip kinds do not match")]
    KindMismatch,
    #[error("an interaction is already active")]
    InteractionActive,
    #[error("history empty: {0}")]
    HistoryEmpty(&'static str),
}

pub type Seconds = f64; // timeline time in seconds, 0 at sequence start

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ClipId(pub u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    Video,
    Image,
    Audio,
    Effect,
    Text,
    Transition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Dissolve,
    Wipe,
    Slide,
    Custom(String),
}

impl Default for TransitionKind {
    fn default() -> Self {
        Self::Dissolve
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClipPayload {
    Media {
        src: String,
        #[serde(default)]
        source_offset: Seconds,
    },
    Text {
        text: String,
        color: String,
    },
    Effect {
        effect_id: String,
    },
    Transition {
        #[serde(default)]
        kind: TransitionKind,
    },
    Empty,
}

impl Default for ClipPayload {
    fn default() -> Self {
        Self::Empty
    }
}

/// A time-bounded unit of media placed on a layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clip {
    pub id: ClipId,
    pub kind: ClipKind,
    pub layer: LayerId,
    pub start: Seconds,
    pub duration: Seconds,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub payload: ClipPayload,
}

fn default_visible() -> bool {
    true
}

impl Clip {
    pub fn end(&self) -> Seconds {
        self.start + self.duration
    }

    /// Half-open interval intersection against `[start, end)`.
    pub fn overlaps(&self, start: Seconds, end: Seconds) -> bool {
        self.start < end && self.end() > start
    }

    pub fn contains(&self, time: Seconds) -> bool {
        time >= self.start && time < self.end()
    }
}
