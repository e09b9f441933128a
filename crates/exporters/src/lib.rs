//! Render handoff: the flattened clip manifest and the render service
//! interface.
//!
//! The render service itself is remote; this crate owns the manifest shape
//! it accepts, the job status vocabulary it reports, and a deterministic
//! in-memory stand-in used by tests and the CLI.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use timeline::{ClipPayload, ClipStore, LayerManager, Seconds, TransitionKind};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("manifest has no renderable clips")]
    EmptyManifest,
    #[error("unknown render job: {0}")]
    UnknownJob(JobId),
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Draft,
    Standard,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub quality: Quality,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30.0,
            quality: Quality::Standard,
        }
    }
}

/// One flattened clip, in render order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub id: u64,
    pub media_ref: String,
    pub start: Seconds,
    pub duration: Seconds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderManifest {
    pub entries: Vec<ManifestEntry>,
    pub duration: Seconds,
    pub settings: RenderSettings,
    pub created_at: i64,
}

impl RenderManifest {
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Flatten the arrangement for the render service: visible layers only,
/// bottom of the stack first, clips in start order within each layer.
pub fn build_manifest(
    store: &ClipStore,
    layers: &LayerManager,
    settings: RenderSettings,
) -> Result<RenderManifest, ExportError> {
    let mut entries = Vec::new();
    let mut duration: Seconds = 0.0;

    for layer in layers.layers() {
        if !layer.visible {
            continue;
        }
        for clip in store.clips_in_layer(layer.id) {
            if !clip.visible {
                continue;
            }
            duration = duration.max(clip.end());
            let (media_ref, transition) = match &clip.payload {
                ClipPayload::Media { src, .. } => (src.clone(), None),
                ClipPayload::Text { text, .. } => (format!("text:{text}"), None),
                ClipPayload::Effect { effect_id } => (format!("effect:{effect_id}"), None),
                ClipPayload::Transition { kind } => {
                    ("transition".to_string(), Some(kind.clone()))
                }
                ClipPayload::Empty => (String::new(), None),
            };
            entries.push(ManifestEntry {
                id: clip.id.0,
                media_ref,
                start: clip.start,
                duration: clip.duration,
                transition,
            });
        }
    }

    if entries.is_empty() {
        return Err(ExportError::EmptyManifest);
    }
    Ok(RenderManifest {
        entries,
        duration,
        settings,
        created_at: chrono::Utc::now().timestamp(),
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    /// 0..=100
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    fn queued() -> Self {
        Self {
            state: JobState::Queued,
            progress: 0,
            result_url: None,
            error: None,
        }
    }
}

/// The remote render collaborator, seen from the editor's side.
pub trait RenderService {
    fn submit(&mut self, manifest: RenderManifest) -> Result<JobId, ExportError>;
    fn status(&self, job: JobId) -> Result<JobStatus, ExportError>;
    fn cancel(&mut self, job: JobId) -> Result<(), ExportError>;
}

/// Deterministic in-memory queue: each `poll` advances every live job by a
/// fixed progress step, finishing with a local result URL.
pub struct LocalRenderQueue {
    jobs: HashMap<JobId, JobStatus>,
    step: u8,
}

impl Default for LocalRenderQueue {
    fn default() -> Self {
        Self::new(25)
    }
}

impl LocalRenderQueue {
    pub fn new(step: u8) -> Self {
        Self {
            jobs: HashMap::new(),
            step: step.clamp(1, 100),
        }
    }

    /// Advance all queued/processing jobs one step.
    pub fn poll(&mut self) {
        for (id, status) in self.jobs.iter_mut() {
            match status.state {
                JobState::Queued => {
                    status.state = JobState::Processing;
                }
                JobState::Processing => {
                    status.progress = status.progress.saturating_add(self.step).min(100);
                    if status.progress >= 100 {
                        status.state = JobState::Done;
                        status.result_url = Some(format!("file:///renders/{id}.mp4"));
                    }
                }
                JobState::Done | JobState::Failed => {}
            }
        }
    }
}

impl RenderService for LocalRenderQueue {
    fn submit(&mut self, manifest: RenderManifest) -> Result<JobId, ExportError> {
        if manifest.entries.is_empty() {
            return Err(ExportError::EmptyManifest);
        }
        let id = JobId::new();
        self.jobs.insert(id, JobStatus::queued());
        Ok(id)
    }

    fn status(&self, job: JobId) -> Result<JobStatus, ExportError> {
        self.jobs
            .get(&job)
            .cloned()
            .ok_or(ExportError::UnknownJob(job))
    }

    fn cancel(&mut self, job: JobId) -> Result<(), ExportError> {
        let status = self
            .jobs
            .get_mut(&job)
            .ok_or(ExportError::UnknownJob(job))?;
        if status.state == JobState::Queued || status.state == JobState::Processing {
            status.state = JobState::Failed;
            status.error = Some("canceled".to_string());
        }
        Ok(())
    }
}
