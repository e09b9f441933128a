//! Canonical clip collection with validated operations.
//!
//! Every mutation is check-then-commit: a rejected operation returns a typed
//! [`TimelineError`] and leaves the store exactly as it was. The store owns
//! id generation (monotonic `u64`) and the snap context used by edits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{
    Clip, ClipId, ClipKind, ClipPayload, LayerId, LayerManager, Seconds, SnapEngine, SnapInputs,
    SnapResult, SnapSettings, TimelineError,
};

pub const MIN_CLIP_DURATION: Seconds = 0.1;
pub const MAX_CLIP_DURATION: Seconds = 6.0;
pub const ADJACENCY_TOLERANCE: Seconds = 0.1;

/// Gap left after the original when duplicating without an explicit offset.
const DUPLICATE_GAP: Seconds = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub min_duration: Seconds,
    pub max_duration: Seconds,
    pub allow_overlap: bool,
    pub snap: SnapSettings,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            min_duration: MIN_CLIP_DURATION,
            max_duration: MAX_CLIP_DURATION,
            allow_overlap: false,
            snap: SnapSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeEdge {
    Start,
    End,
}

/// Committed mutation, for change listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipChange {
    Added(ClipId),
    Removed(ClipId),
    Updated(ClipId),
    Split { original: ClipId, second: ClipId },
    Combined { kept: ClipId, removed: ClipId },
    Reloaded,
}

type ChangeListener = Box<dyn FnMut(&ClipChange)>;

/// Serialized clip set plus the id high-watermark, so re-imported data never
/// collides with ids generated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClipSnapshot {
    pub clips: Vec<Clip>,
    pub next_id: u64,
}

pub struct ClipStore {
    config: StoreConfig,
    clips: BTreeMap<ClipId, Clip>,
    next_id: u64,
    beat_grid: Vec<Seconds>,
    playhead: Seconds,
    listener: Option<ChangeListener>,
}

impl Default for ClipStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl fmt::Debug for ClipStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipStore")
            .field("config", &self.config)
            .field("clips", &self.clips.len())
            .field("next_id", &self.next_id)
            .field("beat_grid", &self.beat_grid.len())
            .field("playhead", &self.playhead)
            .finish()
    }
}

impl ClipStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            clips: BTreeMap::new(),
            next_id: 0,
            beat_grid: Vec::new(),
            playhead: 0.0,
            listener: None,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut StoreConfig {
        &mut self.config
    }

    /// Beat positions the snap engine pulls edit points toward.
    pub fn set_beat_grid(&mut self, mut beats: Vec<Seconds>) {
        beats.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        self.beat_grid = beats;
    }

    pub fn set_playhead(&mut self, time: Seconds) {
        self.playhead = time.max(0.0);
    }

    pub fn set_on_change(&mut self, listener: impl FnMut(&ClipChange) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub(crate) fn notify(&mut self, change: ClipChange) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&change);
        }
    }

    /// Resolve a candidate time through the store's snap context, excluding
    /// the given clip's own edges.
    pub fn snap_time(&self, candidate: Seconds, exclude: Option<ClipId>) -> SnapResult {
        let edges: Vec<Seconds> = self
            .clips
            .values()
            .filter(|c| Some(c.id) != exclude)
            .flat_map(|c| [c.start, c.end()])
            .collect();
        SnapEngine::new(&self.config.snap).resolve(
            candidate,
            &SnapInputs {
                beats: &self.beat_grid,
                clip_edges: &edges,
                playhead: Some(self.playhead),
            },
        )
    }

    fn alloc_id(&mut self) -> ClipId {
        let id = ClipId(self.next_id);
        self.next_id += 1;
        id
    }

    fn validate_duration(&self, duration: Seconds) -> Result<(), TimelineError> {
        if duration < self.config.min_duration {
            return Err(TimelineError::DurationTooShort(duration));
        }
        if duration > self.config.max_duration {
            return Err(TimelineError::DurationTooLong(duration));
        }
        Ok(())
    }

    pub(crate) fn check_overlap(
        &self,
        layer: LayerId,
        start: Seconds,
        end: Seconds,
        exclude: Option<ClipId>,
    ) -> Result<(), TimelineError> {
        if self.config.allow_overlap {
            return Ok(());
        }
        let collides = self
            .clips
            .values()
            .filter(|c| c.layer == layer && Some(c.id) != exclude)
            .any(|c| c.overlaps(start, end));
        if collides {
            Err(TimelineError::Overlap(layer))
        } else {
            Ok(())
        }
    }

    fn check_layer_accepts(
        &self,
        layers: &LayerManager,
        layer: LayerId,
        kind: ClipKind,
    ) -> Result<(), TimelineError> {
        let target = layers
            .layer(layer)
            .ok_or(TimelineError::LayerNotFound(layer))?;
        if target.locked {
            return Err(TimelineError::LayerLocked(layer));
        }
        if !target.kind.accepts(kind) {
            return Err(TimelineError::LayerTypeMismatch(layer));
        }
        Ok(())
    }

    fn check_layer_unlocked(
        &self,
        layers: &LayerManager,
        layer: LayerId,
    ) -> Result<(), TimelineError> {
        if layers.is_locked(layer) {
            Err(TimelineError::LayerLocked(layer))
        } else {
            Ok(())
        }
    }

    pub fn add_clip(
        &mut self,
        layers: &LayerManager,
        layer: LayerId,
        kind: ClipKind,
        start: Seconds,
        duration: Seconds,
        payload: ClipPayload,
    ) -> Result<ClipId, TimelineError> {
        self.check_layer_accepts(layers, layer, kind)?;
        self.validate_duration(duration)?;
        let start = self.snap_time(start, None).time.max(0.0);
        self.check_overlap(layer, start, start + duration, None)?;

        let id = self.alloc_id();
        self.clips.insert(
            id,
            Clip {
                id,
                kind,
                layer,
                start,
                duration,
                visible: true,
                locked: false,
                payload,
            },
        );
        self.notify(ClipChange::Added(id));
        Ok(id)
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Result<Clip, TimelineError> {
        let clip = self
            .clips
            .remove(&id)
            .ok_or(TimelineError::ClipNotFound(id))?;
        self.notify(ClipChange::Removed(id));
        Ok(clip)
    }

    pub fn move_clip(
        &mut self,
        layers: &LayerManager,
        id: ClipId,
        new_start: Seconds,
    ) -> Result<(), TimelineError> {
        let clip = self.clip(id).ok_or(TimelineError::ClipNotFound(id))?;
        self.check_layer_unlocked(layers, clip.layer)?;
        let duration = clip.duration;
        let layer = clip.layer;

        let start = self.snap_time(new_start, Some(id)).time.max(0.0);
        self.check_overlap(layer, start, start + duration, Some(id))?;

        if let Some(clip) = self.clips.get_mut(&id) {
            clip.start = start;
        }
        self.notify(ClipChange::Updated(id));
        Ok(())
    }

    pub fn resize_clip(
        &mut self,
        layers: &LayerManager,
        id: ClipId,
        edge: ResizeEdge,
        new_time: Seconds,
    ) -> Result<(), TimelineError> {
        let clip = self.clip(id).ok_or(TimelineError::ClipNotFound(id))?;
        self.check_layer_unlocked(layers, clip.layer)?;
        let layer = clip.layer;
        let (old_start, old_end) = (clip.start, clip.end());

        let snapped = self.snap_time(new_time, Some(id)).time;
        let (start, duration) = match edge {
            ResizeEdge::Start => {
                // End stays fixed; the duration clamp moves the start back.
                // Capped at the old end so the start can never go negative.
                let duration = (old_end - snapped)
                    .clamp(self.config.min_duration, self.config.max_duration)
                    .min(old_end);
                (old_end - duration, duration)
            }
            ResizeEdge::End => {
                let duration = (snapped - old_start)
                    .clamp(self.config.min_duration, self.config.max_duration);
                (old_start, duration)
            }
        };
        self.check_overlap(layer, start, start + duration, Some(id))?;

        if let Some(clip) = self.clips.get_mut(&id) {
            clip.start = start;
            clip.duration = duration;
        }
        self.notify(ClipChange::Updated(id));
        Ok(())
    }

    pub fn split_clip(
        &mut self,
        layers: &LayerManager,
        id: ClipId,
        split_time: Seconds,
    ) -> Result<(ClipId, ClipId), TimelineError> {
        let clip = self.clip(id).ok_or(TimelineError::ClipNotFound(id))?;
        self.check_layer_unlocked(layers, clip.layer)?;
        let (start, end) = (clip.start, clip.end());

        let at = self.snap_time(split_time, Some(id)).time;
        // Both halves must survive the duration floor.
        if at - start < self.config.min_duration || end - at < self.config.min_duration {
            return Err(TimelineError::SplitPointOutOfRange(at));
        }
        let (original, second) = self.split_unchecked(id, at);
        self.notify(ClipChange::Split { original, second });
        Ok((original, second))
    }

    /// Truncate `id` at `at` and insert the tail as a new clip. Caller has
    /// validated the cut point.
    pub(crate) fn split_unchecked(&mut self, id: ClipId, at: Seconds) -> (ClipId, ClipId) {
        let second_id = self.alloc_id();
        if let Some(clip) = self.clips.get_mut(&id) {
            let old_end = clip.end();
            let head_duration = at - clip.start;
            clip.duration = head_duration;

            let mut tail = clip.clone();
            tail.id = second_id;
            tail.start = at;
            tail.duration = old_end - at;
            if let ClipPayload::Media { source_offset, .. } = &mut tail.payload {
                *source_offset += head_duration;
            }
            self.clips.insert(second_id, tail);
        }
        (id, second_id)
    }

    pub fn combine_clips(
        &mut self,
        layers: &LayerManager,
        a: ClipId,
        b: ClipId,
    ) -> Result<ClipId, TimelineError> {
        let first = self.clip(a).ok_or(TimelineError::ClipNotFound(a))?;
        let second = self.clip(b).ok_or(TimelineError::ClipNotFound(b))?;
        if first.kind != second.kind {
            return Err(TimelineError::KindMismatch);
        }
        if first.layer != second.layer {
            return Err(TimelineError::NotAdjacent);
        }
        self.check_layer_unlocked(layers, first.layer)?;

        // Order-independent: operate on the earlier/later pair.
        let (earlier, later) = if first.start <= second.start {
            (first, second)
        } else {
            (second, first)
        };
        if (later.start - earlier.end()).abs() > ADJACENCY_TOLERANCE {
            return Err(TimelineError::NotAdjacent);
        }
        let combined = later.end() - earlier.start;
        if combined > self.config.max_duration {
            return Err(TimelineError::DurationTooLong(combined));
        }

        let kept = earlier.id;
        let removed = later.id;
        if let Some(clip) = self.clips.get_mut(&kept) {
            clip.duration = combined;
        }
        self.clips.remove(&removed);
        self.notify(ClipChange::Combined { kept, removed });
        Ok(kept)
    }

    pub fn duplicate_clip(
        &mut self,
        layers: &LayerManager,
        id: ClipId,
        offset: Option<Seconds>,
    ) -> Result<ClipId, TimelineError> {
        let source = self
            .clip(id)
            .ok_or(TimelineError::ClipNotFound(id))?
            .clone();
        let new_start = match offset {
            Some(offset) if offset > 0.0 => source.start + offset,
            _ => source.end() + DUPLICATE_GAP,
        };
        let id = self.add_clip(
            layers,
            source.layer,
            source.kind,
            new_start,
            source.duration,
            source.payload,
        )?;
        // The copy keeps every non-temporal field, flags included
        if let Some(clip) = self.clips.get_mut(&id) {
            clip.visible = source.visible;
            clip.locked = source.locked;
        }
        Ok(id)
    }

    pub fn change_clip_layer(
        &mut self,
        layers: &LayerManager,
        id: ClipId,
        new_layer: LayerId,
    ) -> Result<(), TimelineError> {
        let clip = self.clip(id).ok_or(TimelineError::ClipNotFound(id))?;
        if clip.layer == new_layer {
            return Ok(());
        }
        let (kind, start, end, old_layer) = (clip.kind, clip.start, clip.end(), clip.layer);
        self.check_layer_unlocked(layers, old_layer)?;
        self.check_layer_accepts(layers, new_layer, kind)?;
        self.check_overlap(new_layer, start, end, None)?;

        if let Some(clip) = self.clips.get_mut(&id) {
            clip.layer = new_layer;
        }
        self.notify(ClipChange::Updated(id));
        Ok(())
    }

    /// Write a known-valid clip back verbatim, bypassing validation. This is
    /// the restore path for interaction cancel; it must not be used with
    /// unvalidated data.
    pub fn restore(&mut self, clip: Clip) {
        self.next_id = self.next_id.max(clip.id.0 + 1);
        let id = clip.id;
        self.clips.insert(id, clip);
        self.notify(ClipChange::Updated(id));
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.get(&id)
    }

    pub(crate) fn clip_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.clips.get_mut(&id)
    }

    /// All clips, ordered by id.
    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.clips.values()
    }

    /// Clips on one layer, ordered by start time.
    pub fn clips_in_layer(&self, layer: LayerId) -> Vec<&Clip> {
        let mut clips: Vec<&Clip> = self
            .clips
            .values()
            .filter(|c| c.layer == layer)
            .collect();
        clips.sort_by(|a, b| {
            a.start
                .partial_cmp(&b.start)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        clips
    }

    /// Clips whose interval intersects `[start, end)`.
    pub fn clips_in_range(&self, start: Seconds, end: Seconds) -> Vec<&Clip> {
        self.clips
            .values()
            .filter(|c| c.overlaps(start, end))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn export(&self) -> ClipSnapshot {
        ClipSnapshot {
            clips: self.clips.values().cloned().collect(),
            next_id: self.next_id,
        }
    }

    pub fn import(&mut self, snapshot: ClipSnapshot) {
        let max_id = snapshot
            .clips
            .iter()
            .map(|c| c.id.0 + 1)
            .max()
            .unwrap_or(0);
        self.next_id = snapshot.next_id.max(max_id);
        self.clips = snapshot
            .clips
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        self.notify(ClipChange::Reloaded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClipKind, LayerKind};

    fn setup() -> (ClipStore, LayerManager, LayerId) {
        let layers = LayerManager::new();
        let video = layers.layers_of(LayerKind::VideoImage)[0].id;
        (ClipStore::default(), layers, video)
    }

    fn add(store: &mut ClipStore, layers: &LayerManager, layer: LayerId, start: f64, duration: f64) -> ClipId {
        store
            .add_clip(layers, layer, ClipKind::Video, start, duration, ClipPayload::Empty)
            .unwrap()
    }

    #[test]
    fn test_add_clip_places_interval() {
        let (mut store, layers, video) = setup();
        let id = add(&mut store, &layers, video, 2.0, 1.0);
        let clip = store.clip(id).unwrap();
        assert_eq!(clip.start, 2.0);
        assert_eq!(clip.end(), 3.0);
    }

    #[test]
    fn test_add_rejects_overlap() {
        let (mut store, layers, video) = setup();
        add(&mut store, &layers, video, 2.0, 1.0);
        let err = store
            .add_clip(&layers, video, ClipKind::Video, 2.5, 1.0, ClipPayload::Empty)
            .unwrap_err();
        assert!(matches!(err, TimelineError::Overlap(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_rejects_bad_durations() {
        let (mut store, layers, video) = setup();
        let err = store
            .add_clip(&layers, video, ClipKind::Video, 0.0, 0.01, ClipPayload::Empty)
            .unwrap_err();
        assert!(matches!(err, TimelineError::DurationTooShort(_)));
        let err = store
            .add_clip(&layers, video, ClipKind::Video, 0.0, 100.0, ClipPayload::Empty)
            .unwrap_err();
        assert!(matches!(err, TimelineError::DurationTooLong(_)));
    }

    #[test]
    fn test_add_rejects_kind_mismatch_and_locked_layer() {
        let (mut store, mut layers, video) = setup();
        let err = store
            .add_clip(&layers, video, ClipKind::Text, 0.0, 1.0, ClipPayload::Empty)
            .unwrap_err();
        assert!(matches!(err, TimelineError::LayerTypeMismatch(_)));

        layers.toggle_lock(video).unwrap();
        let err = store
            .add_clip(&layers, video, ClipKind::Video, 0.0, 1.0, ClipPayload::Empty)
            .unwrap_err();
        assert!(matches!(err, TimelineError::LayerLocked(_)));
    }

    #[test]
    fn test_move_checks_neighbors_but_not_self() {
        let (mut store, layers, video) = setup();
        let a = add(&mut store, &layers, video, 0.0, 1.0);
        add(&mut store, &layers, video, 2.0, 1.0);

        // Sliding within its own old interval is fine
        store.move_clip(&layers, a, 0.5).unwrap();
        assert_eq!(store.clip(a).unwrap().start, 0.5);

        let err = store.move_clip(&layers, a, 1.5).unwrap_err();
        assert!(matches!(err, TimelineError::Overlap(_)));
        assert_eq!(store.clip(a).unwrap().start, 0.5);
    }

    #[test]
    fn test_move_is_reversible() {
        let (mut store, layers, video) = setup();
        let id = add(&mut store, &layers, video, 2.0, 1.5);
        store.move_clip(&layers, id, 4.0).unwrap();
        store.move_clip(&layers, id, 2.0).unwrap();
        let clip = store.clip(id).unwrap();
        assert_eq!(clip.start, 2.0);
        assert_eq!(clip.duration, 1.5);
    }

    #[test]
    fn test_resize_end_clamps_to_max_duration() {
        let (mut store, layers, video) = setup();
        let mut config = StoreConfig::default();
        config.max_duration = 5.0;
        *store.config_mut() = config;

        let id = add(&mut store, &layers, video, 0.0, 1.0);
        store.resize_clip(&layers, id, ResizeEdge::End, 20.0).unwrap();
        let clip = store.clip(id).unwrap();
        assert_eq!(clip.start, 0.0);
        assert_eq!(clip.duration, 5.0);
    }

    #[test]
    fn test_resize_start_keeps_end_fixed() {
        let (mut store, layers, video) = setup();
        let id = add(&mut store, &layers, video, 2.0, 3.0);
        store.resize_clip(&layers, id, ResizeEdge::Start, 3.0).unwrap();
        let clip = store.clip(id).unwrap();
        assert_eq!(clip.start, 3.0);
        assert_eq!(clip.end(), 5.0);
    }

    #[test]
    fn test_resize_start_clamps_to_min_duration() {
        let (mut store, layers, video) = setup();
        let id = add(&mut store, &layers, video, 2.0, 3.0);
        // Dragging the start edge past the end leaves a minimum-length clip
        store.resize_clip(&layers, id, ResizeEdge::Start, 10.0).unwrap();
        let clip = store.clip(id).unwrap();
        assert!((clip.duration - MIN_CLIP_DURATION).abs() < 1e-9);
        assert!((clip.end() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_produces_two_halves() {
        let (mut store, layers, video) = setup();
        let id = add(&mut store, &layers, video, 1.0, 3.0);
        let (first, second) = store.split_clip(&layers, id, 2.5).unwrap();
        let first = store.clip(first).unwrap();
        let second = store.clip(second).unwrap();
        assert_eq!(first.start, 1.0);
        assert_eq!(first.duration, 1.5);
        assert_eq!(second.start, 2.5);
        assert_eq!(second.duration, 1.5);
    }

    #[test]
    fn test_split_outside_clip_fails() {
        let (mut store, layers, video) = setup();
        let id = add(&mut store, &layers, video, 1.0, 3.0);
        let err = store.split_clip(&layers, id, 5.5).unwrap_err();
        assert!(matches!(err, TimelineError::SplitPointOutOfRange(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_split_shifts_media_source_offset() {
        let (mut store, layers, video) = setup();
        let id = store
            .add_clip(
                &layers,
                video,
                ClipKind::Video,
                0.0,
                4.0,
                ClipPayload::Media {
                    src: "take1.mp4".into(),
                    source_offset: 1.0,
                },
            )
            .unwrap();
        let (_, second) = store.split_clip(&layers, id, 3.0).unwrap();
        match &store.clip(second).unwrap().payload {
            ClipPayload::Media { source_offset, .. } => assert_eq!(*source_offset, 4.0),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_combine_is_order_independent() {
        let (mut store, layers, video) = setup();
        let a = add(&mut store, &layers, video, 1.0, 1.5);
        let b = add(&mut store, &layers, video, 2.5, 1.5);
        let kept = store.combine_clips(&layers, b, a).unwrap();
        assert_eq!(kept, a);
        let clip = store.clip(kept).unwrap();
        assert_eq!(clip.start, 1.0);
        assert_eq!(clip.duration, 3.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_combine_rejects_gap_and_kind_mismatch() {
        let (mut store, layers, video) = setup();
        let a = add(&mut store, &layers, video, 0.0, 1.0);
        let far = add(&mut store, &layers, video, 3.0, 1.0);
        assert!(matches!(
            store.combine_clips(&layers, a, far),
            Err(TimelineError::NotAdjacent)
        ));

        let image = store
            .add_clip(&layers, video, ClipKind::Image, 1.02, 1.0, ClipPayload::Empty)
            .unwrap();
        assert!(matches!(
            store.combine_clips(&layers, a, image),
            Err(TimelineError::KindMismatch)
        ));
    }

    #[test]
    fn test_combine_rejects_overlong_result() {
        let (mut store, layers, video) = setup();
        let a = add(&mut store, &layers, video, 0.0, 4.0);
        let b = add(&mut store, &layers, video, 4.0, 4.0);
        assert!(matches!(
            store.combine_clips(&layers, a, b),
            Err(TimelineError::DurationTooLong(_))
        ));
    }

    #[test]
    fn test_split_then_combine_restores_clip() {
        let (mut store, layers, video) = setup();
        let id = add(&mut store, &layers, video, 1.0, 3.0);
        let (first, second) = store.split_clip(&layers, id, 2.5).unwrap();
        let kept = store.combine_clips(&layers, first, second).unwrap();
        let clip = store.clip(kept).unwrap();
        assert_eq!(clip.start, 1.0);
        assert!((clip.duration - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_lands_after_original() {
        let (mut store, layers, video) = setup();
        let id = add(&mut store, &layers, video, 1.0, 1.0);
        let copy = store.duplicate_clip(&layers, id, None).unwrap();
        let copy = store.clip(copy).unwrap();
        assert!(copy.start >= 2.0);
        assert_eq!(copy.duration, 1.0);

        let offset = store.duplicate_clip(&layers, id, Some(4.0)).unwrap();
        assert_eq!(store.clip(offset).unwrap().start, 5.0);
    }

    #[test]
    fn test_change_layer_checks_lock_and_overlap() {
        let (mut store, mut layers, video) = setup();
        let second_video = layers.add_layer(LayerKind::VideoImage, None).unwrap();
        let id = add(&mut store, &layers, video, 1.0, 1.0);

        layers.toggle_lock(second_video).unwrap();
        let err = store.change_clip_layer(&layers, id, second_video).unwrap_err();
        assert!(matches!(err, TimelineError::LayerLocked(_)));
        assert_eq!(store.clip(id).unwrap().layer, video);

        layers.toggle_lock(second_video).unwrap();
        add(&mut store, &layers, second_video, 1.2, 1.0);
        let err = store.change_clip_layer(&layers, id, second_video).unwrap_err();
        assert!(matches!(err, TimelineError::Overlap(_)));

        let text = layers.layers_of(LayerKind::Text)[0].id;
        let err = store.change_clip_layer(&layers, id, text).unwrap_err();
        assert!(matches!(err, TimelineError::LayerTypeMismatch(_)));
    }

    #[test]
    fn test_range_query_uses_intersection() {
        let (mut store, layers, video) = setup();
        add(&mut store, &layers, video, 0.0, 1.0);
        let b = add(&mut store, &layers, video, 2.0, 2.0);
        let c = add(&mut store, &layers, video, 5.0, 1.0);

        let hits = store.clips_in_range(2.5, 5.5);
        let ids: Vec<ClipId> = hits.iter().map(|clip| clip.id).collect();
        assert!(ids.contains(&b));
        assert!(ids.contains(&c));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_import_respects_high_watermark() {
        let (mut store, layers, video) = setup();
        add(&mut store, &layers, video, 0.0, 1.0);
        let mut snapshot = store.export();
        snapshot.next_id = 40;

        let mut restored = ClipStore::default();
        restored.import(snapshot);
        let fresh = add(&mut restored, &layers, video, 5.0, 1.0);
        assert_eq!(fresh, ClipId(40));
    }

    #[test]
    fn test_change_listener_sees_commits_only() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let (mut store, layers, video) = setup();
        let seen: Rc<RefCell<Vec<ClipChange>>> = Rc::default();
        let sink = seen.clone();
        store.set_on_change(move |change| sink.borrow_mut().push(*change));

        let id = add(&mut store, &layers, video, 0.0, 1.0);
        let _ = store.add_clip(&layers, video, ClipKind::Video, 0.5, 1.0, ClipPayload::Empty);
        store.move_clip(&layers, id, 3.0).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ClipChange::Added(id));
        assert_eq!(seen[1], ClipChange::Updated(id));
    }
}
