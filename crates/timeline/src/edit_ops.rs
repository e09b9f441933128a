//! Ripple, roll and razor edits layered over the clip store.
//!
//! These operations plan the whole arrangement first and commit only when
//! the result is valid, so a failed edit leaves every clip untouched.

use crate::{
    ClipChange, ClipId, ClipStore, LayerManager, Seconds, TimelineError, ADJACENCY_TOLERANCE,
};

impl ClipStore {
    /// Move a clip and shift every same-layer clip that started at or after
    /// its original end by the same delta.
    pub fn ripple_move(
        &mut self,
        layers: &LayerManager,
        id: ClipId,
        new_start: Seconds,
    ) -> Result<Vec<(ClipId, Seconds)>, TimelineError> {
        let clip = self.clip(id).ok_or(TimelineError::ClipNotFound(id))?;
        let layer = clip.layer;
        if layers.is_locked(layer) {
            return Err(TimelineError::LayerLocked(layer));
        }
        let (old_start, old_end) = (clip.start, clip.end());

        let snapped = self.snap_time(new_start, Some(id)).time.max(0.0);
        let delta = snapped - old_start;

        let mut moves = vec![(id, snapped)];
        for other in self.clips_in_layer(layer) {
            if other.id != id && other.start >= old_end {
                moves.push((other.id, other.start + delta));
            }
        }
        self.validate_layer_plan(layer, &moves)?;
        self.commit_moves(&moves);
        Ok(moves.split_off(1))
    }

    /// Remove a clip and close the gap: everything behind it on the layer
    /// slides left by the removed duration.
    pub fn ripple_remove(
        &mut self,
        layers: &LayerManager,
        id: ClipId,
    ) -> Result<Vec<(ClipId, Seconds)>, TimelineError> {
        let clip = self.clip(id).ok_or(TimelineError::ClipNotFound(id))?;
        let layer = clip.layer;
        if layers.is_locked(layer) {
            return Err(TimelineError::LayerLocked(layer));
        }
        let (start, duration) = (clip.start, clip.duration);

        let moves: Vec<(ClipId, Seconds)> = self
            .clips_in_layer(layer)
            .into_iter()
            .filter(|c| c.id != id && c.start > start)
            .map(|c| (c.id, (c.start - duration).max(0.0)))
            .collect();

        self.remove_clip(id)?;
        self.commit_moves(&moves);
        Ok(moves)
    }

    /// Adjust the edit point between two adjacent clips: the left clip's end
    /// and the right clip's start move together to `edit_point`.
    pub fn roll_edit(
        &mut self,
        layers: &LayerManager,
        left: ClipId,
        right: ClipId,
        edit_point: Seconds,
    ) -> Result<(), TimelineError> {
        let left_clip = self.clip(left).ok_or(TimelineError::ClipNotFound(left))?;
        let right_clip = self.clip(right).ok_or(TimelineError::ClipNotFound(right))?;
        let layer = left_clip.layer;
        if right_clip.layer != layer {
            return Err(TimelineError::NotAdjacent);
        }
        if layers.is_locked(layer) {
            return Err(TimelineError::LayerLocked(layer));
        }
        let (left_clip, right_clip) = if left_clip.start <= right_clip.start {
            (left_clip, right_clip)
        } else {
            (right_clip, left_clip)
        };
        if (right_clip.start - left_clip.end()).abs() > ADJACENCY_TOLERANCE {
            return Err(TimelineError::NotAdjacent);
        }

        let left_id = left_clip.id;
        let right_id = right_clip.id;
        let left_start = left_clip.start;
        let right_end = right_clip.end();
        let new_left = edit_point - left_start;
        let new_right = right_end - edit_point;
        let min = self.config().min_duration;
        let max = self.config().max_duration;
        if new_left < min || new_right < min {
            return Err(TimelineError::SplitPointOutOfRange(edit_point));
        }
        if new_left > max || new_right > max {
            return Err(TimelineError::DurationTooLong(new_left.max(new_right)));
        }

        if let Some(clip) = self.clip_mut(left_id) {
            clip.duration = new_left;
        }
        if let Some(clip) = self.clip_mut(right_id) {
            clip.start = edit_point;
            clip.duration = new_right;
        }
        self.notify(ClipChange::Updated(left_id));
        self.notify(ClipChange::Updated(right_id));
        Ok(())
    }

    /// Cut through every editable clip spanning `time` (multi-track razor).
    /// Clips on locked or hidden layers, locked clips, and clips where the
    /// cut would leave a sliver below the duration floor are skipped.
    pub fn razor_all(
        &mut self,
        layers: &LayerManager,
        time: Seconds,
    ) -> Vec<(ClipId, ClipId)> {
        let min = self.config().min_duration;
        let targets: Vec<ClipId> = self
            .clips()
            .filter(|c| {
                let layer_ok = layers
                    .layer(c.layer)
                    .map(|l| l.visible && !l.locked)
                    .unwrap_or(false);
                layer_ok
                    && !c.locked
                    && time - c.start >= min
                    && c.end() - time >= min
            })
            .map(|c| c.id)
            .collect();

        let mut cuts = Vec::with_capacity(targets.len());
        for id in targets {
            let (original, second) = self.split_unchecked(id, time);
            self.notify(ClipChange::Split { original, second });
            cuts.push((original, second));
        }
        cuts
    }

    /// Reject a planned arrangement that would stack clips or push one
    /// before the timeline start.
    fn validate_layer_plan(
        &self,
        layer: crate::LayerId,
        moves: &[(ClipId, Seconds)],
    ) -> Result<(), TimelineError> {
        if self.config().allow_overlap {
            return Ok(());
        }
        let mut intervals: Vec<(Seconds, Seconds)> = Vec::new();
        for clip in self.clips_in_layer(layer) {
            let start = moves
                .iter()
                .find(|(id, _)| *id == clip.id)
                .map(|(_, s)| *s)
                .unwrap_or(clip.start);
            if start < 0.0 {
                return Err(TimelineError::Overlap(layer));
            }
            intervals.push((start, start + clip.duration));
        }
        intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        for pair in intervals.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Err(TimelineError::Overlap(layer));
            }
        }
        Ok(())
    }

    fn commit_moves(&mut self, moves: &[(ClipId, Seconds)]) {
        for (id, start) in moves {
            if let Some(clip) = self.clip_mut(*id) {
                clip.start = *start;
            }
            self.notify(ClipChange::Updated(*id));
        }
    }
}
