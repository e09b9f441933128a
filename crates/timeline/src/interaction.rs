//! Pointer gestures over the clip area.
//!
//! A small state machine turns pointer events into store operations. The
//! store's own snap and validation stay authoritative: a rejected mutation
//! leaves the clip where it was while the gesture continues, and cancel
//! restores the exact pre-gesture clip from a snapshot.

use crate::{
    Clip, ClipId, ClipStore, LayerManager, ResizeEdge, Seconds, TimelineController, TimelineError,
};

/// Where on the clip the pointer went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitRegion {
    Body,
    StartHandle,
    EndHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Move,
    ResizeStart,
    ResizeEnd,
}

#[derive(Debug, Clone)]
enum GestureState {
    Idle,
    Active {
        kind: GestureKind,
        clip: ClipId,
        snapshot: Clip,
        origin_px: f32,
        origin_value: Seconds,
    },
}

/// Outcome of a finished gesture, for history recording.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedGesture {
    pub kind: GestureKind,
    pub clip: ClipId,
    pub before: Clip,
    pub changed: bool,
}

#[derive(Debug)]
pub struct InteractionController {
    state: GestureState,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionController {
    pub fn new() -> Self {
        Self {
            state: GestureState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, GestureState::Idle)
    }

    pub fn active_clip(&self) -> Option<ClipId> {
        match &self.state {
            GestureState::Active { clip, .. } => Some(*clip),
            GestureState::Idle => None,
        }
    }

    /// Begin a gesture. Only one may run at a time, and clips on locked
    /// layers do not react to the pointer at all.
    pub fn pointer_down(
        &mut self,
        store: &ClipStore,
        layers: &LayerManager,
        clip_id: ClipId,
        region: HitRegion,
        x_px: f32,
    ) -> Result<(), TimelineError> {
        if self.is_active() {
            return Err(TimelineError::InteractionActive);
        }
        let clip = store
            .clip(clip_id)
            .ok_or(TimelineError::ClipNotFound(clip_id))?;
        if layers.is_locked(clip.layer) {
            return Err(TimelineError::LayerLocked(clip.layer));
        }
        let kind = match region {
            HitRegion::Body => GestureKind::Move,
            HitRegion::StartHandle => GestureKind::ResizeStart,
            HitRegion::EndHandle => GestureKind::ResizeEnd,
        };
        let origin_value = match kind {
            GestureKind::Move | GestureKind::ResizeStart => clip.start,
            GestureKind::ResizeEnd => clip.end(),
        };
        self.state = GestureState::Active {
            kind,
            clip: clip_id,
            snapshot: clip.clone(),
            origin_px: x_px,
            origin_value,
        };
        Ok(())
    }

    /// Track the pointer. Invalid candidates are dropped by the store and
    /// the gesture stays live, so the clip simply stops following.
    pub fn pointer_move(
        &mut self,
        store: &mut ClipStore,
        layers: &LayerManager,
        view: &TimelineController,
        x_px: f32,
    ) {
        let GestureState::Active {
            kind,
            clip,
            origin_px,
            origin_value,
            ..
        } = &self.state
        else {
            return;
        };
        let candidate = origin_value + view.pixels_to_time(x_px - origin_px);
        let result = match kind {
            GestureKind::Move => store.move_clip(layers, *clip, candidate),
            GestureKind::ResizeStart => {
                store.resize_clip(layers, *clip, ResizeEdge::Start, candidate)
            }
            GestureKind::ResizeEnd => store.resize_clip(layers, *clip, ResizeEdge::End, candidate),
        };
        let _ = result;
    }

    /// Commit: the store already holds the final state, so this only tears
    /// down the gesture and reports what happened.
    pub fn pointer_up(&mut self, store: &ClipStore) -> Option<CompletedGesture> {
        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        let GestureState::Active {
            kind,
            clip,
            snapshot,
            ..
        } = state
        else {
            return None;
        };
        let changed = store.clip(clip) != Some(&snapshot);
        Some(CompletedGesture {
            kind,
            clip,
            before: snapshot,
            changed,
        })
    }

    /// Abort the gesture and put the clip back exactly as it was. The
    /// snapshot is a known-valid prior state, so the restore bypasses
    /// validation.
    pub fn cancel(&mut self, store: &mut ClipStore) {
        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        if let GestureState::Active { snapshot, .. } = state {
            store.restore(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClipKind, ClipPayload, LayerKind};

    fn setup() -> (ClipStore, LayerManager, TimelineController, ClipId) {
        let layers = LayerManager::new();
        let video = layers.layers_of(LayerKind::VideoImage)[0].id;
        let mut store = ClipStore::default();
        let id = store
            .add_clip(&layers, video, ClipKind::Video, 2.0, 1.0, ClipPayload::Empty)
            .unwrap();
        (store, layers, TimelineController::new(60.0), id)
    }

    #[test]
    fn test_drag_moves_clip_through_store() {
        let (mut store, layers, view, id) = setup();
        let mut controller = InteractionController::new();
        controller
            .pointer_down(&store, &layers, id, HitRegion::Body, 200.0)
            .unwrap();
        // 100 px right at zoom 1.0 is one second
        controller.pointer_move(&mut store, &layers, &view, 300.0);
        let done = controller.pointer_up(&store).unwrap();
        assert!(done.changed);
        assert_eq!(done.before.start, 2.0);
        assert_eq!(store.clip(id).unwrap().start, 3.0);
        assert!(!controller.is_active());
    }

    #[test]
    fn test_resize_end_gesture() {
        let (mut store, layers, view, id) = setup();
        let mut controller = InteractionController::new();
        controller
            .pointer_down(&store, &layers, id, HitRegion::EndHandle, 300.0)
            .unwrap();
        controller.pointer_move(&mut store, &layers, &view, 400.0);
        controller.pointer_up(&store);
        assert_eq!(store.clip(id).unwrap().duration, 2.0);
    }

    #[test]
    fn test_locked_layer_rejects_pointer_down() {
        let (store, mut layers, _, id) = setup();
        let layer = store.clip(id).unwrap().layer;
        layers.toggle_lock(layer).unwrap();
        let mut controller = InteractionController::new();
        let err = controller
            .pointer_down(&store, &layers, id, HitRegion::Body, 0.0)
            .unwrap_err();
        assert!(matches!(err, TimelineError::LayerLocked(_)));
        assert!(!controller.is_active());
    }

    #[test]
    fn test_second_gesture_rejected_while_active() {
        let (store, layers, _, id) = setup();
        let mut controller = InteractionController::new();
        controller
            .pointer_down(&store, &layers, id, HitRegion::Body, 0.0)
            .unwrap();
        let err = controller
            .pointer_down(&store, &layers, id, HitRegion::Body, 0.0)
            .unwrap_err();
        assert!(matches!(err, TimelineError::InteractionActive));
    }

    #[test]
    fn test_rejected_move_keeps_gesture_alive() {
        let (mut store, layers, view, id) = setup();
        let other = store
            .add_clip(
                &layers,
                store.clip(id).unwrap().layer,
                ClipKind::Video,
                4.0,
                1.0,
                ClipPayload::Empty,
            )
            .unwrap();
        let mut controller = InteractionController::new();
        controller
            .pointer_down(&store, &layers, id, HitRegion::Body, 200.0)
            .unwrap();
        // Into the other clip: rejected, nothing moves
        controller.pointer_move(&mut store, &layers, &view, 420.0);
        assert!(controller.is_active());
        assert_eq!(store.clip(id).unwrap().start, 2.0);
        assert_eq!(store.clip(other).unwrap().start, 4.0);
        // A later legal position still lands
        controller.pointer_move(&mut store, &layers, &view, 280.0);
        let done = controller.pointer_up(&store).unwrap();
        assert!(done.changed);
        assert_eq!(store.clip(id).unwrap().start, 2.8);
    }

    #[test]
    fn test_cancel_restores_snapshot() {
        let (mut store, layers, view, id) = setup();
        let mut controller = InteractionController::new();
        controller
            .pointer_down(&store, &layers, id, HitRegion::Body, 200.0)
            .unwrap();
        controller.pointer_move(&mut store, &layers, &view, 350.0);
        assert_ne!(store.clip(id).unwrap().start, 2.0);
        controller.cancel(&mut store);
        assert_eq!(store.clip(id).unwrap().start, 2.0);
        assert!(!controller.is_active());
        // Cancel while idle is a no-op
        controller.cancel(&mut store);
    }

    #[test]
    fn test_pointer_up_without_change_reports_unchanged() {
        let (mut store, layers, view, id) = setup();
        let mut controller = InteractionController::new();
        controller
            .pointer_down(&store, &layers, id, HitRegion::Body, 200.0)
            .unwrap();
        controller.pointer_move(&mut store, &layers, &view, 200.0);
        let done = controller.pointer_up(&store).unwrap();
        assert!(!done.changed);
    }
}
