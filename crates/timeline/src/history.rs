//! Snapshot-based undo/redo over the clip set.

use serde::{Deserialize, Serialize};

use crate::{ClipSnapshot, ClipStore, TimelineError};

pub const MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOp {
    Add,
    Move,
    ResizeStart,
    ResizeEnd,
    Split,
    Combine,
    Remove,
    Duplicate,
    ChangeLayer,
    RippleMove,
    RippleRemove,
    Roll,
    Razor,
    Import,
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub snapshot: ClipSnapshot,
    pub operation: EditOp,
    pub description: String,
}

#[derive(Debug, Default)]
pub struct History {
    past: Vec<HistoryEntry>,
    future: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the pre-edit snapshot of a committed operation. A fresh edit
    /// invalidates anything that was undone.
    pub fn record(
        &mut self,
        before: ClipSnapshot,
        operation: EditOp,
        description: impl Into<String>,
    ) {
        if self.past.len() >= MAX_HISTORY {
            self.past.remove(0);
        }
        self.past.push(HistoryEntry {
            snapshot: before,
            operation,
            description: description.into(),
        });
        self.future.clear();
    }

    /// Roll the store back to the newest recorded snapshot. Snapshots are
    /// known-valid states, so they re-enter through the import path.
    pub fn undo(&mut self, store: &mut ClipStore) -> Result<EditOp, TimelineError> {
        let HistoryEntry {
            snapshot,
            operation,
            description,
        } = self
            .past
            .pop()
            .ok_or(TimelineError::HistoryEmpty("undo stack"))?;
        self.future.push(HistoryEntry {
            snapshot: store.export(),
            operation,
            description,
        });
        store.import(snapshot);
        Ok(operation)
    }

    /// Re-apply the most recently undone edit.
    pub fn redo(&mut self, store: &mut ClipStore) -> Result<EditOp, TimelineError> {
        let HistoryEntry {
            snapshot,
            operation,
            description,
        } = self
            .future
            .pop()
            .ok_or(TimelineError::HistoryEmpty("redo stack"))?;
        self.past.push(HistoryEntry {
            snapshot: store.export(),
            operation,
            description,
        });
        store.import(snapshot);
        Ok(operation)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }
}
