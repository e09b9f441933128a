//! Typed layers and their lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ClipKind, ClipStore, LayerId, TimelineError};

pub const MAX_LAYERS_PER_TYPE: usize = 4;
pub const DEFAULT_LAYER_HEIGHT: f32 = 60.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Audio,
    VideoImage,
    Text,
    Effects,
}

impl LayerKind {
    /// Which clip kinds this layer type may host.
    pub fn accepts(&self, kind: ClipKind) -> bool {
        match self {
            Self::Audio => kind == ClipKind::Audio,
            Self::VideoImage => matches!(
                kind,
                ClipKind::Video | ClipKind::Image | ClipKind::Transition
            ),
            Self::Text => kind == ClipKind::Text,
            Self::Effects => kind == ClipKind::Effect,
        }
    }

    /// The layer type a clip kind lands on by default.
    pub fn for_clip(kind: ClipKind) -> Self {
        match kind {
            ClipKind::Audio => Self::Audio,
            ClipKind::Video | ClipKind::Image | ClipKind::Transition => Self::VideoImage,
            ClipKind::Text => Self::Text,
            ClipKind::Effect => Self::Effects,
        }
    }

    pub fn base_name(&self) -> &'static str {
        match self {
            Self::Audio => "Audio",
            Self::VideoImage => "Video",
            Self::Text => "Text",
            Self::Effects => "Effects",
        }
    }

    pub fn all() -> [Self; 4] {
        [Self::Audio, Self::VideoImage, Self::Text, Self::Effects]
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub kind: LayerKind,
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    /// Stacking order for rendering; higher draws on top.
    pub order: u32,
    #[serde(default = "default_height")]
    pub height: f32,
}

fn default_visible() -> bool {
    true
}

fn default_height() -> f32 {
    DEFAULT_LAYER_HEIGHT
}

/// Serialized layer set plus the id high-watermark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub layers: Vec<Layer>,
    pub next_id: u64,
}

#[derive(Debug, Clone)]
pub struct LayerManager {
    layers: Vec<Layer>,
    next_id: u64,
    max_per_type: usize,
}

impl Default for LayerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerManager {
    /// One layer per type; the audio layer starts locked, matching the
    /// convention that the master track is not edited directly.
    pub fn new() -> Self {
        let mut manager = Self {
            layers: Vec::new(),
            next_id: 0,
            max_per_type: MAX_LAYERS_PER_TYPE,
        };
        for kind in LayerKind::all() {
            let id = manager.push_layer(kind, None);
            if kind == LayerKind::Audio {
                if let Some(layer) = manager.layer_mut(id) {
                    layer.locked = true;
                }
            }
        }
        manager
    }

    pub fn with_capacity_per_type(max_per_type: usize) -> Self {
        let mut manager = Self::new();
        manager.max_per_type = max_per_type.max(1);
        manager
    }

    fn push_layer(&mut self, kind: LayerKind, name: Option<String>) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        let name = name.unwrap_or_else(|| self.unique_name(kind));
        let order = self
            .layers
            .iter()
            .map(|layer| layer.order + 1)
            .max()
            .unwrap_or(0);
        self.layers.push(Layer {
            id,
            kind,
            name,
            visible: true,
            locked: false,
            order,
            height: DEFAULT_LAYER_HEIGHT,
        });
        id
    }

    fn unique_name(&self, kind: LayerKind) -> String {
        let existing = self.layers.iter().filter(|l| l.kind == kind).count();
        if existing == 0 {
            kind.base_name().to_string()
        } else {
            format!("{} {}", kind.base_name(), existing + 1)
        }
    }

    pub fn add_layer(
        &mut self,
        kind: LayerKind,
        name: Option<String>,
    ) -> Result<LayerId, TimelineError> {
        let count = self.layers.iter().filter(|l| l.kind == kind).count();
        if count >= self.max_per_type {
            return Err(TimelineError::LayerCapacityExceeded(kind));
        }
        Ok(self.push_layer(kind, name))
    }

    pub fn remove_layer(
        &mut self,
        store: &ClipStore,
        id: LayerId,
    ) -> Result<Layer, TimelineError> {
        let index = self
            .layers
            .iter()
            .position(|l| l.id == id)
            .ok_or(TimelineError::LayerNotFound(id))?;
        if !store.clips_in_layer(id).is_empty() {
            return Err(TimelineError::LayerNotEmpty(id));
        }
        let kind = self.layers[index].kind;
        if self.layers.iter().filter(|l| l.kind == kind).count() <= 1 {
            return Err(TimelineError::LastLayerOfType(kind));
        }
        Ok(self.layers.remove(index))
    }

    pub fn toggle_visibility(&mut self, id: LayerId) -> Result<bool, TimelineError> {
        let layer = self
            .layer_mut(id)
            .ok_or(TimelineError::LayerNotFound(id))?;
        layer.visible = !layer.visible;
        Ok(layer.visible)
    }

    pub fn toggle_lock(&mut self, id: LayerId) -> Result<bool, TimelineError> {
        let layer = self
            .layer_mut(id)
            .ok_or(TimelineError::LayerNotFound(id))?;
        layer.locked = !layer.locked;
        Ok(layer.locked)
    }

    /// Least-occupied unlocked layer able to host `kind`, auto-creating one
    /// when the per-type cap still allows it.
    pub fn available_layer_for(
        &mut self,
        store: &ClipStore,
        kind: ClipKind,
    ) -> Option<LayerId> {
        let best = self
            .layers
            .iter()
            .filter(|l| !l.locked && l.kind.accepts(kind))
            .map(|l| (store.clips_in_layer(l.id).len(), l.id))
            .min();
        match best {
            Some((_, id)) => Some(id),
            None => self.add_layer(LayerKind::for_clip(kind), None).ok(),
        }
    }

    pub fn move_layer_up(&mut self, id: LayerId) -> Result<(), TimelineError> {
        self.swap_order(id, true)
    }

    pub fn move_layer_down(&mut self, id: LayerId) -> Result<(), TimelineError> {
        self.swap_order(id, false)
    }

    fn swap_order(&mut self, id: LayerId, up: bool) -> Result<(), TimelineError> {
        let order = self
            .layer(id)
            .ok_or(TimelineError::LayerNotFound(id))?
            .order;
        let neighbor = self
            .layers
            .iter()
            .filter(|l| if up { l.order > order } else { l.order < order })
            .min_by_key(|l| {
                if up {
                    l.order - order
                } else {
                    order - l.order
                }
            })
            .map(|l| l.id);
        if let Some(other) = neighbor {
            let other_order = self.layer(other).map(|l| l.order).unwrap_or(order);
            if let Some(layer) = self.layer_mut(id) {
                layer.order = other_order;
            }
            if let Some(layer) = self.layer_mut(other) {
                layer.order = order;
            }
        }
        Ok(())
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn is_locked(&self, id: LayerId) -> bool {
        self.layer(id).map(|l| l.locked).unwrap_or(false)
    }

    /// Layers in stacking order, bottom first.
    pub fn layers(&self) -> Vec<&Layer> {
        let mut ordered: Vec<&Layer> = self.layers.iter().collect();
        ordered.sort_by_key(|l| l.order);
        ordered
    }

    pub fn layers_of(&self, kind: LayerKind) -> Vec<&Layer> {
        self.layers.iter().filter(|l| l.kind == kind).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn export(&self) -> LayerSnapshot {
        LayerSnapshot {
            layers: self.layers.clone(),
            next_id: self.next_id,
        }
    }

    pub fn import(&mut self, snapshot: LayerSnapshot) {
        let max_id = snapshot
            .layers
            .iter()
            .map(|l| l.id.0 + 1)
            .max()
            .unwrap_or(0);
        self.next_id = snapshot.next_id.max(max_id);
        self.layers = snapshot.layers;
    }
}
