//! Drawing gesture state machine.
//!
//! A gesture runs from drag-start to drag-stop (or to the pointer leaving
//! the canvas, which finalizes with the last known position). Exactly one
//! gesture can be active at a time, and none can start without a selected
//! label.

use crate::geometry::{UvPoint, UvRect};

/// Why a gesture could not start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawRefusal {
    /// Drawing requires an active label selection.
    NoLabelSelected,
    /// A gesture is already in progress.
    GestureActive,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawState {
    Idle,
    Drawing { anchor: UvPoint, current: UvPoint },
}

impl DrawState {
    pub fn is_drawing(&self) -> bool {
        matches!(self, DrawState::Drawing { .. })
    }

    /// Start a gesture at `at`. Refused when no label is selected or when a
    /// gesture is already active; the state is unchanged in both cases.
    pub fn begin(&mut self, at: UvPoint, label_selected: bool) -> Result<(), DrawRefusal> {
        if self.is_drawing() {
            return Err(DrawRefusal::GestureActive);
        }
        if !label_selected {
            return Err(DrawRefusal::NoLabelSelected);
        }
        *self = DrawState::Drawing {
            anchor: at,
            current: at,
        };
        Ok(())
    }

    /// Track the pointer during a gesture. No-op while idle.
    pub fn update(&mut self, at: UvPoint) {
        if let DrawState::Drawing { current, .. } = self {
            *current = at;
        }
    }

    /// End the gesture and return the normalized rectangle, or `None` when
    /// idle or when the result is below the minimum size. Always returns to
    /// `Idle`.
    pub fn finish(&mut self) -> Option<UvRect> {
        let DrawState::Drawing { anchor, current } = *self else {
            return None;
        };
        *self = DrawState::Idle;
        let rect = UvRect::from_corners(anchor, current);
        if rect.is_degenerate() {
            return None;
        }
        Some(rect)
    }

    /// Live preview rectangle while drawing.
    pub fn preview(&self) -> Option<UvRect> {
        match self {
            DrawState::Drawing { anchor, current } => {
                Some(UvRect::from_corners(*anchor, *current))
            }
            DrawState::Idle => None,
        }
    }
}
