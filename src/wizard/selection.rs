//! Current configuration choices
//!
//! Every setter call is recorded as a [`SelectionEvent`]; the returned
//! [`StepPatch`] (if any) is what the session should be told about.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::api::StepPatch;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub size: Option<String>,
    pub frame: Option<String>,
    pub background: Option<String>,
}

impl Selection {
    pub fn has_size(&self) -> bool {
        self.size.is_some()
    }

    pub fn has_colors(&self) -> bool {
        self.frame.is_some() && self.background.is_some()
    }

    /// Frame prefix and background name, when both are chosen
    pub fn colors(&self) -> Option<(&str, &str)> {
        match (&self.frame, &self.background) {
            (Some(frame), Some(background)) => Some((frame, background)),
            _ => None,
        }
    }

    fn colors_patch(&self) -> Option<StepPatch> {
        self.colors().map(|(frame, background)| StepPatch::Colors {
            frame_prefix: frame.to_string(),
            background_name: background.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionField {
    Size,
    Frame,
    Background,
}

/// One setter call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionEvent {
    pub field: SelectionField,
    pub value: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SelectionStore {
    selection: Selection,
    history: Vec<SelectionEvent>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn history(&self) -> &[SelectionEvent] {
        &self.history
    }

    pub fn set_size(&mut self, size: &str) -> Option<StepPatch> {
        self.record(SelectionField::Size, size);
        self.selection.size = Some(size.to_string());
        Some(StepPatch::Size {
            size: size.to_string(),
        })
    }

    pub fn set_frame(&mut self, prefix: &str) -> Option<StepPatch> {
        self.record(SelectionField::Frame, prefix);
        self.selection.frame = Some(prefix.to_string());
        self.selection.colors_patch()
    }

    pub fn set_background(&mut self, name: &str) -> Option<StepPatch> {
        self.record(SelectionField::Background, name);
        self.selection.background = Some(name.to_string());
        self.selection.colors_patch()
    }

    /// Fill unset colors with catalog defaults; not a visitor event, so no
    /// history entry and no patch
    pub fn apply_defaults(&mut self, frame: Option<&str>, background: Option<&str>) -> bool {
        let mut changed = false;
        if self.selection.frame.is_none() {
            if let Some(frame) = frame {
                self.selection.frame = Some(frame.to_string());
                changed = true;
            }
        }
        if self.selection.background.is_none() {
            if let Some(background) = background {
                self.selection.background = Some(background.to_string());
                changed = true;
            }
        }
        if changed {
            debug!(selection = ?self.selection, "applied catalog defaults");
        }
        changed
    }

    fn record(&mut self, field: SelectionField, value: &str) {
        debug!(?field, value, "selection changed");
        self.history.push(SelectionEvent {
            field,
            value: value.to_string(),
            at: Utc::now(),
        });
    }
}
