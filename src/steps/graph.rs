//! Static ordered list of funnel steps

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a funnel step; doubles as its navigation route
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Personalization,
    Size,
    Colors,
    Upload,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Personalization => "personalization",
            StepId::Size => "size",
            StepId::Colors => "colors",
            StepId::Upload => "upload",
        }
    }

    /// Parse a route segment such as `/upload` or `colors`
    pub fn from_route(route: &str) -> Option<Self> {
        match route.trim().trim_matches('/') {
            "personalization" => Some(StepId::Personalization),
            "size" => Some(StepId::Size),
            "colors" => Some(StepId::Colors),
            "upload" => Some(StepId::Upload),
            _ => None,
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which predicate marks a step complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionRule {
    /// A size is selected
    SizeChosen,
    /// Frame and background are selected
    ColorsChosen,
    /// Size, frame and background are selected
    Personalized,
    /// At least one photo and every present photo finished uploading
    PhotosUploaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: StepId,
    pub label: String,
    pub order: usize,
    pub rule: CompletionRule,
}

/// Step arrangement for the funnel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepLayout {
    /// personalization -> upload
    #[default]
    Combined,
    /// size -> colors -> upload
    Split,
}

#[derive(Debug, Clone)]
pub struct StepGraph {
    steps: Vec<Step>,
}

impl StepGraph {
    pub fn new(layout: StepLayout) -> Self {
        let defs: &[(StepId, &str, CompletionRule)] = match layout {
            StepLayout::Combined => &[
                (
                    StepId::Personalization,
                    "Personalization",
                    CompletionRule::Personalized,
                ),
                (StepId::Upload, "Photos", CompletionRule::PhotosUploaded),
            ],
            StepLayout::Split => &[
                (StepId::Size, "Size", CompletionRule::SizeChosen),
                (StepId::Colors, "Colors", CompletionRule::ColorsChosen),
                (StepId::Upload, "Photos", CompletionRule::PhotosUploaded),
            ],
        };

        let steps = defs
            .iter()
            .enumerate()
            .map(|(order, (id, label, rule))| Step {
                id: *id,
                label: (*label).to_string(),
                order,
                rule: *rule,
            })
            .collect();

        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn index_of(&self, id: StepId) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// Index for a navigation route, if the route names a step in this graph
    pub fn index_of_route(&self, route: &str) -> Option<usize> {
        StepId::from_route(route).and_then(|id| self.index_of(id))
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.steps.len()
    }
}

impl Default for StepGraph {
    fn default() -> Self {
        Self::new(StepLayout::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_layout() {
        let graph = StepGraph::new(StepLayout::Combined);
        let ids: Vec<StepId> = graph.steps().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![StepId::Personalization, StepId::Upload]);
        assert!(graph.is_last(1));
        assert!(!graph.is_last(0));
    }

    #[test]
    fn test_split_layout_orders() {
        let graph = StepGraph::new(StepLayout::Split);
        assert_eq!(graph.len(), 3);
        for (i, step) in graph.steps().iter().enumerate() {
            assert_eq!(step.order, i);
        }
        assert_eq!(graph.index_of(StepId::Colors), Some(1));
        assert_eq!(graph.index_of(StepId::Personalization), None);
    }

    #[test]
    fn test_route_lookup() {
        let graph = StepGraph::default();
        assert_eq!(graph.index_of_route("/upload"), Some(1));
        assert_eq!(graph.index_of_route("personalization"), Some(0));
        assert_eq!(graph.index_of_route("/colors"), None);
        assert_eq!(graph.index_of_route(""), None);
    }

    #[test]
    fn test_step_ids_sort_in_funnel_order() {
        let mut ids = vec![StepId::Upload, StepId::Size, StepId::Personalization, StepId::Colors];
        ids.sort();
        assert_eq!(
            ids,
            vec![StepId::Personalization, StepId::Size, StepId::Colors, StepId::Upload]
        );
    }
}
