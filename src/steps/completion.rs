//! Step completion and prefix gating
//!
//! Everything here is a pure function of the selection and slot snapshots;
//! no remote state is consulted.

use serde::Serialize;

use super::graph::{CompletionRule, StepGraph, StepId};
use crate::upload::{SlotStatus, UploadSlot};
use crate::wizard::Selection;

pub fn rule_satisfied(rule: CompletionRule, selection: &Selection, slots: &[UploadSlot]) -> bool {
    match rule {
        CompletionRule::SizeChosen => selection.has_size(),
        CompletionRule::ColorsChosen => selection.has_colors(),
        CompletionRule::Personalized => selection.has_size() && selection.has_colors(),
        CompletionRule::PhotosUploaded => {
            let mut present = slots.iter().filter(|s| !s.is_empty()).peekable();
            present.peek().is_some() && present.all(|s| s.status == SlotStatus::Completed)
        }
    }
}

/// Completion and accessibility of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatus {
    pub id: StepId,
    pub label: String,
    pub complete: bool,
    pub accessible: bool,
}

pub struct CompletionEvaluator<'a> {
    graph: &'a StepGraph,
    selection: &'a Selection,
    slots: &'a [UploadSlot],
}

impl<'a> CompletionEvaluator<'a> {
    pub fn new(graph: &'a StepGraph, selection: &'a Selection, slots: &'a [UploadSlot]) -> Self {
        Self {
            graph,
            selection,
            slots,
        }
    }

    /// Steps not in the graph are never complete
    pub fn is_complete(&self, id: StepId) -> bool {
        self.graph
            .index_of(id)
            .is_some_and(|i| self.is_index_complete(i))
    }

    pub fn is_index_complete(&self, index: usize) -> bool {
        self.graph
            .get(index)
            .is_some_and(|step| rule_satisfied(step.rule, self.selection, self.slots))
    }

    /// Step `index` is accessible iff every earlier step is complete
    pub fn can_access(&self, index: usize) -> bool {
        index < self.graph.len() && (0..index).all(|j| self.is_index_complete(j))
    }

    /// Where to land when the requested step is invalid or gated: the first
    /// step that is incomplete, or the last step if all are complete
    pub fn redirect_target(&self) -> usize {
        let last = self.graph.len().saturating_sub(1);
        (0..self.graph.len())
            .find(|&i| !self.is_index_complete(i))
            .unwrap_or(last)
    }

    /// Resolve a requested index to the one that should be shown
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(i) if self.can_access(i) => i,
            _ => self.redirect_target(),
        }
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.graph
            .steps()
            .iter()
            .enumerate()
            .map(|(i, step)| StepStatus {
                id: step.id,
                label: step.label.clone(),
                complete: self.is_index_complete(i),
                accessible: self.can_access(i),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::StepLayout;
    use crate::upload::{PhotoFile, SLOT_COUNT};

    fn empty_slots() -> Vec<UploadSlot> {
        (0..SLOT_COUNT).map(UploadSlot::empty).collect()
    }

    fn with_photo(slots: &mut [UploadSlot], index: usize, status: SlotStatus) {
        slots[index].file = Some(PhotoFile::new("a.jpg", vec![1]));
        slots[index].status = status;
    }

    fn selection(size: Option<&str>, frame: Option<&str>, background: Option<&str>) -> Selection {
        Selection {
            size: size.map(String::from),
            frame: frame.map(String::from),
            background: background.map(String::from),
        }
    }

    #[test]
    fn test_upload_rule() {
        let mut slots = empty_slots();
        let sel = Selection::default();
        assert!(!rule_satisfied(CompletionRule::PhotosUploaded, &sel, &slots));

        with_photo(&mut slots, 0, SlotStatus::Completed);
        assert!(rule_satisfied(CompletionRule::PhotosUploaded, &sel, &slots));

        with_photo(&mut slots, 1, SlotStatus::Uploading);
        assert!(!rule_satisfied(CompletionRule::PhotosUploaded, &sel, &slots));

        with_photo(&mut slots, 1, SlotStatus::Failed);
        assert!(!rule_satisfied(CompletionRule::PhotosUploaded, &sel, &slots));
    }

    #[test]
    fn test_access_is_prefix_completion() {
        let graph = StepGraph::new(StepLayout::Split);
        let slots = empty_slots();
        let cases = [
            selection(None, None, None),
            selection(Some("30x40"), None, None),
            selection(None, Some("preto"), Some("azul")),
            selection(Some("30x40"), Some("preto"), Some("azul")),
        ];

        for sel in &cases {
            let eval = CompletionEvaluator::new(&graph, sel, &slots);
            for i in 0..graph.len() {
                let prefix_complete = (0..i).all(|j| eval.is_index_complete(j));
                assert_eq!(eval.can_access(i), prefix_complete, "step {} for {:?}", i, sel);
            }
            assert!(!eval.can_access(graph.len()));
        }
    }

    #[test]
    fn test_colors_without_size_stays_gated() {
        let graph = StepGraph::new(StepLayout::Split);
        let slots = empty_slots();
        let sel = selection(None, Some("preto"), Some("azul"));
        let eval = CompletionEvaluator::new(&graph, &sel, &slots);

        assert!(eval.is_complete(StepId::Colors));
        assert!(!eval.can_access(1));
        assert!(!eval.can_access(2));
        assert_eq!(eval.redirect_target(), 0);
    }

    #[test]
    fn test_redirect_to_first_incomplete() {
        let graph = StepGraph::default();
        let mut slots = empty_slots();
        let sel = selection(Some("30x40"), Some("preto"), Some("azul"));

        let eval = CompletionEvaluator::new(&graph, &sel, &slots);
        assert_eq!(eval.redirect_target(), 1);
        assert_eq!(eval.resolve(None), 1);
        assert_eq!(eval.resolve(Some(0)), 0);
        assert_eq!(eval.resolve(Some(9)), 1);

        with_photo(&mut slots, 0, SlotStatus::Completed);
        let eval = CompletionEvaluator::new(&graph, &sel, &slots);
        // everything complete lands on the last step
        assert_eq!(eval.redirect_target(), 1);
    }

    #[test]
    fn test_gated_request_redirects() {
        let graph = StepGraph::default();
        let slots = empty_slots();
        let sel = Selection::default();
        let eval = CompletionEvaluator::new(&graph, &sel, &slots);

        assert_eq!(eval.resolve(Some(1)), 0);
        assert!(!eval.is_complete(StepId::Size));

        let statuses = eval.statuses();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].accessible);
        assert!(!statuses[1].accessible);
    }
}
