//! Funnel steps and their gating

pub mod completion;
pub mod graph;

pub use completion::{rule_satisfied, CompletionEvaluator, StepStatus};
pub use graph::{CompletionRule, Step, StepGraph, StepId, StepLayout};
