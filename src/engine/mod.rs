//! Core engine: aggregate → budget → select, sequenced by the orchestrator.

pub mod aggregator;
pub mod budget;
pub mod selector;
pub mod orchestrator;

pub use orchestrator::Settler;
