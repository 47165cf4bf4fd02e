//! Scenario tests spanning several components.

mod answer_pipeline;
mod deadlines;
mod support;
