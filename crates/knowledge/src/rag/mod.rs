//! Question answering over indexed regulations.
//!
//! Retrieves relevant sections, composes a citation-constrained request,
//! generates an answer and validates its citations.

pub mod pipeline;
pub mod types;

pub use pipeline::{AnswerOptions, Assistant};
pub use types::{Answer, AnswerOutcome, RetrievedScore};
