//! Answer types returned at the front-end boundary.

use crate::citation::Citation;
use crate::validator::FlaggedCitation;
use serde::Serialize;

/// How an answer came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Generated from at least one retrieved section
    Answered,
    /// No section cleared the similarity threshold
    NoRelevantSection,
}

/// A retrieved section id and its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedScore {
    pub document: String,
    pub section_id: String,
    pub score: f32,
}

/// Validated answer to one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Answer text after citation validation
    pub text: String,

    /// Citations that were offered to the model
    pub citations: Vec<Citation>,

    /// Labels the answer actually cites, verified against `citations`
    pub verified: Vec<String>,

    /// Citations in the answer that name no retrieved section
    pub flagged: Vec<FlaggedCitation>,

    pub outcome: AnswerOutcome,

    pub retrieved: Vec<RetrievedScore>,

    /// Generation calls made (0 when no generation was needed)
    pub attempts: u32,
}

impl Answer {
    /// Canned answer when nothing relevant was retrieved and context is
    /// required.
    pub fn no_relevant_section(question: &str) -> Self {
        Self {
            text: format!(
                "No section of the regulation was found relevant to \"{}\".",
                question.trim()
            ),
            citations: Vec::new(),
            verified: Vec::new(),
            flagged: Vec::new(),
            outcome: AnswerOutcome::NoRelevantSection,
            retrieved: Vec::new(),
            attempts: 0,
        }
    }

    /// Whether every citation in the text was verified.
    pub fn is_fully_cited(&self) -> bool {
        self.flagged.is_empty()
    }
}
