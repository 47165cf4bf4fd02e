//! Offline hashing embedding provider.
//!
//! Words are split on Unicode word boundaries, stop words in Portuguese and
//! English are dropped, and each remaining word adds weight to the buckets of
//! its character trigrams and of the word itself. The result is deterministic
//! and content-dependent, which is enough for development and tests; it has
//! no notion of meaning.

use crate::embeddings::l2_normalize;
use crate::embeddings::provider::EmbeddingProvider;
use regcite_core::AppResult;
use std::collections::{BTreeMap, HashSet};
use unicode_segmentation::UnicodeSegmentation;

const MODEL_NAME: &str = "trigram-v1";

const STOP_WORDS: &[&str] = &[
    // English
    "the", "is", "at", "which", "on", "an", "as", "are", "was", "were", "for", "to", "of", "in",
    "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had", "it",
    "its", "their", "they", "them", "what", "who",
    // Portuguese
    "de", "da", "do", "das", "dos", "em", "no", "na", "nos", "nas", "um", "uma", "os", "as",
    "que", "por", "para", "com", "se", "ao", "aos", "ou", "pelo", "pela", "qual", "quem",
];

/// Trigram-hashing embedding provider.
#[derive(Debug)]
pub struct TrigramProvider {
    dimensions: usize,
    stop_words: HashSet<&'static str>,
}

impl TrigramProvider {
    /// Create a provider producing vectors of `dimensions` entries.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    fn bucket(&self, token: &str, seed: u64) -> usize {
        let hash = token
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(seed).wrapping_add(b as u64));
        (hash % self.dimensions as u64) as usize
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];
        let lower = text.to_lowercase();

        // BTreeMap keeps the accumulation order stable across runs
        let mut frequencies: BTreeMap<&str, u32> = BTreeMap::new();
        for word in lower.unicode_words() {
            if word.chars().count() > 2 && !self.stop_words.contains(word) {
                *frequencies.entry(word).or_insert(0) += 1;
            }
        }

        for (word, freq) in &frequencies {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                embedding[self.bucket(&trigram, 37)] += (*freq as f32).sqrt();
            }

            embedding[self.bucket(word, 31)] += *freq as f32;
        }

        l2_normalize(&mut embedding);
        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
