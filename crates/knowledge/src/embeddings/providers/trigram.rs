//! Local hashing embedder: words and character trigrams hashed into a
//! fixed-size vector.
//!
//! Not a semantic model. Texts that share words land close together, which
//! is enough for offline use, demos and deterministic tests.

use crate::embeddings::provider::EmbeddingProvider;
use crate::index::metric::norm;
use ragline_core::AppResult;
use std::collections::{BTreeMap, HashSet};

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them",
];

const WORD_SEED: u64 = 0x5745_4f52_4400_0001;
const TRIGRAM_SEED: u64 = 0x5452_4947_5200_0002;

/// Deterministic bag-of-words plus trigram embedder.
///
/// Each distinct word adds its term frequency to one slot, and each of its
/// boundary-marked trigrams (`^fl`, `fla`, `lag`, `ag$`) adds the square
/// root of it to another. The result is scaled to unit length; text with no
/// usable words maps to the zero vector.
#[derive(Debug)]
pub struct TrigramProvider {
    dimensions: usize,
    stop_words: HashSet<&'static str>,
}

impl TrigramProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    /// Lowercased words longer than two characters, minus stop words.
    ///
    /// Punctuation separates words, so "flag?" and "flag." both yield "flag".
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !self.stop_words.contains(w))
            .map(str::to_string)
            .collect()
    }

    fn slot(&self, seed: u64, feature: &str) -> usize {
        (fnv1a(seed, feature.as_bytes()) % self.dimensions as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        // Ordered so float accumulation, and therefore output, is stable.
        let mut frequencies: BTreeMap<String, u32> = BTreeMap::new();
        for word in self.tokenize(text) {
            *frequencies.entry(word).or_insert(0) += 1;
        }

        for (word, tf) in &frequencies {
            let tf = *tf as f32;
            vector[self.slot(WORD_SEED, word)] += tf;

            let marked: Vec<char> = std::iter::once('^')
                .chain(word.chars())
                .chain(std::iter::once('$'))
                .collect();
            for window in marked.windows(3) {
                let trigram: String = window.iter().collect();
                vector[self.slot(TRIGRAM_SEED, &trigram)] += tf.sqrt();
            }
        }

        let length = norm(&vector);
        if length > 0.0 {
            vector.iter_mut().for_each(|x| *x /= length);
        }
        vector
    }
}

/// 64-bit FNV-1a, offset by `seed` so words and trigrams spread differently.
fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(0xcbf2_9ce4_8422_2325 ^ seed, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }
}
