//! Scripted response generator.
//!
//! Replies with the line that follows the corpus prompt most similar to the
//! input (character-level similarity from [`similar`]). Good enough for a
//! grumpy demo persona and fully deterministic for tests.

use crate::backend::ResponseGenerator;
use crate::error::{Result, ZiraError};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::path::Path;
use tracing::debug;

const MIN_SIMILARITY: f32 = 0.35;

/// One prompt/reply pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusPair {
    pub prompt: String,
    pub reply: String,
}

#[derive(Debug, Deserialize)]
struct CorpusFile {
    #[serde(default)]
    fallback: Option<String>,
    pairs: Vec<CorpusPair>,
}

/// Built-in conversation. Each line answers the one before it.
const PERSONALITY: &[&str] = &[
    "Hello!",
    "Ugh...",
    "What's up?",
    "Hopefully, you going away...",
    "How are you?",
    "I WAS fine.",
    "What's wrong?",
    "You started talking.",
    "What is your name?",
    "Zira...now go away.",
    "Have you heard the news?",
    "I don't care about the news.",
    "What is your favorite thing?",
    "Not being bothered.",
    "What is your favorite book?",
    "It's called 'Leave Me Alone'. You should try it some time.",
    "Tell me about yourself.",
    "I hate being bothered...leave me alone.",
    "What annoys you the most?",
    "You.",
];

/// Corpus-backed [`ResponseGenerator`].
#[derive(Debug, Clone)]
pub struct ScriptedResponder {
    pairs: Vec<CorpusPair>,
    fallback: String,
}

impl Default for ScriptedResponder {
    fn default() -> Self {
        Self::from_dialogue(PERSONALITY)
    }
}

impl ScriptedResponder {
    pub fn new(pairs: Vec<CorpusPair>, fallback: impl Into<String>) -> Self {
        Self {
            pairs,
            fallback: fallback.into(),
        }
    }

    /// Build pairs from consecutive lines: line `n + 1` answers line `n`.
    pub fn from_dialogue(lines: &[&str]) -> Self {
        let pairs = lines
            .windows(2)
            .map(|w| CorpusPair {
                prompt: w[0].to_owned(),
                reply: w[1].to_owned(),
            })
            .collect();
        Self::new(pairs, "Whatever.")
    }

    /// Load a TOML corpus with `[[pairs]]` tables and an optional `fallback`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or has no pairs.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: CorpusFile =
            toml::from_str(&content).map_err(|e| ZiraError::Config(e.to_string()))?;
        if file.pairs.is_empty() {
            return Err(ZiraError::Config(format!(
                "corpus {} contains no pairs",
                path.display()
            )));
        }
        Ok(Self::new(
            file.pairs,
            file.fallback.unwrap_or_else(|| "Whatever.".to_owned()),
        ))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn best_match(&self, input: &str) -> Option<(&CorpusPair, f32)> {
        let needle = input.trim().to_lowercase();
        self.pairs
            .iter()
            .map(|pair| {
                let prompt = pair.prompt.to_lowercase();
                (pair, TextDiff::from_chars(needle.as_str(), prompt.as_str()).ratio())
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

impl ResponseGenerator for ScriptedResponder {
    fn generate(&self, input: &str) -> Result<String> {
        match self.best_match(input) {
            Some((pair, score)) if score >= MIN_SIMILARITY => {
                debug!(prompt = %pair.prompt, score, "corpus match");
                Ok(pair.reply.clone())
            }
            _ => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn exact_prompt_gets_its_reply() {
        let r = ScriptedResponder::default();
        assert_eq!(r.generate("What is your name?").unwrap(), "Zira...now go away.");
    }

    #[test]
    fn near_miss_still_matches() {
        let r = ScriptedResponder::default();
        assert_eq!(r.generate("how are you").unwrap(), "I WAS fine.");
    }

    #[test]
    fn unrelated_input_falls_back() {
        let r = ScriptedResponder::new(
            vec![CorpusPair {
                prompt: "Hello!".to_owned(),
                reply: "Ugh...".to_owned(),
            }],
            "Whatever.",
        );
        assert_eq!(r.generate("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").unwrap(), "Whatever.");
    }

    #[test]
    fn dialogue_builds_consecutive_pairs() {
        let r = ScriptedResponder::from_dialogue(&["a", "b", "c"]);
        assert_eq!(r.len(), 2);
        assert!(!r.is_empty());
        assert!(ScriptedResponder::from_dialogue(&["only"]).is_empty());
    }

    #[test]
    fn loads_corpus_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("corpus.toml");
        std::fs::write(
            &path,
            "fallback = \"Meh.\"\n\n[[pairs]]\nprompt = \"ping\"\nreply = \"pong\"\n",
        )
        .unwrap();
        let r = ScriptedResponder::from_file(&path).unwrap();
        assert_eq!(r.generate("ping").unwrap(), "pong");
        assert_eq!(r.generate("qqqqqqqqqqqqqqqqqqqqqqq").unwrap(), "Meh.");
    }

    #[test]
    fn empty_corpus_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("corpus.toml");
        std::fs::write(&path, "pairs = []\n").unwrap();
        assert!(ScriptedResponder::from_file(&path).is_err());
    }
}
