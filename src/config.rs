//! Configuration types for the chatbot core.

use crate::directive::{DirectiveAction, DirectiveRule};
use crate::error::{Result, ZiraError};
use crate::voice::VoiceOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Process-wide default voice options.
    pub voice: VoiceOptions,
    /// Worker pool sizing.
    pub pool: PoolConfig,
    /// Turn scheduling behaviour.
    pub turns: TurnConfig,
    /// Directive vocabulary.
    pub directives: DirectiveConfig,
    /// Transcript presentation.
    pub transcript: TranscriptConfig,
    /// Built-in scripted responder.
    pub responder: ResponderConfig,
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of concurrent worker threads.
    pub workers: usize,
    /// Maximum queued jobs. `None` means unbounded.
    pub queue_capacity: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_capacity: None,
        }
    }
}

/// How notifications from different turns may interleave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnOrdering {
    /// A later turn may think while an earlier turn talks.
    #[default]
    Pipelined,
    /// Each turn runs start to finish before the next one starts, in
    /// submission order.
    Strict,
}

/// Turn scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub ordering: TurnOrdering,
    /// Message shown and spoken when the response generator fails.
    pub generation_fallback: String,
    /// Message shown after speech synthesis fails. `None` only logs.
    pub synthesis_fallback: Option<String>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            ordering: TurnOrdering::Pipelined,
            generation_fallback: "Sorry, I lost my train of thought.".to_owned(),
            synthesis_fallback: Some("(My voice gave out there. Read it instead.)".to_owned()),
        }
    }
}

/// Directive vocabulary. Rules are checked in order; the first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectiveConfig {
    pub rules: Vec<DirectiveRule>,
    /// Spoken by the termination directive.
    pub farewell: String,
}

impl Default for DirectiveConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                DirectiveRule::new("erase chat", DirectiveAction::ClearHistory),
                DirectiveRule::new("bye", DirectiveAction::Terminate),
            ],
            farewell: "Catch ya later.".to_owned(),
        }
    }
}

/// Transcript labels and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub assistant_name: String,
    pub user_name: String,
    /// Prefix each line with `[HH:MM:SS]`.
    pub show_timestamps: bool,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            assistant_name: "Zira".to_owned(),
            user_name: "You".to_owned(),
            show_timestamps: true,
        }
    }
}

/// Scripted responder settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// TOML corpus of `[[pairs]]`. `None` uses the built-in personality.
    pub corpus_path: Option<PathBuf>,
}

impl ChatConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| ZiraError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ZiraError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (see [`crate::zira_dirs`]).
    pub fn default_config_path() -> PathBuf {
        crate::zira_dirs::config_file()
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ZiraError::Config`] naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        self.voice.validate()?;
        if self.pool.workers == 0 {
            return Err(ZiraError::Config("pool.workers must be at least 1".to_owned()));
        }
        if self.pool.queue_capacity == Some(0) {
            return Err(ZiraError::Config(
                "pool.queue_capacity must be at least 1 when set".to_owned(),
            ));
        }
        if let Some(rule) = self.directives.rules.iter().find(|r| r.phrase.trim().is_empty()) {
            return Err(ZiraError::Config(format!(
                "directive for {:?} has an empty phrase",
                rule.action
            )));
        }
        if self.directives.farewell.trim().is_empty() {
            return Err(ZiraError::Config("directives.farewell must not be empty".to_owned()));
        }
        Ok(())
    }
}
