//! Collaborator capabilities the coordinator is constructed with.
//!
//! Both calls are synchronous and may block for as long as they need; the
//! coordinator always invokes them on a worker thread.

use crate::error::Result;
use crate::voice::VoiceOptions;

/// Produces the assistant's reply to one user input.
pub trait ResponseGenerator: Send + Sync {
    /// Generate a reply.
    ///
    /// # Errors
    ///
    /// Return [`crate::ZiraError::Generation`] on failure; the coordinator
    /// substitutes its fallback message.
    fn generate(&self, input: &str) -> Result<String>;
}

/// Speaks text aloud and returns when playback has finished.
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text` with fully resolved options.
    ///
    /// # Errors
    ///
    /// Return [`crate::ZiraError::Synthesis`] on failure; the turn still
    /// completes and its callback still runs.
    fn speak(&self, text: &str, options: &VoiceOptions) -> Result<()>;
}

/// Adapts a closure into a [`ResponseGenerator`].
pub struct GeneratorFn<F>(pub F);

impl<F> ResponseGenerator for GeneratorFn<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn generate(&self, input: &str) -> Result<String> {
        (self.0)(input)
    }
}

/// Synthesizer that discards everything, for text-only front-ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSynthesizer;

impl SpeechSynthesizer for SilentSynthesizer {
    fn speak(&self, _text: &str, _options: &VoiceOptions) -> Result<()> {
        Ok(())
    }
}
