//! Simulated speech synthesizer for terminal front-ends and tests.

use crate::backend::SpeechSynthesizer;
use crate::error::{Result, ZiraError};
use crate::voice::VoiceOptions;
use std::time::Duration;
use tracing::info;

/// Blocks for as long as reading the text aloud would take at the requested
/// rate, without producing audio.
#[derive(Debug, Clone, Copy)]
pub struct PacedSpeaker {
    time_scale: f32,
}

impl Default for PacedSpeaker {
    fn default() -> Self {
        Self { time_scale: 1.0 }
    }
}

impl PacedSpeaker {
    /// `time_scale` multiplies the estimated duration; `0.0` returns at once.
    ///
    /// # Errors
    ///
    /// Returns [`ZiraError::Config`] if the scale is negative or not finite.
    pub fn new(time_scale: f32) -> Result<Self> {
        if !time_scale.is_finite() || time_scale < 0.0 {
            return Err(ZiraError::Config(format!(
                "speech time scale must be a finite non-negative number, got {time_scale}"
            )));
        }
        Ok(Self { time_scale })
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Estimated playback time of `text` at `rate` words per minute.
    pub fn estimate(text: &str, rate: u32) -> Duration {
        let words = text.split_whitespace().count().max(1) as u64;
        Duration::from_millis(words * 60_000 / u64::from(rate.max(1)))
    }
}

impl SpeechSynthesizer for PacedSpeaker {
    fn speak(&self, text: &str, options: &VoiceOptions) -> Result<()> {
        let estimate = Self::estimate(text, options.rate);
        let duration =
            Duration::try_from_secs_f64(estimate.as_secs_f64() * f64::from(self.time_scale))
                .map_err(|e| ZiraError::Synthesis(format!("speech duration out of range: {e}")))?;
        info!(
            voice = %options.voice_id,
            rate = options.rate,
            volume = options.volume,
            duration_ms = duration.as_millis() as u64,
            "speaking"
        );
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn estimate_scales_with_rate() {
        assert_eq!(PacedSpeaker::estimate("one two three four", 120), Duration::from_secs(2));
        assert_eq!(PacedSpeaker::estimate("one two three four", 240), Duration::from_secs(1));
        assert_eq!(PacedSpeaker::estimate("", 60), Duration::from_secs(1));
    }

    #[test]
    fn zero_scale_returns_immediately() {
        let speaker = PacedSpeaker::new(0.0).unwrap();
        let start = std::time::Instant::now();
        assert!(speaker.speak("a long sentence indeed", &VoiceOptions::default()).is_ok());
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn rejects_negative_and_non_finite_scales() {
        for bad in [-3.0, f32::INFINITY, f32::NEG_INFINITY, f32::NAN] {
            assert!(
                matches!(PacedSpeaker::new(bad), Err(ZiraError::Config(_))),
                "accepted {bad}"
            );
        }
        let speaker = PacedSpeaker::new(0.5).unwrap();
        assert!((speaker.time_scale() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn overflowing_duration_is_a_synthesis_error() {
        let speaker = PacedSpeaker::new(f32::MAX).unwrap();
        let err = speaker.speak("hello", &VoiceOptions::default()).unwrap_err();
        assert!(matches!(err, ZiraError::Synthesis(_)));
    }
}
