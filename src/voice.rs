//! Speech synthesis options.
//!
//! [`VoiceOptions`] is a complete, validated bundle. [`VoiceOverride`] is the
//! per-turn partial form: any field left unset falls back to the coordinator's
//! default snapshot when the turn reaches its talking phase.

use crate::error::{Result, ZiraError};
use serde::{Deserialize, Serialize};

/// Default speech rate in words per minute.
pub const DEFAULT_RATE: u32 = 100;
/// Default output volume.
pub const DEFAULT_VOLUME: f32 = 0.8;
/// Default voice identity (the SAPI Zira token on Windows).
pub const DEFAULT_VOICE_ID: &str =
    r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\Speech\Voices\Tokens\TTS_MS_EN-US_ZIRA_11.0";

/// Complete options handed to the speech synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceOptions {
    /// Speech rate in words per minute.
    pub rate: u32,
    /// Output volume in `[0, 1]`.
    pub volume: f32,
    /// Platform-specific voice identity.
    pub voice_id: String,
}

impl Default for VoiceOptions {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            volume: DEFAULT_VOLUME,
            voice_id: DEFAULT_VOICE_ID.to_owned(),
        }
    }
}

impl VoiceOptions {
    /// Build a validated option bundle.
    ///
    /// # Errors
    ///
    /// Returns [`ZiraError::Config`] if any field is out of range.
    pub fn new(rate: u32, volume: f32, voice_id: impl Into<String>) -> Result<Self> {
        let options = Self {
            rate,
            volume,
            voice_id: voice_id.into(),
        };
        options.validate()?;
        Ok(options)
    }

    /// Check field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ZiraError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.rate == 0 {
            return Err(ZiraError::Config("voice rate must be positive".to_owned()));
        }
        validate_volume(self.volume)?;
        if self.voice_id.trim().is_empty() {
            return Err(ZiraError::Config("voice id must not be empty".to_owned()));
        }
        Ok(())
    }
}

fn validate_volume(volume: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&volume) {
        return Err(ZiraError::Config(format!(
            "voice volume {volume} is outside [0, 1]"
        )));
    }
    Ok(())
}

/// Per-turn partial voice options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceOverride {
    pub rate: Option<u32>,
    pub volume: Option<f32>,
    pub voice_id: Option<String>,
}

impl VoiceOverride {
    /// Override the speech rate.
    #[must_use]
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Override the volume.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Override the voice identity.
    #[must_use]
    pub fn with_voice_id(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    /// Returns `true` when no field is overridden.
    pub fn is_empty(&self) -> bool {
        self.rate.is_none() && self.volume.is_none() && self.voice_id.is_none()
    }

    /// Check the fields that are set.
    ///
    /// # Errors
    ///
    /// Returns [`ZiraError::Config`] for an out-of-range field.
    pub fn validate(&self) -> Result<()> {
        if self.rate == Some(0) {
            return Err(ZiraError::Config("voice rate must be positive".to_owned()));
        }
        if let Some(volume) = self.volume {
            validate_volume(volume)?;
        }
        if self.voice_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(ZiraError::Config("voice id must not be empty".to_owned()));
        }
        Ok(())
    }

    /// Merge this override over `defaults`, field by field.
    ///
    /// `defaults` is only read; the result is a fresh copy.
    #[must_use]
    pub fn resolve(&self, defaults: &VoiceOptions) -> VoiceOptions {
        VoiceOptions {
            rate: self.rate.unwrap_or(defaults.rate),
            volume: self.volume.unwrap_or(defaults.volume),
            voice_id: self
                .voice_id
                .clone()
                .unwrap_or_else(|| defaults.voice_id.clone()),
        }
    }
}

/// Resolve an optional override against the default snapshot.
#[must_use]
pub fn resolve_voice(overrides: Option<&VoiceOverride>, defaults: &VoiceOptions) -> VoiceOptions {
    match overrides {
        Some(o) => o.resolve(defaults),
        None => defaults.clone(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn defaults() -> VoiceOptions {
        VoiceOptions::new(100, 0.8, "v1").unwrap()
    }

    #[test]
    fn rate_override_keeps_other_defaults() {
        let resolved = VoiceOverride::default().with_rate(150).resolve(&defaults());
        assert_eq!(resolved, VoiceOptions::new(150, 0.8, "v1").unwrap());
    }

    #[test]
    fn full_override_wins_everywhere() {
        let resolved = VoiceOverride::default()
            .with_rate(180)
            .with_volume(0.3)
            .with_voice_id("v2")
            .resolve(&defaults());
        assert_eq!(resolved.rate, 180);
        assert!((resolved.volume - 0.3).abs() < f32::EPSILON);
        assert_eq!(resolved.voice_id, "v2");
    }

    #[test]
    fn resolution_never_mutates_defaults() {
        let base = defaults();
        let _ = VoiceOverride::default().with_voice_id("other").resolve(&base);
        assert_eq!(base.voice_id, "v1");
    }

    #[test]
    fn missing_override_returns_defaults() {
        assert_eq!(resolve_voice(None, &defaults()), defaults());
    }

    #[test]
    fn volume_out_of_range_is_rejected() {
        assert!(VoiceOptions::new(100, 1.5, "v1").is_err());
        assert!(VoiceOptions::new(100, -0.1, "v1").is_err());
        assert!(VoiceOverride::default().with_volume(2.0).validate().is_err());
    }

    #[test]
    fn zero_rate_and_blank_voice_are_rejected() {
        assert!(VoiceOptions::new(0, 0.5, "v1").is_err());
        assert!(VoiceOptions::new(100, 0.5, "  ").is_err());
        assert!(VoiceOverride::default().with_rate(0).validate().is_err());
    }

    #[test]
    fn default_matches_documented_values() {
        let d = VoiceOptions::default();
        assert_eq!(d.rate, DEFAULT_RATE);
        assert!((d.volume - DEFAULT_VOLUME).abs() < f32::EPSILON);
        assert_eq!(d.voice_id, DEFAULT_VOICE_ID);
        assert!(d.validate().is_ok());
        assert!(VoiceOverride::default().is_empty());
    }
}
