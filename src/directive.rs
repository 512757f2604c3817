//! Directive detection: control phrases intercepted before generation.
//!
//! Matching is a case-insensitive substring test against an ordered rule
//! list. The first matching rule wins, and any match bypasses the response
//! generator entirely.
//!
//! | Default phrase | Action |
//! |----------------|--------|
//! | "erase chat" | [`DirectiveAction::ClearHistory`] |
//! | "bye" | [`DirectiveAction::Terminate`] |

use crate::config::DirectiveConfig;
use serde::{Deserialize, Serialize};

/// What the coordinator does when a directive matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveAction {
    /// Emit a history-cleared notification.
    ClearHistory,
    /// Speak the farewell, then end the session.
    Terminate,
}

/// One phrase → action mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveRule {
    pub phrase: String,
    pub action: DirectiveAction,
}

impl DirectiveRule {
    pub fn new(phrase: impl Into<String>, action: DirectiveAction) -> Self {
        Self {
            phrase: phrase.into(),
            action,
        }
    }
}

/// A matched directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    ClearHistory,
    Terminate { farewell: String },
}

/// Compiled vocabulary, phrases pre-lowercased.
#[derive(Debug, Clone)]
pub struct DirectiveSet {
    rules: Vec<(String, DirectiveAction)>,
    farewell: String,
}

impl DirectiveSet {
    pub fn from_config(config: &DirectiveConfig) -> Self {
        let rules = config
            .rules
            .iter()
            .map(|r| r.phrase.trim().to_lowercase())
            .zip(config.rules.iter().map(|r| r.action))
            .filter(|(phrase, _)| !phrase.is_empty())
            .collect();
        Self {
            rules,
            farewell: config.farewell.clone(),
        }
    }

    /// Find the first rule whose phrase occurs in `input`.
    pub fn detect(&self, input: &str) -> Option<Directive> {
        let normalized = input.to_lowercase();
        self.rules
            .iter()
            .find(|(phrase, _)| normalized.contains(phrase.as_str()))
            .map(|(_, action)| match action {
                DirectiveAction::ClearHistory => Directive::ClearHistory,
                DirectiveAction::Terminate => Directive::Terminate {
                    farewell: self.farewell.clone(),
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> DirectiveSet {
        DirectiveSet::from_config(&DirectiveConfig::default())
    }

    #[test]
    fn clear_matches_case_insensitive_substring() {
        assert_eq!(defaults().detect("Please ERASE Chat now"), Some(Directive::ClearHistory));
    }

    #[test]
    fn bye_inside_sentence_terminates() {
        assert_eq!(
            defaults().detect("ok bye now"),
            Some(Directive::Terminate {
                farewell: "Catch ya later.".to_owned()
            })
        );
    }

    #[test]
    fn plain_message_is_not_a_directive() {
        assert_eq!(defaults().detect("how are you?"), None);
    }

    #[test]
    fn earlier_rule_wins_on_overlap() {
        assert_eq!(defaults().detect("erase chat and bye"), Some(Directive::ClearHistory));

        let config = DirectiveConfig {
            rules: vec![
                DirectiveRule::new("BYE", DirectiveAction::Terminate),
                DirectiveRule::new("erase chat", DirectiveAction::ClearHistory),
            ],
            farewell: "Later.".to_owned(),
        };
        assert_eq!(
            DirectiveSet::from_config(&config).detect("erase chat and bye"),
            Some(Directive::Terminate {
                farewell: "Later.".to_owned()
            })
        );
    }

    #[test]
    fn blank_phrases_are_ignored() {
        let config = DirectiveConfig {
            rules: vec![DirectiveRule::new("  ", DirectiveAction::ClearHistory)],
            farewell: "x".to_owned(),
        };
        assert_eq!(DirectiveSet::from_config(&config).detect("anything"), None);
    }
}
