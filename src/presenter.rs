//! Presentation-side chat state.
//!
//! [`ChatView`] is owned by the single consumer task. It changes only through
//! [`ChatView::apply`] (notifications from workers, in delivery order) and
//! [`ChatView::record_user_message`] (the consumer's own input box).

use crate::config::TranscriptConfig;
use crate::notification::{Notification, NotificationEnvelope};
use chrono::{DateTime, Local};

/// What the status indicator shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantStatus {
    Waiting,
    Thinking,
    Speaking,
}

impl AssistantStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Waiting => "Waiting...",
            Self::Thinking => "Thinking...",
            Self::Speaking => "Speaking...",
        }
    }
}

/// Who wrote a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Local>,
}

/// Consumer-visible state after each applied change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewChange {
    Status(AssistantStatus),
    Appended(TranscriptEntry),
    Cleared,
}

/// Transcript, status line and avatar state.
#[derive(Debug, Clone)]
pub struct ChatView {
    config: TranscriptConfig,
    transcript: Vec<TranscriptEntry>,
    thinking: bool,
    talking: bool,
    applied: u64,
}

impl ChatView {
    pub fn new(config: TranscriptConfig) -> Self {
        Self {
            config,
            transcript: Vec::new(),
            thinking: false,
            talking: false,
            applied: 0,
        }
    }

    /// Echo the user's own message into the transcript.
    pub fn record_user_message(&mut self, text: &str) -> ViewChange {
        self.append(Speaker::User, text.to_owned())
    }

    /// Apply one notification.
    pub fn apply(&mut self, envelope: &NotificationEnvelope) -> ViewChange {
        self.applied += 1;
        match &envelope.notification {
            Notification::ThinkingStateChanged { active } => {
                self.thinking = *active;
                ViewChange::Status(self.status())
            }
            Notification::TalkingStateChanged { active } => {
                self.talking = *active;
                ViewChange::Status(self.status())
            }
            Notification::MessageReady { text } => self.append(Speaker::Assistant, text.clone()),
            Notification::HistoryCleared => {
                self.transcript.clear();
                ViewChange::Cleared
            }
        }
    }

    /// Talking takes precedence over thinking.
    pub fn status(&self) -> AssistantStatus {
        if self.talking {
            AssistantStatus::Speaking
        } else if self.thinking {
            AssistantStatus::Thinking
        } else {
            AssistantStatus::Waiting
        }
    }

    /// The avatar plays while any turn is talking.
    pub fn is_avatar_animating(&self) -> bool {
        self.talking
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Notifications applied so far.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Render one entry as `[HH:MM:SS] <Name> text`.
    pub fn format_entry(&self, entry: &TranscriptEntry) -> String {
        let name = match entry.speaker {
            Speaker::User => &self.config.user_name,
            Speaker::Assistant => &self.config.assistant_name,
        };
        if self.config.show_timestamps {
            format!("[{}] <{name}> {}", entry.at.format("%H:%M:%S"), entry.text)
        } else {
            format!("<{name}> {}", entry.text)
        }
    }

    /// The whole transcript, oldest first, one line per entry.
    pub fn render(&self) -> String {
        self.transcript
            .iter()
            .map(|e| self.format_entry(e))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn append(&mut self, speaker: Speaker, text: String) -> ViewChange {
        let entry = TranscriptEntry {
            speaker,
            text,
            at: Local::now(),
        };
        self.transcript.push(entry.clone());
        ViewChange::Appended(entry)
    }
}
