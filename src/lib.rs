//! Zira: turn coordinator for a talking chatbot.
//!
//! A user message becomes a *turn* that runs in two gated phases on a bounded
//! worker pool:
//!
//! ```text
//! submit_turn → [thinking gate] ResponseGenerator → [talking gate] SpeechSynthesizer → callback
//! ```
//!
//! # Architecture
//!
//! - **Phase gates**: one turn thinks at a time, one turn talks at a time
//! - **Worker pool**: named OS threads pulling jobs from a `crossbeam` queue
//! - **Notification channel**: the only path from workers to the presentation
//!   consumer, delivered in global enqueue order
//! - **Directives**: "erase chat" / "bye" style phrases handled without the
//!   generator
//! - **Chat view**: consumer-side transcript and status state

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod directive;
pub mod error;
pub mod gate;
pub mod notification;
pub mod pool;
pub mod presenter;
pub mod responder;
pub mod speaker;
pub mod turn;
pub mod voice;
pub mod zira_dirs;

pub use backend::{ResponseGenerator, SpeechSynthesizer};
pub use config::ChatConfig;
pub use coordinator::{SubmitOutcome, TurnCoordinator};
pub use error::{Result, ZiraError};
pub use notification::{Notification, NotificationEnvelope, NotificationReceiver};
pub use presenter::ChatView;
pub use turn::{TurnCallback, TurnId};
pub use voice::{VoiceOptions, VoiceOverride};
