//! Per-turn state machine.
//!
//! ```text
//!   Pending → Thinking → Talking → Done
//!      │                   ▲
//!      └───────────────────┘   (message turns skip the thinking phase)
//! ```
//!
//! The callback is stored on the turn and only released by the transition
//! into [`TurnState::Done`], so it cannot run before the talking phase ends.

use crate::voice::VoiceOverride;
use std::fmt;
use tracing::debug;

/// Follow-up action run once after a turn's talking phase.
pub type TurnCallback = Box<dyn FnOnce() + Send + 'static>;

/// Ephemeral identifier used to attribute notifications and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TurnId(u64);

impl TurnId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn-{}", self.0)
    }
}

/// Lifecycle position of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Accepted, waiting for a worker slot.
    Pending,
    /// Holding (or waiting for) the thinking gate.
    Thinking,
    /// Holding (or waiting for) the talking gate.
    Talking,
    /// Talking gate released; callback has been taken.
    Done,
}

impl TurnState {
    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Thinking)
                | (Self::Pending, Self::Talking)
                | (Self::Thinking, Self::Talking)
                | (Self::Talking, Self::Done)
        )
    }
}

/// One request/response/speech cycle.
pub struct Turn {
    id: TurnId,
    input: String,
    voice: Option<VoiceOverride>,
    callback: Option<TurnCallback>,
    state: TurnState,
}

impl fmt::Debug for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Turn")
            .field("id", &self.id)
            .field("input", &self.input)
            .field("voice", &self.voice)
            .field("has_callback", &self.callback.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl Turn {
    pub fn new(
        id: TurnId,
        input: String,
        callback: Option<TurnCallback>,
        voice: Option<VoiceOverride>,
    ) -> Self {
        Self {
            id,
            input,
            voice,
            callback,
            state: TurnState::Pending,
        }
    }

    pub fn id(&self) -> TurnId {
        self.id
    }

    /// Text fed to the generator (or spoken directly for message turns).
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn voice(&self) -> Option<&VoiceOverride> {
        self.voice.as_ref()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Move to `next`. Illegal transitions are ignored and return `false`.
    pub fn advance(&mut self, next: TurnState) -> bool {
        if !self.state.can_advance_to(next) {
            debug!(turn = %self.id, from = ?self.state, to = ?next, "ignored illegal turn transition");
            return false;
        }
        debug!(turn = %self.id, from = ?self.state, to = ?next, "turn transition");
        self.state = next;
        true
    }

    /// Transition into `Done` and hand back the callback, if any.
    ///
    /// Returns `None` when the turn is not in `Talking` or the callback was
    /// already taken.
    pub fn complete(&mut self) -> Option<TurnCallback> {
        if self.advance(TurnState::Done) {
            self.callback.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_turn(counter: &Arc<AtomicUsize>) -> Turn {
        let c = Arc::clone(counter);
        Turn::new(
            TurnId::from_raw(3),
            "hello".to_owned(),
            Some(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })),
            None,
        )
    }

    #[test]
    fn full_lifecycle_releases_callback_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut turn = counting_turn(&counter);
        assert_eq!(turn.state(), TurnState::Pending);
        assert!(turn.advance(TurnState::Thinking));
        assert!(turn.advance(TurnState::Talking));

        let cb = turn.complete().expect("callback on done");
        cb();
        assert_eq!(turn.state(), TurnState::Done);
        assert!(turn.complete().is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_is_unreachable_before_talking() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut turn = counting_turn(&counter);
        assert!(turn.complete().is_none());
        turn.advance(TurnState::Thinking);
        assert!(turn.complete().is_none());
        assert_eq!(turn.state(), TurnState::Thinking);
    }

    #[test]
    fn message_turn_may_skip_thinking() {
        let mut turn = Turn::new(TurnId::from_raw(1), "bye".to_owned(), None, None);
        assert!(turn.advance(TurnState::Talking));
        assert!(turn.complete().is_none());
        assert_eq!(turn.state(), TurnState::Done);
    }

    #[test]
    fn backwards_transitions_are_rejected() {
        let mut turn = Turn::new(TurnId::from_raw(1), "x".to_owned(), None, None);
        turn.advance(TurnState::Thinking);
        turn.advance(TurnState::Talking);
        assert!(!turn.advance(TurnState::Thinking));
        assert!(!turn.advance(TurnState::Pending));
        assert_eq!(turn.state(), TurnState::Talking);
    }

    #[test]
    fn turn_id_display() {
        assert_eq!(TurnId::from_raw(42).to_string(), "turn-42");
        assert_eq!(TurnId::from_raw(42).as_u64(), 42);
    }
}
