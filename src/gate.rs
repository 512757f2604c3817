//! Phase gates: one holder at a time per conversation phase.
//!
//! Two independent [`PhaseGate`]s guard the thinking phase (response
//! generation) and the talking phase (speech playback). A turn holds at most
//! one of them at a time. Release happens in [`PhaseGuard`]'s `Drop`, so it
//! also happens when a collaborator panics and the stack unwinds.
//!
//! [`TurnSequencer`] is the optional global ordering token: tickets are issued
//! in submission order and a ticket holder only proceeds once every earlier
//! ticket has finished.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Instant;
use tracing::debug;

/// A named mutual-exclusion gate.
#[derive(Debug)]
pub struct PhaseGate {
    name: &'static str,
    lock: Mutex<()>,
    acquisitions: AtomicU64,
}

impl PhaseGate {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Mutex::new(()),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Block until the gate is free, then hold it until the guard drops.
    ///
    /// A gate poisoned by a panicking holder is still usable: the guard
    /// protects no data, only exclusivity.
    pub fn acquire(&self) -> PhaseGuard<'_> {
        let waited_from = Instant::now();
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        debug!(
            gate = self.name,
            waited_ms = waited_from.elapsed().as_millis() as u64,
            "gate acquired"
        );
        PhaseGuard {
            name: self.name,
            _guard: guard,
        }
    }

    /// Whether some turn currently holds the gate.
    pub fn is_held(&self) -> bool {
        match self.lock.try_lock() {
            Ok(_) => false,
            Err(TryLockError::Poisoned(_)) => false,
            Err(TryLockError::WouldBlock) => true,
        }
    }

    /// Total number of successful acquisitions.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }
}

/// Proof of holding a [`PhaseGate`].
pub struct PhaseGuard<'a> {
    name: &'static str,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        debug!(gate = self.name, "gate released");
    }
}

/// The gate pair shared by every turn.
#[derive(Debug)]
pub struct PhaseGates {
    pub thinking: PhaseGate,
    pub talking: PhaseGate,
}

impl Default for PhaseGates {
    fn default() -> Self {
        Self {
            thinking: PhaseGate::new("thinking"),
            talking: PhaseGate::new("talking"),
        }
    }
}

/// Position in the strict ordering queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// FIFO ticket lock for strict turn-by-turn ordering.
#[derive(Debug, Default)]
pub struct TurnSequencer {
    issued: Mutex<u64>,
    serving: Mutex<u64>,
    advanced: Condvar,
}

impl TurnSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next ticket to `commit` and keep it only if `commit` succeeds.
    ///
    /// The issue lock is held across `commit`, so tickets reach the worker
    /// queue in ticket order and a failed submission leaves no gap.
    pub fn issue_with<T, E>(
        &self,
        commit: impl FnOnce(Ticket) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        let ticket = Ticket(*issued);
        let out = commit(ticket)?;
        *issued += 1;
        Ok(out)
    }

    /// Block until every earlier ticket has been released.
    pub fn wait_for(&self, ticket: Ticket) -> SequenceGuard<'_> {
        let mut serving = self.serving.lock().unwrap_or_else(PoisonError::into_inner);
        while *serving < ticket.0 {
            serving = self
                .advanced
                .wait(serving)
                .unwrap_or_else(PoisonError::into_inner);
        }
        debug!(ticket = ticket.0, "sequence slot acquired");
        SequenceGuard {
            sequencer: self,
            ticket,
        }
    }
}

/// Holding the current sequence slot; dropping it admits the next ticket.
pub struct SequenceGuard<'a> {
    sequencer: &'a TurnSequencer,
    ticket: Ticket,
}

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        let mut serving = self
            .sequencer
            .serving
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *serving = self.ticket.0 + 1;
        self.sequencer.advanced.notify_all();
        debug!(ticket = self.ticket.0, "sequence slot released");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn gate_admits_one_holder() {
        let gate = Arc::new(PhaseGate::new("test"));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                std::thread::spawn(move || {
                    let _g = gate.acquire();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(gate.acquisitions(), 6);
        assert!(!gate.is_held());
    }

    #[test]
    fn gate_is_released_when_holder_panics() {
        let gate = Arc::new(PhaseGate::new("panicky"));
        let g2 = Arc::clone(&gate);
        let result = std::thread::spawn(move || {
            let _g = g2.acquire();
            panic!("collaborator blew up");
        })
        .join();
        assert!(result.is_err());
        assert!(!gate.is_held());
        let _again = gate.acquire();
        assert!(gate.is_held());
    }

    #[test]
    fn sequencer_serves_tickets_in_issue_order() {
        let seq = Arc::new(TurnSequencer::new());
        let tickets: Vec<Ticket> = (0..4)
            .map(|_| seq.issue_with(|t| Ok::<_, ()>(t)).unwrap())
            .collect();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Start the threads in reverse so arrival order fights ticket order.
        let handles: Vec<_> = tickets
            .iter()
            .rev()
            .map(|&ticket| {
                let seq = Arc::clone(&seq);
                let order = Arc::clone(&order);
                std::thread::spawn(move || {
                    let _slot = seq.wait_for(ticket);
                    order.lock().unwrap().push(ticket);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), tickets);
    }

    #[test]
    fn failed_commit_does_not_consume_ticket() {
        let seq = TurnSequencer::new();
        let err: Result<Ticket, &str> = seq.issue_with(|_| Err("rejected"));
        assert!(err.is_err());
        let next = seq.issue_with(|t| Ok::<_, ()>(t)).unwrap();
        assert_eq!(next, Ticket(0));
        // Ticket 0 is immediately servable; must not block.
        let _slot = seq.wait_for(next);
    }
}
