//! Phase-scoped one-shot timers.
//!
//! The controller never sleeps itself: it asks the runtime to arm a timer and
//! later receives the [`TimerToken`] back as an input. Every arm bumps an
//! epoch, so a firing that raced a cancel or re-arm no longer matches and is
//! discarded by [`TimerSet::accept`].

use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// One-second tick of the predictions countdown.
    CountdownTick,
    /// One-second tick of the locked-phase bridge countdown.
    LockedTick,
    /// Re-fetch after the local predictions countdown ran out.
    CountdownRecheck,
    RevealAdvance,
    /// Poll while no round is live.
    IdlePoll,
    /// Retry after a failed round load.
    RetryLoad,
    /// Retry after a failed wager list load.
    RetryWagers,
    CountsPoll,
    /// No progress seen for too long during the race.
    RaceStall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Arm { token: TimerToken, after: Duration },
    Cancel(TimerKind),
}

#[derive(Debug, Default, Clone)]
pub struct TimerSet {
    next_epoch: u64,
    armed: BTreeMap<TimerKind, u64>,
}

impl TimerSet {
    /// Arm `kind`, replacing any pending timer of the same kind.
    pub fn arm(&mut self, kind: TimerKind, after: Duration) -> TimerCommand {
        self.next_epoch += 1;
        self.armed.insert(kind, self.next_epoch);
        TimerCommand::Arm {
            token: TimerToken {
                kind,
                epoch: self.next_epoch,
            },
            after,
        }
    }

    pub fn cancel(&mut self, kind: TimerKind) -> Option<TimerCommand> {
        self.armed
            .remove(&kind)
            .map(|_| TimerCommand::Cancel(kind))
    }

    pub fn cancel_all(&mut self) -> Vec<TimerCommand> {
        let kinds: Vec<TimerKind> = self.armed.keys().copied().collect();
        self.armed.clear();
        kinds.into_iter().map(TimerCommand::Cancel).collect()
    }

    /// Consume a firing. Returns false for tokens that were cancelled or superseded.
    pub fn accept(&mut self, token: TimerToken) -> bool {
        match self.armed.get(&token.kind) {
            Some(&epoch) if epoch == token.epoch => {
                self.armed.remove(&token.kind);
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    pub fn armed(&self) -> impl Iterator<Item = TimerKind> + '_ {
        self.armed.keys().copied()
    }
}
