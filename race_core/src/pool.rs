//! Pari-mutuel pool arithmetic for the live round.
//!
//! Settlement is server-authoritative: each settled [`Wager`] carries its own
//! `payout`. [`PoolSummary::estimated_payout`] is a preview only and divides
//! the distributable pool by the wagers on *every* car, so it is not what a
//! winning ticket will actually receive.

use race_proto::{Wager, WagerCounts};

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolSummary {
    pub total_wagers: u64,
    pub total_pot: u64,
    pub platform_fee: u64,
    pub distributable_pool: u64,
}

impl PoolSummary {
    pub fn from_counts(counts: &WagerCounts, config: &EngineConfig) -> Self {
        let total_wagers: u64 = counts.values().map(|&count| u64::from(count)).sum();
        let total_pot = total_wagers.saturating_mul(config.stake_unit);
        let platform_fee = total_pot.saturating_mul(config.fee_basis_points()) / 10_000;
        Self {
            total_wagers,
            total_pot,
            platform_fee,
            distributable_pool: total_pot - platform_fee,
        }
    }

    /// Illustrative payout for a player holding `user_wagers` stakes:
    /// `floor(distributable / total_wagers) * user_wagers`. `None` while the
    /// pool is empty.
    pub fn estimated_payout(&self, user_wagers: u32) -> Option<PayoutEstimate> {
        if self.total_wagers == 0 {
            return None;
        }
        let per_wager = self.distributable_pool / self.total_wagers;
        Some(PayoutEstimate {
            amount: per_wager.saturating_mul(u64::from(user_wagers)),
        })
    }
}

/// A labelled, non-binding payout preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutEstimate {
    pub amount: u64,
}

impl PayoutEstimate {
    pub const LABEL: &'static str = "estimate";
}

/// Total staked and paid out across a player's settled wagers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Settlement {
    pub staked: u64,
    pub paid: u64,
}

impl Settlement {
    pub fn from_wagers(wagers: &[Wager]) -> Self {
        wagers.iter().fold(Settlement::default(), |acc, wager| Settlement {
            staked: acc.staked + wager.amount,
            paid: acc.paid + wager.payout.unwrap_or(0),
        })
    }

    pub fn net(&self) -> i64 {
        self.paid as i64 - self.staked as i64
    }
}
