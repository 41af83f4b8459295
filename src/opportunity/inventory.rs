//! Inventory reservation
//!
//! The available-shares counter is the hottest contended value in the
//! system. These methods are the only code allowed to change it; stores
//! call them on a row they hold locked (or encode the same rule in a single
//! conditional UPDATE), so every change is one read-modify-write.

use chrono::{DateTime, Utc};

use super::models::{Opportunity, OpportunityStatus};
use crate::error::EngineError;

impl Opportunity {
    /// Take `shares` out of inventory.
    ///
    /// Reaching zero flips the opportunity to `Completed` in the same step.
    pub fn reserve_shares(&mut self, shares: i64, now: DateTime<Utc>) -> Result<(), EngineError> {
        if shares <= 0 {
            return Err(EngineError::InvalidShares);
        }
        if shares > self.available_shares {
            return Err(EngineError::InsufficientShares {
                requested: shares,
                available: self.available_shares,
            });
        }

        self.available_shares -= shares;
        if self.available_shares == 0 && self.status == OpportunityStatus::Open {
            self.status = OpportunityStatus::Completed;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Return `shares` from a cancelled investment.
    ///
    /// A sold-out opportunity goes back to `Open` only while its offering
    /// window is still running; otherwise it stays `Completed`.
    pub fn release_shares(&mut self, shares: i64, now: DateTime<Utc>) -> Result<(), EngineError> {
        if shares <= 0 {
            return Err(EngineError::InvalidShares);
        }
        let restored = self.available_shares + shares;
        if restored > self.total_shares {
            return Err(EngineError::InvalidStateTransition(format!(
                "releasing {} shares would exceed total {} (available {})",
                shares, self.total_shares, self.available_shares
            )));
        }

        self.available_shares = restored;
        if self.status == OpportunityStatus::Completed && self.window_contains(now) {
            self.status = OpportunityStatus::Open;
        }
        self.updated_at = now;
        Ok(())
    }
}
