//! Investment pre-conditions
//!
//! Pure checks with no side effects. The creator runs them on the locked
//! opportunity row, so the bounds it sees are the ones the reservation
//! will be applied against.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::models::InvestmentType;
use crate::error::EngineError;
use crate::opportunity::{Opportunity, OpportunityStatus};
use crate::wallet::holder::InvestorProfile;
use crate::wallet::models::Wallet;

/// Share count bounds derived from the opportunity's amount limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareBounds {
    pub min: i64,
    pub max: i64,
}

impl ShareBounds {
    /// `min = ceil(min_amount / price)` (at least 1) and
    /// `max = floor(max_amount / price)`, both clamped to the shares still
    /// available, so the maximum shrinks as inventory depletes.
    pub fn for_opportunity(opportunity: &Opportunity) -> Option<Self> {
        let price = opportunity.share_price;
        if price <= Decimal::ZERO {
            return None;
        }
        let available = opportunity.available_shares;

        let min = opportunity
            .min_investment_amount
            .checked_div(price)?
            .ceil()
            .to_i64()?
            .max(1);
        let max = match opportunity.max_investment_amount {
            Some(max_amount) => max_amount.checked_div(price)?.floor().to_i64()?,
            None => available,
        };

        Some(Self {
            min: min.min(available),
            max: max.min(available),
        })
    }
}

pub struct InvestmentValidator;

impl InvestmentValidator {
    /// Check, in order: opportunity investable, investor is not the owner,
    /// investor active, wallet reachable (unless funds come from the
    /// gateway), share bounds, investment type allowed.
    pub fn validate(
        investor: &InvestorProfile,
        opportunity: &Opportunity,
        wallet: Option<&Wallet>,
        shares: i64,
        investment_type: InvestmentType,
        skip_wallet_check: bool,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        // Sold out: losers of a race see the share shortage, not a closed round
        if opportunity.status == OpportunityStatus::Completed && opportunity.available_shares == 0
        {
            return Err(EngineError::InsufficientShares {
                requested: shares,
                available: 0,
            });
        }
        if !opportunity.is_investable(now) {
            return Err(EngineError::OpportunityNotOpen);
        }

        if investor.user_id == opportunity.owner_user_id {
            return Err(EngineError::SelfInvestmentForbidden);
        }
        if !investor.is_active {
            return Err(EngineError::InvestorInactive);
        }
        if !skip_wallet_check && wallet.is_none_or(|w| w.holder_id != investor.id) {
            return Err(EngineError::WalletUnavailable);
        }

        if shares <= 0 {
            return Err(EngineError::InvalidShares);
        }
        if shares > opportunity.available_shares {
            return Err(EngineError::InsufficientShares {
                requested: shares,
                available: opportunity.available_shares,
            });
        }
        let bounds = ShareBounds::for_opportunity(opportunity).ok_or(EngineError::OpportunityNotOpen)?;
        if shares > bounds.max {
            return Err(EngineError::SharesAboveMaximum { max: bounds.max });
        }
        if shares < bounds.min {
            return Err(EngineError::SharesBelowMinimum { min: bounds.min });
        }

        if !opportunity.allows(investment_type) {
            return Err(EngineError::InvestmentTypeNotAllowed);
        }
        Ok(())
    }
}
