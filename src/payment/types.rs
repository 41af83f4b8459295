//! Payment intention types
//!
//! A `PaymentIntention` is the local mirror of a gateway-side payment
//! request. Webhooks are reconciled against it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{IntentionId, InvestmentId, OpportunityId, ProfileId, UserId};
use crate::error::EngineError;
use crate::investment::models::InvestmentType;

/// What a completed payment pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionType {
    Investment,
    WalletCharge,
}

impl IntentionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentionType::Investment => "investment",
            IntentionType::WalletCharge => "wallet_charge",
        }
    }
}

impl fmt::Display for IntentionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "investment" => Ok(IntentionType::Investment),
            "wallet_charge" => Ok(IntentionType::WalletCharge),
            _ => Err(format!("Invalid intention type: {}", s)),
        }
    }
}

/// Intention FSM
///
/// ```text
/// CREATED → ACTIVE → COMPLETED
///     │        ├───→ FAILED
///     └────────┴───→ EXPIRED
/// ```
///
/// `Completed` is absorbing. A verified success completes any other state,
/// since the gateway has already captured the funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionStatus {
    Created,
    Active,
    Completed,
    Failed,
    Expired,
}

impl IntentionStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentionStatus::Completed | IntentionStatus::Failed | IntentionStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentionStatus::Created => "created",
            IntentionStatus::Active => "active",
            IntentionStatus::Completed => "completed",
            IntentionStatus::Failed => "failed",
            IntentionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for IntentionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(IntentionStatus::Created),
            "active" => Ok(IntentionStatus::Active),
            "completed" => Ok(IntentionStatus::Completed),
            "failed" => Ok(IntentionStatus::Failed),
            "expired" => Ok(IntentionStatus::Expired),
            _ => Err(format!("Invalid intention status: {}", s)),
        }
    }
}

/// Domain context captured at creation time. The gateway does not reliably
/// echo it back, so the reconciler reads it from here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentionExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<OpportunityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_type: Option<InvestmentType>,
}

/// Validated investment extras
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvestmentExtras {
    pub opportunity_id: OpportunityId,
    pub shares: i64,
    pub investment_type: InvestmentType,
}

impl IntentionExtras {
    pub fn investment(
        opportunity_id: OpportunityId,
        shares: i64,
        investment_type: InvestmentType,
    ) -> Self {
        Self {
            opportunity_id: Some(opportunity_id),
            shares: Some(shares),
            investment_type: Some(investment_type),
        }
    }

    pub fn require_investment(&self) -> Result<InvestmentExtras, EngineError> {
        let opportunity_id = self
            .opportunity_id
            .ok_or_else(|| EngineError::MissingExtras("opportunity_id".to_string()))?;
        let shares = self
            .shares
            .ok_or_else(|| EngineError::MissingExtras("shares".to_string()))?;
        let investment_type = self
            .investment_type
            .ok_or_else(|| EngineError::MissingExtras("investment_type".to_string()))?;
        Ok(InvestmentExtras {
            opportunity_id,
            shares,
            investment_type,
        })
    }
}

/// Local mirror of a gateway payment intention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntention {
    pub id: IntentionId,
    pub user_id: UserId,
    pub profile_id: ProfileId,
    pub intention_type: IntentionType,
    pub amount: Decimal,
    pub currency: String,
    pub status: IntentionStatus,

    /// Gateway's own intention id
    pub gateway_intention_id: String,
    /// Gateway order id, echoed in transaction callbacks as `order.id`
    pub gateway_order_id: Option<i64>,
    pub client_secret: String,
    pub extras: IntentionExtras,

    /// Deferred effect applied. Flips false -> true at most once.
    pub is_executed: bool,
    pub execution_attempts: i32,
    pub last_error: Option<String>,
    pub gateway_transaction_id: Option<String>,
    /// Investment created by the deferred effect
    pub investment_id: Option<InvestmentId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl PaymentIntention {
    /// A client secret is only usable while the intention is live
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now < self.expires_at
    }

    /// The intention as a caller should see it at `now`: a live status past
    /// its TTL reads as expired even before the worker sweeps it.
    pub fn observed_at(mut self, now: DateTime<Utc>) -> Self {
        if !self.status.is_terminal() && now >= self.expires_at {
            self.status = IntentionStatus::Expired;
        }
        self
    }

    /// Completed, effect not yet applied
    pub fn awaits_execution(&self) -> bool {
        self.status == IntentionStatus::Completed && !self.is_executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn intention(status: IntentionStatus) -> PaymentIntention {
        let now = Utc::now();
        PaymentIntention {
            id: Uuid::new_v4(),
            user_id: 1,
            profile_id: Uuid::new_v4(),
            intention_type: IntentionType::WalletCharge,
            amount: Decimal::from(100),
            currency: "SAR".to_string(),
            status,
            gateway_intention_id: "pi_1".to_string(),
            gateway_order_id: Some(77),
            client_secret: "secret".to_string(),
            extras: IntentionExtras::default(),
            is_executed: false,
            execution_attempts: 0,
            last_error: None,
            gateway_transaction_id: None,
            investment_id: None,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::hours(24),
            completed_at: None,
            executed_at: None,
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(IntentionStatus::Completed.is_terminal());
        assert!(IntentionStatus::Failed.is_terminal());
        assert!(IntentionStatus::Expired.is_terminal());
        assert!(!IntentionStatus::Created.is_terminal());
        assert!(!IntentionStatus::Active.is_terminal());
    }

    #[test]
    fn test_stale_secret_is_not_usable() {
        let live = intention(IntentionStatus::Created);
        assert!(live.is_usable(Utc::now()));
        assert!(!live.is_usable(live.expires_at + Duration::seconds(1)));
        assert!(!intention(IntentionStatus::Expired).is_usable(Utc::now()));
    }

    #[test]
    fn test_require_investment_extras() {
        let opp = Uuid::new_v4();
        let extras = IntentionExtras::investment(opp, 3, InvestmentType::SelfSale);
        let parsed = extras.require_investment().unwrap();
        assert_eq!(parsed.opportunity_id, opp);
        assert_eq!(parsed.shares, 3);

        let missing = IntentionExtras {
            opportunity_id: Some(opp),
            shares: None,
            investment_type: Some(InvestmentType::SelfSale),
        };
        assert_eq!(
            missing.require_investment(),
            Err(EngineError::MissingExtras("shares".to_string()))
        );
    }

    #[test]
    fn test_awaits_execution() {
        let mut i = intention(IntentionStatus::Completed);
        assert!(i.awaits_execution());
        i.is_executed = true;
        assert!(!i.awaits_execution());
    }
}
