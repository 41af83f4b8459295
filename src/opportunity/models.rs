//! Opportunity record

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core_types::{OpportunityId, ProfileId, UserId};
use crate::investment::models::InvestmentType;

/// Opportunity lifecycle status
///
/// `Open -> Completed` happens only when the last share is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    Draft,
    Open,
    Completed,
    Closed,
}

impl OpportunityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityStatus::Draft => "draft",
            OpportunityStatus::Open => "open",
            OpportunityStatus::Completed => "completed",
            OpportunityStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpportunityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(OpportunityStatus::Draft),
            "open" => Ok(OpportunityStatus::Open),
            "completed" => Ok(OpportunityStatus::Completed),
            "closed" => Ok(OpportunityStatus::Closed),
            _ => Err(format!("Invalid opportunity status: {}", s)),
        }
    }
}

/// A funding round offering a fixed number of uniformly priced shares.
///
/// # Invariants
/// - `0 <= available_shares <= total_shares`
/// - `available_shares` only changes through [`Opportunity::reserve_shares`]
///   and [`Opportunity::release_shares`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub owner_profile_id: ProfileId,
    pub owner_user_id: UserId,
    pub title: String,
    pub status: OpportunityStatus,

    pub total_shares: i64,
    pub available_shares: i64,
    pub share_price: Decimal,

    /// Smallest ticket, in SAR
    pub min_investment_amount: Decimal,
    /// Largest ticket, in SAR; unlimited when `None`
    pub max_investment_amount: Option<Decimal>,

    pub allow_self_sale: bool,
    pub allow_authorized_sale: bool,

    /// Charged per share on top of the price, self_sale only
    pub shipping_fee_per_share: Decimal,
    pub expected_profit_per_share: Decimal,
    pub expected_net_profit_per_share: Decimal,
    pub expected_delivery_date: Option<NaiveDate>,
    pub expected_distribution_date: Option<NaiveDate>,

    pub offering_start: Option<DateTime<Utc>>,
    pub offering_end: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    /// New open opportunity with every share available and no window limits.
    pub fn new(
        owner_profile_id: ProfileId,
        owner_user_id: UserId,
        title: impl Into<String>,
        total_shares: i64,
        share_price: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_profile_id,
            owner_user_id,
            title: title.into(),
            status: OpportunityStatus::Open,
            total_shares,
            available_shares: total_shares,
            share_price,
            min_investment_amount: share_price,
            max_investment_amount: None,
            allow_self_sale: true,
            allow_authorized_sale: true,
            shipping_fee_per_share: Decimal::ZERO,
            expected_profit_per_share: Decimal::ZERO,
            expected_net_profit_per_share: Decimal::ZERO,
            expected_delivery_date: None,
            expected_distribution_date: None,
            offering_start: None,
            offering_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Offering window contains `now` (open-ended bounds always match)
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        let started = self.offering_start.is_none_or(|start| start <= now);
        let not_ended = self.offering_end.is_none_or(|end| now <= end);
        started && not_ended
    }

    /// Open, inside the offering window and with shares left
    pub fn is_investable(&self, now: DateTime<Utc>) -> bool {
        self.status == OpportunityStatus::Open
            && self.available_shares > 0
            && self.window_contains(now)
    }

    pub fn allows(&self, investment_type: InvestmentType) -> bool {
        match investment_type {
            InvestmentType::SelfSale => self.allow_self_sale,
            InvestmentType::AuthorizedSale => self.allow_authorized_sale,
        }
    }

    pub fn sold_shares(&self) -> i64 {
        self.total_shares - self.available_shares
    }
}
