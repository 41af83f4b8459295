//! Investment record and its per-type settlement states

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core_types::{IntentionId, InvestmentId, OpportunityId, ProfileId, UserId};
use crate::opportunity::Opportunity;

/// How the investor realizes profit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentType {
    /// Investor receives the merchandise and resells it personally
    SelfSale,
    /// Platform resells on the investor's behalf
    AuthorizedSale,
}

impl InvestmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentType::SelfSale => "self_sale",
            InvestmentType::AuthorizedSale => "authorized_sale",
        }
    }
}

impl fmt::Display for InvestmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self_sale" => Ok(InvestmentType::SelfSale),
            "authorized_sale" => Ok(InvestmentType::AuthorizedSale),
            _ => Err(format!("Invalid investment type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Active,
    Completed,
    Cancelled,
}

impl InvestmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentStatus::Active => "active",
            InvestmentStatus::Completed => "completed",
            InvestmentStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for InvestmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(InvestmentStatus::Active),
            "completed" => Ok(InvestmentStatus::Completed),
            "cancelled" => Ok(InvestmentStatus::Cancelled),
            _ => Err(format!("Invalid investment status: {}", s)),
        }
    }
}

/// Self-sale delivery state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MerchandiseStatus {
    Pending,
    Arrived,
}

impl MerchandiseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MerchandiseStatus::Pending => "pending",
            MerchandiseStatus::Arrived => "arrived",
        }
    }
}

impl FromStr for MerchandiseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MerchandiseStatus::Pending),
            "arrived" => Ok(MerchandiseStatus::Arrived),
            _ => Err(format!("Invalid merchandise status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Pending,
    Distributed,
}

impl DistributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionStatus::Pending => "pending",
            DistributionStatus::Distributed => "distributed",
        }
    }
}

impl FromStr for DistributionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DistributionStatus::Pending),
            "distributed" => Ok(DistributionStatus::Distributed),
            _ => Err(format!("Invalid distribution status: {}", s)),
        }
    }
}

/// Where the money for the investment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentChannel {
    Wallet,
    Gateway,
}

impl PaymentChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentChannel::Wallet => "wallet",
            PaymentChannel::Gateway => "gateway",
        }
    }
}

impl FromStr for PaymentChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wallet" => Ok(PaymentChannel::Wallet),
            "gateway" => Ok(PaymentChannel::Gateway),
            _ => Err(format!("Invalid payment channel: {}", s)),
        }
    }
}

/// Money amounts of an investment, fixed at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvestmentAmounts {
    /// shares * share_price
    pub amount: Decimal,
    /// shares * shipping fee (self_sale only)
    pub shipping_fee: Decimal,
    /// amount + shipping_fee
    pub total_payment_required: Decimal,
}

impl InvestmentAmounts {
    pub fn compute(opportunity: &Opportunity, shares: i64, investment_type: InvestmentType) -> Self {
        let shares_dec = Decimal::from(shares);
        let amount = shares_dec * opportunity.share_price;
        let shipping_fee = match investment_type {
            InvestmentType::SelfSale => shares_dec * opportunity.shipping_fee_per_share,
            InvestmentType::AuthorizedSale => Decimal::ZERO,
        };
        Self {
            amount,
            shipping_fee,
            total_payment_required: amount + shipping_fee,
        }
    }
}

/// A purchase of shares in one opportunity.
///
/// Never deleted; cancellation is a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    pub opportunity_id: OpportunityId,
    pub investor_profile_id: ProfileId,
    pub investor_user_id: UserId,
    pub shares: i64,
    pub investment_type: InvestmentType,

    pub share_price: Decimal,
    pub amount: Decimal,
    pub shipping_fee_per_share: Decimal,
    pub total_payment_required: Decimal,
    pub payment_channel: PaymentChannel,
    pub payment_intention_id: Option<IntentionId>,

    // Snapshot of the opportunity terms at purchase time
    pub expected_profit_per_share: Decimal,
    pub expected_net_profit_per_share: Decimal,
    pub expected_delivery_date: Option<NaiveDate>,
    pub expected_distribution_date: Option<NaiveDate>,

    pub status: InvestmentStatus,
    /// `Some` only for self_sale
    pub merchandise_status: Option<MerchandiseStatus>,
    pub merchandise_arrived_at: Option<DateTime<Utc>>,

    /// authorized_sale only, set exactly once
    pub actual_return_amount: Option<Decimal>,
    pub actual_net_return: Option<Decimal>,
    pub returns_recorded_at: Option<DateTime<Utc>>,

    pub distribution_status: DistributionStatus,
    pub distributed_amount: Option<Decimal>,
    pub distributed_at: Option<DateTime<Utc>>,

    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Investment {
    /// Build a new active investment, snapshotting the opportunity terms.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        opportunity: &Opportunity,
        investor_profile_id: ProfileId,
        investor_user_id: UserId,
        shares: i64,
        investment_type: InvestmentType,
        payment_channel: PaymentChannel,
        payment_intention_id: Option<IntentionId>,
        now: DateTime<Utc>,
    ) -> Self {
        let amounts = InvestmentAmounts::compute(opportunity, shares, investment_type);
        let shipping_fee_per_share = match investment_type {
            InvestmentType::SelfSale => opportunity.shipping_fee_per_share,
            InvestmentType::AuthorizedSale => Decimal::ZERO,
        };
        let merchandise_status = match investment_type {
            InvestmentType::SelfSale => Some(MerchandiseStatus::Pending),
            InvestmentType::AuthorizedSale => None,
        };

        Self {
            id: Uuid::new_v4(),
            opportunity_id: opportunity.id,
            investor_profile_id,
            investor_user_id,
            shares,
            investment_type,
            share_price: opportunity.share_price,
            amount: amounts.amount,
            shipping_fee_per_share,
            total_payment_required: amounts.total_payment_required,
            payment_channel,
            payment_intention_id,
            expected_profit_per_share: opportunity.expected_profit_per_share,
            expected_net_profit_per_share: opportunity.expected_net_profit_per_share,
            expected_delivery_date: opportunity.expected_delivery_date,
            expected_distribution_date: opportunity.expected_distribution_date,
            status: InvestmentStatus::Active,
            merchandise_status,
            merchandise_arrived_at: None,
            actual_return_amount: None,
            actual_net_return: None,
            returns_recorded_at: None,
            distribution_status: DistributionStatus::Pending,
            distributed_amount: None,
            distributed_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_distributed(&self) -> bool {
        self.distribution_status == DistributionStatus::Distributed
    }

    pub fn merchandise_arrived(&self) -> bool {
        self.merchandise_status == Some(MerchandiseStatus::Arrived)
    }

    pub fn returns_recorded(&self) -> bool {
        self.actual_return_amount.is_some()
    }
}
