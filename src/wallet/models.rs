//! Wallet and ledger entry records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core_types::{EntryId, ProfileId, UserId};

/// Which kind of profile owns a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderKind {
    Investor,
    Owner,
}

impl HolderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HolderKind::Investor => "investor",
            HolderKind::Owner => "owner",
        }
    }
}

impl fmt::Display for HolderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HolderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "investor" => Ok(HolderKind::Investor),
            "owner" => Ok(HolderKind::Owner),
            _ => Err(format!("Invalid holder kind: {}", s)),
        }
    }
}

/// Wallet header row. Holds no balance: the balance is always the sum of
/// the holder's ledger entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub holder_id: ProfileId,
    pub holder_kind: HolderKind,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Withdraw,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Withdraw => "withdraw",
        }
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(EntryKind::Deposit),
            "withdraw" => Ok(EntryKind::Withdraw),
            _ => Err(format!("Invalid entry kind: {}", s)),
        }
    }
}

/// Why money moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryReason {
    /// Wallet top-up through the payment gateway
    WalletCharge,
    /// Investment paid from the wallet
    Investment,
    /// Cancelled investment refunded
    InvestmentRefund,
    /// Profit credited by the settlement pipeline
    ProfitDistribution,
    /// Funds held by a withdrawal / bank transfer request
    PayoutHold,
    /// Held funds returned after a rejected or cancelled payout
    PayoutRefund,
    /// Wallet-to-wallet transfer
    Transfer,
    /// Manual correction
    Adjustment,
}

impl EntryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryReason::WalletCharge => "wallet_charge",
            EntryReason::Investment => "investment",
            EntryReason::InvestmentRefund => "investment_refund",
            EntryReason::ProfitDistribution => "profit_distribution",
            EntryReason::PayoutHold => "payout_hold",
            EntryReason::PayoutRefund => "payout_refund",
            EntryReason::Transfer => "transfer",
            EntryReason::Adjustment => "adjustment",
        }
    }
}

/// Immutable audit metadata stored with each entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub reason: EntryReason,
    /// Id of the record that caused the entry (investment, intention, payout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl EntryMeta {
    pub fn new(reason: EntryReason) -> Self {
        Self {
            reason,
            reference: None,
            description: None,
            extra: serde_json::Value::Null,
        }
    }

    pub fn with_reference(mut self, reference: Uuid) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }
}

/// Append-only ledger entry. `amount` is always positive; `kind` gives the sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub id: EntryId,
    pub holder_id: ProfileId,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub meta: EntryMeta,
    pub created_at: DateTime<Utc>,
}

impl WalletEntry {
    pub fn new(holder_id: ProfileId, kind: EntryKind, amount: Decimal, meta: EntryMeta) -> Self {
        Self {
            id: Uuid::new_v4(),
            holder_id,
            kind,
            amount,
            meta,
            created_at: Utc::now(),
        }
    }

    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            EntryKind::Deposit => self.amount,
            EntryKind::Withdraw => -self.amount,
        }
    }
}

/// sum(deposits) - sum(withdrawals)
pub fn balance_of<'a>(entries: impl IntoIterator<Item = &'a WalletEntry>) -> Decimal {
    entries
        .into_iter()
        .map(WalletEntry::signed_amount)
        .sum()
}
