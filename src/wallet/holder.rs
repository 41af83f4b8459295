//! Wallet holders
//!
//! Investors and opportunity owners both own a wallet. The ledger only
//! needs to know which wallet to touch and who to notify, so it depends on
//! the [`WalletHolder`] capability rather than on either profile type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::HolderKind;
use crate::core_types::{ProfileId, UserId};

/// Anything that owns a wallet
pub trait WalletHolder: Send + Sync {
    /// Wallet key (same as the profile id)
    fn wallet_id(&self) -> ProfileId;

    /// Account behind the profile
    fn user_id(&self) -> UserId;

    fn holder_kind(&self) -> HolderKind;
}

/// Investor profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorProfile {
    pub id: ProfileId,
    pub user_id: UserId,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl InvestorProfile {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            display_name: display_name.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

impl WalletHolder for InvestorProfile {
    fn wallet_id(&self) -> ProfileId {
        self.id
    }

    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn holder_kind(&self) -> HolderKind {
        HolderKind::Investor
    }
}

/// Opportunity owner profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerProfile {
    pub id: ProfileId,
    pub user_id: UserId,
    pub business_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl OwnerProfile {
    pub fn new(user_id: UserId, business_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            business_name: business_name.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

impl WalletHolder for OwnerProfile {
    fn wallet_id(&self) -> ProfileId {
        self.id
    }

    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn holder_kind(&self) -> HolderKind {
        HolderKind::Owner
    }
}

/// Holder reconstructed from a stored wallet row, for callers that only
/// have the wallet id at hand (payout processing, bulk settlement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolderRef {
    pub wallet_id: ProfileId,
    pub user_id: UserId,
    pub kind: HolderKind,
}

impl WalletHolder for HolderRef {
    fn wallet_id(&self) -> ProfileId {
        self.wallet_id
    }

    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn holder_kind(&self) -> HolderKind {
        self.kind
    }
}

impl From<&super::models::Wallet> for HolderRef {
    fn from(wallet: &super::models::Wallet) -> Self {
        Self {
            wallet_id: wallet.holder_id,
            user_id: wallet.user_id,
            kind: wallet.holder_kind,
        }
    }
}
