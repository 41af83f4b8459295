//! Storage layer
//!
//! Every money-moving operation runs inside one [`StoreTx`]. A transaction
//! either commits all of its writes or none of them: dropping a `StoreTx`
//! without calling [`StoreTx::commit`] rolls it back.
//!
//! # Locking
//!
//! The `lock_*` methods return the row and hold it until the transaction
//! ends, so concurrent writers on the same opportunity, wallet, investment,
//! intention or payout serialize. Lock order used by the services:
//! intention → opportunity → investment → payout → wallet.
//!
//! # Implementations
//!
//! - [`PgStore`]: PostgreSQL via sqlx, `SELECT ... FOR UPDATE` row locks
//! - [`MemoryStore`]: whole-state async mutex, copy-on-begin

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core_types::{IntentionId, InvestmentId, OpportunityId, PayoutId, ProfileId};
use crate::error::EngineError;
use crate::investment::models::Investment;
use crate::opportunity::Opportunity;
use crate::payment::types::PaymentIntention;
use crate::wallet::holder::{InvestorProfile, OwnerProfile};
use crate::wallet::models::{Wallet, WalletEntry};
use crate::wallet::payout::PayoutRequest;

/// Transaction factory
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx + 'static;

    async fn begin(&self) -> Result<Self::Tx, EngineError>;
}

/// One open transaction
#[async_trait]
pub trait StoreTx: Send {
    async fn commit(self) -> Result<(), EngineError>;

    // === Profiles & wallets ===

    /// Insert the profile and create its (empty) wallet
    async fn insert_investor(&mut self, profile: &InvestorProfile) -> Result<(), EngineError>;

    /// Insert the profile and create its (empty) wallet
    async fn insert_owner(&mut self, profile: &OwnerProfile) -> Result<(), EngineError>;

    async fn investor(&mut self, id: ProfileId) -> Result<Option<InvestorProfile>, EngineError>;

    async fn owner(&mut self, id: ProfileId) -> Result<Option<OwnerProfile>, EngineError>;

    /// Lock the wallet header; concurrent balance computations on the same
    /// wallet serialize behind this lock.
    async fn lock_wallet(&mut self, holder_id: ProfileId) -> Result<Option<Wallet>, EngineError>;

    /// sum(deposits) - sum(withdrawals)
    async fn wallet_balance(&mut self, holder_id: ProfileId) -> Result<Decimal, EngineError>;

    async fn insert_wallet_entry(&mut self, entry: &WalletEntry) -> Result<(), EngineError>;

    /// Oldest first
    async fn wallet_entries(&mut self, holder_id: ProfileId)
    -> Result<Vec<WalletEntry>, EngineError>;

    // === Opportunities ===

    async fn insert_opportunity(&mut self, opportunity: &Opportunity) -> Result<(), EngineError>;

    async fn opportunity(&mut self, id: OpportunityId) -> Result<Option<Opportunity>, EngineError>;

    async fn lock_opportunity(
        &mut self,
        id: OpportunityId,
    ) -> Result<Option<Opportunity>, EngineError>;

    /// Atomic read-modify-write of `available_shares`
    /// (see [`Opportunity::reserve_shares`]). Returns the updated row.
    async fn reserve_shares(
        &mut self,
        id: OpportunityId,
        shares: i64,
        now: DateTime<Utc>,
    ) -> Result<Opportunity, EngineError>;

    async fn save_opportunity(&mut self, opportunity: &Opportunity) -> Result<(), EngineError>;

    // === Investments ===

    async fn insert_investment(&mut self, investment: &Investment) -> Result<(), EngineError>;

    async fn investment(&mut self, id: InvestmentId) -> Result<Option<Investment>, EngineError>;

    async fn lock_investment(
        &mut self,
        id: InvestmentId,
    ) -> Result<Option<Investment>, EngineError>;

    /// Oldest first
    async fn investments_for_opportunity(
        &mut self,
        opportunity_id: OpportunityId,
    ) -> Result<Vec<Investment>, EngineError>;

    async fn save_investment(&mut self, investment: &Investment) -> Result<(), EngineError>;

    // === Payment intentions ===

    async fn insert_intention(&mut self, intention: &PaymentIntention) -> Result<(), EngineError>;

    async fn intention(&mut self, id: IntentionId)
    -> Result<Option<PaymentIntention>, EngineError>;

    async fn lock_intention(
        &mut self,
        id: IntentionId,
    ) -> Result<Option<PaymentIntention>, EngineError>;

    async fn lock_intention_by_gateway_order(
        &mut self,
        gateway_order_id: i64,
    ) -> Result<Option<PaymentIntention>, EngineError>;

    async fn save_intention(&mut self, intention: &PaymentIntention) -> Result<(), EngineError>;

    /// Created/active intentions whose `expires_at` is at or before `now`
    async fn expirable_intentions(
        &mut self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PaymentIntention>, EngineError>;

    /// Completed, not executed, fewer than `max_attempts` attempts
    async fn unexecuted_intentions(
        &mut self,
        max_attempts: i32,
        limit: usize,
    ) -> Result<Vec<PaymentIntention>, EngineError>;

    // === Payouts ===

    async fn insert_payout(&mut self, payout: &PayoutRequest) -> Result<(), EngineError>;

    async fn lock_payout(&mut self, id: PayoutId) -> Result<Option<PayoutRequest>, EngineError>;

    async fn save_payout(&mut self, payout: &PayoutRequest) -> Result<(), EngineError>;

    /// Newest first
    async fn payouts_for_holder(
        &mut self,
        holder_id: ProfileId,
    ) -> Result<Vec<PayoutRequest>, EngineError>;
}
