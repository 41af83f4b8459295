//! In-memory store
//!
//! One async mutex guards the whole state. `begin()` takes the lock and
//! works on a private copy; `commit()` publishes the copy. A transaction
//! dropped without commit leaves the shared state untouched. Every
//! transaction is therefore serializable, which makes this store the
//! reference implementation for the concurrency tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, StoreTx};
use crate::core_types::{IntentionId, InvestmentId, OpportunityId, PayoutId, ProfileId};
use crate::error::EngineError;
use crate::investment::models::Investment;
use crate::opportunity::Opportunity;
use crate::payment::types::{IntentionStatus, PaymentIntention};
use crate::wallet::holder::{InvestorProfile, OwnerProfile};
use crate::wallet::models::{HolderKind, Wallet, WalletEntry, balance_of};
use crate::wallet::payout::PayoutRequest;

#[derive(Debug, Default, Clone)]
struct MemoryState {
    investors: FxHashMap<ProfileId, InvestorProfile>,
    owners: FxHashMap<ProfileId, OwnerProfile>,
    wallets: FxHashMap<ProfileId, Wallet>,
    entries: Vec<WalletEntry>,
    opportunities: FxHashMap<OpportunityId, Opportunity>,
    investments: FxHashMap<InvestmentId, Investment>,
    intentions: FxHashMap<IntentionId, PaymentIntention>,
    payouts: FxHashMap<PayoutId, PayoutRequest>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, EngineError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx { guard, work })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

fn duplicate(what: &str, id: impl std::fmt::Display) -> EngineError {
    EngineError::Database(format!("duplicate {} {}", what, id))
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(mut self) -> Result<(), EngineError> {
        *self.guard = std::mem::take(&mut self.work);
        Ok(())
    }

    // === Profiles & wallets ===

    async fn insert_investor(&mut self, profile: &InvestorProfile) -> Result<(), EngineError> {
        if self.work.wallets.contains_key(&profile.id) {
            return Err(duplicate("profile", profile.id));
        }
        self.work.investors.insert(profile.id, profile.clone());
        self.work.wallets.insert(
            profile.id,
            Wallet {
                holder_id: profile.id,
                holder_kind: HolderKind::Investor,
                user_id: profile.user_id,
                created_at: profile.created_at,
            },
        );
        Ok(())
    }

    async fn insert_owner(&mut self, profile: &OwnerProfile) -> Result<(), EngineError> {
        if self.work.wallets.contains_key(&profile.id) {
            return Err(duplicate("profile", profile.id));
        }
        self.work.owners.insert(profile.id, profile.clone());
        self.work.wallets.insert(
            profile.id,
            Wallet {
                holder_id: profile.id,
                holder_kind: HolderKind::Owner,
                user_id: profile.user_id,
                created_at: profile.created_at,
            },
        );
        Ok(())
    }

    async fn investor(&mut self, id: ProfileId) -> Result<Option<InvestorProfile>, EngineError> {
        Ok(self.work.investors.get(&id).cloned())
    }

    async fn owner(&mut self, id: ProfileId) -> Result<Option<OwnerProfile>, EngineError> {
        Ok(self.work.owners.get(&id).cloned())
    }

    async fn lock_wallet(&mut self, holder_id: ProfileId) -> Result<Option<Wallet>, EngineError> {
        Ok(self.work.wallets.get(&holder_id).cloned())
    }

    async fn wallet_balance(&mut self, holder_id: ProfileId) -> Result<Decimal, EngineError> {
        Ok(balance_of(
            self.work
                .entries
                .iter()
                .filter(|entry| entry.holder_id == holder_id),
        ))
    }

    async fn insert_wallet_entry(&mut self, entry: &WalletEntry) -> Result<(), EngineError> {
        if !self.work.wallets.contains_key(&entry.holder_id) {
            return Err(EngineError::WalletUnavailable);
        }
        self.work.entries.push(entry.clone());
        Ok(())
    }

    async fn wallet_entries(
        &mut self,
        holder_id: ProfileId,
    ) -> Result<Vec<WalletEntry>, EngineError> {
        Ok(self
            .work
            .entries
            .iter()
            .filter(|entry| entry.holder_id == holder_id)
            .cloned()
            .collect())
    }

    // === Opportunities ===

    async fn insert_opportunity(&mut self, opportunity: &Opportunity) -> Result<(), EngineError> {
        if self.work.opportunities.contains_key(&opportunity.id) {
            return Err(duplicate("opportunity", opportunity.id));
        }
        self.work
            .opportunities
            .insert(opportunity.id, opportunity.clone());
        Ok(())
    }

    async fn opportunity(&mut self, id: OpportunityId) -> Result<Option<Opportunity>, EngineError> {
        Ok(self.work.opportunities.get(&id).cloned())
    }

    async fn lock_opportunity(
        &mut self,
        id: OpportunityId,
    ) -> Result<Option<Opportunity>, EngineError> {
        Ok(self.work.opportunities.get(&id).cloned())
    }

    async fn reserve_shares(
        &mut self,
        id: OpportunityId,
        shares: i64,
        now: DateTime<Utc>,
    ) -> Result<Opportunity, EngineError> {
        let opportunity = self
            .work
            .opportunities
            .get_mut(&id)
            .ok_or_else(|| EngineError::OpportunityNotFound(id.to_string()))?;
        opportunity.reserve_shares(shares, now)?;
        Ok(opportunity.clone())
    }

    async fn save_opportunity(&mut self, opportunity: &Opportunity) -> Result<(), EngineError> {
        match self.work.opportunities.get_mut(&opportunity.id) {
            Some(slot) => {
                *slot = opportunity.clone();
                Ok(())
            }
            None => Err(EngineError::OpportunityNotFound(opportunity.id.to_string())),
        }
    }

    // === Investments ===

    async fn insert_investment(&mut self, investment: &Investment) -> Result<(), EngineError> {
        if self.work.investments.contains_key(&investment.id) {
            return Err(duplicate("investment", investment.id));
        }
        self.work
            .investments
            .insert(investment.id, investment.clone());
        Ok(())
    }

    async fn investment(&mut self, id: InvestmentId) -> Result<Option<Investment>, EngineError> {
        Ok(self.work.investments.get(&id).cloned())
    }

    async fn lock_investment(
        &mut self,
        id: InvestmentId,
    ) -> Result<Option<Investment>, EngineError> {
        Ok(self.work.investments.get(&id).cloned())
    }

    async fn investments_for_opportunity(
        &mut self,
        opportunity_id: OpportunityId,
    ) -> Result<Vec<Investment>, EngineError> {
        let mut found: Vec<Investment> = self
            .work
            .investments
            .values()
            .filter(|inv| inv.opportunity_id == opportunity_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn save_investment(&mut self, investment: &Investment) -> Result<(), EngineError> {
        match self.work.investments.get_mut(&investment.id) {
            Some(slot) => {
                *slot = investment.clone();
                Ok(())
            }
            None => Err(EngineError::InvestmentNotFound(investment.id.to_string())),
        }
    }

    // === Payment intentions ===

    async fn insert_intention(&mut self, intention: &PaymentIntention) -> Result<(), EngineError> {
        if self.work.intentions.contains_key(&intention.id) {
            return Err(duplicate("intention", intention.id));
        }
        self.work.intentions.insert(intention.id, intention.clone());
        Ok(())
    }

    async fn intention(
        &mut self,
        id: IntentionId,
    ) -> Result<Option<PaymentIntention>, EngineError> {
        Ok(self.work.intentions.get(&id).cloned())
    }

    async fn lock_intention(
        &mut self,
        id: IntentionId,
    ) -> Result<Option<PaymentIntention>, EngineError> {
        Ok(self.work.intentions.get(&id).cloned())
    }

    async fn lock_intention_by_gateway_order(
        &mut self,
        gateway_order_id: i64,
    ) -> Result<Option<PaymentIntention>, EngineError> {
        Ok(self
            .work
            .intentions
            .values()
            .find(|i| i.gateway_order_id == Some(gateway_order_id))
            .cloned())
    }

    async fn save_intention(&mut self, intention: &PaymentIntention) -> Result<(), EngineError> {
        match self.work.intentions.get_mut(&intention.id) {
            Some(slot) => {
                *slot = intention.clone();
                Ok(())
            }
            None => Err(EngineError::IntentionNotFound(intention.id.to_string())),
        }
    }

    async fn expirable_intentions(
        &mut self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PaymentIntention>, EngineError> {
        let mut found: Vec<PaymentIntention> = self
            .work
            .intentions
            .values()
            .filter(|i| {
                matches!(i.status, IntentionStatus::Created | IntentionStatus::Active)
                    && i.expires_at <= now
            })
            .cloned()
            .collect();
        found.sort_by_key(|i| i.expires_at);
        found.truncate(limit);
        Ok(found)
    }

    async fn unexecuted_intentions(
        &mut self,
        max_attempts: i32,
        limit: usize,
    ) -> Result<Vec<PaymentIntention>, EngineError> {
        let mut found: Vec<PaymentIntention> = self
            .work
            .intentions
            .values()
            .filter(|i| i.awaits_execution() && i.execution_attempts < max_attempts)
            .cloned()
            .collect();
        found.sort_by_key(|i| i.updated_at);
        found.truncate(limit);
        Ok(found)
    }

    // === Payouts ===

    async fn insert_payout(&mut self, payout: &PayoutRequest) -> Result<(), EngineError> {
        if self.work.payouts.contains_key(&payout.id) {
            return Err(duplicate("payout", payout.id));
        }
        self.work.payouts.insert(payout.id, payout.clone());
        Ok(())
    }

    async fn lock_payout(&mut self, id: PayoutId) -> Result<Option<PayoutRequest>, EngineError> {
        Ok(self.work.payouts.get(&id).cloned())
    }

    async fn save_payout(&mut self, payout: &PayoutRequest) -> Result<(), EngineError> {
        match self.work.payouts.get_mut(&payout.id) {
            Some(slot) => {
                *slot = payout.clone();
                Ok(())
            }
            None => Err(EngineError::PayoutNotFound(payout.id.to_string())),
        }
    }

    async fn payouts_for_holder(
        &mut self,
        holder_id: ProfileId,
    ) -> Result<Vec<PayoutRequest>, EngineError> {
        let mut found: Vec<PayoutRequest> = self
            .work
            .payouts
            .values()
            .filter(|p| p.holder_id == holder_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_uncommitted_tx_is_discarded() {
        let store = MemoryStore::new();
        let owner = OwnerProfile::new(1, "Owner");
        let opp = Opportunity::new(owner.id, 1, "Tea", 10, Decimal::from(5));

        let mut tx = store.begin().await.unwrap();
        tx.insert_owner(&owner).await.unwrap();
        tx.insert_opportunity(&opp).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.opportunity(opp.id).await.unwrap().is_none());
        assert!(tx.owner(owner.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_committed_tx_is_visible() {
        let store = MemoryStore::new();
        let owner = OwnerProfile::new(1, "Owner");
        let opp = Opportunity::new(owner.id, 1, "Tea", 10, Decimal::from(5));

        let mut tx = store.begin().await.unwrap();
        tx.insert_owner(&owner).await.unwrap();
        tx.insert_opportunity(&opp).await.unwrap();
        tx.reserve_shares(opp.id, 4, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let stored = tx.opportunity(opp.id).await.unwrap().unwrap();
        assert_eq!(stored.available_shares, 6);
        assert!(tx.lock_wallet(owner.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reserve_unknown_opportunity() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.reserve_shares(Uuid::new_v4(), 1, Utc::now()).await,
            Err(EngineError::OpportunityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_entry_requires_wallet() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let entry = WalletEntry::new(
            Uuid::new_v4(),
            crate::wallet::models::EntryKind::Deposit,
            Decimal::ONE,
            crate::wallet::models::EntryMeta::new(crate::wallet::models::EntryReason::Adjustment),
        );
        assert_eq!(
            tx.insert_wallet_entry(&entry).await,
            Err(EngineError::WalletUnavailable)
        );
    }
}
