//! Standalone wallet operations, one transaction each.
//!
//! The wallet-facing endpoints share the ledger contract with the
//! investment and settlement paths; they just do not bundle the movement
//! with another record.

use rust_decimal::Decimal;
use std::sync::Arc;

use super::holder::HolderRef;
use super::ledger::Ledger;
use super::models::{EntryMeta, WalletEntry};
use crate::core_types::ProfileId;
use crate::error::EngineError;
use crate::store::{Store, StoreTx};

pub struct WalletService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> WalletService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn deposit(
        &self,
        holder_id: ProfileId,
        amount: Decimal,
        meta: EntryMeta,
    ) -> Result<WalletEntry, EngineError> {
        let mut tx = self.store.begin().await?;
        let holder = Self::holder(&mut tx, holder_id).await?;
        let entry = Ledger::deposit(&mut tx, &holder, amount, meta).await?;
        tx.commit().await?;
        Ok(entry)
    }

    pub async fn withdraw(
        &self,
        holder_id: ProfileId,
        amount: Decimal,
        meta: EntryMeta,
    ) -> Result<WalletEntry, EngineError> {
        let mut tx = self.store.begin().await?;
        let holder = Self::holder(&mut tx, holder_id).await?;
        let entry = Ledger::withdraw(&mut tx, &holder, amount, meta).await?;
        tx.commit().await?;
        Ok(entry)
    }

    pub async fn transfer(
        &self,
        from: ProfileId,
        to: ProfileId,
        amount: Decimal,
        meta: EntryMeta,
    ) -> Result<(WalletEntry, WalletEntry), EngineError> {
        let mut tx = self.store.begin().await?;
        let source = Self::holder(&mut tx, from).await?;
        let target = Self::holder(&mut tx, to).await?;
        let entries = Ledger::transfer(&mut tx, &source, &target, amount, meta).await?;
        tx.commit().await?;
        Ok(entries)
    }

    pub async fn balance(&self, holder_id: ProfileId) -> Result<Decimal, EngineError> {
        let mut tx = self.store.begin().await?;
        Self::holder(&mut tx, holder_id).await?;
        Ledger::balance(&mut tx, holder_id).await
    }

    pub async fn history(&self, holder_id: ProfileId) -> Result<Vec<WalletEntry>, EngineError> {
        let mut tx = self.store.begin().await?;
        tx.wallet_entries(holder_id).await
    }

    /// Resolve a wallet id into a holder usable with the ledger
    pub async fn holder_ref(&self, holder_id: ProfileId) -> Result<HolderRef, EngineError> {
        let mut tx = self.store.begin().await?;
        Self::holder(&mut tx, holder_id).await
    }

    async fn holder(tx: &mut S::Tx, holder_id: ProfileId) -> Result<HolderRef, EngineError> {
        tx.lock_wallet(holder_id)
            .await?
            .map(|wallet| HolderRef::from(&wallet))
            .ok_or(EngineError::WalletUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::wallet::holder::{InvestorProfile, OwnerProfile};
    use crate::wallet::models::{EntryReason, balance_of};

    #[tokio::test]
    async fn test_balance_matches_ledger_after_mixed_operations() {
        let store = Arc::new(MemoryStore::new());
        let investor = InvestorProfile::new(1, "A");
        let owner = OwnerProfile::new(2, "B");
        let mut tx = store.begin().await.unwrap();
        tx.insert_investor(&investor).await.unwrap();
        tx.insert_owner(&owner).await.unwrap();
        tx.commit().await.unwrap();

        let wallets = WalletService::new(store.clone());
        let meta = || EntryMeta::new(EntryReason::Adjustment);

        wallets
            .deposit(investor.id, Decimal::from(300), meta())
            .await
            .unwrap();
        wallets
            .withdraw(investor.id, Decimal::new(4550, 2), meta())
            .await
            .unwrap();
        wallets
            .transfer(investor.id, owner.id, Decimal::from(100), meta())
            .await
            .unwrap();
        // Failing operations leave no trace
        assert!(
            wallets
                .withdraw(investor.id, Decimal::from(1000), meta())
                .await
                .is_err()
        );

        let history = wallets.history(investor.id).await.unwrap();
        assert_eq!(history.len(), 3);
        let balance = wallets.balance(investor.id).await.unwrap();
        assert_eq!(balance, Decimal::new(15450, 2));
        assert_eq!(balance, balance_of(&history));
        assert_eq!(wallets.balance(owner.id).await.unwrap(), Decimal::from(100));
    }

    #[tokio::test]
    async fn test_unknown_wallet() {
        let store = Arc::new(MemoryStore::new());
        let wallets = WalletService::new(store);
        assert_eq!(
            wallets.balance(uuid::Uuid::new_v4()).await,
            Err(EngineError::WalletUnavailable)
        );
    }
}
