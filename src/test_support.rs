//! Seeding helpers shared by the unit tests

use rust_decimal::Decimal;

use crate::opportunity::Opportunity;
use crate::store::{MemoryStore, Store, StoreTx};
use crate::wallet::holder::{InvestorProfile, OwnerProfile};
use crate::wallet::ledger::Ledger;
use crate::wallet::models::{EntryMeta, EntryReason};

/// Owner (user 900) plus an open opportunity, tweaked by `configure`
pub async fn seed_opportunity(
    store: &MemoryStore,
    total_shares: i64,
    share_price: Decimal,
    configure: impl FnOnce(&mut Opportunity),
) -> Opportunity {
    let owner = OwnerProfile::new(900, "Owner Co");
    let mut opportunity = Opportunity::new(owner.id, owner.user_id, "Batch", total_shares, share_price);
    configure(&mut opportunity);

    let mut tx = store.begin().await.unwrap();
    tx.insert_owner(&owner).await.unwrap();
    tx.insert_opportunity(&opportunity).await.unwrap();
    tx.commit().await.unwrap();
    opportunity
}

/// Investor with a wallet holding `balance` (no entry when zero)
pub async fn seed_investor(store: &MemoryStore, user_id: i64, balance: Decimal) -> InvestorProfile {
    let investor = InvestorProfile::new(user_id, format!("Investor {user_id}"));

    let mut tx = store.begin().await.unwrap();
    tx.insert_investor(&investor).await.unwrap();
    if balance > Decimal::ZERO {
        Ledger::deposit(
            &mut tx,
            &investor,
            balance,
            EntryMeta::new(EntryReason::Adjustment),
        )
        .await
        .unwrap();
    }
    tx.commit().await.unwrap();
    investor
}

pub async fn balance(store: &MemoryStore, holder_id: uuid::Uuid) -> Decimal {
    let mut tx = store.begin().await.unwrap();
    tx.wallet_balance(holder_id).await.unwrap()
}
