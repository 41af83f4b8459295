//! Wallet Ledger
//!
//! Balance mutation primitives. They run inside the caller's transaction so
//! a ledger movement commits or rolls back together with whatever business
//! record caused it (investment, distribution, payout).
//!
//! # Invariants
//! - A balance is never stored; it is recomputed from the entries under the
//!   wallet lock each time it is needed.
//! - Entries are append-only and carry immutable [`EntryMeta`].

use rust_decimal::Decimal;
use tracing::debug;

use super::holder::WalletHolder;
use super::models::{EntryKind, EntryMeta, Wallet, WalletEntry};
use crate::core_types::ProfileId;
use crate::error::EngineError;
use crate::money;
use crate::store::StoreTx;

pub struct Ledger;

impl Ledger {
    /// Credit `amount` to the holder's wallet.
    pub async fn deposit<T: StoreTx>(
        tx: &mut T,
        holder: &dyn WalletHolder,
        amount: Decimal,
        meta: EntryMeta,
    ) -> Result<WalletEntry, EngineError> {
        let amount = money::validate_amount(amount)?;
        let wallet = Self::lock(tx, holder).await?;

        let entry = WalletEntry::new(wallet.holder_id, EntryKind::Deposit, amount, meta);
        tx.insert_wallet_entry(&entry).await?;

        debug!(
            holder_id = %wallet.holder_id,
            entry_id = %entry.id,
            amount = %amount,
            reason = ?entry.meta.reason,
            "Wallet deposit"
        );
        Ok(entry)
    }

    /// Debit `amount` from the holder's wallet.
    ///
    /// # Errors
    /// - `EmptyBalance` when the balance is zero
    /// - `InsufficientFunds` when `amount` exceeds the balance
    pub async fn withdraw<T: StoreTx>(
        tx: &mut T,
        holder: &dyn WalletHolder,
        amount: Decimal,
        meta: EntryMeta,
    ) -> Result<WalletEntry, EngineError> {
        let amount = money::validate_amount(amount)?;
        let wallet = Self::lock(tx, holder).await?;

        let balance = tx.wallet_balance(wallet.holder_id).await?;
        if balance <= Decimal::ZERO {
            return Err(EngineError::EmptyBalance);
        }
        if amount > balance {
            return Err(EngineError::InsufficientFunds {
                balance,
                required: amount,
            });
        }

        let entry = WalletEntry::new(wallet.holder_id, EntryKind::Withdraw, amount, meta);
        tx.insert_wallet_entry(&entry).await?;

        debug!(
            holder_id = %wallet.holder_id,
            entry_id = %entry.id,
            amount = %amount,
            balance_before = %balance,
            reason = ?entry.meta.reason,
            "Wallet withdraw"
        );
        Ok(entry)
    }

    /// Withdraw from `from` and deposit into `to`; both or neither.
    ///
    /// Both wallets are locked up front in id order so two opposite
    /// transfers cannot deadlock.
    pub async fn transfer<T: StoreTx>(
        tx: &mut T,
        from: &dyn WalletHolder,
        to: &dyn WalletHolder,
        amount: Decimal,
        meta: EntryMeta,
    ) -> Result<(WalletEntry, WalletEntry), EngineError> {
        if from.wallet_id() == to.wallet_id() {
            return Err(EngineError::InvalidStateTransition(
                "transfer source and target wallet are the same".to_string(),
            ));
        }

        let (first, second) = if from.wallet_id() < to.wallet_id() {
            (from, to)
        } else {
            (to, from)
        };
        Self::lock(tx, first).await?;
        Self::lock(tx, second).await?;

        let out = Self::withdraw(tx, from, amount, meta.clone()).await?;
        let into = Self::deposit(tx, to, amount, meta).await?;
        Ok((out, into))
    }

    /// Current balance (recomputed from entries)
    pub async fn balance<T: StoreTx>(tx: &mut T, holder_id: ProfileId) -> Result<Decimal, EngineError> {
        tx.wallet_balance(holder_id).await
    }

    async fn lock<T: StoreTx>(tx: &mut T, holder: &dyn WalletHolder) -> Result<Wallet, EngineError> {
        let wallet = tx
            .lock_wallet(holder.wallet_id())
            .await?
            .ok_or(EngineError::WalletUnavailable)?;
        if wallet.holder_kind != holder.holder_kind() {
            return Err(EngineError::WalletUnavailable);
        }
        Ok(wallet)
    }
}
