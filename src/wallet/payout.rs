//! Withdrawal and bank transfer requests
//!
//! Funds leave the wallet at request time (a `PayoutHold` entry) and stay
//! held while an operator processes the request. Rejecting or cancelling
//! returns them with a `PayoutRefund` entry.
//!
//! ```text
//! PENDING → PROCESSING → COMPLETED
//!    │          └──────→ REJECTED  (refund)
//!    ├─────────────────→ REJECTED  (refund)
//!    └─────────────────→ CANCELLED (refund, by holder)
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::holder::{HolderRef, WalletHolder};
use super::ledger::Ledger;
use super::models::{EntryMeta, EntryReason, HolderKind};
use crate::core_types::{PayoutId, ProfileId, UserId};
use crate::error::EngineError;
use crate::money;
use crate::notify::{NotificationEvent, Notifier};
use crate::store::{Store, StoreTx};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    /// Withdrawal to the holder's registered bank account
    Withdrawal,
    /// Bank transfer to an account given with the request
    BankTransfer,
}

impl PayoutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutKind::Withdrawal => "withdrawal",
            PayoutKind::BankTransfer => "bank_transfer",
        }
    }
}

impl FromStr for PayoutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "withdrawal" => Ok(PayoutKind::Withdrawal),
            "bank_transfer" => Ok(PayoutKind::BankTransfer),
            _ => Err(format!("Invalid payout kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
    Cancelled,
}

impl PayoutStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PayoutStatus::Completed | PayoutStatus::Rejected | PayoutStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Rejected => "rejected",
            PayoutStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PayoutStatus::Pending),
            "processing" => Ok(PayoutStatus::Processing),
            "completed" => Ok(PayoutStatus::Completed),
            "rejected" => Ok(PayoutStatus::Rejected),
            "cancelled" => Ok(PayoutStatus::Cancelled),
            _ => Err(format!("Invalid payout status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub id: PayoutId,
    pub holder_id: ProfileId,
    pub holder_kind: HolderKind,
    pub user_id: UserId,
    pub kind: PayoutKind,
    pub amount: Decimal,
    pub status: PayoutStatus,
    /// IBAN or bank reference; opaque to the engine
    pub bank_account: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PayoutRequest {
    fn holder(&self) -> HolderRef {
        HolderRef {
            wallet_id: self.holder_id,
            user_id: self.user_id,
            kind: self.holder_kind,
        }
    }

    fn transition(&mut self, to: PayoutStatus, now: DateTime<Utc>) -> Result<(), EngineError> {
        let allowed = matches!(
            (self.status, to),
            (PayoutStatus::Pending, PayoutStatus::Processing)
                | (PayoutStatus::Pending, PayoutStatus::Rejected)
                | (PayoutStatus::Pending, PayoutStatus::Cancelled)
                | (PayoutStatus::Processing, PayoutStatus::Completed)
                | (PayoutStatus::Processing, PayoutStatus::Rejected)
        );
        if !allowed {
            return Err(EngineError::InvalidStateTransition(format!(
                "payout {} -> {}",
                self.status.as_str(),
                to.as_str()
            )));
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}

/// Payout lifecycle, one transaction per operation
pub struct PayoutService<S: Store> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store> PayoutService<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Debit the wallet and open a pending request
    pub async fn request(
        &self,
        holder: &dyn WalletHolder,
        kind: PayoutKind,
        amount: Decimal,
        bank_account: Option<String>,
    ) -> Result<PayoutRequest, EngineError> {
        let amount = money::validate_amount(amount)?;
        if kind == PayoutKind::BankTransfer && bank_account.as_deref().is_none_or(str::is_empty) {
            return Err(EngineError::MalformedPayload(
                "bank_account is required for bank transfers".to_string(),
            ));
        }

        let now = Utc::now();
        let payout = PayoutRequest {
            id: Uuid::new_v4(),
            holder_id: holder.wallet_id(),
            holder_kind: holder.holder_kind(),
            user_id: holder.user_id(),
            kind,
            amount,
            status: PayoutStatus::Pending,
            bank_account,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        Ledger::withdraw(
            &mut tx,
            holder,
            amount,
            EntryMeta::new(EntryReason::PayoutHold)
                .with_reference(payout.id)
                .with_description(kind.as_str()),
        )
        .await?;
        tx.insert_payout(&payout).await?;
        tx.commit().await?;

        info!(
            payout_id = %payout.id,
            holder_id = %payout.holder_id,
            amount = %amount,
            kind = kind.as_str(),
            "Payout requested, funds held"
        );
        self.notifier
            .notify(
                payout.user_id,
                NotificationEvent::PayoutRequested,
                serde_json::json!({
                    "payout_id": payout.id,
                    "amount": money::format_amount(amount),
                }),
            )
            .await;
        Ok(payout)
    }

    /// Operator picked the request up
    pub async fn start_processing(&self, id: PayoutId) -> Result<PayoutRequest, EngineError> {
        let mut tx = self.store.begin().await?;
        let mut payout = Self::load(&mut tx, id).await?;
        payout.transition(PayoutStatus::Processing, Utc::now())?;
        tx.save_payout(&payout).await?;
        tx.commit().await?;
        Ok(payout)
    }

    /// Money left the platform; the hold becomes final
    pub async fn complete(&self, id: PayoutId) -> Result<PayoutRequest, EngineError> {
        let mut tx = self.store.begin().await?;
        let mut payout = Self::load(&mut tx, id).await?;
        payout.transition(PayoutStatus::Completed, Utc::now())?;
        tx.save_payout(&payout).await?;
        tx.commit().await?;

        info!(payout_id = %id, amount = %payout.amount, "Payout completed");
        self.notifier
            .notify(
                payout.user_id,
                NotificationEvent::PayoutCompleted,
                serde_json::json!({ "payout_id": id }),
            )
            .await;
        Ok(payout)
    }

    /// Operator refused the request; held funds go back to the wallet
    pub async fn reject(
        &self,
        id: PayoutId,
        reason: impl Into<String>,
    ) -> Result<PayoutRequest, EngineError> {
        let reason = reason.into();
        let payout = self
            .refund(id, PayoutStatus::Rejected, Some(reason), None)
            .await?;
        self.notifier
            .notify(
                payout.user_id,
                NotificationEvent::PayoutRejected,
                serde_json::json!({
                    "payout_id": id,
                    "reason": payout.rejection_reason,
                }),
            )
            .await;
        Ok(payout)
    }

    /// Holder withdrew a still-pending request
    pub async fn cancel(
        &self,
        id: PayoutId,
        holder: &dyn WalletHolder,
    ) -> Result<PayoutRequest, EngineError> {
        self.refund(id, PayoutStatus::Cancelled, None, Some(holder.wallet_id()))
            .await
    }

    pub async fn history(&self, holder_id: ProfileId) -> Result<Vec<PayoutRequest>, EngineError> {
        let mut tx = self.store.begin().await?;
        tx.payouts_for_holder(holder_id).await
    }

    async fn refund(
        &self,
        id: PayoutId,
        to: PayoutStatus,
        reason: Option<String>,
        expected_holder: Option<ProfileId>,
    ) -> Result<PayoutRequest, EngineError> {
        let mut tx = self.store.begin().await?;
        let mut payout = Self::load(&mut tx, id).await?;
        if expected_holder.is_some_and(|holder_id| holder_id != payout.holder_id) {
            return Err(EngineError::PayoutNotFound(id.to_string()));
        }
        payout.transition(to, Utc::now())?;
        payout.rejection_reason = reason;

        Ledger::deposit(
            &mut tx,
            &payout.holder(),
            payout.amount,
            EntryMeta::new(EntryReason::PayoutRefund).with_reference(payout.id),
        )
        .await?;
        tx.save_payout(&payout).await?;
        tx.commit().await?;

        info!(
            payout_id = %id,
            status = to.as_str(),
            amount = %payout.amount,
            "Payout closed, funds returned"
        );
        Ok(payout)
    }

    async fn load(tx: &mut S::Tx, id: PayoutId) -> Result<PayoutRequest, EngineError> {
        tx.lock_payout(id)
            .await?
            .ok_or_else(|| EngineError::PayoutNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::store::MemoryStore;
    use crate::wallet::holder::InvestorProfile;

    async fn setup(balance: i64) -> (Arc<MemoryStore>, PayoutService<MemoryStore>, InvestorProfile) {
        let store = Arc::new(MemoryStore::new());
        let investor = InvestorProfile::new(3, "Payout tester");
        let mut tx = store.begin().await.unwrap();
        tx.insert_investor(&investor).await.unwrap();
        if balance > 0 {
            Ledger::deposit(
                &mut tx,
                &investor,
                Decimal::from(balance),
                EntryMeta::new(EntryReason::Adjustment),
            )
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
        let service = PayoutService::new(store.clone(), Arc::new(LogNotifier));
        (store, service, investor)
    }

    async fn balance(store: &MemoryStore, id: ProfileId) -> Decimal {
        let mut tx = store.begin().await.unwrap();
        tx.wallet_balance(id).await.unwrap()
    }

    #[tokio::test]
    async fn test_request_holds_funds_until_completed() {
        let (store, service, investor) = setup(500).await;

        let payout = service
            .request(&investor, PayoutKind::Withdrawal, Decimal::from(200), None)
            .await
            .unwrap();
        assert_eq!(payout.status, PayoutStatus::Pending);
        assert_eq!(balance(&store, investor.id).await, Decimal::from(300));

        service.start_processing(payout.id).await.unwrap();
        let done = service.complete(payout.id).await.unwrap();
        assert_eq!(done.status, PayoutStatus::Completed);
        assert_eq!(balance(&store, investor.id).await, Decimal::from(300));
    }

    #[tokio::test]
    async fn test_reject_refunds() {
        let (store, service, investor) = setup(500).await;
        let payout = service
            .request(
                &investor,
                PayoutKind::BankTransfer,
                Decimal::from(120),
                Some("SA0380000000608010167519".to_string()),
            )
            .await
            .unwrap();
        service.start_processing(payout.id).await.unwrap();

        let rejected = service.reject(payout.id, "IBAN mismatch").await.unwrap();
        assert_eq!(rejected.status, PayoutStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("IBAN mismatch"));
        assert_eq!(balance(&store, investor.id).await, Decimal::from(500));

        // Terminal: a second rejection must not refund twice
        assert!(matches!(
            service.reject(payout.id, "again").await,
            Err(EngineError::InvalidStateTransition(_))
        ));
        assert_eq!(balance(&store, investor.id).await, Decimal::from(500));
    }

    #[tokio::test]
    async fn test_cancel_only_while_pending() {
        let (store, service, investor) = setup(100).await;
        let payout = service
            .request(&investor, PayoutKind::Withdrawal, Decimal::from(100), None)
            .await
            .unwrap();
        assert_eq!(balance(&store, investor.id).await, Decimal::ZERO);

        let cancelled = service.cancel(payout.id, &investor).await.unwrap();
        assert_eq!(cancelled.status, PayoutStatus::Cancelled);
        assert_eq!(balance(&store, investor.id).await, Decimal::from(100));

        let second = service
            .request(&investor, PayoutKind::Withdrawal, Decimal::from(50), None)
            .await
            .unwrap();
        service.start_processing(second.id).await.unwrap();
        assert!(service.cancel(second.id, &investor).await.is_err());
    }

    #[tokio::test]
    async fn test_request_without_funds_fails_cleanly() {
        let (_store, service, investor) = setup(0).await;
        let err = service
            .request(&investor, PayoutKind::Withdrawal, Decimal::from(10), None)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::EmptyBalance);
        assert!(service.history(investor.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bank_transfer_requires_account() {
        let (_store, service, investor) = setup(100).await;
        assert!(matches!(
            service
                .request(&investor, PayoutKind::BankTransfer, Decimal::from(10), None)
                .await,
            Err(EngineError::MalformedPayload(_))
        ));
    }
}
