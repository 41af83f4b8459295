//! Investment creation and cancellation
//!
//! [`InvestmentCreator::create`] runs inside the caller's transaction so the
//! webhook reconciler can bundle it with the intention update. The
//! [`InvestmentService`] wraps it for the wallet-funded path and owns
//! notification.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use super::models::{Investment, InvestmentAmounts, InvestmentStatus, InvestmentType, PaymentChannel};
use super::validator::InvestmentValidator;
use crate::core_types::{IntentionId, InvestmentId, OpportunityId, ProfileId};
use crate::error::EngineError;
use crate::money;
use crate::notify::{NotificationEvent, Notifier};
use crate::store::{Store, StoreTx};
use crate::wallet::ledger::Ledger;
use crate::wallet::models::{EntryMeta, EntryReason};

/// Who buys how many shares of what
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvestmentRequest {
    pub investor_id: ProfileId,
    pub opportunity_id: OpportunityId,
    pub shares: i64,
    pub investment_type: InvestmentType,
}

/// Where the money for an investment comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Funding {
    /// Debit the investor wallet for `total_payment_required`
    Wallet,
    /// Already captured by the gateway for this intention; no wallet debit
    Gateway(IntentionId),
}

pub struct InvestmentCreator;

impl InvestmentCreator {
    /// Validate, debit (wallet funding only), record and reserve, all in `tx`.
    ///
    /// Any failure leaves `tx` with partial writes; the caller must drop it.
    pub async fn create<T: StoreTx>(
        tx: &mut T,
        request: &InvestmentRequest,
        funding: Funding,
        now: DateTime<Utc>,
    ) -> Result<Investment, EngineError> {
        let opportunity = tx
            .lock_opportunity(request.opportunity_id)
            .await?
            .ok_or_else(|| EngineError::OpportunityNotFound(request.opportunity_id.to_string()))?;
        let investor = tx
            .investor(request.investor_id)
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(request.investor_id.to_string()))?;

        let (skip_wallet, channel, intention_id) = match funding {
            Funding::Wallet => (false, PaymentChannel::Wallet, None),
            Funding::Gateway(id) => (true, PaymentChannel::Gateway, Some(id)),
        };
        let wallet = if skip_wallet {
            None
        } else {
            tx.lock_wallet(investor.id).await?
        };

        InvestmentValidator::validate(
            &investor,
            &opportunity,
            wallet.as_ref(),
            request.shares,
            request.investment_type,
            skip_wallet,
            now,
        )?;

        let amounts =
            InvestmentAmounts::compute(&opportunity, request.shares, request.investment_type);
        let investment = Investment::new(
            &opportunity,
            investor.id,
            investor.user_id,
            request.shares,
            request.investment_type,
            channel,
            intention_id,
            now,
        );

        if !skip_wallet {
            Ledger::withdraw(
                tx,
                &investor,
                amounts.total_payment_required,
                EntryMeta::new(EntryReason::Investment)
                    .with_reference(investment.id)
                    .with_description(opportunity.title.clone())
                    .with_extra(serde_json::json!({
                        "opportunity_id": opportunity.id,
                        "shares": request.shares,
                        "investment_type": request.investment_type.as_str(),
                    })),
            )
            .await?;
        }

        tx.insert_investment(&investment).await?;
        let updated = tx
            .reserve_shares(opportunity.id, request.shares, now)
            .await?;

        info!(
            investment_id = %investment.id,
            opportunity_id = %opportunity.id,
            investor_id = %investor.id,
            shares = request.shares,
            total = %amounts.total_payment_required,
            channel = channel.as_str(),
            available_after = updated.available_shares,
            "Investment created"
        );
        Ok(investment)
    }
}

pub struct InvestmentService<S: Store> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store> InvestmentService<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Wallet-funded investment in one transaction
    pub async fn invest(&self, request: &InvestmentRequest) -> Result<Investment, EngineError> {
        let mut tx = self.store.begin().await?;
        let investment =
            InvestmentCreator::create(&mut tx, request, Funding::Wallet, Utc::now()).await?;
        tx.commit().await?;

        notify_created(self.notifier.as_ref(), &investment).await;
        Ok(investment)
    }

    pub async fn investment(&self, id: InvestmentId) -> Result<Investment, EngineError> {
        let mut tx = self.store.begin().await?;
        tx.investment(id)
            .await?
            .ok_or_else(|| EngineError::InvestmentNotFound(id.to_string()))
    }

    /// Cancel an untouched investment: refund what was paid and put the
    /// shares back into inventory.
    ///
    /// Only active, undistributed investments qualify, and only before their
    /// merchandise arrived or their returns were recorded.
    pub async fn cancel(&self, id: InvestmentId) -> Result<Investment, EngineError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let opportunity_id = tx
            .investment(id)
            .await?
            .ok_or_else(|| EngineError::InvestmentNotFound(id.to_string()))?
            .opportunity_id;
        let mut opportunity = tx
            .lock_opportunity(opportunity_id)
            .await?
            .ok_or_else(|| EngineError::OpportunityNotFound(opportunity_id.to_string()))?;
        let mut investment = tx
            .lock_investment(id)
            .await?
            .ok_or_else(|| EngineError::InvestmentNotFound(id.to_string()))?;

        if investment.status != InvestmentStatus::Active {
            return Err(EngineError::InvestmentNotActive);
        }
        if investment.is_distributed() {
            return Err(EngineError::AlreadyDistributed);
        }
        if investment.merchandise_arrived() {
            return Err(EngineError::MerchandiseAlreadyArrived);
        }
        if investment.returns_recorded() {
            return Err(EngineError::ReturnsAlreadyRecorded);
        }

        let investor = tx
            .investor(investment.investor_profile_id)
            .await?
            .ok_or_else(|| {
                EngineError::ProfileNotFound(investment.investor_profile_id.to_string())
            })?;

        opportunity.release_shares(investment.shares, now)?;
        tx.save_opportunity(&opportunity).await?;

        Ledger::deposit(
            &mut tx,
            &investor,
            investment.total_payment_required,
            EntryMeta::new(EntryReason::InvestmentRefund).with_reference(investment.id),
        )
        .await?;

        investment.status = InvestmentStatus::Cancelled;
        investment.cancelled_at = Some(now);
        investment.updated_at = now;
        tx.save_investment(&investment).await?;
        tx.commit().await?;

        info!(
            investment_id = %id,
            opportunity_id = %opportunity.id,
            released = investment.shares,
            refunded = %investment.total_payment_required,
            "Investment cancelled"
        );
        self.notifier
            .notify(
                investment.investor_user_id,
                NotificationEvent::InvestmentCancelled,
                serde_json::json!({
                    "investment_id": investment.id,
                    "refunded": money::format_amount(investment.total_payment_required),
                }),
            )
            .await;
        Ok(investment)
    }
}

/// Fire the investment-created notification (after commit)
pub async fn notify_created(notifier: &dyn Notifier, investment: &Investment) {
    notifier
        .notify(
            investment.investor_user_id,
            NotificationEvent::InvestmentCreated,
            serde_json::json!({
                "investment_id": investment.id,
                "opportunity_id": investment.opportunity_id,
                "shares": investment.shares,
                "investment_type": investment.investment_type.as_str(),
                "total_payment_required": money::format_amount(investment.total_payment_required),
            }),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelNotifier;
    use crate::opportunity::OpportunityStatus;
    use crate::store::MemoryStore;
    use crate::test_support::{seed_investor, seed_opportunity};
    use rust_decimal::Decimal;

    fn service(store: &Arc<MemoryStore>) -> (
        InvestmentService<MemoryStore>,
        tokio::sync::mpsc::UnboundedReceiver<crate::notify::Notification>,
    ) {
        let (notifier, rx) = ChannelNotifier::new();
        (InvestmentService::new(store.clone(), Arc::new(notifier)), rx)
    }

    fn request(
        investor_id: ProfileId,
        opportunity_id: OpportunityId,
        shares: i64,
    ) -> InvestmentRequest {
        InvestmentRequest {
            investor_id,
            opportunity_id,
            shares,
            investment_type: InvestmentType::AuthorizedSale,
        }
    }

    async fn available(store: &MemoryStore, id: OpportunityId) -> (i64, OpportunityStatus) {
        let mut tx = store.begin().await.unwrap();
        let opp = tx.opportunity(id).await.unwrap().unwrap();
        (opp.available_shares, opp.status)
    }

    #[tokio::test]
    async fn test_last_shares_scenario() {
        let store = Arc::new(MemoryStore::new());
        let (service, mut rx) = service(&store);
        let opp = seed_opportunity(&store, 5, Decimal::from(10), |_| {}).await;
        let a = seed_investor(&store, 1, Decimal::from(100)).await;
        let b = seed_investor(&store, 2, Decimal::from(100)).await;

        service.invest(&request(a.id, opp.id, 3)).await.unwrap();
        assert_eq!(available(&store, opp.id).await, (2, OpportunityStatus::Open));

        assert_eq!(
            service.invest(&request(b.id, opp.id, 3)).await,
            Err(EngineError::InsufficientShares {
                requested: 3,
                available: 2
            })
        );

        service.invest(&request(b.id, opp.id, 2)).await.unwrap();
        assert_eq!(
            available(&store, opp.id).await,
            (0, OpportunityStatus::Completed)
        );

        // Two successful investments, two notifications
        assert_eq!(rx.try_recv().unwrap().event, NotificationEvent::InvestmentCreated);
        assert_eq!(rx.try_recv().unwrap().user_id, 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_self_sale_amounts_and_debit() {
        let store = Arc::new(MemoryStore::new());
        let (service, _rx) = service(&store);
        let opp = seed_opportunity(&store, 10, Decimal::from(50), |o| {
            o.shipping_fee_per_share = Decimal::from(2);
            o.expected_net_profit_per_share = Decimal::new(125, 1);
        })
        .await;
        let investor = seed_investor(&store, 1, Decimal::from(500)).await;

        let investment = service
            .invest(&InvestmentRequest {
                investor_id: investor.id,
                opportunity_id: opp.id,
                shares: 4,
                investment_type: InvestmentType::SelfSale,
            })
            .await
            .unwrap();

        assert_eq!(investment.amount, Decimal::from(200));
        assert_eq!(investment.total_payment_required, Decimal::from(208));
        assert_eq!(investment.expected_net_profit_per_share, Decimal::new(125, 1));
        assert_eq!(investment.payment_channel, PaymentChannel::Wallet);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.wallet_balance(investor.id).await.unwrap(),
            Decimal::from(292)
        );
    }

    #[tokio::test]
    async fn test_insufficient_funds_aborts_everything() {
        let store = Arc::new(MemoryStore::new());
        let (service, mut rx) = service(&store);
        let opp = seed_opportunity(&store, 10, Decimal::from(10), |_| {}).await;
        let investor = seed_investor(&store, 1, Decimal::from(25)).await;

        assert_eq!(
            service.invest(&request(investor.id, opp.id, 3)).await,
            Err(EngineError::InsufficientFunds {
                balance: Decimal::from(25),
                required: Decimal::from(30)
            })
        );
        assert_eq!(available(&store, opp.id).await.0, 10);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.investments_for_opportunity(opp.id).await.unwrap().is_empty());
        assert_eq!(tx.wallet_entries(investor.id).await.unwrap().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_wallet() {
        let store = Arc::new(MemoryStore::new());
        let (service, _rx) = service(&store);
        let opp = seed_opportunity(&store, 10, Decimal::from(10), |_| {}).await;
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;

        assert_eq!(
            service.invest(&request(investor.id, opp.id, 1)).await,
            Err(EngineError::EmptyBalance)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_investors_never_oversell() {
        let store = Arc::new(MemoryStore::new());
        let (service, _rx) = service(&store);
        let service = Arc::new(service);
        let opp = seed_opportunity(&store, 7, Decimal::from(10), |_| {}).await;

        let mut investors = Vec::new();
        for user_id in 1..=10 {
            investors.push(seed_investor(&store, user_id, Decimal::from(100)).await);
        }

        let mut handles = Vec::new();
        for investor in &investors {
            let service = service.clone();
            let req = request(investor.id, opp.id, 2);
            handles.push(tokio::spawn(async move { service.invest(&req).await }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(EngineError::InsufficientShares { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        // 7 shares, 2 per request: three fit, the fourth would oversell
        assert_eq!(succeeded, 3);
        let (left, _) = available(&store, opp.id).await;
        assert_eq!(left, 1);

        let mut tx = store.begin().await.unwrap();
        let sold: i64 = tx
            .investments_for_opportunity(opp.id)
            .await
            .unwrap()
            .iter()
            .map(|i| i.shares)
            .sum();
        assert_eq!(sold + left, 7);
    }

    #[tokio::test]
    async fn test_cancel_refunds_and_releases() {
        let store = Arc::new(MemoryStore::new());
        let (service, mut rx) = service(&store);
        let opp = seed_opportunity(&store, 4, Decimal::from(10), |_| {}).await;
        let investor = seed_investor(&store, 1, Decimal::from(40)).await;

        let investment = service
            .invest(&request(investor.id, opp.id, 4))
            .await
            .unwrap();
        assert_eq!(
            available(&store, opp.id).await,
            (0, OpportunityStatus::Completed)
        );

        let cancelled = service.cancel(investment.id).await.unwrap();
        assert_eq!(cancelled.status, InvestmentStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(available(&store, opp.id).await, (4, OpportunityStatus::Open));

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.wallet_balance(investor.id).await.unwrap(),
            Decimal::from(40)
        );
        drop(tx);

        assert_eq!(
            service.cancel(investment.id).await,
            Err(EngineError::InvestmentNotActive)
        );
        let _created = rx.try_recv().unwrap();
        assert_eq!(
            rx.try_recv().unwrap().event,
            NotificationEvent::InvestmentCancelled
        );
    }

    #[tokio::test]
    async fn test_cancel_after_arrival_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (service, _rx) = service(&store);
        let opp = seed_opportunity(&store, 4, Decimal::from(10), |_| {}).await;
        let investor = seed_investor(&store, 1, Decimal::from(40)).await;
        let mut investment = service
            .invest(&InvestmentRequest {
                investment_type: InvestmentType::SelfSale,
                ..request(investor.id, opp.id, 2)
            })
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        investment.merchandise_status = Some(super::super::models::MerchandiseStatus::Arrived);
        tx.save_investment(&investment).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            service.cancel(investment.id).await,
            Err(EngineError::MerchandiseAlreadyArrived)
        );
        assert_eq!(available(&store, opp.id).await.0, 2);
    }
}
