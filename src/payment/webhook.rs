//! Webhook reconciler
//!
//! Gateway callbacks are asynchronous, may be duplicated and may arrive in
//! any order. The financial effect of a completed intention is applied
//! exactly once: the effect and the `is_executed = true` flip commit in the
//! same transaction, under the intention row lock.
//!
//! ```text
//! CREATED ──pending──→ ACTIVE
//!    │                   │
//!    ├──success──────────┴──→ COMPLETED ──effect ok──→ is_executed
//!    │                   │        └─────effect err──→ attempts+1, last_error
//!    └──failure──────────┴──→ FAILED
//!  (timer) ─────────────────→ EXPIRED
//! ```
//!
//! A verified success completes failed and expired intentions too: the
//! gateway already captured the money. Failure and pending callbacks never
//! move an intention out of a terminal state.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::signature::WebhookSignature;
use super::types::{IntentionStatus, IntentionType, PaymentIntention};
use crate::core_types::{IntentionId, InvestmentId};
use crate::error::{EngineError, ErrorKind};
use crate::investment::models::Investment;
use crate::investment::service::{Funding, InvestmentCreator, InvestmentRequest, notify_created};
use crate::money;
use crate::notify::{NotificationEvent, Notifier};
use crate::store::{Store, StoreTx};
use crate::wallet::holder::HolderRef;
use crate::wallet::ledger::Ledger;
use crate::wallet::models::{EntryMeta, EntryReason};

/// Callback accepted (HTTP 200). Every variant is acknowledged so the
/// gateway stops retrying.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Deferred effect applied now
    Executed {
        intention_id: IntentionId,
        investment_id: Option<InvestmentId>,
    },
    /// Replay of an already executed intention
    AlreadyExecuted { intention_id: IntentionId },
    /// Non-final status change (or none) recorded
    StatusRecorded {
        intention_id: IntentionId,
        status: IntentionStatus,
    },
    /// Completed, effect failed; left for retry / manual reconciliation
    ExecutionFailed {
        intention_id: IntentionId,
        error: EngineError,
    },
    /// Callback does not match any stored intention
    UnknownIntention { reference: String },
    /// Paid amount differs from the intention; nothing applied
    AmountMismatch {
        intention_id: IntentionId,
        expected_cents: i64,
        received_cents: i64,
    },
    /// TOKEN callbacks and unknown event types
    Acknowledged { event_type: String },
}

/// Callback refused
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WebhookError {
    #[error("Malformed webhook payload: {0}")]
    Malformed(String),

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Webhook storage failure: {0}")]
    Storage(EngineError),
}

impl WebhookError {
    /// 400 / 401 / 500; the gateway retries on anything non-2xx
    pub fn http_status(&self) -> u16 {
        match self {
            WebhookError::Malformed(_) => 400,
            WebhookError::InvalidSignature => 401,
            WebhookError::Storage(_) => 500,
        }
    }
}

impl From<EngineError> for WebhookError {
    fn from(err: EngineError) -> Self {
        WebhookError::Storage(err)
    }
}

#[derive(Debug, Deserialize)]
struct CallbackOrder {
    id: i64,
    #[serde(default)]
    merchant_order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionCallback {
    id: i64,
    success: bool,
    pending: bool,
    amount_cents: i64,
    order: CallbackOrder,
    #[serde(default)]
    special_reference: Option<String>,
}

impl TransactionCallback {
    fn target_status(&self) -> IntentionStatus {
        match (self.success, self.pending) {
            (_, true) => IntentionStatus::Active,
            (true, false) => IntentionStatus::Completed,
            (false, false) => IntentionStatus::Failed,
        }
    }

    /// Our intention id as echoed by the gateway, if any
    fn reference(&self) -> Option<IntentionId> {
        let parse = |raw: &Option<String>| raw.as_deref().and_then(|r| Uuid::parse_str(r).ok());
        parse(&self.order.merchant_order_id).or_else(|| parse(&self.special_reference))
    }
}

/// Summary of a retry pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub attempted: usize,
    pub executed: usize,
    pub failed: usize,
}

pub struct WebhookReconciler<S: Store> {
    store: Arc<S>,
    signature: WebhookSignature,
    notifier: Arc<dyn Notifier>,
    max_attempts: i32,
}

impl<S: Store> WebhookReconciler<S> {
    pub fn new(
        store: Arc<S>,
        signature: WebhookSignature,
        notifier: Arc<dyn Notifier>,
        max_attempts: i32,
    ) -> Self {
        Self {
            store,
            signature,
            notifier,
            max_attempts,
        }
    }

    /// Process one callback body.
    ///
    /// Order: envelope check, unknown types acknowledged, signature check,
    /// then the intention lookup. Nothing is read or written before the
    /// signature verifies.
    pub async fn handle(
        &self,
        payload: &Value,
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| WebhookError::Malformed("missing `type`".to_string()))?;
        let obj = payload
            .get("obj")
            .filter(|o| o.is_object())
            .ok_or_else(|| WebhookError::Malformed("missing `obj`".to_string()))?;

        if WebhookSignature::fields_for(event_type).is_none() {
            info!(event_type, "Ignoring unknown webhook event type");
            return Ok(WebhookOutcome::Acknowledged {
                event_type: event_type.to_string(),
            });
        }

        let signature = signature.ok_or(WebhookError::InvalidSignature)?;
        if !self.signature.verify(event_type, obj, signature) {
            warn!(event_type, "Rejected webhook with invalid signature");
            return Err(WebhookError::InvalidSignature);
        }

        if event_type != "TRANSACTION" {
            debug!(event_type, "Webhook acknowledged without effect");
            return Ok(WebhookOutcome::Acknowledged {
                event_type: event_type.to_string(),
            });
        }

        let callback: TransactionCallback = serde_json::from_value(obj.clone())
            .map_err(|e| WebhookError::Malformed(format!("transaction: {}", e)))?;
        self.handle_transaction(&callback).await
    }

    async fn handle_transaction(
        &self,
        callback: &TransactionCallback,
    ) -> Result<WebhookOutcome, WebhookError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let found = match callback.reference() {
            Some(id) => tx.lock_intention(id).await?,
            None => None,
        };
        let found = match found {
            Some(intention) => Some(intention),
            None => tx.lock_intention_by_gateway_order(callback.order.id).await?,
        };
        let Some(mut intention) = found else {
            let reference = callback
                .reference()
                .map(|id| id.to_string())
                .unwrap_or_else(|| format!("order:{}", callback.order.id));
            error!(
                error_code = "UNKNOWN_INTENTION",
                reference = %reference,
                transaction_id = callback.id,
                success = callback.success,
                amount_cents = callback.amount_cents,
                "Webhook references an unknown intention"
            );
            return Ok(WebhookOutcome::UnknownIntention { reference });
        };

        if intention.is_executed {
            debug!(intention_id = %intention.id, "Duplicate webhook for executed intention");
            return Ok(WebhookOutcome::AlreadyExecuted {
                intention_id: intention.id,
            });
        }

        let target = callback.target_status();
        if target == IntentionStatus::Completed {
            let expected = money::to_minor_units(intention.amount).map_err(EngineError::from)?;
            if callback.amount_cents != expected {
                error!(
                    intention_id = %intention.id,
                    expected_cents = expected,
                    received_cents = callback.amount_cents,
                    transaction_id = callback.id,
                    "Paid amount does not match the intention; not applying"
                );
                return Ok(WebhookOutcome::AmountMismatch {
                    intention_id: intention.id,
                    expected_cents: expected,
                    received_cents: callback.amount_cents,
                });
            }
        }

        if intention.gateway_order_id.is_none() {
            intention.gateway_order_id = Some(callback.order.id);
        }

        match target {
            IntentionStatus::Completed => {
                if intention.status != IntentionStatus::Completed {
                    intention.status = IntentionStatus::Completed;
                    intention.completed_at = Some(now);
                }
                intention.gateway_transaction_id = Some(callback.id.to_string());
                intention.updated_at = now;

                if intention.execution_attempts >= self.max_attempts {
                    // Retries exhausted: record the completion only
                    tx.save_intention(&intention).await?;
                    tx.commit().await?;
                    error!(
                        intention_id = %intention.id,
                        attempts = intention.execution_attempts,
                        last_error = ?intention.last_error,
                        "Completed intention needs manual reconciliation"
                    );
                    return Ok(WebhookOutcome::StatusRecorded {
                        intention_id: intention.id,
                        status: intention.status,
                    });
                }
                Ok(self.execute(tx, intention, now).await?)
            }
            _ => {
                // Terminal states absorb failure / pending callbacks
                let advanced = match (intention.status, target) {
                    (IntentionStatus::Created, _) => true,
                    (IntentionStatus::Active, IntentionStatus::Failed) => true,
                    _ => false,
                };
                if advanced {
                    intention.status = target;
                    intention.gateway_transaction_id = Some(callback.id.to_string());
                }
                intention.updated_at = now;
                tx.save_intention(&intention).await?;
                tx.commit().await?;

                info!(
                    intention_id = %intention.id,
                    status = intention.status.as_str(),
                    advanced,
                    "Webhook status recorded"
                );
                Ok(WebhookOutcome::StatusRecorded {
                    intention_id: intention.id,
                    status: intention.status,
                })
            }
        }
    }

    /// Re-run the deferred effect of completed-but-unexecuted intentions
    /// that have not used up their attempts.
    pub async fn retry_unexecuted(&self, limit: usize) -> Result<RetryReport, EngineError> {
        let candidates = {
            let mut tx = self.store.begin().await?;
            tx.unexecuted_intentions(self.max_attempts, limit).await?
        };

        let mut report = RetryReport::default();
        for candidate in candidates {
            let mut tx = self.store.begin().await?;
            let Some(intention) = tx.lock_intention(candidate.id).await? else {
                continue;
            };
            if !intention.awaits_execution() || intention.execution_attempts >= self.max_attempts {
                continue;
            }

            report.attempted += 1;
            match self.execute(tx, intention, Utc::now()).await? {
                WebhookOutcome::Executed { .. } => report.executed += 1,
                WebhookOutcome::ExecutionFailed { .. } => report.failed += 1,
                _ => {}
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                executed = report.executed,
                failed = report.failed,
                "Retried unexecuted intentions"
            );
        }
        Ok(report)
    }

    /// Apply the effect and flip `is_executed` in `tx`, or roll back and
    /// record the failure in a fresh transaction.
    ///
    /// Storage failures propagate (nothing is recorded) so the caller can
    /// make the gateway retry.
    async fn execute(
        &self,
        mut tx: S::Tx,
        mut intention: PaymentIntention,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, EngineError> {
        match Self::apply_effect(&mut tx, &intention, now).await {
            Ok(investment) => {
                intention.is_executed = true;
                intention.executed_at = Some(now);
                intention.execution_attempts += 1;
                intention.last_error = None;
                intention.investment_id = investment.as_ref().map(|i| i.id);
                intention.updated_at = now;
                tx.save_intention(&intention).await?;
                tx.commit().await?;

                info!(
                    intention_id = %intention.id,
                    intention_type = intention.intention_type.as_str(),
                    amount = %intention.amount,
                    investment_id = ?intention.investment_id,
                    "Payment intention executed"
                );
                self.notify_executed(&intention, investment.as_ref()).await;
                Ok(WebhookOutcome::Executed {
                    intention_id: intention.id,
                    investment_id: intention.investment_id,
                })
            }
            Err(e) if e.kind() == ErrorKind::Storage => Err(e),
            Err(e) => {
                drop(tx);
                self.record_failure(&intention, &e, now).await
            }
        }
    }

    async fn apply_effect(
        tx: &mut S::Tx,
        intention: &PaymentIntention,
        now: DateTime<Utc>,
    ) -> Result<Option<Investment>, EngineError> {
        match intention.intention_type {
            IntentionType::WalletCharge => {
                let wallet = tx
                    .lock_wallet(intention.profile_id)
                    .await?
                    .ok_or(EngineError::WalletUnavailable)?;
                Ledger::deposit(
                    tx,
                    &HolderRef::from(&wallet),
                    intention.amount,
                    EntryMeta::new(EntryReason::WalletCharge)
                        .with_reference(intention.id)
                        .with_extra(serde_json::json!({
                            "gateway_transaction_id": intention.gateway_transaction_id,
                        })),
                )
                .await?;
                Ok(None)
            }
            IntentionType::Investment => {
                let extras = intention.extras.require_investment()?;
                let request = InvestmentRequest {
                    investor_id: intention.profile_id,
                    opportunity_id: extras.opportunity_id,
                    shares: extras.shares,
                    investment_type: extras.investment_type,
                };
                let investment =
                    InvestmentCreator::create(tx, &request, Funding::Gateway(intention.id), now)
                        .await?;
                Ok(Some(investment))
            }
        }
    }

    async fn record_failure(
        &self,
        attempted: &PaymentIntention,
        cause: &EngineError,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, EngineError> {
        let mut tx = self.store.begin().await?;
        let mut intention = tx
            .lock_intention(attempted.id)
            .await?
            .ok_or_else(|| EngineError::IntentionNotFound(attempted.id.to_string()))?;
        if intention.is_executed {
            return Ok(WebhookOutcome::AlreadyExecuted {
                intention_id: intention.id,
            });
        }

        intention.status = IntentionStatus::Completed;
        intention.completed_at = intention.completed_at.or(attempted.completed_at);
        intention.gateway_order_id = intention.gateway_order_id.or(attempted.gateway_order_id);
        intention.gateway_transaction_id = attempted.gateway_transaction_id.clone();
        intention.execution_attempts += 1;
        intention.last_error = Some(format!("{}: {}", cause.code(), cause));
        intention.updated_at = now;
        tx.save_intention(&intention).await?;
        tx.commit().await?;

        error!(
            intention_id = %intention.id,
            user_id = intention.user_id,
            profile_id = %intention.profile_id,
            intention_type = intention.intention_type.as_str(),
            amount = %intention.amount,
            extras = ?intention.extras,
            gateway_transaction_id = ?intention.gateway_transaction_id,
            attempts = intention.execution_attempts,
            max_attempts = self.max_attempts,
            error_code = cause.code(),
            error = %cause,
            "Deferred payment effect failed; intention completed but not executed"
        );
        Ok(WebhookOutcome::ExecutionFailed {
            intention_id: intention.id,
            error: cause.clone(),
        })
    }

    async fn notify_executed(&self, intention: &PaymentIntention, investment: Option<&Investment>) {
        match investment {
            Some(investment) => notify_created(self.notifier.as_ref(), investment).await,
            None => {
                self.notifier
                    .notify(
                        intention.user_id,
                        NotificationEvent::WalletCharged,
                        serde_json::json!({
                            "intention_id": intention.id,
                            "amount": money::format_amount(intention.amount),
                        }),
                    )
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investment::models::{InvestmentType, PaymentChannel};
    use crate::notify::{ChannelNotifier, Notification};
    use crate::payment::types::IntentionExtras;
    use crate::store::MemoryStore;
    use crate::test_support::{balance, seed_investor, seed_opportunity};
    use rust_decimal::Decimal;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    const SECRET: &str = "webhook-secret";

    fn reconciler(
        store: &Arc<MemoryStore>,
    ) -> (WebhookReconciler<MemoryStore>, UnboundedReceiver<Notification>) {
        let (notifier, rx) = ChannelNotifier::new();
        (
            WebhookReconciler::new(
                store.clone(),
                WebhookSignature::new(SECRET),
                Arc::new(notifier),
                3,
            ),
            rx,
        )
    }

    async fn seed_intention(
        store: &MemoryStore,
        profile_id: Uuid,
        intention_type: IntentionType,
        amount: Decimal,
        extras: IntentionExtras,
    ) -> PaymentIntention {
        let now = Utc::now();
        let intention = PaymentIntention {
            id: Uuid::new_v4(),
            user_id: 1,
            profile_id,
            intention_type,
            amount,
            currency: "SAR".to_string(),
            status: IntentionStatus::Created,
            gateway_intention_id: "pi_1".to_string(),
            gateway_order_id: Some(777),
            client_secret: "cs".to_string(),
            extras,
            is_executed: false,
            execution_attempts: 0,
            last_error: None,
            gateway_transaction_id: None,
            investment_id: None,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::hours(24),
            completed_at: None,
            executed_at: None,
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_intention(&intention).await.unwrap();
        tx.commit().await.unwrap();
        intention
    }

    fn callback(intention: &PaymentIntention, success: bool, pending: bool) -> (Value, String) {
        let obj = json!({
            "id": 9001,
            "pending": pending,
            "amount_cents": money::to_minor_units(intention.amount).unwrap(),
            "success": success,
            "is_auth": false,
            "is_capture": false,
            "is_standalone_payment": true,
            "is_voided": false,
            "is_refunded": false,
            "is_3d_secure": true,
            "integration_id": 1,
            "has_parent_transaction": false,
            "order": { "id": 777, "merchant_order_id": intention.id.to_string() },
            "created_at": "2025-01-01T10:00:00",
            "currency": "SAR",
            "source_data": { "pan": "1111", "type": "card", "sub_type": "Visa" },
            "error_occured": false,
            "owner": 1
        });
        let sig = WebhookSignature::new(SECRET)
            .sign("TRANSACTION", &obj)
            .unwrap();
        (json!({ "type": "TRANSACTION", "obj": obj }), sig)
    }

    async fn stored(store: &MemoryStore, id: IntentionId) -> PaymentIntention {
        let mut tx = store.begin().await.unwrap();
        tx.intention(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_wallet_charge_replay_credits_once() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, mut rx) = reconciler(&store);
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;
        let intention = seed_intention(
            &store,
            investor.id,
            IntentionType::WalletCharge,
            Decimal::from(100),
            IntentionExtras::default(),
        )
        .await;
        let (payload, sig) = callback(&intention, true, false);

        let first = reconciler.handle(&payload, Some(&sig)).await.unwrap();
        assert!(matches!(first, WebhookOutcome::Executed { investment_id: None, .. }));
        let second = reconciler.handle(&payload, Some(&sig)).await.unwrap();
        assert_eq!(
            second,
            WebhookOutcome::AlreadyExecuted {
                intention_id: intention.id
            }
        );

        assert_eq!(balance(&store, investor.id).await, Decimal::from(100));
        let after = stored(&store, intention.id).await;
        assert!(after.is_executed);
        assert_eq!(after.execution_attempts, 1);
        assert_eq!(after.gateway_transaction_id.as_deref(), Some("9001"));

        assert_eq!(rx.try_recv().unwrap().event, NotificationEvent::WalletCharged);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_investment_intention_creates_without_debit() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, mut rx) = reconciler(&store);
        let opp = seed_opportunity(&store, 10, Decimal::from(50), |o| {
            o.shipping_fee_per_share = Decimal::from(2);
        })
        .await;
        let investor = seed_investor(&store, 1, Decimal::from(5)).await;
        let intention = seed_intention(
            &store,
            investor.id,
            IntentionType::Investment,
            Decimal::from(208),
            IntentionExtras::investment(opp.id, 4, InvestmentType::SelfSale),
        )
        .await;
        let (payload, sig) = callback(&intention, true, false);

        let outcome = reconciler.handle(&payload, Some(&sig)).await.unwrap();
        let WebhookOutcome::Executed {
            investment_id: Some(investment_id),
            ..
        } = outcome
        else {
            panic!("expected execution, got {outcome:?}");
        };

        let mut tx = store.begin().await.unwrap();
        let investment = tx.investment(investment_id).await.unwrap().unwrap();
        assert_eq!(investment.payment_channel, PaymentChannel::Gateway);
        assert_eq!(investment.payment_intention_id, Some(intention.id));
        assert_eq!(investment.total_payment_required, Decimal::from(208));
        assert_eq!(tx.opportunity(opp.id).await.unwrap().unwrap().available_shares, 6);
        // Wallet untouched
        assert_eq!(tx.wallet_balance(investor.id).await.unwrap(), Decimal::from(5));
        drop(tx);

        // Replays never create a second investment
        for _ in 0..3 {
            reconciler.handle(&payload, Some(&sig)).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.investments_for_opportunity(opp.id).await.unwrap().len(), 1);
        assert_eq!(rx.try_recv().unwrap().event, NotificationEvent::InvestmentCreated);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sold_out_before_webhook_leaves_completed_unexecuted() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _rx) = reconciler(&store);
        let opp = seed_opportunity(&store, 2, Decimal::from(10), |_| {}).await;
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;
        let intention = seed_intention(
            &store,
            investor.id,
            IntentionType::Investment,
            Decimal::from(30),
            IntentionExtras::investment(opp.id, 3, InvestmentType::AuthorizedSale),
        )
        .await;
        let (payload, sig) = callback(&intention, true, false);

        let outcome = reconciler.handle(&payload, Some(&sig)).await.unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::ExecutionFailed {
                error: EngineError::InsufficientShares { .. },
                ..
            }
        ));

        let after = stored(&store, intention.id).await;
        assert_eq!(after.status, IntentionStatus::Completed);
        assert!(!after.is_executed);
        assert!(after.awaits_execution());
        assert_eq!(after.execution_attempts, 1);
        assert!(after.last_error.unwrap().starts_with("INSUFFICIENT_SHARES"));
        assert_eq!(balance(&store, investor.id).await, Decimal::ZERO);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.opportunity(opp.id).await.unwrap().unwrap().available_shares, 2);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _rx) = reconciler(&store);
        let opp = seed_opportunity(&store, 2, Decimal::from(10), |_| {}).await;
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;
        let intention = seed_intention(
            &store,
            investor.id,
            IntentionType::Investment,
            Decimal::from(30),
            IntentionExtras::investment(opp.id, 3, InvestmentType::AuthorizedSale),
        )
        .await;
        let (payload, sig) = callback(&intention, true, false);
        reconciler.handle(&payload, Some(&sig)).await.unwrap();

        // attempts: 1 (webhook) + 2 retries = max 3
        assert_eq!(reconciler.retry_unexecuted(10).await.unwrap().failed, 1);
        assert_eq!(reconciler.retry_unexecuted(10).await.unwrap().failed, 1);
        assert_eq!(
            reconciler.retry_unexecuted(10).await.unwrap(),
            RetryReport::default()
        );
        assert_eq!(stored(&store, intention.id).await.execution_attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_succeeds_once_inventory_returns() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _rx) = reconciler(&store);
        let opp = seed_opportunity(&store, 2, Decimal::from(10), |_| {}).await;
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;
        let intention = seed_intention(
            &store,
            investor.id,
            IntentionType::Investment,
            Decimal::from(30),
            IntentionExtras::investment(opp.id, 3, InvestmentType::AuthorizedSale),
        )
        .await;
        let (payload, sig) = callback(&intention, true, false);
        reconciler.handle(&payload, Some(&sig)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut grown = tx.opportunity(opp.id).await.unwrap().unwrap();
        grown.total_shares = 5;
        grown.available_shares = 5;
        tx.save_opportunity(&grown).await.unwrap();
        tx.commit().await.unwrap();

        let report = reconciler.retry_unexecuted(10).await.unwrap();
        assert_eq!(report.executed, 1);
        let after = stored(&store, intention.id).await;
        assert!(after.is_executed);
        assert!(after.last_error.is_none());
        assert!(after.investment_id.is_some());
    }

    #[tokio::test]
    async fn test_pending_then_failure_then_success() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _rx) = reconciler(&store);
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;
        let intention = seed_intention(
            &store,
            investor.id,
            IntentionType::WalletCharge,
            Decimal::from(50),
            IntentionExtras::default(),
        )
        .await;

        let (pending, pending_sig) = callback(&intention, false, true);
        reconciler.handle(&pending, Some(&pending_sig)).await.unwrap();
        assert_eq!(stored(&store, intention.id).await.status, IntentionStatus::Active);

        let (failed, sig) = callback(&intention, false, false);
        reconciler.handle(&failed, Some(&sig)).await.unwrap();
        assert_eq!(stored(&store, intention.id).await.status, IntentionStatus::Failed);

        // A late pending never resurrects a failed intention
        reconciler.handle(&pending, Some(&pending_sig)).await.unwrap();
        assert_eq!(stored(&store, intention.id).await.status, IntentionStatus::Failed);

        // Verified success wins: the money was captured
        let (success, sig) = callback(&intention, true, false);
        reconciler.handle(&success, Some(&sig)).await.unwrap();
        let after = stored(&store, intention.id).await;
        assert_eq!(after.status, IntentionStatus::Completed);
        assert!(after.is_executed);
        assert_eq!(balance(&store, investor.id).await, Decimal::from(50));

        // A failure arriving after success changes nothing
        let (failed, sig) = callback(&intention, false, false);
        assert_eq!(
            reconciler.handle(&failed, Some(&sig)).await.unwrap(),
            WebhookOutcome::AlreadyExecuted {
                intention_id: intention.id
            }
        );
        assert_eq!(stored(&store, intention.id).await.status, IntentionStatus::Completed);
    }

    #[tokio::test]
    async fn test_rejections() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _rx) = reconciler(&store);
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;
        let intention = seed_intention(
            &store,
            investor.id,
            IntentionType::WalletCharge,
            Decimal::from(100),
            IntentionExtras::default(),
        )
        .await;
        let (payload, sig) = callback(&intention, true, false);

        let missing_type = json!({ "obj": payload["obj"].clone() });
        let err = reconciler.handle(&missing_type, Some(&sig)).await.unwrap_err();
        assert_eq!(err.http_status(), 400);

        let err = reconciler.handle(&payload, Some("00ff")).await.unwrap_err();
        assert_eq!(err, WebhookError::InvalidSignature);
        assert_eq!(err.http_status(), 401);
        assert_eq!(
            reconciler.handle(&payload, None).await,
            Err(WebhookError::InvalidSignature)
        );

        // Nothing applied by rejected callbacks
        assert_eq!(balance(&store, investor.id).await, Decimal::ZERO);
        assert_eq!(stored(&store, intention.id).await.status, IntentionStatus::Created);
    }

    #[tokio::test]
    async fn test_unknown_type_and_token_acknowledged() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _rx) = reconciler(&store);

        let outcome = reconciler
            .handle(&json!({ "type": "SUBSCRIPTION", "obj": {} }), None)
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Acknowledged { .. }));

        let token = json!({ "id": 1, "token": "tok", "masked_pan": "xxxx-1111" });
        let sig = WebhookSignature::new(SECRET).sign("TOKEN", &token).unwrap();
        let outcome = reconciler
            .handle(&json!({ "type": "TOKEN", "obj": token }), Some(&sig))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Acknowledged {
                event_type: "TOKEN".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_intention_acknowledged() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _rx) = reconciler(&store);
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;
        // Callback carries neither a stored id nor a known order id
        let mut ghost = seed_intention(
            &store,
            investor.id,
            IntentionType::WalletCharge,
            Decimal::from(10),
            IntentionExtras::default(),
        )
        .await;
        ghost.id = Uuid::new_v4();
        let (mut payload, _) = callback(&ghost, true, false);
        payload["obj"]["order"]["id"] = json!(123456);
        let sig = WebhookSignature::new(SECRET)
            .sign("TRANSACTION", &payload["obj"])
            .unwrap();

        let outcome = reconciler.handle(&payload, Some(&sig)).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::UnknownIntention { .. }));
    }

    #[tokio::test]
    async fn test_lookup_falls_back_to_gateway_order() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _rx) = reconciler(&store);
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;
        let intention = seed_intention(
            &store,
            investor.id,
            IntentionType::WalletCharge,
            Decimal::from(10),
            IntentionExtras::default(),
        )
        .await;
        let (mut payload, _) = callback(&intention, true, false);
        payload["obj"]["order"]["merchant_order_id"] = Value::Null;
        let sig = WebhookSignature::new(SECRET)
            .sign("TRANSACTION", &payload["obj"])
            .unwrap();

        let outcome = reconciler.handle(&payload, Some(&sig)).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Executed { .. }));
        assert_eq!(balance(&store, investor.id).await, Decimal::from(10));
    }

    #[tokio::test]
    async fn test_foreign_merchant_order_id_falls_back_to_special_reference() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _rx) = reconciler(&store);
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;
        let intention = seed_intention(
            &store,
            investor.id,
            IntentionType::WalletCharge,
            Decimal::from(10),
            IntentionExtras::default(),
        )
        .await;
        let (mut payload, _) = callback(&intention, true, false);
        payload["obj"]["order"]["id"] = json!(123456);
        payload["obj"]["order"]["merchant_order_id"] = json!("ORD-2025-0001");
        payload["obj"]["special_reference"] = json!(intention.id.to_string());
        let sig = WebhookSignature::new(SECRET)
            .sign("TRANSACTION", &payload["obj"])
            .unwrap();

        let outcome = reconciler.handle(&payload, Some(&sig)).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Executed { .. }));
        assert_eq!(balance(&store, investor.id).await, Decimal::from(10));
    }

    #[tokio::test]
    async fn test_amount_mismatch_not_applied() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _rx) = reconciler(&store);
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;
        let intention = seed_intention(
            &store,
            investor.id,
            IntentionType::WalletCharge,
            Decimal::from(100),
            IntentionExtras::default(),
        )
        .await;
        let (mut payload, _) = callback(&intention, true, false);
        payload["obj"]["amount_cents"] = json!(100);
        let sig = WebhookSignature::new(SECRET)
            .sign("TRANSACTION", &payload["obj"])
            .unwrap();

        let outcome = reconciler.handle(&payload, Some(&sig)).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::AmountMismatch { .. }));
        assert_eq!(balance(&store, investor.id).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_missing_extras_is_integrity_failure() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _rx) = reconciler(&store);
        let investor = seed_investor(&store, 1, Decimal::ZERO).await;
        let intention = seed_intention(
            &store,
            investor.id,
            IntentionType::Investment,
            Decimal::from(10),
            IntentionExtras::default(),
        )
        .await;
        let (payload, sig) = callback(&intention, true, false);

        let outcome = reconciler.handle(&payload, Some(&sig)).await.unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::ExecutionFailed {
                error: EngineError::MissingExtras(_),
                ..
            }
        ));
    }
}
