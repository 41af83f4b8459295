//! Payment intention lifecycle on our side
//!
//! Creation is split in three steps so the gateway call never runs while
//! a row lock is held:
//!
//! 1. read-only transaction: load and pre-validate, then drop it
//! 2. gateway call (no transaction open)
//! 3. fresh transaction: persist the local mirror
//!
//! A gateway failure therefore leaves nothing behind.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::gateway::{BillingData, GatewayIntentionRequest, PaymentGateway};
use super::types::{IntentionExtras, IntentionStatus, IntentionType, PaymentIntention};
use crate::config::PaymentGatewayConfig;
use crate::core_types::{IntentionId, OpportunityId, ProfileId};
use crate::error::EngineError;
use crate::investment::models::{InvestmentAmounts, InvestmentType};
use crate::investment::validator::InvestmentValidator;
use crate::money;
use crate::store::{Store, StoreTx};

/// What the payment is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentionPurpose {
    WalletCharge {
        amount: Decimal,
    },
    Investment {
        opportunity_id: OpportunityId,
        shares: i64,
        investment_type: InvestmentType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIntention {
    pub investor_id: ProfileId,
    pub purpose: IntentionPurpose,
    pub billing: BillingData,
}

/// Result of a successful creation, handed to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedIntention {
    pub intention: PaymentIntention,
    pub client_secret: String,
    pub checkout_url: String,
}

pub struct PaymentService<S: Store> {
    store: Arc<S>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
    ttl: chrono::Duration,
}

impl<S: Store> PaymentService<S> {
    pub fn new(store: Arc<S>, gateway: Arc<dyn PaymentGateway>, config: &PaymentGatewayConfig) -> Self {
        Self {
            store,
            gateway,
            currency: config.currency.clone(),
            ttl: config.intention_ttl(),
        }
    }

    pub async fn create_intention(
        &self,
        request: &CreateIntention,
    ) -> Result<CreatedIntention, EngineError> {
        let now = Utc::now();

        // 1. Pre-validate; the transaction is dropped before the gateway call
        let (investor, intention_type, amount, extras, description) = {
            let mut tx = self.store.begin().await?;
            let investor = tx
                .investor(request.investor_id)
                .await?
                .ok_or_else(|| EngineError::ProfileNotFound(request.investor_id.to_string()))?;

            match request.purpose {
                IntentionPurpose::WalletCharge { amount } => {
                    let amount = money::validate_amount(amount)?;
                    (
                        investor,
                        IntentionType::WalletCharge,
                        amount,
                        IntentionExtras::default(),
                        "Wallet charge".to_string(),
                    )
                }
                IntentionPurpose::Investment {
                    opportunity_id,
                    shares,
                    investment_type,
                } => {
                    let opportunity = tx.opportunity(opportunity_id).await?.ok_or_else(|| {
                        EngineError::OpportunityNotFound(opportunity_id.to_string())
                    })?;
                    InvestmentValidator::validate(
                        &investor,
                        &opportunity,
                        None,
                        shares,
                        investment_type,
                        true,
                        now,
                    )?;
                    let amounts = InvestmentAmounts::compute(&opportunity, shares, investment_type);
                    (
                        investor,
                        IntentionType::Investment,
                        amounts.total_payment_required,
                        IntentionExtras::investment(opportunity_id, shares, investment_type),
                        opportunity.title,
                    )
                }
            }
        };

        // 2. External call, no locks held
        let id: IntentionId = Uuid::new_v4();
        let gateway_request = GatewayIntentionRequest {
            reference: id,
            amount_cents: money::to_minor_units(amount)?,
            currency: self.currency.clone(),
            description,
            billing: request.billing.clone(),
            extras: extras.clone(),
            expires_in_secs: self.ttl.num_seconds().max(0) as u64,
        };
        let created = self.gateway.create_intention(&gateway_request).await?;

        // 3. Persist the mirror
        let intention = PaymentIntention {
            id,
            user_id: investor.user_id,
            profile_id: investor.id,
            intention_type,
            amount,
            currency: self.currency.clone(),
            status: IntentionStatus::Created,
            gateway_intention_id: created.id,
            gateway_order_id: created.order_id,
            client_secret: created.client_secret.clone(),
            extras,
            is_executed: false,
            execution_attempts: 0,
            last_error: None,
            gateway_transaction_id: None,
            investment_id: None,
            created_at: now,
            updated_at: now,
            expires_at: now + self.ttl,
            completed_at: None,
            executed_at: None,
        };
        let mut tx = self.store.begin().await?;
        tx.insert_intention(&intention).await?;
        tx.commit().await?;

        info!(
            intention_id = %intention.id,
            intention_type = intention_type.as_str(),
            amount = %amount,
            gateway_id = %intention.gateway_intention_id,
            "Payment intention created"
        );
        let checkout_url = self.gateway.checkout_url(&created.client_secret);
        Ok(CreatedIntention {
            intention,
            client_secret: created.client_secret,
            checkout_url,
        })
    }

    /// Read an intention; one past its TTL is reported as expired.
    pub async fn intention(&self, id: IntentionId) -> Result<PaymentIntention, EngineError> {
        let mut tx = self.store.begin().await?;
        let intention = tx
            .intention(id)
            .await?
            .ok_or_else(|| EngineError::IntentionNotFound(id.to_string()))?;
        Ok(intention.observed_at(Utc::now()))
    }

    /// Mark created/active intentions past their TTL as expired.
    ///
    /// Each intention is re-checked under its own lock so a success webhook
    /// that lands concurrently wins.
    pub async fn expire_stale(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, EngineError> {
        let candidates = {
            let mut tx = self.store.begin().await?;
            tx.expirable_intentions(now, limit).await?
        };

        let mut expired = 0;
        for candidate in candidates {
            let mut tx = self.store.begin().await?;
            let Some(mut intention) = tx.lock_intention(candidate.id).await? else {
                continue;
            };
            if intention.status.is_terminal() || intention.expires_at > now {
                continue;
            }
            intention.status = IntentionStatus::Expired;
            intention.updated_at = now;
            tx.save_intention(&intention).await?;
            tx.commit().await?;

            debug!(intention_id = %intention.id, "Payment intention expired");
            expired += 1;
        }

        if expired > 0 {
            info!(count = expired, "Expired stale payment intentions");
        }
        Ok(expired)
    }
}
