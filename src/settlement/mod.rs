//! Settlement pipeline
//!
//! Three sub-machines keyed by investment type, each applied per investment
//! in its own transaction:
//!
//! | Step | Applies to | Transition |
//! |------|------------|------------|
//! | [`delivery`] | self_sale | merchandise `pending → arrived` |
//! | [`returns`] | authorized_sale | actual returns `unset → recorded` |
//! | [`distribution`] | both | `pending → distributed`, wallet credit |
//!
//! Bulk variants walk an opportunity's investments and never abort on a
//! single failure; they return a [`BulkReport`].

pub mod delivery;
pub mod distribution;
pub mod returns;

pub use returns::ReturnAmounts;

use serde::Serialize;
use std::sync::Arc;

use crate::core_types::{InvestmentId, OpportunityId, ProfileId};
use crate::error::EngineError;
use crate::investment::models::Investment;
use crate::notify::Notifier;
use crate::store::{Store, StoreTx};

/// One item that failed inside a bulk run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investment_id: Option<InvestmentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investor_id: Option<ProfileId>,
    pub code: &'static str,
    pub message: String,
}

/// Partial-failure result of a bulk operation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkReport {
    pub succeeded: Vec<InvestmentId>,
    /// Not eligible (wrong type, cancelled, already done)
    pub skipped: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    fn fail_investment(&mut self, investment_id: InvestmentId, error: &EngineError) {
        self.failures.push(BulkFailure {
            investment_id: Some(investment_id),
            investor_id: None,
            code: error.code(),
            message: error.to_string(),
        });
    }

    fn fail_investor(&mut self, investor_id: ProfileId, error: &EngineError) {
        self.failures.push(BulkFailure {
            investment_id: None,
            investor_id: Some(investor_id),
            code: error.code(),
            message: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct SettlementService<S: Store> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store> SettlementService<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Snapshot of an opportunity's investments, oldest first
    async fn investments_of(
        &self,
        opportunity_id: OpportunityId,
    ) -> Result<Vec<Investment>, EngineError> {
        let mut tx = self.store.begin().await?;
        if tx.opportunity(opportunity_id).await?.is_none() {
            return Err(EngineError::OpportunityNotFound(opportunity_id.to_string()));
        }
        tx.investments_for_opportunity(opportunity_id).await
    }
}

async fn lock_investment<T: StoreTx>(
    tx: &mut T,
    id: InvestmentId,
) -> Result<Investment, EngineError> {
    tx.lock_investment(id)
        .await?
        .ok_or_else(|| EngineError::InvestmentNotFound(id.to_string()))
}
