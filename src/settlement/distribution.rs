//! Profit distribution
//!
//! Credits the investor's wallet exactly once per investment:
//! - self_sale: `shares * expected_net_profit_per_share` from the purchase
//!   snapshot, after the merchandise arrived
//! - authorized_sale: `actual_net_return`, after returns were recorded
//!
//! The credit and the `distributed` flag are written in the same
//! transaction, so a crash can never produce one without the other.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::info;

use super::{BulkReport, SettlementService, lock_investment};
use crate::core_types::{InvestmentId, OpportunityId};
use crate::error::EngineError;
use crate::investment::models::{
    DistributionStatus, Investment, InvestmentStatus, InvestmentType,
};
use crate::money::{self, CURRENCY_DECIMALS};
use crate::notify::NotificationEvent;
use crate::store::{Store, StoreTx};
use crate::wallet::ledger::Ledger;
use crate::wallet::models::{EntryMeta, EntryReason};

/// Amount owed to the investor, or why it is not owed yet
pub fn distributable_amount(investment: &Investment) -> Result<Decimal, EngineError> {
    if investment.status == InvestmentStatus::Cancelled {
        return Err(EngineError::InvestmentNotActive);
    }
    if investment.is_distributed() {
        return Err(EngineError::AlreadyDistributed);
    }

    match investment.investment_type {
        InvestmentType::SelfSale => {
            if !investment.merchandise_arrived() {
                return Err(EngineError::DistributionNotReady);
            }
            Ok((Decimal::from(investment.shares) * investment.expected_net_profit_per_share)
                .round_dp_with_strategy(CURRENCY_DECIMALS, RoundingStrategy::MidpointAwayFromZero))
        }
        InvestmentType::AuthorizedSale => investment
            .actual_net_return
            .ok_or(EngineError::DistributionNotReady),
    }
}

/// Distribute one investment inside the caller's transaction
pub async fn distribute_in<T: StoreTx>(
    tx: &mut T,
    id: InvestmentId,
    now: DateTime<Utc>,
) -> Result<Investment, EngineError> {
    let mut investment = lock_investment(tx, id).await?;
    let amount = distributable_amount(&investment)?;

    if amount > Decimal::ZERO {
        let investor = tx
            .investor(investment.investor_profile_id)
            .await?
            .ok_or_else(|| {
                EngineError::ProfileNotFound(investment.investor_profile_id.to_string())
            })?;
        Ledger::deposit(
            tx,
            &investor,
            amount,
            EntryMeta::new(EntryReason::ProfitDistribution)
                .with_reference(investment.id)
                .with_description(format!(
                    "{} distribution for opportunity {}",
                    investment.investment_type, investment.opportunity_id
                )),
        )
        .await?;
    }

    investment.distribution_status = DistributionStatus::Distributed;
    investment.status = InvestmentStatus::Completed;
    investment.distributed_amount = Some(amount);
    investment.distributed_at = Some(now);
    investment.updated_at = now;
    tx.save_investment(&investment).await?;
    Ok(investment)
}

impl<S: Store> SettlementService<S> {
    /// Credit one investment's profit to its investor
    pub async fn distribute(&self, id: InvestmentId) -> Result<Investment, EngineError> {
        let mut tx = self.store.begin().await?;
        let investment = distribute_in(&mut tx, id, Utc::now()).await?;
        tx.commit().await?;

        let amount = investment.distributed_amount.unwrap_or_default();
        info!(
            investment_id = %id,
            investor_id = %investment.investor_profile_id,
            amount = %amount,
            "Profit distributed"
        );
        self.notifier
            .notify(
                investment.investor_user_id,
                NotificationEvent::ProfitDistributed,
                serde_json::json!({
                    "investment_id": id,
                    "opportunity_id": investment.opportunity_id,
                    "amount": money::format_amount(amount),
                }),
            )
            .await;
        Ok(investment)
    }

    /// Distribute every ready investment of the opportunity, one
    /// transaction each
    pub async fn distribute_opportunity(
        &self,
        opportunity_id: OpportunityId,
    ) -> Result<BulkReport, EngineError> {
        let mut report = BulkReport::default();

        for investment in self.investments_of(opportunity_id).await? {
            if distributable_amount(&investment).is_err() {
                report.skipped += 1;
                continue;
            }
            match self.distribute(investment.id).await {
                Ok(_) => report.succeeded.push(investment.id),
                Err(e) => report.fail_investment(investment.id, &e),
            }
        }

        info!(
            opportunity_id = %opportunity_id,
            distributed = report.succeeded.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            "Bulk distribution"
        );
        Ok(report)
    }
}
