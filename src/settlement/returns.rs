//! Actual returns (authorized_sale only)
//!
//! The platform sells the merchandise on the investor's behalf and records
//! what it actually fetched. Returns are written exactly once per
//! investment; distribution later credits `actual_net_return`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{BulkReport, SettlementService, lock_investment};
use crate::core_types::{InvestmentId, OpportunityId, ProfileId};
use crate::error::EngineError;
use crate::investment::models::{Investment, InvestmentStatus, InvestmentType};
use crate::money::{self, CURRENCY_DECIMALS};
use crate::store::{Store, StoreTx};

/// Gross sale proceeds and the investor's net share of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnAmounts {
    pub actual_return_amount: Decimal,
    pub actual_net_return: Decimal,
}

impl ReturnAmounts {
    pub fn new(actual_return_amount: Decimal, actual_net_return: Decimal) -> Self {
        Self {
            actual_return_amount,
            actual_net_return,
        }
    }

    /// Both non-negative, halala precision, net not above gross
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, value) in [
            ("actual_return_amount", self.actual_return_amount),
            ("actual_net_return", self.actual_net_return),
        ] {
            if value < Decimal::ZERO {
                return Err(EngineError::InvalidReturnAmounts(format!(
                    "{name} must not be negative"
                )));
            }
            if value.normalize().scale() > CURRENCY_DECIMALS {
                return Err(EngineError::InvalidReturnAmounts(format!(
                    "{name} has more than {CURRENCY_DECIMALS} decimals"
                )));
            }
        }
        if self.actual_net_return > self.actual_return_amount {
            return Err(EngineError::InvalidReturnAmounts(
                "actual_net_return exceeds actual_return_amount".to_string(),
            ));
        }
        Ok(())
    }
}

/// Write returns onto a locked investment
fn apply_returns(
    investment: &mut Investment,
    amounts: ReturnAmounts,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    if investment.investment_type != InvestmentType::AuthorizedSale {
        return Err(EngineError::InvestmentTypeMismatch);
    }
    if investment.status == InvestmentStatus::Cancelled {
        return Err(EngineError::InvestmentNotActive);
    }
    if investment.returns_recorded() {
        return Err(EngineError::ReturnsAlreadyRecorded);
    }

    investment.actual_return_amount = Some(amounts.actual_return_amount);
    investment.actual_net_return = Some(amounts.actual_net_return);
    investment.returns_recorded_at = Some(now);
    investment.updated_at = now;
    Ok(())
}

fn awaiting_returns(investment: &Investment) -> bool {
    investment.investment_type == InvestmentType::AuthorizedSale
        && investment.status == InvestmentStatus::Active
        && !investment.returns_recorded()
}

impl<S: Store> SettlementService<S> {
    /// Record actual returns for one authorized_sale investment
    pub async fn record_returns(
        &self,
        id: InvestmentId,
        amounts: ReturnAmounts,
    ) -> Result<Investment, EngineError> {
        amounts.validate()?;

        let mut tx = self.store.begin().await?;
        let mut investment = lock_investment(&mut tx, id).await?;
        apply_returns(&mut investment, amounts, Utc::now())?;
        tx.save_investment(&investment).await?;
        tx.commit().await?;

        info!(
            investment_id = %id,
            actual_return_amount = %amounts.actual_return_amount,
            actual_net_return = %amounts.actual_net_return,
            "Actual returns recorded"
        );
        Ok(investment)
    }

    /// Record returns given per investor.
    ///
    /// Each investor's totals are split across their pending authorized_sale
    /// investments in the opportunity in proportion to shares, and all of
    /// that investor's investments are written in one transaction.
    pub async fn record_opportunity_returns(
        &self,
        opportunity_id: OpportunityId,
        per_investor: impl IntoIterator<Item = (ProfileId, ReturnAmounts)>,
    ) -> Result<BulkReport, EngineError> {
        let investments = self.investments_of(opportunity_id).await?;
        let mut report = BulkReport::default();

        for (investor_id, totals) in per_investor {
            let targets: Vec<&Investment> = investments
                .iter()
                .filter(|inv| inv.investor_profile_id == investor_id && awaiting_returns(inv))
                .collect();
            if targets.is_empty() {
                warn!(
                    opportunity_id = %opportunity_id,
                    investor_id = %investor_id,
                    "No investment awaiting returns for investor"
                );
                report.fail_investor(
                    investor_id,
                    &EngineError::InvestmentNotFound(format!(
                        "no pending authorized_sale investment for investor {investor_id}"
                    )),
                );
                continue;
            }

            match self.record_investor_returns(&targets, totals).await {
                Ok(ids) => report.succeeded.extend(ids),
                Err(e) => report.fail_investor(investor_id, &e),
            }
        }

        report.skipped = investments
            .iter()
            .filter(|inv| inv.investment_type == InvestmentType::AuthorizedSale)
            .filter(|inv| !report.succeeded.contains(&inv.id))
            .filter(|inv| !awaiting_returns(inv))
            .count();

        info!(
            opportunity_id = %opportunity_id,
            recorded = report.succeeded.len(),
            failed = report.failures.len(),
            "Bulk returns recorded"
        );
        Ok(report)
    }

    async fn record_investor_returns(
        &self,
        targets: &[&Investment],
        totals: ReturnAmounts,
    ) -> Result<Vec<InvestmentId>, EngineError> {
        totals.validate()?;

        let weights: Vec<i64> = targets.iter().map(|inv| inv.shares).collect();
        let gross = money::split_pro_rata(totals.actual_return_amount, &weights);
        let net = money::split_pro_rata(totals.actual_net_return, &weights);

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut ids = Vec::with_capacity(targets.len());
        for ((target, gross), net) in targets.iter().zip(gross).zip(net) {
            let mut investment = lock_investment(&mut tx, target.id).await?;
            apply_returns(&mut investment, ReturnAmounts::new(gross, net), now)?;
            tx.save_investment(&investment).await?;
            ids.push(investment.id);
        }
        tx.commit().await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investment::service::{InvestmentRequest, InvestmentService};
    use crate::notify::ChannelNotifier;
    use crate::store::MemoryStore;
    use crate::test_support::{seed_investor, seed_opportunity};
    use std::sync::Arc;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_validate_amounts() {
        assert!(ReturnAmounts::new(dec("120"), dec("110.50")).validate().is_ok());
        assert!(ReturnAmounts::new(Decimal::ZERO, Decimal::ZERO).validate().is_ok());
        assert!(matches!(
            ReturnAmounts::new(dec("-1"), Decimal::ZERO).validate(),
            Err(EngineError::InvalidReturnAmounts(_))
        ));
        assert!(matches!(
            ReturnAmounts::new(dec("10"), dec("10.001")).validate(),
            Err(EngineError::InvalidReturnAmounts(_))
        ));
        assert!(matches!(
            ReturnAmounts::new(dec("10"), dec("11")).validate(),
            Err(EngineError::InvalidReturnAmounts(_))
        ));
    }

    #[tokio::test]
    async fn test_record_returns_once() {
        let store = Arc::new(MemoryStore::new());
        let (notifier, _rx) = ChannelNotifier::new();
        let notifier = Arc::new(notifier);
        let investments = InvestmentService::new(store.clone(), notifier.clone());
        let settlement = SettlementService::new(store.clone(), notifier);

        let opp = seed_opportunity(&store, 10, Decimal::from(10), |_| {}).await;
        let investor = seed_investor(&store, 1, Decimal::from(100)).await;
        let request = |investment_type| InvestmentRequest {
            investor_id: investor.id,
            opportunity_id: opp.id,
            shares: 3,
            investment_type,
        };
        let authorized = investments
            .invest(&request(InvestmentType::AuthorizedSale))
            .await
            .unwrap();
        let self_sale = investments.invest(&request(InvestmentType::SelfSale)).await.unwrap();

        let amounts = ReturnAmounts::new(dec("40"), dec("36"));
        let recorded = settlement.record_returns(authorized.id, amounts).await.unwrap();
        assert_eq!(recorded.actual_return_amount, Some(dec("40")));
        assert_eq!(recorded.actual_net_return, Some(dec("36")));
        assert!(recorded.returns_recorded_at.is_some());

        assert_eq!(
            settlement.record_returns(authorized.id, amounts).await,
            Err(EngineError::ReturnsAlreadyRecorded)
        );
        assert_eq!(
            settlement.record_returns(self_sale.id, amounts).await,
            Err(EngineError::InvestmentTypeMismatch)
        );
    }

    #[tokio::test]
    async fn test_bulk_returns_split_by_shares() {
        let store = Arc::new(MemoryStore::new());
        let (notifier, _rx) = ChannelNotifier::new();
        let notifier = Arc::new(notifier);
        let investments = InvestmentService::new(store.clone(), notifier.clone());
        let settlement = SettlementService::new(store.clone(), notifier);

        let opp = seed_opportunity(&store, 20, Decimal::from(10), |_| {}).await;
        let alice = seed_investor(&store, 1, Decimal::from(100)).await;
        let bob = seed_investor(&store, 2, Decimal::from(100)).await;
        let stranger = seed_investor(&store, 3, Decimal::from(100)).await;

        let mut alice_ids = Vec::new();
        for shares in [1, 2] {
            let inv = investments
                .invest(&InvestmentRequest {
                    investor_id: alice.id,
                    opportunity_id: opp.id,
                    shares,
                    investment_type: InvestmentType::AuthorizedSale,
                })
                .await
                .unwrap();
            alice_ids.push(inv.id);
        }
        let bob_inv = investments
            .invest(&InvestmentRequest {
                investor_id: bob.id,
                opportunity_id: opp.id,
                shares: 4,
                investment_type: InvestmentType::AuthorizedSale,
            })
            .await
            .unwrap();

        let report = settlement
            .record_opportunity_returns(
                opp.id,
                vec![
                    (alice.id, ReturnAmounts::new(dec("100"), dec("90"))),
                    (bob.id, ReturnAmounts::new(dec("60"), dec("50"))),
                    (stranger.id, ReturnAmounts::new(dec("5"), dec("5"))),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.succeeded.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].investor_id, Some(stranger.id));
        assert_eq!(report.failures[0].code, "INVESTMENT_NOT_FOUND");

        let first = investments.investment(alice_ids[0]).await.unwrap();
        let second = investments.investment(alice_ids[1]).await.unwrap();
        assert_eq!(first.actual_net_return, Some(dec("30")));
        assert_eq!(second.actual_net_return, Some(dec("60")));
        assert_eq!(
            first.actual_return_amount.unwrap() + second.actual_return_amount.unwrap(),
            dec("100")
        );
        let bob_inv = investments.investment(bob_inv.id).await.unwrap();
        assert_eq!(bob_inv.actual_net_return, Some(dec("50")));

        // Second run finds nothing pending
        let again = settlement
            .record_opportunity_returns(opp.id, vec![(bob.id, ReturnAmounts::new(dec("1"), dec("1")))])
            .await
            .unwrap();
        assert!(again.succeeded.is_empty());
        assert_eq!(again.failures.len(), 1);
        assert_eq!(again.skipped, 3);
    }
}
