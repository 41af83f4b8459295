//! Merchandise delivery (self_sale only)

use chrono::Utc;
use tracing::info;

use super::{BulkReport, SettlementService, lock_investment};
use crate::core_types::{InvestmentId, OpportunityId};
use crate::error::EngineError;
use crate::investment::models::{Investment, InvestmentStatus, InvestmentType, MerchandiseStatus};
use crate::notify::NotificationEvent;
use crate::store::{Store, StoreTx};

impl<S: Store> SettlementService<S> {
    /// `pending → arrived` for one self_sale investment
    pub async fn mark_arrived(&self, id: InvestmentId) -> Result<Investment, EngineError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut investment = lock_investment(&mut tx, id).await?;

        if investment.investment_type != InvestmentType::SelfSale {
            return Err(EngineError::InvestmentTypeMismatch);
        }
        if investment.status == InvestmentStatus::Cancelled {
            return Err(EngineError::InvestmentNotActive);
        }
        if investment.merchandise_arrived() {
            return Err(EngineError::MerchandiseAlreadyArrived);
        }

        investment.merchandise_status = Some(MerchandiseStatus::Arrived);
        investment.merchandise_arrived_at = Some(now);
        investment.updated_at = now;
        tx.save_investment(&investment).await?;
        tx.commit().await?;

        info!(investment_id = %id, "Merchandise arrived");
        self.notifier
            .notify(
                investment.investor_user_id,
                NotificationEvent::MerchandiseArrived,
                serde_json::json!({
                    "investment_id": id,
                    "opportunity_id": investment.opportunity_id,
                    "shares": investment.shares,
                }),
            )
            .await;
        Ok(investment)
    }

    /// Mark every pending self_sale investment of the opportunity arrived
    pub async fn mark_opportunity_arrived(
        &self,
        opportunity_id: OpportunityId,
    ) -> Result<BulkReport, EngineError> {
        let mut report = BulkReport::default();

        for investment in self.investments_of(opportunity_id).await? {
            let eligible = investment.investment_type == InvestmentType::SelfSale
                && investment.status == InvestmentStatus::Active
                && !investment.merchandise_arrived();
            if !eligible {
                report.skipped += 1;
                continue;
            }
            match self.mark_arrived(investment.id).await {
                Ok(_) => report.succeeded.push(investment.id),
                Err(e) => report.fail_investment(investment.id, &e),
            }
        }

        info!(
            opportunity_id = %opportunity_id,
            arrived = report.succeeded.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            "Bulk merchandise arrival"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investment::service::{InvestmentRequest, InvestmentService};
    use crate::notify::ChannelNotifier;
    use crate::store::MemoryStore;
    use crate::test_support::{seed_investor, seed_opportunity};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_arrival_rules() {
        let store = Arc::new(MemoryStore::new());
        let (notifier, mut rx) = ChannelNotifier::new();
        let notifier = Arc::new(notifier);
        let investments = InvestmentService::new(store.clone(), notifier.clone());
        let settlement = SettlementService::new(store.clone(), notifier);

        let opp = seed_opportunity(&store, 10, Decimal::from(10), |_| {}).await;
        let investor = seed_investor(&store, 1, Decimal::from(100)).await;
        let request = |investment_type| InvestmentRequest {
            investor_id: investor.id,
            opportunity_id: opp.id,
            shares: 2,
            investment_type,
        };
        let self_sale = investments.invest(&request(InvestmentType::SelfSale)).await.unwrap();
        let authorized = investments
            .invest(&request(InvestmentType::AuthorizedSale))
            .await
            .unwrap();
        while rx.try_recv().is_ok() {}

        let arrived = settlement.mark_arrived(self_sale.id).await.unwrap();
        assert!(arrived.merchandise_arrived());
        assert!(arrived.merchandise_arrived_at.is_some());
        assert_eq!(rx.try_recv().unwrap().event, NotificationEvent::MerchandiseArrived);

        assert_eq!(
            settlement.mark_arrived(self_sale.id).await,
            Err(EngineError::MerchandiseAlreadyArrived)
        );
        assert_eq!(
            settlement.mark_arrived(authorized.id).await,
            Err(EngineError::InvestmentTypeMismatch)
        );
    }

    #[tokio::test]
    async fn test_bulk_arrival_skips_ineligible() {
        let store = Arc::new(MemoryStore::new());
        let (notifier, _rx) = ChannelNotifier::new();
        let notifier = Arc::new(notifier);
        let investments = InvestmentService::new(store.clone(), notifier.clone());
        let settlement = SettlementService::new(store.clone(), notifier);

        let opp = seed_opportunity(&store, 20, Decimal::from(10), |_| {}).await;
        let mut self_sales = Vec::new();
        for user_id in 1..=3 {
            let investor = seed_investor(&store, user_id, Decimal::from(100)).await;
            let investment = investments
                .invest(&InvestmentRequest {
                    investor_id: investor.id,
                    opportunity_id: opp.id,
                    shares: 2,
                    investment_type: InvestmentType::SelfSale,
                })
                .await
                .unwrap();
            self_sales.push(investment.id);
        }
        let other = seed_investor(&store, 9, Decimal::from(100)).await;
        investments
            .invest(&InvestmentRequest {
                investor_id: other.id,
                opportunity_id: opp.id,
                shares: 2,
                investment_type: InvestmentType::AuthorizedSale,
            })
            .await
            .unwrap();
        investments.cancel(self_sales[2]).await.unwrap();
        settlement.mark_arrived(self_sales[0]).await.unwrap();

        let report = settlement.mark_opportunity_arrived(opp.id).await.unwrap();
        assert_eq!(report.succeeded, vec![self_sales[1]]);
        assert_eq!(report.skipped, 3);
        assert!(report.is_clean());

        assert!(matches!(
            settlement.mark_opportunity_arrived(uuid::Uuid::new_v4()).await,
            Err(EngineError::OpportunityNotFound(_))
        ));
    }
}
