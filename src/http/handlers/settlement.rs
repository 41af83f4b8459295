//! Admin settlement endpoints

use axum::{
    Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::core_types::{InvestmentId, OpportunityId, ProfileId};
use crate::http::state::AppState;
use crate::http::types::{ApiResult, ok};
use crate::investment::Investment;
use crate::settlement::{BulkReport, ReturnAmounts};
use crate::store::Store;

/// POST /admin/investments/{id}/arrived
pub async fn mark_investment_arrived<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<InvestmentId>,
) -> ApiResult<Investment> {
    ok(state.settlement.mark_arrived(id).await?)
}

/// POST /admin/investments/{id}/returns
pub async fn record_investment_returns<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<InvestmentId>,
    Json(amounts): Json<ReturnAmounts>,
) -> ApiResult<Investment> {
    ok(state.settlement.record_returns(id, amounts).await?)
}

/// POST /admin/investments/{id}/distribute
pub async fn distribute_investment<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<InvestmentId>,
) -> ApiResult<Investment> {
    ok(state.settlement.distribute(id).await?)
}

/// POST /admin/opportunities/{id}/arrived
pub async fn mark_opportunity_arrived<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<OpportunityId>,
) -> ApiResult<BulkReport> {
    ok(state.settlement.mark_opportunity_arrived(id).await?)
}

#[derive(Debug, Deserialize)]
pub struct InvestorReturns {
    pub investor_id: ProfileId,
    pub actual_return_amount: Decimal,
    pub actual_net_return: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct OpportunityReturnsBody {
    pub investors: Vec<InvestorReturns>,
}

/// POST /admin/opportunities/{id}/returns
pub async fn record_opportunity_returns<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<OpportunityId>,
    Json(body): Json<OpportunityReturnsBody>,
) -> ApiResult<BulkReport> {
    let per_investor = body.investors.into_iter().map(|row| {
        (
            row.investor_id,
            ReturnAmounts::new(row.actual_return_amount, row.actual_net_return),
        )
    });
    ok(state
        .settlement
        .record_opportunity_returns(id, per_investor)
        .await?)
}

/// POST /admin/opportunities/{id}/distribute
pub async fn distribute_opportunity<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<OpportunityId>,
) -> ApiResult<BulkReport> {
    ok(state.settlement.distribute_opportunity(id).await?)
}
