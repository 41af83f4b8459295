//! Wallet-funded investments

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::core_types::{InvestmentId, OpportunityId, ProfileId};
use crate::http::state::AppState;
use crate::http::types::{ApiResult, ok};
use crate::investment::{Investment, InvestmentRequest, InvestmentType};
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct CreateInvestmentBody {
    pub investor_id: ProfileId,
    pub opportunity_id: OpportunityId,
    pub shares: i64,
    pub investment_type: InvestmentType,
}

/// POST /api/v1/investments
pub async fn create_investment<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CreateInvestmentBody>,
) -> ApiResult<Investment> {
    let request = InvestmentRequest {
        investor_id: body.investor_id,
        opportunity_id: body.opportunity_id,
        shares: body.shares,
        investment_type: body.investment_type,
    };
    ok(state.investments.invest(&request).await?)
}

/// GET /api/v1/investments/{id}
pub async fn get_investment<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<InvestmentId>,
) -> ApiResult<Investment> {
    ok(state.investments.investment(id).await?)
}

/// POST /api/v1/investments/{id}/cancel
pub async fn cancel_investment<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<InvestmentId>,
) -> ApiResult<Investment> {
    ok(state.investments.cancel(id).await?)
}
