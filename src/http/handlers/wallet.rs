//! Wallet balance, history and payout requests

use axum::{
    Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core_types::{PayoutId, ProfileId};
use crate::error::EngineError;
use crate::http::state::AppState;
use crate::http::types::{ApiResult, ok};
use crate::money;
use crate::store::Store;
use crate::wallet::{PayoutKind, PayoutRequest, WalletEntry};

#[derive(Debug, Serialize)]
pub struct WalletView {
    pub holder_id: ProfileId,
    pub balance: String,
    pub entries: Vec<WalletEntry>,
}

/// GET /api/v1/wallets/{holder_id}
pub async fn get_wallet<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(holder_id): Path<ProfileId>,
) -> ApiResult<WalletView> {
    let balance: Decimal = state.wallets.balance(holder_id).await?;
    let entries = state.wallets.history(holder_id).await?;
    ok(WalletView {
        holder_id,
        balance: money::format_amount(balance),
        entries,
    })
}

#[derive(Debug, Deserialize)]
pub struct PayoutBody {
    pub kind: PayoutKind,
    pub amount: String,
    #[serde(default)]
    pub bank_account: Option<String>,
}

/// POST /api/v1/wallets/{holder_id}/payouts
pub async fn request_payout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(holder_id): Path<ProfileId>,
    Json(body): Json<PayoutBody>,
) -> ApiResult<PayoutRequest> {
    let amount = money::parse_amount(&body.amount).map_err(EngineError::from)?;
    let holder = state.wallets.holder_ref(holder_id).await?;
    ok(state
        .payouts
        .request(&holder, body.kind, amount, body.bank_account)
        .await?)
}

/// GET /api/v1/wallets/{holder_id}/payouts
pub async fn list_payouts<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(holder_id): Path<ProfileId>,
) -> ApiResult<Vec<PayoutRequest>> {
    ok(state.payouts.history(holder_id).await?)
}

/// POST /api/v1/wallets/{holder_id}/payouts/{payout_id}/cancel
pub async fn cancel_payout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path((holder_id, payout_id)): Path<(ProfileId, PayoutId)>,
) -> ApiResult<PayoutRequest> {
    let holder = state.wallets.holder_ref(holder_id).await?;
    ok(state.payouts.cancel(payout_id, &holder).await?)
}

/// POST /admin/payouts/{id}/processing
pub async fn start_payout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<PayoutId>,
) -> ApiResult<PayoutRequest> {
    ok(state.payouts.start_processing(id).await?)
}

/// POST /admin/payouts/{id}/complete
pub async fn complete_payout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<PayoutId>,
) -> ApiResult<PayoutRequest> {
    ok(state.payouts.complete(id).await?)
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub reason: String,
}

/// POST /admin/payouts/{id}/reject
pub async fn reject_payout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<PayoutId>,
    Json(body): Json<RejectBody>,
) -> ApiResult<PayoutRequest> {
    ok(state.payouts.reject(id, body.reason).await?)
}
