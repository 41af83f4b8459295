//! Gateway payments: intention creation and the inbound callback

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

use crate::core_types::{IntentionId, OpportunityId, ProfileId};
use crate::error::EngineError;
use crate::http::state::AppState;
use crate::http::types::{ApiResult, ok};
use crate::investment::InvestmentType;
use crate::money;
use crate::payment::{
    BillingData, CreateIntention, CreatedIntention, IntentionPurpose, PaymentIntention,
    WebhookError, WebhookOutcome,
};
use crate::store::Store;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PurposeBody {
    WalletCharge {
        amount: String,
    },
    Investment {
        opportunity_id: OpportunityId,
        shares: i64,
        investment_type: InvestmentType,
    },
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentionBody {
    pub investor_id: ProfileId,
    pub purpose: PurposeBody,
    pub billing: BillingData,
}

impl TryFrom<CreateIntentionBody> for CreateIntention {
    type Error = EngineError;

    fn try_from(body: CreateIntentionBody) -> Result<Self, Self::Error> {
        let purpose = match body.purpose {
            PurposeBody::WalletCharge { amount } => IntentionPurpose::WalletCharge {
                amount: money::parse_amount(&amount)?,
            },
            PurposeBody::Investment {
                opportunity_id,
                shares,
                investment_type,
            } => IntentionPurpose::Investment {
                opportunity_id,
                shares,
                investment_type,
            },
        };
        Ok(CreateIntention {
            investor_id: body.investor_id,
            purpose,
            billing: body.billing,
        })
    }
}

/// POST /api/v1/payments/intentions
pub async fn create_intention<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CreateIntentionBody>,
) -> ApiResult<CreatedIntention> {
    let request = CreateIntention::try_from(body)?;
    ok(state.payments.create_intention(&request).await?)
}

/// GET /api/v1/payments/intentions/{id}
pub async fn get_intention<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<IntentionId>,
) -> ApiResult<PaymentIntention> {
    ok(state.payments.intention(id).await?)
}

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    pub hmac: Option<String>,
}

/// POST /api/v1/payments/webhook
///
/// The gateway sends the signature as the `hmac` query parameter; the
/// `x-signature` header is accepted as well. Every accepted callback is
/// answered 200 so the gateway stops retrying; only malformed (400),
/// unauthenticated (401) and storage failures (500) are not.
pub async fn payment_webhook<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Webhook body is not JSON");
            return webhook_error(&WebhookError::Malformed(e.to_string()));
        }
    };

    let signature = query.hmac.or_else(|| {
        headers
            .get("x-signature")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    match state.reconciler.handle(&payload, signature.as_deref()).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "received": true, "outcome": outcome_label(&outcome) })),
        ),
        Err(e) => webhook_error(&e),
    }
}

fn webhook_error(err: &WebhookError) -> (StatusCode, Json<Value>) {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "received": false, "error": err.to_string() })))
}

fn outcome_label(outcome: &WebhookOutcome) -> &'static str {
    match outcome {
        WebhookOutcome::Executed { .. } => "executed",
        WebhookOutcome::AlreadyExecuted { .. } => "already_executed",
        WebhookOutcome::StatusRecorded { .. } => "status_recorded",
        WebhookOutcome::ExecutionFailed { .. } => "execution_failed",
        WebhookOutcome::UnknownIntention { .. } => "unknown_intention",
        WebhookOutcome::AmountMismatch { .. } => "amount_mismatch",
        WebhookOutcome::Acknowledged { .. } => "acknowledged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn billing() -> Value {
        json!({
            "first_name": "Sara",
            "last_name": "Ali",
            "email": "sara@example.com",
            "phone_number": "+966500000000"
        })
    }

    #[test]
    fn test_wallet_charge_body_parses_amount() {
        let body: CreateIntentionBody = serde_json::from_value(json!({
            "investor_id": "7a1c2b66-95f4-4c51-8c07-6f3d2b4f2a10",
            "purpose": { "type": "wallet_charge", "amount": "100.50" },
            "billing": billing(),
        }))
        .unwrap();
        let request = CreateIntention::try_from(body).unwrap();
        assert_eq!(
            request.purpose,
            IntentionPurpose::WalletCharge {
                amount: Decimal::new(10050, 2)
            }
        );
    }

    #[test]
    fn test_wallet_charge_body_rejects_bad_amount() {
        let body: CreateIntentionBody = serde_json::from_value(json!({
            "investor_id": "7a1c2b66-95f4-4c51-8c07-6f3d2b4f2a10",
            "purpose": { "type": "wallet_charge", "amount": "-3" },
            "billing": billing(),
        }))
        .unwrap();
        assert_eq!(
            CreateIntention::try_from(body),
            Err(EngineError::InvalidAmount)
        );
    }

    #[test]
    fn test_investment_body() {
        let body: CreateIntentionBody = serde_json::from_value(json!({
            "investor_id": "7a1c2b66-95f4-4c51-8c07-6f3d2b4f2a10",
            "purpose": {
                "type": "investment",
                "opportunity_id": "0d9f3c52-1c1e-4f43-9a57-5d0d1c6f8e21",
                "shares": 4,
                "investment_type": "self_sale"
            },
            "billing": billing(),
        }))
        .unwrap();
        let request = CreateIntention::try_from(body).unwrap();
        assert!(matches!(
            request.purpose,
            IntentionPurpose::Investment {
                shares: 4,
                investment_type: InvestmentType::SelfSale,
                ..
            }
        ));
    }
}
