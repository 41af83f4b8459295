//! Payment gateway adapter
//!
//! The gateway is an opaque external service. We only create intentions
//! on it and hand the client secret to the checkout page; the outcome
//! arrives later through the webhook.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::IntentionExtras;
use crate::config::PaymentGatewayConfig;
use crate::core_types::IntentionId;
use crate::error::EngineError;

/// Customer details the gateway requires on every intention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
}

/// What we ask the gateway for
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayIntentionRequest {
    /// Our intention id, echoed back as the merchant order id
    pub reference: IntentionId,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub billing: BillingData,
    pub extras: IntentionExtras,
    pub expires_in_secs: u64,
}

/// What the gateway gives back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayIntention {
    pub id: String,
    pub client_secret: String,
    pub order_id: Option<i64>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create the intention on the gateway. Never called inside a DB
    /// transaction.
    async fn create_intention(
        &self,
        request: &GatewayIntentionRequest,
    ) -> Result<GatewayIntention, EngineError>;

    /// Hosted checkout page for a client secret
    fn checkout_url(&self, client_secret: &str) -> String;
}

// ============================================================================
// Paymob-style HTTP adapter
// ============================================================================

#[derive(Serialize)]
struct IntentionItem<'a> {
    name: &'a str,
    amount: i64,
    quantity: u32,
}

#[derive(Serialize)]
struct CreateIntentionBody<'a> {
    amount: i64,
    currency: &'a str,
    payment_methods: &'a [i64],
    items: Vec<IntentionItem<'a>>,
    billing_data: &'a BillingData,
    extras: &'a IntentionExtras,
    special_reference: String,
    expiration: u64,
}

#[derive(Deserialize)]
struct CreateIntentionResponse {
    id: String,
    client_secret: String,
    #[serde(default)]
    intention_order_id: Option<i64>,
}

pub struct PaymobGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    public_key: String,
    integration_ids: Vec<i64>,
}

impl PaymobGateway {
    /// Credentials come from configuration, never from globals
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| EngineError::Gateway(format!("Failed to create HTTP client: {}", e)))?;

        if config.secret_key.is_empty() {
            warn!("Payment gateway secret key is empty; intention creation will fail");
        }

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            public_key: config.public_key.clone(),
            integration_ids: config.integration_ids.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for PaymobGateway {
    async fn create_intention(
        &self,
        request: &GatewayIntentionRequest,
    ) -> Result<GatewayIntention, EngineError> {
        let body = CreateIntentionBody {
            amount: request.amount_cents,
            currency: &request.currency,
            payment_methods: &self.integration_ids,
            items: vec![IntentionItem {
                name: &request.description,
                amount: request.amount_cents,
                quantity: 1,
            }],
            billing_data: &request.billing,
            extras: &request.extras,
            special_reference: request.reference.to_string(),
            expiration: request.expires_in_secs,
        };

        let response = self
            .client
            .post(format!("{}/v1/intention/", self.api_base))
            .header("Authorization", format!("Token {}", self.secret_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Gateway(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Gateway(format!(
                "intention rejected with HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let parsed: CreateIntentionResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Gateway(format!("Failed to parse response: {}", e)))?;

        debug!(
            reference = %request.reference,
            gateway_id = %parsed.id,
            order_id = ?parsed.intention_order_id,
            "Gateway intention created"
        );
        Ok(GatewayIntention {
            id: parsed.id,
            client_secret: parsed.client_secret,
            order_id: parsed.intention_order_id,
        })
    }

    fn checkout_url(&self, client_secret: &str) -> String {
        format!(
            "{}/unifiedcheckout/?publicKey={}&clientSecret={}",
            self.api_base, self.public_key, client_secret
        )
    }
}

/// Mock gateway for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    pub struct MockGateway {
        calls: AtomicUsize,
        next_order_id: AtomicI64,
        fail: Mutex<bool>,
        last_request: Mutex<Option<GatewayIntentionRequest>>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                next_order_id: AtomicI64::new(5000),
                fail: Mutex::new(false),
                last_request: Mutex::new(None),
            }
        }

        pub fn set_fail(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<GatewayIntentionRequest> {
            self.last_request.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn create_intention(
            &self,
            request: &GatewayIntentionRequest,
        ) -> Result<GatewayIntention, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            if *self.fail.lock().unwrap() {
                return Err(EngineError::Gateway("mock gateway down".to_string()));
            }
            let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
            Ok(GatewayIntention {
                id: format!("pi_test_{}", order_id),
                client_secret: format!("sec_{}", request.reference.simple()),
                order_id: Some(order_id),
            })
        }

        fn checkout_url(&self, client_secret: &str) -> String {
            format!("https://checkout.test/?clientSecret={}", client_secret)
        }
    }
}
