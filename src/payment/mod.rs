//! Payments through the external gateway
//!
//! - [`gateway`]: outbound adapter (intention creation, checkout URL)
//! - [`signature`]: inbound callback authentication
//! - [`service`]: intention creation and expiry
//! - [`webhook`]: exactly-once reconciliation of callbacks
//! - [`worker`]: periodic expiry and bounded execution retry

pub mod gateway;
pub mod service;
pub mod signature;
pub mod types;
pub mod webhook;
pub mod worker;

pub use gateway::{BillingData, GatewayIntention, GatewayIntentionRequest, PaymentGateway, PaymobGateway};
pub use service::{CreateIntention, CreatedIntention, IntentionPurpose, PaymentService};
pub use signature::WebhookSignature;
pub use types::{IntentionExtras, IntentionStatus, IntentionType, PaymentIntention};
pub use webhook::{RetryReport, WebhookError, WebhookOutcome, WebhookReconciler};
pub use worker::{PaymentWorker, WorkerConfig};
