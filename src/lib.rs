//! shares_settlement - share-based investment lifecycle and settlement
//!
//! Owners publish opportunities divided into fixed-price shares; investors
//! buy shares from a wallet or through an external payment gateway; after
//! the underlying merchandise is sold, profits are credited back to the
//! investor wallets.
//!
//! # Modules
//!
//! - [`core_types`] - identifier aliases
//! - [`money`] - SAR amounts and gateway minor units
//! - [`error`] - engine error type
//! - [`wallet`] - append-only ledger, wallet holders, payouts
//! - [`opportunity`] - opportunities and share inventory
//! - [`investment`] - validation and atomic creation
//! - [`payment`] - gateway adapter, webhook reconciliation, worker
//! - [`settlement`] - delivery, actual returns, profit distribution
//! - [`store`] - transactional storage (PostgreSQL, in-memory)
//! - [`notify`] - post-commit notifications
//! - [`http`] - axum routes

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod money;

// Domain
pub mod investment;
pub mod notify;
pub mod opportunity;
pub mod payment;
pub mod settlement;
pub mod store;
pub mod wallet;

pub mod http;

#[cfg(test)]
mod test_support;

// Convenient re-exports at crate root
pub use core_types::{
    EntryId, IntentionId, InvestmentId, OpportunityId, PayoutId, ProfileId, UserId,
};
pub use error::{EngineError, ErrorKind};
pub use investment::{Investment, InvestmentRequest, InvestmentService, InvestmentType};
pub use notify::{ChannelNotifier, LogNotifier, Notification, NotificationEvent, Notifier};
pub use opportunity::{Opportunity, OpportunityStatus};
pub use payment::{PaymentService, WebhookOutcome, WebhookReconciler};
pub use settlement::{BulkReport, SettlementService};
pub use store::{MemoryStore, PgStore, Store, StoreTx};
pub use wallet::{Ledger, WalletService};
