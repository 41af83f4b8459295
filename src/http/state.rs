//! Shared handler state

use std::sync::Arc;

use crate::db::Database;
use crate::investment::InvestmentService;
use crate::payment::{PaymentService, WebhookReconciler};
use crate::settlement::SettlementService;
use crate::store::Store;
use crate::wallet::{PayoutService, WalletService};

/// Services wired once at startup and shared by every handler
pub struct AppState<S: Store> {
    pub investments: InvestmentService<S>,
    pub payments: Arc<PaymentService<S>>,
    pub reconciler: Arc<WebhookReconciler<S>>,
    pub settlement: SettlementService<S>,
    pub wallets: WalletService<S>,
    pub payouts: PayoutService<S>,
    /// Pinged by the health check when the Postgres store is in use
    pub db: Option<Database>,
}
