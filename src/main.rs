//! shares-settlement service
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐   ┌────────────┐
//! │  Config  │──▶│ Store (PG or │──▶│  Services   │──▶│ HTTP (axum)│
//! │  (YAML)  │   │   memory)    │   │ + worker    │   │ + webhook  │
//! └──────────┘   └──────────────┘   └─────────────┘   └────────────┘
//! ```
//!
//! Usage: `shares-settlement [--env dev] [--port 8080]`

use std::sync::Arc;

use shares_settlement::config::AppConfig;
use shares_settlement::db::Database;
use shares_settlement::http::{self, state::AppState};
use shares_settlement::investment::InvestmentService;
use shares_settlement::notify::{LogNotifier, Notifier};
use shares_settlement::payment::{
    PaymentGateway, PaymentService, PaymentWorker, PaymobGateway, WebhookReconciler,
    WebhookSignature, WorkerConfig,
};
use shares_settlement::settlement::SettlementService;
use shares_settlement::store::{MemoryStore, PgStore, Store, schema};
use shares_settlement::wallet::{PayoutService, WalletService};

fn arg_value(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.windows(2)
        .find(|pair| names.contains(&pair[0].as_str()))
        .map(|pair| pair[1].clone())
}

/// `--env` / `-e`, then `APP_ENV`, then `dev`
fn get_env() -> String {
    arg_value(&["--env", "-e"])
        .or_else(|| std::env::var("APP_ENV").ok())
        .unwrap_or_else(|| "dev".to_string())
}

fn get_port_override() -> Option<u16> {
    arg_value(&["--port", "-p"]).and_then(|p| p.parse().ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::from_env_name(&env)?;
    let _log_guard = shares_settlement::logging::init_logging(&config);

    tracing::info!(env = %env, version = env!("GIT_HASH"), "Starting shares-settlement");

    match config.postgres.clone() {
        Some(settings) => {
            let db = Database::connect(&settings).await?;
            schema::init_schema(db.pool()).await?;
            let store = Arc::new(PgStore::new(db.clone()));
            run(store, Some(db), config).await
        }
        None => {
            tracing::warn!("No postgres section configured, using the in-memory store");
            run(Arc::new(MemoryStore::new()), None, config).await
        }
    }
}

async fn run<S: Store>(
    store: Arc<S>,
    db: Option<Database>,
    config: AppConfig,
) -> anyhow::Result<()> {
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let gateway: Arc<dyn PaymentGateway> = Arc::new(PaymobGateway::new(&config.payment_gateway)?);

    let payments = Arc::new(PaymentService::new(
        store.clone(),
        gateway,
        &config.payment_gateway,
    ));
    let reconciler = Arc::new(WebhookReconciler::new(
        store.clone(),
        WebhookSignature::new(config.payment_gateway.hmac_secret.clone()),
        notifier.clone(),
        config.workers.max_attempts(),
    ));

    if config.workers.enabled {
        let worker = PaymentWorker::new(
            payments.clone(),
            reconciler.clone(),
            WorkerConfig::from(&config.workers),
        );
        tokio::spawn(async move { worker.run().await });
    } else {
        tracing::warn!("Payment worker disabled: stale intentions will not expire");
    }

    let state = Arc::new(AppState {
        investments: InvestmentService::new(store.clone(), notifier.clone()),
        payments,
        reconciler,
        settlement: SettlementService::new(store.clone(), notifier.clone()),
        wallets: WalletService::new(store.clone()),
        payouts: PayoutService::new(store, notifier),
        db,
    });

    let port = get_port_override().unwrap_or(config.server.port);
    http::serve(&config.server.host, port, state).await
}
