//! HTTP surface (axum)
//!
//! Caller identity is taken from the request body; authentication is
//! handled in front of this service.

pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::store::Store;
use handlers::{health, investment, payment, settlement, wallet};
use state::AppState;

/// Build the complete router
pub fn router<S: Store>(state: Arc<AppState<S>>) -> Router {
    let api_routes = Router::new()
        // Investments
        .route("/investments", post(investment::create_investment::<S>))
        .route("/investments/{id}", get(investment::get_investment::<S>))
        .route(
            "/investments/{id}/cancel",
            post(investment::cancel_investment::<S>),
        )
        // Payments
        .route("/payments/intentions", post(payment::create_intention::<S>))
        .route("/payments/intentions/{id}", get(payment::get_intention::<S>))
        .route("/payments/webhook", post(payment::payment_webhook::<S>))
        // Wallets
        .route("/wallets/{holder_id}", get(wallet::get_wallet::<S>))
        .route(
            "/wallets/{holder_id}/payouts",
            get(wallet::list_payouts::<S>).post(wallet::request_payout::<S>),
        )
        .route(
            "/wallets/{holder_id}/payouts/{payout_id}/cancel",
            post(wallet::cancel_payout::<S>),
        );

    let admin_routes = Router::new()
        .route(
            "/investments/{id}/arrived",
            post(settlement::mark_investment_arrived::<S>),
        )
        .route(
            "/investments/{id}/returns",
            post(settlement::record_investment_returns::<S>),
        )
        .route(
            "/investments/{id}/distribute",
            post(settlement::distribute_investment::<S>),
        )
        .route(
            "/opportunities/{id}/arrived",
            post(settlement::mark_opportunity_arrived::<S>),
        )
        .route(
            "/opportunities/{id}/returns",
            post(settlement::record_opportunity_returns::<S>),
        )
        .route(
            "/opportunities/{id}/distribute",
            post(settlement::distribute_opportunity::<S>),
        )
        .route("/payouts/{id}/processing", post(wallet::start_payout::<S>))
        .route("/payouts/{id}/complete", post(wallet::complete_payout::<S>))
        .route("/payouts/{id}/reject", post(wallet::reject_payout::<S>));

    Router::new()
        .route("/health", get(health::health_check::<S>))
        .nest("/api/v1", api_routes)
        .nest("/admin", admin_routes)
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn serve<S: Store>(
    host: &str,
    port: u16,
    state: Arc<AppState<S>>,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!(addr = %addr, "HTTP server listening");
    info!("Webhook endpoint: POST /api/v1/payments/webhook");
    info!("Admin settlement API: /admin/*");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
