//! Payment Worker
//!
//! Background loop that expires stale intentions and retries deferred
//! effects of completed-but-unexecuted ones.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::service::PaymentService;
use super::webhook::{RetryReport, WebhookReconciler};
use crate::config::WorkerSettings;
use crate::error::EngineError;
use crate::store::Store;

/// Configuration for the payment worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to scan
    pub scan_interval: Duration,
    /// Maximum intentions handled per scan and per task
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

impl From<&WorkerSettings> for WorkerConfig {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            scan_interval: Duration::from_secs(settings.scan_interval_secs.max(1)),
            batch_size: settings.batch_size.max(1),
        }
    }
}

/// Result of one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub expired: usize,
    pub retry: RetryReport,
}

pub struct PaymentWorker<S: Store> {
    payments: Arc<PaymentService<S>>,
    reconciler: Arc<WebhookReconciler<S>>,
    config: WorkerConfig,
}

impl<S: Store> PaymentWorker<S> {
    pub fn new(
        payments: Arc<PaymentService<S>>,
        reconciler: Arc<WebhookReconciler<S>>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            payments,
            reconciler,
            config,
        }
    }

    /// Run forever, one scan per interval
    pub async fn run(&self) {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting payment worker"
        );

        loop {
            if let Err(e) = self.scan().await {
                error!(error = %e, code = e.code(), "Payment worker scan failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Single expiry + retry pass
    pub async fn scan(&self) -> Result<ScanReport, EngineError> {
        let expired = self
            .payments
            .expire_stale(Utc::now(), self.config.batch_size)
            .await?;
        let retry = self
            .reconciler
            .retry_unexecuted(self.config.batch_size)
            .await?;

        let report = ScanReport { expired, retry };
        if report == ScanReport::default() {
            debug!("Payment worker: nothing to do");
        }
        Ok(report)
    }
}
