use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub server: ServerConfig,
    /// The in-memory store is used when absent
    #[serde(default)]
    pub postgres: Option<PostgresSettings>,
    pub payment_gateway: PaymentGatewayConfig,
    #[serde(default)]
    pub workers: WorkerSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostgresSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

impl PostgresSettings {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

/// Payment gateway credentials, injected into the adapter's constructor.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentGatewayConfig {
    /// e.g. `https://ksa.paymob.com`
    pub api_base: String,
    pub secret_key: String,
    pub public_key: String,
    /// Shared secret for webhook HMAC verification
    pub hmac_secret: String,
    /// Card / wallet integration ids offered on the checkout page
    pub integration_ids: Vec<i64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_intention_ttl_secs")]
    pub intention_ttl_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_currency() -> String {
    "SAR".to_string()
}

fn default_intention_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl PaymentGatewayConfig {
    pub fn intention_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.intention_ttl_secs as i64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Background payment worker (expiry + bounded execution retry)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerSettings {
    pub enabled: bool,
    pub scan_interval_secs: u64,
    pub max_execution_attempts: u32,
    pub batch_size: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 60,
            max_execution_attempts: 5,
            batch_size: 100,
        }
    }
}

impl WorkerSettings {
    /// Attempt bound in the store's integer width
    pub fn max_attempts(&self) -> i32 {
        i32::try_from(self.max_execution_attempts).unwrap_or(i32::MAX)
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn from_env_name(env: &str) -> anyhow::Result<Self> {
        Self::load(&format!("config/{}.yaml", env))
    }

    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", config_path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config yaml: {}", e))
    }
}
