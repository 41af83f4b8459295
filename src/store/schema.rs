use anyhow::Result;
use sqlx::PgPool;

/// Create every table and index the PostgreSQL store needs. Idempotent.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing PostgreSQL schema...");

    for (name, ddl) in [
        ("investor_profiles", CREATE_INVESTOR_PROFILES_TABLE),
        ("owner_profiles", CREATE_OWNER_PROFILES_TABLE),
        ("wallets", CREATE_WALLETS_TABLE),
        ("wallet_entries", CREATE_WALLET_ENTRIES_TABLE),
        ("opportunities", CREATE_OPPORTUNITIES_TABLE),
        ("investments", CREATE_INVESTMENTS_TABLE),
        ("payment_intentions", CREATE_PAYMENT_INTENTIONS_TABLE),
        ("payout_requests", CREATE_PAYOUT_REQUESTS_TABLE),
        ("indexes", CREATE_INDEXES),
    ] {
        sqlx::raw_sql(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", name, e))?;
    }

    tracing::info!("PostgreSQL schema initialized successfully");
    Ok(())
}

const CREATE_INVESTOR_PROFILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS investor_profiles (
    id           UUID PRIMARY KEY,
    user_id      BIGINT NOT NULL,
    display_name TEXT NOT NULL,
    is_active    BOOLEAN NOT NULL DEFAULT TRUE,
    created_at   TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_OWNER_PROFILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS owner_profiles (
    id            UUID PRIMARY KEY,
    user_id       BIGINT NOT NULL,
    business_name TEXT NOT NULL,
    is_active     BOOLEAN NOT NULL DEFAULT TRUE,
    created_at    TIMESTAMPTZ NOT NULL
)
"#;

// No balance column: the balance is SUM over wallet_entries
const CREATE_WALLETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS wallets (
    holder_id   UUID PRIMARY KEY,
    holder_kind TEXT NOT NULL,       -- investor | owner
    user_id     BIGINT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_WALLET_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS wallet_entries (
    id         UUID PRIMARY KEY,
    holder_id  UUID NOT NULL REFERENCES wallets(holder_id),
    kind       TEXT NOT NULL,        -- deposit | withdraw
    amount     NUMERIC(20, 2) NOT NULL CHECK (amount > 0),
    reason     TEXT NOT NULL,
    reference  UUID,
    meta       JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_OPPORTUNITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS opportunities (
    id                            UUID PRIMARY KEY,
    owner_profile_id              UUID NOT NULL,
    owner_user_id                 BIGINT NOT NULL,
    title                         TEXT NOT NULL,
    status                        TEXT NOT NULL,
    total_shares                  BIGINT NOT NULL CHECK (total_shares >= 0),
    available_shares              BIGINT NOT NULL
        CHECK (available_shares >= 0 AND available_shares <= total_shares),
    share_price                   NUMERIC(20, 2) NOT NULL,
    min_investment_amount         NUMERIC(20, 2) NOT NULL,
    max_investment_amount         NUMERIC(20, 2),
    allow_self_sale               BOOLEAN NOT NULL,
    allow_authorized_sale         BOOLEAN NOT NULL,
    shipping_fee_per_share        NUMERIC(20, 2) NOT NULL,
    expected_profit_per_share     NUMERIC(20, 4) NOT NULL,
    expected_net_profit_per_share NUMERIC(20, 4) NOT NULL,
    expected_delivery_date        DATE,
    expected_distribution_date    DATE,
    offering_start                TIMESTAMPTZ,
    offering_end                  TIMESTAMPTZ,
    created_at                    TIMESTAMPTZ NOT NULL,
    updated_at                    TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_INVESTMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS investments (
    id                            UUID PRIMARY KEY,
    opportunity_id                UUID NOT NULL REFERENCES opportunities(id),
    investor_profile_id           UUID NOT NULL,
    investor_user_id              BIGINT NOT NULL,
    shares                        BIGINT NOT NULL CHECK (shares > 0),
    investment_type               TEXT NOT NULL,
    share_price                   NUMERIC(20, 2) NOT NULL,
    amount                        NUMERIC(20, 2) NOT NULL,
    shipping_fee_per_share        NUMERIC(20, 2) NOT NULL,
    total_payment_required        NUMERIC(20, 2) NOT NULL,
    payment_channel               TEXT NOT NULL,
    payment_intention_id          UUID,
    expected_profit_per_share     NUMERIC(20, 4) NOT NULL,
    expected_net_profit_per_share NUMERIC(20, 4) NOT NULL,
    expected_delivery_date        DATE,
    expected_distribution_date    DATE,
    status                        TEXT NOT NULL,
    merchandise_status            TEXT,
    merchandise_arrived_at        TIMESTAMPTZ,
    actual_return_amount          NUMERIC(20, 2),
    actual_net_return             NUMERIC(20, 2),
    returns_recorded_at           TIMESTAMPTZ,
    distribution_status           TEXT NOT NULL,
    distributed_amount            NUMERIC(20, 2),
    distributed_at                TIMESTAMPTZ,
    cancelled_at                  TIMESTAMPTZ,
    created_at                    TIMESTAMPTZ NOT NULL,
    updated_at                    TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_PAYMENT_INTENTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS payment_intentions (
    id                     UUID PRIMARY KEY,
    user_id                BIGINT NOT NULL,
    profile_id             UUID NOT NULL,
    intention_type         TEXT NOT NULL,
    amount                 NUMERIC(20, 2) NOT NULL,
    currency               TEXT NOT NULL,
    status                 TEXT NOT NULL,
    gateway_intention_id   TEXT NOT NULL,
    gateway_order_id       BIGINT,
    client_secret          TEXT NOT NULL,
    extras                 JSONB NOT NULL,
    is_executed            BOOLEAN NOT NULL DEFAULT FALSE,
    execution_attempts     INTEGER NOT NULL DEFAULT 0,
    last_error             TEXT,
    gateway_transaction_id TEXT,
    investment_id          UUID,
    created_at             TIMESTAMPTZ NOT NULL,
    updated_at             TIMESTAMPTZ NOT NULL,
    expires_at             TIMESTAMPTZ NOT NULL,
    completed_at           TIMESTAMPTZ,
    executed_at            TIMESTAMPTZ
)
"#;

const CREATE_PAYOUT_REQUESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS payout_requests (
    id               UUID PRIMARY KEY,
    holder_id        UUID NOT NULL REFERENCES wallets(holder_id),
    holder_kind      TEXT NOT NULL,
    user_id          BIGINT NOT NULL,
    kind             TEXT NOT NULL,  -- withdrawal | bank_transfer
    amount           NUMERIC(20, 2) NOT NULL CHECK (amount > 0),
    status           TEXT NOT NULL,
    bank_account     TEXT,
    rejection_reason TEXT,
    created_at       TIMESTAMPTZ NOT NULL,
    updated_at       TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_wallet_entries_holder ON wallet_entries (holder_id, created_at);
CREATE INDEX IF NOT EXISTS idx_investments_opportunity ON investments (opportunity_id, created_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_intentions_gateway_order
    ON payment_intentions (gateway_order_id) WHERE gateway_order_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_intentions_pending
    ON payment_intentions (status, is_executed);
CREATE INDEX IF NOT EXISTS idx_payouts_holder ON payout_requests (holder_id, created_at)
"#;
