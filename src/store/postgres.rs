//! PostgreSQL store
//!
//! Runtime-checked `sqlx::query` with explicit binds. Enums are stored as
//! TEXT using their `as_str()` form; metadata and extras as JSONB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use std::str::FromStr;

use super::{Store, StoreTx};
use crate::core_types::{IntentionId, InvestmentId, OpportunityId, PayoutId, ProfileId};
use crate::db::Database;
use crate::error::EngineError;
use crate::investment::models::Investment;
use crate::opportunity::Opportunity;
use crate::payment::types::{IntentionExtras, PaymentIntention};
use crate::wallet::holder::{InvestorProfile, OwnerProfile};
use crate::wallet::models::{EntryMeta, Wallet, WalletEntry};
use crate::wallet::payout::PayoutRequest;

const OPPORTUNITY_COLUMNS: &str = "id, owner_profile_id, owner_user_id, title, status, \
     total_shares, available_shares, share_price, min_investment_amount, max_investment_amount, \
     allow_self_sale, allow_authorized_sale, shipping_fee_per_share, expected_profit_per_share, \
     expected_net_profit_per_share, expected_delivery_date, expected_distribution_date, \
     offering_start, offering_end, created_at, updated_at";

const INVESTMENT_COLUMNS: &str = "id, opportunity_id, investor_profile_id, investor_user_id, \
     shares, investment_type, share_price, amount, shipping_fee_per_share, total_payment_required, \
     payment_channel, payment_intention_id, expected_profit_per_share, \
     expected_net_profit_per_share, expected_delivery_date, expected_distribution_date, status, \
     merchandise_status, merchandise_arrived_at, actual_return_amount, actual_net_return, \
     returns_recorded_at, distribution_status, distributed_amount, distributed_at, cancelled_at, \
     created_at, updated_at";

const INTENTION_COLUMNS: &str = "id, user_id, profile_id, intention_type, amount, currency, \
     status, gateway_intention_id, gateway_order_id, client_secret, extras, is_executed, \
     execution_attempts, last_error, gateway_transaction_id, investment_id, created_at, \
     updated_at, expires_at, completed_at, executed_at";

const PAYOUT_COLUMNS: &str = "id, holder_id, holder_kind, user_id, kind, amount, status, \
     bank_account, rejection_reason, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<Self::Tx, EngineError> {
        let tx = self.db.pool().begin().await?;
        Ok(PgTx { tx })
    }
}

/// Open PostgreSQL transaction; rolled back by sqlx on drop
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

fn parse_col<T>(row: &PgRow, col: &str) -> Result<T, EngineError>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(col)?;
    raw.parse().map_err(EngineError::Database)
}

fn parse_opt_col<T>(row: &PgRow, col: &str) -> Result<Option<T>, EngineError>
where
    T: FromStr<Err = String>,
{
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| s.parse().map_err(EngineError::Database))
        .transpose()
}

fn wallet_from_row(row: &PgRow) -> Result<Wallet, EngineError> {
    Ok(Wallet {
        holder_id: row.try_get("holder_id")?,
        holder_kind: parse_col(row, "holder_kind")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<WalletEntry, EngineError> {
    let meta: Json<EntryMeta> = row.try_get("meta")?;
    Ok(WalletEntry {
        id: row.try_get("id")?,
        holder_id: row.try_get("holder_id")?,
        kind: parse_col(row, "kind")?,
        amount: row.try_get("amount")?,
        meta: meta.0,
        created_at: row.try_get("created_at")?,
    })
}

fn opportunity_from_row(row: &PgRow) -> Result<Opportunity, EngineError> {
    Ok(Opportunity {
        id: row.try_get("id")?,
        owner_profile_id: row.try_get("owner_profile_id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        title: row.try_get("title")?,
        status: parse_col(row, "status")?,
        total_shares: row.try_get("total_shares")?,
        available_shares: row.try_get("available_shares")?,
        share_price: row.try_get("share_price")?,
        min_investment_amount: row.try_get("min_investment_amount")?,
        max_investment_amount: row.try_get("max_investment_amount")?,
        allow_self_sale: row.try_get("allow_self_sale")?,
        allow_authorized_sale: row.try_get("allow_authorized_sale")?,
        shipping_fee_per_share: row.try_get("shipping_fee_per_share")?,
        expected_profit_per_share: row.try_get("expected_profit_per_share")?,
        expected_net_profit_per_share: row.try_get("expected_net_profit_per_share")?,
        expected_delivery_date: row.try_get("expected_delivery_date")?,
        expected_distribution_date: row.try_get("expected_distribution_date")?,
        offering_start: row.try_get("offering_start")?,
        offering_end: row.try_get("offering_end")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn investment_from_row(row: &PgRow) -> Result<Investment, EngineError> {
    Ok(Investment {
        id: row.try_get("id")?,
        opportunity_id: row.try_get("opportunity_id")?,
        investor_profile_id: row.try_get("investor_profile_id")?,
        investor_user_id: row.try_get("investor_user_id")?,
        shares: row.try_get("shares")?,
        investment_type: parse_col(row, "investment_type")?,
        share_price: row.try_get("share_price")?,
        amount: row.try_get("amount")?,
        shipping_fee_per_share: row.try_get("shipping_fee_per_share")?,
        total_payment_required: row.try_get("total_payment_required")?,
        payment_channel: parse_col(row, "payment_channel")?,
        payment_intention_id: row.try_get("payment_intention_id")?,
        expected_profit_per_share: row.try_get("expected_profit_per_share")?,
        expected_net_profit_per_share: row.try_get("expected_net_profit_per_share")?,
        expected_delivery_date: row.try_get("expected_delivery_date")?,
        expected_distribution_date: row.try_get("expected_distribution_date")?,
        status: parse_col(row, "status")?,
        merchandise_status: parse_opt_col(row, "merchandise_status")?,
        merchandise_arrived_at: row.try_get("merchandise_arrived_at")?,
        actual_return_amount: row.try_get("actual_return_amount")?,
        actual_net_return: row.try_get("actual_net_return")?,
        returns_recorded_at: row.try_get("returns_recorded_at")?,
        distribution_status: parse_col(row, "distribution_status")?,
        distributed_amount: row.try_get("distributed_amount")?,
        distributed_at: row.try_get("distributed_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn intention_from_row(row: &PgRow) -> Result<PaymentIntention, EngineError> {
    let extras: Json<IntentionExtras> = row.try_get("extras")?;
    Ok(PaymentIntention {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        profile_id: row.try_get("profile_id")?,
        intention_type: parse_col(row, "intention_type")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        status: parse_col(row, "status")?,
        gateway_intention_id: row.try_get("gateway_intention_id")?,
        gateway_order_id: row.try_get("gateway_order_id")?,
        client_secret: row.try_get("client_secret")?,
        extras: extras.0,
        is_executed: row.try_get("is_executed")?,
        execution_attempts: row.try_get("execution_attempts")?,
        last_error: row.try_get("last_error")?,
        gateway_transaction_id: row.try_get("gateway_transaction_id")?,
        investment_id: row.try_get("investment_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        expires_at: row.try_get("expires_at")?,
        completed_at: row.try_get("completed_at")?,
        executed_at: row.try_get("executed_at")?,
    })
}

fn payout_from_row(row: &PgRow) -> Result<PayoutRequest, EngineError> {
    Ok(PayoutRequest {
        id: row.try_get("id")?,
        holder_id: row.try_get("holder_id")?,
        holder_kind: parse_col(row, "holder_kind")?,
        user_id: row.try_get("user_id")?,
        kind: parse_col(row, "kind")?,
        amount: row.try_get("amount")?,
        status: parse_col(row, "status")?,
        bank_account: row.try_get("bank_account")?,
        rejection_reason: row.try_get("rejection_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PgTx {
    async fn insert_wallet(&mut self, wallet: &Wallet) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO wallets (holder_id, holder_kind, user_id, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(wallet.holder_id)
        .bind(wallet.holder_kind.as_str())
        .bind(wallet.user_id)
        .bind(wallet.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn fetch_opportunity(
        &mut self,
        id: OpportunityId,
        for_update: bool,
    ) -> Result<Option<Opportunity>, EngineError> {
        let sql = format!(
            "SELECT {} FROM opportunities WHERE id = $1{}",
            OPPORTUNITY_COLUMNS,
            if for_update { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(opportunity_from_row).transpose()
    }

    async fn fetch_investment(
        &mut self,
        id: InvestmentId,
        for_update: bool,
    ) -> Result<Option<Investment>, EngineError> {
        let sql = format!(
            "SELECT {} FROM investments WHERE id = $1{}",
            INVESTMENT_COLUMNS,
            if for_update { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(investment_from_row).transpose()
    }

    async fn fetch_intention(
        &mut self,
        id: IntentionId,
        for_update: bool,
    ) -> Result<Option<PaymentIntention>, EngineError> {
        let sql = format!(
            "SELECT {} FROM payment_intentions WHERE id = $1{}",
            INTENTION_COLUMNS,
            if for_update { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(intention_from_row).transpose()
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self) -> Result<(), EngineError> {
        self.tx.commit().await?;
        Ok(())
    }

    // === Profiles & wallets ===

    async fn insert_investor(&mut self, profile: &InvestorProfile) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO investor_profiles (id, user_id, display_name, is_active, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(profile.id)
        .bind(profile.user_id)
        .bind(&profile.display_name)
        .bind(profile.is_active)
        .bind(profile.created_at)
        .execute(&mut *self.tx)
        .await?;

        self.insert_wallet(&Wallet {
            holder_id: profile.id,
            holder_kind: crate::wallet::models::HolderKind::Investor,
            user_id: profile.user_id,
            created_at: profile.created_at,
        })
        .await
    }

    async fn insert_owner(&mut self, profile: &OwnerProfile) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO owner_profiles (id, user_id, business_name, is_active, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(profile.id)
        .bind(profile.user_id)
        .bind(&profile.business_name)
        .bind(profile.is_active)
        .bind(profile.created_at)
        .execute(&mut *self.tx)
        .await?;

        self.insert_wallet(&Wallet {
            holder_id: profile.id,
            holder_kind: crate::wallet::models::HolderKind::Owner,
            user_id: profile.user_id,
            created_at: profile.created_at,
        })
        .await
    }

    async fn investor(&mut self, id: ProfileId) -> Result<Option<InvestorProfile>, EngineError> {
        let row = sqlx::query(
            "SELECT id, user_id, display_name, is_active, created_at
             FROM investor_profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(InvestorProfile {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                display_name: row.try_get("display_name")?,
                is_active: row.try_get("is_active")?,
                created_at: row.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn owner(&mut self, id: ProfileId) -> Result<Option<OwnerProfile>, EngineError> {
        let row = sqlx::query(
            "SELECT id, user_id, business_name, is_active, created_at
             FROM owner_profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(OwnerProfile {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                business_name: row.try_get("business_name")?,
                is_active: row.try_get("is_active")?,
                created_at: row.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn lock_wallet(&mut self, holder_id: ProfileId) -> Result<Option<Wallet>, EngineError> {
        let row = sqlx::query(
            "SELECT holder_id, holder_kind, user_id, created_at
             FROM wallets WHERE holder_id = $1
             FOR UPDATE",
        )
        .bind(holder_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(wallet_from_row).transpose()
    }

    async fn wallet_balance(&mut self, holder_id: ProfileId) -> Result<Decimal, EngineError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(CASE WHEN kind = 'deposit' THEN amount ELSE -amount END), 0)
                    AS balance
             FROM wallet_entries WHERE holder_id = $1",
        )
        .bind(holder_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get("balance")?)
    }

    async fn insert_wallet_entry(&mut self, entry: &WalletEntry) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO wallet_entries
                (id, holder_id, kind, amount, reason, reference, meta, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(entry.holder_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(entry.meta.reason.as_str())
        .bind(entry.meta.reference)
        .bind(Json(&entry.meta))
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn wallet_entries(
        &mut self,
        holder_id: ProfileId,
    ) -> Result<Vec<WalletEntry>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, holder_id, kind, amount, meta, created_at
             FROM wallet_entries WHERE holder_id = $1
             ORDER BY created_at, id",
        )
        .bind(holder_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    // === Opportunities ===

    async fn insert_opportunity(&mut self, o: &Opportunity) -> Result<(), EngineError> {
        let sql = format!(
            "INSERT INTO opportunities ({}) VALUES
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
              $19, $20, $21)",
            OPPORTUNITY_COLUMNS
        );
        sqlx::query(&sql)
            .bind(o.id)
            .bind(o.owner_profile_id)
            .bind(o.owner_user_id)
            .bind(&o.title)
            .bind(o.status.as_str())
            .bind(o.total_shares)
            .bind(o.available_shares)
            .bind(o.share_price)
            .bind(o.min_investment_amount)
            .bind(o.max_investment_amount)
            .bind(o.allow_self_sale)
            .bind(o.allow_authorized_sale)
            .bind(o.shipping_fee_per_share)
            .bind(o.expected_profit_per_share)
            .bind(o.expected_net_profit_per_share)
            .bind(o.expected_delivery_date)
            .bind(o.expected_distribution_date)
            .bind(o.offering_start)
            .bind(o.offering_end)
            .bind(o.created_at)
            .bind(o.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn opportunity(&mut self, id: OpportunityId) -> Result<Option<Opportunity>, EngineError> {
        self.fetch_opportunity(id, false).await
    }

    async fn lock_opportunity(
        &mut self,
        id: OpportunityId,
    ) -> Result<Option<Opportunity>, EngineError> {
        self.fetch_opportunity(id, true).await
    }

    async fn reserve_shares(
        &mut self,
        id: OpportunityId,
        shares: i64,
        now: DateTime<Utc>,
    ) -> Result<Opportunity, EngineError> {
        if shares <= 0 {
            return Err(EngineError::InvalidShares);
        }

        // Single conditional read-modify-write; SET expressions see the old row
        let sql = format!(
            "UPDATE opportunities
             SET available_shares = available_shares - $2,
                 status = CASE WHEN available_shares - $2 = 0 AND status = 'open'
                               THEN 'completed' ELSE status END,
                 updated_at = $3
             WHERE id = $1 AND available_shares >= $2
             RETURNING {}",
            OPPORTUNITY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(shares)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => opportunity_from_row(&row),
            None => match self.fetch_opportunity(id, false).await? {
                Some(opp) => Err(EngineError::InsufficientShares {
                    requested: shares,
                    available: opp.available_shares,
                }),
                None => Err(EngineError::OpportunityNotFound(id.to_string())),
            },
        }
    }

    async fn save_opportunity(&mut self, o: &Opportunity) -> Result<(), EngineError> {
        let result = sqlx::query(
            "UPDATE opportunities SET
                title = $2, status = $3, total_shares = $4, available_shares = $5,
                share_price = $6, min_investment_amount = $7, max_investment_amount = $8,
                allow_self_sale = $9, allow_authorized_sale = $10, shipping_fee_per_share = $11,
                expected_profit_per_share = $12, expected_net_profit_per_share = $13,
                expected_delivery_date = $14, expected_distribution_date = $15,
                offering_start = $16, offering_end = $17, updated_at = $18
             WHERE id = $1",
        )
        .bind(o.id)
        .bind(&o.title)
        .bind(o.status.as_str())
        .bind(o.total_shares)
        .bind(o.available_shares)
        .bind(o.share_price)
        .bind(o.min_investment_amount)
        .bind(o.max_investment_amount)
        .bind(o.allow_self_sale)
        .bind(o.allow_authorized_sale)
        .bind(o.shipping_fee_per_share)
        .bind(o.expected_profit_per_share)
        .bind(o.expected_net_profit_per_share)
        .bind(o.expected_delivery_date)
        .bind(o.expected_distribution_date)
        .bind(o.offering_start)
        .bind(o.offering_end)
        .bind(o.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::OpportunityNotFound(o.id.to_string()));
        }
        Ok(())
    }

    // === Investments ===

    async fn insert_investment(&mut self, i: &Investment) -> Result<(), EngineError> {
        let sql = format!(
            "INSERT INTO investments ({}) VALUES
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
              $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)",
            INVESTMENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(i.id)
            .bind(i.opportunity_id)
            .bind(i.investor_profile_id)
            .bind(i.investor_user_id)
            .bind(i.shares)
            .bind(i.investment_type.as_str())
            .bind(i.share_price)
            .bind(i.amount)
            .bind(i.shipping_fee_per_share)
            .bind(i.total_payment_required)
            .bind(i.payment_channel.as_str())
            .bind(i.payment_intention_id)
            .bind(i.expected_profit_per_share)
            .bind(i.expected_net_profit_per_share)
            .bind(i.expected_delivery_date)
            .bind(i.expected_distribution_date)
            .bind(i.status.as_str())
            .bind(i.merchandise_status.map(|s| s.as_str()))
            .bind(i.merchandise_arrived_at)
            .bind(i.actual_return_amount)
            .bind(i.actual_net_return)
            .bind(i.returns_recorded_at)
            .bind(i.distribution_status.as_str())
            .bind(i.distributed_amount)
            .bind(i.distributed_at)
            .bind(i.cancelled_at)
            .bind(i.created_at)
            .bind(i.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn investment(&mut self, id: InvestmentId) -> Result<Option<Investment>, EngineError> {
        self.fetch_investment(id, false).await
    }

    async fn lock_investment(
        &mut self,
        id: InvestmentId,
    ) -> Result<Option<Investment>, EngineError> {
        self.fetch_investment(id, true).await
    }

    async fn investments_for_opportunity(
        &mut self,
        opportunity_id: OpportunityId,
    ) -> Result<Vec<Investment>, EngineError> {
        let sql = format!(
            "SELECT {} FROM investments WHERE opportunity_id = $1 ORDER BY created_at, id",
            INVESTMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(opportunity_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(investment_from_row).collect()
    }

    async fn save_investment(&mut self, i: &Investment) -> Result<(), EngineError> {
        let result = sqlx::query(
            "UPDATE investments SET
                payment_intention_id = $2, status = $3, merchandise_status = $4,
                merchandise_arrived_at = $5, actual_return_amount = $6, actual_net_return = $7,
                returns_recorded_at = $8, distribution_status = $9, distributed_amount = $10,
                distributed_at = $11, cancelled_at = $12, updated_at = $13
             WHERE id = $1",
        )
        .bind(i.id)
        .bind(i.payment_intention_id)
        .bind(i.status.as_str())
        .bind(i.merchandise_status.map(|s| s.as_str()))
        .bind(i.merchandise_arrived_at)
        .bind(i.actual_return_amount)
        .bind(i.actual_net_return)
        .bind(i.returns_recorded_at)
        .bind(i.distribution_status.as_str())
        .bind(i.distributed_amount)
        .bind(i.distributed_at)
        .bind(i.cancelled_at)
        .bind(i.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::InvestmentNotFound(i.id.to_string()));
        }
        Ok(())
    }

    // === Payment intentions ===

    async fn insert_intention(&mut self, p: &PaymentIntention) -> Result<(), EngineError> {
        let sql = format!(
            "INSERT INTO payment_intentions ({}) VALUES
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
              $19, $20, $21)",
            INTENTION_COLUMNS
        );
        sqlx::query(&sql)
            .bind(p.id)
            .bind(p.user_id)
            .bind(p.profile_id)
            .bind(p.intention_type.as_str())
            .bind(p.amount)
            .bind(&p.currency)
            .bind(p.status.as_str())
            .bind(&p.gateway_intention_id)
            .bind(p.gateway_order_id)
            .bind(&p.client_secret)
            .bind(Json(&p.extras))
            .bind(p.is_executed)
            .bind(p.execution_attempts)
            .bind(&p.last_error)
            .bind(&p.gateway_transaction_id)
            .bind(p.investment_id)
            .bind(p.created_at)
            .bind(p.updated_at)
            .bind(p.expires_at)
            .bind(p.completed_at)
            .bind(p.executed_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn intention(
        &mut self,
        id: IntentionId,
    ) -> Result<Option<PaymentIntention>, EngineError> {
        self.fetch_intention(id, false).await
    }

    async fn lock_intention(
        &mut self,
        id: IntentionId,
    ) -> Result<Option<PaymentIntention>, EngineError> {
        self.fetch_intention(id, true).await
    }

    async fn lock_intention_by_gateway_order(
        &mut self,
        gateway_order_id: i64,
    ) -> Result<Option<PaymentIntention>, EngineError> {
        let sql = format!(
            "SELECT {} FROM payment_intentions WHERE gateway_order_id = $1 FOR UPDATE",
            INTENTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(gateway_order_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(intention_from_row).transpose()
    }

    async fn save_intention(&mut self, p: &PaymentIntention) -> Result<(), EngineError> {
        let result = sqlx::query(
            "UPDATE payment_intentions SET
                status = $2, gateway_order_id = $3, is_executed = $4, execution_attempts = $5,
                last_error = $6, gateway_transaction_id = $7, investment_id = $8,
                updated_at = $9, completed_at = $10, executed_at = $11
             WHERE id = $1",
        )
        .bind(p.id)
        .bind(p.status.as_str())
        .bind(p.gateway_order_id)
        .bind(p.is_executed)
        .bind(p.execution_attempts)
        .bind(&p.last_error)
        .bind(&p.gateway_transaction_id)
        .bind(p.investment_id)
        .bind(p.updated_at)
        .bind(p.completed_at)
        .bind(p.executed_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::IntentionNotFound(p.id.to_string()));
        }
        Ok(())
    }

    async fn expirable_intentions(
        &mut self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PaymentIntention>, EngineError> {
        let sql = format!(
            "SELECT {} FROM payment_intentions
             WHERE status IN ('created', 'active') AND expires_at <= $1
             ORDER BY expires_at
             LIMIT $2",
            INTENTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(intention_from_row).collect()
    }

    async fn unexecuted_intentions(
        &mut self,
        max_attempts: i32,
        limit: usize,
    ) -> Result<Vec<PaymentIntention>, EngineError> {
        let sql = format!(
            "SELECT {} FROM payment_intentions
             WHERE status = 'completed' AND is_executed = FALSE AND execution_attempts < $1
             ORDER BY updated_at
             LIMIT $2",
            INTENTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(max_attempts)
            .bind(limit as i64)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(intention_from_row).collect()
    }

    // === Payouts ===

    async fn insert_payout(&mut self, p: &PayoutRequest) -> Result<(), EngineError> {
        let sql = format!(
            "INSERT INTO payout_requests ({}) VALUES
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            PAYOUT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(p.id)
            .bind(p.holder_id)
            .bind(p.holder_kind.as_str())
            .bind(p.user_id)
            .bind(p.kind.as_str())
            .bind(p.amount)
            .bind(p.status.as_str())
            .bind(&p.bank_account)
            .bind(&p.rejection_reason)
            .bind(p.created_at)
            .bind(p.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn lock_payout(&mut self, id: PayoutId) -> Result<Option<PayoutRequest>, EngineError> {
        let sql = format!(
            "SELECT {} FROM payout_requests WHERE id = $1 FOR UPDATE",
            PAYOUT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(payout_from_row).transpose()
    }

    async fn save_payout(&mut self, p: &PayoutRequest) -> Result<(), EngineError> {
        let result = sqlx::query(
            "UPDATE payout_requests SET status = $2, rejection_reason = $3, updated_at = $4
             WHERE id = $1",
        )
        .bind(p.id)
        .bind(p.status.as_str())
        .bind(&p.rejection_reason)
        .bind(p.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::PayoutNotFound(p.id.to_string()));
        }
        Ok(())
    }

    async fn payouts_for_holder(
        &mut self,
        holder_id: ProfileId,
    ) -> Result<Vec<PayoutRequest>, EngineError> {
        let sql = format!(
            "SELECT {} FROM payout_requests WHERE holder_id = $1 ORDER BY created_at DESC",
            PAYOUT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(holder_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(payout_from_row).collect()
    }
}
