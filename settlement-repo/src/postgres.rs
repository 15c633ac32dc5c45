//! PostgreSQL repository and job queue adapters.
//!
//! Status transitions are compare-and-set UPDATEs guarded by the current
//! status, ledger applications run in a transaction with the wallet row
//! locked, and the job queue claims work with FOR UPDATE SKIP LOCKED so
//! multiple consumers can pull concurrently.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use settlement_types::{
    AuditEntry, Booking, BookingId, BookingStatus, DomainError, EnqueueOptions, EntryDirection,
    Job, JobId, JobPayload, JobQueue, JobStatus, KycVerification, LedgerEntry, LedgerOutcome,
    Payment, PaymentId, QueueStats, RepoError, RetryDecision, RetryPolicy, SettleOutcome,
    SettlementRecord, SettlementRepository, TransactionSource, UserId, Wallet, WalletId,
    WalletOwner, WalletTransaction,
};

use crate::types::{
    DbAuditEntry, DbBooking, DbJob, DbKycVerification, DbPayment, DbWallet, DbWalletTransaction,
};

const PAYMENT_COLUMNS: &str = "id, reference, booking_id, user_id, gateway, amount, currency, \
     status, gateway_payment_id, gateway_order_id, gateway_response, failure_reason, \
     kyc_required, kyc_verification_id, created_at, completed_at, failed_at";

const BOOKING_COLUMNS: &str =
    "id, user_id, partner_id, total_amount, currency, status, kyc_verification_id, created_at, \
     confirmed_at";

const KYC_COLUMNS: &str = "id, user_id, booking_id, payment_id, provider_verification_id, \
     verification_url, status, created_at, completed_at";

const JOB_COLUMNS: &str =
    "id, payload, priority, not_before, status, attempts, max_attempts, last_error, created_at";

/// How long a claim holds before the job is considered abandoned.
const STALE_CLAIM_SECS: i64 = 60;

// ─────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_settlement_tables_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_jobs_pg.sql"),
        "0002",
    )
    .await?;

    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the database schema (for testing with an existing pool).
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        run_migrations(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))
    }

    async fn reselect_payment(&self, id: PaymentId) -> Result<Payment, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.ok_or(RepoError::NotFound)?.into_domain()
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────

#[async_trait]
impl SettlementRepository for PostgresRepo {
    async fn create_payment(&self, payment: Payment) -> Result<Payment, RepoError> {
        sqlx::query(
            r#"INSERT INTO payments (id, reference, booking_id, user_id, gateway, amount, currency, status, kyc_required, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(payment.id.into_uuid())
        .bind(&payment.reference)
        .bind(payment.booking_id.into_uuid())
        .bind(payment.user_id.into_uuid())
        .bind(payment.gateway.to_string())
        .bind(payment.amount.amount())
        .bind(payment.amount.currency().to_string())
        .bind(payment.status.to_string())
        .bind(payment.kyc_required)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(payment)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE reference = $1",
            PAYMENT_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn find_payment_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE gateway_order_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn settle_payment(
        &self,
        id: PaymentId,
        record: SettlementRecord,
    ) -> Result<SettleOutcome, RepoError> {
        // Compare-and-set on the pending row; only one of N concurrent
        // redeliveries gets a row back.
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            r#"UPDATE payments
               SET status = 'COMPLETED',
                   gateway_payment_id = $2,
                   gateway_order_id = COALESCE($3, gateway_order_id),
                   gateway_response = $4,
                   completed_at = $5
               WHERE id = $1 AND status = 'PENDING'
               RETURNING {}"#,
            PAYMENT_COLUMNS
        ))
        .bind(id.into_uuid())
        .bind(&record.gateway_payment_id)
        .bind(&record.gateway_order_id)
        .bind(&record.gateway_response)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            // The unique index on gateway_payment_id trips when the same
            // gateway transaction tries to settle a second payment.
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                RepoError::Conflict(format!(
                    "gateway transaction {} already settled another payment",
                    record.gateway_payment_id
                ))
            } else {
                RepoError::Database(e.to_string())
            }
        })?;

        match row {
            Some(row) => Ok(SettleOutcome::Settled(row.into_domain()?)),
            None => Ok(SettleOutcome::AlreadyTerminal(
                self.reselect_payment(id).await?,
            )),
        }
    }

    async fn fail_payment(
        &self,
        id: PaymentId,
        reason: String,
        gateway_response: Option<serde_json::Value>,
    ) -> Result<SettleOutcome, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            r#"UPDATE payments
               SET status = 'FAILED',
                   failure_reason = $2,
                   gateway_response = COALESCE($3, gateway_response),
                   failed_at = $4
               WHERE id = $1 AND status = 'PENDING'
               RETURNING {}"#,
            PAYMENT_COLUMNS
        ))
        .bind(id.into_uuid())
        .bind(&reason)
        .bind(&gateway_response)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        match row {
            Some(row) => Ok(SettleOutcome::Settled(row.into_domain()?)),
            None => Ok(SettleOutcome::AlreadyTerminal(
                self.reselect_payment(id).await?,
            )),
        }
    }

    async fn cancel_payment(&self, id: PaymentId) -> Result<SettleOutcome, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            r#"UPDATE payments
               SET status = 'CANCELLED'
               WHERE id = $1 AND status = 'PENDING'
               RETURNING {}"#,
            PAYMENT_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        match row {
            Some(row) => Ok(SettleOutcome::Settled(row.into_domain()?)),
            None => Ok(SettleOutcome::AlreadyTerminal(
                self.reselect_payment(id).await?,
            )),
        }
    }

    async fn set_payment_kyc(
        &self,
        id: PaymentId,
        verification_id: Option<String>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE payments SET kyc_required = TRUE, kyc_verification_id = $2 WHERE id = $1"#,
        )
        .bind(id.into_uuid())
        .bind(&verification_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn count_completed_payments(&self, user_id: UserId) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM payments WHERE user_id = $1 AND status = 'COMPLETED'"#,
        )
        .bind(user_id.into_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.0)
    }

    async fn find_completed_payment_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Payment>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            r#"SELECT {} FROM payments
               WHERE booking_id = $1 AND status = 'COMPLETED'
               ORDER BY completed_at DESC
               LIMIT 1"#,
            PAYMENT_COLUMNS
        ))
        .bind(booking_id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn create_booking(&self, booking: Booking) -> Result<Booking, RepoError> {
        sqlx::query(
            r#"INSERT INTO bookings (id, user_id, partner_id, total_amount, currency, status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(booking.id.into_uuid())
        .bind(booking.user_id.into_uuid())
        .bind(booking.partner_id.into_uuid())
        .bind(booking.total.amount())
        .bind(booking.total.currency().to_string())
        .bind(booking.status.to_string())
        .bind(booking.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(booking)
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, RepoError> {
        let row: Option<DbBooking> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbBooking::into_domain).transpose()
    }

    async fn set_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
    ) -> Result<Booking, RepoError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        // Lock the row so concurrent transitions serialize.
        let row: Option<DbBooking> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let booking = row.ok_or(RepoError::NotFound)?.into_domain()?;

        if !booking.status.can_transition_to(status) {
            return Err(RepoError::Domain(DomainError::InvalidTransition {
                from: booking.status.to_string(),
                to: status.to_string(),
            }));
        }

        let confirmed_at = if status == BookingStatus::Confirmed {
            Some(Utc::now())
        } else {
            booking.confirmed_at
        };

        sqlx::query(r#"UPDATE bookings SET status = $2, confirmed_at = $3 WHERE id = $1"#)
            .bind(id.into_uuid())
            .bind(status.to_string())
            .bind(confirmed_at)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(Booking {
            status,
            confirmed_at,
            ..booking
        })
    }

    async fn set_booking_kyc_verification(
        &self,
        id: BookingId,
        verification_id: Option<String>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(r#"UPDATE bookings SET kyc_verification_id = $2 WHERE id = $1"#)
            .bind(id.into_uuid())
            .bind(&verification_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn is_user_verified(&self, user_id: UserId) -> Result<bool, RepoError> {
        let row: Option<(bool,)> =
            sqlx::query_as(r#"SELECT verified FROM verified_users WHERE user_id = $1"#)
                .bind(user_id.into_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.map(|r| r.0).unwrap_or(false))
    }

    async fn set_user_verified(&self, user_id: UserId, verified: bool) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO verified_users (user_id, verified, updated_at)
               VALUES ($1, $2, $3)
               ON CONFLICT (user_id) DO UPDATE SET verified = $2, updated_at = $3"#,
        )
        .bind(user_id.into_uuid())
        .bind(verified)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn find_pending_kyc(
        &self,
        user_id: UserId,
    ) -> Result<Option<KycVerification>, RepoError> {
        let row: Option<DbKycVerification> = sqlx::query_as(&format!(
            r#"SELECT {} FROM kyc_verifications
               WHERE user_id = $1 AND status = 'PENDING'
               ORDER BY created_at DESC
               LIMIT 1"#,
            KYC_COLUMNS
        ))
        .bind(user_id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbKycVerification::into_domain).transpose()
    }

    async fn insert_kyc_verification(
        &self,
        verification: KycVerification,
    ) -> Result<KycVerification, RepoError> {
        sqlx::query(
            r#"INSERT INTO kyc_verifications (id, user_id, booking_id, payment_id, provider_verification_id, verification_url, status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(verification.id)
        .bind(verification.user_id.into_uuid())
        .bind(verification.booking_id.into_uuid())
        .bind(verification.payment_id.into_uuid())
        .bind(&verification.provider_verification_id)
        .bind(&verification.verification_url)
        .bind(verification.status.to_string())
        .bind(verification.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(verification)
    }

    async fn complete_kyc_verification(
        &self,
        provider_verification_id: &str,
        user_id: UserId,
    ) -> Result<Option<KycVerification>, RepoError> {
        let row: Option<DbKycVerification> = sqlx::query_as(&format!(
            r#"UPDATE kyc_verifications
               SET status = 'APPROVED', completed_at = $3
               WHERE provider_verification_id = $1 AND user_id = $2 AND status = 'PENDING'
               RETURNING {}"#,
            KYC_COLUMNS
        ))
        .bind(provider_verification_id)
        .bind(user_id.into_uuid())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbKycVerification::into_domain).transpose()
    }

    async fn get_or_create_wallet(&self, owner: WalletOwner) -> Result<Wallet, RepoError> {
        let wallet = Wallet::new(owner, settlement_types::Currency::INR);

        sqlx::query(
            r#"INSERT INTO wallets (id, owner_key, balance, currency, created_at)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (owner_key) DO NOTHING"#,
        )
        .bind(wallet.id.into_uuid())
        .bind(owner.storage_key())
        .bind(wallet.balance.amount())
        .bind(wallet.balance.currency().to_string())
        .bind(wallet.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let row: DbWallet = sqlx::query_as(
            r#"SELECT id, owner_key, balance, currency, created_at FROM wallets WHERE owner_key = $1"#,
        )
        .bind(owner.storage_key())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.into_domain()
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>, RepoError> {
        let row: Option<DbWallet> = sqlx::query_as(
            r#"SELECT id, owner_key, balance, currency, created_at FROM wallets WHERE id = $1"#,
        )
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbWallet::into_domain).transpose()
    }

    async fn apply_ledger_entry(&self, entry: LedgerEntry) -> Result<LedgerOutcome, RepoError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        // Lock the wallet row; the idempotency check, balance math, and
        // insert all happen under this lock.
        let row: Option<DbWallet> = sqlx::query_as(
            r#"SELECT id, owner_key, balance, currency, created_at FROM wallets WHERE id = $1 FOR UPDATE"#,
        )
        .bind(entry.wallet_id.into_uuid())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let wallet = row.ok_or(RepoError::NotFound)?.into_domain()?;

        let existing: Option<DbWalletTransaction> = sqlx::query_as(
            r#"SELECT id, wallet_id, amount, currency, direction, source, reference_id, balance_after, description, processed_at
               FROM wallet_transactions
               WHERE reference_id = $1 AND source = $2"#,
        )
        .bind(&entry.reference_id)
        .bind(entry.source.to_string())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if let Some(existing) = existing {
            return Ok(LedgerOutcome::AlreadyApplied(existing.into_domain()?));
        }

        let balance_after = match entry.direction {
            EntryDirection::Credit => wallet.balance.checked_add(entry.amount)?,
            EntryDirection::Debit => wallet.balance.checked_sub(entry.amount)?,
        };

        sqlx::query(r#"UPDATE wallets SET balance = $2 WHERE id = $1"#)
            .bind(entry.wallet_id.into_uuid())
            .bind(balance_after.amount())
            .execute(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        let tx_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"INSERT INTO wallet_transactions (id, wallet_id, amount, currency, direction, source, reference_id, balance_after, description, processed_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(tx_id)
        .bind(entry.wallet_id.into_uuid())
        .bind(entry.amount.amount())
        .bind(entry.amount.currency().to_string())
        .bind(entry.direction.to_string())
        .bind(entry.source.to_string())
        .bind(&entry.reference_id)
        .bind(balance_after.amount())
        .bind(&entry.description)
        .bind(now)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(LedgerOutcome::Applied(WalletTransaction {
            id: settlement_types::WalletTransactionId::from_uuid(tx_id),
            wallet_id: entry.wallet_id,
            amount: entry.amount,
            direction: entry.direction,
            source: entry.source,
            reference_id: entry.reference_id,
            balance_after,
            description: entry.description,
            processed_at: now,
        }))
    }

    async fn find_wallet_transaction(
        &self,
        reference_id: &str,
        source: TransactionSource,
    ) -> Result<Option<WalletTransaction>, RepoError> {
        let row: Option<DbWalletTransaction> = sqlx::query_as(
            r#"SELECT id, wallet_id, amount, currency, direction, source, reference_id, balance_after, description, processed_at
               FROM wallet_transactions
               WHERE reference_id = $1 AND source = $2"#,
        )
        .bind(reference_id)
        .bind(source.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbWalletTransaction::into_domain).transpose()
    }

    async fn list_wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, RepoError> {
        let rows: Vec<DbWalletTransaction> = sqlx::query_as(
            r#"SELECT id, wallet_id, amount, currency, direction, source, reference_id, balance_after, description, processed_at
               FROM wallet_transactions
               WHERE wallet_id = $1
               ORDER BY processed_at ASC"#,
        )
        .bind(wallet_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter()
            .map(DbWalletTransaction::into_domain)
            .collect()
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO audit_log (id, aggregate_id, action, previous, next, actor, recorded_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(entry.id)
        .bind(&entry.aggregate_id)
        .bind(&entry.action)
        .bind(&entry.previous)
        .bind(&entry.next)
        .bind(&entry.actor)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list_audit(&self, aggregate_id: &str) -> Result<Vec<AuditEntry>, RepoError> {
        let rows: Vec<DbAuditEntry> = sqlx::query_as(
            r#"SELECT id, aggregate_id, action, previous, next, actor, recorded_at
               FROM audit_log
               WHERE aggregate_id = $1
               ORDER BY recorded_at ASC"#,
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(DbAuditEntry::into_domain).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// PostgreSQL Job Queue
// ─────────────────────────────────────────────────────────────────────────

/// Job queue backed by a Postgres table. Multiple consumers can pull
/// concurrently thanks to FOR UPDATE SKIP LOCKED.
pub struct PostgresJobQueue {
    pool: PgPool,
    policy: RetryPolicy,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(pool: PgPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(&self, payload: JobPayload, opts: EnqueueOptions) -> Result<JobId, RepoError> {
        let id = JobId::derive(payload.kind(), &payload.dedupe_key());
        let payload_json =
            serde_json::to_value(&payload).map_err(|e| RepoError::Database(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO jobs (id, payload, priority, not_before, status, attempts, max_attempts, created_at)
               VALUES ($1, $2, $3, $4, 'PENDING', 0, $5, $6)
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(id.as_str())
        .bind(&payload_json)
        .bind(opts.priority.as_i16())
        .bind(Utc::now() + opts.delay)
        .bind(self.policy.max_attempts as i32)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(id)
    }

    async fn pull_due(&self, limit: usize) -> Result<Vec<Job>, RepoError> {
        let now = Utc::now();
        let stale_before = now - ChronoDuration::seconds(STALE_CLAIM_SECS);

        let rows: Vec<DbJob> = sqlx::query_as(&format!(
            r#"UPDATE jobs
               SET status = 'RUNNING', attempts = attempts + 1, claimed_at = $1
               WHERE id IN (
                   SELECT id FROM jobs
                   WHERE (status = 'PENDING' AND not_before <= $1)
                      OR (status = 'RUNNING' AND claimed_at < $2)
                   ORDER BY priority DESC, not_before ASC
                   LIMIT $3
                   FOR UPDATE SKIP LOCKED
               )
               RETURNING {}"#,
            JOB_COLUMNS
        ))
        .bind(now)
        .bind(stale_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbJob::into_domain).collect()
    }

    async fn complete(&self, id: &JobId) -> Result<(), RepoError> {
        let result =
            sqlx::query(r#"UPDATE jobs SET status = 'COMPLETED', claimed_at = NULL WHERE id = $1"#)
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn retry(&self, id: &JobId, error: &str) -> Result<RetryDecision, RepoError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let row: Option<(i32, i32)> =
            sqlx::query_as(r#"SELECT attempts, max_attempts FROM jobs WHERE id = $1 FOR UPDATE"#)
                .bind(id.as_str())
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        let (attempts, max_attempts) = row.ok_or(RepoError::NotFound)?;

        let decision = if attempts >= max_attempts {
            sqlx::query(
                r#"UPDATE jobs SET status = 'DEAD', last_error = $2, claimed_at = NULL WHERE id = $1"#,
            )
            .bind(id.as_str())
            .bind(error)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

            RetryDecision::DeadLettered
        } else {
            let next_run = Utc::now() + self.policy.backoff(attempts as u32);
            sqlx::query(
                r#"UPDATE jobs
                   SET status = 'PENDING', not_before = $2, last_error = $3, claimed_at = NULL
                   WHERE id = $1"#,
            )
            .bind(id.as_str())
            .bind(next_run)
            .bind(error)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

            RetryDecision::Scheduled(next_run)
        };

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(decision)
    }

    async fn bury(&self, id: &JobId, error: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE jobs SET status = 'DEAD', last_error = $2, claimed_at = NULL WHERE id = $1"#,
        )
        .bind(id.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<Job>, RepoError> {
        let rows: Vec<DbJob> = sqlx::query_as(&format!(
            "SELECT {} FROM jobs WHERE status = 'DEAD' ORDER BY created_at ASC",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbJob::into_domain).collect()
    }

    async fn stats(&self) -> Result<QueueStats, RepoError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as(r#"SELECT status, COUNT(*) FROM jobs GROUP BY status"#)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match crate::types::parse_job_status(&status)? {
                JobStatus::Pending => stats.pending = count as u64,
                JobStatus::Running => stats.running = count as u64,
                JobStatus::Completed => stats.completed = count as u64,
                JobStatus::Dead => stats.dead = count as u64,
            }
        }
        Ok(stats)
    }
}
