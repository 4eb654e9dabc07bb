use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::runtime::Runtime;

use tokens_core::criteria::{PageSpecification, TokenCriteria};
use tokens_core::error::TokenError;
use tokens_core::id::{LockId, StateRef};
use tokens_core::locks::{current_time_millis, ReservationEntry, ReservationOutcome, TokenVault};
use tokens_core::states::{FungibleToken, StateAndRef};

/// SQL query constants to avoid repetition
mod sql {
    pub const CREATE_TOKENS_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS fungible_tokens (
            tx_hash BLOB NOT NULL,
            output_index INTEGER NOT NULL,
            token_identifier TEXT NOT NULL,
            fraction_digits INTEGER NOT NULL,
            holder_key BLOB NOT NULL,
            issuer_key BLOB NOT NULL,
            state BLOB NOT NULL,
            PRIMARY KEY (tx_hash, output_index)
        );
    "#;

    pub const CREATE_TOKENS_INDEX: &str = r#"
        CREATE INDEX IF NOT EXISTS idx_fungible_tokens_type
        ON fungible_tokens(token_identifier, fraction_digits);
    "#;

    pub const CREATE_SOFT_LOCKS_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS soft_locks (
            tx_hash BLOB NOT NULL,
            output_index INTEGER NOT NULL,
            lock_id BLOB NOT NULL,
            acquired_at INTEGER NOT NULL,
            timeout_ms INTEGER,
            PRIMARY KEY (tx_hash, output_index)
        );
    "#;

    pub const CREATE_SOFT_LOCKS_INDEX: &str = r#"
        CREATE INDEX IF NOT EXISTS idx_soft_locks_lock_id ON soft_locks(lock_id);
    "#;

    pub const INSERT_TOKEN: &str = r#"
        INSERT OR IGNORE INTO fungible_tokens
            (tx_hash, output_index, token_identifier, fraction_digits, holder_key, issuer_key, state)
        VALUES (?, ?, ?, ?, ?, ?, ?)
    "#;

    /// Binds: identifier, digits, holder, holder, issuer, issuer,
    /// include_reserved, now, limit, offset
    pub const QUERY_TOKENS: &str = r#"
        SELECT t.tx_hash, t.output_index, t.state
        FROM fungible_tokens t
        LEFT JOIN soft_locks l
            ON l.tx_hash = t.tx_hash AND l.output_index = t.output_index
        WHERE t.token_identifier = ?
          AND t.fraction_digits = ?
          AND (? IS NULL OR t.holder_key = ?)
          AND (? IS NULL OR t.issuer_key = ?)
          AND (? OR l.lock_id IS NULL
               OR (l.timeout_ms IS NOT NULL AND l.acquired_at + l.timeout_ms <= ?))
        ORDER BY t.tx_hash, t.output_index
        LIMIT ? OFFSET ?
    "#;

    pub const TOKEN_EXISTS: &str = r#"
        SELECT 1 FROM fungible_tokens WHERE tx_hash = ? AND output_index = ?
    "#;

    /// Takes the record if it is free, already ours, or held by an expired lock
    pub const UPSERT_SOFT_LOCK: &str = r#"
        INSERT INTO soft_locks (tx_hash, output_index, lock_id, acquired_at, timeout_ms)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (tx_hash, output_index) DO UPDATE SET
            lock_id = excluded.lock_id,
            acquired_at = excluded.acquired_at,
            timeout_ms = excluded.timeout_ms
        WHERE soft_locks.lock_id = excluded.lock_id
           OR (soft_locks.timeout_ms IS NOT NULL
               AND soft_locks.acquired_at + soft_locks.timeout_ms <= excluded.acquired_at)
    "#;

    pub const GET_SOFT_LOCK: &str = r#"
        SELECT lock_id, acquired_at, timeout_ms
        FROM soft_locks
        WHERE tx_hash = ? AND output_index = ?
    "#;

    pub const GET_LOCKS_BY_LOCK_ID: &str = r#"
        SELECT tx_hash, output_index, acquired_at, timeout_ms
        FROM soft_locks
        WHERE lock_id = ? AND (timeout_ms IS NULL OR acquired_at + timeout_ms > ?)
        ORDER BY tx_hash, output_index
    "#;

    pub const DELETE_LOCKS_BY_LOCK_ID: &str = r#"
        DELETE FROM soft_locks WHERE lock_id = ?
    "#;

    pub const DELETE_SOFT_LOCK: &str = r#"
        DELETE FROM soft_locks
        WHERE tx_hash = ? AND output_index = ? AND lock_id = ?
    "#;

    pub const DELETE_TOKEN: &str = r#"
        DELETE FROM fungible_tokens WHERE tx_hash = ? AND output_index = ?
    "#;

    pub const DELETE_EXPIRED_LOCKS: &str = r#"
        DELETE FROM soft_locks
        WHERE timeout_ms IS NOT NULL AND acquired_at + timeout_ms <= ?
    "#;
}

fn db_err(action: &str, e: sqlx::Error) -> TokenError {
    TokenError::Vault(format!("Failed to {}: {}", action, e))
}

fn state_ref_from_row(row: &SqliteRow) -> Result<StateRef, TokenError> {
    let tx_hash: Vec<u8> = row
        .try_get("tx_hash")
        .map_err(|e| db_err("read tx_hash", e))?;
    let output_index: i64 = row
        .try_get("output_index")
        .map_err(|e| db_err("read output_index", e))?;

    let tx_hash: [u8; 32] = tx_hash
        .try_into()
        .map_err(|_| TokenError::Vault("Stored tx_hash is not 32 bytes".to_string()))?;
    let index = u32::try_from(output_index)
        .map_err(|_| TokenError::Vault(format!("Stored output index {} is out of range", output_index)))?;
    Ok(StateRef::new(tx_hash, index))
}

fn timeout_from_row(row: &SqliteRow) -> Result<(u64, Option<u64>), TokenError> {
    let acquired_at: i64 = row
        .try_get("acquired_at")
        .map_err(|e| db_err("read acquired_at", e))?;
    let timeout_ms: Option<i64> = row
        .try_get("timeout_ms")
        .map_err(|e| db_err("read timeout_ms", e))?;
    Ok((acquired_at as u64, timeout_ms.map(|t| t as u64)))
}

fn lock_id_from_blob(blob: Vec<u8>) -> Result<LockId, TokenError> {
    let bytes: [u8; 16] = blob
        .try_into()
        .map_err(|_| TokenError::Vault("Stored lock id is not 16 bytes".to_string()))?;
    Ok(LockId::from_bytes(bytes))
}

/// SQLite-backed token vault
///
/// The pool holds a single connection, so every statement and transaction
/// is serialized by SQLite itself and `try_reserve` is linearizable per
/// record.
#[derive(Debug)]
pub struct SqliteTokenVault {
    /// The SQLite pool for database connections
    pool: SqlitePool,
    /// Shared runtime for async operations
    rt: Arc<Runtime>,
    /// Location of the database, `None` for in-memory databases
    db_path: Option<PathBuf>,
}

impl SqliteTokenVault {
    /// Open (creating if missing) a database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, TokenError> {
        let db_path = path.as_ref().to_path_buf();
        let db_url = format!("sqlite:{}", db_path.to_string_lossy());
        let mut vault = Self::connect(&db_url)?;
        vault.db_path = Some(db_path);
        Ok(vault)
    }

    /// A private database that lives as long as the vault
    pub fn in_memory() -> Result<Self, TokenError> {
        Self::connect("sqlite::memory:")
    }

    fn connect(db_url: &str) -> Result<Self, TokenError> {
        // Create a runtime for async operations
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map(Arc::new)
            .map_err(|e| TokenError::Vault(format!("Failed to create runtime: {}", e)))?;

        let options = SqliteConnectOptions::from_str(db_url)
            .map_err(|e| db_err("parse database URL", e))?
            .create_if_missing(true);

        let pool = rt
            .block_on(async {
                // Keep the one connection alive so in-memory databases persist
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await
            })
            .map_err(|e| db_err("connect to database", e))?;

        rt.block_on(Self::initialize_schema(&pool))
            .map_err(|e| db_err("initialize database schema", e))?;

        log::debug!("Opened SQLite token vault at {}", db_url);
        Ok(Self {
            pool,
            rt,
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Creates the necessary tables in the database
    async fn initialize_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        for statement in [
            sql::CREATE_TOKENS_TABLE,
            sql::CREATE_TOKENS_INDEX,
            sql::CREATE_SOFT_LOCKS_TABLE,
            sql::CREATE_SOFT_LOCKS_INDEX,
        ] {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }

    fn query(
        &self,
        criteria: &TokenCriteria,
        page: PageSpecification,
        include_reserved: bool,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        let holder = criteria.holder.map(|k| k.bytes().to_vec());
        let issuer = criteria.issuer.map(|k| k.bytes().to_vec());
        let limit = i64::try_from(page.size).unwrap_or(i64::MAX);
        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);

        self.rt.block_on(async {
            let rows = sqlx::query(sql::QUERY_TOKENS)
                .bind(criteria.token_type.identifier.as_str())
                .bind(criteria.token_type.fraction_digits as i64)
                .bind(holder.clone())
                .bind(holder)
                .bind(issuer.clone())
                .bind(issuer)
                .bind(include_reserved)
                .bind(current_time_millis() as i64)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_err("query tokens", e))?;

            let mut states = Vec::with_capacity(rows.len());
            for row in rows {
                let state_ref = state_ref_from_row(&row)?;
                let blob: Vec<u8> = row.try_get("state").map_err(|e| db_err("read state", e))?;
                let state: FungibleToken = bincode::deserialize(&blob)?;
                states.push(StateAndRef::new(state, state_ref));
            }
            Ok(states)
        })
    }
}

impl TokenVault for SqliteTokenVault {
    fn add_tokens(&self, tokens: &[StateAndRef<FungibleToken>]) -> Result<usize, TokenError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await.map_err(|e| db_err("begin transaction", e))?;
            let mut added = 0;

            for token in tokens {
                let state = bincode::serialize(&token.state)?;
                let result = sqlx::query(sql::INSERT_TOKEN)
                    .bind(&token.state_ref.tx_hash[..])
                    .bind(token.state_ref.index as i64)
                    .bind(token.state.token_type().identifier.as_str())
                    .bind(token.state.token_type().fraction_digits as i64)
                    .bind(token.state.holder().owning_key().bytes())
                    .bind(token.state.issuer().owning_key().bytes())
                    .bind(state)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_err("insert token", e))?;
                added += result.rows_affected() as usize;
            }

            tx.commit().await.map_err(|e| db_err("commit tokens", e))?;
            log::debug!("Added {} records to the SQLite vault", added);
            Ok(added)
        })
    }

    fn query_unreserved(
        &self,
        criteria: &TokenCriteria,
        page: PageSpecification,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        self.query(criteria, page, false)
    }

    fn query_all(
        &self,
        criteria: &TokenCriteria,
        page: PageSpecification,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        self.query(criteria, page, true)
    }

    fn try_reserve(
        &self,
        refs: &[StateRef],
        lock_id: &LockId,
        timeout_ms: Option<u64>,
    ) -> Result<ReservationOutcome, TokenError> {
        let timeout_ms = timeout_ms
            .map(i64::try_from)
            .transpose()
            .map_err(|_| TokenError::Vault(format!("Soft lock timeout {:?} ms is out of range", timeout_ms)))?;

        self.rt.block_on(async {
            let mut tx = self.pool.begin().await.map_err(|e| db_err("begin transaction", e))?;
            let now = current_time_millis() as i64;
            let mut conflicts = Vec::new();

            for state_ref in refs {
                let exists = sqlx::query(sql::TOKEN_EXISTS)
                    .bind(&state_ref.tx_hash[..])
                    .bind(state_ref.index as i64)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_err("check token", e))?
                    .is_some();
                if !exists {
                    conflicts.push(*state_ref);
                    continue;
                }

                let result = sqlx::query(sql::UPSERT_SOFT_LOCK)
                    .bind(&state_ref.tx_hash[..])
                    .bind(state_ref.index as i64)
                    .bind(&lock_id.as_bytes()[..])
                    .bind(now)
                    .bind(timeout_ms)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_err("reserve token", e))?;
                if result.rows_affected() == 0 {
                    conflicts.push(*state_ref);
                }
            }

            if !conflicts.is_empty() {
                tx.rollback().await.map_err(|e| db_err("roll back reservation", e))?;
                log::debug!("{} could not reserve {} records", lock_id, conflicts.len());
                return Ok(ReservationOutcome::Conflict(conflicts));
            }

            tx.commit().await.map_err(|e| db_err("commit reservation", e))?;
            log::debug!("{} reserved {} records", lock_id, refs.len());
            Ok(ReservationOutcome::Reserved)
        })
    }

    fn release(&self, lock_id: &LockId) -> Result<usize, TokenError> {
        self.rt.block_on(async {
            let result = sqlx::query(sql::DELETE_LOCKS_BY_LOCK_ID)
                .bind(&lock_id.as_bytes()[..])
                .execute(&self.pool)
                .await
                .map_err(|e| db_err("release lock", e))?;
            let released = result.rows_affected() as usize;
            log::debug!("{} released {} records", lock_id, released);
            Ok(released)
        })
    }

    fn release_refs(&self, refs: &[StateRef], lock_id: &LockId) -> Result<usize, TokenError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await.map_err(|e| db_err("begin transaction", e))?;
            let mut released = 0;
            for state_ref in refs {
                let result = sqlx::query(sql::DELETE_SOFT_LOCK)
                    .bind(&state_ref.tx_hash[..])
                    .bind(state_ref.index as i64)
                    .bind(&lock_id.as_bytes()[..])
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_err("release record", e))?;
                released += result.rows_affected() as usize;
            }
            tx.commit().await.map_err(|e| db_err("commit release", e))?;
            Ok(released)
        })
    }

    fn reservations(&self, lock_id: &LockId) -> Result<Vec<ReservationEntry>, TokenError> {
        self.rt.block_on(async {
            let rows = sqlx::query(sql::GET_LOCKS_BY_LOCK_ID)
                .bind(&lock_id.as_bytes()[..])
                .bind(current_time_millis() as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_err("query reservations", e))?;

            let mut entries = Vec::with_capacity(rows.len());
            for row in rows {
                let state_ref = state_ref_from_row(&row)?;
                let (acquired_at, timeout_ms) = timeout_from_row(&row)?;
                entries.push(ReservationEntry::new(state_ref, lock_id.clone(), acquired_at, timeout_ms));
            }
            Ok(entries)
        })
    }

    fn consume(&self, refs: &[StateRef], lock_id: &LockId) -> Result<usize, TokenError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await.map_err(|e| db_err("begin transaction", e))?;
            let now = current_time_millis();

            for state_ref in refs {
                let row = sqlx::query(sql::GET_SOFT_LOCK)
                    .bind(&state_ref.tx_hash[..])
                    .bind(state_ref.index as i64)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_err("query reservation", e))?;

                let held = match row {
                    Some(row) => {
                        let holder: Vec<u8> = row.try_get("lock_id").map_err(|e| db_err("read lock_id", e))?;
                        let (acquired_at, timeout_ms) = timeout_from_row(&row)?;
                        let entry = ReservationEntry::new(*state_ref, lock_id_from_blob(holder)?, acquired_at, timeout_ms);
                        &entry.lock_id == lock_id && !entry.is_expired(now)
                    }
                    None => false,
                };
                if !held {
                    tx.rollback().await.map_err(|e| db_err("roll back consume", e))?;
                    return Err(TokenError::Vault(format!(
                        "{} does not hold a reservation on {}",
                        lock_id, state_ref
                    )));
                }

                sqlx::query(sql::DELETE_TOKEN)
                    .bind(&state_ref.tx_hash[..])
                    .bind(state_ref.index as i64)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_err("delete token", e))?;
                sqlx::query(sql::DELETE_SOFT_LOCK)
                    .bind(&state_ref.tx_hash[..])
                    .bind(state_ref.index as i64)
                    .bind(&lock_id.as_bytes()[..])
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_err("delete reservation", e))?;
            }

            tx.commit().await.map_err(|e| db_err("commit consume", e))?;
            log::debug!("{} consumed {} records", lock_id, refs.len());
            Ok(refs.len())
        })
    }

    fn cleanup_expired(&self) -> Result<usize, TokenError> {
        self.rt.block_on(async {
            let result = sqlx::query(sql::DELETE_EXPIRED_LOCKS)
                .bind(current_time_millis() as i64)
                .execute(&self.pool)
                .await
                .map_err(|e| db_err("delete expired locks", e))?;
            let removed = result.rows_affected() as usize;
            if removed > 0 {
                log::info!("Removed {} expired reservations", removed);
            }
            Ok(removed)
        })
    }
}
