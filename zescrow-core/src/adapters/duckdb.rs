//! DuckDB repository implementation
//!
//! A single `Mutex<Connection>` makes this the only writer in the process.
//! Every deal state change is a compare-and-set on the current status, so a
//! caller that read stale state loses cleanly instead of overwriting.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::types::Type;
use duckdb::{params, Connection, OptionalExt, Row};
use rust_decimal::Decimal;

use crate::domain::amount::zatoshi_to_zec;
use crate::domain::result::Error;
use crate::domain::{
    Blockchain, ChainTransaction, Deal, DealStatus, DealUpdate, Party, SyncState, TxStatus,
    TxType, Wallet,
};
use crate::services::MigrationService;

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock on file")
        || lower.contains("file is already open")
}

const DEAL_COLUMNS: &str = "deal_id, intent_id, client_id, client_near_account, freelancer_id,
    freelancer_near_account, amount_zec, amount_zatoshi, deadline, description, status,
    proof_link, notes, dispute_reason, resolution, created_at, updated_at";

const TX_COLUMNS: &str = "tx_id, deal_id, blockchain, tx_type, from_address, to_address,
    amount_zatoshi, status, confirmations, block_height, created_at, updated_at";

/// What a monitor settlement changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settlement {
    pub transaction_updated: bool,
    pub deal_completed: bool,
}

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the escrow database at `db_path`
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which occur when the API server and a CLI command open the same file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// Throwaway database for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading off: cached extensions in ~/.duckdb may not match the bundled build
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        Ok(conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<crate::services::MigrationResult> {
        let conn = self.conn()?;
        let migration_service = MigrationService::new(&conn);
        migration_service.run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    /// Cheap round trip used by health checks
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    // === Wallet operations ===

    /// One wallet per user; re-creating replaces the previous one
    pub fn upsert_wallet(&self, wallet: &Wallet) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO wallets (user_id, wallet_id, label, transparent_address, shielded_address, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
                wallet_id = excluded.wallet_id,
                label = excluded.label,
                transparent_address = excluded.transparent_address,
                shielded_address = excluded.shielded_address,
                created_at = excluded.created_at",
            params![
                wallet.user_id,
                wallet.wallet_id,
                wallet.label,
                wallet.transparent_address,
                wallet.shielded_address,
                fmt_ts(&wallet.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>> {
        let conn = self.conn()?;
        let wallet = conn
            .query_row(
                "SELECT user_id, wallet_id, label, transparent_address, shielded_address, created_at
                 FROM wallets WHERE user_id = ?",
                [user_id],
                |row| {
                    Ok(Wallet {
                        user_id: row.get(0)?,
                        wallet_id: row.get(1)?,
                        label: row.get(2)?,
                        transparent_address: row.get(3)?,
                        shielded_address: row.get(4)?,
                        created_at: ts_col(row, 5)?,
                    })
                },
            )
            .optional()?;
        Ok(wallet)
    }

    pub fn count_wallets(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM wallets", [], |row| row.get(0))?;
        Ok(count)
    }

    // === Deal operations ===

    /// Store a new deal together with its funding transaction, atomically
    pub fn insert_deal(&self, deal: &Deal, escrow_tx: &ChainTransaction) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            &format!(
                "INSERT INTO deals ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                DEAL_COLUMNS
            ),
            params![
                deal.deal_id,
                deal.intent_id,
                deal.client.id,
                deal.client.near_account_id,
                deal.freelancer.id,
                deal.freelancer.near_account_id,
                deal.amount_zec.to_string(),
                deal.amount_zatoshi,
                fmt_ts(&deal.deadline),
                deal.description,
                deal.status.as_str(),
                deal.proof_link,
                deal.notes,
                deal.dispute_reason,
                deal.resolution.map(|r| r.as_str()),
                fmt_ts(&deal.created_at),
                fmt_ts(&deal.updated_at),
            ],
        )?;
        insert_transaction(&tx, escrow_tx)?;

        tx.commit()?;
        Ok(())
    }

    pub fn get_deal(&self, deal_id: &str) -> Result<Option<Deal>> {
        let conn = self.conn()?;
        let deal = conn
            .query_row(
                &format!("SELECT {} FROM deals WHERE deal_id = ?", DEAL_COLUMNS),
                [deal_id],
                row_to_deal,
            )
            .optional()?;
        Ok(deal)
    }

    /// Deals where the user is either party, most recently touched first
    pub fn get_user_deals(&self, user_id: &str) -> Result<Vec<Deal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM deals
             WHERE client_id = ? OR freelancer_id = ?
             ORDER BY updated_at DESC, deal_id",
            DEAL_COLUMNS
        ))?;
        let deals = stmt
            .query_map(params![user_id, user_id], row_to_deal)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(deals)
    }

    pub fn list_deals(&self, status: Option<DealStatus>, limit: usize) -> Result<Vec<Deal>> {
        let conn = self.conn()?;
        let deals = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM deals WHERE status = ?
                     ORDER BY updated_at DESC, deal_id LIMIT ?",
                    DEAL_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.as_str(), limit as i64], row_to_deal)?
                    .collect::<duckdb::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM deals ORDER BY updated_at DESC, deal_id LIMIT ?",
                    DEAL_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([limit as i64], row_to_deal)?
                    .collect::<duckdb::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(deals)
    }

    /// Deals still waiting on a party, earliest deadline first
    pub fn get_open_deals(&self) -> Result<Vec<Deal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM deals WHERE status IN (?, ?, ?) ORDER BY deadline, deal_id",
            DEAL_COLUMNS
        ))?;
        let deals = stmt
            .query_map(
                params![
                    DealStatus::Created.as_str(),
                    DealStatus::Submitted.as_str(),
                    DealStatus::Disputed.as_str(),
                ],
                row_to_deal,
            )?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(deals)
    }

    /// Compare-and-set a deal from `from` to `to`, applying `update`.
    ///
    /// Returns false when the deal is no longer in `from`.
    pub fn transition_deal(
        &self,
        deal_id: &str,
        from: DealStatus,
        to: DealStatus,
        update: &DealUpdate,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE deals SET
                status = ?,
                proof_link = COALESCE(?, proof_link),
                notes = COALESCE(?, notes),
                dispute_reason = COALESCE(?, dispute_reason),
                resolution = COALESCE(?, resolution),
                updated_at = ?
             WHERE deal_id = ? AND status = ?",
            params![
                to.as_str(),
                update.proof_link,
                update.notes,
                update.dispute_reason,
                update.resolution.map(|r| r.as_str()),
                fmt_ts(&Utc::now()),
                deal_id,
                from.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Put a claimed deal back the way it was before a failed side effect
    pub fn restore_deal(&self, previous: &Deal, current: DealStatus) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE deals SET
                status = ?, proof_link = ?, notes = ?, dispute_reason = ?, resolution = ?,
                updated_at = ?
             WHERE deal_id = ? AND status = ?",
            params![
                previous.status.as_str(),
                previous.proof_link,
                previous.notes,
                previous.dispute_reason,
                previous.resolution.map(|r| r.as_str()),
                fmt_ts(&previous.updated_at),
                previous.deal_id,
                current.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Store the transactions a transition produced, in the same database
    /// transaction that confirms the deal still holds `status`.
    ///
    /// Returns false, storing nothing, when the deal is no longer in `status`.
    pub fn record_transition(
        &self,
        deal_id: &str,
        status: DealStatus,
        records: &[ChainTransaction],
    ) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let confirmed = tx.execute(
            "UPDATE deals SET updated_at = ? WHERE deal_id = ? AND status = ?",
            params![fmt_ts(&Utc::now()), deal_id, status.as_str()],
        )?;
        if confirmed != 1 {
            tx.rollback()?;
            return Ok(false);
        }
        for record in records {
            insert_transaction(&tx, record)?;
        }

        tx.commit()?;
        Ok(true)
    }

    pub fn count_deals_by_status(&self) -> Result<Vec<(DealStatus, i64)>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM deals GROUP BY status ORDER BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((parse_col::<DealStatus>(row, 0)?, row.get(1)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Sum of deal amounts still held by the vault
    pub fn escrowed_zatoshi(&self) -> Result<i64> {
        let conn = self.conn()?;
        let held: Vec<&str> = DealStatus::ALL
            .iter()
            .filter(|s| s.holds_funds())
            .map(|s| s.as_str())
            .collect();
        let placeholders = vec!["?"; held.len()].join(", ");
        let total: Option<i64> = conn.query_row(
            &format!(
                "SELECT CAST(SUM(amount_zatoshi) AS BIGINT) FROM deals WHERE status IN ({})",
                placeholders
            ),
            duckdb::params_from_iter(held),
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0))
    }

    // === Transaction operations ===

    /// Store records with no deal status check, for fixtures
    #[cfg(test)]
    pub fn insert_transactions(&self, txs: &[ChainTransaction]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for record in txs {
            insert_transaction(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_transaction(&self, tx_id: &str) -> Result<Option<ChainTransaction>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM transactions WHERE tx_id = ?", TX_COLUMNS),
                [tx_id],
                row_to_transaction,
            )
            .optional()?;
        Ok(record)
    }

    /// Newest first
    pub fn get_deal_transactions(&self, deal_id: &str) -> Result<Vec<ChainTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE deal_id = ? ORDER BY created_at DESC, tx_id",
            TX_COLUMNS
        ))?;
        let records = stmt
            .query_map([deal_id], row_to_transaction)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Oldest first, so the monitor settles in broadcast order
    pub fn get_pending_transactions(&self, blockchain: Blockchain) -> Result<Vec<ChainTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions
             WHERE blockchain = ? AND status = 'pending'
             ORDER BY created_at ASC, tx_id",
            TX_COLUMNS
        ))?;
        let records = stmt
            .query_map([blockchain.as_str()], row_to_transaction)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn count_pending_transactions(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Record progress on a still-pending transaction
    pub fn update_confirmations(
        &self,
        tx_id: &str,
        confirmations: u32,
        block_height: Option<u64>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE transactions SET confirmations = ?, block_height = ?, updated_at = ?
             WHERE tx_id = ? AND status = 'pending'",
            params![
                confirmations as i64,
                block_height.map(|h| h as i64),
                fmt_ts(&Utc::now()),
                tx_id,
            ],
        )?;
        Ok(changed == 1)
    }

    /// Move a pending transaction to a final status. When `complete_deal`
    /// is set, the owning deal moves `approved -> completed` in the same
    /// database transaction. Both updates are guarded, so replaying a
    /// settlement changes nothing.
    pub fn settle_transaction(
        &self,
        tx_id: &str,
        status: TxStatus,
        confirmations: u32,
        block_height: Option<u64>,
        complete_deal: Option<&str>,
    ) -> Result<Settlement> {
        if status == TxStatus::Pending {
            return Err(Error::validation("Cannot settle a transaction as pending").into());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = fmt_ts(&Utc::now());

        let tx_changed = tx.execute(
            "UPDATE transactions SET status = ?, confirmations = ?, block_height = ?, updated_at = ?
             WHERE tx_id = ? AND status = 'pending'",
            params![
                status.as_str(),
                confirmations as i64,
                block_height.map(|h| h as i64),
                now,
                tx_id,
            ],
        )?;

        let mut deal_changed = 0;
        if let Some(deal_id) = complete_deal {
            deal_changed = tx.execute(
                "UPDATE deals SET status = ?, updated_at = ? WHERE deal_id = ? AND status = ?",
                params![
                    DealStatus::Completed.as_str(),
                    now,
                    deal_id,
                    DealStatus::Approved.as_str(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(Settlement {
            transaction_updated: tx_changed == 1,
            deal_completed: deal_changed == 1,
        })
    }

    // === Sync state ===

    pub fn update_sync_state(&self, state: &SyncState) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO blockchain_sync (blockchain, last_block_height, last_sync_time)
             VALUES (?, ?, ?)
             ON CONFLICT (blockchain) DO UPDATE SET
                last_block_height = excluded.last_block_height,
                last_sync_time = excluded.last_sync_time",
            params![
                state.blockchain.as_str(),
                state.last_block_height as i64,
                fmt_ts(&state.last_sync_time),
            ],
        )?;
        Ok(())
    }

    pub fn get_sync_state(&self, blockchain: Blockchain) -> Result<Option<SyncState>> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT blockchain, last_block_height, last_sync_time
                 FROM blockchain_sync WHERE blockchain = ?",
                [blockchain.as_str()],
                |row| {
                    Ok(SyncState {
                        blockchain: parse_col(row, 0)?,
                        last_block_height: row.get::<_, i64>(1)? as u64,
                        last_sync_time: ts_col(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    // === Doctor checks ===

    /// Deals with no escrow funding transaction on record
    pub fn check_deals_without_escrow(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.deal_id FROM deals d
             WHERE NOT EXISTS (
                SELECT 1 FROM transactions t
                WHERE t.deal_id = d.deal_id AND t.tx_type = 'escrow' AND t.status <> 'failed'
             )
             ORDER BY d.deal_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// `tx_id:deal_id` for transactions whose deal is missing
    pub fn check_orphaned_transactions(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.tx_id || ':' || t.deal_id FROM transactions t
             LEFT JOIN deals d ON t.deal_id = d.deal_id
             WHERE d.deal_id IS NULL
             ORDER BY t.tx_id",
        )?;
        let orphans = stmt
            .query_map([], |row| row.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(orphans)
    }

    /// Approved deals whose Zcash release is neither pending nor confirmed
    pub fn check_approved_without_release(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.deal_id FROM deals d
             WHERE d.status = 'approved' AND NOT EXISTS (
                SELECT 1 FROM transactions t
                WHERE t.deal_id = d.deal_id AND t.blockchain = 'zcash'
                  AND t.tx_type = 'release' AND t.status <> 'failed'
             )
             ORDER BY d.deal_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// `id: problem` for deal and transaction rows with values the escrow
    /// service never writes
    pub fn check_row_integrity(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut problems = Vec::new();

        let mut stmt = conn.prepare(
            "SELECT deal_id, status, amount_zec, amount_zatoshi FROM deals ORDER BY deal_id",
        )?;
        let deals = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        for (deal_id, status, amount_zec, amount_zatoshi) in deals {
            if DealStatus::from_str(&status).is_err() {
                problems.push(format!("{}: unknown status '{}'", deal_id, status));
            }
            if amount_zatoshi <= 0 {
                problems.push(format!("{}: amount {} is not positive", deal_id, amount_zatoshi));
            }
            if Decimal::from_str(&amount_zec).ok() != Some(zatoshi_to_zec(amount_zatoshi)) {
                problems.push(format!(
                    "{}: amount_zec '{}' does not match {} zatoshi",
                    deal_id, amount_zec, amount_zatoshi
                ));
            }
        }

        let mut stmt = conn.prepare(
            "SELECT tx_id, blockchain, tx_type, status FROM transactions ORDER BY tx_id",
        )?;
        let txs = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        for (tx_id, blockchain, tx_type, status) in txs {
            if Blockchain::from_str(&blockchain).is_err()
                || TxType::from_str(&tx_type).is_err()
                || TxStatus::from_str(&status).is_err()
            {
                problems.push(format!(
                    "{}: unknown blockchain/type/status '{}/{}/{}'",
                    tx_id, blockchain, tx_type, status
                ));
            }
        }

        Ok(problems)
    }

    /// Pending transactions broadcast before `cutoff`
    pub fn check_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT tx_id FROM transactions
             WHERE status = 'pending' AND created_at < ?
             ORDER BY created_at",
        )?;
        let ids = stmt
            .query_map([fmt_ts(&cutoff)], |row| row.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(ids)
    }

    pub fn get_db_size(&self) -> Result<u64> {
        match &self.db_path {
            Some(path) => Ok(std::fs::metadata(path)?.len()),
            None => Ok(0),
        }
    }
}

fn insert_transaction(conn: &Connection, record: &ChainTransaction) -> duckdb::Result<usize> {
    conn.execute(
        &format!(
            "INSERT INTO transactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            TX_COLUMNS
        ),
        params![
            record.tx_id,
            record.deal_id,
            record.blockchain.as_str(),
            record.tx_type.as_str(),
            record.from_address,
            record.to_address,
            record.amount_zatoshi,
            record.status.as_str(),
            record.confirmations as i64,
            record.block_height.map(|h| h as i64),
            fmt_ts(&record.created_at),
            fmt_ts(&record.updated_at),
        ],
    )
}

fn row_to_deal(row: &Row) -> duckdb::Result<Deal> {
    let resolution: Option<String> = row.get(14)?;
    Ok(Deal {
        deal_id: row.get(0)?,
        intent_id: row.get(1)?,
        client: Party {
            id: row.get(2)?,
            near_account_id: row.get(3)?,
        },
        freelancer: Party {
            id: row.get(4)?,
            near_account_id: row.get(5)?,
        },
        amount_zec: decimal_col(row, 6)?,
        amount_zatoshi: row.get(7)?,
        deadline: ts_col(row, 8)?,
        description: row.get(9)?,
        status: parse_col(row, 10)?,
        proof_link: row.get(11)?,
        notes: row.get(12)?,
        dispute_reason: row.get(13)?,
        resolution: resolution
            .map(|r| r.parse().map_err(|e: Error| conversion_error(14, e)))
            .transpose()?,
        created_at: ts_col(row, 15)?,
        updated_at: ts_col(row, 16)?,
    })
}

fn row_to_transaction(row: &Row) -> duckdb::Result<ChainTransaction> {
    Ok(ChainTransaction {
        tx_id: row.get(0)?,
        deal_id: row.get(1)?,
        blockchain: parse_col(row, 2)?,
        tx_type: parse_col(row, 3)?,
        from_address: row.get(4)?,
        to_address: row.get(5)?,
        amount_zatoshi: row.get(6)?,
        status: parse_col(row, 7)?,
        confirmations: row.get::<_, i64>(8)? as u32,
        block_height: row.get::<_, Option<i64>>(9)?.map(|h| h as u64),
        created_at: ts_col(row, 10)?,
        updated_at: ts_col(row, 11)?,
    })
}

// Helper functions

/// Fixed-width UTC so string comparison orders chronologically
fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_col<T: FromStr<Err = Error>>(row: &Row, idx: usize) -> duckdb::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn ts_col(row: &Row, idx: usize) -> duckdb::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn decimal_col(row: &Row, idx: usize) -> duckdb::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn party(id: &str) -> Party {
        Party {
            id: id.to_string(),
            near_account_id: format!("near-{}.testnet", id),
        }
    }

    fn sample_deal(deal_id: &str, status: DealStatus, deadline: DateTime<Utc>) -> Deal {
        let now = Utc::now();
        Deal {
            deal_id: deal_id.to_string(),
            intent_id: format!("intent-{}", deal_id),
            client: party("client01"),
            freelancer: party("freelanc"),
            amount_zec: Decimal::new(15, 1),
            amount_zatoshi: 150_000_000,
            deadline,
            description: "Logo design".to_string(),
            status,
            proof_link: None,
            notes: None,
            dispute_reason: None,
            resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn tx(tx_id: &str, deal_id: &str, tx_type: TxType) -> ChainTransaction {
        ChainTransaction::pending(
            tx_id,
            deal_id,
            Blockchain::Zcash,
            tx_type,
            "ztestsapling1a",
            "ztestsapling1b",
            149_999_000,
        )
    }

    fn insert(repo: &DuckDbRepository, deal: &Deal) {
        repo.insert_deal(deal, &tx(&format!("tx-escrow-{}", deal.deal_id), &deal.deal_id, TxType::Escrow))
            .unwrap();
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z").unwrap().with_timezone(&Utc);
        let later = earlier + chrono::Duration::microseconds(1);
        assert!(fmt_ts(&earlier) < fmt_ts(&later));
        assert_eq!(fmt_ts(&earlier), "2026-01-02T03:04:05.000000Z");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error("IO Error: Could not set lock on file"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }

    #[test]
    fn test_settle_rejects_pending_target() {
        let repo = repo();
        let result = repo.settle_transaction("x", TxStatus::Pending, 0, None, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_sync_state_upsert() {
        let repo = repo();
        assert!(repo.get_sync_state(Blockchain::Zcash).unwrap().is_none());

        for height in [10, 12] {
            repo.update_sync_state(&SyncState {
                blockchain: Blockchain::Zcash,
                last_block_height: height,
                last_sync_time: Utc::now(),
            })
            .unwrap();
        }

        let state = repo.get_sync_state(Blockchain::Zcash).unwrap().unwrap();
        assert_eq!(state.last_block_height, 12);
    }

    #[test]
    fn test_orphaned_transaction_detected() {
        let repo = repo();
        let orphan = ChainTransaction::pending(
            "tx-orphan",
            "deal-missing",
            Blockchain::Zcash,
            TxType::Escrow,
            "ztestsapling1a",
            "ztestsapling1b",
            10,
        );
        repo.insert_transactions(&[orphan]).unwrap();
        assert_eq!(
            repo.check_orphaned_transactions().unwrap(),
            vec!["tx-orphan:deal-missing".to_string()]
        );
        assert_eq!(repo.count_pending_transactions().unwrap(), 1);
    }

    #[test]
    fn test_record_transition_stores_records_with_status() {
        let repo = repo();
        insert(&repo, &sample_deal("deal-1", DealStatus::Approved, Utc::now()));

        let release = tx("tx-release", "deal-1", TxType::Release);
        assert!(repo
            .record_transition("deal-1", DealStatus::Approved, &[release])
            .unwrap());
        assert!(repo.get_transaction("tx-release").unwrap().is_some());
        assert!(repo.check_approved_without_release().unwrap().is_empty());
    }

    #[test]
    fn test_record_transition_stores_nothing_after_status_moved() {
        let repo = repo();
        insert(&repo, &sample_deal("deal-1", DealStatus::Created, Utc::now()));

        let refund = tx("tx-refund", "deal-1", TxType::Refund);
        assert!(!repo
            .record_transition("deal-1", DealStatus::Cancelled, &[refund])
            .unwrap());
        assert!(repo.get_transaction("tx-refund").unwrap().is_none());
        assert_eq!(repo.get_deal_transactions("deal-1").unwrap().len(), 1);
    }

    #[test]
    fn test_record_transition_is_all_or_nothing() {
        let repo = repo();
        insert(&repo, &sample_deal("deal-1", DealStatus::Approved, Utc::now()));
        let before = repo.get_deal("deal-1").unwrap().unwrap().updated_at;

        // Second record reuses the escrow tx id, so the insert fails
        let records = [
            tx("tx-release", "deal-1", TxType::Release),
            tx("tx-escrow-deal-1", "deal-1", TxType::Release),
        ];
        assert!(repo
            .record_transition("deal-1", DealStatus::Approved, &records)
            .is_err());
        assert!(repo.get_transaction("tx-release").unwrap().is_none());
        assert_eq!(repo.get_deal("deal-1").unwrap().unwrap().updated_at, before);
        assert_eq!(
            repo.check_approved_without_release().unwrap(),
            vec!["deal-1".to_string()]
        );
    }

    #[test]
    fn test_open_deals_by_deadline() {
        let repo = repo();
        let now = Utc::now();
        insert(&repo, &sample_deal("deal-late", DealStatus::Submitted, now + chrono::Duration::days(9)));
        insert(&repo, &sample_deal("deal-soon", DealStatus::Created, now + chrono::Duration::days(1)));
        insert(&repo, &sample_deal("deal-done", DealStatus::Completed, now));
        insert(&repo, &sample_deal("deal-paying", DealStatus::Approved, now));

        let ids: Vec<String> = repo
            .get_open_deals()
            .unwrap()
            .into_iter()
            .map(|d| d.deal_id)
            .collect();
        assert_eq!(ids, vec!["deal-soon".to_string(), "deal-late".to_string()]);
    }

    #[test]
    fn test_row_integrity_flags_corrupt_rows() {
        let repo = repo();
        insert(&repo, &sample_deal("deal-ok", DealStatus::Created, Utc::now()));
        insert(&repo, &sample_deal("deal-bad", DealStatus::Created, Utc::now()));
        assert!(repo.check_row_integrity().unwrap().is_empty());

        {
            let conn = repo.conn().unwrap();
            conn.execute(
                "UPDATE deals SET status = 'paused', amount_zec = '2' WHERE deal_id = 'deal-bad'",
                [],
            )
            .unwrap();
            conn.execute(
                "UPDATE transactions SET status = 'lost' WHERE tx_id = 'tx-escrow-deal-ok'",
                [],
            )
            .unwrap();
        }

        let problems = repo.check_row_integrity().unwrap();
        assert_eq!(problems.len(), 3, "{:?}", problems);
        assert!(problems[0].starts_with("deal-bad: unknown status 'paused'"));
        assert!(problems[1].starts_with("deal-bad: amount_zec '2'"));
        assert!(problems[2].starts_with("tx-escrow-deal-ok:"));
    }
}
