//! Doctor service - escrow store health checks

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbRepository;
use crate::config::MonitorSettings;
use crate::domain::Blockchain;

/// Missed monitor passes before the sync state counts as stale
const STALE_SYNC_INTERVALS: i64 = 5;

pub struct DoctorService {
    repository: Arc<DuckDbRepository>,
    monitor: MonitorSettings,
}

impl DoctorService {
    pub fn new(repository: Arc<DuckDbRepository>, monitor: MonitorSettings) -> Self {
        Self {
            repository,
            monitor,
        }
    }

    /// Run all health checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_database()?);

        let unfunded = self.repository.check_deals_without_escrow()?;
        checks.insert(
            "deals_without_escrow".to_string(),
            if unfunded.is_empty() {
                CheckResult::pass("Every deal has an escrow transaction")
            } else {
                CheckResult::error(
                    format!("{} deal(s) have no escrow transaction", unfunded.len()),
                    Some(unfunded.iter().map(|id| json!({ "deal_id": id })).collect()),
                )
            },
        );

        let orphaned = self.repository.check_orphaned_transactions()?;
        let orphan_details = orphaned
            .iter()
            .map(|s| match s.split_once(':') {
                Some((tx_id, deal_id)) => json!({ "tx_id": tx_id, "deal_id": deal_id }),
                None => json!({ "tx_id": s }),
            })
            .collect();
        checks.insert(
            "orphaned_transactions".to_string(),
            if orphaned.is_empty() {
                CheckResult::pass("No orphaned transactions found")
            } else {
                CheckResult::error(
                    format!("{} transaction(s) reference missing deals", orphaned.len()),
                    Some(orphan_details),
                )
            },
        );

        let unreleased = self.repository.check_approved_without_release()?;
        checks.insert(
            "approved_without_release".to_string(),
            if unreleased.is_empty() {
                CheckResult::pass("Every approved deal has a release in flight")
            } else {
                CheckResult::error(
                    format!("{} approved deal(s) have no live release transaction", unreleased.len()),
                    Some(unreleased.iter().map(|id| json!({ "deal_id": id })).collect()),
                )
            },
        );

        let cutoff = Utc::now() - self.monitor.failure_timeout();
        let stale = self.repository.check_stale_pending(cutoff)?;
        checks.insert(
            "stale_pending".to_string(),
            if stale.is_empty() {
                CheckResult::pass("No transactions stuck in pending")
            } else {
                CheckResult::warning(
                    format!(
                        "{} transaction(s) pending for more than {}s",
                        stale.len(),
                        self.monitor.failure_timeout_secs
                    ),
                    Some(stale.iter().map(|id| json!({ "tx_id": id })).collect()),
                )
            },
        );

        let now = Utc::now();
        let overdue: Vec<_> = self
            .repository
            .get_open_deals()?
            .into_iter()
            .filter(|deal| deal.is_past_deadline(now))
            .collect();
        checks.insert(
            "overdue_deals".to_string(),
            if overdue.is_empty() {
                CheckResult::pass("No open deal is past its deadline")
            } else {
                CheckResult::warning(
                    format!("{} open deal(s) are past their deadline", overdue.len()),
                    Some(
                        overdue
                            .iter()
                            .map(|deal| {
                                json!({
                                    "deal_id": deal.deal_id,
                                    "status": deal.status,
                                    "deadline": deal.deadline,
                                })
                            })
                            .collect(),
                    ),
                )
            },
        );

        checks.insert("sync_staleness".to_string(), self.check_sync()?);

        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary {
                passed,
                warnings,
                errors,
            },
        })
    }

    fn check_database(&self) -> Result<CheckResult> {
        if let Err(e) = self.repository.ping() {
            return Ok(CheckResult::error(format!("Database unreachable: {}", e), None));
        }
        let size = self.repository.get_db_size()?;
        let problems = self.repository.check_row_integrity()?;
        if problems.is_empty() {
            return Ok(CheckResult::pass(format!(
                "Database reachable ({} bytes), all rows valid",
                size
            )));
        }
        Ok(CheckResult::error(
            format!("{} row problem(s) found", problems.len()),
            Some(problems.iter().map(|p| json!({ "problem": p })).collect()),
        ))
    }

    fn check_sync(&self) -> Result<CheckResult> {
        let pending = self.repository.count_pending_transactions()?;
        let Some(state) = self.repository.get_sync_state(Blockchain::Zcash)? else {
            return Ok(if pending == 0 {
                CheckResult::pass("Monitor has not run yet; nothing pending")
            } else {
                CheckResult::warning(
                    format!("Monitor has never run and {} transaction(s) are pending", pending),
                    None,
                )
            });
        };

        let age = Utc::now() - state.last_sync_time;
        let limit = chrono::Duration::milliseconds(
            self.monitor.update_interval_ms as i64 * STALE_SYNC_INTERVALS,
        );
        if age > limit && pending > 0 {
            return Ok(CheckResult::warning(
                format!(
                    "Last sync at height {} was {}s ago with {} transaction(s) pending",
                    state.last_block_height,
                    age.num_seconds(),
                    pending
                ),
                None,
            ));
        }
        Ok(CheckResult::pass(format!(
            "Last sync at height {} ({}s ago)",
            state.last_block_height,
            age.num_seconds()
        )))
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: HashMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            status: "pass".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warning(message: impl Into<String>, details: Option<Vec<serde_json::Value>>) -> Self {
        Self {
            status: "warning".to_string(),
            message: message.into(),
            details,
        }
    }

    fn error(message: impl Into<String>, details: Option<Vec<serde_json::Value>>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};
    use rust_decimal::Decimal;

    use crate::domain::{ChainTransaction, Deal, DealStatus, Party, TxType};

    fn service() -> (Arc<DuckDbRepository>, DoctorService) {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();
        let doctor = DoctorService::new(Arc::clone(&repo), MonitorSettings::default());
        (repo, doctor)
    }

    #[test]
    fn test_clean_store_passes() {
        let (_repo, doctor) = service();
        let result = doctor.run_checks().unwrap();
        assert_eq!(result.summary.errors, 0);
        assert_eq!(result.summary.warnings, 0);
        assert_eq!(result.checks.len(), 7);
    }

    fn store_deal(repo: &DuckDbRepository, deal_id: &str, deadline: DateTime<Utc>, amount_zec: Decimal) {
        let party = |id: &str| Party {
            id: id.to_string(),
            near_account_id: format!("near-{}.testnet", id),
        };
        let now = Utc::now();
        let deal = Deal {
            deal_id: deal_id.to_string(),
            intent_id: format!("intent-{}", deal_id),
            client: party("client01"),
            freelancer: party("freelanc"),
            amount_zec,
            amount_zatoshi: 100_000_000,
            deadline,
            description: "Audit".to_string(),
            status: DealStatus::Submitted,
            proof_link: None,
            notes: None,
            dispute_reason: None,
            resolution: None,
            created_at: now,
            updated_at: now,
        };
        let escrow = ChainTransaction::pending(
            format!("tx-{}", deal_id),
            deal_id,
            Blockchain::Zcash,
            TxType::Escrow,
            "a",
            "b",
            100_000_000,
        )
        .confirmed();
        repo.insert_deal(&deal, &escrow).unwrap();
    }

    #[test]
    fn test_overdue_deal_warns() {
        let (repo, doctor) = service();
        let now = Utc::now();
        store_deal(&repo, "deal-late", now - Duration::days(1), Decimal::ONE);
        store_deal(&repo, "deal-open", now + Duration::days(3), Decimal::ONE);

        let result = doctor.run_checks().unwrap();
        let overdue = &result.checks["overdue_deals"];
        assert_eq!(overdue.status, "warning");
        let details = overdue.details.as_ref().unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0]["deal_id"], "deal-late");
        assert_eq!(details[0]["status"], "submitted");
        assert_eq!(result.checks["database"].status, "pass");
    }

    #[test]
    fn test_amount_mismatch_fails_database_check() {
        let (repo, doctor) = service();
        store_deal(&repo, "deal-1", Utc::now() + Duration::days(3), Decimal::new(2, 0));

        let result = doctor.run_checks().unwrap();
        let database = &result.checks["database"];
        assert_eq!(database.status, "error");
        let details = database.details.as_ref().unwrap();
        assert!(details[0]["problem"]
            .as_str()
            .unwrap()
            .starts_with("deal-1: amount_zec '2'"));
    }

    #[test]
    fn test_orphan_is_an_error_and_unsynced_pending_warns() {
        let (repo, doctor) = service();
        repo.insert_transactions(&[ChainTransaction::pending(
            "tx-1",
            "deal-gone",
            Blockchain::Zcash,
            TxType::Release,
            "a",
            "b",
            5,
        )])
        .unwrap();

        let result = doctor.run_checks().unwrap();
        assert_eq!(result.checks["orphaned_transactions"].status, "error");
        assert_eq!(result.checks["sync_staleness"].status, "warning");
        let details = result.checks["orphaned_transactions"].details.as_ref().unwrap();
        assert_eq!(details[0]["deal_id"], "deal-gone");
    }
}
