//! Ledger-vs-cache drift detection
//!
//! Compares each learner's cached `total_xp` and `level` with the ledger sum.
//! Drift is reported and stored in `drift_reports`, never corrected here;
//! repair is the explicit `XpLedger::rebuild_state`.

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use super::db::EngineDb;
use super::ledger::ledger_total;
use super::levels::{level_for, FORMULA_VERSION};
use super::models::DriftReport;
use super::projection::load_state;
use crate::error::EngineResult;

/// Result of one reconciliation pass
#[derive(Debug, Clone, serde::Serialize)]
pub struct DriftRun {
    pub run_id: String,
    pub checked: usize,
    pub reports: Vec<DriftReport>,
}

impl DriftRun {
    pub fn drifted(&self) -> impl Iterator<Item = &DriftReport> {
        self.reports.iter().filter(|r| r.drifted)
    }
}

#[derive(Clone)]
pub struct ReconciliationChecker {
    db: EngineDb,
}

impl ReconciliationChecker {
    pub fn new(db: EngineDb) -> Self {
        Self { db }
    }

    /// Check one learner
    pub fn check_drift(&self, learner_id: &str) -> EngineResult<DriftReport> {
        let run = self.check(Some(learner_id))?;
        Ok(run
            .reports
            .into_iter()
            .next()
            .unwrap_or_else(|| clean_report(learner_id)))
    }

    /// Check every learner with a state row or ledger rows
    pub fn check_all(&self) -> EngineResult<DriftRun> {
        self.check(None)
    }

    /// One pass over `learner_id`, or over every known learner when None
    pub fn check(&self, learner_id: Option<&str>) -> EngineResult<DriftRun> {
        let run_id = Uuid::new_v4().to_string();
        let checked_at = Utc::now().timestamp_millis();

        self.db.write(|conn| {
            let learners = match learner_id {
                Some(id) => vec![id.to_string()],
                None => known_learners(conn)?,
            };

            let mut reports = Vec::with_capacity(learners.len());
            for learner in &learners {
                let report = compare(conn, learner)?;
                if report.drifted {
                    store_report(conn, &run_id, &report, checked_at)?;
                    tracing::warn!(
                        run_id = %run_id,
                        learner_id = %report.learner_id,
                        cached_total = report.cached_total,
                        ledger_total = report.ledger_total,
                        delta = report.delta,
                        cached_level = report.cached_level,
                        expected_level = report.expected_level,
                        formula_version = %report.formula_version,
                        "XP drift detected"
                    );
                }
                reports.push(report);
            }

            tracing::info!(
                run_id = %run_id,
                checked = learners.len(),
                drifted = reports.iter().filter(|r| r.drifted).count(),
                "Reconciliation finished"
            );
            Ok(DriftRun {
                run_id: run_id.clone(),
                checked: learners.len(),
                reports,
            })
        })
    }

    /// Stored drift reports for a learner, newest first
    pub fn history(&self, learner_id: &str, limit: usize) -> EngineResult<Vec<DriftReport>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cached_total, ledger_total, delta, cached_level, expected_level, formula_version
                 FROM drift_reports WHERE learner_id = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map((learner_id, limit as i64), |r| {
                Ok(DriftReport {
                    learner_id: learner_id.to_string(),
                    cached_total: r.get(0)?,
                    ledger_total: r.get(1)?,
                    delta: r.get(2)?,
                    cached_level: r.get(3)?,
                    expected_level: r.get(4)?,
                    formula_version: r.get(5)?,
                    drifted: true,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}

fn known_learners(conn: &Connection) -> EngineResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT learner_id FROM gamification_state
         UNION SELECT learner_id FROM xp_events
         ORDER BY 1",
    )?;
    let ids = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn compare(conn: &Connection, learner_id: &str) -> EngineResult<DriftReport> {
    let state = load_state(conn, learner_id)?;
    let ledger = ledger_total(conn, learner_id)?;
    let expected_level = level_for(ledger);
    let delta = state.total_xp - ledger;
    Ok(DriftReport {
        learner_id: learner_id.to_string(),
        cached_total: state.total_xp,
        ledger_total: ledger,
        delta,
        cached_level: state.level,
        expected_level,
        drifted: delta != 0
            || state.level != expected_level
            || state.formula_version != FORMULA_VERSION,
        formula_version: state.formula_version,
    })
}

fn store_report(conn: &Connection, run_id: &str, report: &DriftReport, checked_at: i64) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO drift_reports
            (run_id, learner_id, cached_total, ledger_total, delta, cached_level,
             expected_level, formula_version, checked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            run_id,
            report.learner_id,
            report.cached_total,
            report.ledger_total,
            report.delta,
            report.cached_level,
            report.expected_level,
            report.formula_version,
            checked_at,
        ],
    )?;
    Ok(())
}

fn clean_report(learner_id: &str) -> DriftReport {
    DriftReport {
        learner_id: learner_id.to_string(),
        cached_total: 0,
        ledger_total: 0,
        delta: 0,
        cached_level: 1,
        expected_level: 1,
        formula_version: FORMULA_VERSION.to_string(),
        drifted: false,
    }
}
