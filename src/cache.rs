// 🗂️ Snapshot cache - one read per (company, window), shared by every view
//
// Snapshots are immutable; a statement write for a company drops that
// company's entries so the next read reloads.

use crate::db;
use crate::metrics::PeriodInputs;
use crate::statements::{BalanceSheetPeriod, IncomeStatementPeriod};
use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// How many of the most recent periods a view needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodWindow {
    pub income: usize,
    pub balance: usize,
}

impl PeriodWindow {
    /// Current + previous income statement, latest balance sheet
    pub const DASHBOARD: PeriodWindow = PeriodWindow { income: 2, balance: 1 };
    /// Four quarters of income history, two balance sheets
    pub const KPI: PeriodWindow = PeriodWindow { income: 4, balance: 2 };

    fn covers(&self, other: &PeriodWindow) -> bool {
        self.income >= other.income && self.balance >= other.balance
    }
}

/// Statement periods for one company, newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatementSnapshot {
    pub income: Vec<IncomeStatementPeriod>,
    pub balance: Vec<BalanceSheetPeriod>,
}

impl StatementSnapshot {
    pub fn load(conn: &Connection, company_id: i64, window: PeriodWindow) -> Result<Self> {
        Ok(Self {
            income: db::latest_income_statements(conn, company_id, window.income)?,
            balance: db::latest_balance_sheets(conn, company_id, window.balance)?,
        })
    }

    /// Latest/previous income statement and latest balance sheet, if any income exists
    pub fn inputs(&self) -> Option<PeriodInputs<'_>> {
        let current = self.income.first()?;
        Some(PeriodInputs::new(current, self.income.get(1), self.balance.first()))
    }

    fn truncated(&self, window: PeriodWindow) -> Self {
        Self {
            income: self.income.iter().take(window.income).cloned().collect(),
            balance: self.balance.iter().take(window.balance).cloned().collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: Mutex<HashMap<(i64, PeriodWindow), Arc<StatementSnapshot>>>,
    loads: AtomicUsize,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(i64, PeriodWindow), Arc<StatementSnapshot>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached snapshot for the window, served from a wider cached window when
    /// possible, otherwise loaded from the store
    pub fn get_or_load(
        &self,
        conn: &Connection,
        company_id: i64,
        window: PeriodWindow,
    ) -> Result<Arc<StatementSnapshot>> {
        let mut entries = self.lock();

        if let Some(hit) = entries.get(&(company_id, window)) {
            debug!(company_id, ?window, "snapshot cache hit");
            return Ok(Arc::clone(hit));
        }

        let wider = entries
            .iter()
            .find(|((id, cached), _)| *id == company_id && cached.covers(&window))
            .map(|(_, snapshot)| Arc::clone(snapshot));

        let snapshot = match wider {
            Some(wide) => Arc::new(wide.truncated(window)),
            None => {
                self.loads.fetch_add(1, Ordering::Relaxed);
                debug!(company_id, ?window, "snapshot cache miss");
                Arc::new(StatementSnapshot::load(conn, company_id, window)?)
            }
        };

        entries.insert((company_id, window), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drop every window cached for the company
    pub fn invalidate(&self, company_id: i64) {
        self.lock().retain(|(id, _), _| *id != company_id);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of store reads performed so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let company = db::upsert_company(&conn, 1, "Acme", None, None).unwrap();

        let rows: Vec<IncomeStatementPeriod> = ["Q1", "Q2", "Q3"]
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let mut is = IncomeStatementPeriod::new(company.company_id, 2024, q);
                is.total_revenue = Some(100.0 * (i as f64 + 1.0));
                is
            })
            .collect();
        db::insert_income_statements(&conn, &rows).unwrap();

        (conn, company.company_id)
    }

    #[test]
    fn test_same_window_is_shared() {
        let (conn, id) = setup();
        let cache = SnapshotCache::new();

        let a = cache.get_or_load(&conn, id, PeriodWindow::DASHBOARD).unwrap();
        let b = cache.get_or_load(&conn, id, PeriodWindow::DASHBOARD).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.load_count(), 1);
        assert_eq!(a.income.len(), 2);
        assert_eq!(a.income[0].quarter, "Q3");
    }

    #[test]
    fn test_narrow_window_served_from_wider() {
        let (conn, id) = setup();
        let cache = SnapshotCache::new();

        let wide = cache.get_or_load(&conn, id, PeriodWindow::KPI).unwrap();
        let narrow = cache.get_or_load(&conn, id, PeriodWindow::DASHBOARD).unwrap();

        assert_eq!(cache.load_count(), 1);
        assert_eq!(wide.income.len(), 3);
        assert_eq!(narrow.income.len(), 2);
        assert_eq!(narrow.income[..], wide.income[..2]);
    }

    #[test]
    fn test_invalidate_reloads() {
        let (conn, id) = setup();
        let cache = SnapshotCache::new();

        let before = cache.get_or_load(&conn, id, PeriodWindow::DASHBOARD).unwrap();
        assert_eq!(before.income[0].total_revenue, Some(300.0));

        let mut restated = IncomeStatementPeriod::new(id, 2024, "Q3");
        restated.total_revenue = Some(999.0);
        db::insert_income_statements(&conn, &[restated]).unwrap();

        // Stale until invalidated
        let stale = cache.get_or_load(&conn, id, PeriodWindow::DASHBOARD).unwrap();
        assert_eq!(stale.income[0].total_revenue, Some(300.0));

        cache.invalidate(id);
        let fresh = cache.get_or_load(&conn, id, PeriodWindow::DASHBOARD).unwrap();
        assert_eq!(fresh.income[0].total_revenue, Some(999.0));
        assert_eq!(cache.load_count(), 2);
    }

    #[test]
    fn test_inputs_requires_income() {
        let snapshot = StatementSnapshot::default();
        assert!(snapshot.inputs().is_none());
    }
}
