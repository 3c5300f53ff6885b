// 🎯 KPI tracker - user targets checked against freshly computed metrics

use crate::cache::{PeriodWindow, SnapshotCache};
use crate::context::CompanyContext;
use crate::db::{self, KpiDefinition};
use crate::error::InsightError;
use crate::metrics::{compute_metric, MetricName, Status};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

/// KPIs shown on the dashboard
pub const DASHBOARD_KPI_LIMIT: usize = 3;

/// KPI as submitted by a form or the API, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewKpi {
    #[serde(default)]
    pub metric_name: String,
    #[serde(default)]
    pub target_value: Option<f64>,
    #[serde(default)]
    pub target_date: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidKpi {
    pub metric_name: MetricName,
    pub target_value: f64,
    pub target_date: NaiveDate,
    pub description: String,
}

impl NewKpi {
    pub fn validate(&self) -> Result<ValidKpi, InsightError> {
        let mut missing = Vec::new();

        if self.metric_name.trim().is_empty() {
            missing.push("metric_name");
        }
        let target_value = self.target_value.filter(|v| v.is_finite());
        if target_value.is_none() {
            missing.push("target_value");
        }
        let target_date = NaiveDate::parse_from_str(self.target_date.trim(), "%Y-%m-%d").ok();
        if target_date.is_none() {
            missing.push("target_date");
        }

        match (target_value, target_date) {
            (Some(target_value), Some(target_date)) if missing.is_empty() => Ok(ValidKpi {
                metric_name: self.metric_name.parse()?,
                target_value,
                target_date,
                description: self.description.trim().to_string(),
            }),
            _ => Err(InsightError::MissingFields(missing.join(", "))),
        }
    }
}

pub fn add_kpi(conn: &Connection, ctx: &CompanyContext, new: &NewKpi) -> Result<KpiDefinition> {
    let valid = new.validate()?;

    let kpi = db::insert_kpi(
        conn,
        ctx.company_id,
        valid.metric_name,
        valid.target_value,
        valid.target_date,
        &valid.description,
    )?;

    info!(company_id = ctx.company_id, kpi_id = kpi.kpi_id, metric = %kpi.metric_name, "KPI added");
    Ok(kpi)
}

pub fn remove_kpi(conn: &Connection, ctx: &CompanyContext, kpi_id: i64) -> Result<bool> {
    let removed = db::delete_kpi(conn, ctx.company_id, kpi_id)?;
    if removed {
        info!(company_id = ctx.company_id, kpi_id, "KPI removed");
    }
    Ok(removed)
}

/// A KPI next to its current value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiProgress {
    pub kpi: KpiDefinition,
    pub label: String,
    pub current_value: f64,
    pub display_value: String,
    pub display_target: String,
    /// current / target * 100, unclamped; 0 when the target is not positive
    pub progress: f64,
    pub status: Status,
}

impl KpiProgress {
    pub fn new(kpi: KpiDefinition, current_value: f64) -> Self {
        let name = kpi.metric_name;
        let progress = if kpi.target_value > 0.0 {
            current_value / kpi.target_value * 100.0
        } else {
            0.0
        };

        Self {
            label: name.label().to_string(),
            display_value: name.format_value(current_value),
            display_target: name.format_value(kpi.target_value),
            status: Status::classify(current_value, kpi.target_value, name.lower_is_better()),
            current_value,
            progress,
            kpi,
        }
    }

    /// Progress for a bar, 0..=100
    pub fn bar_percent(&self) -> u16 {
        self.progress.clamp(0.0, 100.0).round() as u16
    }
}

/// KPIs for the company, newest first, each with its recomputed current value.
/// Until both an income statement and a balance sheet are stored every value is 0.
pub fn kpi_view(
    conn: &Connection,
    cache: &SnapshotCache,
    ctx: &CompanyContext,
    limit: Option<usize>,
) -> Result<Vec<KpiProgress>> {
    let kpis = db::list_kpis(conn, ctx.company_id, limit)?;
    if kpis.is_empty() {
        return Ok(Vec::new());
    }

    let snapshot = cache.get_or_load(conn, ctx.company_id, PeriodWindow::KPI)?;
    let complete = !snapshot.income.is_empty() && !snapshot.balance.is_empty();

    Ok(kpis
        .into_iter()
        .map(|kpi| {
            let current = if complete {
                compute_metric(kpi.metric_name, &snapshot.income, &snapshot.balance)
                    .map(|m| m.current_value)
                    .unwrap_or(0.0)
            } else {
                0.0
            };
            KpiProgress::new(kpi, current)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::resolve_context;
    use crate::statements::{BalanceSheetPeriod, IncomeStatementPeriod};

    fn setup() -> (Connection, CompanyContext) {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        db::upsert_company(&conn, 3, "Acme", None, None).unwrap();
        let ctx = resolve_context(&conn, 3).unwrap();
        (conn, ctx)
    }

    fn new_kpi(metric: &str, target: f64) -> NewKpi {
        NewKpi {
            metric_name: metric.to_string(),
            target_value: Some(target),
            target_date: "2025-12-31".to_string(),
            description: "Year-end goal".to_string(),
        }
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let err = NewKpi::default().validate().unwrap_err();
        assert_eq!(
            err,
            InsightError::MissingFields("metric_name, target_value, target_date".to_string())
        );

        let mut bad_date = new_kpi("profit_margin", 20.0);
        bad_date.target_date = "31/12/2025".to_string();
        assert_eq!(
            bad_date.validate().unwrap_err(),
            InsightError::MissingFields("target_date".to_string())
        );
    }

    #[test]
    fn test_validate_unknown_metric() {
        let err = new_kpi("ebitda_margin", 10.0).validate().unwrap_err();
        assert_eq!(err, InsightError::UnknownMetric("ebitda_margin".to_string()));
    }

    #[test]
    fn test_add_and_remove() {
        let (conn, ctx) = setup();

        let kpi = add_kpi(&conn, &ctx, &new_kpi("roa", 8.0)).unwrap();
        assert_eq!(kpi.metric_name, MetricName::ReturnOnAssets);

        assert!(remove_kpi(&conn, &ctx, kpi.kpi_id).unwrap());
        assert!(!remove_kpi(&conn, &ctx, kpi.kpi_id).unwrap());
    }

    #[test]
    fn test_kpi_view_without_statements_is_zero() {
        let (conn, ctx) = setup();
        add_kpi(&conn, &ctx, &new_kpi("profit_margin", 20.0)).unwrap();

        let view = kpi_view(&conn, &SnapshotCache::new(), &ctx, None).unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].current_value, 0.0);
        assert_eq!(view[0].progress, 0.0);
        assert_eq!(view[0].status, Status::Below);
    }

    #[test]
    fn test_kpi_view_needs_balance_sheet() {
        let (conn, ctx) = setup();
        let mut cur = IncomeStatementPeriod::new(ctx.company_id, 2024, "Q1");
        cur.total_revenue = Some(1_000.0);
        cur.net_income = Some(200.0);
        db::insert_income_statements(&conn, &[cur]).unwrap();
        add_kpi(&conn, &ctx, &new_kpi("profit_margin", 20.0)).unwrap();

        let cache = SnapshotCache::new();
        let view = kpi_view(&conn, &cache, &ctx, None).unwrap();
        assert_eq!(view[0].current_value, 0.0);
        assert_eq!(view[0].progress, 0.0);
        assert_eq!(view[0].status, Status::Below);

        let bs = BalanceSheetPeriod::new(ctx.company_id, 2024, "Q1");
        db::insert_balance_sheets(&conn, &[bs]).unwrap();
        cache.invalidate(ctx.company_id);

        let view = kpi_view(&conn, &cache, &ctx, None).unwrap();
        assert!((view[0].current_value - 20.0).abs() < 1e-9);
        assert_eq!(view[0].status, Status::Equal);
    }

    #[test]
    fn test_kpi_view_progress_and_status() {
        let (conn, ctx) = setup();

        let mut prev = IncomeStatementPeriod::new(ctx.company_id, 2024, "Q1");
        prev.total_revenue = Some(1_000.0);
        prev.operating_expense = Some(500.0);
        let mut cur = IncomeStatementPeriod::new(ctx.company_id, 2024, "Q2");
        cur.total_revenue = Some(1_200.0);
        cur.net_income = Some(180.0);
        cur.operating_expense = Some(450.0);
        db::insert_income_statements(&conn, &[prev, cur]).unwrap();

        let mut bs = BalanceSheetPeriod::new(ctx.company_id, 2024, "Q2");
        bs.total_debt = Some(400.0);
        bs.stockholders_equity = Some(1_000.0);
        db::insert_balance_sheets(&conn, &[bs]).unwrap();

        add_kpi(&conn, &ctx, &new_kpi("profit_margin", 20.0)).unwrap();
        add_kpi(&conn, &ctx, &new_kpi("debt_to_equity", 0.5)).unwrap();
        add_kpi(&conn, &ctx, &new_kpi("revenue_growth", 10.0)).unwrap();
        add_kpi(&conn, &ctx, &new_kpi("operating_expenses", -5.0)).unwrap();

        let cache = SnapshotCache::new();
        let view = kpi_view(&conn, &cache, &ctx, None).unwrap();
        assert_eq!(view.len(), 4);

        let find = |name: MetricName| view.iter().find(|k| k.kpi.metric_name == name).unwrap();

        // 180 / 1200 = 15%
        let margin = find(MetricName::ProfitMargin);
        assert!((margin.current_value - 15.0).abs() < 1e-9);
        assert!((margin.progress - 75.0).abs() < 1e-9);
        assert_eq!(margin.status, Status::Below);
        assert_eq!(margin.display_value, "15.00%");

        // 0.4 under a 0.5 ceiling
        let de = find(MetricName::DebtToEquity);
        assert_eq!(de.display_value, "0.40");
        assert_eq!(de.status, Status::Above);

        // 20% growth against a 10% goal
        let growth = find(MetricName::RevenueGrowth);
        assert!((growth.progress - 200.0).abs() < 1e-9);
        assert_eq!(growth.bar_percent(), 100);
        assert_eq!(growth.status, Status::Above);

        // Expenses fell 10%, target -5%, negative target gives no progress
        let opex = find(MetricName::OperatingExpenses);
        assert!((opex.current_value + 10.0).abs() < 1e-9);
        assert_eq!(opex.progress, 0.0);
        assert_eq!(opex.status, Status::Above);

        let limited = kpi_view(&conn, &cache, &ctx, Some(DASHBOARD_KPI_LIMIT)).unwrap();
        assert_eq!(limited.len(), 3);
        assert_eq!(cache.load_count(), 1);
    }
}
