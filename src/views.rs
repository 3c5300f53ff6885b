// Dashboard and benchmark views over the shared snapshot cache

use crate::benchmark::{compare_to_benchmarks, BenchmarkComparison, BenchmarkTable};
use crate::cache::{PeriodWindow, SnapshotCache};
use crate::context::CompanyContext;
use crate::db;
use crate::metrics::{calculate_metrics, FinancialMetrics};
use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Metrics for the latest period; None until an income statement exists
pub fn dashboard_view(
    conn: &Connection,
    cache: &SnapshotCache,
    ctx: &CompanyContext,
) -> Result<Option<FinancialMetrics>> {
    let snapshot = cache.get_or_load(conn, ctx.company_id, PeriodWindow::DASHBOARD)?;

    Ok(snapshot
        .inputs()
        .map(|inputs| calculate_metrics(inputs.current, inputs.previous, inputs.balance_sheet)))
}

/// Comparison against the company's sector; empty without both an income
/// statement and a balance sheet
pub fn benchmark_view(
    conn: &Connection,
    cache: &SnapshotCache,
    ctx: &CompanyContext,
) -> Result<Vec<BenchmarkComparison>> {
    let snapshot = cache.get_or_load(conn, ctx.company_id, PeriodWindow::DASHBOARD)?;

    let inputs = match snapshot.inputs() {
        Some(inputs) if inputs.balance_sheet.is_some() => inputs,
        _ => return Ok(Vec::new()),
    };

    let metrics = calculate_metrics(inputs.current, inputs.previous, inputs.balance_sheet);
    let table = BenchmarkTable::from_entries(&db::get_benchmarks_for_sector(conn, ctx.sector_id)?);

    Ok(compare_to_benchmarks(&metrics, &table))
}

// ============================================================================
// METRIC CARDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Positive,
    Negative,
    Neutral,
}

impl ChangeType {
    pub fn of(change: f64, lower_is_better: bool) -> Self {
        if change == 0.0 {
            ChangeType::Neutral
        } else if (change > 0.0) != lower_is_better {
            ChangeType::Positive
        } else {
            ChangeType::Negative
        }
    }
}

/// Headline figure with its period-over-period change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCard {
    pub title: String,
    pub value: String,
    pub change: String,
    pub change_type: ChangeType,
}

/// $2.4M / $480K / $950
pub fn format_currency_compact(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();

    if abs >= 1_000_000_000.0 {
        format!("{}${:.1}B", sign, abs / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("{}${:.1}M", sign, abs / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{}${:.0}K", sign, abs / 1_000.0)
    } else {
        format!("{}${:.0}", sign, abs)
    }
}

fn signed_percent(change: f64) -> String {
    if change > 0.0 {
        format!("+{:.1}%", change)
    } else {
        format!("{:.1}%", change)
    }
}

/// The four dashboard headline cards
pub fn metric_cards(metrics: &FinancialMetrics) -> Vec<MetricCard> {
    vec![
        MetricCard {
            title: "Total Revenue".to_string(),
            value: format_currency_compact(metrics.total_revenue),
            change: signed_percent(metrics.revenue_change),
            change_type: ChangeType::of(metrics.revenue_change, false),
        },
        MetricCard {
            title: "Net Income".to_string(),
            value: format_currency_compact(metrics.net_income),
            change: signed_percent(metrics.net_income_change),
            change_type: ChangeType::of(metrics.net_income_change, false),
        },
        MetricCard {
            title: "Operating Expenses".to_string(),
            value: format_currency_compact(metrics.operating_expenses),
            change: signed_percent(metrics.expense_change),
            change_type: ChangeType::of(metrics.expense_change, true),
        },
        MetricCard {
            title: "Profit Margin".to_string(),
            value: format!("{:.1}%", metrics.profit_margin),
            change: signed_percent(metrics.margin_change),
            change_type: ChangeType::of(metrics.margin_change, false),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::resolve_context;
    use crate::metrics::Status;
    use crate::statements::{BalanceSheetPeriod, IncomeStatementPeriod};

    fn setup() -> (Connection, CompanyContext) {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let sector = db::insert_sector(&conn, "Manufacturing", None).unwrap();
        db::upsert_company(&conn, 11, "Widgets Ltd", None, Some(sector)).unwrap();
        let ctx = resolve_context(&conn, 11).unwrap();
        (conn, ctx)
    }

    fn seed_statements(conn: &Connection, company_id: i64) {
        let mut prev = IncomeStatementPeriod::new(company_id, 2023, "Q4");
        prev.total_revenue = Some(800_000.0);
        prev.net_income = Some(100_000.0);
        let mut cur = IncomeStatementPeriod::new(company_id, 2024, "Q1");
        cur.total_revenue = Some(1_000_000.0);
        cur.net_income = Some(200_000.0);
        db::insert_income_statements(conn, &[prev, cur]).unwrap();

        let mut bs = BalanceSheetPeriod::new(company_id, 2024, "Q1");
        bs.total_debt = Some(650.0);
        bs.stockholders_equity = Some(1_000.0);
        db::insert_balance_sheets(conn, &[bs]).unwrap();
    }

    #[test]
    fn test_dashboard_empty_without_statements() {
        let (conn, ctx) = setup();
        let cache = SnapshotCache::new();
        assert_eq!(dashboard_view(&conn, &cache, &ctx).unwrap(), None);
        assert!(benchmark_view(&conn, &cache, &ctx).unwrap().is_empty());
    }

    #[test]
    fn test_dashboard_and_benchmark_share_one_load() {
        let (conn, ctx) = setup();
        seed_statements(&conn, ctx.company_id);
        db::insert_benchmark(
            &conn,
            &db::BenchmarkEntry {
                benchmark_id: None,
                sector_id: ctx.sector_id,
                metric_name: "debt_to_equity_ratio".to_string(),
                benchmark_value: Some(0.55),
                period: Some("2024".to_string()),
            },
        )
        .unwrap();

        let cache = SnapshotCache::new();
        let metrics = dashboard_view(&conn, &cache, &ctx).unwrap().unwrap();
        assert!((metrics.profit_margin - 20.0).abs() < 1e-9);
        assert!((metrics.revenue_change - 25.0).abs() < 1e-9);

        let rows = benchmark_view(&conn, &cache, &ctx).unwrap();
        assert_eq!(cache.load_count(), 1);
        assert_eq!(rows.len(), 6);

        let de = rows.iter().find(|r| r.label == "Debt-to-Equity Ratio").unwrap();
        assert_eq!(de.your_value, "0.65");
        assert_eq!(de.status, Status::Below);

        let pm = rows.iter().find(|r| r.label == "Profit Margin").unwrap();
        assert_eq!(pm.industry_average, "18.0%");
        assert_eq!(pm.status, Status::Above);
    }

    #[test]
    fn test_benchmark_needs_balance_sheet() {
        let (conn, ctx) = setup();
        let mut cur = IncomeStatementPeriod::new(ctx.company_id, 2024, "Q1");
        cur.total_revenue = Some(10.0);
        db::insert_income_statements(&conn, &[cur]).unwrap();

        let cache = SnapshotCache::new();
        assert!(dashboard_view(&conn, &cache, &ctx).unwrap().is_some());
        assert!(benchmark_view(&conn, &cache, &ctx).unwrap().is_empty());
    }

    #[test]
    fn test_format_currency_compact() {
        assert_eq!(format_currency_compact(2_400_000.0), "$2.4M");
        assert_eq!(format_currency_compact(480_000.0), "$480K");
        assert_eq!(format_currency_compact(950.0), "$950");
        assert_eq!(format_currency_compact(-1_200_000.0), "-$1.2M");
        assert_eq!(format_currency_compact(3_000_000_000.0), "$3.0B");
    }

    #[test]
    fn test_metric_cards() {
        let metrics = FinancialMetrics {
            total_revenue: 2_400_000.0,
            net_income: 480_000.0,
            operating_expenses: 1_200_000.0,
            profit_margin: 20.0,
            revenue_change: 12.5,
            expense_change: 4.0,
            margin_change: 0.0,
            ..Default::default()
        };

        let cards = metric_cards(&metrics);
        assert_eq!(cards.len(), 4);
        assert_eq!(cards[0].value, "$2.4M");
        assert_eq!(cards[0].change, "+12.5%");
        assert_eq!(cards[0].change_type, ChangeType::Positive);
        assert_eq!(cards[2].change_type, ChangeType::Negative);
        assert_eq!(cards[3].value, "20.0%");
        assert_eq!(cards[3].change_type, ChangeType::Neutral);
    }
}
