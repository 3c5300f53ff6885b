// 🌱 Reference data and a demo company for local use

use crate::benchmark::BenchmarkMetric;
use crate::context::{save_company, CompanyContext, CompanySetup};
use crate::db::{self, BenchmarkEntry};
use crate::kpi::{add_kpi, NewKpi};
use crate::statements::{BalanceSheetPeriod, IncomeStatementPeriod};
use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

pub const SEED_PERIOD: &str = "2024";

/// (sector, description, [growth, margin, roa, d/e, current, gross])
const SECTORS: [(&str, &str, [f64; 6]); 5] = [
    ("Technology", "Software, hardware and IT services", [18.0, 22.0, 10.5, 0.6, 2.1, 62.0]),
    ("Manufacturing", "Industrial and consumer goods production", [8.0, 9.5, 6.0, 1.1, 1.6, 28.0]),
    ("Retail", "Stores and e-commerce", [6.5, 4.5, 5.5, 1.4, 1.2, 33.0]),
    ("Healthcare", "Providers, pharma and devices", [10.0, 14.0, 7.5, 0.9, 1.8, 45.0]),
    ("Financial Services", "Banking, insurance and advisory", [7.0, 25.0, 1.2, 3.5, 1.1, 55.0]),
];

#[derive(Debug, Default, PartialEq)]
pub struct SeedSummary {
    pub sectors: usize,
    pub benchmarks: usize,
}

/// Sectors with one benchmark row per compared metric. No-op when sectors exist.
pub fn seed_reference_data(conn: &Connection) -> Result<SeedSummary> {
    if !db::list_sectors(conn)?.is_empty() {
        info!("sectors already present, skipping reference seed");
        return Ok(SeedSummary::default());
    }

    let mut summary = SeedSummary::default();

    for (name, description, values) in SECTORS {
        let sector_id = db::insert_sector(conn, name, Some(description))?;
        summary.sectors += 1;

        for (metric, value) in BenchmarkMetric::ALL.iter().zip(values) {
            db::insert_benchmark(
                conn,
                &BenchmarkEntry {
                    benchmark_id: None,
                    sector_id,
                    metric_name: metric.keys()[0].to_string(),
                    benchmark_value: Some(value),
                    period: Some(SEED_PERIOD.to_string()),
                },
            )?;
            summary.benchmarks += 1;
        }
    }

    info!(sectors = summary.sectors, benchmarks = summary.benchmarks, "reference data seeded");
    Ok(summary)
}

/// Four quarters of statements plus two KPIs for `client_id`, in the first sector
pub fn seed_demo_company(conn: &Connection, client_id: i64) -> Result<CompanyContext> {
    let sector = db::list_sectors(conn)?
        .into_iter()
        .find(|s| s.sector_name == "Technology")
        .context("Seed reference data before the demo company")?;

    let ctx = save_company(
        conn,
        client_id,
        &CompanySetup {
            company_name: "Demo Analytics Co".to_string(),
            industry: "SaaS".to_string(),
            sector_id: Some(sector.sector_id),
        },
    )?;

    let quarters = ["Q1", "Q2", "Q3", "Q4"];
    let mut income = Vec::new();
    let mut balance = Vec::new();

    for (i, quarter) in quarters.iter().enumerate() {
        let step = i as f64;

        let mut is = IncomeStatementPeriod::new(ctx.company_id, 2024, quarter);
        is.total_revenue = Some(2_000_000.0 + step * 150_000.0);
        is.cost_of_revenue = Some(800_000.0 + step * 40_000.0);
        is.gross_profit = Some(1_200_000.0 + step * 110_000.0);
        is.operating_expense = Some(850_000.0 + step * 20_000.0);
        is.net_income = Some(300_000.0 + step * 60_000.0);
        income.push(is);

        let mut bs = BalanceSheetPeriod::new(ctx.company_id, 2024, quarter);
        bs.total_assets = Some(9_000_000.0 + step * 250_000.0);
        bs.current_assets = Some(3_200_000.0 + step * 100_000.0);
        bs.current_liabilities = Some(1_600_000.0);
        bs.total_debt = Some(2_400_000.0 - step * 100_000.0);
        bs.total_liabilities = Some(3_800_000.0 - step * 100_000.0);
        bs.stockholders_equity = Some(5_200_000.0 + step * 350_000.0);
        bs.cash_and_cash_equivalents = Some(1_100_000.0 + step * 80_000.0);
        balance.push(bs);
    }

    db::insert_income_statements(conn, &income)?;
    db::insert_balance_sheets(conn, &balance)?;

    if db::list_kpis(conn, ctx.company_id, None)?.is_empty() {
        for (metric, target, description) in [
            ("profit_margin", 20.0, "Keep net margin at or above 20%"),
            ("debt_to_equity", 0.5, "Bring leverage under 0.5"),
        ] {
            add_kpi(
                conn,
                &ctx,
                &NewKpi {
                    metric_name: metric.to_string(),
                    target_value: Some(target),
                    target_date: "2025-12-31".to_string(),
                    description: description.to_string(),
                },
            )?;
        }
    }

    info!(client_id, company_id = ctx.company_id, "demo company seeded");
    Ok(ctx)
}
