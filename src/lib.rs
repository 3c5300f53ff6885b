// Fin Insight - Core Library
// Financial metrics, sector benchmarks and statement ingestion for the CLI,
// the TUI dashboard, the API server and tests

pub mod benchmark;
pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod ingest;
pub mod kpi;
pub mod metrics;
pub mod seed;
pub mod statements;
pub mod views;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use benchmark::{
    compare_metric, compare_to_benchmarks, BenchmarkComparison, BenchmarkMetric, BenchmarkTable,
};
pub use cache::{PeriodWindow, SnapshotCache, StatementSnapshot};
pub use config::{init_tracing, AppConfig};
pub use context::{
    resolve_context, resolve_session, save_company, CompanyContext, CompanySetup, DEFAULT_SECTOR_ID,
};
pub use db::{
    setup_database, BenchmarkEntry, Company, Event, KpiDefinition, Sector, UploadRecord,
    UploadStatus,
};
pub use error::InsightError;
pub use ingest::{
    detect_statement_kind, ingest_upload, parse_csv, StatementKind, UploadOutcome,
};
pub use kpi::{add_kpi, kpi_view, remove_kpi, KpiProgress, NewKpi};
pub use metrics::{
    calculate_metrics, compute_metric, ComputedMetric, FinancialMetrics, MetricName, Status,
};
pub use statements::{BalanceSheetPeriod, IncomeStatementPeriod};
pub use views::{benchmark_view, dashboard_view, metric_cards, MetricCard};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
