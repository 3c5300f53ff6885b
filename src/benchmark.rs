// 🏁 Benchmark Comparator - client metrics vs sector reference values
//
// Sector rows are looked up by metric name; anything missing (or stored as 0)
// falls back to a fixed default per metric.

use crate::db::BenchmarkEntry;
use crate::metrics::{FinancialMetrics, Status};
use crate::statements::coerce;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// COMPARED METRICS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkMetric {
    RevenueGrowthRate,
    ProfitMargin,
    ReturnOnAssets,
    DebtToEquityRatio,
    CurrentRatio,
    GrossMargin,
}

impl BenchmarkMetric {
    /// Display order
    pub const ALL: [BenchmarkMetric; 6] = [
        BenchmarkMetric::RevenueGrowthRate,
        BenchmarkMetric::ProfitMargin,
        BenchmarkMetric::ReturnOnAssets,
        BenchmarkMetric::DebtToEquityRatio,
        BenchmarkMetric::CurrentRatio,
        BenchmarkMetric::GrossMargin,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BenchmarkMetric::RevenueGrowthRate => "Revenue Growth Rate",
            BenchmarkMetric::ProfitMargin => "Profit Margin",
            BenchmarkMetric::ReturnOnAssets => "Return on Assets (ROA)",
            BenchmarkMetric::DebtToEquityRatio => "Debt-to-Equity Ratio",
            BenchmarkMetric::CurrentRatio => "Current Ratio",
            BenchmarkMetric::GrossMargin => "Gross Margin",
        }
    }

    /// Benchmark row names accepted for this metric, preferred first
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            BenchmarkMetric::RevenueGrowthRate => &["revenue_growth_rate", "revenue_growth"],
            BenchmarkMetric::ProfitMargin => &["profit_margin"],
            BenchmarkMetric::ReturnOnAssets => &["return_on_assets", "roa"],
            BenchmarkMetric::DebtToEquityRatio => &["debt_to_equity_ratio", "debt_to_equity"],
            BenchmarkMetric::CurrentRatio => &["current_ratio"],
            BenchmarkMetric::GrossMargin => &["gross_margin"],
        }
    }

    pub fn default_value(&self) -> f64 {
        match self {
            BenchmarkMetric::RevenueGrowthRate => 12.0,
            BenchmarkMetric::ProfitMargin => 18.0,
            BenchmarkMetric::ReturnOnAssets => 8.5,
            BenchmarkMetric::DebtToEquityRatio => 1.2,
            BenchmarkMetric::CurrentRatio => 1.5,
            BenchmarkMetric::GrossMargin => 35.0,
        }
    }

    pub fn lower_is_better(&self) -> bool {
        matches!(self, BenchmarkMetric::DebtToEquityRatio)
    }

    pub fn is_percentage(&self) -> bool {
        !matches!(
            self,
            BenchmarkMetric::DebtToEquityRatio | BenchmarkMetric::CurrentRatio
        )
    }

    pub fn client_value(&self, metrics: &FinancialMetrics) -> f64 {
        match self {
            BenchmarkMetric::RevenueGrowthRate => metrics.revenue_change,
            BenchmarkMetric::ProfitMargin => metrics.profit_margin,
            BenchmarkMetric::ReturnOnAssets => metrics.return_on_assets,
            BenchmarkMetric::DebtToEquityRatio => metrics.debt_to_equity,
            BenchmarkMetric::CurrentRatio => metrics.current_ratio,
            BenchmarkMetric::GrossMargin => metrics.gross_margin,
        }
    }

    /// Percentages with one decimal and a `%`, ratios with two decimals
    pub fn format(&self, value: f64) -> String {
        if self.is_percentage() {
            format!("{:.1}%", value)
        } else {
            format!("{:.2}", value)
        }
    }

    /// Ties count as "above": higher-is-better needs client ≥ benchmark,
    /// lower-is-better needs client ≤ benchmark
    pub fn status(&self, client: f64, benchmark: f64) -> Status {
        let meets = if self.lower_is_better() {
            client <= benchmark
        } else {
            client >= benchmark
        };

        if meets {
            Status::Above
        } else {
            Status::Below
        }
    }
}

// ============================================================================
// SECTOR TABLE
// ============================================================================

/// Benchmark values of one sector keyed by metric name
#[derive(Debug, Clone, Default)]
pub struct BenchmarkTable {
    values: HashMap<String, f64>,
}

impl BenchmarkTable {
    /// Entries are expected newest period first; the first value per name wins
    pub fn from_entries(entries: &[BenchmarkEntry]) -> Self {
        let mut values = HashMap::new();
        for entry in entries {
            values
                .entry(entry.metric_name.trim().to_lowercase())
                .or_insert_with(|| coerce(entry.benchmark_value));
        }
        Self { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Recorded value for the metric, or its default when absent or zero
    pub fn resolve(&self, metric: BenchmarkMetric) -> f64 {
        metric
            .keys()
            .iter()
            .filter_map(|key| self.values.get(*key).copied())
            .find(|value| *value != 0.0)
            .unwrap_or_else(|| metric.default_value())
    }
}

// ============================================================================
// COMPARISON
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub metric: BenchmarkMetric,
    pub label: String,
    pub your_value: String,
    pub industry_average: String,
    pub difference: String,
    pub status: Status,
    pub client_value: f64,
    pub benchmark_value: f64,
}

pub fn compare_metric(
    metric: BenchmarkMetric,
    metrics: &FinancialMetrics,
    table: &BenchmarkTable,
) -> BenchmarkComparison {
    let client = metric.client_value(metrics);
    let benchmark = table.resolve(metric);

    BenchmarkComparison {
        metric,
        label: metric.label().to_string(),
        your_value: metric.format(client),
        industry_average: metric.format(benchmark),
        difference: metric.format(client - benchmark),
        status: metric.status(client, benchmark),
        client_value: client,
        benchmark_value: benchmark,
    }
}

/// All six comparisons in display order
pub fn compare_to_benchmarks(
    metrics: &FinancialMetrics,
    table: &BenchmarkTable,
) -> Vec<BenchmarkComparison> {
    BenchmarkMetric::ALL
        .iter()
        .map(|metric| compare_metric(*metric, metrics, table))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, value: Option<f64>, period: &str) -> BenchmarkEntry {
        BenchmarkEntry {
            benchmark_id: None,
            sector_id: 1,
            metric_name: name.to_string(),
            benchmark_value: value,
            period: Some(period.to_string()),
        }
    }

    #[test]
    fn test_default_fallback_for_missing_profit_margin() {
        let table = BenchmarkTable::from_entries(&[entry("current_ratio", Some(2.0), "2024")]);
        assert_eq!(table.resolve(BenchmarkMetric::ProfitMargin), 18.0);
        assert_eq!(table.resolve(BenchmarkMetric::CurrentRatio), 2.0);
    }

    #[test]
    fn test_all_defaults_on_empty_table() {
        let table = BenchmarkTable::default();
        assert!(table.is_empty());

        let expected = [12.0, 18.0, 8.5, 1.2, 1.5, 35.0];
        for (metric, value) in BenchmarkMetric::ALL.iter().zip(expected) {
            assert_eq!(table.resolve(*metric), value, "{}", metric.label());
        }
    }

    #[test]
    fn test_zero_and_null_fall_back_to_default() {
        let table = BenchmarkTable::from_entries(&[
            entry("gross_margin", Some(0.0), "2024"),
            entry("profit_margin", None, "2024"),
        ]);
        assert_eq!(table.resolve(BenchmarkMetric::GrossMargin), 35.0);
        assert_eq!(table.resolve(BenchmarkMetric::ProfitMargin), 18.0);
    }

    #[test]
    fn test_alias_keys_and_newest_wins() {
        let table = BenchmarkTable::from_entries(&[
            entry("roa", Some(9.0), "2024"),
            entry("ROA", Some(7.0), "2023"),
            entry("debt_to_equity", Some(0.55), "2024"),
        ]);
        assert_eq!(table.resolve(BenchmarkMetric::ReturnOnAssets), 9.0);
        assert_eq!(table.resolve(BenchmarkMetric::DebtToEquityRatio), 0.55);
    }

    #[test]
    fn test_debt_to_equity_lower_is_better() {
        let metrics = FinancialMetrics {
            debt_to_equity: 0.65,
            ..Default::default()
        };
        let table = BenchmarkTable::from_entries(&[entry("debt_to_equity_ratio", Some(0.55), "2024")]);

        let cmp = compare_metric(BenchmarkMetric::DebtToEquityRatio, &metrics, &table);
        assert_eq!(cmp.status, Status::Below);
        assert_eq!(cmp.your_value, "0.65");
        assert_eq!(cmp.industry_average, "0.55");
        assert_eq!(cmp.difference, "0.10");
    }

    #[test]
    fn test_ties_are_above() {
        let metrics = FinancialMetrics {
            profit_margin: 18.0,
            debt_to_equity: 1.2,
            ..Default::default()
        };
        let table = BenchmarkTable::default();

        assert_eq!(compare_metric(BenchmarkMetric::ProfitMargin, &metrics, &table).status, Status::Above);
        assert_eq!(compare_metric(BenchmarkMetric::DebtToEquityRatio, &metrics, &table).status, Status::Above);
    }

    #[test]
    fn test_full_comparison_formatting() {
        let metrics = FinancialMetrics {
            profit_margin: 20.0,
            revenue_change: 25.0,
            return_on_assets: 5.0,
            current_ratio: 2.0,
            gross_margin: 30.0,
            ..Default::default()
        };
        let rows = compare_to_benchmarks(&metrics, &BenchmarkTable::default());

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].label, "Revenue Growth Rate");
        assert_eq!(rows[0].your_value, "25.0%");
        assert_eq!(rows[0].industry_average, "12.0%");
        assert_eq!(rows[0].difference, "13.0%");
        assert_eq!(rows[0].status, Status::Above);

        assert_eq!(rows[1].your_value, "20.0%");
        assert_eq!(rows[1].status, Status::Above);

        assert_eq!(rows[2].difference, "-3.5%");
        assert_eq!(rows[2].status, Status::Below);

        // D/E of 0 is below the 1.2 default, which is good
        assert_eq!(rows[3].status, Status::Above);
        assert_eq!(rows[4].your_value, "2.00");
        assert_eq!(rows[4].status, Status::Above);
        assert_eq!(rows[5].status, Status::Below);
    }
}
