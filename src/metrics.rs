// 📈 Metric Calculator - derived ratios and period-over-period deltas
//
// Every formula lives in one registry (MetricName::evaluate) shared by the
// dashboard, KPI and benchmark views. Division by a zero or negative
// denominator yields 0, never NaN/Infinity.

use crate::error::InsightError;
use crate::statements::{BalanceSheetPeriod, IncomeStatementPeriod};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// GUARDED ARITHMETIC
// ============================================================================

/// numerator / denominator, or 0 when the denominator is not positive
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 || !denominator.is_finite() {
        return 0.0;
    }

    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// numerator / denominator × 100, same guard as `safe_ratio`
pub fn percent_of(numerator: f64, denominator: f64) -> f64 {
    safe_ratio(numerator, denominator) * 100.0
}

/// Relative change in percent; 0 when the previous value is not positive
pub fn percent_change(current: f64, previous: f64) -> f64 {
    safe_ratio(current - previous, previous) * 100.0
}

// ============================================================================
// INPUTS
// ============================================================================

/// The periods a formula may look at: latest income statement, the one before
/// it (if any) and the latest balance sheet (if any)
#[derive(Debug, Clone, Copy)]
pub struct PeriodInputs<'a> {
    pub current: &'a IncomeStatementPeriod,
    pub previous: Option<&'a IncomeStatementPeriod>,
    pub balance_sheet: Option<&'a BalanceSheetPeriod>,
}

impl<'a> PeriodInputs<'a> {
    pub fn new(
        current: &'a IncomeStatementPeriod,
        previous: Option<&'a IncomeStatementPeriod>,
        balance_sheet: Option<&'a BalanceSheetPeriod>,
    ) -> Self {
        Self {
            current,
            previous,
            balance_sheet,
        }
    }

    fn bs(&self, read: impl Fn(&BalanceSheetPeriod) -> f64) -> f64 {
        self.balance_sheet.map(read).unwrap_or(0.0)
    }
}

// ============================================================================
// FORMULA REGISTRY
// ============================================================================

/// The metrics a KPI can track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    RevenueGrowth,
    ProfitMargin,
    OperatingExpenses,
    NetIncome,
    #[serde(rename = "roa")]
    ReturnOnAssets,
    CurrentRatio,
    DebtToEquity,
    GrossMargin,
}

impl MetricName {
    pub const ALL: [MetricName; 8] = [
        MetricName::RevenueGrowth,
        MetricName::ProfitMargin,
        MetricName::OperatingExpenses,
        MetricName::NetIncome,
        MetricName::ReturnOnAssets,
        MetricName::CurrentRatio,
        MetricName::DebtToEquity,
        MetricName::GrossMargin,
    ];

    /// Stored key
    pub fn key(&self) -> &'static str {
        match self {
            MetricName::RevenueGrowth => "revenue_growth",
            MetricName::ProfitMargin => "profit_margin",
            MetricName::OperatingExpenses => "operating_expenses",
            MetricName::NetIncome => "net_income",
            MetricName::ReturnOnAssets => "roa",
            MetricName::CurrentRatio => "current_ratio",
            MetricName::DebtToEquity => "debt_to_equity",
            MetricName::GrossMargin => "gross_margin",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricName::RevenueGrowth => "Revenue Growth (%)",
            MetricName::ProfitMargin => "Profit Margin (%)",
            MetricName::OperatingExpenses => "Operating Expenses Reduction (%)",
            MetricName::NetIncome => "Net Income Growth (%)",
            MetricName::ReturnOnAssets => "Return on Assets (%)",
            MetricName::CurrentRatio => "Current Ratio",
            MetricName::DebtToEquity => "Debt-to-Equity Ratio",
            MetricName::GrossMargin => "Gross Margin (%)",
        }
    }

    /// Plain ratios are shown without a percent sign
    pub fn is_ratio(&self) -> bool {
        matches!(self, MetricName::CurrentRatio | MetricName::DebtToEquity)
    }

    /// Expense growth and leverage improve as they go down
    pub fn lower_is_better(&self) -> bool {
        matches!(self, MetricName::OperatingExpenses | MetricName::DebtToEquity)
    }

    pub fn format_value(&self, value: f64) -> String {
        if self.is_ratio() {
            format!("{:.2}", value)
        } else {
            format!("{:.2}%", value)
        }
    }

    pub fn evaluate(&self, inputs: &PeriodInputs<'_>) -> f64 {
        let cur = inputs.current;

        match self {
            MetricName::RevenueGrowth => inputs
                .previous
                .map(|prev| percent_change(cur.revenue(), prev.revenue()))
                .unwrap_or(0.0),
            MetricName::ProfitMargin => percent_of(cur.net_income(), cur.revenue()),
            MetricName::OperatingExpenses => inputs
                .previous
                .map(|prev| percent_change(cur.operating_expense(), prev.operating_expense()))
                .unwrap_or(0.0),
            MetricName::NetIncome => inputs
                .previous
                .map(|prev| percent_change(cur.net_income(), prev.net_income()))
                .unwrap_or(0.0),
            MetricName::ReturnOnAssets => {
                percent_of(cur.net_income(), inputs.bs(|bs| bs.total_assets()))
            }
            MetricName::CurrentRatio => safe_ratio(
                inputs.bs(|bs| bs.current_assets()),
                inputs.bs(|bs| bs.current_liabilities()),
            ),
            MetricName::DebtToEquity => safe_ratio(
                inputs.bs(|bs| bs.total_debt()),
                inputs.bs(|bs| bs.stockholders_equity()),
            ),
            MetricName::GrossMargin => percent_of(cur.gross_profit(), cur.revenue()),
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MetricName {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        let name = match key.as_str() {
            "revenue_growth" | "revenue_growth_rate" => MetricName::RevenueGrowth,
            "profit_margin" => MetricName::ProfitMargin,
            "operating_expenses" => MetricName::OperatingExpenses,
            "net_income" => MetricName::NetIncome,
            "roa" | "return_on_assets" => MetricName::ReturnOnAssets,
            "current_ratio" => MetricName::CurrentRatio,
            "debt_to_equity" | "debt_to_equity_ratio" => MetricName::DebtToEquity,
            "gross_margin" => MetricName::GrossMargin,
            _ => return Err(InsightError::UnknownMetric(s.to_string())),
        };
        Ok(name)
    }
}

// ============================================================================
// DASHBOARD METRICS
// ============================================================================

/// Fixed metric set for the latest period. Always fully populated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub total_revenue: f64,
    pub net_income: f64,
    pub operating_expenses: f64,
    pub profit_margin: f64,
    pub return_on_assets: f64,
    pub debt_to_equity: f64,
    pub current_ratio: f64,
    pub gross_margin: f64,
    pub revenue_change: f64,
    pub net_income_change: f64,
    pub expense_change: f64,
    /// Percentage points, not relative
    pub margin_change: f64,
}

impl FinancialMetrics {
    /// Value of a registry metric inside this set
    pub fn get(&self, name: MetricName) -> f64 {
        match name {
            MetricName::RevenueGrowth => self.revenue_change,
            MetricName::ProfitMargin => self.profit_margin,
            MetricName::OperatingExpenses => self.expense_change,
            MetricName::NetIncome => self.net_income_change,
            MetricName::ReturnOnAssets => self.return_on_assets,
            MetricName::CurrentRatio => self.current_ratio,
            MetricName::DebtToEquity => self.debt_to_equity,
            MetricName::GrossMargin => self.gross_margin,
        }
    }
}

pub fn calculate_metrics(
    current: &IncomeStatementPeriod,
    previous: Option<&IncomeStatementPeriod>,
    current_bs: Option<&BalanceSheetPeriod>,
) -> FinancialMetrics {
    let inputs = PeriodInputs::new(current, previous, current_bs);
    let profit_margin = MetricName::ProfitMargin.evaluate(&inputs);

    let margin_change = match previous {
        Some(prev) => {
            let prev_inputs = PeriodInputs::new(prev, None, None);
            profit_margin - MetricName::ProfitMargin.evaluate(&prev_inputs)
        }
        None => 0.0,
    };

    FinancialMetrics {
        total_revenue: current.revenue(),
        net_income: current.net_income(),
        operating_expenses: current.operating_expense(),
        profit_margin,
        return_on_assets: MetricName::ReturnOnAssets.evaluate(&inputs),
        debt_to_equity: MetricName::DebtToEquity.evaluate(&inputs),
        current_ratio: MetricName::CurrentRatio.evaluate(&inputs),
        gross_margin: MetricName::GrossMargin.evaluate(&inputs),
        revenue_change: MetricName::RevenueGrowth.evaluate(&inputs),
        net_income_change: MetricName::NetIncome.evaluate(&inputs),
        expense_change: MetricName::OperatingExpenses.evaluate(&inputs),
        margin_change,
    }
}

// ============================================================================
// COMPUTED METRIC
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Above,
    Below,
    Equal,
}

impl Status {
    /// Position of `value` against `reference`; "above" is the better side
    pub fn classify(value: f64, reference: f64, lower_is_better: bool) -> Status {
        if value == reference {
            Status::Equal
        } else if (value > reference) != lower_is_better {
            Status::Above
        } else {
            Status::Below
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Above => "above",
            Status::Below => "below",
            Status::Equal => "equal",
        }
    }
}

/// One metric for the latest period next to its value one period earlier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedMetric {
    pub name: MetricName,
    pub current_value: f64,
    pub prior_value: Option<f64>,
    pub percent_change: Option<f64>,
    pub status: Status,
}

/// `income` and `balance` are newest first. The prior value shifts the whole
/// window back by one period; it is absent when only one income period exists.
pub fn compute_metric(
    name: MetricName,
    income: &[IncomeStatementPeriod],
    balance: &[BalanceSheetPeriod],
) -> Option<ComputedMetric> {
    let current = income.first()?;
    let current_value = name.evaluate(&PeriodInputs::new(current, income.get(1), balance.first()));

    let prior_value = income.get(1).map(|prior| {
        name.evaluate(&PeriodInputs::new(prior, income.get(2), balance.get(1)))
    });

    let status = match prior_value {
        Some(prior) => Status::classify(current_value, prior, name.lower_is_better()),
        None => Status::Equal,
    };

    Some(ComputedMetric {
        name,
        current_value,
        prior_value,
        percent_change: prior_value.map(|prior| percent_change(current_value, prior)),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn income(year: i32, revenue: f64, net_income: f64, opex: f64, gross: f64) -> IncomeStatementPeriod {
        let mut is = IncomeStatementPeriod::new(1, year, "Q1");
        is.total_revenue = Some(revenue);
        is.net_income = Some(net_income);
        is.operating_expense = Some(opex);
        is.gross_profit = Some(gross);
        is
    }

    fn balance(assets: f64, debt: f64, equity: f64, ca: f64, cl: f64) -> BalanceSheetPeriod {
        let mut bs = BalanceSheetPeriod::new(1, 2024, "Q1");
        bs.total_assets = Some(assets);
        bs.total_debt = Some(debt);
        bs.stockholders_equity = Some(equity);
        bs.current_assets = Some(ca);
        bs.current_liabilities = Some(cl);
        bs
    }

    #[test]
    fn test_end_to_end_scenario() {
        let current = income(2024, 1_000_000.0, 200_000.0, 500_000.0, 400_000.0);
        let previous = income(2023, 800_000.0, 120_000.0, 400_000.0, 300_000.0);
        let bs = balance(2_000_000.0, 650_000.0, 1_000_000.0, 300_000.0, 200_000.0);

        let m = calculate_metrics(&current, Some(&previous), Some(&bs));

        assert!((m.profit_margin - 20.0).abs() < 1e-9);
        assert!((m.revenue_change - 25.0).abs() < 1e-9);
        assert!((m.gross_margin - 40.0).abs() < 1e-9);
        assert!((m.return_on_assets - 10.0).abs() < 1e-9);
        assert!((m.debt_to_equity - 0.65).abs() < 1e-9);
        assert!((m.current_ratio - 1.5).abs() < 1e-9);
        assert!((m.expense_change - 25.0).abs() < 1e-9);
        assert!((m.net_income_change - 66.666_666_666).abs() < 1e-6);
        // 20% now vs 15% before
        assert!((m.margin_change - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_revenue_masks_margins() {
        let current = income(2024, 0.0, 50_000.0, 10.0, 20_000.0);
        let m = calculate_metrics(&current, None, None);

        assert_eq!(m.profit_margin, 0.0);
        assert_eq!(m.gross_margin, 0.0);
        assert!(m.profit_margin.is_finite());
    }

    #[test]
    fn test_negative_denominators_yield_zero() {
        let current = income(2024, -100.0, 50.0, 0.0, 10.0);
        let bs = balance(-1.0, 10.0, -5.0, 10.0, 0.0);
        let m = calculate_metrics(&current, None, Some(&bs));

        assert_eq!(m.profit_margin, 0.0);
        assert_eq!(m.return_on_assets, 0.0);
        assert_eq!(m.debt_to_equity, 0.0);
        assert_eq!(m.current_ratio, 0.0);
    }

    #[test]
    fn test_no_previous_period_zeroes_changes() {
        let current = income(2024, 1_000.0, 100.0, 500.0, 300.0);
        let m = calculate_metrics(&current, None, None);

        assert_eq!(m.revenue_change, 0.0);
        assert_eq!(m.net_income_change, 0.0);
        assert_eq!(m.expense_change, 0.0);
        assert_eq!(m.margin_change, 0.0);
    }

    #[test]
    fn test_missing_fields_and_balance_sheet_read_as_zero() {
        let current = IncomeStatementPeriod::new(1, 2024, "Q1");
        let m = calculate_metrics(&current, None, None);
        assert_eq!(m, FinancialMetrics::default());
    }

    #[test]
    fn test_idempotent() {
        let current = income(2024, 1_234.0, 321.0, 99.0, 555.0);
        let previous = income(2023, 1_000.0, 300.0, 100.0, 500.0);
        let bs = balance(10_000.0, 2_000.0, 4_000.0, 800.0, 400.0);

        let first = calculate_metrics(&current, Some(&previous), Some(&bs));
        let second = calculate_metrics(&current, Some(&previous), Some(&bs));
        assert_eq!(first, second);
    }

    #[test]
    fn test_previous_with_zero_revenue_gives_zero_change() {
        let current = income(2024, 1_000.0, 100.0, 50.0, 10.0);
        let previous = income(2023, 0.0, 0.0, 0.0, 0.0);
        let m = calculate_metrics(&current, Some(&previous), None);

        assert_eq!(m.revenue_change, 0.0);
        assert_eq!(m.net_income_change, 0.0);
        assert_eq!(m.expense_change, 0.0);
        // previous margin masks to 0, so the point change equals the current margin
        assert!((m.margin_change - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_registry_matches_dashboard_set() {
        let current = income(2024, 900.0, 90.0, 300.0, 450.0);
        let previous = income(2023, 600.0, 30.0, 200.0, 300.0);
        let bs = balance(1_000.0, 300.0, 600.0, 500.0, 250.0);

        let m = calculate_metrics(&current, Some(&previous), Some(&bs));
        let inputs = PeriodInputs::new(&current, Some(&previous), Some(&bs));

        for name in MetricName::ALL {
            assert_eq!(name.evaluate(&inputs), m.get(name), "mismatch for {}", name);
        }
    }

    #[test]
    fn test_metric_name_round_trip_and_aliases() {
        for name in MetricName::ALL {
            assert_eq!(name.key().parse::<MetricName>().unwrap(), name);
        }
        assert_eq!("return_on_assets".parse::<MetricName>().unwrap(), MetricName::ReturnOnAssets);
        assert_eq!(
            "nope".parse::<MetricName>(),
            Err(InsightError::UnknownMetric("nope".to_string()))
        );
        assert_eq!(serde_json::to_string(&MetricName::ReturnOnAssets).unwrap(), "\"roa\"");
    }

    #[test]
    fn test_status_classify() {
        assert_eq!(Status::classify(5.0, 3.0, false), Status::Above);
        assert_eq!(Status::classify(1.0, 3.0, false), Status::Below);
        assert_eq!(Status::classify(0.65, 0.55, true), Status::Below);
        assert_eq!(Status::classify(0.45, 0.55, true), Status::Above);
        assert_eq!(Status::classify(2.0, 2.0, true), Status::Equal);
    }

    #[test]
    fn test_compute_metric_with_history() {
        let periods = vec![
            income(2024, 1_200.0, 240.0, 0.0, 0.0),
            income(2023, 1_000.0, 150.0, 0.0, 0.0),
            income(2022, 800.0, 100.0, 0.0, 0.0),
        ];

        let growth = compute_metric(MetricName::RevenueGrowth, &periods, &[]).unwrap();
        assert!((growth.current_value - 20.0).abs() < 1e-9);
        assert!((growth.prior_value.unwrap() - 25.0).abs() < 1e-9);
        assert_eq!(growth.status, Status::Below);

        let margin = compute_metric(MetricName::ProfitMargin, &periods[..1], &[]).unwrap();
        assert!((margin.current_value - 20.0).abs() < 1e-9);
        assert_eq!(margin.prior_value, None);
        assert_eq!(margin.percent_change, None);
        assert_eq!(margin.status, Status::Equal);

        assert!(compute_metric(MetricName::ProfitMargin, &[], &[]).is_none());
    }
}
