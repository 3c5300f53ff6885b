// 📒 Statement periods - income statement and balance sheet rows
// One row per company per (year, quarter); numeric fields are nullable like the
// uploaded data, and readers coerce them to 0.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_QUARTER: &str = "Q1";

/// Missing or non-finite source values read as 0
pub fn coerce(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Normalize quarter labels: "q3", "3", " Q3 " → "Q3"
pub fn normalize_quarter(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_QUARTER.to_string();
    }

    let digits = trimmed.trim_start_matches(['q', 'Q']);
    match digits.parse::<u8>() {
        Ok(n @ 1..=4) => format!("Q{}", n),
        _ => trimmed.to_uppercase(),
    }
}

/// Strict form used at ingest: only Q1..Q4 (any case, with or without the Q)
pub fn parse_quarter(raw: &str) -> Option<String> {
    let digits = raw.trim().trim_start_matches(['q', 'Q']);
    match digits.parse::<u8>() {
        Ok(n @ 1..=4) => Some(format!("Q{}", n)),
        _ => None,
    }
}

// ============================================================================
// INCOME STATEMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatementPeriod {
    pub company_id: i64,
    pub year: i32,
    pub quarter: String,

    pub total_revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub operating_expense: Option<f64>,
    pub gross_profit: Option<f64>,
    pub cost_of_revenue: Option<f64>,
    pub ebit: Option<f64>,
    pub ebitda: Option<f64>,
    pub interest_expense: Option<f64>,

    /// Columns the upload carried that have no dedicated field
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl IncomeStatementPeriod {
    pub fn new(company_id: i64, year: i32, quarter: &str) -> Self {
        Self {
            company_id,
            year,
            quarter: normalize_quarter(quarter),
            total_revenue: None,
            net_income: None,
            operating_expense: None,
            gross_profit: None,
            cost_of_revenue: None,
            ebit: None,
            ebitda: None,
            interest_expense: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn revenue(&self) -> f64 {
        coerce(self.total_revenue)
    }

    pub fn net_income(&self) -> f64 {
        coerce(self.net_income)
    }

    pub fn operating_expense(&self) -> f64 {
        coerce(self.operating_expense)
    }

    pub fn gross_profit(&self) -> f64 {
        coerce(self.gross_profit)
    }

    /// Field for a normalized column name, including the aliases uploads use
    pub fn field_mut(&mut self, column: &str) -> Option<&mut Option<f64>> {
        match column {
            "total_revenue" | "revenue" | "total_revenues" => Some(&mut self.total_revenue),
            "net_income" | "net_income_common_stockholders" => Some(&mut self.net_income),
            "operating_expense" | "operating_expenses" => Some(&mut self.operating_expense),
            "gross_profit" => Some(&mut self.gross_profit),
            "cost_of_revenue" | "cost_of_sales" => Some(&mut self.cost_of_revenue),
            "ebit" => Some(&mut self.ebit),
            "ebitda" => Some(&mut self.ebitda),
            "interest_expense" => Some(&mut self.interest_expense),
            _ => None,
        }
    }

    pub fn period_label(&self) -> String {
        format!("{} {}", self.quarter, self.year)
    }
}

// ============================================================================
// BALANCE SHEET
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheetPeriod {
    pub company_id: i64,
    pub year: i32,
    pub quarter: String,

    pub total_assets: Option<f64>,
    pub total_debt: Option<f64>,
    pub stockholders_equity: Option<f64>,
    pub current_assets: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub cash_and_cash_equivalents: Option<f64>,
    pub inventory: Option<f64>,

    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl BalanceSheetPeriod {
    pub fn new(company_id: i64, year: i32, quarter: &str) -> Self {
        Self {
            company_id,
            year,
            quarter: normalize_quarter(quarter),
            total_assets: None,
            total_debt: None,
            stockholders_equity: None,
            current_assets: None,
            current_liabilities: None,
            total_liabilities: None,
            cash_and_cash_equivalents: None,
            inventory: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn total_assets(&self) -> f64 {
        coerce(self.total_assets)
    }

    pub fn total_debt(&self) -> f64 {
        coerce(self.total_debt)
    }

    pub fn stockholders_equity(&self) -> f64 {
        coerce(self.stockholders_equity)
    }

    pub fn current_assets(&self) -> f64 {
        coerce(self.current_assets)
    }

    pub fn current_liabilities(&self) -> f64 {
        coerce(self.current_liabilities)
    }

    pub fn field_mut(&mut self, column: &str) -> Option<&mut Option<f64>> {
        match column {
            "total_assets" => Some(&mut self.total_assets),
            "total_debt" => Some(&mut self.total_debt),
            "stockholders_equity" | "shareholders_equity" | "total_equity" => {
                Some(&mut self.stockholders_equity)
            }
            "current_assets" | "total_current_assets" => Some(&mut self.current_assets),
            "current_liabilities" | "total_current_liabilities" => {
                Some(&mut self.current_liabilities)
            }
            "total_liabilities" => Some(&mut self.total_liabilities),
            "cash_and_cash_equivalents" | "cash" => Some(&mut self.cash_and_cash_equivalents),
            "inventory" => Some(&mut self.inventory),
            _ => None,
        }
    }

    pub fn period_label(&self) -> String {
        format!("{} {}", self.quarter, self.year)
    }
}
