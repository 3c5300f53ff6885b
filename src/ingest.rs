// 📥 CSV Ingestion - parse uploaded statements and route them by header
//
// First line = headers, cells comma-delimited, no quoting. A header set
// mentioning revenue/income/expense is an income statement; asset/liability/
// equity is a balance sheet; anything else is rejected.

use crate::cache::SnapshotCache;
use crate::context::CompanyContext;
use crate::db::{self, Event, UploadStatus};
use crate::error::InsightError;
use crate::statements::{parse_quarter, BalanceSheetPeriod, IncomeStatementPeriod, DEFAULT_QUARTER};
use anyhow::Result;
use chrono::Datelike;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

const INCOME_MARKERS: [&str; 3] = ["revenue", "income", "expense"];
const BALANCE_MARKERS: [&str; 3] = ["asset", "liability", "equity"];

// ============================================================================
// CORE TYPES
// ============================================================================

/// Which statement table an upload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    IncomeStatement,
    BalanceSheet,
}

impl StatementKind {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            StatementKind::IncomeStatement => "Income Statement",
            StatementKind::BalanceSheet => "Balance Sheet",
        }
    }

    /// Short code stored on the upload record
    pub fn code(&self) -> &'static str {
        match self {
            StatementKind::IncomeStatement => "income_statement",
            StatementKind::BalanceSheet => "balance_sheet",
        }
    }
}

/// One parsed cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Null,
}

impl CellValue {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Null;
        }

        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Number(n) => serde_json::json!(n),
            CellValue::Text(s) => serde_json::json!(s),
            CellValue::Null => serde_json::Value::Null,
        }
    }
}

/// Normalized header → cell
pub type CsvRow = BTreeMap<String, CellValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUpload {
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
}

/// "Total Revenue " → "total_revenue"
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

// ============================================================================
// PARSING
// ============================================================================

/// Split delimited text into header-keyed rows.
///
/// Short rows get Null for the missing columns; extra cells are dropped.
pub fn parse_csv(text: &str) -> Result<ParsedUpload, InsightError> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return Err(InsightError::EmptyUpload("no header row".to_string()));
    }

    let body = lines.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(body.as_bytes());

    let mut records = reader.records();

    let headers: Vec<String> = match records.next() {
        Some(record) => record
            .map_err(|e| InsightError::Malformed(e.to_string()))?
            .iter()
            .map(normalize_header)
            .collect(),
        None => return Err(InsightError::EmptyUpload("no header row".to_string())),
    };

    let mut rows = Vec::new();
    for (line_num, record) in records.enumerate() {
        let record = record
            .map_err(|e| InsightError::Malformed(format!("line {}: {}", line_num + 2, e)))?;

        let row: CsvRow = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let cell = record.get(i).map(CellValue::parse).unwrap_or(CellValue::Null);
                (header.clone(), cell)
            })
            .collect();

        // Trailing ",,," lines from spreadsheet exports carry no data
        if row.values().all(|cell| *cell == CellValue::Null) {
            continue;
        }

        rows.push(row);
    }

    Ok(ParsedUpload { headers, rows })
}

/// Route a header set to a statement table
pub fn detect_statement_kind(headers: &[String]) -> Result<StatementKind, InsightError> {
    let mentions = |markers: &[&str]| {
        headers
            .iter()
            .any(|h| markers.iter().any(|marker| h.contains(marker)))
    };

    if mentions(&INCOME_MARKERS) {
        return Ok(StatementKind::IncomeStatement);
    }

    if mentions(&BALANCE_MARKERS) {
        return Ok(StatementKind::BalanceSheet);
    }

    Err(InsightError::Unclassifiable {
        headers: headers.join(", "),
    })
}

// ============================================================================
// ROW CONVERSION
// ============================================================================

/// Build a typed statement period from one parsed row
pub trait FromCsvRow: Sized {
    const KIND: StatementKind;

    fn blank(company_id: i64, year: i32, quarter: &str) -> Self;

    fn field_mut(&mut self, column: &str) -> Option<&mut Option<f64>>;

    fn metadata_mut(&mut self) -> &mut BTreeMap<String, serde_json::Value>;

    fn period_key(&self) -> (i32, String);

    /// Missing year → `default_year`, missing quarter → Q1. Unknown columns
    /// land in the metadata map; non-numeric values in numeric columns are null.
    /// A quarter outside Q1..Q4 rejects the row.
    fn from_row(company_id: i64, row: &CsvRow, default_year: i32) -> Result<Self, InsightError> {
        let year = row.get("year").and_then(year_from_cell).unwrap_or(default_year);
        let quarter = match row.get("quarter") {
            None | Some(CellValue::Null) => DEFAULT_QUARTER.to_string(),
            Some(cell) => quarter_from_cell(cell).ok_or_else(|| {
                InsightError::Malformed(format!("invalid quarter {}", cell.to_json()))
            })?,
        };

        let mut period = Self::blank(company_id, year, &quarter);

        for (column, cell) in row {
            if column == "year" || column == "quarter" || column == "company_id" {
                continue;
            }

            match period.field_mut(column) {
                Some(field) => *field = cell.as_number(),
                None if *cell != CellValue::Null => {
                    period.metadata_mut().insert(column.clone(), cell.to_json());
                }
                None => {}
            }
        }

        Ok(period)
    }
}

impl FromCsvRow for IncomeStatementPeriod {
    const KIND: StatementKind = StatementKind::IncomeStatement;

    fn blank(company_id: i64, year: i32, quarter: &str) -> Self {
        IncomeStatementPeriod::new(company_id, year, quarter)
    }

    fn field_mut(&mut self, column: &str) -> Option<&mut Option<f64>> {
        IncomeStatementPeriod::field_mut(self, column)
    }

    fn metadata_mut(&mut self) -> &mut BTreeMap<String, serde_json::Value> {
        &mut self.metadata
    }

    fn period_key(&self) -> (i32, String) {
        (self.year, self.quarter.clone())
    }
}

impl FromCsvRow for BalanceSheetPeriod {
    const KIND: StatementKind = StatementKind::BalanceSheet;

    fn blank(company_id: i64, year: i32, quarter: &str) -> Self {
        BalanceSheetPeriod::new(company_id, year, quarter)
    }

    fn field_mut(&mut self, column: &str) -> Option<&mut Option<f64>> {
        BalanceSheetPeriod::field_mut(self, column)
    }

    fn metadata_mut(&mut self) -> &mut BTreeMap<String, serde_json::Value> {
        &mut self.metadata
    }

    fn period_key(&self) -> (i32, String) {
        (self.year, self.quarter.clone())
    }
}

fn year_from_cell(cell: &CellValue) -> Option<i32> {
    match cell {
        CellValue::Number(n) if n.fract() == 0.0 && *n >= 1.0 && *n <= 9999.0 => Some(*n as i32),
        CellValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn quarter_from_cell(cell: &CellValue) -> Option<String> {
    match cell {
        CellValue::Number(n) if n.fract() == 0.0 => parse_quarter(&format!("{}", *n as i64)),
        CellValue::Text(s) => parse_quarter(s),
        _ => None,
    }
}

/// One period per (year, quarter); a second row for the same period rejects
/// the whole upload rather than silently replacing the first
pub fn rows_to_periods<T: FromCsvRow>(
    company_id: i64,
    rows: &[CsvRow],
    default_year: i32,
) -> Result<Vec<T>, InsightError> {
    let mut seen = HashSet::new();
    let mut periods = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let period = T::from_row(company_id, row, default_year).map_err(|e| match e {
            InsightError::Malformed(msg) => InsightError::Malformed(format!("row {}: {}", i + 1, msg)),
            other => other,
        })?;

        let (year, quarter) = period.period_key();
        if !seen.insert((year, quarter.clone())) {
            return Err(InsightError::Malformed(format!(
                "row {}: duplicate period {} {}",
                i + 1,
                quarter,
                year
            )));
        }

        periods.push(period);
    }

    Ok(periods)
}

// ============================================================================
// UPLOAD PIPELINE
// ============================================================================

/// SHA-256 of the uploaded text, hex encoded
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub upload_id: i64,
    pub kind: StatementKind,
    pub rows: usize,
}

/// Parse, classify and store one upload using the current year as default
pub fn ingest_upload(
    conn: &Connection,
    cache: &SnapshotCache,
    ctx: &CompanyContext,
    filename: &str,
    text: &str,
) -> Result<UploadOutcome> {
    let default_year = chrono::Local::now().year();
    ingest_upload_with_year(conn, cache, ctx, filename, text, default_year)
}

/// The upload record goes `processing` → `processed` | `error` either way;
/// on error the original cause is returned after the record is updated.
pub fn ingest_upload_with_year(
    conn: &Connection,
    cache: &SnapshotCache,
    ctx: &CompanyContext,
    filename: &str,
    text: &str,
    default_year: i32,
) -> Result<UploadOutcome> {
    let hash = content_hash(text);
    let upload_id = db::insert_upload(conn, ctx.company_id, filename, &hash)?;

    let result = store_rows(conn, ctx, text, default_year);
    // Whatever made it into the store must not be served stale
    cache.invalidate(ctx.company_id);

    match result {
        Ok((kind, rows)) => {
            db::update_upload_status(conn, upload_id, UploadStatus::Processed, Some(kind.code()), rows, None)?;

            let event = Event::new(
                "upload_processed",
                "upload",
                &upload_id.to_string(),
                serde_json::json!({
                    "company_id": ctx.company_id,
                    "filename": filename,
                    "kind": kind.code(),
                    "rows": rows,
                    "content_hash": hash,
                }),
                "csv_importer",
            );
            db::insert_event(conn, &event)?;

            info!(upload_id, filename, kind = kind.code(), rows, "upload processed");
            Ok(UploadOutcome { upload_id, kind, rows })
        }
        Err(err) => {
            let message = err.to_string();
            db::update_upload_status(conn, upload_id, UploadStatus::Error, None, 0, Some(&message))?;

            let event = Event::new(
                "upload_failed",
                "upload",
                &upload_id.to_string(),
                serde_json::json!({
                    "company_id": ctx.company_id,
                    "filename": filename,
                    "error": message,
                }),
                "csv_importer",
            );
            db::insert_event(conn, &event)?;

            warn!(upload_id, filename, error = %message, "upload rejected");
            Err(err)
        }
    }
}

fn store_rows(
    conn: &Connection,
    ctx: &CompanyContext,
    text: &str,
    default_year: i32,
) -> Result<(StatementKind, usize)> {
    let parsed = parse_csv(text)?;
    let kind = detect_statement_kind(&parsed.headers)?;

    if parsed.rows.is_empty() {
        return Err(InsightError::EmptyUpload("no data rows".to_string()).into());
    }

    let inserted = match kind {
        StatementKind::IncomeStatement => {
            let rows: Vec<IncomeStatementPeriod> =
                rows_to_periods(ctx.company_id, &parsed.rows, default_year)?;
            db::insert_income_statements(conn, &rows)?
        }
        StatementKind::BalanceSheet => {
            let rows: Vec<BalanceSheetPeriod> =
                rows_to_periods(ctx.company_id, &parsed.rows, default_year)?;
            db::insert_balance_sheets(conn, &rows)?
        }
    };

    Ok((kind, inserted))
}
