use crate::metrics::MetricName;
use crate::statements::{BalanceSheetPeriod, IncomeStatementPeriod};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Statement reads never return more than this many periods
pub const MAX_PERIOD_WINDOW: usize = 4;

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub sector_id: i64,
    pub sector_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: i64,
    pub client_id: i64,
    pub company_name: String,
    pub industry: Option<String>,
    pub sector_id: Option<i64>,
}

/// Sector reference value for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_id: Option<i64>,
    pub sector_id: i64,
    pub metric_name: String,
    pub benchmark_value: Option<f64>,
    pub period: Option<String>,
}

/// User-defined target; the current value is always recomputed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDefinition {
    pub kpi_id: i64,
    pub company_id: i64,
    pub metric_name: MetricName,
    pub target_value: f64,
    pub target_date: NaiveDate,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Processing,
    Processed,
    Error,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Processing => "processing",
            UploadStatus::Processed => "processed",
            UploadStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(UploadStatus::Processing),
            "processed" => Some(UploadStatus::Processed),
            "error" => Some(UploadStatus::Error),
            _ => None,
        }
    }
}

/// Upload history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub upload_id: i64,
    pub company_id: i64,
    pub filename: String,
    /// SHA-256 of the uploaded text
    pub content_hash: String,
    pub status: UploadStatus,
    /// "income_statement" / "balance_sheet" once classified
    pub statement_kind: Option<String>,
    pub row_count: i64,
    pub error_message: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sectors (
            sector_id INTEGER PRIMARY KEY AUTOINCREMENT,
            sector_name TEXT UNIQUE NOT NULL,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS companies (
            company_id INTEGER PRIMARY KEY AUTOINCREMENT,
            client_id INTEGER UNIQUE NOT NULL,
            company_name TEXT NOT NULL,
            industry TEXT,
            sector_id INTEGER REFERENCES sectors(sector_id)
        );

        CREATE TABLE IF NOT EXISTS income_statements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER NOT NULL REFERENCES companies(company_id),
            year INTEGER NOT NULL,
            quarter TEXT NOT NULL,
            total_revenue REAL,
            net_income REAL,
            operating_expense REAL,
            gross_profit REAL,
            cost_of_revenue REAL,
            ebit REAL,
            ebitda REAL,
            interest_expense REAL,
            metadata TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(company_id, year, quarter)
        );

        CREATE TABLE IF NOT EXISTS balance_sheets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER NOT NULL REFERENCES companies(company_id),
            year INTEGER NOT NULL,
            quarter TEXT NOT NULL,
            total_assets REAL,
            total_debt REAL,
            stockholders_equity REAL,
            current_assets REAL,
            current_liabilities REAL,
            total_liabilities REAL,
            cash_and_cash_equivalents REAL,
            inventory REAL,
            metadata TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(company_id, year, quarter)
        );

        CREATE TABLE IF NOT EXISTS benchmarks (
            benchmark_id INTEGER PRIMARY KEY AUTOINCREMENT,
            sector_id INTEGER NOT NULL REFERENCES sectors(sector_id),
            metric_name TEXT NOT NULL,
            benchmark_value REAL,
            period TEXT,
            calculation_date DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS kpis (
            kpi_id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER NOT NULL REFERENCES companies(company_id),
            metric_name TEXT NOT NULL,
            target_value REAL NOT NULL,
            target_date TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS uploads (
            upload_id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER NOT NULL REFERENCES companies(company_id),
            filename TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            status TEXT NOT NULL,
            statement_kind TEXT,
            row_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            uploaded_at TEXT NOT NULL
        );

        -- Audit trail
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_income_period ON income_statements(company_id, year, quarter);
        CREATE INDEX IF NOT EXISTS idx_balance_period ON balance_sheets(company_id, year, quarter);
        CREATE INDEX IF NOT EXISTS idx_benchmarks_sector ON benchmarks(sector_id);
        CREATE INDEX IF NOT EXISTS idx_kpis_company ON kpis(company_id);
        CREATE INDEX IF NOT EXISTS idx_uploads_company ON uploads(company_id);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);",
    )?;

    Ok(())
}

// ============================================================================
// ROW HELPERS
// ============================================================================

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_metadata(raw: Option<String>) -> BTreeMap<String, serde_json::Value> {
    raw.and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

fn metadata_json(metadata: &BTreeMap<String, serde_json::Value>) -> Result<Option<String>> {
    if metadata.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(metadata)?))
    }
}

fn clamp_window(limit: usize) -> i64 {
    limit.clamp(1, MAX_PERIOD_WINDOW) as i64
}

// ============================================================================
// SECTORS & COMPANIES
// ============================================================================

pub fn insert_sector(conn: &Connection, name: &str, description: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO sectors (sector_name, description) VALUES (?1, ?2)",
        params![name, description],
    )
    .with_context(|| format!("Failed to insert sector {}", name))?;

    Ok(conn.last_insert_rowid())
}

pub fn list_sectors(conn: &Connection) -> Result<Vec<Sector>> {
    let mut stmt = conn.prepare(
        "SELECT sector_id, sector_name, description FROM sectors ORDER BY sector_name",
    )?;

    let sectors = stmt
        .query_map([], |row| {
            Ok(Sector {
                sector_id: row.get(0)?,
                sector_name: row.get(1)?,
                description: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sectors)
}

fn company_from_row(row: &Row<'_>) -> rusqlite::Result<Company> {
    Ok(Company {
        company_id: row.get(0)?,
        client_id: row.get(1)?,
        company_name: row.get(2)?,
        industry: row.get(3)?,
        sector_id: row.get(4)?,
    })
}

/// Create the client's company, or update it when one exists
pub fn upsert_company(
    conn: &Connection,
    client_id: i64,
    company_name: &str,
    industry: Option<&str>,
    sector_id: Option<i64>,
) -> Result<Company> {
    conn.execute(
        "INSERT INTO companies (client_id, company_name, industry, sector_id)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(client_id) DO UPDATE SET
            company_name = excluded.company_name,
            industry = excluded.industry,
            sector_id = excluded.sector_id",
        params![client_id, company_name, industry, sector_id],
    )
    .context("Failed to save company")?;

    let company = get_company_for_client(conn, client_id)?
        .context("Company missing right after upsert")?;

    let event = Event::new(
        "company_saved",
        "company",
        &company.company_id.to_string(),
        serde_json::json!({
            "client_id": client_id,
            "company_name": company_name,
            "sector_id": sector_id,
        }),
        "company_setup",
    );
    insert_event(conn, &event)?;

    Ok(company)
}

pub fn get_company_for_client(conn: &Connection, client_id: i64) -> Result<Option<Company>> {
    let company = conn
        .query_row(
            "SELECT company_id, client_id, company_name, industry, sector_id
             FROM companies WHERE client_id = ?1
             ORDER BY company_id LIMIT 1",
            [client_id],
            company_from_row,
        )
        .optional()?;

    Ok(company)
}

pub fn get_company(conn: &Connection, company_id: i64) -> Result<Option<Company>> {
    let company = conn
        .query_row(
            "SELECT company_id, client_id, company_name, industry, sector_id
             FROM companies WHERE company_id = ?1",
            [company_id],
            company_from_row,
        )
        .optional()?;

    Ok(company)
}

// ============================================================================
// STATEMENTS
// ============================================================================

/// Bulk insert; re-uploading a (company, year, quarter) replaces that period
pub fn insert_income_statements(conn: &Connection, rows: &[IncomeStatementPeriod]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO income_statements (
                company_id, year, quarter, total_revenue, net_income, operating_expense,
                gross_profit, cost_of_revenue, ebit, ebitda, interest_expense, metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(company_id, year, quarter) DO UPDATE SET
                total_revenue = excluded.total_revenue,
                net_income = excluded.net_income,
                operating_expense = excluded.operating_expense,
                gross_profit = excluded.gross_profit,
                cost_of_revenue = excluded.cost_of_revenue,
                ebit = excluded.ebit,
                ebitda = excluded.ebitda,
                interest_expense = excluded.interest_expense,
                metadata = excluded.metadata",
        )?;

        for row in rows {
            stmt.execute(params![
                row.company_id,
                row.year,
                row.quarter,
                row.total_revenue,
                row.net_income,
                row.operating_expense,
                row.gross_profit,
                row.cost_of_revenue,
                row.ebit,
                row.ebitda,
                row.interest_expense,
                metadata_json(&row.metadata)?,
            ])
            .with_context(|| format!("Failed to insert income statement {}", row.period_label()))?;
        }
    }

    tx.commit()?;
    debug!(rows = rows.len(), "income statements written");

    Ok(rows.len())
}

pub fn insert_balance_sheets(conn: &Connection, rows: &[BalanceSheetPeriod]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO balance_sheets (
                company_id, year, quarter, total_assets, total_debt, stockholders_equity,
                current_assets, current_liabilities, total_liabilities,
                cash_and_cash_equivalents, inventory, metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(company_id, year, quarter) DO UPDATE SET
                total_assets = excluded.total_assets,
                total_debt = excluded.total_debt,
                stockholders_equity = excluded.stockholders_equity,
                current_assets = excluded.current_assets,
                current_liabilities = excluded.current_liabilities,
                total_liabilities = excluded.total_liabilities,
                cash_and_cash_equivalents = excluded.cash_and_cash_equivalents,
                inventory = excluded.inventory,
                metadata = excluded.metadata",
        )?;

        for row in rows {
            stmt.execute(params![
                row.company_id,
                row.year,
                row.quarter,
                row.total_assets,
                row.total_debt,
                row.stockholders_equity,
                row.current_assets,
                row.current_liabilities,
                row.total_liabilities,
                row.cash_and_cash_equivalents,
                row.inventory,
                metadata_json(&row.metadata)?,
            ])
            .with_context(|| format!("Failed to insert balance sheet {}", row.period_label()))?;
        }
    }

    tx.commit()?;
    debug!(rows = rows.len(), "balance sheets written");

    Ok(rows.len())
}

/// Most recent income statements, newest first (limit clamped to 1..=4)
pub fn latest_income_statements(
    conn: &Connection,
    company_id: i64,
    limit: usize,
) -> Result<Vec<IncomeStatementPeriod>> {
    let mut stmt = conn.prepare(
        "SELECT company_id, year, quarter, total_revenue, net_income, operating_expense,
                gross_profit, cost_of_revenue, ebit, ebitda, interest_expense, metadata
         FROM income_statements
         WHERE company_id = ?1
         ORDER BY year DESC, quarter DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![company_id, clamp_window(limit)], |row| {
            Ok(IncomeStatementPeriod {
                company_id: row.get(0)?,
                year: row.get(1)?,
                quarter: row.get(2)?,
                total_revenue: row.get(3)?,
                net_income: row.get(4)?,
                operating_expense: row.get(5)?,
                gross_profit: row.get(6)?,
                cost_of_revenue: row.get(7)?,
                ebit: row.get(8)?,
                ebitda: row.get(9)?,
                interest_expense: row.get(10)?,
                metadata: parse_metadata(row.get(11)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Most recent balance sheets, newest first (limit clamped to 1..=4)
pub fn latest_balance_sheets(
    conn: &Connection,
    company_id: i64,
    limit: usize,
) -> Result<Vec<BalanceSheetPeriod>> {
    let mut stmt = conn.prepare(
        "SELECT company_id, year, quarter, total_assets, total_debt, stockholders_equity,
                current_assets, current_liabilities, total_liabilities,
                cash_and_cash_equivalents, inventory, metadata
         FROM balance_sheets
         WHERE company_id = ?1
         ORDER BY year DESC, quarter DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![company_id, clamp_window(limit)], |row| {
            Ok(BalanceSheetPeriod {
                company_id: row.get(0)?,
                year: row.get(1)?,
                quarter: row.get(2)?,
                total_assets: row.get(3)?,
                total_debt: row.get(4)?,
                stockholders_equity: row.get(5)?,
                current_assets: row.get(6)?,
                current_liabilities: row.get(7)?,
                total_liabilities: row.get(8)?,
                cash_and_cash_equivalents: row.get(9)?,
                inventory: row.get(10)?,
                metadata: parse_metadata(row.get(11)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

// ============================================================================
// BENCHMARKS
// ============================================================================

pub fn insert_benchmark(conn: &Connection, entry: &BenchmarkEntry) -> Result<i64> {
    conn.execute(
        "INSERT INTO benchmarks (sector_id, metric_name, benchmark_value, period)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.sector_id,
            entry.metric_name,
            entry.benchmark_value,
            entry.period,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Sector benchmarks, newest period first
pub fn get_benchmarks_for_sector(conn: &Connection, sector_id: i64) -> Result<Vec<BenchmarkEntry>> {
    let mut stmt = conn.prepare(
        "SELECT benchmark_id, sector_id, metric_name, benchmark_value, period
         FROM benchmarks
         WHERE sector_id = ?1
         ORDER BY period DESC, benchmark_id DESC",
    )?;

    let entries = stmt
        .query_map([sector_id], |row| {
            Ok(BenchmarkEntry {
                benchmark_id: row.get(0)?,
                sector_id: row.get(1)?,
                metric_name: row.get(2)?,
                benchmark_value: row.get(3)?,
                period: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

// ============================================================================
// KPIs
// ============================================================================

pub fn insert_kpi(
    conn: &Connection,
    company_id: i64,
    metric_name: MetricName,
    target_value: f64,
    target_date: NaiveDate,
    description: &str,
) -> Result<KpiDefinition> {
    let created_at = Utc::now();

    conn.execute(
        "INSERT INTO kpis (company_id, metric_name, target_value, target_date, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            company_id,
            metric_name.key(),
            target_value,
            target_date.format("%Y-%m-%d").to_string(),
            description,
            created_at.to_rfc3339(),
        ],
    )
    .context("Failed to insert KPI")?;

    let kpi = KpiDefinition {
        kpi_id: conn.last_insert_rowid(),
        company_id,
        metric_name,
        target_value,
        target_date,
        description: description.to_string(),
        created_at,
    };

    let event = Event::new(
        "kpi_added",
        "kpi",
        &kpi.kpi_id.to_string(),
        serde_json::json!({
            "company_id": company_id,
            "metric_name": metric_name.key(),
            "target_value": target_value,
        }),
        "kpi_tracker",
    );
    insert_event(conn, &event)?;

    Ok(kpi)
}

/// Returns false when the KPI does not exist for this company
pub fn delete_kpi(conn: &Connection, company_id: i64, kpi_id: i64) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM kpis WHERE kpi_id = ?1 AND company_id = ?2",
        params![kpi_id, company_id],
    )?;

    if deleted > 0 {
        let event = Event::new(
            "kpi_deleted",
            "kpi",
            &kpi_id.to_string(),
            serde_json::json!({ "company_id": company_id }),
            "kpi_tracker",
        );
        insert_event(conn, &event)?;
    }

    Ok(deleted > 0)
}

/// Newest first; `limit` of None returns all
pub fn list_kpis(conn: &Connection, company_id: i64, limit: Option<usize>) -> Result<Vec<KpiDefinition>> {
    let mut stmt = conn.prepare(
        "SELECT kpi_id, company_id, metric_name, target_value, target_date, description, created_at
         FROM kpis
         WHERE company_id = ?1
         ORDER BY created_at DESC, kpi_id DESC
         LIMIT ?2",
    )?;

    let limit = limit.map(|l| l as i64).unwrap_or(-1);

    let kpis = stmt
        .query_map(params![company_id, limit], |row| {
            let metric_raw: String = row.get(2)?;
            let date_raw: String = row.get(4)?;
            let created_raw: String = row.get(6)?;

            Ok(KpiDefinition {
                kpi_id: row.get(0)?,
                company_id: row.get(1)?,
                metric_name: metric_raw.parse().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                })?,
                target_value: row.get(3)?,
                target_date: NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d").map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
                })?,
                description: row.get(5)?,
                created_at: parse_timestamp(6, &created_raw)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(kpis)
}

// ============================================================================
// UPLOAD HISTORY
// ============================================================================

/// New upload entry in `processing` state
pub fn insert_upload(
    conn: &Connection,
    company_id: i64,
    filename: &str,
    content_hash: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO uploads (company_id, filename, content_hash, status, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            company_id,
            filename,
            content_hash,
            UploadStatus::Processing.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )
    .context("Failed to record upload")?;

    Ok(conn.last_insert_rowid())
}

pub fn update_upload_status(
    conn: &Connection,
    upload_id: i64,
    status: UploadStatus,
    statement_kind: Option<&str>,
    row_count: usize,
    error_message: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE uploads
         SET status = ?1, statement_kind = ?2, row_count = ?3, error_message = ?4
         WHERE upload_id = ?5",
        params![
            status.as_str(),
            statement_kind,
            row_count as i64,
            error_message,
            upload_id,
        ],
    )?;

    info!(upload_id, status = status.as_str(), row_count, "upload status updated");
    Ok(())
}

/// Upload history, newest first
pub fn list_uploads(conn: &Connection, company_id: i64) -> Result<Vec<UploadRecord>> {
    let mut stmt = conn.prepare(
        "SELECT upload_id, company_id, filename, content_hash, status, statement_kind,
                row_count, error_message, uploaded_at
         FROM uploads
         WHERE company_id = ?1
         ORDER BY uploaded_at DESC, upload_id DESC",
    )?;

    let uploads = stmt
        .query_map([company_id], |row| {
            let status_raw: String = row.get(4)?;
            let uploaded_raw: String = row.get(8)?;

            Ok(UploadRecord {
                upload_id: row.get(0)?,
                company_id: row.get(1)?,
                filename: row.get(2)?,
                content_hash: row.get(3)?,
                status: UploadStatus::parse(&status_raw).unwrap_or(UploadStatus::Error),
                statement_kind: row.get(5)?,
                row_count: row.get(6)?,
                error_message: row.get(7)?,
                uploaded_at: parse_timestamp(8, &uploaded_raw)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(uploads)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Connection, Company) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let sector = insert_sector(&conn, "Retail", Some("Shops")).unwrap();
        let company = upsert_company(&conn, 7, "Acme", Some("Retail"), Some(sector)).unwrap();
        (conn, company)
    }

    fn income(company_id: i64, year: i32, quarter: &str, revenue: f64) -> IncomeStatementPeriod {
        let mut is = IncomeStatementPeriod::new(company_id, year, quarter);
        is.total_revenue = Some(revenue);
        is
    }

    #[test]
    fn test_upsert_company_updates_in_place() {
        let (conn, company) = test_db();

        let updated = upsert_company(&conn, 7, "Acme Holdings", None, company.sector_id).unwrap();
        assert_eq!(updated.company_id, company.company_id);
        assert_eq!(updated.company_name, "Acme Holdings");
        assert_eq!(updated.industry, None);

        assert!(get_company_for_client(&conn, 99).unwrap().is_none());
        assert_eq!(get_company(&conn, company.company_id).unwrap(), Some(updated));

        let events = get_events_for_entity(&conn, "company", &company.company_id.to_string()).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_latest_income_statements_ordering_and_limit() {
        let (conn, company) = test_db();
        let id = company.company_id;

        let rows = vec![
            income(id, 2023, "Q4", 100.0),
            income(id, 2024, "Q1", 200.0),
            income(id, 2024, "Q3", 400.0),
            income(id, 2024, "Q2", 300.0),
            income(id, 2022, "Q1", 50.0),
        ];
        assert_eq!(insert_income_statements(&conn, &rows).unwrap(), 5);

        let latest = latest_income_statements(&conn, id, 2).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].period_label(), "Q3 2024");
        assert_eq!(latest[1].period_label(), "Q2 2024");

        // Window is capped at four periods
        assert_eq!(latest_income_statements(&conn, id, 10).unwrap().len(), 4);
        assert_eq!(latest_income_statements(&conn, id, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_reupload_replaces_period() {
        let (conn, company) = test_db();
        let id = company.company_id;

        insert_income_statements(&conn, &[income(id, 2024, "Q1", 100.0)]).unwrap();
        let mut replacement = income(id, 2024, "Q1", 150.0);
        replacement
            .metadata
            .insert("notes".to_string(), serde_json::json!("restated"));
        insert_income_statements(&conn, &[replacement]).unwrap();

        let latest = latest_income_statements(&conn, id, 4).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].total_revenue, Some(150.0));
        assert_eq!(latest[0].metadata.get("notes"), Some(&serde_json::json!("restated")));
    }

    #[test]
    fn test_balance_sheet_round_trip_keeps_nulls() {
        let (conn, company) = test_db();
        let mut bs = BalanceSheetPeriod::new(company.company_id, 2024, "Q2");
        bs.total_assets = Some(1_000.0);
        insert_balance_sheets(&conn, &[bs.clone()]).unwrap();

        let latest = latest_balance_sheets(&conn, company.company_id, 1).unwrap();
        assert_eq!(latest, vec![bs]);
        assert_eq!(latest[0].total_debt, None);
    }

    #[test]
    fn test_benchmarks_by_sector_newest_first() {
        let (conn, company) = test_db();
        let sector = company.sector_id.unwrap();

        for (name, value, period) in [
            ("profit_margin", Some(15.0), "2023"),
            ("profit_margin", Some(17.0), "2024"),
            ("gross_margin", None, "2024"),
        ] {
            insert_benchmark(
                &conn,
                &BenchmarkEntry {
                    benchmark_id: None,
                    sector_id: sector,
                    metric_name: name.to_string(),
                    benchmark_value: value,
                    period: Some(period.to_string()),
                },
            )
            .unwrap();
        }

        let entries = get_benchmarks_for_sector(&conn, sector).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].period.as_deref(), Some("2024"));
        assert_eq!(entries.last().unwrap().benchmark_value, Some(15.0));
        assert!(get_benchmarks_for_sector(&conn, 999).unwrap().is_empty());
    }

    #[test]
    fn test_kpi_insert_list_delete() {
        let (conn, company) = test_db();
        let id = company.company_id;
        let date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();

        let first = insert_kpi(&conn, id, MetricName::ProfitMargin, 20.0, date, "margin").unwrap();
        let second = insert_kpi(&conn, id, MetricName::CurrentRatio, 1.8, date, "").unwrap();

        let kpis = list_kpis(&conn, id, None).unwrap();
        assert_eq!(kpis.len(), 2);
        assert_eq!(kpis[0].kpi_id, second.kpi_id);
        assert_eq!(kpis[1].metric_name, MetricName::ProfitMargin);
        assert_eq!(kpis[1].target_date, date);

        assert_eq!(list_kpis(&conn, id, Some(1)).unwrap().len(), 1);

        // Other companies cannot delete it
        assert!(!delete_kpi(&conn, id + 1, first.kpi_id).unwrap());
        assert!(delete_kpi(&conn, id, first.kpi_id).unwrap());
        assert!(!delete_kpi(&conn, id, first.kpi_id).unwrap());
        assert_eq!(list_kpis(&conn, id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_upload_status_lifecycle() {
        let (conn, company) = test_db();

        let upload_id = insert_upload(&conn, company.company_id, "q1.csv", "abc").unwrap();
        let uploads = list_uploads(&conn, company.company_id).unwrap();
        assert_eq!(uploads[0].status, UploadStatus::Processing);
        assert_eq!(uploads[0].row_count, 0);

        update_upload_status(&conn, upload_id, UploadStatus::Processed, Some("income_statement"), 3, None)
            .unwrap();
        let uploads = list_uploads(&conn, company.company_id).unwrap();
        assert_eq!(uploads[0].status, UploadStatus::Processed);
        assert_eq!(uploads[0].row_count, 3);
        assert_eq!(uploads[0].statement_kind.as_deref(), Some("income_statement"));
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new(
            "test_event",
            "upload",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "upload", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
        assert_eq!(events[0].data, serde_json::json!({"test": "data"}));
    }
}
