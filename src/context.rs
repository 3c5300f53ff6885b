// Explicit company context, resolved once per request/command and passed down

use crate::db::{self, Company};
use crate::error::InsightError;
use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Sector used when a company has not picked one
pub const DEFAULT_SECTOR_ID: i64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyContext {
    pub client_id: i64,
    pub company_id: i64,
    pub company_name: String,
    pub sector_id: i64,
}

impl From<&Company> for CompanyContext {
    fn from(company: &Company) -> Self {
        Self {
            client_id: company.client_id,
            company_id: company.company_id,
            company_name: company.company_name.clone(),
            sector_id: company.sector_id.unwrap_or(DEFAULT_SECTOR_ID),
        }
    }
}

/// Context for a client; `InsightError::NoCompany` when setup is incomplete
pub fn resolve_context(conn: &Connection, client_id: i64) -> Result<CompanyContext> {
    match db::get_company_for_client(conn, client_id)? {
        Some(company) => Ok(CompanyContext::from(&company)),
        None => Err(InsightError::NoCompany.into()),
    }
}

/// No client (no session) resolves to None so callers can show an empty state
pub fn resolve_session(conn: &Connection, client_id: Option<i64>) -> Result<Option<CompanyContext>> {
    client_id
        .map(|id| resolve_context(conn, id))
        .transpose()
}

/// Company setup form; name, industry and sector are all required
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanySetup {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub industry: String,
    pub sector_id: Option<i64>,
}

impl CompanySetup {
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.company_name.trim().is_empty() {
            missing.push("company_name");
        }
        if self.industry.trim().is_empty() {
            missing.push("industry");
        }
        if self.sector_id.is_none() {
            missing.push("sector_id");
        }
        missing
    }
}

/// Create or update the client's company and return its fresh context
pub fn save_company(conn: &Connection, client_id: i64, setup: &CompanySetup) -> Result<CompanyContext> {
    let missing = setup.missing_fields();
    if !missing.is_empty() {
        return Err(InsightError::MissingFields(missing.join(", ")).into());
    }

    let company = db::upsert_company(
        conn,
        client_id,
        setup.company_name.trim(),
        Some(setup.industry.trim()),
        setup.sector_id,
    )?;

    info!(client_id, company_id = company.company_id, "company saved");
    Ok(CompanyContext::from(&company))
}
