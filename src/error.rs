// Domain errors surfaced to users (upload rejections, missing setup, bad KPI input).
// Storage and IO failures travel as anyhow::Error like everywhere else.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InsightError {
    #[error("Upload is empty: {0}")]
    EmptyUpload(String),

    #[error("Malformed upload: {0}")]
    Malformed(String),

    #[error("Could not classify upload: no income statement or balance sheet columns in [{headers}]")]
    Unclassifiable { headers: String },

    #[error("No company found. Please set up your company first.")]
    NoCompany,

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Missing fields: {0}")]
    MissingFields(String),
}
