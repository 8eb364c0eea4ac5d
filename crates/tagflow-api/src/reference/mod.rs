//! Reference data sources.
//!
//! A reference source returns the whole enrichment dataset as ordered rows
//! of named columns. Spreadsheet mechanics live upstream: sources here
//! read an already-tabulated JSON rendering of the sheet.

mod file;
mod http;

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, body_preview};

pub use file::FileReferenceSource;
pub use http::HttpReferenceSource;

/// The full dataset: a header row plus data rows in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReferenceTable {
    /// Position of a column, matched case-insensitively after trimming.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        self.columns
            .iter()
            .position(|c| c.trim().eq_ignore_ascii_case(wanted))
    }

    /// Parse either the tabular `{columns, rows}` shape or an array of
    /// records keyed by column name.
    pub fn from_json(body: &[u8]) -> Result<Self, Error> {
        let parsed: WireTable = serde_json::from_slice(body).map_err(|e| {
            let text = String::from_utf8_lossy(body);
            Error::Deserialization {
                message: format!("{e} (body preview: {:?})", body_preview(&text)),
                body: text.into_owned(),
            }
        })?;

        Ok(match parsed {
            WireTable::Tabular(table) => table,
            WireTable::Records(records) => Self::from_records(records),
        })
    }

    fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTable {
    Tabular(ReferenceTable),
    Records(Vec<Map<String, Value>>),
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Capability ──────────────────────────────────────────────────────

/// Bulk fetch of the reference dataset.
pub trait ReferenceSource: Send + Sync + 'static {
    fn fetch_all(&self) -> impl Future<Output = Result<ReferenceTable, Error>> + Send;
}

/// Static dispatch over the supported reference sources.
#[derive(Debug)]
pub enum ReferenceBackend {
    Http(HttpReferenceSource),
    File(FileReferenceSource),
    /// Fixed in-memory table. An empty one stands in when no source is configured.
    Static(ReferenceTable),
}

impl ReferenceSource for ReferenceBackend {
    async fn fetch_all(&self) -> Result<ReferenceTable, Error> {
        match self {
            Self::Http(source) => source.fetch_all().await,
            Self::File(source) => source.fetch_all().await,
            Self::Static(table) => Ok(table.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_tabular_shape() {
        let body = br#"{"columns":["Tag ID","Description"],"rows":[["FF01","Pallet"]]}"#;
        let table = ReferenceTable::from_json(body).unwrap();
        assert_eq!(table.columns, vec!["Tag ID", "Description"]);
        assert_eq!(table.rows[0][1], "Pallet");
    }

    #[test]
    fn parses_record_shape_and_fills_gaps() {
        let body = br#"[{"Tag ID":"FF01","Qty":3},{"Tag ID":"FF02","Owner":null}]"#;
        let table = ReferenceTable::from_json(body).unwrap();
        let key = table.column_index("tag id").unwrap();
        let qty = table.column_index(" QTY ").unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][key], "FF01");
        assert_eq!(table.rows[0][qty], "3");
        assert_eq!(table.rows[1][qty], "");
    }
}
