//! tfgen-sheet: spreadsheet ingestion.
//!
//! Consumes the decoded workbook model (one sheet per resource type, a
//! header row, one resource per data row) and produces canonical resources
//! with safe defaults injected and metadata columns mirrored into `Tags`.
//! Decoding the binary upload itself belongs to the HTTP surface.

pub mod parser;
pub mod sample;

pub use parser::{IngestResult, SheetParser};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded workbook: ordered sheets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

/// One sheet; the name encodes platform and resource type
/// (`AWS_EC2`, `Azure_VM`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    /// Header row; a trailing `*` marks a required column and is stripped.
    pub headers: Vec<String>,
    /// Data rows, cell-per-header. Shorter rows are allowed.
    pub rows: Vec<Vec<Value>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, headers: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            headers: headers.into_iter().map(String::from).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> &mut Self {
        self.rows.push(row);
        self
    }
}
