//! Descriptor workbooks: one sheet per instrument model.
//!
//! [`SheetSource`] is the seam to whatever reads the spreadsheet. The
//! in-memory [`Workbook`] implements it and can be loaded from the JSON
//! export format described by [`workbook_schema`].

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::files::{read_json, FileError};

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("sheet '{0}' not found")]
    SheetNotFound(String),
    #[error(transparent)]
    File(#[from] FileError),
    #[error("invalid workbook JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read access to the sheets of a descriptor workbook.
pub trait SheetSource: Send + Sync {
    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    fn sheet(&self, name: &str) -> Result<Sheet, WorkbookError>;
}

/// One sheet: a header row plus data rows of text cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Sheet {
    pub name: String,
    #[serde(default)]
    pub headers: Vec<String>,
    /// Numeric and boolean cells are converted to text; `null` becomes an empty cell.
    #[serde(default, deserialize_with = "text_rows")]
    #[schemars(with = "Vec<Vec<serde_json::Value>>")]
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new<H, R>(name: impl Into<String>, headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator,
        R::Item: IntoIterator,
        <R::Item as IntoIterator>::Item: Into<String>,
    {
        Self {
            name: name.into(),
            headers: headers.into_iter().map(Into::into).collect(),
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// Cell text, or `""` past the end of a short row.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map_or("", String::as_str)
    }
}

fn text_rows<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<String>>, D::Error> {
    let raw = Vec::<Vec<Value>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect())
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Bool(b) => (if b { "TRUE" } else { "FALSE" }).to_string(),
        other => other.to_string(),
    }
}

/// An in-memory workbook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    pub fn from_json_str(json: &str) -> Result<Self, WorkbookError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, WorkbookError> {
        Ok(read_json(path)?)
    }
}

impl SheetSource for Workbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn sheet(&self, name: &str) -> Result<Sheet, WorkbookError> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| WorkbookError::SheetNotFound(name.to_string()))
    }
}

/// JSON Schema of the workbook export format.
pub fn workbook_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(Workbook)).unwrap_or(Value::Null)
}
