use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// An error raised while turning a descriptor sheet into command definitions.
///
/// Row-level variants reject a single row; `MissingRequiredColumn` raised for
/// a header fails the whole sheet. `AmbiguousSheetMatch` is only ever carried
/// as a [`LoadWarning`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", content = "detail")]
pub enum DescriptorError {
    #[error("malformed parameter spec '{segment}': {reason}")]
    MalformedParameterSpec { segment: String, reason: String },

    #[error("parameter '{name}' is declared more than once")]
    DuplicateParameterName { name: String },

    #[error("missing required column '{column}'")]
    MissingRequiredColumn { column: String },

    #[error("invalid direction '{token}', expected GET or SET")]
    InvalidDirection { token: String },

    #[error("malformed template at byte {offset}: {reason}")]
    MalformedTemplate { offset: usize, reason: String },

    #[error(
        "template placeholders {placeholders:?} do not match declared parameters {parameters:?}"
    )]
    PlaceholderParameterMismatch {
        placeholders: BTreeSet<String>,
        parameters: BTreeSet<String>,
    },

    #[error("model '{model}' matches several sheets; using '{chosen}', ignoring {ignored:?}")]
    AmbiguousSheetMatch {
        model: String,
        chosen: String,
        ignored: Vec<String>,
    },

    #[error("descriptor source error: {message}")]
    Source { message: String },
}

impl DescriptorError {
    pub(crate) fn malformed_spec(segment: &str, reason: impl Into<String>) -> Self {
        Self::MalformedParameterSpec {
            segment: segment.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_template(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedTemplate {
            offset,
            reason: reason.into(),
        }
    }

    /// Stable variant name, used as the error code surfaced to the UI.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedParameterSpec { .. } => "MalformedParameterSpec",
            Self::DuplicateParameterName { .. } => "DuplicateParameterName",
            Self::MissingRequiredColumn { .. } => "MissingRequiredColumn",
            Self::InvalidDirection { .. } => "InvalidDirection",
            Self::MalformedTemplate { .. } => "MalformedTemplate",
            Self::PlaceholderParameterMismatch { .. } => "PlaceholderParameterMismatch",
            Self::AmbiguousSheetMatch { .. } => "AmbiguousSheetMatch",
            Self::Source { .. } => "Source",
        }
    }
}

impl From<crate::workbook::WorkbookError> for DescriptorError {
    fn from(e: crate::workbook::WorkbookError) -> Self {
        Self::Source {
            message: e.to_string(),
        }
    }
}

/// A non-fatal problem found while loading a descriptor table.
///
/// `row` is the spreadsheet row number (the header is row 1), or `None` for
/// sheet-level warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadWarning {
    pub sheet: String,
    pub row: Option<usize>,
    pub error: DescriptorError,
}

impl LoadWarning {
    pub fn row(sheet: &str, row: usize, error: DescriptorError) -> Self {
        Self {
            sheet: sheet.to_string(),
            row: Some(row),
            error,
        }
    }

    pub fn sheet(sheet: &str, error: DescriptorError) -> Self {
        Self {
            sheet: sheet.to_string(),
            row: None,
            error,
        }
    }
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(f, "[{}] row {row}: {}", self.sheet, self.error),
            None => write!(f, "[{}] {}", self.sheet, self.error),
        }
    }
}
