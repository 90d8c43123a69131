//! Parser for the `Parameter` column of a descriptor sheet.
//!
//! A cell holds zero or more parameter specs separated by `|`:
//!
//! | Segment           | Result                                   |
//! |-------------------|------------------------------------------|
//! | `FREQ`            | free text named `FREQ`                   |
//! | `VOLT:V.3f`       | number printed with 3 decimals           |
//! | `CH:C1;C2`        | dropdown with options `C1`, `C2`         |

use std::collections::HashSet;

use serde::Serialize;
use ts_rs::TS;

use super::error::DescriptorError;

pub const SPEC_SEPARATOR: char = '|';
pub const KIND_SEPARATOR: char = ':';
pub const OPTION_SEPARATOR: char = ';';

/// Upper bound on `V.<n>f` precision.
pub const MAX_DECIMALS: u32 = 30;

/// How a parameter's raw value is validated and formatted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum ParameterKind {
    Free,
    FormattedFree { decimals: u32 },
    Enumerated { options: Vec<String> },
}

/// One input slot of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct ParameterDescriptor {
    pub name: String,
    pub kind: ParameterKind,
}

impl ParameterDescriptor {
    pub fn free(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Free,
        }
    }

    pub fn formatted(name: impl Into<String>, decimals: u32) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::FormattedFree { decimals },
        }
    }

    pub fn enumerated<S: Into<String>>(
        name: impl Into<String>,
        options: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Enumerated {
                options: options.into_iter().map(Into::into).collect(),
            },
        }
    }
}

/// Parse one `Parameter` cell into its ordered parameter descriptors.
///
/// An empty or whitespace-only cell means the command takes no input.
pub fn parse_parameter_cell(cell: &str) -> Result<Vec<ParameterDescriptor>, DescriptorError> {
    if cell.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in cell.split(SPEC_SEPARATOR) {
        let segment = raw.trim();
        if segment.is_empty() {
            return Err(DescriptorError::malformed_spec(
                cell.trim(),
                "empty segment between '|' separators",
            ));
        }
        let param = parse_segment(segment)?;
        if !seen.insert(param.name.clone()) {
            return Err(DescriptorError::DuplicateParameterName { name: param.name });
        }
        out.push(param);
    }
    Ok(out)
}

fn parse_segment(segment: &str) -> Result<ParameterDescriptor, DescriptorError> {
    let Some((name, suffix)) = segment.split_once(KIND_SEPARATOR) else {
        return Ok(ParameterDescriptor::free(segment));
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(DescriptorError::malformed_spec(segment, "missing parameter name"));
    }
    let suffix = suffix.trim();

    if let Some(decimals) = parse_format_token(suffix) {
        let decimals = decimals.map_err(|reason| DescriptorError::malformed_spec(segment, reason))?;
        return Ok(ParameterDescriptor::formatted(name, decimals));
    }

    if suffix.contains(OPTION_SEPARATOR) {
        let options = parse_options(segment, suffix)?;
        return Ok(ParameterDescriptor::enumerated(name, options));
    }

    Err(DescriptorError::malformed_spec(
        segment,
        format!(
            "'{suffix}' is neither a V.<digits>f format token nor a ';'-separated option list"
        ),
    ))
}

/// Recognise a `V.<digits>f` token (case-insensitive).
///
/// Returns `None` when the suffix is not shaped like a format token at all,
/// `Some(Err)` when it is but the precision is unusable.
fn parse_format_token(suffix: &str) -> Option<Result<u32, String>> {
    let body = suffix
        .strip_prefix(['V', 'v'])?
        .strip_prefix('.')?
        .strip_suffix(['f', 'F'])?;
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let parsed = body
        .parse::<u32>()
        .ok()
        .filter(|d| *d <= MAX_DECIMALS)
        .ok_or_else(|| format!("precision {body} exceeds the maximum of {MAX_DECIMALS}"));
    Some(parsed)
}

fn parse_options(segment: &str, suffix: &str) -> Result<Vec<String>, DescriptorError> {
    let mut options: Vec<String> = Vec::new();
    for option in suffix.split(OPTION_SEPARATOR).map(str::trim) {
        if option.is_empty() {
            continue;
        }
        if options.iter().any(|o| o == option) {
            return Err(DescriptorError::malformed_spec(
                segment,
                format!("option '{option}' is listed more than once"),
            ));
        }
        options.push(option.to_string());
    }
    if options.is_empty() {
        return Err(DescriptorError::malformed_spec(segment, "option list is empty"));
    }
    Ok(options)
}
