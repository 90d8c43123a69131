use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::error::DescriptorError;
use super::params::{parse_parameter_cell, ParameterDescriptor};
use super::template::Template;

/// Whether a command reads from (query) or writes to the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Direction {
    Get,
    Set,
}

impl Direction {
    /// Normalize a `GET/SET` cell, ignoring case and surrounding whitespace.
    pub fn parse(token: &str) -> Result<Self, DescriptorError> {
        let t = token.trim();
        if t.eq_ignore_ascii_case("GET") {
            Ok(Self::Get)
        } else if t.eq_ignore_ascii_case("SET") {
            Ok(Self::Set)
        } else {
            Err(DescriptorError::InvalidDirection {
                token: t.to_string(),
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Set => "SET",
        }
    }

    pub fn is_query(self) -> bool {
        self == Self::Get
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four descriptor cells of one sheet row, as raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorRow {
    pub name: String,
    pub direction: String,
    pub template: String,
    pub parameters: String,
}

impl DescriptorRow {
    pub fn new(
        name: impl Into<String>,
        direction: impl Into<String>,
        template: impl Into<String>,
        parameters: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            direction: direction.into(),
            template: template.into(),
            parameters: parameters.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        [&self.name, &self.direction, &self.template, &self.parameters]
            .iter()
            .all(|cell| cell.trim().is_empty())
    }
}

/// A compiled, validated command. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDefinition {
    name: String,
    direction: Direction,
    template: Template,
    parameters: Vec<ParameterDescriptor>,
}

impl CommandDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Compile one descriptor row into a [`CommandDefinition`].
pub fn compile_row(row: &DescriptorRow) -> Result<CommandDefinition, DescriptorError> {
    let name = required(&row.name, super::table::NAME_COLUMN)?;
    let source = required(&row.template, super::table::CMD_COLUMN)?;
    let direction = Direction::parse(&row.direction)?;
    let template = Template::parse(source)?;
    let parameters = parse_parameter_cell(&row.parameters)?;

    check_bindings(&template, &parameters)?;

    Ok(CommandDefinition {
        name: name.to_string(),
        direction,
        template,
        parameters,
    })
}

fn required<'a>(cell: &'a str, column: &str) -> Result<&'a str, DescriptorError> {
    let value = cell.trim();
    if value.is_empty() {
        return Err(DescriptorError::MissingRequiredColumn {
            column: column.to_string(),
        });
    }
    Ok(value)
}

/// The placeholder set and the parameter name set must be identical.
fn check_bindings(
    template: &Template,
    parameters: &[ParameterDescriptor],
) -> Result<(), DescriptorError> {
    let placeholders = template.placeholder_names();
    let declared: BTreeSet<&str> = parameters.iter().map(|p| p.name.as_str()).collect();
    if placeholders == declared {
        return Ok(());
    }
    Err(DescriptorError::PlaceholderParameterMismatch {
        placeholders: placeholders.into_iter().map(String::from).collect(),
        parameters: declared.into_iter().map(String::from).collect(),
    })
}
