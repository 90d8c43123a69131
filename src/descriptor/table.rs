use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use super::compiler::{compile_row, CommandDefinition, DescriptorRow};
use super::error::{DescriptorError, LoadWarning};
use crate::workbook::{Sheet, SheetSource};

pub const NAME_COLUMN: &str = "Name";
pub const DIRECTION_COLUMN: &str = "GET/SET";
pub const CMD_COLUMN: &str = "CMD";
pub const PARAMETER_COLUMNS: [&str; 2] = ["Parameter", "Parameters"];

/// The compiled commands of one instrument model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorTable {
    model: String,
    commands: Vec<CommandDefinition>,
    warnings: Vec<LoadWarning>,
}

impl DescriptorTable {
    /// The matched sheet name.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn commands(&self) -> &[CommandDefinition] {
        &self.commands
    }

    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    /// Look a command up by display name, ignoring case.
    pub fn find(&self, name: &str) -> Option<&CommandDefinition> {
        let wanted = name.trim().to_lowercase();
        self.commands
            .iter()
            .find(|c| c.name().to_lowercase() == wanted)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Column positions of the descriptor cells within a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    name: usize,
    direction: usize,
    cmd: usize,
    parameters: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> Result<Self, DescriptorError> {
        let find = |wanted: &str| headers.iter().position(|h| header_matches(h, wanted));
        let require = |wanted: &str| {
            find(wanted).ok_or_else(|| DescriptorError::MissingRequiredColumn {
                column: wanted.to_string(),
            })
        };
        Ok(Self {
            name: require(NAME_COLUMN)?,
            direction: require(DIRECTION_COLUMN)?,
            cmd: require(CMD_COLUMN)?,
            parameters: PARAMETER_COLUMNS.iter().find_map(|c| find(*c)),
        })
    }

    fn row(&self, sheet: &Sheet, index: usize) -> DescriptorRow {
        DescriptorRow {
            name: sheet.cell(index, self.name).to_string(),
            direction: sheet.cell(index, self.direction).to_string(),
            template: sheet.cell(index, self.cmd).to_string(),
            parameters: self
                .parameters
                .map(|col| sheet.cell(index, col).to_string())
                .unwrap_or_default(),
        }
    }
}

fn header_matches(header: &str, wanted: &str) -> bool {
    header.trim().to_lowercase() == wanted.to_lowercase()
}

/// Normalized form used to compare model identifiers with sheet names.
pub fn normalize_model(model: &str) -> String {
    model.trim().to_lowercase()
}

/// One sheet name per distinct model, in workbook order. Later sheets whose
/// names collide after normalization are dropped, since lookups never reach them.
pub fn distinct_models(sheet_names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    sheet_names
        .iter()
        .filter(|name| !normalize_model(name).is_empty() && seen.insert(normalize_model(name)))
        .cloned()
        .collect()
}

/// Find the sheet for `model`. Returns the chosen sheet and any later sheets
/// whose names collide with it after normalization.
pub fn match_sheet(sheet_names: &[String], model: &str) -> Option<(String, Vec<String>)> {
    let wanted = normalize_model(model);
    if wanted.is_empty() {
        return None;
    }
    let mut matches = sheet_names
        .iter()
        .filter(|name| normalize_model(name) == wanted)
        .cloned();
    let chosen = matches.next()?;
    Some((chosen, matches.collect()))
}

/// Load and compile the descriptor table for `model`.
///
/// `Ok(None)` means no sheet matches: the instrument is only usable through
/// ad-hoc commands. `Err` means the sheet exists but cannot be read as a
/// descriptor table at all. Individual bad rows never fail the load; they are
/// dropped and recorded in [`DescriptorTable::warnings`].
pub fn load_table<S: SheetSource + ?Sized>(
    source: &S,
    model: &str,
) -> Result<Option<DescriptorTable>, DescriptorError> {
    let Some((chosen, ignored)) = match_sheet(&source.sheet_names(), model) else {
        debug!("no descriptor sheet for model '{model}'");
        return Ok(None);
    };

    let mut warnings = Vec::new();
    if !ignored.is_empty() {
        let warning = LoadWarning::sheet(
            &chosen,
            DescriptorError::AmbiguousSheetMatch {
                model: model.trim().to_string(),
                chosen: chosen.clone(),
                ignored,
            },
        );
        warn!("{warning}");
        warnings.push(warning);
    }

    let sheet = source.sheet(&chosen)?;
    let table = compile_sheet(&sheet, warnings)?;
    debug!(
        "loaded {} command(s) for model '{}' ({} warning(s))",
        table.commands.len(),
        table.model,
        table.warnings.len()
    );
    Ok(Some(table))
}

/// Compile every row of an already-selected sheet.
pub fn compile_sheet(
    sheet: &Sheet,
    mut warnings: Vec<LoadWarning>,
) -> Result<DescriptorTable, DescriptorError> {
    let columns = ColumnMap::resolve(&sheet.headers)?;

    let mut commands = Vec::with_capacity(sheet.rows.len());
    for index in 0..sheet.rows.len() {
        let row = columns.row(sheet, index);
        if row.is_blank() {
            continue;
        }
        match compile_row(&row) {
            Ok(def) => commands.push(def),
            Err(error) => {
                // Spreadsheet numbering: the header occupies row 1.
                let warning = LoadWarning::row(&sheet.name, index + 2, error);
                warn!("{warning}");
                warnings.push(warning);
            }
        }
    }

    Ok(DescriptorTable {
        model: sheet.name.clone(),
        commands,
        warnings,
    })
}
