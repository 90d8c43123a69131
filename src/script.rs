//! Python/PyVISA automation scripts.
//!
//! [`emit`] turns a command history into a script that replays it;
//! [`parse_script`] reads such a script back into the steps it performs. The
//! two are exact inverses for every string the history can hold.
//!
//! ```text
//! import pyvisa
//!
//! rm = pyvisa.ResourceManager()
//! inst_1 = rm.open_resource("USB0::0xF4EC::0x1430::SPD3XIDD5R1234::INSTR")
//!
//! inst_1.write("CH1:VOLT 5.000")
//! print(inst_1.query("MEAS:VOLT? CH1"))
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::descriptor::Direction;
use crate::history::HistoryEntry;

const HEADER: &str = "# Generated by scpi-console";
const IMPORT: &str = "import pyvisa";
const RESOURCE_MANAGER: &str = "rm = pyvisa.ResourceManager()";
const OPEN_RESOURCE: &str = "rm.open_resource(";

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", content = "detail")]
pub enum ScriptError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: '{handle}' is used before it is opened")]
    UnknownHandle { line: usize, handle: String },
}

/// One replayable instrument operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptStep {
    pub resource: String,
    pub direction: Direction,
    pub text: String,
}

/// Render `entries` as a PyVISA script.
///
/// Each distinct resource is opened once, in order of first appearance.
pub fn emit(entries: &[HistoryEntry]) -> String {
    let mut handles: IndexMap<&str, String> = IndexMap::new();
    for entry in entries {
        let next = handles.len() + 1;
        handles
            .entry(entry.resource.as_str())
            .or_insert_with(|| format!("inst_{next}"));
    }

    let mut out = String::new();
    let _ = writeln!(out, "{HEADER}");
    let _ = writeln!(out, "{IMPORT}");
    let _ = writeln!(out);
    let _ = writeln!(out, "{RESOURCE_MANAGER}");
    for (resource, handle) in &handles {
        let _ = writeln!(out, "{handle} = {OPEN_RESOURCE}{})", quote(resource));
    }
    if !entries.is_empty() {
        let _ = writeln!(out);
    }
    for entry in entries {
        let Some(handle) = handles.get(entry.resource.as_str()) else {
            continue;
        };
        let text = quote(&entry.sent_text);
        let _ = match entry.direction {
            Direction::Get => writeln!(out, "print({handle}.query({text}))"),
            Direction::Set => writeln!(out, "{handle}.write({text})"),
        };
    }
    out
}

/// Quote `s` as a double-quoted Python string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Read a double-quoted literal from the start of `s`.
/// Returns the decoded string and the text after the closing quote.
fn unquote(s: &str) -> Result<(String, &str), String> {
    let body = s
        .strip_prefix('"')
        .ok_or_else(|| "expected a string literal".to_string())?;
    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((out, body.get(i + 1..).unwrap_or_default())),
            '\\' => {
                let (_, escape) = chars
                    .next()
                    .ok_or_else(|| "unterminated escape".to_string())?;
                match escape {
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'x' => {
                        let hex: String = chars.by_ref().take(2).map(|(_, h)| h).collect();
                        let decoded = Some(&hex)
                            .filter(|h| h.len() == 2 && h.chars().all(|d| d.is_ascii_hexdigit()))
                            .and_then(|h| u8::from_str_radix(h, 16).ok())
                            .ok_or_else(|| format!("invalid \\x escape '\\x{hex}'"))?;
                        out.push(char::from(decoded));
                    }
                    other => return Err(format!("unsupported escape '\\{other}'")),
                }
            }
            c => out.push(c),
        }
    }
    Err("unterminated string literal".to_string())
}

/// Parse `HANDLE` + `method(` + literal + `closing`.
fn call<'a>(text: &'a str, method: &str, closing: &str) -> Option<Result<(&'a str, String), String>> {
    let (handle, args) = text.split_once(method)?;
    Some(unquote(args).and_then(|(value, rest)| {
        if rest.trim_end() == closing {
            Ok((handle.trim(), value))
        } else {
            Err(format!("expected '{closing}' after string literal"))
        }
    }))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

enum Statement<'a> {
    Open { handle: &'a str, resource: String },
    Send { handle: &'a str, direction: Direction, text: String },
}

fn parse_line(line: &str) -> Result<Option<Statement<'_>>, String> {
    if line.is_empty() || line.starts_with('#') || line == IMPORT || line == RESOURCE_MANAGER {
        return Ok(None);
    }
    if let Some(inner) = line.strip_prefix("print(") {
        if let Some(parsed) = call(inner, ".query(", "))") {
            let (handle, text) = parsed?;
            return Ok(Some(Statement::Send { handle, direction: Direction::Get, text }));
        }
    }
    if let Some((handle, rhs)) = line.split_once(" = ").filter(|(h, _)| is_identifier(h)) {
        if let Some(args) = rhs.strip_prefix(OPEN_RESOURCE) {
            let (resource, rest) = unquote(args)?;
            if rest.trim_end() != ")" {
                return Err("expected ')' after resource name".to_string());
            }
            return Ok(Some(Statement::Open { handle, resource }));
        }
    }
    if let Some(parsed) = call(line, ".write(", ")") {
        let (handle, text) = parsed?;
        return Ok(Some(Statement::Send { handle, direction: Direction::Set, text }));
    }
    Err(format!("unrecognized statement '{line}'"))
}

/// Reparse a script produced by [`emit`] into its instrument operations.
pub fn parse_script(source: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    let mut handles: HashMap<&str, String> = HashMap::new();
    let mut steps = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let statement = parse_line(raw.trim())
            .map_err(|message| ScriptError::Syntax { line, message })?;
        match statement {
            None => {}
            Some(Statement::Open { handle, resource }) => {
                handles.insert(handle, resource);
            }
            Some(Statement::Send { handle, direction, text }) => {
                let resource = handles.get(handle).ok_or_else(|| ScriptError::UnknownHandle {
                    line,
                    handle: handle.to_string(),
                })?;
                steps.push(ScriptStep {
                    resource: resource.clone(),
                    direction,
                    text,
                });
            }
        }
    }
    Ok(steps)
}
