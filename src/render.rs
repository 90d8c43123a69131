//! Turning a compiled command plus user input into the literal SCPI string.
//!
//! Everything here is pure: no transport, no history. The caller sends the
//! [`RenderedCommand`] and records the outcome.
//!
//! `FormattedFree` values are parsed as `f64` and printed with the standard
//! fixed-precision formatter, which rounds the exact binary value correctly
//! and breaks exact ties to even (`0.125` at two decimals gives `0.12`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::descriptor::{CommandDefinition, Direction, ParameterDescriptor, ParameterKind};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", content = "detail")]
pub enum RenderError {
    #[error("missing value for parameter '{name}'")]
    MissingParameterValue { name: String },

    #[error("'{value}' is not a valid choice for '{name}' (expected one of {options:?})")]
    InvalidEnumValue {
        name: String,
        value: String,
        options: Vec<String>,
    },

    #[error("'{value}' is not a finite number (parameter '{name}')")]
    NumericParseError { name: String, value: String },

    #[error("command text is empty")]
    EmptyCommand,
}

impl RenderError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParameterValue { .. } => "MissingParameterValue",
            Self::InvalidEnumValue { .. } => "InvalidEnumValue",
            Self::NumericParseError { .. } => "NumericParseError",
            Self::EmptyCommand => "EmptyCommand",
        }
    }
}

/// The literal string to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RenderedCommand {
    pub text: String,
    pub direction: Direction,
    /// The template the text was rendered from; equal to `text` for ad-hoc commands.
    pub template: String,
}

/// A user invocation as it arrives from the UI.
///
/// `value` is a shorthand for commands with exactly one parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExecutionRequest {
    pub command: String,
    #[serde(default)]
    pub values: HashMap<String, String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl ExecutionRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn single(command: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            values: HashMap::new(),
            value: Some(value.into()),
        }
    }

    /// The values map for `command`, binding the single-value shorthand when
    /// no explicit values were given and the command has exactly one parameter.
    pub fn resolve_values(&self, command: &CommandDefinition) -> HashMap<String, String> {
        if self.values.is_empty() {
            if let (Some(value), [only]) = (&self.value, command.parameters()) {
                let value = value.trim();
                if !value.is_empty() {
                    return HashMap::from([(only.name.clone(), value.to_string())]);
                }
            }
        }
        self.values.clone()
    }
}

/// Validate `values` against `command` and substitute them into its template.
pub fn render(
    command: &CommandDefinition,
    values: &HashMap<String, String>,
) -> Result<RenderedCommand, RenderError> {
    let template = command.template();
    let mut formatted: HashMap<&str, String> = HashMap::with_capacity(command.parameters().len());
    for param in command.parameters() {
        let raw = values.get(&param.name).map(String::as_str);
        formatted.insert(param.name.as_str(), format_value(param, raw)?);
    }

    // Compilation guarantees every placeholder has a parameter.
    let text = template
        .substitute(|name| formatted.get(name).map(String::as_str))
        .map_err(|name| RenderError::MissingParameterValue {
            name: name.to_string(),
        })?;

    Ok(RenderedCommand {
        text,
        direction: command.direction(),
        template: template.as_str().to_string(),
    })
}

/// Validate and format one raw value according to its parameter kind.
pub fn format_value(param: &ParameterDescriptor, raw: Option<&str>) -> Result<String, RenderError> {
    let missing = || RenderError::MissingParameterValue {
        name: param.name.clone(),
    };

    match &param.kind {
        ParameterKind::Enumerated { options } => {
            let value = raw.ok_or_else(missing)?;
            if options.iter().any(|o| o == value) {
                Ok(value.to_string())
            } else {
                Err(RenderError::InvalidEnumValue {
                    name: param.name.clone(),
                    value: value.to_string(),
                    options: options.clone(),
                })
            }
        }
        ParameterKind::Free => {
            let value = raw.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(missing)?;
            Ok(value.to_string())
        }
        ParameterKind::FormattedFree { decimals } => {
            let value = raw.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(missing)?;
            format_fixed(value, *decimals).ok_or_else(|| RenderError::NumericParseError {
                name: param.name.clone(),
                value: value.to_string(),
            })
        }
    }
}

/// Fixed-point rendering with exactly `decimals` fractional digits.
/// `None` when `value` is not a finite number.
pub fn format_fixed(value: &str, decimals: u32) -> Option<String> {
    let number = value.parse::<f64>().ok().filter(|n| n.is_finite())?;
    let precision = usize::try_from(decimals).ok()?;
    Some(format!("{number:.precision$}"))
}

/// Render text typed directly by the operator, bypassing the descriptor table.
///
/// A `?` anywhere in the text marks it as a query.
pub fn render_adhoc(text: &str) -> Result<RenderedCommand, RenderError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(RenderError::EmptyCommand);
    }
    let direction = if text.contains('?') {
        Direction::Get
    } else {
        Direction::Set
    };
    Ok(RenderedCommand {
        text: text.to_string(),
        direction,
        template: text.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::descriptor::{compile_row, DescriptorRow};

    fn def(cmd: &str, params: &str) -> CommandDefinition {
        compile_row(&DescriptorRow::new("Test", "SET", cmd, params)).unwrap()
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn render_one(cmd: &str, params: &str, pairs: &[(&str, &str)]) -> Result<String, RenderError> {
        render(&def(cmd, params), &values(pairs)).map(|r| r.text)
    }

    #[test]
    fn no_parameters_returns_template() {
        let d = compile_row(&DescriptorRow::new("V", "GET", "MEAS:VOLT?", "")).unwrap();
        let r = render(&d, &HashMap::new()).unwrap();
        assert_eq!(r.text, "MEAS:VOLT?");
        assert_eq!(r.direction, Direction::Get);
        assert_eq!(r.template, "MEAS:VOLT?");
    }

    #[test]
    fn extra_values_are_ignored() {
        let r = render_one("*RST", "", &[("X", "1")]).unwrap();
        assert_eq!(r, "*RST");
    }

    #[test]
    fn formatted_decimals() {
        assert_eq!(render_one("VOLT {V}", "V:V.3f", &[("V", "1.23456")]).unwrap(), "VOLT 1.235");
        assert_eq!(render_one("VOLT {V}", "V:V.3f", &[("V", "1.2")]).unwrap(), "VOLT 1.200");
        assert_eq!(render_one("VOLT {V}", "V:V.3f", &[("V", " 12 ")]).unwrap(), "VOLT 12.000");
        assert_eq!(render_one("VOLT {V}", "V:V.0f", &[("V", "2.7")]).unwrap(), "VOLT 3");
        assert_eq!(render_one("VOLT {V}", "V:V.2f", &[("V", "1e-3")]).unwrap(), "VOLT 0.00");
    }

    #[test]
    fn formatted_ties_round_to_even() {
        assert_eq!(format_fixed("0.125", 2).unwrap(), "0.12");
        assert_eq!(format_fixed("0.375", 2).unwrap(), "0.38");
        assert_eq!(format_fixed("2.5", 0).unwrap(), "2");
        assert_eq!(format_fixed("3.5", 0).unwrap(), "4");
    }

    #[test]
    fn formatted_rejects_non_numbers() {
        for bad in ["abc", "1,5", "inf", "NaN", "1.2.3"] {
            let err = render_one("VOLT {V}", "V:V.3f", &[("V", bad)]).unwrap_err();
            assert_eq!(
                err,
                RenderError::NumericParseError { name: "V".into(), value: bad.into() },
                "{bad}"
            );
        }
    }

    #[test]
    fn missing_values() {
        let err = render_one("VOLT {V}", "V:V.3f", &[]).unwrap_err();
        assert_eq!(err, RenderError::MissingParameterValue { name: "V".into() });
        let err = render_one("VOLT {V}", "V:V.3f", &[("V", "   ")]).unwrap_err();
        assert_eq!(err, RenderError::MissingParameterValue { name: "V".into() });
        let err = render_one("FREQ {F}", "F", &[("F", "   ")]).unwrap_err();
        assert_eq!(err.code(), "MissingParameterValue");
        let err = render_one("OUTP {S}", "S:ON;OFF", &[]).unwrap_err();
        assert_eq!(err.code(), "MissingParameterValue");
    }

    #[test]
    fn enumerated_values() {
        let cell = "R:AUTO;500E-3;5";
        assert_eq!(render_one("RANGE {R}", cell, &[("R", "5")]).unwrap(), "RANGE 5");
        let err = render_one("RANGE {R}", cell, &[("R", "6")]).unwrap_err();
        assert_eq!(
            err,
            RenderError::InvalidEnumValue {
                name: "R".into(),
                value: "6".into(),
                options: vec!["AUTO".into(), "500E-3".into(), "5".into()],
            }
        );
        let err = render_one("RANGE {R}", cell, &[("R", "auto")]).unwrap_err();
        assert_eq!(err.code(), "InvalidEnumValue");
    }

    #[test]
    fn free_values_are_trimmed() {
        assert_eq!(render_one("FREQ {F}", "F", &[("F", "  1 kHz ")]).unwrap(), "FREQ 1 kHz");
    }

    #[test]
    fn multi_parameter_row() {
        let out = render_one(
            "{CH}:BSWV FRQ,{FREQ}",
            "CH:C1;C2 | FREQ",
            &[("CH", "C1"), ("FREQ", "1000")],
        )
        .unwrap();
        assert_eq!(out, "C1:BSWV FRQ,1000");
    }

    #[test]
    fn repeated_placeholder_gets_same_value() {
        let out = render_one("SOUR{N}:FREQ 1;SOUR{N}:OUTP ON", "N:1;2", &[("N", "2")]).unwrap();
        assert_eq!(out, "SOUR2:FREQ 1;SOUR2:OUTP ON");
    }

    #[test]
    fn values_containing_braces_are_not_rescanned() {
        let out = render_one("A {X} B {Y}", "X | Y", &[("X", "{Y}"), ("Y", "2")]).unwrap();
        assert_eq!(out, "A {Y} B 2");
    }

    #[test]
    fn result_does_not_depend_on_map_order() {
        let d = def("{A}{B}{C}{A}", "A | B | C");
        let forward = values(&[("A", "1"), ("B", "2"), ("C", "3")]);
        let mut reversed = HashMap::new();
        for (k, v) in forward.iter().collect::<Vec<_>>().into_iter().rev() {
            reversed.insert(k.clone(), v.clone());
        }
        assert_eq!(render(&d, &forward).unwrap(), render(&d, &reversed).unwrap());
        assert_eq!(render(&d, &forward).unwrap().text, "1231");
    }

    #[test]
    fn single_value_shorthand() {
        let d = def("VOLT {V}", "V:V.1f");
        let req = ExecutionRequest::single("Test", " 5 ");
        let out = render(&d, &req.resolve_values(&d)).unwrap();
        assert_eq!(out.text, "VOLT 5.0");

        // Explicit values win over the shorthand.
        let req = ExecutionRequest { value: Some("9".into()), ..ExecutionRequest::new("Test").with("V", "1") };
        assert_eq!(render(&d, &req.resolve_values(&d)).unwrap().text, "VOLT 1.0");

        // Shorthand is ignored when the command takes several parameters.
        let d2 = def("{A},{B}", "A | B");
        assert!(ExecutionRequest::single("Test", "1").resolve_values(&d2).is_empty());
    }

    #[test]
    fn request_deserializes_from_ui_json() {
        let req: ExecutionRequest =
            serde_json::from_str(r#"{"command":"Output","values":{"S":"ON"}}"#).unwrap();
        assert_eq!(req.values["S"], "ON");
        assert_eq!(req.value, None);
    }

    #[test]
    fn adhoc_direction() {
        let r = render_adhoc("  *IDN? ").unwrap();
        assert_eq!(r.text, "*IDN?");
        assert_eq!(r.direction, Direction::Get);
        assert_eq!(render_adhoc("OUTP ON").unwrap().direction, Direction::Set);
        assert_eq!(render_adhoc("  ").unwrap_err(), RenderError::EmptyCommand);
    }
}
