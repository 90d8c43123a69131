use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::descriptor::{CommandDefinition, Direction, ParameterDescriptor, ParameterKind};

/// One input the operator fills before a command can be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "control", rename_all = "snake_case")]
#[ts(export)]
pub enum Control {
    TextEntry {
        parameter: String,
        /// Placeholder hint shown in the empty field.
        hint: String,
        /// Fixed decimal places the value will be rendered with, if any.
        decimals: Option<u32>,
    },
    Selector {
        parameter: String,
        options: Vec<String>,
        default: Option<String>,
    },
}

impl Control {
    pub fn parameter(&self) -> &str {
        match self {
            Self::TextEntry { parameter, .. } | Self::Selector { parameter, .. } => parameter,
        }
    }
}

/// The controls for one command, in parameter column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ControlLayout {
    pub command: String,
    pub direction: Direction,
    pub template: String,
    /// No inputs: invoking the command sends it straight away.
    pub fires_immediately: bool,
    pub controls: Vec<Control>,
}

pub fn controls_for(command: &CommandDefinition) -> ControlLayout {
    controls_with_defaults(command, &HashMap::new())
}

/// Like [`controls_for`], preselecting `defaults` on selectors. A default that
/// is not one of the selector's options is ignored.
pub fn controls_with_defaults(
    command: &CommandDefinition,
    defaults: &HashMap<String, String>,
) -> ControlLayout {
    let controls: Vec<Control> = command
        .parameters()
        .iter()
        .map(|p| control_for(p, defaults.get(&p.name)))
        .collect();
    ControlLayout {
        command: command.name().to_string(),
        direction: command.direction(),
        template: command.template().as_str().to_string(),
        fires_immediately: controls.is_empty(),
        controls,
    }
}

fn control_for(param: &ParameterDescriptor, default: Option<&String>) -> Control {
    match &param.kind {
        ParameterKind::Enumerated { options } => Control::Selector {
            parameter: param.name.clone(),
            options: options.clone(),
            default: default.filter(|d| options.contains(d)).cloned(),
        },
        ParameterKind::Free => Control::TextEntry {
            parameter: param.name.clone(),
            hint: param.name.clone(),
            decimals: None,
        },
        ParameterKind::FormattedFree { decimals } => Control::TextEntry {
            parameter: param.name.clone(),
            hint: param.name.clone(),
            decimals: Some(*decimals),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::descriptor::{compile_row, DescriptorRow};

    fn def(dir: &str, cmd: &str, params: &str) -> CommandDefinition {
        compile_row(&DescriptorRow::new("Cmd", dir, cmd, params)).unwrap()
    }

    #[test]
    fn query_without_parameters_fires_immediately() {
        let layout = controls_for(&def("GET", "MEAS:VOLT?", ""));
        assert!(layout.fires_immediately);
        assert!(layout.controls.is_empty());
        assert_eq!(layout.direction, Direction::Get);
        assert_eq!(layout.template, "MEAS:VOLT?");
    }

    #[test]
    fn controls_follow_parameter_order() {
        let layout = controls_for(&def(
            "SET",
            "{CH}:BSWV FRQ,{FREQ},AMP,{AMP}",
            "CH:C1;C2 | FREQ | AMP:V.2f",
        ));
        assert!(!layout.fires_immediately);
        let names: Vec<_> = layout.controls.iter().map(Control::parameter).collect();
        assert_eq!(names, ["CH", "FREQ", "AMP"]);
        assert_eq!(
            layout.controls[0],
            Control::Selector {
                parameter: "CH".into(),
                options: vec!["C1".into(), "C2".into()],
                default: None,
            }
        );
        assert_eq!(
            layout.controls[1],
            Control::TextEntry { parameter: "FREQ".into(), hint: "FREQ".into(), decimals: None }
        );
        assert_eq!(
            layout.controls[2],
            Control::TextEntry { parameter: "AMP".into(), hint: "AMP".into(), decimals: Some(2) }
        );
    }

    #[test]
    fn defaults_must_be_valid_options() {
        let d = def("SET", "OUTP {S}", "S:ON;OFF");
        let pick = |value: &str| {
            let defaults = HashMap::from([("S".to_string(), value.to_string())]);
            match &controls_with_defaults(&d, &defaults).controls[0] {
                Control::Selector { default, .. } => default.clone(),
                Control::TextEntry { .. } => None,
            }
        };
        assert_eq!(pick("OFF").as_deref(), Some("OFF"));
        assert_eq!(pick("off"), None);
    }

    #[test]
    fn deterministic() {
        let d = def("SET", "RANGE {R}", "R:AUTO;500E-3;5");
        assert_eq!(controls_for(&d), controls_for(&d));
    }

    #[test]
    fn serializes_with_control_tag() {
        let layout = controls_for(&def("SET", "OUTP {S}", "S:ON;OFF"));
        let json = serde_json::to_value(&layout).unwrap();
        assert_eq!(json["controls"][0]["control"], "selector");
        assert_eq!(json["direction"], "SET");
    }
}
