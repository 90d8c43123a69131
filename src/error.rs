use std::fmt;

use serde::Serialize;
use ts_rs::TS;

use crate::descriptor::DescriptorError;
use crate::files::FileError;
use crate::instrument::TransportError;
use crate::render::RenderError;
use crate::script::ScriptError;
use crate::session::SessionError;
use crate::workbook::WorkbookError;

/// Structured error type for the UI boundary. The frontend matches on `code`
/// and shows `detail.message` verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(tag = "code", content = "detail")]
#[ts(export)]
pub enum AppError {
    NotFound { what: String },
    /// A descriptor sheet or row could not be compiled. `kind` names the
    /// descriptor error variant.
    DescriptorError { kind: String, message: String },
    /// User input rejected before anything was sent.
    RenderError { kind: String, message: String },
    TransportError { message: String },
    ScriptError { message: String },
    WorkbookError { message: String },
    IoError { message: String },
    ValidationError { message: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound { what } => write!(f, "{what} not found"),
            AppError::DescriptorError { message, .. } => write!(f, "Descriptor error: {message}"),
            AppError::RenderError { message, .. } => write!(f, "{message}"),
            AppError::TransportError { message } => write!(f, "Transport error: {message}"),
            AppError::ScriptError { message } => write!(f, "Script error: {message}"),
            AppError::WorkbookError { message } => write!(f, "Workbook error: {message}"),
            AppError::IoError { message } => write!(f, "I/O error: {message}"),
            AppError::ValidationError { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<DescriptorError> for AppError {
    fn from(e: DescriptorError) -> Self {
        AppError::DescriptorError {
            kind: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<RenderError> for AppError {
    fn from(e: RenderError) -> Self {
        AppError::RenderError {
            kind: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        AppError::TransportError {
            message: e.to_string(),
        }
    }
}

impl From<ScriptError> for AppError {
    fn from(e: ScriptError) -> Self {
        AppError::ScriptError {
            message: e.to_string(),
        }
    }
}

impl From<FileError> for AppError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::Io(io_err) => AppError::IoError {
                message: io_err.to_string(),
            },
            FileError::Json(json_err) => AppError::ValidationError {
                message: json_err.to_string(),
            },
        }
    }
}

impl From<WorkbookError> for AppError {
    fn from(e: WorkbookError) -> Self {
        match e {
            WorkbookError::SheetNotFound(name) => AppError::NotFound {
                what: format!("Sheet '{name}'"),
            },
            other => AppError::WorkbookError {
                message: other.to_string(),
            },
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::UnknownInstrument(name) => AppError::NotFound {
                what: format!("Instrument '{name}'"),
            },
            SessionError::NoDescriptor(model) => AppError::NotFound {
                what: format!("Descriptor table for '{model}'"),
            },
            SessionError::UnknownCommand { model, command } => AppError::NotFound {
                what: format!("Command '{command}' for '{model}'"),
            },
            SessionError::Descriptor(e) => e.into(),
            SessionError::Render(e) => e.into(),
            SessionError::Transport(e) => e.into(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::IoError {
            message: e.to_string(),
        }
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::ValidationError { message: s }
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::ValidationError {
            message: s.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn render_error_keeps_message_verbatim() {
        let source = RenderError::MissingParameterValue { name: "V".into() };
        let expected = source.to_string();
        let err = AppError::from(source);
        assert_eq!(err.to_string(), expected);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "RenderError");
        assert_eq!(json["detail"]["kind"], "MissingParameterValue");
        assert_eq!(json["detail"]["message"], expected);
    }

    #[test]
    fn session_lookup_errors_become_not_found() {
        let err = AppError::from(SessionError::UnknownInstrument("psu".into()));
        assert_eq!(err.to_string(), "Instrument 'psu' not found");
    }

    #[test]
    fn descriptor_error_code() {
        let err = AppError::from(DescriptorError::InvalidDirection { token: "PUT".into() });
        match err {
            AppError::DescriptorError { kind, .. } => assert_eq!(kind, "InvalidDirection"),
            other => unreachable!("unexpected {other:?}"),
        }
    }
}
