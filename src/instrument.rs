//! Instruments on the bench: identity, aliases, and the transport seam.
//!
//! The physical link (VISA, raw sockets, serial) lives behind [`Transport`].
//! [`LoopbackTransport`] is the in-memory implementation used for dry runs.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use ts_rs::TS;

use crate::descriptor::Direction;

pub const IDN_QUERY: &str = "*IDN?";

/// Replies this short cannot carry a vendor and a model.
const MIN_IDN_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", content = "detail")]
pub enum TransportError {
    #[error("cannot open '{resource}'")]
    Unreachable { resource: String },
    #[error("no response from '{resource}' to '{command}'")]
    NoResponse { resource: String, command: String },
    #[error("I/O error on '{resource}': {message}")]
    Io { resource: String, message: String },
    #[error("'{resource}' returned an unrecognized identity: '{response}'")]
    InvalidIdentity { resource: String, response: String },
}

/// How the resource is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum DeviceKind {
    Visa,
    /// Serial port at 115200 8N1, LF write termination.
    #[serde(rename = "SERIAL_115200_LF")]
    Serial115200Lf,
}

impl DeviceKind {
    pub fn from_resource(resource: &str) -> Self {
        if resource.trim().to_ascii_uppercase().starts_with("ASRL") {
            Self::Serial115200Lf
        } else {
            Self::Visa
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Identity {
    pub vendor: String,
    pub model: String,
    pub serial: String,
}

impl Identity {
    pub fn new(vendor: impl Into<String>, model: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            model: model.into(),
            serial: serial.into(),
        }
    }

    /// Split a `*IDN?` reply into vendor, model and serial.
    ///
    /// Comma-delimited when the reply has at least three commas, otherwise
    /// whitespace-delimited. Everything after the model is the serial.
    pub fn parse_idn(response: &str) -> Option<Self> {
        let response = response.trim();
        if response.chars().count() < MIN_IDN_LEN {
            return None;
        }
        let parts: Vec<&str> = if response.matches(',').count() >= 3 {
            response
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect()
        } else {
            response.split_whitespace().collect()
        };
        match parts.as_slice() {
            [vendor, model, rest @ ..] => Some(Self::new(*vendor, *model, rest.join(" "))),
            _ => None,
        }
    }

    fn matches(&self, vendor: &str, model: &str, serial: &str) -> bool {
        same_name(&self.vendor, vendor) && same_name(&self.model, model) && same_name(&self.serial, serial)
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Instrument {
    pub resource: String,
    pub kind: DeviceKind,
    pub identity: Identity,
    pub alias: Option<String>,
}

impl Instrument {
    pub fn new(resource: impl Into<String>, identity: Identity) -> Self {
        let resource = resource.into();
        Self {
            kind: DeviceKind::from_resource(&resource),
            resource,
            identity,
            alias: None,
        }
    }

    /// Alias if one is set, else the resource name.
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.resource)
    }
}

/// The instruments known to a session.
#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    instruments: Vec<Instrument>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the instrument at `instrument.resource`. An alias
    /// already bound to the resource is kept.
    pub fn register(&mut self, mut instrument: Instrument) {
        match self.instruments.iter_mut().find(|i| i.resource == instrument.resource) {
            Some(existing) => {
                if instrument.alias.is_none() {
                    instrument.alias = existing.alias.take();
                }
                *existing = instrument;
            }
            None => self.instruments.push(instrument),
        }
    }

    /// Ask `resource` for its identity and register it.
    pub fn identify(
        &mut self,
        transport: &dyn Transport,
        resource: &str,
    ) -> Result<Instrument, TransportError> {
        let response = transport.query(resource, IDN_QUERY)?;
        let identity = Identity::parse_idn(&response).ok_or_else(|| TransportError::InvalidIdentity {
            resource: resource.to_string(),
            response: response.trim().to_string(),
        })?;
        debug!("{resource}: {} {} ({})", identity.vendor, identity.model, identity.serial);
        let instrument = Instrument::new(resource, identity);
        self.register(instrument.clone());
        Ok(instrument)
    }

    /// Bind `alias` to the instrument with this identity (compared ignoring
    /// case). Any other instrument holding the same alias loses it. Returns
    /// false when no instrument matches, leaving every binding untouched.
    pub fn set_alias(&mut self, alias: &str, vendor: &str, model: &str, serial: &str) -> bool {
        let alias = alias.trim();
        let Some(target) = self
            .instruments
            .iter()
            .position(|i| i.identity.matches(vendor, model, serial))
        else {
            return false;
        };
        for (index, instrument) in self.instruments.iter_mut().enumerate() {
            if index == target {
                instrument.alias = (!alias.is_empty()).then(|| alias.to_string());
            } else if instrument.alias.as_deref().is_some_and(|a| same_name(a, alias)) {
                instrument.alias = None;
            }
        }
        true
    }

    /// Look up by alias (ignoring case) or exact resource name.
    pub fn find(&self, alias_or_resource: &str) -> Option<&Instrument> {
        let wanted = alias_or_resource.trim();
        self.instruments
            .iter()
            .find(|i| i.alias.as_deref().is_some_and(|a| same_name(a, wanted)))
            .or_else(|| self.instruments.iter().find(|i| i.resource == wanted))
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }
}

/// The link to the instruments.
pub trait Transport: Send + Sync {
    fn write(&self, resource: &str, text: &str) -> Result<(), TransportError>;

    fn query(&self, resource: &str, text: &str) -> Result<String, TransportError>;

    fn send(&self, resource: &str, direction: Direction, text: &str) -> Result<Option<String>, TransportError> {
        if direction.is_query() {
            self.query(resource, text).map(Some)
        } else {
            self.write(resource, text).map(|()| None)
        }
    }
}

/// A command seen by [`LoopbackTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub resource: String,
    pub direction: Direction,
    pub text: String,
}

/// In-memory transport: records every send and answers queries from a
/// scripted response table.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    responses: Mutex<HashMap<String, String>>,
    default_response: Option<String>,
    refused: Mutex<HashSet<String>>,
    sent: Mutex<Vec<SentCommand>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer for queries that have no scripted response.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = Some(response.into());
        self
    }

    pub fn respond(&self, command: impl Into<String>, response: impl Into<String>) {
        self.responses.lock().insert(command.into(), response.into());
    }

    /// Make every send to `resource` fail.
    pub fn refuse(&self, resource: impl Into<String>) {
        self.refused.lock().insert(resource.into());
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.sent.lock().clone()
    }

    fn accept(&self, resource: &str, direction: Direction, text: &str) -> Result<(), TransportError> {
        if self.refused.lock().contains(resource) {
            return Err(TransportError::Unreachable {
                resource: resource.to_string(),
            });
        }
        self.sent.lock().push(SentCommand {
            resource: resource.to_string(),
            direction,
            text: text.to_string(),
        });
        Ok(())
    }
}

impl Transport for LoopbackTransport {
    fn write(&self, resource: &str, text: &str) -> Result<(), TransportError> {
        self.accept(resource, Direction::Set, text)
    }

    fn query(&self, resource: &str, text: &str) -> Result<String, TransportError> {
        self.accept(resource, Direction::Get, text)?;
        self.responses
            .lock()
            .get(text)
            .cloned()
            .or_else(|| self.default_response.clone())
            .ok_or_else(|| TransportError::NoResponse {
                resource: resource.to_string(),
                command: text.to_string(),
            })
    }
}
