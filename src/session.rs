//! One operator session: descriptors, instruments, history, and the link.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;

use crate::audit;
use crate::controls::{controls_for, ControlLayout};
use crate::descriptor::{DescriptorCache, DescriptorError, DescriptorTable};
use crate::history::{HistoryEntry, HistoryRecorder};
use crate::instrument::{Identity, Instrument, InstrumentRegistry, Transport, TransportError};
use crate::render::{render, render_adhoc, ExecutionRequest, RenderError, RenderedCommand};
use crate::workbook::SheetSource;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("instrument '{0}' not found")]
    UnknownInstrument(String),
    #[error("no descriptor table for model '{0}'")]
    NoDescriptor(String),
    #[error("command '{command}' not found for model '{model}'")]
    UnknownCommand { model: String, command: String },
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What the UI shows for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct CommandCatalog {
    /// False when no descriptor sheet matches the instrument's model, or the
    /// sheet could not be read; ad-hoc entry still works.
    pub found: bool,
    pub model: String,
    pub commands: Vec<ControlLayout>,
    pub warnings: Vec<String>,
    pub load_error: Option<String>,
}

impl CommandCatalog {
    fn not_found(model: &str, load_error: Option<String>) -> Self {
        Self {
            found: false,
            model: model.to_string(),
            commands: Vec::new(),
            warnings: Vec::new(),
            load_error,
        }
    }

    fn from_table(table: &DescriptorTable) -> Self {
        Self {
            found: true,
            model: table.model().to_string(),
            commands: table.commands().iter().map(controls_for).collect(),
            warnings: table.warnings().iter().map(ToString::to_string).collect(),
            load_error: None,
        }
    }
}

pub struct Session {
    source: Arc<dyn SheetSource>,
    cache: DescriptorCache,
    registry: RwLock<InstrumentRegistry>,
    history: Arc<HistoryRecorder>,
    transport: Box<dyn Transport>,
    audit_dir: Option<PathBuf>,
}

impl Session {
    pub fn new(source: Arc<dyn SheetSource>, transport: Box<dyn Transport>) -> Self {
        Self {
            source,
            cache: DescriptorCache::new(),
            registry: RwLock::new(InstrumentRegistry::new()),
            history: Arc::new(HistoryRecorder::new()),
            transport,
            audit_dir: None,
        }
    }

    /// Log every send to the JSONL command log under `app_config_dir`.
    pub fn with_audit_dir(mut self, app_config_dir: PathBuf) -> Self {
        self.audit_dir = Some(app_config_dir);
        self
    }

    pub fn with_history(mut self, history: Arc<HistoryRecorder>) -> Self {
        self.history = history;
        self
    }

    pub fn history(&self) -> &Arc<HistoryRecorder> {
        &self.history
    }

    // ── Instruments ──────────────────────────────────────────────

    pub fn register(&self, instrument: Instrument) {
        self.registry.write().register(instrument);
    }

    /// Query `resource` for `*IDN?` and register it.
    pub fn identify(&self, resource: &str) -> Result<Instrument, SessionError> {
        Ok(self.registry.write().identify(self.transport.as_ref(), resource)?)
    }

    pub fn set_alias(&self, alias: &str, identity: &Identity) -> Result<(), SessionError> {
        let bound = self.registry.write().set_alias(
            alias,
            &identity.vendor,
            &identity.model,
            &identity.serial,
        );
        if bound {
            Ok(())
        } else {
            Err(SessionError::UnknownInstrument(format!(
                "{} {} {}",
                identity.vendor, identity.model, identity.serial
            )))
        }
    }

    fn instrument(&self, alias: &str) -> Result<Instrument, SessionError> {
        self.registry
            .read()
            .find(alias)
            .cloned()
            .ok_or_else(|| SessionError::UnknownInstrument(alias.trim().to_string()))
    }

    // ── Descriptors ──────────────────────────────────────────────

    /// Drop compiled tables so the next lookup rereads the workbook.
    pub fn reload_descriptors(&self) {
        self.cache.invalidate();
    }

    pub fn table_for_model(&self, model: &str) -> Result<Option<Arc<DescriptorTable>>, DescriptorError> {
        self.cache.get_or_load(self.source.as_ref(), model)
    }

    /// The command catalog for the instrument behind `alias`.
    pub fn commands_for(&self, alias: &str) -> Result<CommandCatalog, SessionError> {
        let instrument = self.instrument(alias)?;
        let model = &instrument.identity.model;
        Ok(match self.table_for_model(model) {
            Ok(Some(table)) => CommandCatalog::from_table(&table),
            Ok(None) => CommandCatalog::not_found(model, None),
            Err(e) => {
                warn!("descriptor table for '{model}' unusable: {e}");
                CommandCatalog::not_found(model, Some(e.to_string()))
            }
        })
    }

    // ── Execution ────────────────────────────────────────────────

    /// Render and send a descriptor command to the instrument behind `alias`.
    pub fn execute(
        &self,
        alias: &str,
        command: &str,
        values: &HashMap<String, String>,
    ) -> Result<HistoryEntry, SessionError> {
        let request = ExecutionRequest {
            command: command.to_string(),
            values: values.clone(),
            value: None,
        };
        self.execute_request(alias, &request)
    }

    pub fn execute_request(
        &self,
        alias: &str,
        request: &ExecutionRequest,
    ) -> Result<HistoryEntry, SessionError> {
        let instrument = self.instrument(alias)?;
        let model = &instrument.identity.model;
        let table = self
            .table_for_model(model)?
            .ok_or_else(|| SessionError::NoDescriptor(model.clone()))?;
        let definition = table
            .find(&request.command)
            .ok_or_else(|| SessionError::UnknownCommand {
                model: table.model().to_string(),
                command: request.command.trim().to_string(),
            })?;
        let rendered = render(definition, &request.resolve_values(definition))?;
        self.send(&instrument, &rendered)
    }

    /// Send operator-typed text as is. A `?` makes it a query.
    pub fn execute_adhoc(&self, alias: &str, text: &str) -> Result<HistoryEntry, SessionError> {
        let instrument = self.instrument(alias)?;
        let rendered = render_adhoc(text)?;
        self.send(&instrument, &rendered)
    }

    fn send(&self, instrument: &Instrument, rendered: &RenderedCommand) -> Result<HistoryEntry, SessionError> {
        let resource = instrument.resource.as_str();
        let result = self
            .transport
            .send(resource, rendered.direction, &rendered.text)
            .map(|r| r.map(|text| text.trim_end_matches(['\r', '\n']).to_string()));

        match result {
            Ok(response) => {
                info!("{} {}: {}", instrument.label(), rendered.direction, rendered.text);
                self.audit(resource, rendered, Ok(response.as_deref()));
                Ok(self.history.record(rendered.direction, resource, &rendered.text, response))
            }
            Err(e) => {
                warn!("{} {}: {} failed: {e}", instrument.label(), rendered.direction, rendered.text);
                let message = e.to_string();
                self.audit(resource, rendered, Err(message.as_str()));
                Err(e.into())
            }
        }
    }

    fn audit(&self, resource: &str, rendered: &RenderedCommand, result: Result<Option<&str>, &str>) {
        if let Some(dir) = &self.audit_dir {
            audit::log_command(dir, resource, rendered.direction, &rendered.text, result);
        }
    }
}
