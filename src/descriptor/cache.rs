use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::error::DescriptorError;
use super::table::{load_table, normalize_model, DescriptorTable};
use crate::workbook::SheetSource;

/// Cache of compiled descriptor tables, keyed by normalized model name.
///
/// Compilation happens outside the lock. When two callers race on the same
/// model the first table inserted wins and both get that same `Arc`.
#[derive(Default)]
pub struct DescriptorCache {
    tables: Mutex<HashMap<String, Arc<DescriptorTable>>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load<S: SheetSource + ?Sized>(
        &self,
        source: &S,
        model: &str,
    ) -> Result<Option<Arc<DescriptorTable>>, DescriptorError> {
        let key = normalize_model(model);
        if let Some(table) = self.tables.lock().get(&key) {
            debug!("descriptor cache hit for '{key}'");
            return Ok(Some(Arc::clone(table)));
        }

        let Some(table) = load_table(source, model)? else {
            return Ok(None);
        };
        let mut tables = self.tables.lock();
        let shared = tables.entry(key).or_insert_with(|| Arc::new(table));
        Ok(Some(Arc::clone(shared)))
    }

    /// Drop every cached table so the next lookup recompiles from the source.
    pub fn invalidate(&self) {
        self.tables.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.lock().is_empty()
    }
}
