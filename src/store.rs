//! Per-document diagnostic snapshots
//!
//! Each URI maps to the most recently published diagnostic set. A publish
//! replaces the previous set wholesale; readers always observe one complete
//! snapshot.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tower_lsp::lsp_types::{Diagnostic, Url};

#[derive(Debug, Default)]
pub struct DiagnosticStore {
    entries: RwLock<HashMap<Url, Arc<[Diagnostic]>>>,
}

impl DiagnosticStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the diagnostics stored for `uri`.
    pub fn update(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        let snapshot: Arc<[Diagnostic]> = diagnostics.into();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri, snapshot);
    }

    /// Returns the latest diagnostics for `uri`, or an empty list if none were published.
    pub fn get(&self, uri: &Url) -> Vec<Diagnostic> {
        self.snapshot(uri)
            .map(|snapshot| snapshot.to_vec())
            .unwrap_or_default()
    }

    /// Returns the shared snapshot without copying the diagnostics.
    pub fn snapshot(&self, uri: &Url) -> Option<Arc<[Diagnostic]>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }

    /// Drops the entry for `uri`, returning what was stored.
    pub fn remove(&self, uri: &Url) -> Option<Vec<Diagnostic>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri)
            .map(|snapshot| snapshot.to_vec())
    }

}
