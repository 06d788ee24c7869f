//! Open document table for the server

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tower_lsp::lsp_types::Url;
use tracing::debug;

/// A document the client has opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub uri: Url,
    pub language_id: String,
    /// Increases with every accepted change
    pub version: i32,
    pub text: String,
}

impl Document {
    pub fn new(uri: Url, language_id: String, version: i32, text: String) -> Self {
        Self {
            uri,
            language_id,
            version,
            text,
        }
    }
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: RwLock<HashMap<Url, Document>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a newly opened document, replacing any previous copy.
    pub fn open(&self, document: Document) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document.uri.clone(), document);
    }

    /// Applies a full-text change. Returns false if the document is not open
    /// or `version` is not newer than the stored one.
    pub fn change(&self, uri: &Url, version: i32, text: String) -> bool {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(document) = documents.get_mut(uri) else {
            debug!("Ignoring change for unopened document {}", uri);
            return false;
        };

        if version <= document.version {
            debug!(
                "Ignoring stale change for {} (version {} <= {})",
                uri, version, document.version
            );
            return false;
        }

        document.version = version;
        document.text = text;
        true
    }

    pub fn get(&self, uri: &Url) -> Option<Document> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }

    pub fn close(&self, uri: &Url) -> Option<Document> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri)
    }
}
