use std::sync::{Arc, PoisonError, RwLock};

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, error, info, warn};

use crate::config::{LINTER_NAME, Settings};
use crate::linter::{Linter, PycodestyleLinter};
use crate::lsp::code_action::CodeActionSynthesizer;
use crate::lsp::documents::{Document, DocumentStore};
use crate::lsp::rules::RuleTable;
use crate::store::DiagnosticStore;

pub struct Backend {
    client: Client,
    linter: Arc<dyn Linter>,
    settings: RwLock<Settings>,
    documents: DocumentStore,
    diagnostics: DiagnosticStore,
    synthesizer: CodeActionSynthesizer,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self::build(
            client,
            Arc::new(PycodestyleLinter::new()),
            Arc::new(RuleTable::pycodestyle()),
            Settings::default(),
        )
    }

    pub fn build(
        client: Client,
        linter: Arc<dyn Linter>,
        rules: Arc<RuleTable>,
        settings: Settings,
    ) -> Self {
        Self {
            client,
            linter,
            settings: RwLock::new(settings),
            documents: DocumentStore::new(),
            diagnostics: DiagnosticStore::new(),
            synthesizer: CodeActionSynthesizer::new(rules, LINTER_NAME),
        }
    }

    pub fn server_capabilities() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Options(
                TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::FULL),
                    save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                    ..Default::default()
                },
            )),
            code_action_provider: Some(CodeActionProviderCapability::Options(
                CodeActionOptions {
                    code_action_kinds: Some(vec![CodeActionKind::QUICKFIX]),
                    resolve_provider: Some(false),
                    ..Default::default()
                },
            )),
            ..Default::default()
        }
    }

    /// Diagnostics most recently published for `uri`
    pub fn diagnostics(&self, uri: &Url) -> Vec<Diagnostic> {
        self.diagnostics.get(uri)
    }

    pub fn document(&self, uri: &Url) -> Option<Document> {
        self.documents.get(uri)
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn apply_initialization_options(&self, options: Option<serde_json::Value>) {
        let Some(options) = options.filter(|options| !options.is_null()) else {
            return;
        };

        match serde_json::from_value::<Settings>(options) {
            Ok(settings) => {
                info!("Using settings from initializationOptions: {:?}", settings);
                *self
                    .settings
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = settings;
            }
            Err(e) => warn!("Ignoring invalid initializationOptions: {}", e),
        }
    }

    async fn lint_and_publish(&self, uri: &Url) {
        let Some(document) = self.documents.get(uri) else {
            debug!("Skipping lint for unopened document {}", uri);
            return;
        };
        let settings = self.settings();

        let diagnostics = match self.linter.lint(&document, &settings).await {
            Ok(diagnostics) => diagnostics,
            Err(e) => {
                error!("Failed to lint {}: {}", uri, e);
                self.client
                    .log_message(
                        MessageType::ERROR,
                        format!("{} failed for {}: {}", LINTER_NAME, uri, e),
                    )
                    .await;
                return;
            }
        };

        // A newer change (or a close) landed while the linter was running.
        let current = self.documents.get(uri).map(|current| current.version);
        if current != Some(document.version) {
            debug!(
                "Discarding diagnostics for {} version {}",
                uri, document.version
            );
            return;
        }

        self.client
            .log_message(
                MessageType::LOG,
                format!("Publishing {} diagnostics for {}", diagnostics.len(), uri),
            )
            .await;

        self.diagnostics.update(uri.clone(), diagnostics.clone());
        self.client
            .publish_diagnostics(uri.clone(), diagnostics, Some(document.version))
            .await;
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        self.client
            .log_message(MessageType::INFO, "LSP server initializing")
            .await;
        self.apply_initialization_options(params.initialization_options);

        Ok(InitializeResult {
            capabilities: Self::server_capabilities(),
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "LSP server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.client
            .log_message(MessageType::INFO, "LSP server shutting down")
            .await;
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let item = params.text_document;
        let uri = item.uri.clone();

        self.client
            .log_message(MessageType::LOG, format!("Document opened: {}", uri))
            .await;

        self.documents.open(Document::new(
            item.uri,
            item.language_id,
            item.version,
            item.text,
        ));
        self.lint_and_publish(&uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        // Full sync: the last change carries the whole text.
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };

        if self
            .documents
            .change(&uri, params.text_document.version, change.text)
        {
            self.lint_and_publish(&uri).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.lint_and_publish(&params.text_document.uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;

        self.documents.close(&uri);
        self.diagnostics.remove(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let actions = self.synthesizer.synthesize(
            &params.text_document.uri,
            &params.range,
            &params.context.diagnostics,
        );

        debug!(
            "{} code actions for {} at {:?}",
            actions.len(),
            params.text_document.uri,
            params.range
        );

        Ok(Some(
            actions
                .into_iter()
                .map(CodeActionOrCommand::CodeAction)
                .collect(),
        ))
    }
}
