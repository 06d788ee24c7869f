use std::sync::Arc;

use tower_lsp::{LspService, Server};
use tracing::info;

use crate::config::{Settings, log_path};
use crate::linter::PycodestyleLinter;
use crate::log::init;
use crate::lsp::backend::Backend;
use crate::lsp::rules::RuleTable;

/// Serves LSP over stdin/stdout until the client exits.
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let _guard = init()?;

    info!("Starting pycodestyle-lsp server");
    info!("Logging to {:?}", log_path());
    info!("Linter command: {:?}", settings.path);

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let rules = Arc::new(RuleTable::pycodestyle());
    let (service, socket) = LspService::new(move |client| {
        Backend::build(
            client,
            Arc::new(PycodestyleLinter::new()),
            rules,
            settings,
        )
    });
    Server::new(stdin, stdout, socket).serve(service).await;

    info!("pycodestyle-lsp server stopped");
    Ok(())
}
