//! Linter trait for producing diagnostics from document text

use tower_lsp::lsp_types::Diagnostic;

use crate::config::Settings;
use crate::linter::error::LintError;
use crate::lsp::documents::Document;

/// Computes diagnostics for a document snapshot
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Linter: Send + Sync {
    /// Lints the document's current text
    ///
    /// # Returns
    /// * `Ok(Vec<Diagnostic>)` - Every reported violation, in output order
    /// * `Err(LintError)` - If the linter could not be run
    async fn lint(
        &self,
        document: &Document,
        settings: &Settings,
    ) -> Result<Vec<Diagnostic>, LintError>;
}
