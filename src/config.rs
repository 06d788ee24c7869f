use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Deserialize;
use tower_lsp::lsp_types::DiagnosticSeverity;

/// Name reported as the `source` of every diagnostic and used as the code action title prefix
pub const LINTER_NAME: &str = "pycodestyle";

/// Returns the path to the data directory for pycodestyle-lsp.
/// Uses $XDG_DATA_HOME/pycodestyle-lsp if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/pycodestyle-lsp,
/// or ./pycodestyle-lsp if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join(log_file_name())
}

pub fn log_file_name() -> &'static str {
    "pycodestyle-lsp.log"
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("pycodestyle-lsp")
}

/// Severity names accepted in the `severity` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl From<Severity> for DiagnosticSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
            Severity::Information => DiagnosticSeverity::INFORMATION,
            Severity::Hint => DiagnosticSeverity::HINT,
        }
    }
}

/// Linter settings, taken from the command line and optionally replaced by
/// the client's `initializationOptions`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Command used to launch pycodestyle, e.g. `["python3", "-m", "pycodestyle"]`
    pub path: Vec<String>,
    /// Extra arguments appended after the output format flag
    pub args: Vec<String>,
    /// Maps a full rule code (`E225`) or a code prefix (`E`) to a severity
    pub severity: IndexMap<String, Severity>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            path: vec!["pycodestyle".to_string()],
            args: Vec::new(),
            severity: IndexMap::from([
                ("E".to_string(), Severity::Error),
                ("W".to_string(), Severity::Warning),
            ]),
        }
    }
}

impl Settings {
    /// Resolves the severity for a rule code: exact code first, then its first letter.
    pub fn severity_for(&self, code: &str) -> DiagnosticSeverity {
        self.severity
            .get(code)
            .or_else(|| code.get(..1).and_then(|prefix| self.severity.get(prefix)))
            .copied()
            .map(DiagnosticSeverity::from)
            .unwrap_or(DiagnosticSeverity::WARNING)
    }
}
