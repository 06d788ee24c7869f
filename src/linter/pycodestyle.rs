//! pycodestyle process runner
//!
//! The document text is piped to `pycodestyle -` and each reported violation
//! is read back in a fixed machine-readable format.

use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tower_lsp::lsp_types::{Diagnostic, NumberOrString, Position, Range};
use tracing::{debug, warn};

use crate::config::{LINTER_NAME, Settings};
use crate::linter::error::LintError;
use crate::linter::traits::Linter;
use crate::lsp::documents::Document;

/// Output format requested from pycodestyle: `row,col,type,code:text`
const FORMAT_ARG: &str = "--format=%(row)d,%(col)d,%(code).1s,%(code)s:%(text)s";

static OUTPUT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<line>\d+),(?P<column>-?\d+),(?P<type>\w+),(?P<code>\w+\d+):(?P<message>[^\r\n]*)$")
        .expect("pycodestyle output pattern is valid")
});

#[derive(Debug, Default)]
pub struct PycodestyleLinter;

impl PycodestyleLinter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Linter for PycodestyleLinter {
    async fn lint(
        &self,
        document: &Document,
        settings: &Settings,
    ) -> Result<Vec<Diagnostic>, LintError> {
        let (program, leading_args) = settings
            .path
            .split_first()
            .ok_or(LintError::MissingExecutable)?;

        debug!("Running {} for {}", program, document.uri);

        let mut child = Command::new(program)
            .args(leading_args)
            .arg(FORMAT_ARG)
            .args(&settings.args)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LintError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Feed stdin concurrently so a large report cannot stall on a full stdout pipe.
        let stdin = child.stdin.take();
        let text = document.text.clone();
        let feeder = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(text.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let output = child.wait_with_output().await?;
        if let Ok(Err(e)) = feeder.await {
            // The process may exit before reading everything; its output still counts.
            debug!("Failed to write document to {}: {}", program, e);
        }

        // pycodestyle exits with 1 when it reports violations
        if !matches!(output.status.code(), Some(0) | Some(1)) {
            return Err(LintError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_output(
            &String::from_utf8_lossy(&output.stdout),
            settings,
        ))
    }
}

/// Converts pycodestyle report lines into diagnostics, skipping lines that do not match.
pub fn parse_output(output: &str, settings: &Settings) -> Vec<Diagnostic> {
    output
        .lines()
        .filter_map(|line| {
            let diagnostic = parse_line(line, settings);
            if diagnostic.is_none() && !line.trim().is_empty() {
                warn!("Unrecognised pycodestyle output: {}", line);
            }
            diagnostic
        })
        .collect()
}

fn parse_line(line: &str, settings: &Settings) -> Option<Diagnostic> {
    let captures = OUTPUT_LINE.captures(line.trim_end())?;
    let row: u32 = captures["line"].parse().ok()?;
    let column: i64 = captures["column"].parse().ok()?;
    let code = &captures["code"];

    let line = row.saturating_sub(1);
    let start = u32::try_from(column.saturating_sub(1)).unwrap_or(0);
    let end = u32::try_from(column).unwrap_or(0);

    Some(Diagnostic {
        range: Range::new(Position::new(line, start), Position::new(line, end)),
        severity: Some(settings.severity_for(code)),
        code: Some(NumberOrString::String(code.to_string())),
        source: Some(LINTER_NAME.to_string()),
        message: captures["message"].trim().to_string(),
        ..Default::default()
    })
}
