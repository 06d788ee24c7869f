use thiserror::Error;

#[derive(Debug, Error)]
pub enum LintError {
    #[error("No linter executable configured")]
    MissingExecutable,

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Linter I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Linter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}
