//! Diagnostic producer layer
//! - traits.rs: Linter trait definition
//! - pycodestyle.rs: pycodestyle process runner
//! - error.rs: Lint failures

pub mod error;
pub mod pycodestyle;
pub mod traits;

pub use error::LintError;
pub use pycodestyle::PycodestyleLinter;
pub use traits::Linter;
