//! LSP server layer
//!
//! Lints open Python documents with pycodestyle, publishes the results and
//! offers formatting quick fixes for whitespace rules.
//!
//! # Modules
//!
//! - [`backend`]: Main LSP backend implementing `LanguageServer` trait
//! - [`code_action`]: Turns request diagnostics into quick fixes
//! - [`documents`]: Open document table with monotonic versions
//! - [`rules`]: Rule code to remediation command table
//! - [`server`]: Stdio server bootstrap

pub mod backend;
pub mod code_action;
pub mod documents;
pub mod rules;
pub mod server;
