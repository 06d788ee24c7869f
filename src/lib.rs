pub mod config;
pub mod linter;
pub mod log;
pub mod lsp;
pub mod rpc;
pub mod store;
