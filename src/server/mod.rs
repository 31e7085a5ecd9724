//! LSP server implementation for PEARL.
//!
//! This module wires together the backend, cache, and LSP handlers.

mod backend;
mod cache;
mod config;
mod lsp;


pub use backend::Backend;
pub use config::{extract_defines, extract_include_mode};
