pub mod api;
pub mod ast;
pub mod emitter;
pub mod error;
pub mod fs;
pub mod lexer;
#[cfg(feature = "lsp")]
pub mod lsp;
pub mod manifest;
pub mod parser;
pub mod resolver;
pub mod stats;
pub mod utils;

pub use api::{compile, compile_dry_run, CompileOptions, CompileOutput};
pub use error::HyperpromptError;
