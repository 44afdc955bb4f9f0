//! Source ingestion: formats, loading and lexing into cells

pub mod escape;
pub mod format;
pub mod lexer;
pub mod reader;

use thiserror::Error;

pub use format::{FormatKind, SourceFormat, SourceFormats};
pub use lexer::{lex, Lexed};
pub use reader::{load_from_file, Source, SourceText};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No source format is registered for '{path}'")]
    UnknownFormat { path: String },

    #[error("Source '{path}' is binary and cannot be parsed into cells")]
    Binary { path: String },

    #[error("Source '{path}' is not valid UTF-8")]
    Decode { path: String },

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
