//! Error types for quill-doc operations.

use std::io;
use thiserror::Error;

/// The error type for quill-doc operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred while reading or writing.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing or serialization error in the front matter.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document is not valid UTF-8.
    #[error("Document is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The document does not start with a `---` front-matter delimiter.
    #[error("Missing front matter: document must start with '---'")]
    MissingFrontMatter,

    /// The front matter is opened but never closed.
    #[error("Unterminated front matter: closing '---' not found")]
    UnterminatedFrontMatter,
}

/// A specialized Result type for quill-doc operations.
pub type Result<T> = std::result::Result<T, Error>;
