//! Packaging errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the packaging and installation procedures
#[derive(Debug, Error)]
pub enum PackError {
    /// A required input file does not exist
    #[error("input file missing: {0}")]
    MissingInput(PathBuf),

    /// The working tree has no retrievable revision identifier
    #[error("cannot determine revision: {0}")]
    Revision(String),

    /// Archive construction failed
    #[error("archive error: {0}")]
    Archive(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
