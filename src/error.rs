//! Top-level error type of a makeneb run.

use crate::path::PathError;
use crate::settings::ConfigError;
use crate::writer::WriteError;
use thiserror::Error;

/// Any failure that ends a run.
#[derive(Error, Debug)]
pub enum MakenebError {
    /// Reading the endpoints or building the chain failed
    #[error("Failed to build the path: {0}")]
    Path(#[from] PathError),
    /// Writing the images failed
    #[error("Failed to write the images: {0}")]
    Write(#[from] WriteError),
    /// The settings template could not be written
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl MakenebError {
    /// Whether the run failed because of the number of `-i` paths.
    pub fn is_input_count(&self) -> bool {
        matches!(self, MakenebError::Path(PathError::InputCount(_)))
    }
}
