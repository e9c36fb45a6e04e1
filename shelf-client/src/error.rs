//! Error types for the `shelf` binary.

use crate::config::ConfigError;
use shelf_core::ShelfError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Shelf(#[from] ShelfError),
}
