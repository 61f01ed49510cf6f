// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Only conditions that abort an operation end up here; probe and command
/// failures are carried as evidence instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Process table scan failed: {0}")]
    Scan(#[from] crate::port::ScanError),

    #[error(transparent)]
    Resolve(#[from] crate::application::resolver::ResolveError),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
