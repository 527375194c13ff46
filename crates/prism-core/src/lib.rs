//! Core types, configuration, and error handling for Prism.
//!
//! This crate provides the shared foundation used by the other Prism crates:
//! - [`PrismError`] and [`ProviderError`]: error types using `thiserror`
//! - [`PrismConfig`]: configuration loaded from `.prism.toml`
//! - Shared types: [`FileRecord`], [`FileCategory`], [`Finding`],
//!   [`Severity`], [`PassKind`], [`FrameworkInfo`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{LlmConfig, PrismConfig, ReviewConfig, ScoringConfig};
pub use error::{PrismError, ProviderError};
pub use types::{
    extension_of, DetectedFramework, FileCategory, FileRecord, Finding, FrameworkInfo,
    OutputFormat, PassKind, Severity,
};

/// A convenience `Result` type for Prism operations.
pub type Result<T> = std::result::Result<T, PrismError>;
