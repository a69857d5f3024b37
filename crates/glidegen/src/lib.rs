//! glidegen - TypeScript declarations for remote schema metadata
//!
//! Shared functionality behind the `glidegen` command line.

pub mod config;
pub mod loader;
pub mod output;
pub mod pipeline;

pub use config::GlidegenConfig;
pub use loader::{LoadError, LoadOptions, LoadReport, SchemaLoader};
pub use output::{OutputError, OutputTarget};
pub use pipeline::{generate, GenerateReport, GenerateRequest};
