//! Error types for rendering.

use glidegen_schema::CacheError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RenderError>;

/// Rendering errors.
///
/// Everything except `Cache` and `Cancelled` is structural: it removes one
/// table from the output and the run carries on with the rest.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("table '{0}' is known only by name and has not been fetched")]
    StubTable(String),

    #[error("table '{table}' extends '{super_class}', which is not available for rendering")]
    MissingSuperClass { table: String, super_class: String },

    #[error("inheritance chain of table '{0}' loops back on itself")]
    CyclicInheritance(String),

    #[error("table '{0}' appears more than once in the render set")]
    DuplicateTable(String),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("rendering cancelled")]
    Cancelled,
}

impl RenderError {
    /// True when the error only affects the table it names.
    pub fn is_table_scoped(&self) -> bool {
        !matches!(self, RenderError::Cache(_) | RenderError::Cancelled)
    }
}
