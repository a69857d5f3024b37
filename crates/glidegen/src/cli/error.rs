//! Helpful error types for CLI commands
//!
//! Each error says what went wrong, what was being attempted and how to
//! fix it.

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// No instance configured and no fixture given
    pub fn no_instance() -> Self {
        Self::new("No instance URL configured")
            .with_context("generate needs an instance to read schema metadata from")
            .with_suggestions([
                "TRY: glidegen generate incident --instance https://dev12345.service-now.com",
                "TRY: Set instance_url in ~/.glidegen/config.toml",
                "TRY: Work from a fixture: glidegen generate incident --offline schema.json",
            ])
    }

    /// Credentials incomplete
    pub fn missing_credentials(what: &str) -> Self {
        Self::new(format!("Missing {}", what))
            .with_context("The instance requires authentication")
            .with_suggestions([
                "TRY: Pass --user and set GLIDEGEN_PASSWORD in the environment",
                "TRY: For OAuth, also pass --client-id and set GLIDEGEN_CLIENT_SECRET",
            ])
    }

    /// Output file exists or cannot be created
    pub fn output_conflict(path: &Path, reason: &str) -> Self {
        Self::new(format!("Cannot write output: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestions([
                "TRY: Pass --force to overwrite an existing file".to_string(),
                format!("TRY: Choose another destination: --output {}", path.with_extension("new.d.ts").display()),
                "TRY: Create the destination directory first".to_string(),
            ])
    }

    /// Cache store has never been written
    pub fn cache_not_found(path: &Path) -> Self {
        Self::new("Cache store not found")
            .with_context(format!("Expected cache store at: {}", path.display()))
            .with_suggestion("TRY: glidegen generate <TABLE>   # Populates the cache")
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
