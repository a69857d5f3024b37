//! Command-line interface for glidegen

pub mod cache;
pub mod error;
pub mod generate;
pub mod output;
