//! Remote schema sources.
//!
//! [`RemoteSchemaSource`] is the seam between the generator and the remote
//! instance. [`TableApiClient`] talks to a live instance; [`FixtureSource`]
//! answers from JSON held in memory for tests and offline runs.

pub mod auth;
pub mod client;
pub mod error;
pub mod fixture;
pub mod source;
pub mod wire;

pub use auth::{AccessToken, ClientCredentials, Credentials, TokenProvider};
pub use client::{ClientConfig, TableApiClient};
pub use error::{RemoteError, Result};
pub use fixture::FixtureSource;
pub use source::{ApiResponse, Condition, RecordQuery, RemoteSchemaSource};
