//! TypeScript declarations for cached schema metadata.
//!
//! Tables are captured from the [`glidegen_schema::EntityCache`] into
//! [`TableView`]s, grouped by application scope, and written out with each
//! column classified into its element wrapper type. Derived tables only
//! declare the columns that differ from their parent.

pub mod classify;
pub mod error;
pub mod group;
pub mod inherit;
pub mod render;
pub mod view;
pub mod writer;

pub use classify::{classify, RenderMode, WrapperCategory};
pub use error::{RenderError, Result};
pub use group::{group, NamespaceKey};
pub use inherit::{partition, ElementComparison, Extends, Partition};
pub use render::{render, RenderOptions, RenderOutput};
pub use view::{capture_table, capture_tables, ElementView, PackageView, TableView};
