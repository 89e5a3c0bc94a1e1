//! # Datavet Core
//!
//! Core data structures for the datavet dataset validator.
//!
//! This crate provides the building blocks shared by the adapters, the
//! validation engine, and the CLI:
//!
//! - **Template**: the versioned, declarative description of expected columns,
//!   types, value domains, and uniqueness constraints
//! - **Issue**: one structured validation finding with a stable code and a
//!   code-specific payload
//! - **EngineResult**: the aggregated output of one validation run
//! - **Report**: the immutable, deterministically serialized run record with
//!   its exit-code mapping
//!
//! ## Example
//!
//! ```rust
//! use datavet_core::{ColumnSpec, Template};
//!
//! let template: Template = serde_json::from_str(
//!     r#"{
//!         "template_id": "parcel_population",
//!         "version": "1.2.0",
//!         "columns": [
//!             {"name": "parcel_id", "dtype": "int64", "required": true},
//!             {"name": "status", "dtype": "string", "enum": ["A", "B"]}
//!         ]
//!     }"#,
//! ).unwrap();
//!
//! assert!(template.allow_extra_columns);
//! assert_eq!(template.columns.len(), 2);
//! ```

pub mod error;
pub mod report;
pub mod template;

pub use error::*;
pub use report::*;
pub use template::*;
