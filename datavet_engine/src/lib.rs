//! # Datavet Engine
//!
//! The embedded validation engine: a DataFusion session wrapper, the
//! geometry coercion UDF, geometry column normalization, and the SQL
//! check runner.
//!
//! The engine operates on a registered relation and a
//! [`datavet_core::Template`]; how the relation got registered is the
//! adapters' business. All checks are aggregate queries, so even a large
//! relation is validated without materializing rows outside the engine.

pub mod error;
pub mod geom;
pub mod normalize;
pub mod session;
pub mod sql;
pub mod validate;

pub use error::{EngineError, Result};
pub use geom::{geom_from_any_udf, is_geometry_type};
pub use normalize::{NormalizationOutcome, normalize_geometry};
pub use session::{Capabilities, Session};
pub use validate::validate;
