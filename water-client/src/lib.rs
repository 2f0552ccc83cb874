//! Non-revenue water accounting over a hierarchical meter network.
//!
//! The analytical modules ([`registry`], [`period`], [`aggregate`], [`loss`],
//! [`daily`]) are synchronous and pure. [`db`] loads the same domain types
//! from Postgres.

pub mod aggregate;
pub mod daily;
pub mod db;
pub mod domain;
pub mod error;
pub mod loss;
pub mod period;
pub mod registry;
pub mod zone_hint;

pub use error::{AnalysisError, RegistryError};
pub use period::PeriodCatalog;
pub use registry::{MeterId, MeterRegistry};
