//! Storage for targets, classifications, light curves and reductions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Command-line driver / import glue                      │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Services - batch aggregation, pruning, read helpers    │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository traits (repository/) - abstract interface   │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┴──────────────┐
//!     │                              │
//! ┌───▼──────────────┐   ┌───────────▼─────────────┐
//! │ LocalRepository  │   │ PostgresRepository      │
//! │ (in-memory)      │   │ (Diesel, postgres-repo) │
//! └──────────────────┘   └─────────────────────────┘
//! ```
//!
//! - `repository`: Trait definitions and error types
//! - `repositories::local`: In-memory implementation for tests and the file-backed driver
//! - `repositories::postgres`: Postgres implementation with Diesel ORM
//! - `factory`: Builds a repository from configuration
//! - `config`: Postgres connection settings

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod config;
pub mod factory;
pub mod repositories;
pub mod repository;

pub use config::PostgresConfig;
pub use factory::{RepositoryFactory, RepositoryType};
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    ClassificationRepository, ErrorContext, FullRepository, PhotometryRepository,
    ReductionRepository, RepositoryError, RepositoryResult,
};
