//! Repository trait definitions for storage operations.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for repository operations
//! - [`classification`]: Targets, subjects and classifications
//! - [`reduction`]: Aggregation snapshots
//! - [`photometry`]: Raw light curves
//!
//! # Convenience Trait Bound
//!
//! For functions that need every capability, use the [`FullRepository`] trait bound:
//!
//! ```ignore
//! async fn reduce<R: FullRepository + ?Sized>(repo: &R, target_id: TargetId) -> RepositoryResult<()> {
//!     let target = repo.get_target(target_id).await?;
//!     let latest = repo.latest_reduction(target.id).await?;
//!     Ok(())
//! }
//! ```

pub mod classification;
pub mod error;
pub mod photometry;
pub mod reduction;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

pub use classification::ClassificationRepository;
pub use photometry::PhotometryRepository;
pub use reduction::ReductionRepository;

/// Composite trait bound for a complete repository implementation.
pub trait FullRepository:
    ClassificationRepository + ReductionRepository + PhotometryRepository
{
}

// Blanket implementation: any type implementing all three traits is a FullRepository
impl<T> FullRepository for T where
    T: ClassificationRepository + ReductionRepository + PhotometryRepository
{
}
