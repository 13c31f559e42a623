//! Helpers for testing pipelines.
//!
//! - **Fixtures**: a review dataset ([`sample_reviews`]) and the sentiment
//!   pipeline built on it ([`sentiment_pipeline`])
//! - **Assertions**: dataset comparisons that report the first differing
//!   row and column
//! - **Batches**: [`micro_batches`] and [`write_batch_files`] to feed a
//!   streaming query from a test
//!
//! # Quick Start
//!
//! ```no_run
//! use stagewise::testing::*;
//!
//! # fn main() -> stagewise::Result<()> {
//! let reviews = sample_reviews(40);
//! let model = sentiment_pipeline()?.fit(&reviews)?;
//! let scored = model.transform(&reviews)?;
//! assert_column_in_range(&scored, "probability", 0.0, 1.0);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
