//! Mask combination.

use crate::types::{Mask, PipelineError};

/// Keep pixels that are both bright and away from edges.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the two masks differ
/// in size.
pub fn combine(bright: &Mask, edges: &Mask) -> Result<Mask, PipelineError> {
    bright.intersect(edges)
}
