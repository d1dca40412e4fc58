//! Distance provider trait.
//!
//! All distance sources implement [`DistanceModel`], which returns the angular
//! diameter distance between two redshifts. The lens plane holds one behind an
//! `Arc` and queries it whenever a redshift changes.

use thiserror::Error;

/// Errors from cosmology construction.
#[derive(Debug, Error)]
pub enum CosmologyError {
    #[error("Invalid cosmological parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Provides angular diameter distances between redshifts.
///
/// Implementations must be pure: the same pair of redshifts always yields the
/// same distance, and the result does not depend on argument order.
pub trait DistanceModel: Send + Sync {
    /// Human-readable name of this distance model.
    fn name(&self) -> &str;

    /// Angular diameter distance between `z1` and `z2` (Mpc).
    fn angular_diameter_distance(&self, z1: f64, z2: f64) -> f64;

    /// Distance from the observer to redshift `z` (Mpc).
    fn observer_distance(&self, z: f64) -> f64 {
        self.angular_diameter_distance(0.0, z)
    }
}
