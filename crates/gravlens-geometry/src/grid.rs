//! Square pixel grids over a patch of sky.
//!
//! A grid of `size` pixels per side covers the angular range
//! `[-angular_radius, angular_radius)` along both axes. Pixel index `i` maps to
//!
//! $$\theta(i) = \frac{i - N/2}{N} \cdot 2 R$$
//!
//! so index 0 sits on the lower edge and index `N/2` on the optical axis.
//! Column indices map to $\theta_x$ and row indices to $\theta_y$.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from invalid grid geometry.
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("Grid size must be at least one pixel")]
    ZeroSize,

    #[error("Angular radius must be positive and finite, got {0}")]
    InvalidRadius(f64),
}

/// A square simulation grid (angles in arcseconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelGrid {
    /// Pixels per side.
    pub size: usize,
    /// Half-width of the simulated patch (arcsec).
    pub angular_radius: f64,
}

impl Default for PixelGrid {
    fn default() -> Self {
        Self {
            size: 256,
            angular_radius: 60.0,
        }
    }
}

impl PixelGrid {
    /// Create a grid, rejecting empty or degenerate geometry.
    pub fn new(size: usize, angular_radius: f64) -> Result<Self, GridError> {
        let grid = Self {
            size,
            angular_radius,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Check the geometry of a grid built without [`PixelGrid::new`].
    pub fn validate(&self) -> Result<(), GridError> {
        if self.size == 0 {
            return Err(GridError::ZeroSize);
        }
        if !(self.angular_radius.is_finite() && self.angular_radius > 0.0) {
            return Err(GridError::InvalidRadius(self.angular_radius));
        }
        Ok(())
    }

    /// Total number of pixels.
    pub fn len(&self) -> usize {
        self.size * self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Angular width of one pixel (arcsec).
    pub fn pixel_scale(&self) -> f64 {
        2.0 * self.angular_radius / self.size as f64
    }

    /// Angular coordinate of pixel index `i` along one axis (arcsec).
    pub fn theta(&self, i: usize) -> f64 {
        let n = self.size as f64;
        (i as f64 - n / 2.0) / n * self.angular_radius * 2.0
    }

    /// Sky position of the pixel at `(col, row)` (arcsec).
    pub fn position(&self, col: usize, row: usize) -> [f64; 2] {
        [self.theta(col), self.theta(row)]
    }

    /// Fractional pixel coordinates `(col, row)` of a sky position.
    pub fn pixel_of(&self, theta: [f64; 2]) -> [f64; 2] {
        let n = self.size as f64;
        let to_index = |t: f64| t / (2.0 * self.angular_radius) * n + n / 2.0;
        [to_index(theta[0]), to_index(theta[1])]
    }

    /// Whether a sky position falls inside the simulated patch.
    pub fn contains(&self, theta: [f64; 2]) -> bool {
        let r = self.angular_radius;
        (-r..r).contains(&theta[0]) && (-r..r).contains(&theta[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_reference_mapping() {
        let grid = PixelGrid::new(128, 60.0).unwrap();
        assert_abs_diff_eq!(grid.theta(0), -60.0, epsilon = 1e-12);
        assert_abs_diff_eq!(grid.theta(64), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(grid.theta(127), 60.0 - grid.pixel_scale(), epsilon = 1e-12);
    }

    #[test]
    fn test_pixel_of_inverts_theta() {
        let grid = PixelGrid::new(64, 30.0).unwrap();
        let p = grid.pixel_of(grid.position(10, 47));
        assert_abs_diff_eq!(p[0], 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p[1], 47.0, epsilon = 1e-9);
    }

    #[test]
    fn test_odd_size_grid() {
        let grid = PixelGrid::new(3, 1.5).unwrap();
        assert_abs_diff_eq!(grid.theta(0), -1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(grid.theta(1), -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(grid.theta(2), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_degenerate_geometry() {
        assert_eq!(PixelGrid::new(0, 10.0), Err(GridError::ZeroSize));
        assert!(matches!(PixelGrid::new(8, 0.0), Err(GridError::InvalidRadius(_))));
        assert!(matches!(PixelGrid::new(8, f64::NAN), Err(GridError::InvalidRadius(_))));
    }

    #[test]
    fn test_contains() {
        let grid = PixelGrid::new(16, 10.0).unwrap();
        assert!(grid.contains([0.0, -10.0]));
        assert!(!grid.contains([10.0, 0.0]));
    }
}
