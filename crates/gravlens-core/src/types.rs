//! Core types shared across the lensing pipeline.
//!
//! This module defines the data carried between the lens models, the
//! composite lens and the lens plane: the deflection Jacobian, placed lens
//! components and source planes.

use std::ops::{Add, AddAssign, Mul};

use gravlens_cosmology::units::arcsec_to_rad;
use gravlens_geometry::Placement;
use serde::{Deserialize, Serialize};

use crate::models::{LensError, LensParams};

/// Symmetric Jacobian of the deflection angle, $\partial\alpha_i/\partial\theta_j$.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Derivatives {
    pub xx: f64,
    pub yy: f64,
    pub xy: f64,
}

impl Derivatives {
    /// Jacobian at the centre of a singular profile, where it diverges.
    ///
    /// Every entry is NaN so the lens determinant there is NaN too, and
    /// critical-line extraction skips the pixel instead of reading a sign.
    pub fn singular() -> Self {
        Self {
            xx: f64::NAN,
            yy: f64::NAN,
            xy: f64::NAN,
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.xx, self.yy, self.xy]
    }

    pub fn from_array(a: [f64; 3]) -> Self {
        Self {
            xx: a[0],
            yy: a[1],
            xy: a[2],
        }
    }

    /// Convergence κ, half the trace.
    pub fn convergence(&self) -> f64 {
        0.5 * (self.xx + self.yy)
    }

    /// Determinant of the lens mapping Jacobian for distance ratio `r = D_ds/D_s`.
    ///
    /// $$Q = (1 - r\,\alpha_{xx})(1 - r\,\alpha_{yy}) - (r\,\alpha_{xy})^2$$
    pub fn lens_determinant(&self, ratio: f64) -> f64 {
        (1.0 - ratio * self.xx) * (1.0 - ratio * self.yy) - (ratio * self.xy).powi(2)
    }
}

impl Add for Derivatives {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            xx: self.xx + rhs.xx,
            yy: self.yy + rhs.yy,
            xy: self.xy + rhs.xy,
        }
    }
}

impl AddAssign for Derivatives {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Mul<f64> for Derivatives {
    type Output = Self;

    fn mul(self, s: f64) -> Self {
        Self {
            xx: self.xx * s,
            yy: self.yy * s,
            xy: self.xy * s,
        }
    }
}

/// One mass model placed on the lens plane.
#[derive(Debug, Clone, PartialEq)]
pub struct LensComponent {
    pub params: LensParams,
    /// Dimensionless multiplier on the deflection.
    pub strength: f64,
    /// Offset of the model centre (arcsec).
    pub translation: [f64; 2],
    /// Rotation of the model's x axis (degrees, counter-clockwise).
    pub angle: f64,
}

impl LensComponent {
    /// An unplaced component with unit strength.
    pub fn new(params: LensParams) -> Self {
        Self {
            params,
            strength: 1.0,
            translation: [0.0, 0.0],
            angle: 0.0,
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_translation(mut self, dx: f64, dy: f64) -> Self {
        self.translation = [dx, dy];
        self
    }

    pub fn with_angle(mut self, degrees: f64) -> Self {
        self.angle = degrees;
        self
    }

    /// Placement in radians for evaluating the model.
    pub fn placement(&self) -> Placement {
        Placement::new(
            [
                arcsec_to_rad(self.translation[0]),
                arcsec_to_rad(self.translation[1]),
            ],
            self.angle.to_radians(),
        )
    }

    /// Check parameters and placement values.
    pub fn validate(&self) -> Result<(), LensError> {
        self.params.validate()?;
        let finite = self.strength.is_finite()
            && self.translation.iter().all(|t| t.is_finite())
            && self.angle.is_finite();
        if !finite {
            return Err(LensError::InvalidParameters {
                model: self.params.kind().name(),
                reason: "strength, translation and angle must be finite".into(),
            });
        }
        Ok(())
    }
}

/// A background source plane and its circular aperture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePlane {
    pub redshift: f64,
    /// Observer to source distance (Mpc).
    pub d_s: f64,
    /// Lens to source distance (Mpc).
    pub d_ds: f64,
    /// Aperture centre (arcsec).
    pub origin: [f64; 2],
    /// Aperture radius (arcsec).
    pub radius: f64,
}

impl SourcePlane {
    /// A source plane with distances not yet computed.
    pub fn new(redshift: f64, origin: [f64; 2], radius: f64) -> Self {
        Self {
            redshift,
            d_s: 0.0,
            d_ds: 0.0,
            origin,
            radius,
        }
    }

    /// `D_ds / D_s`, or zero when the source is not behind the lens.
    pub fn distance_ratio(&self) -> f64 {
        if self.d_s > 0.0 {
            self.d_ds / self.d_s
        } else {
            0.0
        }
    }

    /// Whether a source-plane position (arcsec) falls within the aperture.
    pub fn contains(&self, beta: [f64; 2]) -> bool {
        let dx = beta[0] - self.origin[0];
        let dy = beta[1] - self.origin[1];
        dx * dx + dy * dy <= self.radius * self.radius
    }
}

/// Check that a redshift is usable for distance calculations.
pub fn validate_redshift(z: f64) -> Result<(), LensError> {
    if z.is_finite() && z >= 0.0 {
        Ok(())
    } else {
        Err(LensError::InvalidRedshift(z))
    }
}

/// Check that a source aperture radius (arcsec) is usable for hit-testing.
pub fn validate_aperture(radius: f64) -> Result<(), LensError> {
    if radius.is_finite() && radius >= 0.0 {
        Ok(())
    } else {
        Err(LensError::InvalidAperture(radius))
    }
}
