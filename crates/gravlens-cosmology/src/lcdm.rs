//! ΛCDM angular diameter distances.
//!
//! The distance between two redshifts $z_1 < z_2$ is obtained by integrating
//! the inverse expansion rate over the scale factor $R = 1/(1+z)$:
//!
//! $$
//! S = \int_{1/(1+z_2)}^{1/(1+z_1)} \frac{dR}{\sqrt{\Omega_v R^{1-3w} + \Omega_m R + \Omega_r + \Omega_k R^2}}
//! $$
//!
//! followed by the curvature-dependent transform
//!
//! $$
//! A = \begin{cases}
//!   S & \Omega_k = 0 \\
//!   \sinh(\sqrt{\Omega_k} S)/\sqrt{\Omega_k} & \Omega_k > 0 \\
//!   \sin(\sqrt{-\Omega_k} S)/\sqrt{-\Omega_k} & \Omega_k < 0
//! \end{cases}
//! $$
//!
//! and $D = D_H \, A / (1 + z_2)$ with the Hubble distance $D_H = c / (100 h)$ Mpc.
//!
//! The integral uses the trapezoidal rule with a fixed number of steps
//! (10 000 by default). Regression values depend on that count to the sixth
//! significant digit, so it is part of the model's parameters.

use serde::{Deserialize, Serialize};

use crate::provider::{CosmologyError, DistanceModel};
use crate::units::SPEED_OF_LIGHT;

/// Curvature densities below this magnitude are treated as exactly flat.
pub const FLAT_CURVATURE_THRESHOLD: f64 = 1e-7;

/// Default number of trapezoidal integration steps.
pub const DEFAULT_INTEGRATION_STEPS: usize = 10_000;

/// Cosmological parameters of a ΛCDM-like universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cosmology {
    /// Dimensionless Hubble parameter, $H_0 = 100 h$ km/s/Mpc.
    pub h: f64,
    /// Matter density $\Omega_m$.
    pub omega_m: f64,
    /// Radiation density $\Omega_r$.
    pub omega_r: f64,
    /// Vacuum density $\Omega_v$.
    pub omega_v: f64,
    /// Dark energy equation of state $w$.
    pub w: f64,
    /// Number of trapezoidal integration steps.
    pub steps: usize,
}

impl Default for Cosmology {
    fn default() -> Self {
        Self {
            h: 0.7,
            omega_m: 0.3,
            omega_r: 0.0,
            omega_v: 0.7,
            w: -1.0,
            steps: DEFAULT_INTEGRATION_STEPS,
        }
    }
}

impl Cosmology {
    /// Create a cosmology, rejecting parameter sets the integrator cannot use.
    pub fn new(
        h: f64,
        omega_m: f64,
        omega_r: f64,
        omega_v: f64,
        w: f64,
    ) -> Result<Self, CosmologyError> {
        let cosmology = Self {
            h,
            omega_m,
            omega_r,
            omega_v,
            w,
            steps: DEFAULT_INTEGRATION_STEPS,
        };
        cosmology.validate()?;
        Ok(cosmology)
    }

    /// A flat universe with the given matter density and $\Omega_v = 1 - \Omega_m$.
    pub fn flat(h: f64, omega_m: f64) -> Result<Self, CosmologyError> {
        Self::new(h, omega_m, 0.0, 1.0 - omega_m, -1.0)
    }

    /// Override the number of integration steps.
    pub fn with_steps(mut self, steps: usize) -> Result<Self, CosmologyError> {
        self.steps = steps;
        self.validate()?;
        Ok(self)
    }

    /// Check that the parameters are usable.
    ///
    /// Parameter sets loaded through serde bypass [`Cosmology::new`], so
    /// callers holding deserialised values should run this explicitly.
    pub fn validate(&self) -> Result<(), CosmologyError> {
        if !(self.h.is_finite() && self.h > 0.0) {
            return Err(CosmologyError::InvalidParameter {
                name: "h",
                reason: format!("must be positive and finite, got {}", self.h),
            });
        }
        if self.steps == 0 {
            return Err(CosmologyError::InvalidParameter {
                name: "steps",
                reason: "at least one integration step is required".into(),
            });
        }
        for (name, value) in [
            ("omega_m", self.omega_m),
            ("omega_r", self.omega_r),
            ("omega_v", self.omega_v),
            ("w", self.w),
        ] {
            if !value.is_finite() {
                return Err(CosmologyError::InvalidParameter {
                    name,
                    reason: format!("must be finite, got {}", value),
                });
            }
        }
        Ok(())
    }

    /// Curvature density $\Omega_k = 1 - \Omega_v - \Omega_r - \Omega_m$,
    /// snapped to exactly zero when nearly flat.
    pub fn curvature(&self) -> f64 {
        let omega_k = 1.0 - self.omega_v - self.omega_r - self.omega_m;
        if omega_k.abs() < FLAT_CURVATURE_THRESHOLD {
            0.0
        } else {
            omega_k
        }
    }

    /// Hubble distance $c / H_0$ (Mpc).
    pub fn hubble_distance(&self) -> f64 {
        SPEED_OF_LIGHT * 1e-5 / self.h
    }

    /// Inverse dimensionless expansion rate as a function of scale factor.
    fn inverse_expansion(&self, r: f64, omega_k: f64) -> f64 {
        let vacuum = self.omega_v * r.powf(1.0 - 3.0 * self.w);
        let matter = self.omega_m * r;
        let curvature = omega_k * r * r;
        1.0 / (vacuum + matter + self.omega_r + curvature).sqrt()
    }

    /// Trapezoidal integral of the inverse expansion rate between two scale factors.
    fn comoving_integral(&self, r_lo: f64, r_hi: f64, omega_k: f64) -> f64 {
        let dr = (r_hi - r_lo) / self.steps as f64;
        let mut sum = 0.0;
        let mut r = r_lo;
        for _ in 0..self.steps {
            let lo = self.inverse_expansion(r, omega_k);
            let hi = self.inverse_expansion(r + dr, omega_k);
            sum += 0.5 * (lo + hi) * dr;
            r += dr;
        }
        sum
    }

    /// Angular diameter distance between two redshifts (Mpc).
    ///
    /// Symmetric in its arguments and zero when they coincide. Negative or
    /// non-finite redshifts are not rejected.
    pub fn distance(&self, z1: f64, z2: f64) -> f64 {
        let z_near = z1.min(z2);
        let z_far = z1.max(z2);
        let r_hi = 1.0 / (1.0 + z_near);
        let r_lo = 1.0 / (1.0 + z_far);

        let omega_k = self.curvature();
        let sum = self.comoving_integral(r_lo, r_hi, omega_k);

        let transverse = if omega_k == 0.0 {
            sum
        } else if omega_k > 0.0 {
            let root = omega_k.sqrt();
            (root * sum).sinh() / root
        } else {
            let root = (-omega_k).sqrt();
            (root * sum).sin() / root
        };

        self.hubble_distance() * transverse * r_lo
    }
}

impl DistanceModel for Cosmology {
    fn name(&self) -> &str {
        if self.curvature() == 0.0 {
            "flat ΛCDM"
        } else {
            "curved ΛCDM"
        }
    }

    fn angular_diameter_distance(&self, z1: f64, z2: f64) -> f64 {
        self.distance(z1, z2)
    }
}
