//! Isothermal spheres, singular and cored.
//!
//! With Einstein scale $b = 4\pi\sigma^2/c^2$ and core radius $s$:
//!
//! $$\vec\alpha = b\,\frac{\vec\theta}{\psi + s}, \qquad \psi = \sqrt{|\vec\theta|^2 + s^2}$$
//!
//! For `s = 0` this is the singular sphere, whose deflection has constant
//! magnitude `b`. Its Jacobian diverges at the centre, which is reported as
//! [`Derivatives::singular`] while the deflection there is zero.

use std::f64::consts::PI;

use gravlens_cosmology::units::SPEED_OF_LIGHT;
use serde::{Deserialize, Serialize};

use super::Deflector;
use crate::types::Derivatives;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsothermalSphere {
    /// Einstein scale (rad).
    pub b: f64,
    /// Core radius (rad); zero for the singular profile.
    pub core: f64,
}

impl IsothermalSphere {
    /// Velocity dispersion in m/s, core radius in radians.
    pub fn new(velocity_dispersion: f64, core: f64) -> Self {
        Self {
            b: einstein_scale(velocity_dispersion),
            core,
        }
    }
}

/// Einstein scale `4πσ²/c²` (rad) for a dispersion in m/s.
pub fn einstein_scale(velocity_dispersion: f64) -> f64 {
    4.0 * PI * velocity_dispersion * velocity_dispersion / (SPEED_OF_LIGHT * SPEED_OF_LIGHT)
}

impl Deflector for IsothermalSphere {
    fn alpha(&self, theta: [f64; 2]) -> [f64; 2] {
        let s = self.core;
        let psi = (theta[0] * theta[0] + theta[1] * theta[1] + s * s).sqrt();
        if psi == 0.0 {
            return [0.0, 0.0];
        }
        let f = self.b / (psi + s);
        [f * theta[0], f * theta[1]]
    }

    fn derivatives(&self, theta: [f64; 2]) -> Derivatives {
        let [x, y] = theta;
        let s = self.core;
        let psi = (x * x + y * y + s * s).sqrt();
        if psi == 0.0 {
            return Derivatives::singular();
        }
        let ps = psi + s;
        let c = self.b / (psi * ps * ps);
        Derivatives {
            xx: c * (psi * ps - x * x),
            yy: c * (psi * ps - y * y),
            xy: -c * x * y,
        }
    }
}
