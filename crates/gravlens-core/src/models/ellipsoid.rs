//! Softened isothermal ellipsoid.
//!
//! Axis ratio `q = 1 - ellipticity`, `k = sqrt(1 - q²)` and
//! `ψ = sqrt(q²(s² + x²) + y²)`. The major axis lies along local x.
//!
//! $$\alpha_x = \frac{bq}{k}\arctan\frac{kx}{\psi + s}, \qquad
//!   \alpha_y = \frac{bq}{k}\,\mathrm{artanh}\frac{ky}{\psi + q^2 s}$$
//!
//! At `k = 0` both reduce to `bq θ / (ψ + s)`, the isothermal sphere.

use serde::{Deserialize, Serialize};

use super::isothermal::einstein_scale;
use super::Deflector;
use crate::types::Derivatives;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsothermalEllipsoid {
    /// Einstein scale (rad).
    pub b: f64,
    /// Axis ratio in (0, 1].
    pub q: f64,
    /// Core radius (rad).
    pub core: f64,
}

impl IsothermalEllipsoid {
    /// Velocity dispersion in m/s, core radius in radians.
    pub fn new(velocity_dispersion: f64, ellipticity: f64, core: f64) -> Self {
        Self {
            b: einstein_scale(velocity_dispersion),
            q: 1.0 - ellipticity,
            core,
        }
    }

    fn k(&self) -> f64 {
        (1.0 - self.q * self.q).max(0.0).sqrt()
    }

    fn psi(&self, x: f64, y: f64) -> f64 {
        let q2 = self.q * self.q;
        (q2 * (self.core * self.core + x * x) + y * y).sqrt()
    }
}

impl Deflector for IsothermalEllipsoid {
    fn alpha(&self, theta: [f64; 2]) -> [f64; 2] {
        let [x, y] = theta;
        let (q, s) = (self.q, self.core);
        let psi = self.psi(x, y);
        if psi == 0.0 {
            return [0.0, 0.0];
        }

        let k = self.k();
        if k == 0.0 {
            let f = self.b * q / (psi + s);
            return [f * x, f * y];
        }

        let f = self.b * q / k;
        [
            f * (k * x / (psi + s)).atan(),
            f * (k * y / (psi + q * q * s)).atanh(),
        ]
    }

    fn derivatives(&self, theta: [f64; 2]) -> Derivatives {
        let [x, y] = theta;
        let (q, s) = (self.q, self.core);
        let q2 = q * q;
        let k2 = 1.0 - q2;
        let psi = self.psi(x, y);
        if psi == 0.0 {
            return Derivatives::singular();
        }

        let bq = self.b * q;
        let ps = psi + s;
        let pq = psi + q2 * s;
        let d1 = ps * ps + k2 * x * x;
        let d2 = pq * pq - k2 * y * y;
        Derivatives {
            xx: bq * (ps * psi - q2 * x * x) / (psi * d1),
            yy: bq * (pq * psi - y * y) / (psi * d2),
            xy: -bq * x * y / (psi * d1),
        }
    }
}
