//! Uniform mass sheet of surface density Σ.

use std::f64::consts::PI;

use gravlens_cosmology::units::{GRAVITATIONAL_CONSTANT, SPEED_OF_LIGHT};
use serde::{Deserialize, Serialize};

use super::Deflector;
use crate::types::Derivatives;

/// Deflection `α = f θ` with `f = 4πGΣ D_d / c²`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassSheetLens {
    pub factor: f64,
}

impl MassSheetLens {
    /// Density in kg/m², `d_d` in metres.
    pub fn new(density: f64, d_d: f64) -> Self {
        Self {
            factor: 4.0 * PI * GRAVITATIONAL_CONSTANT * density * d_d
                / (SPEED_OF_LIGHT * SPEED_OF_LIGHT),
        }
    }
}

impl Deflector for MassSheetLens {
    fn alpha(&self, theta: [f64; 2]) -> [f64; 2] {
        [self.factor * theta[0], self.factor * theta[1]]
    }

    fn derivatives(&self, _theta: [f64; 2]) -> Derivatives {
        Derivatives {
            xx: self.factor,
            yy: self.factor,
            xy: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gravlens_cosmology::units::mpc_to_m;

    #[test]
    fn test_linear_deflection() {
        let sheet = MassSheetLens::new(3.0, mpc_to_m(1000.0));
        let a = sheet.alpha([2e-5, -1e-5]);
        assert_relative_eq!(a[0], 2e-5 * sheet.factor);
        assert_relative_eq!(a[1], -1e-5 * sheet.factor);
        assert_eq!(sheet.derivatives([5.0, 5.0]).xx, sheet.factor);
    }

    #[test]
    fn test_critical_density_gives_unit_convergence() {
        // Σ_crit = c² D_s / (4πG D_d D_ds); with D_s = D_ds the sheet factor is 1.
        let d = mpc_to_m(1500.0);
        let sigma_crit = SPEED_OF_LIGHT * SPEED_OF_LIGHT / (4.0 * PI * GRAVITATIONAL_CONSTANT * d);
        let sheet = MassSheetLens::new(sigma_crit, d);
        assert_relative_eq!(sheet.factor, 1.0, max_relative = 1e-12);
    }
}
