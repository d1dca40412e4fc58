//! Plummer sphere: a point mass softened over an angular width.
//!
//! $$\vec\alpha(\vec\theta) = \frac{4GM}{c^2 D_d} \frac{\vec\theta}{|\vec\theta|^2 + w^2}$$

use gravlens_cosmology::units::{GRAVITATIONAL_CONSTANT, SPEED_OF_LIGHT};
use serde::{Deserialize, Serialize};

use super::Deflector;
use crate::types::Derivatives;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlummerLens {
    /// Deflection scale `4GM/(c² D_d)` (rad²).
    pub scale: f64,
    /// Angular width (rad).
    pub width: f64,
}

impl PlummerLens {
    /// Mass in kg, width in radians, `d_d` in metres.
    pub fn new(mass: f64, width: f64, d_d: f64) -> Self {
        let scale = 4.0 * GRAVITATIONAL_CONSTANT * mass / (SPEED_OF_LIGHT * SPEED_OF_LIGHT * d_d);
        Self { scale, width }
    }
}

impl Deflector for PlummerLens {
    fn alpha(&self, theta: [f64; 2]) -> [f64; 2] {
        let denom = theta[0] * theta[0] + theta[1] * theta[1] + self.width * self.width;
        if denom == 0.0 {
            return [0.0, 0.0];
        }
        let f = self.scale / denom;
        [f * theta[0], f * theta[1]]
    }

    fn derivatives(&self, theta: [f64; 2]) -> Derivatives {
        let [x, y] = theta;
        let denom = x * x + y * y + self.width * self.width;
        if denom == 0.0 {
            return Derivatives::singular();
        }
        let c = self.scale / (denom * denom);
        Derivatives {
            xx: c * (denom - 2.0 * x * x),
            yy: c * (denom - 2.0 * y * y),
            xy: -2.0 * c * x * y,
        }
    }
}
