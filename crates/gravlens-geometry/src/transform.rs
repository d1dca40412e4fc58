//! Planar rigid placements for lens components.
//!
//! A [`Placement`] positions a mass model on the sky: a rotation about the
//! model's own centre followed by a translation. Lens models are evaluated in
//! their local frame, so the placement maps sky positions into that frame and
//! maps the resulting deflection vectors and Jacobians back out.

use nalgebra::{Matrix2, Rotation2, Vector2};
use serde::{Deserialize, Serialize};

/// A rotation followed by a translation in the image plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Offset of the local origin (radians).
    pub translation: Vector2<f64>,
    /// Orientation of the local x axis.
    pub rotation: Rotation2<f64>,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            translation: Vector2::zeros(),
            rotation: Rotation2::identity(),
        }
    }
}

impl Placement {
    /// Create a placement from an offset and a counter-clockwise angle (radians).
    pub fn new(translation: [f64; 2], angle: f64) -> Self {
        Self {
            translation: Vector2::new(translation[0], translation[1]),
            rotation: Rotation2::new(angle),
        }
    }

    /// Create a pure translation.
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self::new([dx, dy], 0.0)
    }

    /// Rotation angle (radians) in $(-\pi, \pi]$.
    pub fn angle(&self) -> f64 {
        self.rotation.angle()
    }

    /// Whether this placement leaves every point where it is.
    pub fn is_identity(&self) -> bool {
        self.translation == Vector2::zeros() && self.rotation.angle() == 0.0
    }

    /// Map a sky position into the local frame: $R^{-1}(\theta - t)$.
    pub fn to_local(&self, theta: [f64; 2]) -> [f64; 2] {
        let v = self.rotation.inverse() * (Vector2::new(theta[0], theta[1]) - self.translation);
        [v.x, v.y]
    }

    /// Map a local position back onto the sky: $R\theta' + t$.
    pub fn to_global(&self, local: [f64; 2]) -> [f64; 2] {
        let v = self.rotation * Vector2::new(local[0], local[1]) + self.translation;
        [v.x, v.y]
    }

    /// Rotate a local vector (e.g. a deflection) into the sky frame.
    pub fn vector_to_global(&self, v: [f64; 2]) -> [f64; 2] {
        let r = self.rotation * Vector2::new(v[0], v[1]);
        [r.x, r.y]
    }

    /// Rotate a symmetric local tensor `[xx, yy, xy]` into the sky frame: $R J R^T$.
    pub fn tensor_to_global(&self, t: [f64; 3]) -> [f64; 3] {
        let j = Matrix2::new(t[0], t[2], t[2], t[1]);
        let r = self.rotation.matrix();
        let g = r * j * r.transpose();
        [g[(0, 0)], g[(1, 1)], 0.5 * (g[(0, 1)] + g[(1, 0)])]
    }
}
