//! Rasterised lens fields.
//!
//! [`LensFields::evaluate`] samples a deflector at every pixel of a
//! [`PixelGrid`] on a compute backend. Each pixel is independent, so the whole
//! raster is one data-parallel fill. From the deflection Jacobian the lens
//! mapping determinant for a source at distance ratio $r = D_{ds}/D_s$ is
//!
//! $$Q = \det\left(I - r\,\frac{\partial\vec\alpha}{\partial\vec\theta}\right)
//!     = (1 - r\alpha_{xx})(1 - r\alpha_{yy}) - (r\alpha_{xy})^2$$
//!
//! Critical lines are the zero crossings of `Q` and the magnification is
//! `1/Q`. Deflections are stored in arcseconds, derivatives are
//! dimensionless, and all rasters are indexed `[row, col, channel]`.

use gravlens_compute::{ComputeBackend, ComputeError};
use gravlens_cosmology::units::{arcsec_to_rad, rad_to_arcsec};
use gravlens_geometry::PixelGrid;
use ndarray::{s, stack, Array2, Array3, Array4, Axis};

use crate::composite::CompositeLens;
use crate::models::{Deflector, LensError};
use crate::types::{Derivatives, SourcePlane};

/// Composite deflection and Jacobian over a grid.
#[derive(Debug, Clone)]
pub struct LensFields {
    pub grid: PixelGrid,
    /// `(N, N, 2)` deflection (arcsec).
    pub alpha: Array3<f32>,
    /// `(N, N, 3)` Jacobian as `xx, yy, xy`.
    pub derivatives: Array3<f32>,
}

impl LensFields {
    /// Evaluate `lens` at every pixel of `grid`.
    pub fn evaluate(
        backend: &dyn ComputeBackend,
        lens: &dyn Deflector,
        grid: PixelGrid,
    ) -> Result<Self, LensError> {
        grid.validate()?;
        let n = grid.size;

        let raster = backend.parallel_grid_fill(n, n, 5, &|row, col, out| {
            let [x, y] = grid.position(col, row);
            let theta = [arcsec_to_rad(x), arcsec_to_rad(y)];
            let a = lens.alpha(theta);
            let d = lens.derivatives(theta);
            out[0] = rad_to_arcsec(a[0]) as f32;
            out[1] = rad_to_arcsec(a[1]) as f32;
            out[2] = d.xx as f32;
            out[3] = d.yy as f32;
            out[4] = d.xy as f32;
        })?;

        Ok(Self {
            grid,
            alpha: raster.slice(s![.., .., 0..2]).to_owned(),
            derivatives: raster.slice(s![.., .., 2..5]).to_owned(),
        })
    }

    /// Deflection at a pixel (arcsec).
    pub fn alpha_at(&self, row: usize, col: usize) -> [f64; 2] {
        [
            self.alpha[[row, col, 0]] as f64,
            self.alpha[[row, col, 1]] as f64,
        ]
    }

    pub fn derivatives_at(&self, row: usize, col: usize) -> Derivatives {
        Derivatives {
            xx: self.derivatives[[row, col, 0]] as f64,
            yy: self.derivatives[[row, col, 1]] as f64,
            xy: self.derivatives[[row, col, 2]] as f64,
        }
    }

    /// Lens mapping determinant per pixel for distance ratio `ratio`.
    pub fn determinant(&self, ratio: f64) -> Array2<f32> {
        let n = self.grid.size;
        Array2::from_shape_fn((n, n), |(row, col)| {
            self.derivatives_at(row, col).lens_determinant(ratio) as f32
        })
    }

    /// Source-plane position `β = θ - r α` for every pixel, `(N, N, 2)` in arcsec.
    pub fn trace_to_source(&self, ratio: f64) -> Array3<f32> {
        let n = self.grid.size;
        Array3::from_shape_fn((n, n, 2), |(row, col, axis)| {
            let theta = self.grid.position(col, row)[axis];
            (theta - ratio * self.alpha[[row, col, axis]] as f64) as f32
        })
    }

    /// Source-plane position of a single pixel (arcsec).
    pub fn source_position(&self, row: usize, col: usize, ratio: f64) -> [f64; 2] {
        let [x, y] = self.grid.position(col, row);
        let a = self.alpha_at(row, col);
        [x - ratio * a[0], y - ratio * a[1]]
    }

    /// Pixels whose ray lands inside the source aperture: the image positions.
    pub fn image_mask(&self, source: &SourcePlane) -> Array2<bool> {
        let ratio = source.distance_ratio();
        let n = self.grid.size;
        Array2::from_shape_fn((n, n), |(row, col)| {
            source.contains(self.source_position(row, col, ratio))
        })
    }
}

/// Per-component fields, each rotated into the global frame and scaled by
/// its strength. Summing over the first axis gives the composite field.
#[derive(Debug, Clone)]
pub struct ComponentFields {
    /// `(components, N, N, 2)` deflection (arcsec).
    pub alpha: Array4<f32>,
    /// `(components, N, N, 3)` Jacobian.
    pub derivatives: Array4<f32>,
}

impl ComponentFields {
    pub fn len(&self) -> usize {
        self.alpha.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Evaluate every component of `lens` separately.
pub fn evaluate_components(
    backend: &dyn ComputeBackend,
    lens: &CompositeLens,
    grid: PixelGrid,
) -> Result<ComponentFields, LensError> {
    grid.validate()?;
    let n = grid.size;
    if lens.is_empty() {
        return Ok(ComponentFields {
            alpha: Array4::zeros((0, n, n, 2)),
            derivatives: Array4::zeros((0, n, n, 3)),
        });
    }

    let per_component = lens
        .lenses
        .iter()
        .map(|placed| LensFields::evaluate(backend, placed, grid))
        .collect::<Result<Vec<_>, _>>()?;

    let shape_error = |e: ndarray::ShapeError| LensError::Compute(ComputeError::Shape(e.to_string()));
    let alpha_views: Vec<_> = per_component.iter().map(|f| f.alpha.view()).collect();
    let derivative_views: Vec<_> = per_component.iter().map(|f| f.derivatives.view()).collect();

    Ok(ComponentFields {
        alpha: stack(Axis(0), &alpha_views).map_err(shape_error)?,
        derivatives: stack(Axis(0), &derivative_views).map_err(shape_error)?,
    })
}

/// Lens mapping determinant for one source plane.
#[derive(Debug, Clone)]
pub struct CriticalField {
    /// `D_ds / D_s` the field was computed for.
    pub distance_ratio: f64,
    /// `(N, N)` determinant `Q`.
    pub q: Array2<f32>,
}

impl CriticalField {
    pub fn new(fields: &LensFields, distance_ratio: f64) -> Self {
        let q = fields.determinant(distance_ratio);
        let non_finite = q.iter().filter(|v| !v.is_finite()).count();
        if non_finite > 0 {
            log::warn!("{} pixels have a non-finite lens determinant", non_finite);
        }
        Self { distance_ratio, q }
    }

    /// Magnification `1/Q` per pixel.
    pub fn magnification(&self) -> Array2<f32> {
        magnification(&self.q)
    }

    pub fn critical_pixels(&self) -> Vec<[i16; 2]> {
        critical_pixels(&self.q)
    }

    /// Critical pixels mapped through the lens equation (arcsec).
    pub fn caustic_points(&self, fields: &LensFields) -> Vec<[f64; 2]> {
        caustic_points(fields, &self.q, self.distance_ratio)
    }
}

/// Magnification `1/Q` per pixel. Pixels on a critical line come out infinite.
pub fn magnification(q: &Array2<f32>) -> Array2<f32> {
    q.mapv(|v| 1.0 / v)
}

/// Pixels whose `Q` sign differs from the right or lower neighbour, as
/// `[col, row]`.
///
/// Pixels with a non-finite `Q` never count. Indices past `i16::MAX` cannot
/// be encoded and are dropped with a warning.
pub fn critical_pixels(q: &Array2<f32>) -> Vec<[i16; 2]> {
    let (rows, cols) = q.dim();
    let negative = |v: f32| v < 0.0;
    let mut out = Vec::new();
    let mut dropped = 0usize;

    for row in 0..rows {
        for col in 0..cols {
            let here = q[[row, col]];
            if !here.is_finite() {
                continue;
            }
            let flips = |other: f32| other.is_finite() && negative(other) != negative(here);
            let right = col + 1 < cols && flips(q[[row, col + 1]]);
            let below = row + 1 < rows && flips(q[[row + 1, col]]);
            if right || below {
                match (i16::try_from(col), i16::try_from(row)) {
                    (Ok(c), Ok(r)) => out.push([c, r]),
                    _ => dropped += 1,
                }
            }
        }
    }
    if dropped > 0 {
        log::warn!(
            "{} critical pixels lie beyond index {} and were dropped",
            dropped,
            i16::MAX
        );
    }
    out
}

/// Critical pixels mapped to the source plane, `β = θ - r α` (arcsec).
pub fn caustic_points(fields: &LensFields, q: &Array2<f32>, ratio: f64) -> Vec<[f64; 2]> {
    critical_pixels(q)
        .into_iter()
        .map(|[col, row]| fields.source_position(row as usize, col as usize, ratio))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::ImportRegistry;
    use crate::models::LensParams;
    use crate::types::LensComponent;
    use approx::assert_abs_diff_eq;
    use gravlens_compute::CpuBackend;
    use ndarray::array;

    fn backend() -> CpuBackend {
        CpuBackend::with_threads(2).unwrap()
    }

    fn sis_lens(sigma: f64) -> CompositeLens {
        let c = LensComponent::new(LensParams::Sis {
            velocity_dispersion: sigma,
        });
        CompositeLens::from_components(&[c], 1000.0, &ImportRegistry::default()).unwrap()
    }

    #[test]
    fn test_empty_lens_is_identity() {
        let grid = PixelGrid::new(8, 4.0).unwrap();
        let fields = LensFields::evaluate(&backend(), &CompositeLens::default(), grid).unwrap();
        assert_eq!(fields.alpha.dim(), (8, 8, 2));
        assert_eq!(fields.derivatives.dim(), (8, 8, 3));
        assert!(fields.alpha.iter().all(|&v| v == 0.0));
        assert!(fields.determinant(0.5).iter().all(|&q| q == 1.0));
    }

    #[test]
    fn test_rows_map_to_theta_y() {
        let grid = PixelGrid::new(16, 10.0).unwrap();
        let fields = LensFields::evaluate(&backend(), &sis_lens(200.0), grid).unwrap();
        // Column 8 is on the y axis, so the deflection there is along y.
        let a = fields.alpha_at(2, 8);
        assert_abs_diff_eq!(a[0], 0.0, epsilon = 1e-6);
        assert!(a[1] < 0.0);
    }

    #[test]
    fn test_critical_pixels_on_sign_change() {
        let q = array![[1.0f32, 1.0, -1.0], [1.0, 1.0, 1.0], [-1.0, 1.0, 1.0]];
        let pixels = critical_pixels(&q);
        assert!(pixels.contains(&[1, 0]));
        assert!(pixels.contains(&[2, 0]));
        assert!(pixels.contains(&[0, 1]));
        assert!(pixels.contains(&[0, 2]));
        assert_eq!(pixels.len(), 4);
    }

    #[test]
    fn test_singular_pixel_is_not_critical() {
        let q = array![[0.5f32, -0.2, 0.5], [-0.2, f32::NAN, -0.2], [0.5, -0.2, 0.5]];
        let pixels = critical_pixels(&q);
        assert!(!pixels.contains(&[1, 1]));
        assert_eq!(pixels.len(), 7);
    }

    #[test]
    fn test_critical_pixels_past_i16_range_dropped() {
        let mut q = Array2::<f32>::ones((1, 32770));
        q[[0, 100]] = -1.0;
        q[[0, 32768]] = -1.0;
        let pixels = critical_pixels(&q);
        assert_eq!(pixels, vec![[99, 0], [100, 0], [32767, 0]]);
    }

    #[test]
    fn test_magnification_inverts_q() {
        let q = array![[2.0f32, -0.5], [1.0, 4.0]];
        assert_eq!(magnification(&q), array![[0.5f32, -2.0], [1.0, 0.25]]);
    }

    #[test]
    fn test_component_shapes() {
        let grid = PixelGrid::new(8, 4.0).unwrap();
        let components = evaluate_components(&backend(), &CompositeLens::default(), grid).unwrap();
        assert!(components.is_empty());
        assert_eq!(components.alpha.dim(), (0, 8, 8, 2));
    }

    #[test]
    fn test_image_mask_finds_einstein_ring() {
        let grid = PixelGrid::new(32, 4.0).unwrap();
        let fields = LensFields::evaluate(&backend(), &sis_lens(250.0), grid).unwrap();
        let mut source = SourcePlane::new(2.0, [0.0, 0.0], 0.3);
        source.d_s = 1.0;
        source.d_ds = 1.0;
        let mask = fields.image_mask(&source);
        // A centred source images onto a ring of radius b ≈ 1.80″.
        let mut ring_hits = 0;
        for ((row, col), &hit) in mask.indexed_iter() {
            let [x, y] = grid.position(col, row);
            let r = x.hypot(y);
            if hit && r > 0.0 {
                assert!((r - 1.8025).abs() < 0.3 + 1e-4);
                ring_hits += 1;
            }
        }
        assert!(ring_hits > 0);
    }
}
