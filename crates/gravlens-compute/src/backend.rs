//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution environments so that
//! the lens physics in `gravlens-core` stays device-agnostic. The hot path is
//! a per-pixel fill of a dense raster: every pixel is independent, and the
//! backend owns the output buffer until it hands it back whole.

use ndarray::Array3;
use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Compute backend not ready: {0}")]
    NotReady(String),

    #[error("Compute backend has already been initialised")]
    AlreadyInitialised,

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Buffer shape error: {0}")]
    Shape(String),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub compute_units: Option<usize>,
}

/// Per-pixel fill callback: `(row, col, output channels)`.
pub type PixelFill<'a> = dyn Fn(usize, usize, &mut [f32]) + Send + Sync + 'a;

/// Abstraction over compute backends.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Fill a `(rows, cols, channels)` raster by calling `fill_fn` once per pixel.
    ///
    /// The buffer is allocated by the backend and returned only after every
    /// pixel has been written, so callers never observe a partial raster.
    fn parallel_grid_fill(
        &self,
        rows: usize,
        cols: usize,
        channels: usize,
        fill_fn: &PixelFill<'_>,
    ) -> Result<Array3<f32>, ComputeError>;
}
