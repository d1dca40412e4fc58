//! CPU compute backend using Rayon for shared-memory parallelism.

use ndarray::Array3;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::backend::{ComputeBackend, ComputeError, DeviceInfo, PixelFill};

/// CPU backend that parallelises raster fills across a dedicated thread pool.
pub struct CpuBackend {
    pool: ThreadPool,
    num_threads: usize,
}

impl CpuBackend {
    /// Build the backend's thread pool asynchronously.
    ///
    /// `None` uses one thread per available core.
    pub async fn new_async(num_threads: Option<usize>) -> Result<Self, ComputeError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("gravlens-cpu-{}", i));
        if let Some(n) = num_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;
        let num_threads = pool.current_num_threads();
        log::debug!("CPU backend ready with {} threads", num_threads);
        Ok(Self { pool, num_threads })
    }

    /// Create a CPU backend using all available threads, blocking the current thread.
    pub fn new() -> Result<Self, ComputeError> {
        pollster::block_on(Self::new_async(None))
    }

    /// Create a CPU backend with a specified thread count.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        pollster::block_on(Self::new_async(Some(num_threads)))
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            compute_units: Some(self.num_threads),
        }
    }

    fn parallel_grid_fill(
        &self,
        rows: usize,
        cols: usize,
        channels: usize,
        fill_fn: &PixelFill<'_>,
    ) -> Result<Array3<f32>, ComputeError> {
        if channels == 0 {
            return Err(ComputeError::Shape("a raster needs at least one channel".into()));
        }

        let mut data = vec![0.0_f32; rows * cols * channels];
        if cols > 0 {
            self.pool.install(|| {
                data.par_chunks_mut(channels)
                    .enumerate()
                    .for_each(|(idx, out)| fill_fn(idx / cols, idx % cols, out));
            });
        }

        Array3::from_shape_vec((rows, cols, channels), data)
            .map_err(|e| ComputeError::Shape(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_visits_every_pixel_once() {
        let backend = CpuBackend::with_threads(2).unwrap();
        let raster = backend
            .parallel_grid_fill(3, 4, 2, &|row, col, out| {
                out[0] = row as f32;
                out[1] = col as f32;
            })
            .unwrap();

        assert_eq!(raster.dim(), (3, 4, 2));
        for row in 0..3 {
            for col in 0..4 {
                assert_eq!(raster[[row, col, 0]], row as f32);
                assert_eq!(raster[[row, col, 1]], col as f32);
            }
        }
    }

    #[test]
    fn test_zero_channels_rejected() {
        let backend = CpuBackend::with_threads(1).unwrap();
        assert!(backend.parallel_grid_fill(2, 2, 0, &|_, _, _| {}).is_err());
    }

    #[test]
    fn test_device_info_reports_threads() {
        let backend = CpuBackend::with_threads(3).unwrap();
        assert_eq!(backend.device_info().compute_units, Some(3));
    }
}
