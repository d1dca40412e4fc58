//! # gravlens Compute
//!
//! Compute backend abstraction for the gravlens framework. This crate
//! provides a [`ComputeBackend`](backend::ComputeBackend) trait that isolates
//! the lens physics from device-specific execution details, and a
//! [`BackendGate`](gate::BackendGate) that holds field evaluation back until a
//! backend has finished initialising.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | CPU (Rayon) | `cpu` (default) | Implemented |

pub mod backend;
pub mod gate;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{ComputeBackend, ComputeError, DeviceInfo, PixelFill};
pub use gate::BackendGate;

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
