//! # gravlens Geometry
//!
//! Geometry handling for the gravlens framework. This crate provides:
//!
//! - **Pixel grids** ([`grid`]): the mapping from raster indices to
//!   angular sky coordinates.
//! - **Placements** ([`transform`]): rotate-then-translate transforms that
//!   position lens components on the sky.

pub mod grid;
pub mod transform;

pub use grid::{GridError, PixelGrid};
pub use transform::Placement;
