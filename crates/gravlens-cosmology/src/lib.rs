//! # gravlens Cosmology
//!
//! Distance calculations for the gravlens framework. Every lens and source
//! plane needs the angular diameter distances between observer, lens and
//! source; this crate provides them through the
//! [`DistanceModel`](provider::DistanceModel) trait.
//!
//! | Model | Module | Notes |
//! |-------|--------|-------|
//! | ΛCDM with constant $w$ | [`lcdm`] | Trapezoidal integration, 10 000 steps |
//!
//! Physical constants and unit conversions shared by the lens models live in
//! [`units`].

pub mod lcdm;
pub mod provider;
pub mod units;

pub use lcdm::Cosmology;
pub use provider::{CosmologyError, DistanceModel};
