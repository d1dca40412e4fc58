//! # gravlens Core
//!
//! The numerical backbone of the gravlens framework. This crate implements
//! parametric gravitational lens models, their superposition into composite
//! lenses, and the rasterisation of deflection and magnification fields.
//!
//! ## Architecture
//!
//! All mass models implement the [`models::Deflector`] trait, which maps a sky
//! position to a deflection angle and its Jacobian. A
//! [`plane::LensPlane`] owns the placed components and source planes, rebuilds
//! a [`composite::CompositeLens`] on every recompute and publishes the fields
//! produced by [`fields::LensFields::evaluate`].
//!
//! ## Modules
//!
//! - [`types`]: Jacobians, placed components and source planes.
//! - [`models`]: Lens model family, parameters and errors.
//! - [`composite`]: Superposition and merged-lens files.
//! - [`imports`]: Loaded merged-lens handles.
//! - [`fields`]: Field rasterisation and critical-line extraction.
//! - [`plane`]: Lens plane state, staleness and recompute.
//! - [`project`]: Project file format.

pub mod composite;
pub mod fields;
pub mod imports;
pub mod models;
pub mod plane;
pub mod project;
pub mod types;

pub use composite::CompositeLens;
pub use fields::{ComponentFields, CriticalField, LensFields};
pub use models::{Deflector, LensError, LensModel, LensParams, ModelKind};
pub use plane::{FieldState, LensPlane, PlaneFields};
pub use project::LensPlaneConfig;
pub use types::{Derivatives, LensComponent, SourcePlane};
