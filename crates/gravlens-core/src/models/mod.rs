//! Parametric lens models.
//!
//! Every mass model maps a sky position (radians, in the model's own frame) to
//! a deflection angle and its Jacobian. Models are a closed set: a
//! [`LensModel`] is built from validated [`LensParams`] plus the observer↔lens
//! distance, after which it is a pure function of position.
//!
//! | Tag | Model | Module |
//! |-----|-------|--------|
//! | 1 | Plummer sphere | [`plummer`] |
//! | 2, 3 | (Non-)singular isothermal sphere | [`isothermal`] |
//! | 4, 5 | (Non-)singular isothermal ellipsoid | [`ellipsoid`] |
//! | 6 | Uniform mass sheet | [`mass_sheet`] |
//! | 7 | Imported merged lens | [`crate::imports`] |

pub mod ellipsoid;
pub mod isothermal;
pub mod mass_sheet;
pub mod params;
pub mod plummer;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use gravlens_compute::ComputeError;
use gravlens_cosmology::units::{arcsec_to_rad, kms_to_ms, mpc_to_m, SOLAR_MASS};
use gravlens_geometry::GridError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::composite::CompositeLens;
use crate::imports::ImportRegistry;
use crate::types::Derivatives;

pub use ellipsoid::IsothermalEllipsoid;
pub use isothermal::IsothermalSphere;
pub use mass_sheet::MassSheetLens;
pub use params::{LensParams, ParamMap};
pub use plummer::PlummerLens;

/// Errors raised while building, evaluating or persisting lenses.
#[derive(Debug, Error)]
pub enum LensError {
    #[error("Invalid parameters for {model} lens: {reason}")]
    InvalidParameters { model: &'static str, reason: String },

    #[error("Unknown lens model: {0}")]
    UnknownModel(String),

    #[error("Invalid redshift {0}: must be finite and non-negative")]
    InvalidRedshift(f64),

    #[error("Invalid aperture radius {0}: must be finite and non-negative")]
    InvalidAperture(f64),

    #[error("Resource not ready: {0}")]
    ResourceNotReady(String),

    #[error("Import failed: {0}")]
    ImportFailure(String),

    #[error("{kind} index {index} out of range (len {len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Cannot export a merged lens with no components")]
    EmptyLens,

    #[error("Fields are stale; recompute before reading")]
    StaleFields,

    #[error("Invalid grid: {0}")]
    Grid(#[from] GridError),

    #[error("Compute backend error: {0}")]
    Compute(#[source] ComputeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ComputeError> for LensError {
    fn from(e: ComputeError) -> Self {
        match e {
            ComputeError::NotReady(msg) => LensError::ResourceNotReady(msg),
            other => LensError::Compute(other),
        }
    }
}

/// A deflecting mass distribution.
///
/// Positions and deflections are in radians. The derivatives are the
/// symmetric Jacobian $\partial\alpha_i/\partial\theta_j$, which is
/// dimensionless.
pub trait Deflector: Send + Sync {
    /// Deflection angle at `theta`.
    fn alpha(&self, theta: [f64; 2]) -> [f64; 2];

    /// Jacobian of the deflection at `theta`.
    fn derivatives(&self, theta: [f64; 2]) -> Derivatives;
}

/// Model identifiers, with the integer tags used by project files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelKind {
    Plummer = 1,
    Sis = 2,
    Nsis = 3,
    Sie = 4,
    Nsie = 5,
    MassSheet = 6,
    Import = 7,
}

impl ModelKind {
    pub const ALL: [ModelKind; 7] = [
        ModelKind::Plummer,
        ModelKind::Sis,
        ModelKind::Nsis,
        ModelKind::Sie,
        ModelKind::Nsie,
        ModelKind::MassSheet,
        ModelKind::Import,
    ];

    /// Integer tag used in project files.
    pub fn tag(self) -> i64 {
        self as i64
    }

    /// Look up a model by its integer tag.
    pub fn from_tag(tag: i64) -> Result<Self, LensError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| LensError::UnknownModel(format!("tag {}", tag)))
    }

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Plummer => "plummer",
            ModelKind::Sis => "sis",
            ModelKind::Nsis => "nsis",
            ModelKind::Sie => "sie",
            ModelKind::Nsie => "nsie",
            ModelKind::MassSheet => "mass_sheet",
            ModelKind::Import => "import",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ModelKind::Plummer => "Plummer sphere (softened point mass)",
            ModelKind::Sis => "Singular isothermal sphere",
            ModelKind::Nsis => "Non-singular isothermal sphere",
            ModelKind::Sie => "Singular isothermal ellipsoid",
            ModelKind::Nsie => "Non-singular isothermal ellipsoid",
            ModelKind::MassSheet => "Uniform mass sheet",
            ModelKind::Import => "Merged lens loaded from file",
        }
    }

    /// Parameter keys this model requires, in project-file spelling.
    pub fn required_keys(self) -> &'static [&'static str] {
        match self {
            ModelKind::Plummer => &["mass", "angularWidth"],
            ModelKind::Sis => &["velocityDispersion"],
            ModelKind::Nsis => &["velocityDispersion", "angularCoreRadius"],
            ModelKind::Sie => &["velocityDispersion", "ellipticity"],
            ModelKind::Nsie => &["velocityDispersion", "ellipticity", "angularCoreRadius"],
            ModelKind::MassSheet => &["density"],
            ModelKind::Import => &["file"],
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = LensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalised.as_str() {
            "plummer" => Ok(ModelKind::Plummer),
            "sis" => Ok(ModelKind::Sis),
            "nsis" => Ok(ModelKind::Nsis),
            "sie" => Ok(ModelKind::Sie),
            "nsie" => Ok(ModelKind::Nsie),
            "mass_sheet" | "masssheet" => Ok(ModelKind::MassSheet),
            "import" => Ok(ModelKind::Import),
            _ => Err(LensError::UnknownModel(s.to_string())),
        }
    }
}

/// A lens model ready for evaluation, with all parameters in SI and radians.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LensModel {
    Plummer(PlummerLens),
    Sis(IsothermalSphere),
    Nsis(IsothermalSphere),
    Sie(IsothermalEllipsoid),
    Nsie(IsothermalEllipsoid),
    MassSheet(MassSheetLens),
    Imported(Arc<CompositeLens>),
}

impl LensModel {
    /// Build a model from physical parameters at lens distance `d_d` (Mpc).
    ///
    /// Import parameters resolve against `imports`; a file that has not been
    /// loaded yet yields [`LensError::ResourceNotReady`].
    pub fn build(params: &LensParams, d_d: f64, imports: &ImportRegistry) -> Result<Self, LensError> {
        params.validate()?;
        let d_d_m = mpc_to_m(d_d);

        let model = match params {
            LensParams::Plummer {
                mass,
                angular_width,
            } => LensModel::Plummer(PlummerLens::new(
                mass * SOLAR_MASS,
                arcsec_to_rad(*angular_width),
                d_d_m,
            )),
            LensParams::Sis {
                velocity_dispersion,
            } => LensModel::Sis(IsothermalSphere::new(kms_to_ms(*velocity_dispersion), 0.0)),
            LensParams::Nsis {
                velocity_dispersion,
                angular_core_radius,
            } => LensModel::Nsis(IsothermalSphere::new(
                kms_to_ms(*velocity_dispersion),
                arcsec_to_rad(*angular_core_radius),
            )),
            LensParams::Sie {
                velocity_dispersion,
                ellipticity,
            } => LensModel::Sie(IsothermalEllipsoid::new(
                kms_to_ms(*velocity_dispersion),
                *ellipticity,
                0.0,
            )),
            LensParams::Nsie {
                velocity_dispersion,
                ellipticity,
                angular_core_radius,
            } => LensModel::Nsie(IsothermalEllipsoid::new(
                kms_to_ms(*velocity_dispersion),
                *ellipticity,
                arcsec_to_rad(*angular_core_radius),
            )),
            LensParams::MassSheet { density } => {
                LensModel::MassSheet(MassSheetLens::new(*density, d_d_m))
            }
            LensParams::Import { file } => LensModel::Imported(imports.get(file)?),
        };
        Ok(model)
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            LensModel::Plummer(_) => ModelKind::Plummer,
            LensModel::Sis(_) => ModelKind::Sis,
            LensModel::Nsis(_) => ModelKind::Nsis,
            LensModel::Sie(_) => ModelKind::Sie,
            LensModel::Nsie(_) => ModelKind::Nsie,
            LensModel::MassSheet(_) => ModelKind::MassSheet,
            LensModel::Imported(_) => ModelKind::Import,
        }
    }
}

impl Deflector for LensModel {
    fn alpha(&self, theta: [f64; 2]) -> [f64; 2] {
        match self {
            LensModel::Plummer(m) => m.alpha(theta),
            LensModel::Sis(m) | LensModel::Nsis(m) => m.alpha(theta),
            LensModel::Sie(m) | LensModel::Nsie(m) => m.alpha(theta),
            LensModel::MassSheet(m) => m.alpha(theta),
            LensModel::Imported(m) => m.alpha(theta),
        }
    }

    fn derivatives(&self, theta: [f64; 2]) -> Derivatives {
        match self {
            LensModel::Plummer(m) => m.derivatives(theta),
            LensModel::Sis(m) | LensModel::Nsis(m) => m.derivatives(theta),
            LensModel::Sie(m) | LensModel::Nsie(m) => m.derivatives(theta),
            LensModel::MassSheet(m) => m.derivatives(theta),
            LensModel::Imported(m) => m.derivatives(theta),
        }
    }
}

/// Central finite-difference Jacobian, used to check the analytic derivatives.
#[cfg(test)]
pub(crate) fn numeric_derivatives<D: Deflector + ?Sized>(lens: &D, theta: [f64; 2], h: f64) -> Derivatives {
    let ax_p = lens.alpha([theta[0] + h, theta[1]]);
    let ax_m = lens.alpha([theta[0] - h, theta[1]]);
    let ay_p = lens.alpha([theta[0], theta[1] + h]);
    let ay_m = lens.alpha([theta[0], theta[1] - h]);
    Derivatives {
        xx: (ax_p[0] - ax_m[0]) / (2.0 * h),
        yy: (ay_p[1] - ay_m[1]) / (2.0 * h),
        xy: (ay_p[0] - ay_m[0]) / (2.0 * h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tags_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::from_tag(kind.tag()).unwrap(), kind);
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_model() {
        assert!(matches!(ModelKind::from_tag(0), Err(LensError::UnknownModel(_))));
        assert!(matches!(ModelKind::from_tag(42), Err(LensError::UnknownModel(_))));
        assert!(matches!("nfw".parse::<ModelKind>(), Err(LensError::UnknownModel(_))));
        assert_eq!("Mass-Sheet".parse::<ModelKind>().unwrap(), ModelKind::MassSheet);
    }

    #[test]
    fn test_build_each_parametric_model() {
        let imports = ImportRegistry::default();
        let cases = [
            (ModelKind::Plummer, json!({"mass": 1e14, "angularWidth": 5.0})),
            (ModelKind::Sis, json!({"velocityDispersion": 200.0})),
            (ModelKind::Nsis, json!({"velocityDispersion": 200.0, "angularCoreRadius": 1.0})),
            (ModelKind::Sie, json!({"velocityDispersion": 200.0, "ellipticity": 0.3})),
            (
                ModelKind::Nsie,
                json!({"velocityDispersion": 200.0, "ellipticity": 0.3, "angularCoreRadius": 1.0}),
            ),
            (ModelKind::MassSheet, json!({"density": 2.5})),
        ];
        for (kind, value) in cases {
            let map = value.as_object().unwrap().clone();
            let params = LensParams::from_map(kind, &map).unwrap();
            let model = LensModel::build(&params, 1259.0, &imports).unwrap();
            assert_eq!(model.kind(), kind);
            let a = model.alpha([1e-5, 2e-5]);
            assert!(a[0].is_finite() && a[1].is_finite());
        }
    }

    #[test]
    fn test_unloaded_import_is_not_ready() {
        let imports = ImportRegistry::default();
        let params = LensParams::Import {
            file: "missing.json".into(),
        };
        let err = LensModel::build(&params, 1000.0, &imports).unwrap_err();
        assert!(matches!(err, LensError::ResourceNotReady(_)));
    }

    #[test]
    fn test_compute_not_ready_maps_to_resource_not_ready() {
        let err: LensError = ComputeError::NotReady("closed".into()).into();
        assert!(matches!(err, LensError::ResourceNotReady(_)));
    }
}
