//! Superposition of placed lens models.
//!
//! Each component is evaluated in its own frame:
//!
//! ```text
//! θ_local = R(-φ) (θ - t)
//! α      += s R(φ) α_i(θ_local)
//! J      += s R(φ) J_i(θ_local) R(φ)ᵀ
//! ```
//!
//! A composite is also the on-disk *merged lens* format: serialized together
//! with the lens distance it was built at, it can be loaded back and placed as
//! a single component of another plane.

use std::fs;
use std::path::Path;

use gravlens_geometry::Placement;
use serde::{Deserialize, Serialize};

use crate::imports::ImportRegistry;
use crate::models::{Deflector, LensError, LensModel};
use crate::types::{Derivatives, LensComponent};

/// `format` tag written into merged-lens files.
pub const MERGED_FORMAT: &str = "gravlens-merged-lens";
/// Current merged-lens file version.
pub const MERGED_VERSION: u32 = 1;

/// A model with its strength and placement, evaluated in the global frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedLens {
    pub model: LensModel,
    pub strength: f64,
    pub placement: Placement,
}

impl PlacedLens {
    pub fn new(model: LensModel, strength: f64, placement: Placement) -> Self {
        Self {
            model,
            strength,
            placement,
        }
    }
}

impl Deflector for PlacedLens {
    fn alpha(&self, theta: [f64; 2]) -> [f64; 2] {
        let local = self.placement.to_local(theta);
        let a = self.placement.vector_to_global(self.model.alpha(local));
        [self.strength * a[0], self.strength * a[1]]
    }

    fn derivatives(&self, theta: [f64; 2]) -> Derivatives {
        let local = self.placement.to_local(theta);
        let j = self.model.derivatives(local).as_array();
        Derivatives::from_array(self.placement.tensor_to_global(j)) * self.strength
    }
}

/// Placed lenses sharing one lens distance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositeLens {
    /// Observer to lens distance the models were built at (Mpc).
    pub d_d: f64,
    pub lenses: Vec<PlacedLens>,
}

impl CompositeLens {
    /// Build every component at lens distance `d_d` (Mpc).
    pub fn from_components(
        components: &[LensComponent],
        d_d: f64,
        imports: &ImportRegistry,
    ) -> Result<Self, LensError> {
        let lenses = components
            .iter()
            .map(|c| -> Result<PlacedLens, LensError> {
                let model = LensModel::build(&c.params, d_d, imports)?;
                Ok(PlacedLens::new(model, c.strength, c.placement()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { d_d, lenses })
    }

    pub fn len(&self) -> usize {
        self.lenses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lenses.is_empty()
    }

    /// Write this composite as a merged-lens file.
    pub fn save_merged(&self, path: &Path) -> Result<(), LensError> {
        if self.is_empty() {
            return Err(LensError::EmptyLens);
        }
        let file = MergedLensFile {
            format: MERGED_FORMAT.to_string(),
            version: MERGED_VERSION,
            lens: self.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| LensError::ImportFailure(e.to_string()))?;
        fs::write(path, json)?;
        log::info!(
            "Saved merged lens with {} components to {}",
            self.len(),
            path.display()
        );
        Ok(())
    }

    /// Read a merged-lens file written by [`CompositeLens::save_merged`].
    pub fn load_merged(path: &Path) -> Result<Self, LensError> {
        let text = fs::read_to_string(path)
            .map_err(|e| LensError::ImportFailure(format!("{}: {}", path.display(), e)))?;
        let file: MergedLensFile = serde_json::from_str(&text)
            .map_err(|e| LensError::ImportFailure(format!("{}: {}", path.display(), e)))?;

        if file.format != MERGED_FORMAT {
            return Err(LensError::ImportFailure(format!(
                "{}: not a merged lens file (format '{}')",
                path.display(),
                file.format
            )));
        }
        if file.version != MERGED_VERSION {
            return Err(LensError::ImportFailure(format!(
                "{}: unsupported merged lens version {}",
                path.display(),
                file.version
            )));
        }
        if file.lens.is_empty() {
            return Err(LensError::ImportFailure(format!(
                "{}: merged lens has no components",
                path.display()
            )));
        }

        log::info!(
            "Loaded merged lens with {} components from {}",
            file.lens.len(),
            path.display()
        );
        Ok(file.lens)
    }
}

impl Deflector for CompositeLens {
    fn alpha(&self, theta: [f64; 2]) -> [f64; 2] {
        self.lenses.iter().fold([0.0, 0.0], |acc, lens| {
            let a = lens.alpha(theta);
            [acc[0] + a[0], acc[1] + a[1]]
        })
    }

    fn derivatives(&self, theta: [f64; 2]) -> Derivatives {
        self.lenses
            .iter()
            .fold(Derivatives::default(), |acc, lens| acc + lens.derivatives(theta))
    }
}

#[derive(Serialize, Deserialize)]
struct MergedLensFile {
    format: String,
    version: u32,
    lens: CompositeLens,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LensParams;
    use approx::assert_relative_eq;
    use gravlens_cosmology::units::arcsec_to_rad;

    fn sie() -> LensComponent {
        LensComponent::new(LensParams::Sie {
            velocity_dispersion: 220.0,
            ellipticity: 0.3,
        })
    }

    #[test]
    fn test_rotation_by_quarter_turn() {
        let imports = ImportRegistry::default();
        let plain = CompositeLens::from_components(&[sie()], 1200.0, &imports).unwrap();
        let turned =
            CompositeLens::from_components(&[sie().with_angle(90.0)], 1200.0, &imports).unwrap();

        let (x, y) = (arcsec_to_rad(1.5), arcsec_to_rad(-0.7));
        let a = plain.alpha([x, y]);
        // Rotating the lens by 90° maps (x, y) -> (-y, x), and the field with it.
        let b = turned.alpha([-y, x]);
        assert_relative_eq!(b[0], -a[1], max_relative = 1e-10);
        assert_relative_eq!(b[1], a[0], max_relative = 1e-10);

        let da = plain.derivatives([x, y]);
        let db = turned.derivatives([-y, x]);
        assert_relative_eq!(db.xx, da.yy, max_relative = 1e-10);
        assert_relative_eq!(db.yy, da.xx, max_relative = 1e-10);
        assert_relative_eq!(db.xy, -da.xy, max_relative = 1e-10);
    }

    #[test]
    fn test_translation_moves_centre() {
        let imports = ImportRegistry::default();
        let sis = LensComponent::new(LensParams::Sis {
            velocity_dispersion: 200.0,
        })
        .with_translation(2.0, -1.0);
        let lens = CompositeLens::from_components(&[sis], 1000.0, &imports).unwrap();
        let centre = [arcsec_to_rad(2.0), arcsec_to_rad(-1.0)];
        let a = lens.alpha(centre);
        assert!(a[0].abs() < 1e-20 && a[1].abs() < 1e-20);
    }

    #[test]
    fn test_strength_scales_linearly() {
        let imports = ImportRegistry::default();
        let one = CompositeLens::from_components(&[sie()], 1200.0, &imports).unwrap();
        let three =
            CompositeLens::from_components(&[sie().with_strength(3.0)], 1200.0, &imports).unwrap();
        let theta = [arcsec_to_rad(0.4), arcsec_to_rad(1.1)];
        assert_relative_eq!(three.alpha(theta)[0], 3.0 * one.alpha(theta)[0], max_relative = 1e-12);
        assert_relative_eq!(
            three.derivatives(theta).xy,
            3.0 * one.derivatives(theta).xy,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_empty_export_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = CompositeLens::default()
            .save_merged(&dir.path().join("empty.json"))
            .unwrap_err();
        assert!(matches!(err, LensError::EmptyLens));
    }

    #[test]
    fn test_wrong_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.json");
        fs::write(&path, r#"{"format": "something-else", "version": 1, "lens": {"d_d": 1.0, "lenses": []}}"#)
            .unwrap();
        assert!(matches!(
            CompositeLens::load_merged(&path),
            Err(LensError::ImportFailure(_))
        ));
        assert!(matches!(
            CompositeLens::load_merged(&dir.path().join("absent.json")),
            Err(LensError::ImportFailure(_))
        ));
    }
}
