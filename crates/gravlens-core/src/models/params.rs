//! Typed model parameters in user units.
//!
//! Project files and job configs describe a model as an integer tag (or a
//! name) plus a string-keyed map. [`LensParams::from_map`] is the only route
//! from that dynamic form to the typed one, and it requires exactly the keys
//! the model declares.

use std::path::PathBuf;

use serde_json::{Map, Value};

use super::{LensError, ModelKind};

/// Dynamic parameter map as it appears in project files.
pub type ParamMap = Map<String, Value>;

/// Physical parameters for one lens component.
///
/// Units: mass in solar masses, angles in arcseconds, velocity dispersion in
/// km/s, surface density in kg/m². Ellipticity is `1 - q` for axis ratio `q`.
#[derive(Debug, Clone, PartialEq)]
pub enum LensParams {
    Plummer {
        mass: f64,
        angular_width: f64,
    },
    Sis {
        velocity_dispersion: f64,
    },
    Nsis {
        velocity_dispersion: f64,
        angular_core_radius: f64,
    },
    Sie {
        velocity_dispersion: f64,
        ellipticity: f64,
    },
    Nsie {
        velocity_dispersion: f64,
        ellipticity: f64,
        angular_core_radius: f64,
    },
    MassSheet {
        density: f64,
    },
    Import {
        file: PathBuf,
    },
}

impl LensParams {
    pub fn kind(&self) -> ModelKind {
        match self {
            LensParams::Plummer { .. } => ModelKind::Plummer,
            LensParams::Sis { .. } => ModelKind::Sis,
            LensParams::Nsis { .. } => ModelKind::Nsis,
            LensParams::Sie { .. } => ModelKind::Sie,
            LensParams::Nsie { .. } => ModelKind::Nsie,
            LensParams::MassSheet { .. } => ModelKind::MassSheet,
            LensParams::Import { .. } => ModelKind::Import,
        }
    }

    /// Parse a parameter map for `kind`, then validate the values.
    ///
    /// Missing keys, keys the model does not take, and values of the wrong
    /// type are all [`LensError::InvalidParameters`].
    pub fn from_map(kind: ModelKind, map: &ParamMap) -> Result<Self, LensError> {
        let model = kind.name();
        let required = kind.required_keys();

        if let Some(extra) = map.keys().find(|k| !required.contains(&k.as_str())) {
            return Err(LensError::InvalidParameters {
                model,
                reason: format!("unexpected key '{}'", extra),
            });
        }

        let number = |key: &str| -> Result<f64, LensError> {
            let value = map.get(key).ok_or_else(|| LensError::InvalidParameters {
                model,
                reason: format!("missing key '{}'", key),
            })?;
            value.as_f64().ok_or_else(|| LensError::InvalidParameters {
                model,
                reason: format!("'{}' must be a number, got {}", key, value),
            })
        };

        let params = match kind {
            ModelKind::Plummer => LensParams::Plummer {
                mass: number("mass")?,
                angular_width: number("angularWidth")?,
            },
            ModelKind::Sis => LensParams::Sis {
                velocity_dispersion: number("velocityDispersion")?,
            },
            ModelKind::Nsis => LensParams::Nsis {
                velocity_dispersion: number("velocityDispersion")?,
                angular_core_radius: number("angularCoreRadius")?,
            },
            ModelKind::Sie => LensParams::Sie {
                velocity_dispersion: number("velocityDispersion")?,
                ellipticity: number("ellipticity")?,
            },
            ModelKind::Nsie => LensParams::Nsie {
                velocity_dispersion: number("velocityDispersion")?,
                ellipticity: number("ellipticity")?,
                angular_core_radius: number("angularCoreRadius")?,
            },
            ModelKind::MassSheet => LensParams::MassSheet {
                density: number("density")?,
            },
            ModelKind::Import => {
                let file = map
                    .get("file")
                    .ok_or_else(|| LensError::InvalidParameters {
                        model,
                        reason: "missing key 'file'".into(),
                    })?
                    .as_str()
                    .ok_or_else(|| LensError::InvalidParameters {
                        model,
                        reason: "'file' must be a string path".into(),
                    })?;
                LensParams::Import { file: file.into() }
            }
        };

        params.validate()?;
        Ok(params)
    }

    /// Convert back to the project-file map form.
    pub fn to_map(&self) -> ParamMap {
        let mut map = ParamMap::new();
        let mut put = |key: &str, v: f64| {
            map.insert(key.to_string(), Value::from(v));
        };
        match self {
            LensParams::Plummer {
                mass,
                angular_width,
            } => {
                put("mass", *mass);
                put("angularWidth", *angular_width);
            }
            LensParams::Sis {
                velocity_dispersion,
            } => put("velocityDispersion", *velocity_dispersion),
            LensParams::Nsis {
                velocity_dispersion,
                angular_core_radius,
            } => {
                put("velocityDispersion", *velocity_dispersion);
                put("angularCoreRadius", *angular_core_radius);
            }
            LensParams::Sie {
                velocity_dispersion,
                ellipticity,
            } => {
                put("velocityDispersion", *velocity_dispersion);
                put("ellipticity", *ellipticity);
            }
            LensParams::Nsie {
                velocity_dispersion,
                ellipticity,
                angular_core_radius,
            } => {
                put("velocityDispersion", *velocity_dispersion);
                put("ellipticity", *ellipticity);
                put("angularCoreRadius", *angular_core_radius);
            }
            LensParams::MassSheet { density } => put("density", *density),
            LensParams::Import { file } => {
                map.insert(
                    "file".to_string(),
                    Value::from(file.to_string_lossy().into_owned()),
                );
            }
        }
        map
    }

    /// Reject values that leave the model undefined.
    pub fn validate(&self) -> Result<(), LensError> {
        let model = self.kind().name();
        let invalid = |reason: String| LensError::InvalidParameters { model, reason };
        let finite = |key: &str, v: f64| -> Result<(), LensError> {
            if v.is_finite() {
                Ok(())
            } else {
                Err(invalid(format!("'{}' must be finite, got {}", key, v)))
            }
        };
        let non_negative = |key: &str, v: f64| -> Result<(), LensError> {
            finite(key, v)?;
            if v >= 0.0 {
                Ok(())
            } else {
                Err(invalid(format!("'{}' must be non-negative, got {}", key, v)))
            }
        };
        let ellipticity_in_range = |v: f64| -> Result<(), LensError> {
            finite("ellipticity", v)?;
            if (0.0..1.0).contains(&v) {
                Ok(())
            } else {
                Err(invalid(format!("'ellipticity' must lie in [0, 1), got {}", v)))
            }
        };

        match self {
            LensParams::Plummer {
                mass,
                angular_width,
            } => {
                finite("mass", *mass)?;
                non_negative("angularWidth", *angular_width)
            }
            LensParams::Sis {
                velocity_dispersion,
            } => finite("velocityDispersion", *velocity_dispersion),
            LensParams::Nsis {
                velocity_dispersion,
                angular_core_radius,
            } => {
                finite("velocityDispersion", *velocity_dispersion)?;
                non_negative("angularCoreRadius", *angular_core_radius)
            }
            LensParams::Sie {
                velocity_dispersion,
                ellipticity,
            } => {
                finite("velocityDispersion", *velocity_dispersion)?;
                ellipticity_in_range(*ellipticity)
            }
            LensParams::Nsie {
                velocity_dispersion,
                ellipticity,
                angular_core_radius,
            } => {
                finite("velocityDispersion", *velocity_dispersion)?;
                ellipticity_in_range(*ellipticity)?;
                non_negative("angularCoreRadius", *angular_core_radius)
            }
            LensParams::MassSheet { density } => finite("density", *density),
            LensParams::Import { file } => {
                if file.as_os_str().is_empty() {
                    Err(invalid("'file' must not be empty".into()))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ParamMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_sis_requires_dispersion() {
        let err = LensParams::from_map(ModelKind::Sis, &map(json!({}))).unwrap_err();
        assert!(matches!(err, LensError::InvalidParameters { model: "sis", .. }));

        let ok = LensParams::from_map(ModelKind::Sis, &map(json!({"velocityDispersion": 150})));
        assert_eq!(
            ok.unwrap(),
            LensParams::Sis {
                velocity_dispersion: 150.0
            }
        );
    }

    #[test]
    fn test_extra_key_rejected() {
        let err = LensParams::from_map(
            ModelKind::Sis,
            &map(json!({"velocityDispersion": 150, "ellipticity": 0.2})),
        )
        .unwrap_err();
        match err {
            LensError::InvalidParameters { reason, .. } => assert!(reason.contains("ellipticity")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_rejected() {
        let err = LensParams::from_map(
            ModelKind::MassSheet,
            &map(json!({"density": "heavy"})),
        )
        .unwrap_err();
        assert!(matches!(err, LensError::InvalidParameters { .. }));
    }

    #[test]
    fn test_value_ranges() {
        let sie = |e: f64| {
            LensParams::Sie {
                velocity_dispersion: 200.0,
                ellipticity: e,
            }
            .validate()
        };
        assert!(sie(0.0).is_ok());
        assert!(sie(0.99).is_ok());
        assert!(sie(1.0).is_err());
        assert!(sie(-0.1).is_err());

        let plummer = LensParams::Plummer {
            mass: -1e12,
            angular_width: 0.0,
        };
        assert!(plummer.validate().is_ok());
        let plummer = LensParams::Plummer {
            mass: 1e12,
            angular_width: -1.0,
        };
        assert!(plummer.validate().is_err());
        let sheet = LensParams::MassSheet { density: f64::NAN };
        assert!(sheet.validate().is_err());
    }

    #[test]
    fn test_map_round_trip() {
        let params = LensParams::Nsie {
            velocity_dispersion: 220.0,
            ellipticity: 0.25,
            angular_core_radius: 0.5,
        };
        let back = LensParams::from_map(ModelKind::Nsie, &params.to_map()).unwrap();
        assert_eq!(back, params);

        let import = LensParams::Import {
            file: "cluster.json".into(),
        };
        let back = LensParams::from_map(ModelKind::Import, &import.to_map()).unwrap();
        assert_eq!(back, import);
    }
}
