//! Project files.
//!
//! A project stores the lens redshift and the ordered component list as JSON:
//!
//! ```json
//! { "redshift": 0.5,
//!   "lenses": [ { "model": 2, "strength": 1.0, "translationX": 0.0,
//!                 "translationY": 0.0, "angle": 0.0,
//!                 "params": { "velocityDispersion": 200.0 } } ] }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::{LensError, LensParams, ModelKind, ParamMap};
use crate::types::LensComponent;

fn default_strength() -> f64 {
    1.0
}

fn default_redshift() -> f64 {
    0.5
}

/// One component as stored in a project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    /// Integer model tag, see [`ModelKind`].
    pub model: i64,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub translation_x: f64,
    #[serde(default)]
    pub translation_y: f64,
    #[serde(default)]
    pub angle: f64,
    #[serde(default)]
    pub params: ParamMap,
}

impl ComponentRecord {
    pub fn from_component(component: &LensComponent) -> Self {
        Self {
            model: component.params.kind().tag(),
            strength: component.strength,
            translation_x: component.translation[0],
            translation_y: component.translation[1],
            angle: component.angle,
            params: component.params.to_map(),
        }
    }

    /// Resolve the tag and parameter map into a validated component.
    pub fn to_component(&self) -> Result<LensComponent, LensError> {
        let kind = ModelKind::from_tag(self.model)?;
        let params = LensParams::from_map(kind, &self.params)?;
        let component = LensComponent::new(params)
            .with_strength(self.strength)
            .with_translation(self.translation_x, self.translation_y)
            .with_angle(self.angle);
        component.validate()?;
        Ok(component)
    }
}

/// Serializable lens plane configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensPlaneConfig {
    #[serde(default = "default_redshift")]
    pub redshift: f64,
    #[serde(default)]
    pub lenses: Vec<ComponentRecord>,
}

impl Default for LensPlaneConfig {
    fn default() -> Self {
        Self {
            redshift: default_redshift(),
            lenses: Vec::new(),
        }
    }
}

impl LensPlaneConfig {
    /// Resolve every record, failing on the first invalid one.
    pub fn components(&self) -> Result<Vec<LensComponent>, LensError> {
        self.lenses.iter().map(ComponentRecord::to_component).collect()
    }

    pub fn to_json(&self) -> Result<String, LensError> {
        serde_json::to_string_pretty(self).map_err(|e| LensError::ImportFailure(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, LensError> {
        serde_json::from_str(text).map_err(|e| LensError::ImportFailure(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), LensError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, LensError> {
        let text = fs::read_to_string(path)
            .map_err(|e| LensError::ImportFailure(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
            .map_err(|e| LensError::ImportFailure(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = LensPlaneConfig::from_json(
            r#"{"redshift": 0.3, "lenses": [{"model": 2, "params": {"velocityDispersion": 150}}]}"#,
        )
        .unwrap();
        let record = &config.lenses[0];
        assert_eq!(record.strength, 1.0);
        assert_eq!(record.translation_x, 0.0);
        assert_eq!(record.angle, 0.0);

        let component = record.to_component().unwrap();
        assert_eq!(
            component.params,
            LensParams::Sis {
                velocity_dispersion: 150.0
            }
        );
    }

    #[test]
    fn test_camel_case_keys() {
        let record = ComponentRecord::from_component(
            &LensComponent::new(LensParams::MassSheet { density: 1.0 }).with_translation(1.0, 2.0),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["model"], 6);
        assert_eq!(json["translationX"], 1.0);
        assert_eq!(json["translationY"], 2.0);
        assert_eq!(json["params"]["density"], 1.0);
    }

    #[test]
    fn test_unknown_tag() {
        let record = ComponentRecord {
            model: 9,
            strength: 1.0,
            translation_x: 0.0,
            translation_y: 0.0,
            angle: 0.0,
            params: ParamMap::new(),
        };
        assert!(matches!(record.to_component(), Err(LensError::UnknownModel(_))));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            LensPlaneConfig::from_json("{ not json"),
            Err(LensError::ImportFailure(_))
        ));
    }
}
