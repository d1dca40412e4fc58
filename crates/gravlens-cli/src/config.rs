//! TOML configuration deserialisation for lensing jobs.

use std::path::PathBuf;

use gravlens_core::models::ParamMap;
use gravlens_cosmology::Cosmology;
use serde::Deserialize;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub grid: GridConfig,
    /// Distance model parameters; defaults to flat ΛCDM.
    #[serde(default)]
    pub cosmology: Cosmology,
    #[serde(default)]
    pub compute: ComputeConfig,
    pub lens: LensConfig,
    #[serde(default)]
    pub source: Vec<SourceConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Simulation grid from TOML.
#[derive(Debug, Deserialize)]
pub struct GridConfig {
    /// Pixels per side (default: 256).
    #[serde(default = "default_grid_size")]
    pub size: usize,
    /// Half-width of the simulated patch in arcsec (default: 60).
    #[serde(default = "default_angular_radius")]
    pub angular_radius: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: default_grid_size(),
            angular_radius: default_angular_radius(),
        }
    }
}

fn default_grid_size() -> usize {
    256
}
fn default_angular_radius() -> f64 {
    60.0
}

/// Compute backend settings.
#[derive(Debug, Default, Deserialize)]
pub struct ComputeConfig {
    /// Worker threads; all cores when absent.
    pub threads: Option<usize>,
}

/// Lens plane configuration.
#[derive(Debug, Deserialize)]
pub struct LensConfig {
    /// Lens redshift (default: 0.5).
    #[serde(default = "default_lens_redshift")]
    pub redshift: f64,
    /// Project file whose components are loaded before `component` entries.
    pub project: Option<PathBuf>,
    #[serde(default)]
    pub component: Vec<ComponentConfig>,
}

fn default_lens_redshift() -> f64 {
    0.5
}

/// A single lens component.
#[derive(Debug, Deserialize)]
pub struct ComponentConfig {
    /// Model name, e.g. "sis", "nsie", "mass_sheet" or "import".
    pub model: String,
    #[serde(default = "default_strength")]
    pub strength: f64,
    /// Offset in arcsec.
    #[serde(default)]
    pub translation: [f64; 2],
    /// Rotation in degrees.
    #[serde(default)]
    pub angle: f64,
    /// Model parameters, keyed as in project files.
    #[serde(default)]
    pub params: ParamMap,
}

fn default_strength() -> f64 {
    1.0
}

/// A source plane with its circular aperture.
#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    pub redshift: f64,
    /// Aperture centre in arcsec.
    #[serde(default)]
    pub origin: [f64; 2],
    /// Aperture radius in arcsec (default: 1).
    #[serde(default = "default_source_radius")]
    pub radius: f64,
}

fn default_source_radius() -> f64 {
    1.0
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Composite deflection as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_alpha: bool,
    /// Composite Jacobian as CSV (default: false).
    #[serde(default)]
    pub save_derivatives: bool,
    /// Determinant and magnification per source as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_q: bool,
    /// Critical pixels and caustic points per source as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_critical: bool,
    /// Image pixels per source as CSV (default: false).
    #[serde(default)]
    pub save_images: bool,
    /// Per-component fields as JSON (default: false).
    #[serde(default)]
    pub save_components: bool,
    /// Run summary as JSON (default: true).
    #[serde(default = "default_true")]
    pub save_summary: bool,
    /// Write the lens configuration as a project file (default: false).
    #[serde(default)]
    pub save_project: bool,
    /// Write the composite as a merged-lens file (default: false).
    #[serde(default)]
    pub export_merged: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_alpha: true,
            save_derivatives: false,
            save_q: true,
            save_critical: true,
            save_images: false,
            save_components: false,
            save_summary: true,
            save_project: false,
            export_merged: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: JobConfig = toml::from_str(&content)?;
    Ok(config)
}
