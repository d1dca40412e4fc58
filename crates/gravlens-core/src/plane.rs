//! Lens plane orchestration.
//!
//! A [`LensPlane`] owns everything needed to rasterise one lens: its
//! redshift, the placed components, the source planes behind it, the pixel
//! grid and the loaded merged-lens imports. It also holds the last published
//! fields.
//!
//! Every mutation bumps a generation counter, which leaves the published
//! fields [`FieldState::Stale`]. A recompute captures a [`RecomputeJob`]
//! stamped with the current generation, runs it on a compute backend and
//! publishes the result only if no mutation happened in between. Published
//! fields sit behind an `Arc` that is swapped whole, so readers never observe
//! a partial buffer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use gravlens_compute::{BackendGate, ComputeBackend};
use gravlens_cosmology::{Cosmology, DistanceModel};
use gravlens_geometry::PixelGrid;

use crate::composite::CompositeLens;
use crate::fields::{evaluate_components, ComponentFields, CriticalField, LensFields};
use crate::imports::{load_merged_async, ImportRegistry};
use crate::models::{LensError, LensModel, LensParams};
use crate::project::{ComponentRecord, LensPlaneConfig};
use crate::types::{validate_aperture, validate_redshift, LensComponent, SourcePlane};

/// Whether the published fields reflect the current plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    Stale,
    Fresh,
}

/// Fields published by one recompute.
#[derive(Debug, Clone)]
pub struct PlaneFields {
    /// Plane generation the fields were computed for.
    pub generation: u64,
    /// Observer to lens distance used (Mpc).
    pub d_d: f64,
    /// Composite deflection and Jacobian.
    pub lens: LensFields,
    /// Per-component deflections and Jacobians.
    pub components: ComponentFields,
    /// One determinant field per source plane, in source order.
    pub critical: Vec<CriticalField>,
}

/// Owned snapshot of a lens plane, ready to evaluate off the plane.
#[derive(Debug, Clone)]
pub struct RecomputeJob {
    generation: u64,
    d_d: f64,
    sources: Vec<SourcePlane>,
    composite: CompositeLens,
    grid: PixelGrid,
}

/// Output of [`RecomputeJob::run`], waiting to be published.
#[derive(Debug)]
pub struct RecomputeResult {
    d_d: f64,
    sources: Vec<SourcePlane>,
    fields: PlaneFields,
}

impl RecomputeResult {
    pub fn generation(&self) -> u64 {
        self.fields.generation
    }
}

impl RecomputeJob {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Rasterise the snapshot.
    pub fn run(self, backend: &dyn ComputeBackend) -> Result<RecomputeResult, LensError> {
        let start = Instant::now();
        let lens = LensFields::evaluate(backend, &self.composite, self.grid)?;
        let components = evaluate_components(backend, &self.composite, self.grid)?;
        let critical = self
            .sources
            .iter()
            .map(|s| CriticalField::new(&lens, s.distance_ratio()))
            .collect();

        log::debug!(
            "Generation {}: {} components on {}² pixels in {:.2?}",
            self.generation,
            self.composite.len(),
            self.grid.size,
            start.elapsed()
        );

        Ok(RecomputeResult {
            d_d: self.d_d,
            sources: self.sources,
            fields: PlaneFields {
                generation: self.generation,
                d_d: self.d_d,
                lens,
                components,
                critical,
            },
        })
    }
}

/// A lens plane with its components, source planes and published fields.
pub struct LensPlane {
    redshift: f64,
    d_d: f64,
    components: Vec<LensComponent>,
    sources: Vec<SourcePlane>,
    grid: PixelGrid,
    imports: ImportRegistry,
    distances: Arc<dyn DistanceModel>,
    generation: u64,
    fields: Option<Arc<PlaneFields>>,
}

impl Default for LensPlane {
    fn default() -> Self {
        Self::assemble(0.5, PixelGrid::default(), Arc::new(Cosmology::default()))
    }
}

impl std::fmt::Debug for LensPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LensPlane")
            .field("redshift", &self.redshift)
            .field("d_d", &self.d_d)
            .field("components", &self.components.len())
            .field("sources", &self.sources.len())
            .field("grid", &self.grid)
            .field("distances", &self.distances.name())
            .field("generation", &self.generation)
            .finish()
    }
}

impl LensPlane {
    /// A plane at `redshift` with the default ΛCDM distances.
    pub fn new(redshift: f64, grid: PixelGrid) -> Result<Self, LensError> {
        Self::with_distances(redshift, grid, Arc::new(Cosmology::default()))
    }

    pub fn with_distances(
        redshift: f64,
        grid: PixelGrid,
        distances: Arc<dyn DistanceModel>,
    ) -> Result<Self, LensError> {
        validate_redshift(redshift)?;
        grid.validate()?;
        Ok(Self::assemble(redshift, grid, distances))
    }

    fn assemble(redshift: f64, grid: PixelGrid, distances: Arc<dyn DistanceModel>) -> Self {
        Self {
            redshift,
            d_d: distances.observer_distance(redshift),
            components: Vec::new(),
            sources: Vec::new(),
            grid,
            imports: ImportRegistry::default(),
            distances,
            generation: 0,
            fields: None,
        }
    }

    // -- accessors --------------------------------------------------------

    pub fn redshift(&self) -> f64 {
        self.redshift
    }

    /// Observer to lens distance (Mpc).
    pub fn d_d(&self) -> f64 {
        self.d_d
    }

    pub fn components(&self) -> &[LensComponent] {
        &self.components
    }

    pub fn component(&self, index: usize) -> Result<&LensComponent, LensError> {
        let len = self.components.len();
        self.components.get(index).ok_or(LensError::IndexOutOfRange {
            kind: "component",
            index,
            len,
        })
    }

    pub fn sources(&self) -> &[SourcePlane] {
        &self.sources
    }

    pub fn source(&self, index: usize) -> Result<&SourcePlane, LensError> {
        let len = self.sources.len();
        self.sources.get(index).ok_or(LensError::IndexOutOfRange {
            kind: "source",
            index,
            len,
        })
    }

    pub fn grid(&self) -> PixelGrid {
        self.grid
    }

    pub fn imports(&self) -> &ImportRegistry {
        &self.imports
    }

    pub fn distances(&self) -> &dyn DistanceModel {
        self.distances.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> FieldState {
        match &self.fields {
            Some(f) if f.generation == self.generation => FieldState::Fresh,
            _ => FieldState::Stale,
        }
    }

    /// Last published fields and whether they are still current.
    pub fn fields(&self) -> Option<(Arc<PlaneFields>, FieldState)> {
        self.fields.as_ref().map(|f| (Arc::clone(f), self.state()))
    }

    /// Published fields, only if they reflect the current plane.
    pub fn fresh_fields(&self) -> Result<Arc<PlaneFields>, LensError> {
        match (&self.fields, self.state()) {
            (Some(f), FieldState::Fresh) => Ok(Arc::clone(f)),
            _ => Err(LensError::StaleFields),
        }
    }

    /// Build the composite for the current components.
    pub fn composite(&self) -> Result<CompositeLens, LensError> {
        CompositeLens::from_components(&self.components, self.d_d, &self.imports)
    }

    // -- lens mutations ---------------------------------------------------

    fn invalidate(&mut self) {
        self.generation += 1;
    }

    fn check_component(&self, component: &LensComponent) -> Result<(), LensError> {
        component.validate()?;
        LensModel::build(&component.params, self.d_d, &self.imports).map(|_| ())
    }

    fn component_mut(&mut self, index: usize) -> Result<&mut LensComponent, LensError> {
        let len = self.components.len();
        self.components.get_mut(index).ok_or(LensError::IndexOutOfRange {
            kind: "component",
            index,
            len,
        })
    }

    fn source_mut(&mut self, index: usize) -> Result<&mut SourcePlane, LensError> {
        let len = self.sources.len();
        self.sources.get_mut(index).ok_or(LensError::IndexOutOfRange {
            kind: "source",
            index,
            len,
        })
    }

    fn refresh_source(&self, source: &mut SourcePlane) {
        source.d_s = self.distances.observer_distance(source.redshift);
        source.d_ds = if source.redshift > self.redshift {
            self.distances
                .angular_diameter_distance(self.redshift, source.redshift)
        } else {
            0.0
        };
    }

    fn refresh_distances(&mut self) {
        self.d_d = self.distances.observer_distance(self.redshift);
        let mut sources = std::mem::take(&mut self.sources);
        for source in &mut sources {
            self.refresh_source(source);
        }
        self.sources = sources;
    }

    pub fn set_redshift(&mut self, redshift: f64) -> Result<(), LensError> {
        validate_redshift(redshift)?;
        self.redshift = redshift;
        self.refresh_distances();
        self.invalidate();
        Ok(())
    }

    pub fn set_grid(&mut self, grid: PixelGrid) -> Result<(), LensError> {
        grid.validate()?;
        self.grid = grid;
        self.invalidate();
        Ok(())
    }

    /// Swap the distance model and recompute every distance.
    pub fn set_distances(&mut self, distances: Arc<dyn DistanceModel>) {
        self.distances = distances;
        self.refresh_distances();
        self.invalidate();
    }

    /// Append a component and return its index.
    ///
    /// Import components require their file to be loaded first.
    pub fn add_component(&mut self, component: LensComponent) -> Result<usize, LensError> {
        self.check_component(&component)?;
        self.components.push(component);
        self.invalidate();
        Ok(self.components.len() - 1)
    }

    pub fn remove_component(&mut self, index: usize) -> Result<LensComponent, LensError> {
        self.component(index)?;
        let removed = self.components.remove(index);
        self.invalidate();
        Ok(removed)
    }

    pub fn set_params(&mut self, index: usize, params: LensParams) -> Result<(), LensError> {
        let mut updated = self.component(index)?.clone();
        updated.params = params;
        self.check_component(&updated)?;
        *self.component_mut(index)? = updated;
        self.invalidate();
        Ok(())
    }

    pub fn set_strength(&mut self, index: usize, strength: f64) -> Result<(), LensError> {
        let mut updated = self.component(index)?.clone();
        updated.strength = strength;
        updated.validate()?;
        *self.component_mut(index)? = updated;
        self.invalidate();
        Ok(())
    }

    /// Move and rotate a component: translation in arcsec, angle in degrees.
    pub fn set_placement(
        &mut self,
        index: usize,
        translation: [f64; 2],
        angle: f64,
    ) -> Result<(), LensError> {
        let mut updated = self.component(index)?.clone();
        updated.translation = translation;
        updated.angle = angle;
        updated.validate()?;
        *self.component_mut(index)? = updated;
        self.invalidate();
        Ok(())
    }

    // -- imports ----------------------------------------------------------

    /// Load a merged-lens file without adding a component for it.
    ///
    /// Reloading a file that components already use changes their
    /// deflection, so the plane goes stale.
    pub fn load_import(&mut self, path: &Path) -> Result<(), LensError> {
        let lens = CompositeLens::load_merged(path)?;
        self.register_import(path.to_path_buf(), Arc::new(lens));
        Ok(())
    }

    /// Load a merged-lens file and add it as a component.
    pub fn import_lens(&mut self, path: &Path) -> Result<usize, LensError> {
        let lens = CompositeLens::load_merged(path)?;
        self.commit_import(path.to_path_buf(), Arc::new(lens))
    }

    /// Like [`LensPlane::import_lens`], reading the file on a worker thread.
    pub async fn import_lens_async(&mut self, path: PathBuf) -> Result<usize, LensError> {
        let lens = load_merged_async(path.clone()).await?;
        self.commit_import(path, Arc::new(lens))
    }

    fn references_import(&self, path: &Path) -> bool {
        self.components
            .iter()
            .any(|c| matches!(&c.params, LensParams::Import { file } if file == path))
    }

    fn register_import(&mut self, path: PathBuf, lens: Arc<CompositeLens>) {
        let in_use = self.references_import(&path);
        self.imports.insert(path, lens);
        if in_use {
            self.invalidate();
        }
    }

    /// Add an import component for a freshly loaded lens. The registry is
    /// only touched once the component has been accepted.
    fn commit_import(&mut self, path: PathBuf, lens: Arc<CompositeLens>) -> Result<usize, LensError> {
        let component = LensComponent::new(LensParams::Import { file: path.clone() });
        let mut staged = self.imports.clone();
        staged.insert(path.clone(), Arc::clone(&lens));
        component.validate()?;
        LensModel::build(&component.params, self.d_d, &staged)?;

        self.register_import(path, lens);
        self.components.push(component);
        self.invalidate();
        Ok(self.components.len() - 1)
    }

    /// Write the current composite as a merged-lens file.
    pub fn export_merged(&self, path: &Path) -> Result<(), LensError> {
        self.composite()?.save_merged(path)
    }

    // -- sources ----------------------------------------------------------

    /// Add a source plane with a circular aperture (arcsec) and return its index.
    pub fn add_source(
        &mut self,
        redshift: f64,
        origin: [f64; 2],
        radius: f64,
    ) -> Result<usize, LensError> {
        validate_redshift(redshift)?;
        validate_aperture(radius)?;
        let mut source = SourcePlane::new(redshift, origin, radius);
        self.refresh_source(&mut source);
        if source.d_ds == 0.0 {
            log::warn!(
                "Source at z = {} is not behind the lens at z = {}",
                redshift,
                self.redshift
            );
        }
        self.sources.push(source);
        self.invalidate();
        Ok(self.sources.len() - 1)
    }

    pub fn remove_source(&mut self, index: usize) -> Result<SourcePlane, LensError> {
        self.source(index)?;
        let removed = self.sources.remove(index);
        self.invalidate();
        Ok(removed)
    }

    pub fn set_source_redshift(&mut self, index: usize, redshift: f64) -> Result<(), LensError> {
        validate_redshift(redshift)?;
        let mut updated = self.source(index)?.clone();
        updated.redshift = redshift;
        self.refresh_source(&mut updated);
        *self.source_mut(index)? = updated;
        self.invalidate();
        Ok(())
    }

    /// Move a source aperture. Fields stay fresh.
    pub fn move_source(&mut self, index: usize, origin: [f64; 2]) -> Result<(), LensError> {
        self.source_mut(index)?.origin = origin;
        Ok(())
    }

    /// Resize a source aperture. Fields stay fresh.
    pub fn set_source_radius(&mut self, index: usize, radius: f64) -> Result<(), LensError> {
        validate_aperture(radius)?;
        self.source_mut(index)?.radius = radius;
        Ok(())
    }

    // -- recompute --------------------------------------------------------

    /// Capture the current plane as an owned job.
    pub fn snapshot(&self) -> Result<RecomputeJob, LensError> {
        let d_d = self.distances.observer_distance(self.redshift);
        let mut sources = self.sources.clone();
        for source in &mut sources {
            self.refresh_source(source);
        }
        Ok(RecomputeJob {
            generation: self.generation,
            d_d,
            sources,
            composite: CompositeLens::from_components(&self.components, d_d, &self.imports)?,
            grid: self.grid,
        })
    }

    /// Publish a finished job. Results from a superseded generation are
    /// dropped and `false` is returned.
    pub fn publish(&mut self, result: RecomputeResult) -> bool {
        if result.generation() != self.generation {
            log::debug!(
                "Discarding fields for generation {} (current {})",
                result.generation(),
                self.generation
            );
            return false;
        }

        self.d_d = result.d_d;
        for (current, computed) in self.sources.iter_mut().zip(&result.sources) {
            current.d_s = computed.d_s;
            current.d_ds = computed.d_ds;
        }
        self.fields = Some(Arc::new(result.fields));
        true
    }

    fn recompute_on(&mut self, backend: &dyn ComputeBackend) -> Result<Arc<PlaneFields>, LensError> {
        let job = self.snapshot()?;
        let result = job.run(backend)?;
        self.publish(result);
        self.fresh_fields()
    }

    /// Recompute and publish the fields. Fails with
    /// [`LensError::ResourceNotReady`] if the gate has not opened.
    pub fn recompute(&mut self, gate: &BackendGate) -> Result<Arc<PlaneFields>, LensError> {
        let backend = gate.try_backend()?;
        self.recompute_on(backend.as_ref())
    }

    /// Wait for the gate to open, then recompute.
    pub async fn recompute_when_ready(
        &mut self,
        gate: &BackendGate,
    ) -> Result<Arc<PlaneFields>, LensError> {
        let backend = gate.backend().await?;
        self.recompute_on(backend.as_ref())
    }

    // -- project files ----------------------------------------------------

    pub fn to_config(&self) -> LensPlaneConfig {
        LensPlaneConfig {
            redshift: self.redshift,
            lenses: self
                .components
                .iter()
                .map(ComponentRecord::from_component)
                .collect(),
        }
    }

    /// Replace the redshift and components with `config`.
    ///
    /// Every record is validated and every referenced import is loaded before
    /// anything is committed, so a failure leaves the plane untouched. Source
    /// planes and the grid are kept.
    pub fn apply_config(&mut self, config: &LensPlaneConfig) -> Result<(), LensError> {
        validate_redshift(config.redshift)?;
        let components = config.components()?;

        let mut imports = self.imports.clone();
        for component in &components {
            if let LensParams::Import { file } = &component.params {
                if !imports.contains(file) {
                    imports.load(file)?;
                }
            }
        }

        let d_d = self.distances.observer_distance(config.redshift);
        CompositeLens::from_components(&components, d_d, &imports)?;

        self.redshift = config.redshift;
        self.components = components;
        self.imports = imports;
        self.refresh_distances();
        self.invalidate();
        Ok(())
    }

    pub fn save_project(&self, path: &Path) -> Result<(), LensError> {
        self.to_config().save(path)?;
        log::info!(
            "Saved project with {} components to {}",
            self.components.len(),
            path.display()
        );
        Ok(())
    }

    pub fn open_project(&mut self, path: &Path) -> Result<(), LensError> {
        let config = LensPlaneConfig::load(path)?;
        self.apply_config(&config)?;
        log::info!(
            "Opened project with {} components from {}",
            self.components.len(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gravlens_compute::CpuBackend;

    fn gate() -> BackendGate {
        BackendGate::ready(Arc::new(CpuBackend::with_threads(2).unwrap()))
    }

    fn plane() -> LensPlane {
        LensPlane::new(0.5, PixelGrid::new(16, 5.0).unwrap()).unwrap()
    }

    fn sis(sigma: f64) -> LensComponent {
        LensComponent::new(LensParams::Sis {
            velocity_dispersion: sigma,
        })
    }

    #[test]
    fn test_new_plane_is_stale() {
        let plane = plane();
        assert_eq!(plane.state(), FieldState::Stale);
        assert!(plane.fields().is_none());
        assert!(matches!(plane.fresh_fields(), Err(LensError::StaleFields)));
    }

    #[test]
    fn test_recompute_then_mutate() {
        let gate = gate();
        let mut plane = plane();
        plane.add_component(sis(200.0)).unwrap();
        plane.add_source(2.0, [0.0, 0.0], 0.5).unwrap();

        let fields = plane.recompute(&gate).unwrap();
        assert_eq!(plane.state(), FieldState::Fresh);
        assert_eq!(fields.critical.len(), 1);
        assert_eq!(fields.components.len(), 1);

        plane.set_strength(0, 2.0).unwrap();
        assert_eq!(plane.state(), FieldState::Stale);
        let (old, state) = plane.fields().unwrap();
        assert_eq!(state, FieldState::Stale);
        assert_eq!(old.generation, fields.generation);
    }

    #[test]
    fn test_aperture_changes_keep_fields_fresh() {
        let gate = gate();
        let mut plane = plane();
        plane.add_component(sis(200.0)).unwrap();
        plane.add_source(2.0, [0.0, 0.0], 0.5).unwrap();
        plane.recompute(&gate).unwrap();

        plane.move_source(0, [1.0, 1.0]).unwrap();
        plane.set_source_radius(0, 2.0).unwrap();
        assert_eq!(plane.state(), FieldState::Fresh);

        plane.set_source_redshift(0, 1.5).unwrap();
        assert_eq!(plane.state(), FieldState::Stale);
    }

    #[test]
    fn test_stale_generation_not_published() {
        let gate = gate();
        let backend = gate.try_backend().unwrap();
        let mut plane = plane();
        plane.add_component(sis(200.0)).unwrap();

        let job = plane.snapshot().unwrap();
        plane.set_redshift(0.6).unwrap();
        let result = job.run(backend.as_ref()).unwrap();
        assert!(!plane.publish(result));
        assert!(plane.fields().is_none());

        let job = plane.snapshot().unwrap();
        let result = job.run(backend.as_ref()).unwrap();
        assert!(plane.publish(result));
        assert_eq!(plane.state(), FieldState::Fresh);
    }

    #[test]
    fn test_closed_gate_rejects_recompute() {
        let gate = BackendGate::new();
        let mut plane = plane();
        assert!(matches!(
            plane.recompute(&gate),
            Err(LensError::ResourceNotReady(_))
        ));
    }

    #[test]
    fn test_redshift_updates_distances() {
        let mut plane = plane();
        plane.add_source(2.0, [0.0, 0.0], 1.0).unwrap();
        let before = plane.source(0).unwrap().d_ds;
        let d_d_before = plane.d_d();

        plane.set_redshift(1.0).unwrap();
        assert!(plane.d_d() > d_d_before);
        assert!(plane.source(0).unwrap().d_ds < before);

        plane.set_redshift(3.0).unwrap();
        assert_eq!(plane.source(0).unwrap().d_ds, 0.0);
        assert!(matches!(plane.set_redshift(-1.0), Err(LensError::InvalidRedshift(_))));
        assert_eq!(plane.redshift(), 3.0);
    }

    #[test]
    fn test_index_errors() {
        let mut plane = plane();
        assert!(matches!(
            plane.remove_component(0),
            Err(LensError::IndexOutOfRange { kind: "component", index: 0, len: 0 })
        ));
        assert!(matches!(
            plane.set_source_redshift(3, 1.0),
            Err(LensError::IndexOutOfRange { kind: "source", .. })
        ));
    }

    #[test]
    fn test_import_requires_loaded_file() {
        let mut plane = plane();
        let generation = plane.generation();
        let err = plane
            .add_component(LensComponent::new(LensParams::Import {
                file: "not-loaded.json".into(),
            }))
            .unwrap_err();
        assert!(matches!(err, LensError::ResourceNotReady(_)));
        assert!(plane.components().is_empty());
        assert_eq!(plane.generation(), generation);
    }

    #[test]
    fn test_invalid_params_leave_component_untouched() {
        let mut plane = plane();
        plane.add_component(sis(200.0)).unwrap();
        let err = plane.set_params(
            0,
            LensParams::Sie {
                velocity_dispersion: 200.0,
                ellipticity: 1.5,
            },
        );
        assert!(matches!(err, Err(LensError::InvalidParameters { .. })));
        assert_eq!(plane.component(0).unwrap(), &sis(200.0));
    }
}
