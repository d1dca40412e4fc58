//! Loaded merged-lens handles.
//!
//! Import components refer to merged-lens files by path. A file must be loaded
//! into the [`ImportRegistry`] before any component that names it can be
//! built; until then the component reports [`LensError::ResourceNotReady`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use futures_intrusive::channel::shared::oneshot_channel;

use crate::composite::CompositeLens;
use crate::models::LensError;

/// Merged lenses keyed by the path they were loaded from.
#[derive(Debug, Clone, Default)]
pub struct ImportRegistry {
    loaded: BTreeMap<PathBuf, Arc<CompositeLens>>,
}

impl ImportRegistry {
    /// Load `path` synchronously and register it, replacing any earlier copy.
    pub fn load(&mut self, path: &Path) -> Result<Arc<CompositeLens>, LensError> {
        let lens = Arc::new(CompositeLens::load_merged(path)?);
        self.insert(path.to_path_buf(), Arc::clone(&lens));
        Ok(lens)
    }

    /// Register an already-loaded merged lens under `path`.
    pub fn insert(&mut self, path: PathBuf, lens: Arc<CompositeLens>) {
        self.loaded.insert(path, lens);
    }

    /// Handle for a loaded file.
    pub fn get(&self, path: &Path) -> Result<Arc<CompositeLens>, LensError> {
        self.loaded.get(path).cloned().ok_or_else(|| {
            LensError::ResourceNotReady(format!("import '{}' has not been loaded", path.display()))
        })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.loaded.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.loaded.keys().map(PathBuf::as_path)
    }
}

/// Read a merged-lens file on a worker thread.
pub async fn load_merged_async(path: PathBuf) -> Result<CompositeLens, LensError> {
    let (sender, receiver) = oneshot_channel();
    let display = path.display().to_string();
    thread::Builder::new()
        .name("gravlens-import".into())
        .spawn(move || {
            // The receiver only goes away if the caller stopped waiting.
            let _ = sender.send(CompositeLens::load_merged(&path));
        })?;

    receiver.receive().await.ok_or_else(|| {
        LensError::ImportFailure(format!("{}: loader thread exited without a result", display))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LensParams;
    use crate::types::LensComponent;

    fn write_merged(dir: &Path) -> PathBuf {
        let path = dir.join("merged.json");
        let component = LensComponent::new(LensParams::Sis {
            velocity_dispersion: 180.0,
        });
        CompositeLens::from_components(&[component], 1000.0, &ImportRegistry::default())
            .unwrap()
            .save_merged(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_get_before_load_is_not_ready() {
        let registry = ImportRegistry::default();
        assert!(matches!(
            registry.get(Path::new("nowhere.json")),
            Err(LensError::ResourceNotReady(_))
        ));
    }

    #[test]
    fn test_load_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_merged(dir.path());
        let mut registry = ImportRegistry::default();
        registry.load(&path).unwrap();
        assert!(registry.contains(&path));
        assert_eq!(registry.get(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_async_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_merged(dir.path());
        let lens = pollster::block_on(load_merged_async(path)).unwrap();
        assert_eq!(lens.len(), 1);

        let missing = pollster::block_on(load_merged_async(dir.path().join("missing.json")));
        assert!(matches!(missing, Err(LensError::ImportFailure(_))));
    }
}
