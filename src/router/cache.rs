// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Sound-bank resource cache.
//!
//! Each distinct sound-bank file is loaded into the engine at most
//! once. Entries persist for the process lifetime so bank switches and
//! reloads never pay load latency again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::RouterError;
use crate::engine::{Engine, FontHandle, Preset};

/// One loaded sound-bank file: its canonical path, engine handle, and
/// preset table.
pub struct SoundBankResource {
    path: PathBuf,
    handle: FontHandle,
    presets: Vec<Preset>,
}

impl SoundBankResource {
    /// Returns the canonical path of the sound-bank file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the engine handle of the loaded sound bank.
    pub fn handle(&self) -> FontHandle {
        self.handle
    }

    /// Returns the preset table in file order.
    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    /// Looks up the name of the preset with the given bank and program
    /// numbers.
    pub fn preset_name(&self, bank: u16, program: u8) -> Option<&str> {
        self.presets
            .iter()
            .find(|preset| preset.bank == bank && preset.preset == program)
            .map(|preset| preset.name.as_str())
    }
}

/// Cache of loaded sound-bank resources, keyed by canonical path.
pub struct ResourceCache {
    engine: Arc<dyn Engine>,
    resources: HashMap<PathBuf, Arc<SoundBankResource>>,
}

impl ResourceCache {
    /// Creates a new cache loading through the given engine.
    pub fn new(engine: Arc<dyn Engine>) -> ResourceCache {
        ResourceCache {
            engine,
            resources: HashMap::new(),
        }
    }

    /// Ensures the referenced sound bank is loaded, returning its
    /// resource. Subsequent calls for the same resolved path return the
    /// cached resource without touching the engine or the file.
    pub fn ensure_loaded(
        &mut self,
        file: &str,
        base_dir: Option<&Path>,
    ) -> Result<Arc<SoundBankResource>, RouterError> {
        let path = resolve(file, base_dir)?;

        if let Some(resource) = self.resources.get(&path) {
            debug!(path = %path.display(), "Using cached sound bank.");
            return Ok(resource.clone());
        }

        let (handle, presets) = self.engine.load(&path)?;
        info!(
            path = %path.display(),
            presets = presets.len(),
            "Sound bank cached."
        );

        let resource = Arc::new(SoundBankResource {
            path: path.clone(),
            handle,
            presets,
        });
        self.resources.insert(path, resource.clone());
        Ok(resource)
    }

    /// Returns the cached resource for a file reference, if loaded.
    pub fn get(&self, file: &str, base_dir: Option<&Path>) -> Option<Arc<SoundBankResource>> {
        let path = resolve(file, base_dir).ok()?;
        self.resources.get(&path).cloned()
    }

    /// Returns the cached preset table for a file reference. An unknown
    /// or failed resource yields an empty list; this never raises.
    pub fn presets_for(&self, file: &str, base_dir: Option<&Path>) -> Vec<Preset> {
        self.get(file, base_dir)
            .map(|resource| resource.presets().to_vec())
            .unwrap_or_default()
    }
}

/// Resolves a sound-bank file reference to a canonical path. Relative
/// references are tried against the per-instrument base directory and
/// then the process working directory.
fn resolve(file: &str, base_dir: Option<&Path>) -> Result<PathBuf, RouterError> {
    let reference = Path::new(file);

    let mut candidates: Vec<PathBuf> = Vec::new();
    if reference.is_absolute() {
        candidates.push(reference.to_path_buf());
    } else {
        if let Some(base_dir) = base_dir {
            candidates.push(base_dir.join(reference));
        }
        candidates.push(reference.to_path_buf());
    }

    for candidate in candidates {
        if candidate.exists() {
            // Canonicalize so the same file reached through different
            // references keys a single cache entry.
            return candidate
                .canonicalize()
                .map_err(|_| RouterError::ResourceNotFound(candidate));
        }
    }

    Err(RouterError::ResourceNotFound(reference.to_path_buf()))
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::sync::Arc;

    use crate::engine::{mock, Preset};

    use super::ResourceCache;
    use crate::router::RouterError;

    #[test]
    fn test_loads_each_path_once() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        fs::write(dir.path().join("piano.sf2"), b"sf2").expect("write failed");

        let engine = mock::Engine::get();
        let mut cache = ResourceCache::new(Arc::new(engine.clone()));

        let first = cache
            .ensure_loaded("piano.sf2", Some(dir.path()))
            .expect("load failed");
        let second = cache
            .ensure_loaded("piano.sf2", Some(dir.path()))
            .expect("load failed");

        assert_eq!(1, engine.load_count());
        assert_eq!(first.handle(), second.handle());

        // The absolute reference resolves to the same cache entry.
        let absolute = dir.path().join("piano.sf2");
        cache
            .ensure_loaded(absolute.to_str().unwrap(), None)
            .expect("load failed");
        assert_eq!(1, engine.load_count());
    }

    #[test]
    fn test_missing_file_is_resource_not_found() {
        let engine = mock::Engine::get();
        let mut cache = ResourceCache::new(Arc::new(engine.clone()));

        let result = cache.ensure_loaded("nowhere.sf2", None);
        assert!(matches!(result, Err(RouterError::ResourceNotFound(_))));
        assert_eq!(0, engine.load_count());
    }

    #[test]
    fn test_presets_for_never_raises() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        fs::write(dir.path().join("piano.sf2"), b"sf2").expect("write failed");

        let engine = mock::Engine::get();
        let resolved = dir.path().join("piano.sf2").canonicalize().unwrap();
        engine.set_presets(
            &resolved,
            vec![Preset {
                bank: 0,
                preset: 0,
                name: "Grand Piano".to_string(),
            }],
        );

        let mut cache = ResourceCache::new(Arc::new(engine));

        // Not loaded yet, and completely unknown: empty, no error.
        assert!(cache.presets_for("piano.sf2", Some(dir.path())).is_empty());
        assert!(cache.presets_for("missing.sf2", None).is_empty());

        cache
            .ensure_loaded("piano.sf2", Some(dir.path()))
            .expect("load failed");
        let presets = cache.presets_for("piano.sf2", Some(dir.path()));
        assert_eq!(1, presets.len());
        assert_eq!("Grand Piano", presets[0].name);
    }
}
