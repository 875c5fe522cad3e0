//! Module loader - Resolves module directories into live instances

use std::collections::HashMap;
use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use libloading::{Library, Symbol};
use crate::application::errors::ModuleError;
use crate::modules::{Module, ModuleInitFn, MODULE_INIT_SYMBOL};
use super::manifest::{ModuleManifest, MANIFEST_FILE};

/// Constructor for a module linked into the binary
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// Statically linked modules, looked up by manifest name
#[derive(Clone, Default)]
pub struct ModuleCatalog {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn create(&self, name: &str) -> Option<Box<dyn Module>> {
        self.factories.get(name).map(|factory| factory())
    }
}

/// A module that passed loading and `init`
pub struct LoadedModule {
    // Declared before `library`: the instance's code lives in the library and
    // fields drop in declaration order.
    instance: Box<dyn Module>,
    manifest: ModuleManifest,
    path: PathBuf,
    library: Option<Library>,
}

impl LoadedModule {
    pub fn module(&self) -> &dyn Module {
        self.instance.as_ref()
    }

    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }

    pub(crate) fn into_parts(self) -> (Box<dyn Module>, ModuleManifest, PathBuf, Option<Library>) {
        (self.instance, self.manifest, self.path, self.library)
    }
}

/// A module directory that could not be loaded
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Module loader
pub struct ModuleLoader {
    module_dir: PathBuf,
    catalog: ModuleCatalog,
}

impl ModuleLoader {
    pub fn new(module_dir: impl Into<PathBuf>, catalog: ModuleCatalog) -> Self {
        Self {
            module_dir: module_dir.into(),
            catalog,
        }
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    pub fn catalog_mut(&mut self) -> &mut ModuleCatalog {
        &mut self.catalog
    }

    /// Load a single module from its directory
    pub fn load_module(&self, path: impl AsRef<Path>) -> Result<LoadedModule, ModuleError> {
        let path = path.as_ref();

        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(ModuleError::Load(format!("Missing {} in {}", MANIFEST_FILE, path.display())));
        }
        let manifest = ModuleManifest::from_file(&manifest_path)?;

        let default_library = path.join(format!("{}mirbot_{}.{}", DLL_PREFIX, manifest.name, DLL_EXTENSION));
        let (instance, library) = if let Some(lib) = &manifest.library {
            Self::open_library(&path.join(lib))?
        } else if let Some(instance) = self.catalog.create(&manifest.name) {
            (instance, None)
        } else if default_library.exists() {
            Self::open_library(&default_library)?
        } else {
            return Err(ModuleError::Load(format!(
                "No implementation for module '{}': no library and not linked in",
                manifest.name
            )));
        };

        if instance.name() != manifest.name {
            tracing::warn!(
                "Module in {} calls itself '{}', registering it as '{}'",
                path.display(),
                instance.name(),
                manifest.name
            );
        }

        let loaded = LoadedModule {
            instance,
            manifest,
            path: path.to_path_buf(),
            library,
        };

        loaded
            .instance
            .init()
            .map_err(|e| ModuleError::Load(format!("Module init failed: {}", e)))?;

        tracing::info!("Loaded module: {} v{}", loaded.manifest.name, loaded.instance.version());
        Ok(loaded)
    }

    fn open_library(path: &Path) -> Result<(Box<dyn Module>, Option<Library>), ModuleError> {
        if !path.exists() {
            return Err(ModuleError::Load(format!("Library not found: {}", path.display())));
        }

        let library = unsafe {
            Library::new(path)
                .map_err(|e| ModuleError::Load(format!("Failed to load library: {}", e)))?
        };

        let instance = unsafe {
            let init_fn: Symbol<ModuleInitFn> = library
                .get(MODULE_INIT_SYMBOL)
                .map_err(|e| ModuleError::Load(format!("Failed to find init function: {}", e)))?;

            let raw = init_fn();
            if raw.is_null() {
                return Err(ModuleError::Load("Module init returned null".to_string()));
            }
            Box::from_raw(raw)
        };

        Ok((instance, Some(library)))
    }

    /// Candidate module directories, sorted by name
    pub fn scan(&self) -> Result<Vec<PathBuf>, ModuleError> {
        let mut dirs = Vec::new();

        if !self.module_dir.exists() {
            tracing::warn!("Module directory does not exist: {}", self.module_dir.display());
            return Ok(dirs);
        }

        for entry in std::fs::read_dir(&self.module_dir)
            .map_err(|e| ModuleError::Load(format!("Failed to read module directory: {}", e)))?
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            // Skip hidden directories
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    continue;
                }
            }

            dirs.push(path);
        }

        dirs.sort();
        Ok(dirs)
    }

    /// Load every module in the module directory. One module failing never
    /// stops the others.
    pub fn load_all(&self) -> (Vec<LoadedModule>, Vec<LoadFailure>) {
        let mut modules = Vec::new();
        let mut failures = Vec::new();

        let dirs = match self.scan() {
            Ok(dirs) => dirs,
            Err(e) => {
                tracing::warn!("{}", e);
                failures.push(LoadFailure {
                    path: self.module_dir.clone(),
                    reason: e.to_string(),
                });
                return (modules, failures);
            }
        };

        for path in dirs {
            match self.load_module(&path) {
                Ok(module) => modules.push(module),
                Err(e) => {
                    tracing::warn!("Failed to load module from {}: {}", path.display(), e);
                    failures.push(LoadFailure {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        (modules, failures)
    }
}
