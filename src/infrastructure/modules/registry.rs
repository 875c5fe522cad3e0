//! Module registry - Owns loaded modules and resolves handler names

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use libloading::Library;
use crate::application::errors::ModuleError;
use crate::modules::{HandlerContext, HandlerResult, Module, HANDLER_PREFIX};
use super::loader::{LoadFailure, LoadedModule, ModuleCatalog, ModuleLoader};

/// A registered module and what it exposes
pub struct ModuleRecord {
    // Must drop before `_library`
    module: Box<dyn Module>,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    /// `u_`-prefixed handler names, in the order the module lists them
    pub handlers: Vec<String>,
    pub loaded_at: DateTime<Utc>,
    pub enabled: bool,
    pub path: Option<PathBuf>,
    _library: Option<Library>,
}

impl ModuleRecord {
    fn new(module: Box<dyn Module>, name: String, path: Option<PathBuf>, library: Option<Library>) -> Self {
        let handlers = handler_names(module.as_ref(), &name);
        Self {
            name,
            version: module.version().to_string(),
            description: module.description().map(String::from),
            handlers,
            loaded_at: Utc::now(),
            enabled: true,
            path,
            _library: library,
            module,
        }
    }

    fn from_loaded(loaded: LoadedModule) -> Self {
        let (module, manifest, path, library) = loaded.into_parts();
        let mut record = Self::new(module, manifest.name.clone(), Some(path), library);
        record.enabled = manifest.enabled;
        if record.description.is_none() {
            record.description = manifest.description;
        }
        record
    }

    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }
}

/// Enumerate a module's handlers once: prefixed names only, first occurrence wins
fn handler_names(module: &dyn Module, name: &str) -> Vec<String> {
    let mut handlers: Vec<String> = Vec::new();
    for handler in module.handlers() {
        if !handler.starts_with(HANDLER_PREFIX) || handler.len() == HANDLER_PREFIX.len() {
            tracing::warn!("Module {} lists '{}', which is not a handler name", name, handler);
            continue;
        }
        if !handlers.contains(&handler) {
            handlers.push(handler);
        }
    }
    handlers
}

/// Registry for managing loaded modules
pub struct ModuleRegistry {
    loader: ModuleLoader,
    records: Vec<ModuleRecord>,
    /// Handler name to owning record; rebuilt whenever the record set changes
    index: HashMap<String, usize>,
    failures: Vec<LoadFailure>,
}

impl ModuleRegistry {
    pub fn new(module_dir: impl Into<PathBuf>, catalog: ModuleCatalog) -> Self {
        Self {
            loader: ModuleLoader::new(module_dir, catalog),
            records: Vec::new(),
            index: HashMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn module_dir(&self) -> &Path {
        self.loader.module_dir()
    }

    pub fn catalog_mut(&mut self) -> &mut ModuleCatalog {
        self.loader.catalog_mut()
    }

    /// Load every module in the module directory. Failures are recorded and
    /// logged; returns how many modules were added.
    pub fn load_all(&mut self) -> usize {
        let (loaded, failures) = self.loader.load_all();
        self.failures = failures;

        let mut added = 0;
        for module in loaded {
            let path = module.path().to_path_buf();
            match self.insert(ModuleRecord::from_loaded(module)) {
                Ok(()) => added += 1,
                Err(e) => {
                    tracing::warn!("Skipping module in {}: {}", path.display(), e);
                    self.failures.push(LoadFailure {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.rebuild_index();
        tracing::info!(
            "Loaded {} module(s), {} failure(s), {} handler(s)",
            added,
            self.failures.len(),
            self.index.len()
        );
        added
    }

    /// Load one module directory
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), ModuleError> {
        let loaded = self.loader.load_module(path)?;
        self.insert(ModuleRecord::from_loaded(loaded))?;
        self.rebuild_index();
        Ok(())
    }

    /// Register an already constructed module
    pub fn register(&mut self, module: Box<dyn Module>) -> Result<(), ModuleError> {
        module.init()?;
        let name = module.name().to_string();
        self.insert(ModuleRecord::new(module, name, None, None))?;
        self.rebuild_index();
        Ok(())
    }

    fn insert(&mut self, record: ModuleRecord) -> Result<(), ModuleError> {
        if self.records.iter().any(|r| r.name == record.name) {
            record.module.shutdown();
            return Err(ModuleError::Load(format!("Module '{}' already loaded", record.name)));
        }
        self.records.push(record);
        Ok(())
    }

    /// Unload a module
    pub fn unload(&mut self, name: &str) -> Result<(), ModuleError> {
        let pos = self
            .records
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;

        let record = self.records.remove(pos);
        record.module.shutdown();
        self.rebuild_index();
        tracing::info!("Unloaded module: {}", name);
        Ok(())
    }

    pub fn unload_all(&mut self) {
        for record in self.records.drain(..) {
            record.module.shutdown();
            tracing::debug!("Unloaded module: {}", record.name);
        }
        self.index.clear();
    }

    /// Drop everything and load the module directory again
    pub fn reload_all(&mut self) -> usize {
        self.unload_all();
        self.load_all()
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), ModuleError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;
        record.enabled = enabled;
        self.rebuild_index();
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (pos, record) in self.records.iter().enumerate() {
            if !record.enabled {
                continue;
            }
            for handler in &record.handlers {
                match self.index.get(handler) {
                    Some(&owner) => tracing::warn!(
                        "Handler {} in module {} is shadowed by module {}",
                        handler,
                        record.name,
                        self.records[owner].name
                    ),
                    None => {
                        self.index.insert(handler.clone(), pos);
                    }
                }
            }
        }
    }

    pub fn method_exists(&self, handler: &str) -> bool {
        self.index.contains_key(handler)
    }

    /// Module that answers to `handler`
    pub fn owner_of(&self, handler: &str) -> Option<&ModuleRecord> {
        self.index.get(handler).map(|&pos| &self.records[pos])
    }

    /// Invoke the handler named in `ctx.handler`. A panicking handler is
    /// reported as a failure and never takes the bot down.
    pub fn call(&self, ctx: &HandlerContext<'_>) -> HandlerResult {
        let record = self
            .owner_of(ctx.handler)
            .ok_or_else(|| ModuleError::HandlerNotFound(ctx.handler.to_string()))?;

        match catch_unwind(AssertUnwindSafe(|| record.module.call(ctx))) {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                tracing::error!("Handler {} in module {} panicked: {}", ctx.handler, record.name, reason);
                Err(ModuleError::Handler {
                    name: ctx.handler.to_string(),
                    reason,
                })
            }
        }
    }

    /// Names of the registered modules, in load order
    pub fn loaded_modules(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name.clone()).collect()
    }

    pub fn records(&self) -> &[ModuleRecord] {
        &self.records
    }

    /// Every callable handler name, sorted
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index.keys().cloned().collect();
        names.sort();
        names
    }

    /// Directories that failed during the last `load_all`
    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Drop for ModuleRegistry {
    fn drop(&mut self) {
        self.unload_all();
    }
}
