//! Module system for mirbot
//!
//! A module is a directory under the module directory holding a `module.yaml`
//! manifest. The implementation is either a shared library exporting
//! `mirbot_module_init` or a type linked into the binary and registered in a
//! `ModuleCatalog`.

pub mod loader;
pub mod manifest;
pub mod registry;

pub use loader::{LoadFailure, LoadedModule, ModuleCatalog, ModuleLoader};
pub use manifest::{ModuleManifest, MANIFEST_FILE};
pub use registry::{ModuleRecord, ModuleRegistry};
