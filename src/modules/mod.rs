//! Behavior module contract
//! 
//! Modules are loaded at runtime and expose handlers named with the `u_` prefix.
//! Each module either lives in a shared library exporting `mirbot_module_init`
//! (see `declare_module!`) or is linked in and registered in a `ModuleCatalog`.

pub mod trait_def;

pub use trait_def::{HandlerContext, HandlerResult, Module, ModuleInitFn, HANDLER_PREFIX, MODULE_INIT_SYMBOL};
