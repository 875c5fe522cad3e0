//! Module trait definitions

use crate::application::errors::{BotError, ModuleError};
use crate::application::services::CoreHandle;
use crate::domain::entities::ProtocolEvent;

/// Prefix that marks a function as a dispatchable handler
pub const HANDLER_PREFIX: &str = "u_";

/// Symbol every module library exports
pub const MODULE_INIT_SYMBOL: &[u8] = b"mirbot_module_init";

/// Signature of the exported init symbol
#[allow(improper_ctypes_definitions)]
pub type ModuleInitFn = unsafe extern "C" fn() -> *mut dyn Module;

/// Handler outcome: `Ok(true)` handled, `Ok(false)` declined
pub type HandlerResult = Result<bool, ModuleError>;

/// Everything a handler gets to see for one invocation
pub struct HandlerContext<'a> {
    /// Name the handler was invoked under
    pub handler: &'a str,
    /// Triggering event; `None` for direct calls
    pub event: Option<&'a ProtocolEvent>,
    pub args: &'a [String],
    pub core: &'a CoreHandle,
}

impl<'a> HandlerContext<'a> {
    pub fn sender(&self) -> Option<&str> {
        self.event.and_then(|e| e.sender_nick())
    }

    /// Answer in the channel or query the event came from. Direct calls have
    /// nowhere to answer and send nothing.
    pub fn reply(&self, text: &str) -> Result<(), ModuleError> {
        let Some(target) = self.event.and_then(|e| e.reply_target()) else {
            return Ok(());
        };
        self.core.privmsg(target, text).map_err(|e| self.fail(e))
    }

    /// Wrap any error as a failure of this handler
    pub fn fail(&self, reason: impl std::fmt::Display) -> ModuleError {
        ModuleError::Handler {
            name: self.handler.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn send(&self, line: &str) -> Result<(), BotError> {
        self.core.send(line)
    }
}

/// Contract every behavior module satisfies
pub trait Module: Send + Sync {
    /// Unique module name
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn description(&self) -> Option<&str> {
        None
    }

    /// Names this module answers to. Only `u_`-prefixed names become handlers.
    fn handlers(&self) -> Vec<String>;

    /// Run the handler named in `ctx.handler`
    fn call(&self, ctx: &HandlerContext<'_>) -> HandlerResult;

    /// Called once after loading; an error aborts the load
    fn init(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called before the module is dropped
    fn shutdown(&self) {}
}

/// Export a module type from a `cdylib` crate.
///
/// ```ignore
/// mirbot::declare_module!(AfkModule::new);
/// ```
#[macro_export]
macro_rules! declare_module {
    ($constructor:path) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn mirbot_module_init() -> *mut dyn $crate::modules::Module {
            let module: ::std::boxed::Box<dyn $crate::modules::Module> =
                ::std::boxed::Box::new($constructor());
            ::std::boxed::Box::into_raw(module)
        }
    };
}
