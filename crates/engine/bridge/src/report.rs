//! Error funnel
//!
//! Every bridge error that reaches Lua passes through [`raise`]: it is logged
//! with the script call stack, handed to the optional notifier, and turned
//! into a Lua runtime error. Errors that already are Lua errors (a script
//! callback failing inside a native call, say) pass through untouched so they
//! are reported once.

use crate::context::BridgeContext;
use crate::{Error, Result};
use mlua::prelude::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// One funneled failure
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub message: String,
    /// Script call stack at the point of failure, when available
    pub traceback: Option<String>,
}

/// Callback receiving every funneled error
pub type ErrorNotifier = Rc<dyn Fn(&ErrorReport)>;

pub struct ErrorReporter {
    capture_traceback: bool,
    notifier: RefCell<Option<ErrorNotifier>>,
    count: Cell<u64>,
}

impl ErrorReporter {
    pub fn new(capture_traceback: bool) -> Self {
        Self {
            capture_traceback,
            notifier: RefCell::new(None),
            count: Cell::new(0),
        }
    }

    pub fn set_notifier(&self, notifier: Option<ErrorNotifier>) {
        *self.notifier.borrow_mut() = notifier;
    }

    /// Log, notify and convert to a Lua error
    pub fn report(&self, lua: &Lua, err: &Error) -> LuaError {
        let report = ErrorReport {
            message: err.to_string(),
            traceback: if self.capture_traceback {
                traceback(lua)
            } else {
                None
            },
        };
        match &report.traceback {
            Some(traceback) => tracing::error!(traceback = %traceback, "{}", report.message),
            None => tracing::error!("{}", report.message),
        }
        self.count.set(self.count.get() + 1);

        // The notifier may call back into the runtime
        let notifier = self.notifier.borrow().clone();
        if let Some(notifier) = notifier {
            notifier(&report);
        }
        LuaError::RuntimeError(report.message)
    }

    /// Number of errors funneled so far
    pub fn reported(&self) -> u64 {
        self.count.get()
    }
}

/// Script call stack above the failing callback
fn traceback(lua: &Lua) -> Option<String> {
    lua.traceback(None, 1).ok().map(|s| s.to_string_lossy()).or_else(|| debug_traceback(lua))
}

fn debug_traceback(lua: &Lua) -> Option<String> {
    let debug: LuaTable = lua.globals().get("debug").ok()?;
    let traceback: LuaFunction = debug.get("traceback").ok()?;
    traceback.call::<String>(()).ok()
}

/// Convert a bridge error into the error Lua sees
pub fn raise(lua: &Lua, err: Error) -> LuaError {
    match err {
        Error::Lua(inner) => inner,
        other => match BridgeContext::from_lua(lua) {
            Ok(ctx) => ctx.reporter().report(lua, &other),
            Err(_) => LuaError::RuntimeError(other.to_string()),
        },
    }
}

/// Route a bridge result through the funnel
pub trait Funnel<T> {
    fn funnel(self, lua: &Lua) -> LuaResult<T>;
}

impl<T> Funnel<T> for Result<T> {
    fn funnel(self, lua: &Lua) -> LuaResult<T> {
        self.map_err(|err| raise(lua, err))
    }
}
