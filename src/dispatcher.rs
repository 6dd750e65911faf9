//! Process-wide fan-out of log records to the registered handlers.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::Lazy;

use crate::config::LogConfig;
use crate::{Error, Handler, Level, Result};

static GLOBAL: Lazy<Dispatcher> = Lazy::new(Dispatcher::new);

/// The dispatcher used by the crate-level macros.
pub fn global() -> &'static Dispatcher {
    &GLOBAL
}

/// Called with the exit status after a fatal record has been written.
pub type ExitHook = fn(i32) -> !;

fn exit_process(code: i32) -> ! {
    std::process::exit(code)
}

/// Control-flow fault produced by a panic-level record.
///
/// Callers either propagate it like an error or [`raise`](Fault::raise) it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    message: String,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Unwind with this fault as the panic payload.
    ///
    /// A `catch_unwind` scope can downcast the payload back to a `Fault`;
    /// without one the thread dies like any other panic.
    pub fn raise(self) -> ! {
        std::panic::panic_any(self)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Fault {}

#[derive(Debug)]
struct Registry {
    handlers: Vec<Arc<Handler>>,
    level: Level,
}

/// Registry of active handlers plus a global minimum level.
///
/// Records below the level are dropped before any handler is consulted;
/// the rest go to every handler in registration order. A failing handler
/// never stops delivery to the ones after it.
pub struct Dispatcher {
    registry: RwLock<Registry>,
    exit: ExitHook,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry {
                handlers: Vec::new(),
                level: Level::Debug,
            }),
            exit: exit_process,
        }
    }

    /// Replace what `fatal` calls after recording, `std::process::exit` by default.
    pub fn with_exit_hook(mut self, hook: ExitHook) -> Self {
        self.exit = hook;
        self
    }

    pub fn level(&self) -> Level {
        self.read().level
    }

    pub fn set_level(&self, level: Level) {
        self.write().level = level;
    }

    /// Snapshot of the registered handlers.
    pub fn handlers(&self) -> Vec<Arc<Handler>> {
        self.read().handlers.clone()
    }

    /// Swap in a new handler set, returning the previous one unclosed.
    pub fn set_handlers(&self, handlers: Vec<Arc<Handler>>) -> Vec<Arc<Handler>> {
        std::mem::replace(&mut self.write().handlers, handlers)
    }

    pub fn add_handler(&self, handler: Arc<Handler>) {
        self.write().handlers.push(handler);
    }

    /// Build the handlers of logger `name` and make them the registered set.
    ///
    /// Nothing changes if any handler fails to build; handlers already
    /// built for this call are closed again. On success the previously
    /// registered handlers are closed.
    pub fn init(&self, config: &LogConfig, name: &str) -> Result<()> {
        let handlers = config.build_handlers(name)?;
        let previous = self.set_handlers(handlers);
        close_all(&previous)
    }

    /// Handlers due to receive a record at `level`, if it passes the filter.
    fn targets(&self, level: Level) -> Option<Vec<Arc<Handler>>> {
        let registry = self.read();
        if level < registry.level {
            return None;
        }
        Some(registry.handlers.clone())
    }

    /// Deliver to every handler, ignoring individual failures.
    #[track_caller]
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if let Err(e) = self.try_log(level, args) {
            tracing::debug!(error = %e, "log record not delivered everywhere");
        }
    }

    /// Deliver to every handler and report whether any of them failed.
    #[track_caller]
    pub fn try_log(&self, level: Level, args: fmt::Arguments<'_>) -> Result<()> {
        let Some(handlers) = self.targets(level) else {
            return Ok(());
        };
        let total = handlers.len();
        let mut failed = 0;
        let mut first = None;
        for handler in &handlers {
            if let Err(e) = handler.log(level, args) {
                failed += 1;
                first.get_or_insert(e);
            }
        }
        match first {
            Some(source) => Err(Error::PartialDispatch {
                failed,
                total,
                source: Box::new(source),
            }),
            None => Ok(()),
        }
    }

    #[track_caller]
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    #[track_caller]
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    #[track_caller]
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    #[track_caller]
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    /// Record at panic level and hand back the fault for the caller to raise.
    #[track_caller]
    #[must_use = "a Fault does nothing unless raised or propagated"]
    pub fn panic(&self, args: fmt::Arguments<'_>) -> Fault {
        self.log(Level::Panic, args);
        Fault::new(args.to_string())
    }

    /// Record at fatal level on every handler, then exit with status 1.
    #[track_caller]
    pub fn fatal(&self, args: fmt::Arguments<'_>) -> ! {
        self.log(Level::Fatal, args);
        for handler in self.handlers() {
            let _ = handler.flush();
        }
        (self.exit)(1)
    }

    /// Close every handler in registration order and empty the registry.
    pub fn close(&self) -> Result<()> {
        let handlers = std::mem::take(&mut self.write().handlers);
        close_all(&handlers)
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &*self.read())
            .finish_non_exhaustive()
    }
}

/// Close all handlers, returning the first failure after trying each one.
pub(crate) fn close_all(handlers: &[Arc<Handler>]) -> Result<()> {
    let mut first = None;
    for handler in handlers {
        if let Err(e) = handler.close() {
            tracing::warn!(error = %e, "failed to close log handler");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}
