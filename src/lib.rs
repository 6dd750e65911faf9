//! # Lazylog fanout
//!
//! A process-wide logging facade that sends every record to a set of
//! handlers, one of which rotates its files by size and calendar day.
//!
//! ## Features
//!
//! - Console, file and rotating-file handlers behind one [`Handler`] type
//! - Global and per-handler minimum levels
//! - Size and day based rotation with a bounded, round-robin file set
//! - Background rotation checks, so idle files still roll over at midnight
//! - JSON configuration compatible with existing deployments
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lazylog_fanout::{Handler, Level};
//!
//! let dispatcher = lazylog_fanout::global();
//! dispatcher.set_handlers(vec![
//!     Arc::new(Handler::console()),
//!     Arc::new(Handler::rotating("logs", "app", 5, 10 * 1024 * 1024)?),
//! ]);
//! dispatcher.set_level(Level::Info);
//!
//! lazylog_fanout::info!("listening on {}", 8080);
//! lazylog_fanout::close()?;
//! # Ok::<(), lazylog_fanout::Error>(())
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod level;
pub mod line;
pub mod rotation;

pub use config::{HandlerConfig, LogConfig, LoggerConfig, parse_size};
pub use dispatcher::{Dispatcher, ExitHook, Fault, global};
pub use error::{Error, Result};
pub use handler::{ConsoleHandler, FileHandler, Handler, HandlerCore};
pub use level::Level;
pub use line::{Flags, LineWriter};
pub use rotation::{INFINITE, RotatingHandler, RotatingHandlerBuilder};

/// Replace the global handlers with the ones configured for logger `name`.
pub fn init(config: &LogConfig, name: &str) -> Result<()> {
    global().init(config, name)
}

/// Load a JSON configuration file and initialize the global dispatcher.
pub fn init_from_file(path: impl AsRef<std::path::Path>, name: &str) -> Result<()> {
    init(&LogConfig::load(path)?, name)
}

/// Close every globally registered handler.
pub fn close() -> Result<()> {
    global().close()
}

/// Log at debug level.
///
/// Goes to the global dispatcher unless one is named with `dispatcher:`.
#[macro_export]
macro_rules! debug {
    (dispatcher: $d:expr, $($arg:tt)+) => {
        $d.debug(::std::format_args!($($arg)+))
    };
    ($($arg:tt)+) => {
        $crate::global().debug(::std::format_args!($($arg)+))
    };
}

/// Log at info level.
#[macro_export]
macro_rules! info {
    (dispatcher: $d:expr, $($arg:tt)+) => {
        $d.info(::std::format_args!($($arg)+))
    };
    ($($arg:tt)+) => {
        $crate::global().info(::std::format_args!($($arg)+))
    };
}

/// Log at warn level.
#[macro_export]
macro_rules! warn {
    (dispatcher: $d:expr, $($arg:tt)+) => {
        $d.warn(::std::format_args!($($arg)+))
    };
    ($($arg:tt)+) => {
        $crate::global().warn(::std::format_args!($($arg)+))
    };
}

/// Log at error level.
#[macro_export]
macro_rules! error {
    (dispatcher: $d:expr, $($arg:tt)+) => {
        $d.error(::std::format_args!($($arg)+))
    };
    ($($arg:tt)+) => {
        $crate::global().error(::std::format_args!($($arg)+))
    };
}

/// Log at panic level and evaluate to the resulting [`Fault`].
///
/// ```rust,no_run
/// fn check(len: usize) -> Result<(), lazylog_fanout::Fault> {
///     if len == 0 {
///         return Err(lazylog_fanout::fault!("empty input"));
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! fault {
    (dispatcher: $d:expr, $($arg:tt)+) => {
        $d.panic(::std::format_args!($($arg)+))
    };
    ($($arg:tt)+) => {
        $crate::global().panic(::std::format_args!($($arg)+))
    };
}

/// Log at fatal level, then exit the process with status 1.
#[macro_export]
macro_rules! fatal {
    (dispatcher: $d:expr, $($arg:tt)+) => {
        $d.fatal(::std::format_args!($($arg)+))
    };
    ($($arg:tt)+) => {
        $crate::global().fatal(::std::format_args!($($arg)+))
    };
}
