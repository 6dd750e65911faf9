//! Output handlers.
//!
//! Every handler owns a [`HandlerCore`]: a [`LineWriter`] behind a mutex
//! plus a minimum level kept outside that mutex, so suppressed records are
//! rejected without locking or formatting anything. The three variants only
//! differ in where the line writer points and what `close` releases.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::line::{Flags, LineWriter};
use crate::rotation::RotatingHandler;
use crate::{Level, Result};

/// Line writer, its lock, and the level filter shared by all variants.
#[derive(Debug)]
pub struct HandlerCore {
    level: AtomicU8,
    writer: Mutex<LineWriter>,
}

impl HandlerCore {
    pub(crate) fn new(out: Box<dyn Write + Send>, flags: Flags) -> Self {
        Self {
            level: AtomicU8::new(Level::Debug as u8),
            writer: Mutex::new(LineWriter::new(out, "", flags)),
        }
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// Whether a record at `level` passes this handler's filter.
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level()
    }

    pub fn flags(&self) -> Flags {
        self.lock().flags()
    }

    pub fn set_flags(&self, flags: Flags) {
        self.lock().set_flags(flags);
    }

    pub fn prefix(&self) -> String {
        self.lock().prefix().to_string()
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.lock().set_prefix(prefix);
    }

    /// Redirect future lines. The previous destination is dropped.
    pub fn set_output(&self, out: Box<dyn Write + Send>) {
        let previous = self.lock().set_output(out);
        drop(previous);
    }

    /// Write `"{level} [{args}]"` as one line if `level` passes the filter.
    #[track_caller]
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) -> Result<()> {
        if !self.enabled(level) {
            return Ok(());
        }
        let caller = std::panic::Location::caller();
        let mut writer = self.lock();
        writer.write_line(Some(caller), &format!("{} [{}]", level, args))
    }

    pub fn flush(&self) -> Result<()> {
        self.lock().flush()
    }

    /// Drop the destination; later writes fail with `Error::Closed`.
    pub(crate) fn release(&self) -> Result<()> {
        let mut writer = self.lock();
        if let Some(mut out) = writer.take_output() {
            out.flush()?;
        }
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, LineWriter> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Writes to standard error. Closing it does nothing.
#[derive(Debug)]
pub struct ConsoleHandler {
    core: HandlerCore,
}

impl ConsoleHandler {
    pub fn new() -> Self {
        Self {
            core: HandlerCore::new(Box::new(io::stderr()), Flags::STD),
        }
    }

    pub fn core(&self) -> &HandlerCore {
        &self.core
    }
}

impl Default for ConsoleHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Appends to a single file for its whole lifetime.
#[derive(Debug)]
pub struct FileHandler {
    core: HandlerCore,
    path: PathBuf,
}

impl FileHandler {
    /// Open `path` for append, creating it and its parent directories.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            core: HandlerCore::new(Box::new(file), Flags::STD),
            path,
        })
    }

    pub fn core(&self) -> &HandlerCore {
        &self.core
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn close(&self) -> Result<()> {
        self.core.release()
    }
}

/// A configured output sink.
#[derive(Debug)]
pub enum Handler {
    Console(ConsoleHandler),
    File(FileHandler),
    Rotating(RotatingHandler),
}

impl Handler {
    pub fn console() -> Self {
        Self::Console(ConsoleHandler::new())
    }

    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::File(FileHandler::new(path)?))
    }

    /// Rotating handler with the default check interval.
    ///
    /// `max_files == 0` keeps every file; see [`RotatingHandler`].
    pub fn rotating(
        directory: impl Into<PathBuf>,
        base_name: impl Into<String>,
        max_files: usize,
        max_size: u64,
    ) -> Result<Self> {
        let handler = RotatingHandler::builder(directory, base_name)
            .max_files(max_files)
            .max_size(max_size)
            .build()?;
        Ok(Self::Rotating(handler))
    }

    pub fn core(&self) -> &HandlerCore {
        match self {
            Self::Console(h) => h.core(),
            Self::File(h) => h.core(),
            Self::Rotating(h) => h.core(),
        }
    }

    pub fn as_rotating(&self) -> Option<&RotatingHandler> {
        match self {
            Self::Rotating(h) => Some(h),
            _ => None,
        }
    }

    pub fn level(&self) -> Level {
        self.core().level()
    }

    pub fn set_level(&self, level: Level) {
        self.core().set_level(level);
    }

    pub fn flags(&self) -> Flags {
        self.core().flags()
    }

    pub fn set_flags(&self, flags: Flags) {
        self.core().set_flags(flags);
    }

    pub fn prefix(&self) -> String {
        self.core().prefix()
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.core().set_prefix(prefix);
    }

    pub fn set_output(&self, out: Box<dyn Write + Send>) {
        self.core().set_output(out);
    }

    #[track_caller]
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) -> Result<()> {
        self.core().log(level, args)
    }

    #[track_caller]
    pub fn debug(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log(Level::Debug, args)
    }

    #[track_caller]
    pub fn info(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log(Level::Info, args)
    }

    #[track_caller]
    pub fn warn(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log(Level::Warn, args)
    }

    #[track_caller]
    pub fn error(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log(Level::Error, args)
    }

    /// Records at panic level. Raising the fault is the dispatcher's job.
    #[track_caller]
    pub fn panic(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log(Level::Panic, args)
    }

    /// Records at fatal level. Exiting is the dispatcher's job.
    #[track_caller]
    pub fn fatal(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log(Level::Fatal, args)
    }

    pub fn flush(&self) -> Result<()> {
        self.core().flush()
    }

    /// Release the handler's output. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        match self {
            Self::Console(_) => Ok(()),
            Self::File(h) => h.close(),
            Self::Rotating(h) => h.close(),
        }
    }
}

impl From<ConsoleHandler> for Handler {
    fn from(handler: ConsoleHandler) -> Self {
        Self::Console(handler)
    }
}

impl From<FileHandler> for Handler {
    fn from(handler: FileHandler) -> Self {
        Self::File(handler)
    }
}

impl From<RotatingHandler> for Handler {
    fn from(handler: RotatingHandler) -> Self {
        Self::Rotating(handler)
    }
}
