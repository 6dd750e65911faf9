//! Size and day based log rotation.
//!
//! A [`RotatingHandler`] writes to `{dir}/{base}.{epoch}.{suffix}.log`.
//! The epoch tag is the local time the current day's sequence started
//! (`YYYYMMDDhhmmss`), the suffix is the slot index within that epoch.
//!
//! Rotation happens when the active file reaches `max_size` bytes or the
//! calendar day changes. Size rotation advances the suffix; with a bounded
//! `max_files` it wraps around and the reused slot's old file is deleted.
//! A day change starts a new epoch at slot `0`.
//!
//! The check runs on a background thread every `check_interval`, so a quiet
//! file still rotates at midnight. Writers never wait on the size check,
//! only on the short handle swap.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use time::OffsetDateTime;
use time::macros::format_description;

use crate::handler::HandlerCore;
use crate::line::{self, Flags};
use crate::{Error, Level, Result};

/// `max_files` value that keeps every file.
pub const INFINITE: usize = 0;

/// Default cadence of the background rotation check.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Why a rotation is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Active file reached the size limit.
    Size,
    /// Calendar day changed since the epoch started.
    Rollover,
    /// Active file was removed from disk behind our back.
    Missing,
}

/// Identity of the active file.
#[derive(Debug)]
struct Slot {
    started: OffsetDateTime,
    tag: String,
    suffix: u64,
    path: PathBuf,
}

/// State shared between the handler and its monitor thread.
#[derive(Debug)]
struct Shared {
    core: HandlerCore,
    directory: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    closed: AtomicBool,
    slot: Mutex<Slot>,
}

impl Shared {
    fn file_path(&self, tag: &str, suffix: u64) -> PathBuf {
        self.directory
            .join(format!("{}.{}.{}.log", self.base_name, tag, suffix))
    }

    fn next_suffix(&self, suffix: u64) -> u64 {
        if self.max_files == INFINITE {
            suffix + 1
        } else {
            (suffix + 1) % self.max_files as u64
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether the active file must be replaced at `now`.
    ///
    /// Reads file metadata only; the handle itself is not touched.
    fn due(&self, slot: &Slot, now: OffsetDateTime) -> Result<Option<Trigger>> {
        if now.to_offset(slot.started.offset()).date() > slot.started.date() {
            return Ok(Some(Trigger::Rollover));
        }
        match fs::metadata(&slot.path) {
            Ok(meta) if meta.len() >= self.max_size => Ok(Some(Trigger::Size)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Some(Trigger::Missing)),
            Err(e) => Err(e.into()),
        }
    }

    fn check_at(&self, now: OffsetDateTime) -> Result<bool> {
        let mut slot = self.slot();
        if self.closed.load(Ordering::Acquire) {
            return Ok(false);
        }
        match self.due(&slot, now)? {
            Some(trigger) => {
                self.rotate_locked(&mut slot, trigger, now)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move to the next file. `slot` is only updated once the new file is open.
    ///
    /// `closed` only changes under the slot lock, so a closed handler never
    /// evicts or creates a file here.
    fn rotate_locked(&self, slot: &mut Slot, trigger: Trigger, now: OffsetDateTime) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let (started, tag, suffix) = match trigger {
            Trigger::Size => (slot.started, slot.tag.clone(), self.next_suffix(slot.suffix)),
            Trigger::Rollover => (now, epoch_tag(now)?, 0),
            Trigger::Missing => (slot.started, slot.tag.clone(), slot.suffix),
        };
        let path = self.file_path(&tag, suffix);

        if trigger != Trigger::Missing && path.exists() {
            tracing::debug!(path = %path.display(), "evicting reused log slot");
            fs::remove_file(&path)?;
        }
        let file = open_append(&path)?;

        let previous = self.core.lock().set_output(Box::new(file));
        drop(previous);

        tracing::debug!(
            from = %slot.path.display(),
            to = %path.display(),
            ?trigger,
            "rotated log file"
        );
        *slot = Slot {
            started,
            tag,
            suffix,
            path,
        };
        Ok(())
    }
}

/// Periodic rotation check bound to one handler.
#[derive(Debug)]
struct Monitor {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Monitor {
    fn spawn(shared: Arc<Shared>, interval: Duration) -> io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("lazylog-rotate".to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    tick(&shared);
                }
            })?;
        Ok(Self { stop, handle })
    }

    fn stop(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            tracing::error!("rotation monitor thread panicked");
        }
    }
}

/// One monitor tick. Failures are reported and never end the monitor.
fn tick(shared: &Shared) {
    match panic::catch_unwind(AssertUnwindSafe(|| shared.check_at(line::now()))) {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            tracing::warn!(
                dir = %shared.directory.display(),
                base = %shared.base_name,
                error = %e,
                "log rotation check failed"
            );
        }
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(
                dir = %shared.directory.display(),
                base = %shared.base_name,
                "log rotation check panicked: {}",
                msg
            );
        }
    }
}

/// Format the epoch tag embedded in file names.
fn epoch_tag(at: OffsetDateTime) -> Result<String> {
    Ok(at.format(format_description!(
        "[year][month][day][hour][minute][second]"
    ))?)
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Builder for [`RotatingHandler`].
#[derive(Debug, Clone)]
pub struct RotatingHandlerBuilder {
    directory: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    check_interval: Duration,
    flags: Flags,
    level: Level,
}

impl RotatingHandlerBuilder {
    /// Keep at most `max_files` numbered files per epoch, `0` for no bound.
    pub fn max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    /// Rotate once the active file holds at least `max_size` bytes.
    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Create the directory, open the first file and start the monitor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a zero `max_size`, a zero check
    /// interval, or a base name that is empty or contains a path separator.
    /// Returns [`Error::Io`] if the directory or file cannot be created.
    pub fn build(self) -> Result<RotatingHandler> {
        self.build_at(line::now())
    }

    /// Build with the first epoch starting at `started`.
    fn build_at(self, started: OffsetDateTime) -> Result<RotatingHandler> {
        if self.max_size == 0 {
            return Err(Error::InvalidArgument(
                "max_size must be greater than 0".to_string(),
            ));
        }
        if self.base_name.is_empty() || self.base_name.contains(['/', '\\']) {
            return Err(Error::InvalidArgument(format!(
                "invalid base name: {:?}",
                self.base_name
            )));
        }
        if self.check_interval.is_zero() {
            return Err(Error::InvalidArgument(
                "check interval must be greater than 0".to_string(),
            ));
        }

        fs::create_dir_all(&self.directory)?;

        let tag = epoch_tag(started)?;
        let path = self
            .directory
            .join(format!("{}.{}.{}.log", self.base_name, tag, 0));
        let file = open_append(&path)?;

        let core = HandlerCore::new(Box::new(file), self.flags);
        core.set_level(self.level);

        let shared = Arc::new(Shared {
            core,
            directory: self.directory,
            base_name: self.base_name,
            max_files: self.max_files,
            max_size: self.max_size,
            closed: AtomicBool::new(false),
            slot: Mutex::new(Slot {
                started,
                tag,
                suffix: 0,
                path,
            }),
        });

        // A leftover file from an earlier run may already be full.
        shared.check_at(started)?;

        let monitor = Monitor::spawn(Arc::clone(&shared), self.check_interval)?;
        Ok(RotatingHandler {
            shared,
            monitor: Mutex::new(Some(monitor)),
        })
    }
}

/// Handler that keeps a bounded, rotating sequence of files.
#[derive(Debug)]
pub struct RotatingHandler {
    shared: Arc<Shared>,
    monitor: Mutex<Option<Monitor>>,
}

impl RotatingHandler {
    pub fn builder(
        directory: impl Into<PathBuf>,
        base_name: impl Into<String>,
    ) -> RotatingHandlerBuilder {
        RotatingHandlerBuilder {
            directory: directory.into(),
            base_name: base_name.into(),
            max_files: INFINITE,
            max_size: 10 * 1024 * 1024,
            check_interval: DEFAULT_CHECK_INTERVAL,
            flags: Flags::STD,
            level: Level::Debug,
        }
    }

    pub fn core(&self) -> &HandlerCore {
        &self.shared.core
    }

    pub fn directory(&self) -> &Path {
        &self.shared.directory
    }

    pub fn base_name(&self) -> &str {
        &self.shared.base_name
    }

    pub fn max_files(&self) -> usize {
        self.shared.max_files
    }

    pub fn max_size(&self) -> u64 {
        self.shared.max_size
    }

    /// Path of the file currently receiving lines.
    pub fn current_path(&self) -> PathBuf {
        self.shared.slot().path.clone()
    }

    pub fn suffix(&self) -> u64 {
        self.shared.slot().suffix
    }

    pub fn epoch_tag(&self) -> String {
        self.shared.slot().tag.clone()
    }

    /// Whether the active file is full, gone, or from an earlier day.
    pub fn must_rotate(&self) -> Result<bool> {
        let slot = self.shared.slot();
        Ok(self.shared.due(&slot, line::now())?.is_some())
    }

    /// Run one rotation check, rotating if due. Returns whether it rotated.
    ///
    /// This is what the background monitor does on every tick.
    pub fn check_rotation(&self) -> Result<bool> {
        self.shared.check_at(line::now())
    }

    /// Advance to the next slot now, regardless of size.
    pub fn rotate(&self) -> Result<()> {
        let mut slot = self.shared.slot();
        self.shared.rotate_locked(&mut slot, Trigger::Size, line::now())
    }

    /// Stop the monitor, then release the active file. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.stop_monitor();
        let _slot = self.shared.slot();
        self.shared.closed.store(true, Ordering::Release);
        self.shared.core.release()
    }

    fn stop_monitor(&self) {
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }
    }

    #[cfg(test)]
    fn check_rotation_at(&self, now: OffsetDateTime) -> Result<bool> {
        self.shared.check_at(now)
    }
}

impl Drop for RotatingHandler {
    fn drop(&mut self) {
        self.stop_monitor();
    }
}
