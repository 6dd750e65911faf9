use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::{Error, Flags, Handler, Level, Result};

/// Header flags given to every handler built from configuration.
pub const CONFIG_FLAGS: Flags = Flags::DATE
    .union(Flags::TIME)
    .union(Flags::MICROSECONDS)
    .union(Flags::SHORT_FILE);

/// Parse a size string such as `"512kb"` or `"10MB"` into bytes.
///
/// The unit is mandatory and must be `kb` or `mb` (case-insensitive, 1024 based).
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.len() < 3 || !s.is_char_boundary(s.len() - 2) {
        return Err(Error::Config(format!("invalid max size: {:?}", s)));
    }

    let (num_str, unit) = s.split_at(s.len() - 2);
    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::Config(format!("invalid number: {}", num_str)))?;

    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "kb" => 1024,
        "mb" => 1024 * 1024,
        _ => {
            return Err(Error::Config(format!(
                "invalid unit: {}, supported: kb/mb",
                unit
            )));
        }
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| Error::Config("size too large".to_string()))
}

/// Root of a logging configuration document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LogConfig {
    /// Named loggers; several entries may share a name.
    #[serde(default)]
    pub logs: Vec<LoggerConfig>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named logger
    pub fn with_logger(mut self, logger: LoggerConfig) -> Self {
        self.logs.push(logger);
        self
    }

    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Handler entries of every logger called `name`, in document order.
    pub fn handlers_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HandlerConfig> {
        self.logs
            .iter()
            .filter(move |logger| logger.name == name)
            .flat_map(|logger| logger.data.iter())
    }

    /// Build the handlers of logger `name`.
    ///
    /// If one fails, the ones already built are closed before the error is
    /// returned, so no file stays open.
    pub fn build_handlers(&self, name: &str) -> Result<Vec<Arc<Handler>>> {
        let mut built = Vec::new();
        self.build_into(name, &mut built)?;

        if built.is_empty() {
            return Err(Error::Config(format!(
                "no handlers configured for logger: {}",
                name
            )));
        }
        Ok(built)
    }

    /// Append the handlers of logger `name` to `built`, closing all of them
    /// on the first failure.
    pub(crate) fn build_into(&self, name: &str, built: &mut Vec<Arc<Handler>>) -> Result<()> {
        for entry in self.handlers_for(name) {
            match entry.build() {
                Ok(handler) => built.push(Arc::new(handler)),
                Err(e) => {
                    let _ = crate::dispatcher::close_all(built.as_slice());
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

/// A named group of handlers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggerConfig {
    pub name: String,
    #[serde(default)]
    pub data: Vec<HandlerConfig>,
}

impl LoggerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Vec::new(),
        }
    }

    pub fn with_handler(mut self, handler: HandlerConfig) -> Self {
        self.data.push(handler);
        self
    }
}

/// One handler entry, selected by its `handle` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "handle", rename_all = "snake_case")]
pub enum HandlerConfig {
    /// Standard error.
    Console {
        #[serde(default)]
        level: Level,
    },
    /// A single file, `filename` being its full path.
    File {
        filename: PathBuf,
        #[serde(default)]
        level: Level,
    },
    /// Rotating files `{dir}/{filename}.{epoch}.{n}.log`.
    Rotating {
        dir: PathBuf,
        filename: String,
        #[serde(default)]
        level: Level,
        /// Number of files kept per epoch, `0` for unbounded.
        #[serde(default)]
        maxnum: i64,
        /// Size with a `kb` or `mb` unit, e.g. `"10mb"`.
        maxsize: String,
    },
}

impl HandlerConfig {
    pub fn level(&self) -> Level {
        match self {
            Self::Console { level } | Self::File { level, .. } | Self::Rotating { level, .. } => {
                *level
            }
        }
    }

    /// Construct the configured handler.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for a level above `error` or a malformed `maxsize`
    /// - [`Error::InvalidArgument`] for a negative `maxnum`
    /// - [`Error::Io`] when a directory or file cannot be created
    pub fn build(&self) -> Result<Handler> {
        let level = self.level();
        if level > Level::Error {
            return Err(Error::Config(format!(
                "handler level must be at most error, got {}",
                level
            )));
        }

        let handler = match self {
            Self::Console { .. } => Handler::console(),
            Self::File { filename, .. } => Handler::file(filename)?,
            Self::Rotating {
                dir,
                filename,
                maxnum,
                maxsize,
                ..
            } => {
                let max_files = usize::try_from(*maxnum).map_err(|_| {
                    Error::InvalidArgument(format!("maxnum is less than 0: {}", maxnum))
                })?;
                let max_size = parse_size(maxsize)?;
                Handler::rotating(dir, filename, max_files, max_size)?
            }
        };

        handler.set_level(level);
        handler.set_flags(CONFIG_FLAGS);
        Ok(handler)
    }
}
