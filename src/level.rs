use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, de};

use crate::Error;

/// Severity of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Level {
    #[default]
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    /// Records the line, then the dispatcher raises a [`Fault`](crate::Fault).
    Panic = 4,
    /// Records the line, then the dispatcher terminates the process.
    Fatal = 5,
}

impl Level {
    /// All levels, least severe first.
    pub const ALL: [Level; 6] = [
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Panic,
        Level::Fatal,
    ];

    /// Lowercase tag written in front of every record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Panic => "panic",
            Self::Fatal => "fatal",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| Error::Config(format!("unknown level: {}", s)))
    }
}

/// Level value that can be the legacy number or a name.
#[derive(Deserialize)]
#[serde(untagged)]
enum LevelValue {
    Number(i64),
    Name(String),
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match LevelValue::deserialize(deserializer)? {
            LevelValue::Number(n) => u8::try_from(n)
                .ok()
                .and_then(Level::from_u8)
                .ok_or_else(|| de::Error::custom(format!("unknown level: {}", n))),
            LevelValue::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}
