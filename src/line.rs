//! Line-oriented writer used by every handler.
//!
//! A [`LineWriter`] turns one message into one line: an optional prefix,
//! a timestamp header selected by [`Flags`], the caller location, the
//! message itself and a single line terminator.

use std::fmt;
use std::io::Write;
use std::panic::Location;

use bitflags::bitflags;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::{Error, Result};

bitflags! {
    /// Header options for a [`LineWriter`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Flags: u32 {
        /// Local date, `2009/01/23`.
        const DATE = 1 << 0;
        /// Local time, `01:23:23`.
        const TIME = 1 << 1;
        /// Microsecond resolution, `01:23:23.123123`. Implies `TIME`.
        const MICROSECONDS = 1 << 2;
        /// Full caller path and line number.
        const LONG_FILE = 1 << 3;
        /// Final path component and line number. Overrides `LONG_FILE`.
        const SHORT_FILE = 1 << 4;
        /// Use UTC rather than the local offset.
        const UTC = 1 << 5;
        /// Move the prefix from the start of the line to just before the message.
        const MSG_PREFIX = 1 << 6;
        /// Initial values for a standard writer.
        const STD = Self::DATE.bits() | Self::TIME.bits();
    }
}

/// Writes formatted lines to a swappable destination.
pub struct LineWriter {
    out: Option<Box<dyn Write + Send>>,
    prefix: String,
    flags: Flags,
}

impl LineWriter {
    pub fn new(out: Box<dyn Write + Send>, prefix: impl Into<String>, flags: Flags) -> Self {
        Self {
            out: Some(out),
            prefix: prefix.into(),
            flags,
        }
    }

    /// Replace the destination, returning the previous one.
    pub fn set_output(&mut self, out: Box<dyn Write + Send>) -> Option<Box<dyn Write + Send>> {
        self.out.replace(out)
    }

    /// Detach the destination. Later writes fail with [`Error::Closed`].
    pub fn take_output(&mut self) -> Option<Box<dyn Write + Send>> {
        self.out.take()
    }

    pub fn has_output(&self) -> bool {
        self.out.is_some()
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: Flags) {
        self.flags = flags;
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    /// Render one complete line, terminator included.
    pub fn format_line(
        &self,
        now: OffsetDateTime,
        caller: Option<&Location<'_>>,
        msg: &str,
    ) -> Result<String> {
        let mut line = String::with_capacity(self.prefix.len() + msg.len() + 48);
        if !self.flags.contains(Flags::MSG_PREFIX) {
            line.push_str(&self.prefix);
        }

        let now = if self.flags.contains(Flags::UTC) {
            now.to_offset(time::UtcOffset::UTC)
        } else {
            now
        };
        if self.flags.contains(Flags::DATE) {
            line.push_str(&now.format(format_description!("[year]/[month]/[day]"))?);
            line.push(' ');
        }
        if self.flags.intersects(Flags::TIME | Flags::MICROSECONDS) {
            line.push_str(&now.format(format_description!("[hour]:[minute]:[second]"))?);
            if self.flags.contains(Flags::MICROSECONDS) {
                line.push('.');
                line.push_str(&now.format(format_description!("[subsecond digits:6]"))?);
            }
            line.push(' ');
        }

        if let Some(caller) = caller
            && self.flags.intersects(Flags::SHORT_FILE | Flags::LONG_FILE)
        {
            let file = if self.flags.contains(Flags::SHORT_FILE) {
                short_file(caller.file())
            } else {
                caller.file()
            };
            line.push_str(&format!("{}:{}: ", file, caller.line()));
        }

        if self.flags.contains(Flags::MSG_PREFIX) {
            line.push_str(&self.prefix);
        }
        line.push_str(msg);
        if !msg.ends_with('\n') {
            line.push('\n');
        }
        Ok(line)
    }

    /// Format `msg` and emit it with a single write.
    pub fn write_line(&mut self, caller: Option<&Location<'_>>, msg: &str) -> Result<()> {
        if self.out.is_none() {
            return Err(Error::Closed);
        }
        let line = self.format_line(now(), caller, msg)?;
        let out = self.out.as_mut().ok_or(Error::Closed)?;
        out.write_all(line.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        match self.out.as_mut() {
            Some(out) => Ok(out.flush()?),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for LineWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineWriter")
            .field("prefix", &self.prefix)
            .field("flags", &self.flags)
            .field("open", &self.out.is_some())
            .finish()
    }
}

/// Current time with the local offset, or UTC when the offset is unknown.
pub(crate) fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn short_file(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use time::macros::datetime;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_format_line_std_flags() {
        let writer = LineWriter::new(Box::new(std::io::sink()), "", Flags::STD);
        let line = writer
            .format_line(datetime!(2024-03-05 07:08:09.123456 UTC), None, "hello")
            .unwrap();
        assert_eq!(line, "2024/03/05 07:08:09 hello\n");
    }

    #[test]
    fn test_format_line_microseconds_and_prefix() {
        let writer = LineWriter::new(
            Box::new(std::io::sink()),
            "[app] ",
            Flags::DATE | Flags::MICROSECONDS,
        );
        let line = writer
            .format_line(datetime!(2024-03-05 07:08:09.123456 UTC), None, "hello\n")
            .unwrap();
        assert_eq!(line, "[app] 2024/03/05 07:08:09.123456 hello\n");
    }

    #[test]
    fn test_format_line_msg_prefix_and_short_file() {
        let writer = LineWriter::new(
            Box::new(std::io::sink()),
            "P: ",
            Flags::SHORT_FILE | Flags::MSG_PREFIX,
        );
        let caller = Location::caller();
        let line = writer
            .format_line(datetime!(2024-03-05 07:08:09 UTC), Some(caller), "x")
            .unwrap();
        assert_eq!(line, format!("line.rs:{}: P: x\n", caller.line()));
    }

    #[test]
    fn test_format_line_long_file() {
        let writer = LineWriter::new(Box::new(std::io::sink()), "", Flags::LONG_FILE);
        let caller = Location::caller();
        let line = writer
            .format_line(datetime!(2024-03-05 07:08:09 UTC), Some(caller), "x")
            .unwrap();
        assert!(line.starts_with(caller.file()));
    }

    #[test]
    fn test_format_line_utc_conversion() {
        let writer = LineWriter::new(Box::new(std::io::sink()), "", Flags::TIME | Flags::UTC);
        let line = writer
            .format_line(datetime!(2024-03-05 07:08:09 +02:00), None, "x")
            .unwrap();
        assert_eq!(line, "05:08:09 x\n");
    }

    #[test]
    fn test_write_line_and_take_output() {
        let buffer = Buffer::default();
        let mut writer = LineWriter::new(Box::new(buffer.clone()), "", Flags::empty());
        writer.write_line(None, "one").unwrap();
        writer.write_line(None, "two").unwrap();
        assert_eq!(buffer.contents(), "one\ntwo\n");

        assert!(writer.take_output().is_some());
        assert!(!writer.has_output());
        assert!(matches!(writer.write_line(None, "three"), Err(Error::Closed)));
        assert!(writer.flush().is_ok());
    }

    #[test]
    fn test_flags_bits() {
        let flags = Flags::DATE | Flags::SHORT_FILE;
        assert!(flags.contains(Flags::DATE));
        assert!(!flags.contains(Flags::TIME));
        assert!(flags.intersects(Flags::TIME | Flags::DATE));
        assert_eq!(Flags::from_bits_truncate(flags.bits()), flags);
        assert_eq!(Flags::from_bits_truncate(0xffff_ffff).bits(), 0x7f);
        assert_eq!(Flags::STD, Flags::DATE | Flags::TIME);
        assert!(Flags::default().is_empty());
    }

    #[test]
    fn test_short_file() {
        assert_eq!(short_file("src/handler.rs"), "handler.rs");
        assert_eq!(short_file("C:\\src\\handler.rs"), "handler.rs");
        assert_eq!(short_file("main.rs"), "main.rs");
    }
}
