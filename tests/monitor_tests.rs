//! The monitor reports failed checks through `tracing` and keeps running.
//!
//! Kept in its own test binary because it installs a global subscriber.

use std::fs;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lazylog_fanout::{Flags, Handler, INFINITE, RotatingHandler};

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Buffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn test_monitor_survives_failed_ticks() {
    let captured = Buffer::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("install subscriber");

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("logs");
    let handler: Handler = RotatingHandler::builder(&dir, "app")
        .max_files(INFINITE)
        .max_size(40)
        .check_interval(Duration::from_millis(10))
        .flags(Flags::empty())
        .build()
        .unwrap()
        .into();
    let rotating = handler.as_rotating().unwrap();
    let first = rotating.current_path();

    // Make the directory unusable: every tick now fails.
    fs::remove_dir_all(&dir).unwrap();
    fs::write(&dir, "not a directory").unwrap();
    assert!(
        wait_for(|| captured.contents().contains("log rotation check failed")),
        "tick failure should be reported"
    );
    assert_eq!(rotating.current_path(), first);

    // Restore the directory; the same monitor picks up again.
    fs::remove_file(&dir).unwrap();
    fs::create_dir_all(&dir).unwrap();
    assert!(
        wait_for(|| first.exists()),
        "monitor should reopen the missing file"
    );

    assert!(
        wait_for(|| {
            handler.info(format_args!("{}", "y".repeat(40))).unwrap();
            rotating.suffix() >= 1
        }),
        "monitor should rotate after recovering"
    );

    handler.close().unwrap();
}
