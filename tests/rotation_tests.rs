use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lazylog_fanout::{Flags, Handler, INFINITE, RotatingHandler};

fn rotating(dir: &Path, max_files: usize, max_size: u64, interval: Duration) -> Handler {
    RotatingHandler::builder(dir, "service")
        .max_files(max_files)
        .max_size(max_size)
        .check_interval(interval)
        .flags(Flags::empty())
        .build()
        .expect("create rotating handler")
        .into()
}

/// `(suffix, path)` of every log file in `dir`.
fn files_by_suffix(dir: &Path) -> BTreeMap<u64, PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            let mut parts = name.rsplitn(3, '.');
            assert_eq!(parts.next(), Some("log"));
            let suffix = parts.next()?.parse().ok()?;
            Some((suffix, path))
        })
        .collect()
}

#[test]
fn test_round_robin_scenario_evicts_oldest_slot() {
    let dir = tempfile::tempdir().unwrap();
    let handler = rotating(dir.path(), 3, 100, Duration::from_secs(3600));
    let rotating = handler.as_rotating().unwrap();

    let mut seen = vec![rotating.suffix()];
    let mut generation = 0;
    while seen.len() < 4 {
        handler
            .info(format_args!("generation {generation} {}", "-".repeat(30)))
            .unwrap();
        if rotating.check_rotation().unwrap() {
            seen.push(rotating.suffix());
            generation += 1;
        }
    }
    assert_eq!(seen, vec![0, 1, 2, 0]);

    let files = files_by_suffix(dir.path());
    assert_eq!(files.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    // Slot 0 lost its first-generation lines when it was reused.
    assert_eq!(fs::read_to_string(&files[&0]).unwrap(), "");
    assert!(fs::read_to_string(&files[&1]).unwrap().contains("generation 1 "));
    assert!(fs::read_to_string(&files[&2]).unwrap().contains("generation 2 "));

    handler.info(format_args!("fresh")).unwrap();
    assert_eq!(fs::read_to_string(&files[&0]).unwrap(), "info [fresh]\n");
}

#[test]
fn test_names_share_directory_base_and_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let handler = rotating(dir.path(), INFINITE, 1000, Duration::from_secs(3600));
    let rotating = handler.as_rotating().unwrap();
    let tag = rotating.epoch_tag();

    for _ in 0..3 {
        rotating.rotate().unwrap();
    }
    for (suffix, path) in files_by_suffix(dir.path()) {
        assert_eq!(path, dir.path().join(format!("service.{tag}.{suffix}.log")));
    }
    assert_eq!(rotating.suffix(), 3);
}

#[test]
fn test_concurrent_writers_during_background_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let handler = Arc::new(rotating(
        dir.path(),
        INFINITE,
        512,
        Duration::from_millis(2),
    ));

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let handler = Arc::clone(&handler);
            std::thread::spawn(move || {
                for i in 0..500 {
                    handler
                        .info(format_args!("writer {t} record {i:05} payload"))
                        .unwrap();
                    if i % 50 == 0 {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }
    handler.close().unwrap();

    let files = files_by_suffix(dir.path());
    assert!(files.len() > 1, "background monitor should have rotated");

    let mut total = 0;
    for path in files.values() {
        for line in fs::read_to_string(path).unwrap().lines() {
            assert!(line.starts_with("info [writer "), "{line}");
            assert!(line.ends_with(" payload]"), "{line}");
            total += 1;
        }
    }
    assert_eq!(total, 4 * 500);
}

#[test]
fn test_close_stops_monitor_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let handler = rotating(dir.path(), 3, 10, Duration::from_secs(3600));

    let started = std::time::Instant::now();
    handler.close().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    handler.close().unwrap();
}
