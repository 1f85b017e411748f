//! Append-only JSONL event store
//!
//! Layout: `<root>/<service>/<YYYY-MM-DD>/<run_id>.jsonl`, UTC date segments,
//! one JSON object per line.
//!
//! Appends take no lock. Each event is serialized into a single buffer that
//! ends in `\n` and handed to one `write_all` on a file opened with
//! `O_APPEND`, so concurrent writers from other processes never interleave
//! inside a line.
//!
//! # Example
//!
//! ```rust,no_run
//! use guck_core::event::{EmitContext, EventInput};
//! use guck_core::storage::JsonlStore;
//!
//! let store = JsonlStore::new("/tmp/guck-logs");
//! let event = EventInput::message("hello").normalize(&EmitContext::new("api"));
//! let path = store.append(&event).unwrap();
//! println!("wrote {}", path.display());
//! ```

use std::io::Write;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::error::{GuckError, Result};
use crate::event::Event;
use crate::time::date_segment;

const JSONL_EXTENSION: &str = "jsonl";

/// File-backed store rooted at a directory
#[derive(Debug, Clone)]
pub struct JsonlStore {
    root: PathBuf,
}

impl JsonlStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an event is appended to
    pub fn event_path(&self, event: &Event) -> PathBuf {
        self.root
            .join(&event.service)
            .join(date_segment(&event.ts))
            .join(format!("{}.{}", event.run_id, JSONL_EXTENSION))
    }

    /// Append one event, creating intermediate directories.
    ///
    /// The service must be a single path segment.
    ///
    /// Directories are opened up to `0o777` and the file to `0o666` so that
    /// processes running as other users can append too. Permission changes
    /// are best effort.
    pub fn append(&self, event: &Event) -> Result<PathBuf> {
        validate_service(&event.service)?;
        let path = self.event_path(event);
        let dir = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir)?;

        let mut chmod_dir = Some(dir);
        while let Some(current) = chmod_dir {
            set_mode(current, 0o777);
            if current == self.root {
                break;
            }
            chmod_dir = current.parent().filter(|p| p.starts_with(&self.root));
        }

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(&line)?;
        set_mode(&path, 0o666);

        Ok(path)
    }

    /// Every `.jsonl` file under the store, or under `<root>/<service>` when
    /// a service is given. Paths are sorted; a missing directory yields an
    /// empty list. A service that is not a single path segment is rejected.
    pub async fn list_files(&self, service: Option<&str>) -> Result<Vec<PathBuf>> {
        let base = match service {
            Some(service) => {
                validate_service(service)?;
                self.root.join(service)
            }
            None => self.root.clone(),
        };
        if !tokio::fs::try_exists(&base).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut pending = vec![base];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Skipping unreadable directory {}: {}", dir.display(), e);
                    continue;
                }
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == JSONL_EXTENSION) {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Stream the events of one file in line order.
    ///
    /// Lines that are blank, not UTF-8, or fail to parse are skipped and the
    /// scan carries on with the next line. Returns `ControlFlow::Break` if the
    /// visitor stopped the scan.
    pub async fn scan_file<F>(&self, path: &Path, mut visit: F) -> Result<ControlFlow<()>>
    where
        F: FnMut(Event) -> ControlFlow<()>,
    {
        let file = tokio::fs::File::open(path).await?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut line_no = 0usize;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            line_no += 1;
            let trimmed = buf.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            let event = match serde_json::from_slice::<Event>(trimmed) {
                Ok(event) => event,
                Err(e) => {
                    debug!("Skipping {}:{}: {}", path.display(), line_no, e);
                    continue;
                }
            };
            if visit(event).is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Read every parseable event from one file
    pub async fn read_file(&self, path: &Path) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        let _flow = self
            .scan_file(path, |event| {
                events.push(event);
                ControlFlow::Continue(())
            })
            .await?;
        Ok(events)
    }
}

/// Services name exactly one directory under the store root
fn validate_service(service: &str) -> Result<()> {
    let bad = service.is_empty()
        || service == "."
        || service == ".."
        || service.contains(['/', '\\', '\0']);
    if bad {
        return Err(GuckError::invalid_params(format!(
            "service {:?} is not a valid store directory name",
            service
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EmitContext, EventInput};
    use tempfile::TempDir;

    fn event(service: &str, run_id: &str, ts: &str, message: &str) -> Event {
        let mut input = EventInput::message(message);
        input.ts = Some(ts.to_string());
        input.normalize(&EmitContext::new(service).with_run_id(run_id))
    }

    #[test]
    fn test_event_path_layout() {
        let store = JsonlStore::new("/store");
        let e = event("api", "run-1", "2026-01-02T23:59:00.000+01:00", "x");
        assert_eq!(
            store.event_path(&e),
            PathBuf::from("/store/api/2026-01-02/run-1.jsonl")
        );
    }

    #[tokio::test]
    async fn test_append_writes_one_line_per_event() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path());
        let first = event("api", "run-1", "2026-01-01T00:00:00.000Z", "first");
        let second = event("api", "run-1", "2026-01-01T00:00:01.000Z", "second");

        let path = store.append(&first).unwrap();
        assert_eq!(store.append(&second).unwrap(), path);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.ends_with('\n'));

        let events = store.read_file(&path).await.unwrap();
        assert_eq!(events, vec![first, second]);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path());
        let good = event("api", "run-1", "2026-01-01T00:00:00.000Z", "good");
        let path = store.append(&good).unwrap();

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "[1, 2, 3]").unwrap();

        assert_eq!(store.read_file(&path).await.unwrap(), vec![good]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_hide_later_events() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path());
        let first = event("api", "run-1", "2026-01-01T00:00:00.000Z", "first");
        let second = event("api", "run-1", "2026-01-01T00:00:01.000Z", "second");
        let path = store.append(&first).unwrap();

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\xff\xfe garbage\n").unwrap();
        drop(file);
        store.append(&second).unwrap();

        assert_eq!(store.read_file(&path).await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_list_files_scoped_and_sorted() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path());
        store.append(&event("web", "b", "2026-01-02T00:00:00Z", "x")).unwrap();
        store.append(&event("web", "a", "2026-01-01T00:00:00Z", "x")).unwrap();
        store.append(&event("api", "c", "2026-01-01T00:00:00Z", "x")).unwrap();
        std::fs::write(dir.path().join("web").join("notes.txt"), "ignored").unwrap();

        let all = store.list_files(None).await.unwrap();
        assert_eq!(all.len(), 3);
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);

        let web = store.list_files(Some("web")).await.unwrap();
        assert_eq!(web.len(), 2);
        assert!(web[0].ends_with("web/2026-01-01/a.jsonl"));

        assert!(store.list_files(Some("missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_service_must_be_single_segment() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path().join("store"));
        std::fs::create_dir_all(dir.path().join("outside/secret/2026-01-01")).unwrap();
        std::fs::write(dir.path().join("outside/secret/2026-01-01/r.jsonl"), "{}\n").unwrap();

        for service in ["..", ".", "/", "../outside/secret", "a/b", "a\\b", ""] {
            let err = store.list_files(Some(service)).await.unwrap_err();
            assert_eq!(err.error_code(), "INVALID_PARAMETERS", "service {:?}", service);
        }

        let mut escaping = event("api", "run-1", "2026-01-01T00:00:00Z", "x");
        escaping.service = "../outside".into();
        assert!(matches!(
            store.append(&escaping),
            Err(GuckError::InvalidParameters { .. })
        ));
        assert!(!dir.path().join("outside/2026-01-01").exists());
    }

    #[tokio::test]
    async fn test_scan_stops_on_break() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path());
        let mut path = PathBuf::new();
        for i in 0..5 {
            path = store
                .append(&event("api", "run", "2026-01-01T00:00:00Z", &format!("m{}", i)))
                .unwrap();
        }

        let mut seen = 0;
        let flow = store
            .scan_file(&path, |_| {
                seen += 1;
                if seen == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await
            .unwrap();
        assert!(flow.is_break());
        assert_eq!(seen, 2);
    }
}
