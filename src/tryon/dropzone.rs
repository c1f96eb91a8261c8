// Drop Zone - a watched folder whose new files feed an uploader

use super::types::ImageFile;
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify_debouncer_full::{
    DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache, new_debouncer,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Watches one directory and yields files dropped into it
pub struct DropZone {
    dir: PathBuf,
    rx: mpsc::UnboundedReceiver<ImageFile>,
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl DropZone {
    /// Start watching `dir`, creating it if needed
    pub fn watch(
        dir: impl Into<PathBuf>,
        ignore_patterns: Vec<String>,
        debounce: Duration,
    ) -> Result<Self, DropZoneError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let label = dir.display().to_string();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    forward(&events, &ignore_patterns, &tx);
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(dir = %label, %error, "watch error");
                    }
                }
            }
        })?;

        debouncer.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(dir = %dir.display(), debounce_ms = debounce.as_millis() as u64, "watching drop folder");

        Ok(Self {
            dir,
            rx,
            _debouncer: debouncer,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Next dropped file. Cancel-safe: files are read before they are queued.
    pub async fn next(&mut self) -> Option<ImageFile> {
        self.rx.recv().await
    }
}

/// Read every newly arrived file of a debounced batch and queue it.
/// Runs on the watcher thread. Returns how many files were queued.
fn forward(events: &[DebouncedEvent], ignore_patterns: &[String], tx: &mpsc::UnboundedSender<ImageFile>) -> usize {
    let mut seen = HashSet::new();
    let mut queued = 0;

    for event in events {
        if !is_arrival(&event.event.kind) {
            continue;
        }
        for path in &event.event.paths {
            if should_ignore(path, ignore_patterns) || !seen.insert(path.clone()) || !path.is_file() {
                continue;
            }
            match ImageFile::read_path(path) {
                Ok(file) => {
                    tracing::debug!(path = %path.display(), size = file.size(), "file dropped");
                    // Receiver gone means the zone was dropped
                    if tx.send(file).is_ok() {
                        queued += 1;
                    }
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not read dropped file"),
            }
        }
    }

    queued
}

/// Events that can mean a new file is ready
fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both | RenameMode::Any))
    )
}

/// Hidden files and anything matching an ignore glob are skipped
pub fn should_ignore(path: &Path, patterns: &[String]) -> bool {
    let hidden = path
        .file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'));
    if hidden {
        return true;
    }

    let path_str = path.to_string_lossy();
    patterns
        .iter()
        .any(|pattern| glob_match::glob_match(pattern, &path_str))
}

#[derive(Debug, thiserror::Error)]
pub enum DropZoneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::Event;
    use notify::event::{AccessKind, DataChange, RemoveKind};
    use std::time::Instant;

    fn event(kind: EventKind, path: &Path) -> DebouncedEvent {
        DebouncedEvent::new(Event::new(kind).add_path(path.to_path_buf()), Instant::now())
    }

    fn patterns() -> Vec<String> {
        crate::tryon::config::WatchConfig::default().ignore_patterns
    }

    #[test]
    fn test_should_ignore_hidden_and_partial_files() {
        let patterns = patterns();
        assert!(should_ignore(Path::new("/inbox/person/.DS_Store"), &patterns));
        assert!(should_ignore(Path::new("/inbox/person/photo.jpg.crdownload"), &patterns));
        assert!(should_ignore(Path::new("/inbox/clothing/coat.png.part"), &patterns));
        assert!(!should_ignore(Path::new("/inbox/clothing/coat.png"), &patterns));
        assert!(!should_ignore(Path::new("/inbox/clothing/coat.png"), &[]));
    }

    #[test]
    fn test_arrival_events() {
        assert!(is_arrival(&EventKind::Create(CreateKind::File)));
        assert!(is_arrival(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_arrival(&EventKind::Create(CreateKind::Folder)));
        assert!(!is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::From))));
        assert!(!is_arrival(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_arrival(&EventKind::Access(AccessKind::Any)));
    }

    #[tokio::test]
    async fn test_watch_creates_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("inbox").join("person");

        let zone = DropZone::watch(&dir, patterns(), Duration::from_millis(50)).unwrap();
        assert!(dir.is_dir());
        assert_eq!(zone.dir(), dir.as_path());
    }

    #[tokio::test]
    async fn test_forward_queues_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("me.png");
        let hidden = dir.path().join(".me.png");
        std::fs::write(&photo, b"png bytes").unwrap();
        std::fs::write(&hidden, b"x").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = vec![
            event(EventKind::Create(CreateKind::File), &photo),
            event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &photo),
            event(EventKind::Create(CreateKind::File), &hidden),
            event(EventKind::Remove(RemoveKind::File), &photo),
            event(EventKind::Create(CreateKind::File), &dir.path().join("gone.png")),
        ];
        assert_eq!(forward(&events, &patterns(), &tx), 1);

        // The bytes are already queued, so the file can disappear
        std::fs::remove_file(&photo).unwrap();

        let file = rx.recv().await.unwrap();
        assert_eq!(file.name, "me.png");
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.bytes, b"png bytes");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_loses_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("coat.webp");
        std::fs::write(&photo, b"webp").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();

        // A wait abandoned by select!/timeout holds no file
        assert!(tokio::time::timeout(Duration::from_millis(10), rx.recv()).await.is_err());

        assert_eq!(forward(&[event(EventKind::Create(CreateKind::File), &photo)], &[], &tx), 1);

        let file = rx.recv().await.unwrap();
        assert_eq!(file.name, "coat.webp");
        assert_eq!(file.bytes, b"webp");
    }
}
