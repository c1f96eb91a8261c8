// Notifications - transient toasts, first-run onboarding and loading captions

use super::types::{ToastKind, ToastMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long a toast stays up
pub const TOAST_DURATION: Duration = Duration::from_millis(3000);

#[derive(Default)]
struct ToastSlot {
    current: Option<ToastMessage>,
    timer: Option<JoinHandle<()>>,
    last_id: i64,
}

/// Single-slot toast presenter. A new toast replaces the old one.
#[derive(Default)]
pub struct Toaster {
    slot: Mutex<ToastSlot>,
}

impl Toaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Show a toast and schedule its dismissal. Must run inside a tokio runtime.
    pub fn show(self: &Arc<Self>, message: impl Into<String>, kind: ToastKind) -> i64 {
        let mut slot = self.lock();

        let id = Utc::now().timestamp_millis().max(slot.last_id + 1);
        slot.last_id = id;
        slot.current = Some(ToastMessage {
            id,
            message: message.into(),
            kind,
        });

        if let Some(previous) = slot.timer.take() {
            previous.abort();
        }

        let deadline = tokio::time::Instant::now() + TOAST_DURATION;
        let toaster = Arc::downgrade(self);
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(toaster) = toaster.upgrade() {
                toaster.expire(id);
            }
        }));

        id
    }

    pub fn success(self: &Arc<Self>, message: impl Into<String>) -> i64 {
        self.show(message, ToastKind::Success)
    }

    pub fn error(self: &Arc<Self>, message: impl Into<String>) -> i64 {
        self.show(message, ToastKind::Error)
    }

    /// Dismiss the current toast early
    pub fn close(&self) {
        let mut slot = self.lock();
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.current = None;
    }

    pub fn current(&self) -> Option<ToastMessage> {
        self.lock().current.clone()
    }

    fn expire(&self, id: i64) {
        let mut slot = self.lock();
        if slot.current.as_ref().is_some_and(|t| t.id == id) {
            slot.current = None;
            slot.timer = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, ToastSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Toaster {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
    }
}

/// Durable "has the user seen the welcome screen" flag
pub trait FirstRunState: Send + Sync {
    fn has_visited(&self) -> bool;

    fn mark_seen(&self) -> Result<(), FirstRunError>;
}

const STATE_DIR_NAME: &str = "ai-wardrobe";
const STATE_FILE_NAME: &str = "first_run.json";

#[derive(Debug, Serialize, Deserialize)]
struct FirstRunRecord {
    visited: bool,
    first_seen: DateTime<Utc>,
}

/// Flag stored as a small JSON file
#[derive(Debug, Clone)]
pub struct FileFirstRunState {
    path: PathBuf,
}

impl FileFirstRunState {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STATE_FILE_NAME),
        }
    }

    /// Platform data directory, e.g. `~/.local/share/ai-wardrobe`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join(STATE_DIR_NAME))
    }

    /// Use `dir` when given, else the platform data directory
    pub fn locate(dir: Option<&Path>) -> Option<Self> {
        match dir {
            Some(dir) => Some(Self::new(dir)),
            None => Self::default_dir().map(Self::new),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the welcome screen was first dismissed
    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        self.read().ok().map(|record| record.first_seen)
    }

    fn read(&self) -> Result<FirstRunRecord, FirstRunError> {
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl FirstRunState for FileFirstRunState {
    fn has_visited(&self) -> bool {
        match self.read() {
            Ok(record) => record.visited,
            Err(FirstRunError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "unreadable first-run state");
                false
            }
        }
    }

    fn mark_seen(&self) -> Result<(), FirstRunError> {
        if let Ok(record) = self.read() {
            if record.visited {
                return Ok(());
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let record = FirstRunRecord {
            visited: true,
            first_seen: Utc::now(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&record)?)?;
        Ok(())
    }
}

/// In-memory flag
#[derive(Debug, Default)]
pub struct MemoryFirstRunState {
    visited: Mutex<bool>,
}

impl MemoryFirstRunState {
    pub fn visited() -> Self {
        Self {
            visited: Mutex::new(true),
        }
    }
}

impl FirstRunState for MemoryFirstRunState {
    fn has_visited(&self) -> bool {
        *self.visited.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark_seen(&self) -> Result<(), FirstRunError> {
        *self.visited.lock().unwrap_or_else(|e| e.into_inner()) = true;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FirstRunError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub const WELCOME_MARKDOWN: &str = r#"# Welcome to AI Wardrobe!

Ready to revolutionize your style? Here's how it works:

1. Upload a clear, full-body photo of yourself.
2. Upload an image of a clothing item you want to try on.
3. (Optional) Add creative directives for pose, lighting, or background.
4. Click Generate and watch the magic happen!
"#;

/// Welcome modal state
pub struct Onboarding {
    state: Arc<dyn FirstRunState>,
    visible: bool,
}

impl Onboarding {
    /// Reads the flag once
    pub fn new(state: Arc<dyn FirstRunState>) -> Self {
        let visible = !state.has_visited();
        Self { state, visible }
    }

    pub fn should_show(&self) -> bool {
        self.visible
    }

    /// Hide the modal and remember it. The modal hides even if persisting fails.
    pub fn dismiss(&mut self) -> Result<(), FirstRunError> {
        self.visible = false;
        self.state.mark_seen()
    }
}

pub const LOADING_MESSAGES: [&str; 6] = [
    "Warming up the AI stylist...",
    "Stitching pixels together...",
    "Perfecting the fit and lighting...",
    "Tailoring your virtual look...",
    "Almost ready for the runway...",
    "This can take a moment, thank you for your patience.",
];

pub const LOADING_ROTATION: Duration = Duration::from_secs(3);

/// Caption for a generation that has been running for `elapsed`
pub fn loading_message(elapsed: Duration) -> &'static str {
    let step = (elapsed.as_millis() / LOADING_ROTATION.as_millis()) as usize;
    LOADING_MESSAGES[step % LOADING_MESSAGES.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_toast_expires() {
        let toaster = Toaster::new();
        toaster.success("Saved");
        assert_eq!(toaster.current().unwrap().message, "Saved");
        assert_eq!(toaster.current().unwrap().kind, ToastKind::Success);

        tokio::time::advance(Duration::from_millis(2999)).await;
        settle().await;
        assert!(toaster.current().is_some());

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        assert!(toaster.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_toast_replaces_and_restarts_timer() {
        let toaster = Toaster::new();
        let first = toaster.success("first");

        tokio::time::advance(Duration::from_millis(2000)).await;
        let second = toaster.error("second");
        assert!(second > first);

        // The first timer would have fired here
        tokio::time::advance(Duration::from_millis(1500)).await;
        settle().await;
        let current = toaster.current().unwrap();
        assert_eq!(current.id, second);
        assert_eq!(current.kind, ToastKind::Error);

        tokio::time::advance(Duration::from_millis(1600)).await;
        settle().await;
        assert!(toaster.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_starts_at_show_not_first_poll() {
        let toaster = Toaster::new();
        toaster.success("quick");

        // No yield between show and advance, so the timer task has not run yet
        tokio::time::advance(TOAST_DURATION).await;
        settle().await;
        assert!(toaster.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_timer() {
        let toaster = Toaster::new();
        toaster.success("bye");
        toaster.close();
        assert!(toaster.current().is_none());

        let id = toaster.success("again");
        tokio::time::advance(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(toaster.current().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_ids_are_unique_within_a_millisecond() {
        let toaster = Toaster::new();
        let a = toaster.success("a");
        let b = toaster.success("b");
        let c = toaster.success("c");
        assert!(a < b && b < c);
    }

    #[test]
    fn test_file_state_persists() {
        let dir = tempfile::tempdir().unwrap();
        let state = FileFirstRunState::new(dir.path().join("nested"));

        assert!(!state.has_visited());
        assert!(state.first_seen().is_none());

        state.mark_seen().unwrap();
        let first_seen = state.first_seen().unwrap();

        let reopened = FileFirstRunState::new(dir.path().join("nested"));
        assert!(reopened.has_visited());

        reopened.mark_seen().unwrap();
        assert_eq!(reopened.first_seen(), Some(first_seen));
    }

    #[test]
    fn test_corrupt_file_counts_as_first_visit() {
        let dir = tempfile::tempdir().unwrap();
        let state = FileFirstRunState::new(dir.path());
        std::fs::write(state.path(), "not json").unwrap();
        assert!(!state.has_visited());
    }

    #[test]
    fn test_onboarding_shows_once() {
        let state: Arc<dyn FirstRunState> = Arc::new(MemoryFirstRunState::default());

        let mut onboarding = Onboarding::new(Arc::clone(&state));
        assert!(onboarding.should_show());
        onboarding.dismiss().unwrap();
        assert!(!onboarding.should_show());

        assert!(!Onboarding::new(state).should_show());
        assert!(!Onboarding::new(Arc::new(MemoryFirstRunState::visited())).should_show());
    }

    #[test]
    fn test_welcome_has_four_steps() {
        let steps = WELCOME_MARKDOWN.lines().filter(|l| l.chars().next().is_some_and(|c| c.is_ascii_digit())).count();
        assert_eq!(steps, 4);
    }

    #[test]
    fn test_loading_message_rotation() {
        assert_eq!(loading_message(Duration::ZERO), LOADING_MESSAGES[0]);
        assert_eq!(loading_message(Duration::from_millis(2999)), LOADING_MESSAGES[0]);
        assert_eq!(loading_message(Duration::from_secs(3)), LOADING_MESSAGES[1]);
        assert_eq!(loading_message(Duration::from_secs(15)), LOADING_MESSAGES[5]);
        assert_eq!(loading_message(Duration::from_secs(18)), LOADING_MESSAGES[0]);
    }
}
