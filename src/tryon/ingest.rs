// Ingestion Surface - file pick, drag and drop, and clipboard paste for one upload slot

use super::preview::{PreviewHandle, PreviewRef};
use super::types::{ImageFile, UploadedImage};
use super::validator::{UploadError, UploadValidator, Validated};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};

/// What an uploader currently offers to its consumer
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SlotState {
    /// Nothing uploaded yet
    #[default]
    Empty,
    Ready(UploadedImage),
    /// An image was uploaded and then explicitly cleared
    Cleared,
}

impl SlotState {
    pub fn image(&self) -> Option<&UploadedImage> {
        match self {
            SlotState::Ready(image) => Some(image),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestChannel {
    Picked,
    Dropped,
    Pasted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    /// A newer ingestion or a clear started while this one was validating
    Superseded,
}

/// One entry of a clipboard paste
#[derive(Debug, Clone)]
pub struct ClipboardItem {
    pub mime_type: String,
    pub file: Option<ImageFile>,
}

impl ClipboardItem {
    pub fn file(file: ImageFile) -> Self {
        Self {
            mime_type: file.mime_type.clone(),
            file: Some(file),
        }
    }

    pub fn text() -> Self {
        Self {
            mime_type: "text/plain".to_string(),
            file: None,
        }
    }
}

/// Routes clipboard pastes to whichever uploader holds the live subscription
#[derive(Debug, Default)]
pub struct PasteBus {
    target: Mutex<Option<PasteTarget>>,
    next_token: AtomicU64,
}

#[derive(Debug)]
struct PasteTarget {
    token: u64,
    tx: mpsc::UnboundedSender<ImageFile>,
}

impl PasteBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take over paste delivery. Any earlier subscription stops receiving.
    pub fn subscribe(self: &Arc<Self>) -> PasteSubscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock() = Some(PasteTarget { token, tx });

        PasteSubscription {
            token,
            bus: Arc::clone(self),
            rx,
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.lock().is_some()
    }

    /// Deliver the first image item of a paste. Returns whether anyone received it.
    pub fn paste(&self, items: Vec<ClipboardItem>) -> bool {
        let Some(file) = items
            .into_iter()
            .filter(|item| item.mime_type.contains("image"))
            .find_map(|item| item.file)
        else {
            return false;
        };

        match self.lock().as_ref() {
            Some(target) => target.tx.send(file).is_ok(),
            None => false,
        }
    }

    fn unsubscribe(&self, token: u64) {
        let mut target = self.lock();
        if target.as_ref().is_some_and(|t| t.token == token) {
            *target = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PasteTarget>> {
        self.target.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Scoped paste registration. Unregisters itself when dropped.
#[derive(Debug)]
pub struct PasteSubscription {
    token: u64,
    bus: Arc<PasteBus>,
    rx: mpsc::UnboundedReceiver<ImageFile>,
}

impl PasteSubscription {
    pub fn try_next(&mut self) -> Option<ImageFile> {
        self.rx.try_recv().ok()
    }
}

impl Drop for PasteSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.token);
    }
}

/// Render model of an uploader
#[derive(Debug, Clone, PartialEq)]
pub struct UploaderView {
    pub title: String,
    pub file_name: Option<String>,
    pub error: Option<String>,
    pub preview: Option<PreviewRef>,
    pub is_dragging: bool,
    pub is_focused: bool,
}

#[derive(Debug, Default)]
struct SlotInner {
    handle: Option<PreviewHandle>,
    file_name: Option<String>,
    error: Option<String>,
    is_dragging: bool,
    paste: Option<PasteSubscription>,
    generation: u64,
}

/// One upload slot (person photo or clothing photo)
#[derive(Debug)]
pub struct Uploader {
    title: String,
    validator: UploadValidator,
    inner: Mutex<SlotInner>,
    state: watch::Sender<SlotState>,
}

impl Uploader {
    pub fn new(title: impl Into<String>, validator: UploadValidator) -> Self {
        let (state, _) = watch::channel(SlotState::Empty);
        Self {
            title: title.into(),
            validator,
            inner: Mutex::new(SlotInner::default()),
            state,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Watch the slot. The receiver sees `Ready`, `Cleared`, or the initial `Empty`.
    pub fn subscribe(&self) -> watch::Receiver<SlotState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> SlotState {
        self.state.borrow().clone()
    }

    /// Explicit file selection
    pub async fn pick(&self, file: ImageFile) -> Result<IngestOutcome, UploadError> {
        self.ingest(file, IngestChannel::Picked).await
    }

    pub fn drag_enter(&self) {
        self.lock().is_dragging = true;
    }

    pub fn drag_over(&self) {
        self.lock().is_dragging = true;
    }

    pub fn drag_leave(&self) {
        self.lock().is_dragging = false;
    }

    pub fn is_dragging(&self) -> bool {
        self.lock().is_dragging
    }

    /// Finish a drag. Only the first dropped file is ingested.
    pub async fn drop_files(&self, files: Vec<ImageFile>) -> Option<Result<IngestOutcome, UploadError>> {
        self.lock().is_dragging = false;
        let file = files.into_iter().next()?;
        Some(self.ingest(file, IngestChannel::Dropped).await)
    }

    /// Start receiving pastes from the bus
    pub fn focus(&self, bus: &Arc<PasteBus>) {
        self.lock().paste = Some(bus.subscribe());
    }

    pub fn blur(&self) {
        self.lock().paste = None;
    }

    pub fn is_focused(&self) -> bool {
        self.lock().paste.is_some()
    }

    /// Ingest a file pasted while this slot held focus, if one is waiting
    pub async fn take_paste(&self) -> Option<Result<IngestOutcome, UploadError>> {
        let file = self.lock().paste.as_mut()?.try_next()?;
        Some(self.ingest(file, IngestChannel::Pasted).await)
    }

    /// Drop the current image and tell the consumer it is gone
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        if let Some(handle) = inner.handle.take() {
            handle.release();
        }
        inner.file_name = None;
        inner.error = None;
        self.state.send_replace(SlotState::Cleared);

        tracing::debug!(slot = %self.title, "upload cleared");
    }

    /// Hide the last validation error
    pub fn dismiss_error(&self) {
        self.lock().error = None;
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn snapshot(&self) -> UploaderView {
        let inner = self.lock();
        UploaderView {
            title: self.title.clone(),
            file_name: inner.file_name.clone(),
            error: inner.error.clone(),
            preview: inner.handle.as_ref().map(|h| h.url().clone()),
            is_dragging: inner.is_dragging,
            is_focused: inner.paste.is_some(),
        }
    }

    async fn ingest(&self, file: ImageFile, channel: IngestChannel) -> Result<IngestOutcome, UploadError> {
        tracing::debug!(slot = %self.title, ?channel, file = %file.name, "ingesting file");

        let ticket = self.start_ingest();
        let result = self.validator.validate(file).await;
        self.finish_ingest(ticket, result)
    }

    fn start_ingest(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.generation
    }

    fn finish_ingest(
        &self,
        ticket: u64,
        result: Result<Validated, UploadError>,
    ) -> Result<IngestOutcome, UploadError> {
        let mut inner = self.lock();

        if inner.generation != ticket {
            tracing::debug!(slot = %self.title, "discarding superseded validation");
            return Ok(IngestOutcome::Superseded);
        }

        match result {
            Ok(Validated { image, handle }) => {
                // Replacing the handle revokes the previous preview
                inner.handle = Some(handle);
                inner.file_name = Some(image.file.name.clone());
                inner.error = None;
                self.state.send_replace(SlotState::Ready(image));
                Ok(IngestOutcome::Accepted)
            }
            Err(e) => {
                tracing::warn!(slot = %self.title, error = %e, "upload rejected");
                inner.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
