// Generation backends - the remote capability that renders try-on images

mod gemini;

pub use gemini::{GeminiBackend, GeminiSettings};

use super::types::{BackgroundSource, ImageBytes, UploadedImage, ViewId};
use async_trait::async_trait;
use std::sync::Arc;

/// Everything a backend needs for one view
#[derive(Debug, Clone)]
pub struct TryOnRequest {
    pub person: Arc<UploadedImage>,
    pub clothing: Arc<UploadedImage>,
    pub view: ViewId,
    pub directives: String,
    pub background: BackgroundSource,
    /// Ask for a different take on a view that already has a result
    pub regenerate: bool,
}

/// Base trait for generation backends
#[async_trait]
pub trait TryOnBackend: Send + Sync {
    /// Render one view of the person wearing the clothing item
    async fn generate(&self, request: &TryOnRequest) -> Result<ImageBytes, BackendError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No image returned{}", .0.as_deref().map(|t| format!(": {}", t)).unwrap_or_default())]
    NoImage(Option<String>),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::tryon::preview::PreviewStore;
    use crate::tryon::types::ImageFile;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// An upload that skips validation; its preview is already revoked
    pub fn upload(name: &str) -> Arc<UploadedImage> {
        let store = PreviewStore::new();
        let preview = store.create(name.as_bytes()).url().clone();
        Arc::new(UploadedImage {
            file: ImageFile::new(name, "image/png", name.as_bytes().to_vec()),
            base64: String::from("cGhvdG8="),
            preview,
            width: 512,
            height: 512,
        })
    }

    /// Backend with per-view scripted failures and delays
    #[derive(Default)]
    pub struct ScriptedBackend {
        failing: Mutex<HashMap<ViewId, String>>,
        delays: Mutex<HashMap<ViewId, Duration>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<(ViewId, bool)>>,
    }

    impl ScriptedBackend {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn fail(&self, view: ViewId, cause: &str) {
            self.failing.lock().unwrap().insert(view, cause.to_string());
        }

        pub fn succeed(&self, view: ViewId) {
            self.failing.lock().unwrap().remove(&view);
        }

        pub fn fail_all(&self, cause: &str) {
            for view in crate::tryon::types::VIEWS {
                self.fail(view.id, cause);
            }
        }

        pub fn delay(&self, view: ViewId, delay: Duration) {
            self.delays.lock().unwrap().insert(view, delay);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<(ViewId, bool)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TryOnBackend for ScriptedBackend {
        async fn generate(&self, request: &TryOnRequest) -> Result<ImageBytes, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push((request.view, request.regenerate));

            let delay = self.delays.lock().unwrap().get(&request.view).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let failure = self.failing.lock().unwrap().get(&request.view).cloned();
            match failure {
                Some(cause) => Err(BackendError::Api { status: 500, message: cause }),
                None => Ok(ImageBytes::new(
                    format!("{}#{}", request.view, n).into_bytes(),
                    "image/png",
                )),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}
