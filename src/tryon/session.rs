// Session - the try-on workflow: inputs, bulk generation, regeneration, export

use super::notify::{Toaster, loading_message};
use super::orchestrator::{GenerationError, GenerationInputs, Orchestrator};
use super::regenerate::{RegenerationController, RegenerationError};
use super::types::{BackgroundSource, GeneratedImage, ToastMessage, UploadedImage, ViewId};
use super::viewer::{ExportError, ResultViewer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

#[derive(Debug, Default)]
struct SessionState {
    person: Option<Arc<UploadedImage>>,
    clothing: Option<Arc<UploadedImage>>,
    directives: String,
    background: BackgroundSource,
    results: Vec<GeneratedImage>,
    error: Option<String>,
    show_results: bool,
    loading_since: Option<Instant>,
}

impl SessionState {
    fn inputs(&self) -> Result<GenerationInputs, GenerationError> {
        GenerationInputs::new(
            self.person.clone(),
            self.clothing.clone(),
            self.directives.clone(),
            self.background,
        )
    }
}

/// Render model of the whole session
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub has_person: bool,
    pub has_clothing: bool,
    pub directives: String,
    pub background: BackgroundSource,
    pub results: Vec<GeneratedImage>,
    pub error: Option<String>,
    pub show_results: bool,
    pub is_loading: bool,
    /// Rotating caption while loading
    pub loading_message: Option<&'static str>,
    pub regenerating: HashSet<ViewId>,
    pub can_generate: bool,
    pub toast: Option<ToastMessage>,
}

/// Ends the loading state if a bulk generation is dropped before it settles
struct LoadingGuard<'a> {
    session: &'a Session,
    armed: bool,
}

impl LoadingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("bulk generation abandoned");
            self.session.lock().loading_since = None;
        }
    }
}

/// One user's try-on workflow
pub struct Session {
    orchestrator: Arc<Orchestrator>,
    regeneration: RegenerationController,
    toaster: Arc<Toaster>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(orchestrator: Arc<Orchestrator>, toaster: Arc<Toaster>) -> Self {
        Self {
            regeneration: RegenerationController::new(Arc::clone(&orchestrator)),
            orchestrator,
            toaster,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn toaster(&self) -> &Arc<Toaster> {
        &self.toaster
    }

    pub fn set_person(&self, image: Option<UploadedImage>) {
        self.lock().person = image.map(Arc::new);
    }

    pub fn set_clothing(&self, image: Option<UploadedImage>) {
        self.lock().clothing = image.map(Arc::new);
    }

    pub fn set_directives(&self, directives: impl Into<String>) {
        self.lock().directives = directives.into();
    }

    pub fn set_background(&self, background: BackgroundSource) {
        self.lock().background = background;
    }

    pub fn can_generate(&self) -> bool {
        let state = self.lock();
        state.person.is_some() && state.clothing.is_some() && state.loading_since.is_none()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading_since.is_some()
    }

    pub fn results(&self) -> Vec<GeneratedImage> {
        self.lock().results.clone()
    }

    /// Run every view. Returns the number of images produced.
    pub async fn generate(&self) -> Result<usize, GenerationError> {
        let inputs = {
            let mut state = self.lock();
            if state.loading_since.is_some() {
                return Err(GenerationError::InProgress);
            }
            let inputs = match state.inputs() {
                Ok(inputs) => inputs,
                Err(e) => {
                    state.error = Some(e.to_string());
                    return Err(e);
                }
            };
            state.loading_since = Some(Instant::now());
            state.error = None;
            state.results.clear();
            state.show_results = false;
            inputs
        };

        let loading = LoadingGuard {
            session: self,
            armed: true,
        };
        let outcome = self.orchestrator.generate_all(&inputs).await;

        let mut state = self.lock();
        state.loading_since = None;
        loading.disarm();

        match outcome {
            Ok(report) => {
                state.results = report.successes();
                state.show_results = true;
                Ok(state.results.len())
            }
            Err(e) => {
                tracing::error!(error = %e, "generation produced no results");
                let message = e.to_string();
                state.error = Some(message.clone());
                drop(state);
                self.toaster.error(message);
                Err(e)
            }
        }
    }

    /// Re-request one view and swap it into the results
    pub async fn regenerate(&self, view: ViewId) -> Result<GeneratedImage, RegenerationError> {
        let inputs = {
            let state = self.lock();
            if state.loading_since.is_some() {
                return Err(RegenerationError::BulkInProgress);
            }
            let inputs = state.inputs().map_err(|_| RegenerationError::MissingInput)?;
            if !state.results.iter().any(|image| image.view == view) {
                return Err(RegenerationError::NotInResults(view));
            }
            inputs
        };

        match self.regeneration.regenerate(&inputs, view).await {
            Ok(image) => {
                let applied = RegenerationController::apply(&mut self.lock().results, image.clone());
                if applied {
                    self.toaster.success(format!("{} regenerated!", image.title));
                } else {
                    tracing::debug!(view = %view, "results changed while regenerating, dropping image");
                }
                Ok(image)
            }
            Err(e @ RegenerationError::Failed { .. }) => {
                self.toaster.error(e.to_string());
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn regenerating(&self) -> HashSet<ViewId> {
        self.regeneration.regenerating()
    }

    /// Back to an empty session
    pub fn reset(&self) {
        let mut state = self.lock();
        state.person = None;
        state.clothing = None;
        state.results.clear();
        state.error = None;
        state.show_results = false;
        state.directives.clear();
        state.background = BackgroundSource::Auto;
    }

    pub fn dismiss_error(&self) {
        self.lock().error = None;
    }

    /// Save the viewer's active image and confirm with a toast
    pub fn export_active(&self, viewer: &mut ResultViewer, dir: &Path) -> Result<PathBuf, ExportError> {
        let results = self.results();
        let path = viewer.export(&results, dir, std::time::Instant::now())?;
        self.toaster.success("Image downloaded successfully!");
        Ok(path)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            has_person: state.person.is_some(),
            has_clothing: state.clothing.is_some(),
            directives: state.directives.clone(),
            background: state.background,
            results: state.results.clone(),
            error: state.error.clone(),
            show_results: state.show_results,
            is_loading: state.loading_since.is_some(),
            loading_message: state.loading_since.map(|since| loading_message(since.elapsed())),
            regenerating: self.regeneration.regenerating(),
            can_generate: state.person.is_some() && state.clothing.is_some() && state.loading_since.is_none(),
            toast: self.toaster.current(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
