// Regeneration Controller - re-requests single views while the rest stays usable

use super::orchestrator::{GenerationInputs, Orchestrator};
use super::types::{GeneratedImage, ViewId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Views with a regeneration in flight
#[derive(Debug, Default)]
pub struct RegeneratingSet {
    views: Mutex<HashSet<ViewId>>,
}

impl RegeneratingSet {
    pub fn contains(&self, view: ViewId) -> bool {
        self.lock().contains(&view)
    }

    pub fn snapshot(&self) -> HashSet<ViewId> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<ViewId>> {
        self.views.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Marks a view as regenerating for as long as it lives
#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<RegeneratingSet>,
    view: ViewId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.view);
    }
}

pub struct RegenerationController {
    orchestrator: Arc<Orchestrator>,
    in_flight: Arc<RegeneratingSet>,
}

impl RegenerationController {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            in_flight: Arc::new(RegeneratingSet::default()),
        }
    }

    pub fn is_regenerating(&self, view: ViewId) -> bool {
        self.in_flight.contains(view)
    }

    pub fn regenerating(&self) -> HashSet<ViewId> {
        self.in_flight.snapshot()
    }

    /// Claim a view. Fails if that view is already being regenerated.
    pub fn begin(&self, view: ViewId) -> Result<InFlightGuard, RegenerationError> {
        if !self.in_flight.lock().insert(view) {
            return Err(RegenerationError::AlreadyInFlight(view));
        }
        Ok(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            view,
        })
    }

    /// Request a fresh image for one view. The in-flight mark clears on every path.
    pub async fn regenerate(
        &self,
        inputs: &GenerationInputs,
        view: ViewId,
    ) -> Result<GeneratedImage, RegenerationError> {
        let _guard = self.begin(view)?;

        tracing::info!(view = %view, "regenerating view");

        self.orchestrator
            .generate_view(inputs, view, true)
            .await
            .map_err(|cause| {
                tracing::warn!(view = %view, %cause, "regeneration failed");
                RegenerationError::Failed {
                    title: view.title().to_string(),
                    cause: Some(cause),
                }
            })
    }

    /// Swap the matching entry in place. Returns false if the view has no entry.
    pub fn apply(results: &mut [GeneratedImage], image: GeneratedImage) -> bool {
        match results.iter_mut().find(|existing| existing.view == image.view) {
            Some(slot) => {
                *slot = image;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegenerationError {
    #[error("Please upload both a person and a clothing item image.")]
    MissingInput,

    #[error("Wait for the current generation to finish.")]
    BulkInProgress,

    #[error("{} is already being regenerated.", .0.title())]
    AlreadyInFlight(ViewId),

    #[error("There is no {} result to regenerate.", .0.title())]
    NotInResults(ViewId),

    #[error("{}", failure_message(.title, .cause))]
    Failed { title: String, cause: Option<String> },
}

fn failure_message(title: &str, cause: &Option<String>) -> String {
    cause
        .clone()
        .unwrap_or_else(|| format!("Failed to regenerate {}.", title))
}
