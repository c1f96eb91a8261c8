// Orchestrator - fans one generation request out per view and collects what succeeds

use super::backends::{BackendError, TryOnBackend, TryOnRequest};
use super::types::{BackgroundSource, GeneratedImage, UploadedImage, VIEWS, ViewId};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Validated inputs for a generation run
#[derive(Debug, Clone)]
pub struct GenerationInputs {
    pub person: Arc<UploadedImage>,
    pub clothing: Arc<UploadedImage>,
    pub directives: String,
    pub background: BackgroundSource,
}

impl GenerationInputs {
    /// Both photos are required. Fails before anything touches the network.
    pub fn new(
        person: Option<Arc<UploadedImage>>,
        clothing: Option<Arc<UploadedImage>>,
        directives: impl Into<String>,
        background: BackgroundSource,
    ) -> Result<Self, GenerationError> {
        match (person, clothing) {
            (Some(person), Some(clothing)) => Ok(Self {
                person,
                clothing,
                directives: directives.into(),
                background,
            }),
            _ => Err(GenerationError::MissingInput),
        }
    }

    fn request(&self, view: ViewId, regenerate: bool) -> TryOnRequest {
        TryOnRequest {
            person: Arc::clone(&self.person),
            clothing: Arc::clone(&self.clothing),
            view,
            directives: self.directives.clone(),
            background: self.background,
            regenerate,
        }
    }
}

/// Settled result of one view
#[derive(Debug, Clone)]
pub enum ViewOutcome {
    Success(GeneratedImage),
    Failure { view: ViewId, cause: String },
}

impl ViewOutcome {
    pub fn view(&self) -> ViewId {
        match self {
            ViewOutcome::Success(image) => image.view,
            ViewOutcome::Failure { view, .. } => *view,
        }
    }
}

/// All view outcomes of a bulk run, in fixed view order
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub outcomes: Vec<ViewOutcome>,
}

impl GenerationReport {
    /// Successful images, in view order
    pub fn successes(&self) -> Vec<GeneratedImage> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ViewOutcome::Success(image) => Some(image.clone()),
                ViewOutcome::Failure { .. } => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<(ViewId, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ViewOutcome::Failure { view, cause } => Some((*view, cause.as_str())),
                ViewOutcome::Success(_) => None,
            })
            .collect()
    }
}

/// Runs generation requests against a backend
pub struct Orchestrator {
    backend: Arc<dyn TryOnBackend>,
    request_timeout: Duration,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn TryOnBackend>, request_timeout: Duration) -> Self {
        Self {
            backend,
            request_timeout,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Generate every view concurrently and wait for all of them to settle
    pub async fn generate_all(&self, inputs: &GenerationInputs) -> Result<GenerationReport, GenerationError> {
        tracing::info!(
            backend = self.backend.name(),
            background = inputs.background.as_str(),
            views = VIEWS.len(),
            "starting bulk generation"
        );

        let handles = VIEWS.iter().map(|view| {
            let backend = Arc::clone(&self.backend);
            let request = inputs.request(view.id, false);
            let timeout = self.request_timeout;
            tokio::spawn(async move { run_request(backend, request, timeout).await })
        });

        let settled = join_all(handles).await;

        let outcomes: Vec<ViewOutcome> = VIEWS
            .iter()
            .zip(settled)
            .map(|(view, joined)| {
                let result = joined.unwrap_or_else(|e| Err(format!("task failed: {}", e)));
                match result {
                    Ok(image) => ViewOutcome::Success(image),
                    Err(cause) => {
                        tracing::warn!(view = %view.id, %cause, "failed to generate {}", view.title);
                        ViewOutcome::Failure { view: view.id, cause }
                    }
                }
            })
            .collect();

        let report = GenerationReport { outcomes };
        let succeeded = report.successes().len();

        tracing::info!(succeeded, failed = VIEWS.len() - succeeded, "bulk generation settled");

        if succeeded == 0 {
            return Err(GenerationError::NoResultsProduced(report));
        }

        Ok(report)
    }

    /// Generate a single view
    pub async fn generate_view(
        &self,
        inputs: &GenerationInputs,
        view: ViewId,
        regenerate: bool,
    ) -> Result<GeneratedImage, String> {
        run_request(Arc::clone(&self.backend), inputs.request(view, regenerate), self.request_timeout).await
    }
}

async fn run_request(
    backend: Arc<dyn TryOnBackend>,
    request: TryOnRequest,
    timeout: Duration,
) -> Result<GeneratedImage, String> {
    match tokio::time::timeout(timeout, backend.generate(&request)).await {
        Ok(Ok(image)) => Ok(GeneratedImage::new(request.view, image)),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(BackendError::Timeout(timeout.as_secs()).to_string()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Please upload both a person and a clothing item image.")]
    MissingInput,

    #[error("A generation is already running.")]
    InProgress,

    #[error("The AI couldn't generate any images. Please try different photos or try again later.")]
    NoResultsProduced(GenerationReport),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tryon::backends::testing::{ScriptedBackend, upload};

    fn inputs() -> GenerationInputs {
        GenerationInputs::new(
            Some(upload("me.png")),
            Some(upload("shirt.png")),
            "",
            BackgroundSource::Auto,
        )
        .unwrap()
    }

    fn views(images: &[GeneratedImage]) -> Vec<ViewId> {
        images.iter().map(|i| i.view).collect()
    }

    #[test]
    fn test_missing_input_fails_fast() {
        let missing = [
            (None, Some(upload("c"))),
            (Some(upload("p")), None),
            (None, None),
        ];
        for (person, clothing) in missing {
            let err = GenerationInputs::new(person, clothing, "", BackgroundSource::Auto).unwrap_err();
            assert!(matches!(err, GenerationError::MissingInput));
        }
    }

    #[tokio::test]
    async fn test_all_views_succeed_in_order() {
        let backend = ScriptedBackend::new();
        let orchestrator = Orchestrator::new(backend.clone(), Duration::from_secs(5));

        let report = orchestrator.generate_all(&inputs()).await.unwrap();
        let images = report.successes();

        assert_eq!(
            views(&images),
            [ViewId::Front, ViewId::Side, ViewId::Back, ViewId::Walking, ViewId::Hero, ViewId::Casual]
        );
        assert_eq!(images[3].title, "Walking Pose");
        assert!(report.failures().is_empty());
        assert_eq!(backend.calls(), 6);
        assert!(backend.requests().iter().all(|(_, regenerate)| !regenerate));
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_restored_regardless_of_completion_order() {
        let backend = ScriptedBackend::new();
        backend.delay(ViewId::Front, Duration::from_secs(3));
        backend.delay(ViewId::Side, Duration::from_secs(2));
        backend.delay(ViewId::Back, Duration::from_secs(1));
        let orchestrator = Orchestrator::new(backend, Duration::from_secs(60));

        let images = orchestrator.generate_all(&inputs()).await.unwrap().successes();
        assert_eq!(views(&images)[..3], [ViewId::Front, ViewId::Side, ViewId::Back]);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_siblings() {
        let backend = ScriptedBackend::new();
        backend.fail(ViewId::Back, "quota exceeded");
        let orchestrator = Orchestrator::new(backend, Duration::from_secs(5));

        let report = orchestrator.generate_all(&inputs()).await.unwrap();
        assert_eq!(
            views(&report.successes()),
            [ViewId::Front, ViewId::Side, ViewId::Walking, ViewId::Hero, ViewId::Casual]
        );

        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, ViewId::Back);
        assert!(failures[0].1.contains("quota exceeded"));
        assert_eq!(report.outcomes[2].view(), ViewId::Back);
    }

    #[tokio::test]
    async fn test_total_failure_is_distinct_error() {
        let backend = ScriptedBackend::new();
        backend.fail_all("model overloaded");
        let orchestrator = Orchestrator::new(backend.clone(), Duration::from_secs(5));

        match orchestrator.generate_all(&inputs()).await {
            Err(GenerationError::NoResultsProduced(report)) => {
                assert_eq!(report.failures().len(), 6);
                assert!(report.successes().is_empty());
            }
            other => panic!("expected NoResultsProduced, got {:?}", other.map(|r| r.outcomes.len())),
        }
        assert_eq!(backend.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_view_times_out_as_failure() {
        let backend = ScriptedBackend::new();
        backend.delay(ViewId::Hero, Duration::from_secs(600));
        let orchestrator = Orchestrator::new(backend, Duration::from_secs(30));

        let report = orchestrator.generate_all(&inputs()).await.unwrap();
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, ViewId::Hero);
        assert!(failures[0].1.contains("timed out"));
    }

    #[tokio::test]
    async fn test_generate_view_flags_regeneration() {
        let backend = ScriptedBackend::new();
        let orchestrator = Orchestrator::new(backend.clone(), Duration::from_secs(5));

        let image = orchestrator.generate_view(&inputs(), ViewId::Side, true).await.unwrap();
        assert_eq!(image.view, ViewId::Side);
        assert_eq!(backend.requests(), vec![(ViewId::Side, true)]);
    }
}
