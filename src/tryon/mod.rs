// Try-on system - upload validation, multi-view generation and result viewing

pub mod backends;
pub mod config;
pub mod dropzone;
pub mod ingest;
pub mod notify;
pub mod orchestrator;
pub mod preview;
pub mod regenerate;
pub mod session;
pub mod types;
pub mod validator;
pub mod viewer;

pub use backends::{GeminiBackend, TryOnBackend, TryOnRequest};
pub use config::TryOnConfig;
pub use ingest::{PasteBus, SlotState, Uploader};
pub use orchestrator::{GenerationInputs, Orchestrator};
pub use session::Session;
pub use types::*;
pub use validator::UploadValidator;
pub use viewer::{ResultViewer, ZoomPan};
