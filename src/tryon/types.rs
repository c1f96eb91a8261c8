// Core types for the try-on system

use super::preview::PreviewRef;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// One of the six fixed poses requested from the generation backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ViewId {
    Front,
    Side,
    Back,
    Walking,
    Hero,
    Casual,
}

impl ViewId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewId::Front => "front",
            ViewId::Side => "side",
            ViewId::Back => "back",
            ViewId::Walking => "walking",
            ViewId::Hero => "hero",
            ViewId::Casual => "casual",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ViewId::Front => "Front View",
            ViewId::Side => "Side View",
            ViewId::Back => "Back View",
            ViewId::Walking => "Walking Pose",
            ViewId::Hero => "Hero Pose",
            ViewId::Casual => "Casual Pose",
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VIEWS
            .iter()
            .map(|v| v.id)
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown view '{}' (expected one of: {})", s, view_names()))
    }
}

fn view_names() -> String {
    VIEWS.iter().map(|v| v.id.as_str()).collect::<Vec<_>>().join(", ")
}

/// Static view configuration entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct View {
    pub id: ViewId,
    pub title: &'static str,
}

impl View {
    const fn new(id: ViewId, title: &'static str) -> Self {
        Self { id, title }
    }
}

/// Fan-out order for bulk generation. Results are always reported in this order.
pub const VIEWS: [View; 6] = [
    View::new(ViewId::Front, "Front View"),
    View::new(ViewId::Side, "Side View"),
    View::new(ViewId::Back, "Back View"),
    View::new(ViewId::Walking, "Walking Pose"),
    View::new(ViewId::Hero, "Hero Pose"),
    View::new(ViewId::Casual, "Casual Pose"),
];

/// Where the backdrop of a generated image comes from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundSource {
    #[default]
    Auto,
    User,
    Clothing,
}

impl BackgroundSource {
    pub const ALL: [BackgroundSource; 3] = [
        BackgroundSource::Auto,
        BackgroundSource::User,
        BackgroundSource::Clothing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackgroundSource::Auto => "auto",
            BackgroundSource::User => "user",
            BackgroundSource::Clothing => "clothing",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BackgroundSource::Auto => "AI Generated",
            BackgroundSource::User => "My Background",
            BackgroundSource::Clothing => "Clothing Bkg.",
        }
    }
}

impl FromStr for BackgroundSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown background source '{}'", s))
    }
}

/// A file as it arrives from an ingestion channel, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, inferring its MIME type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::with_path_name(path, bytes))
    }

    /// Blocking variant of `from_path` for non-async callers
    pub fn read_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Ok(Self::with_path_name(path, bytes))
    }

    fn with_path_name(path: &Path, bytes: Vec<u8>) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(mime_from_extension)
            .unwrap_or(OCTET_STREAM);

        Self::new(name, mime_type, bytes)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

const OCTET_STREAM: &str = "application/octet-stream";

/// Map a file extension to the MIME type a browser would report for it
pub fn mime_from_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => OCTET_STREAM,
    }
}

/// A validated upload, ready to be sent to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    pub file: ImageFile,
    /// Standard base64 of `file.bytes`, used for transport
    pub base64: String,
    /// Display reference, valid while the owning uploader keeps its handle
    pub preview: PreviewRef,
    pub width: u32,
    pub height: u32,
}

/// Raw image payload returned by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBytes {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImageBytes {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }
}

/// One generated try-on result. Replaced wholesale on regeneration.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub view: ViewId,
    pub title: String,
    pub image: ImageBytes,
    pub created: DateTime<Utc>,
}

impl GeneratedImage {
    pub fn new(view: ViewId, image: ImageBytes) -> Self {
        Self {
            view,
            title: view.title().to_string(),
            image,
            created: Utc::now(),
        }
    }

    /// Displayable source reference (`data:` URL)
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.image.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.image.data)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
}

/// A transient notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastMessage {
    pub id: i64,
    pub message: String,
    pub kind: ToastKind,
}
