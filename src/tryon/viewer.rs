// Result Viewer - zoom/pan state, thumbnail selection and image export

use super::types::{GeneratedImage, ViewId};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 5.0;
pub const ZOOM_STEP: f32 = 0.2;
/// Scale change per wheel-delta unit
pub const WHEEL_SENSITIVITY: f32 = 0.001;
pub const DOWNLOAD_CONFIRM: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerCursor {
    Default,
    Grab,
    Grabbing,
}

/// Continuous zoom and pan of the active image
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomPan {
    scale: f32,
    offset: Offset,
    is_panning: bool,
}

impl Default for ZoomPan {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: Offset::default(),
            is_panning: false,
        }
    }
}

impl ZoomPan {
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn is_panning(&self) -> bool {
        self.is_panning
    }

    /// Wheel input. Positive `delta_y` (scrolling down) zooms out.
    pub fn wheel(&mut self, delta_y: f32) {
        self.set_scale(self.scale - delta_y * WHEEL_SENSITIVITY);
    }

    pub fn zoom_in(&mut self) {
        self.set_scale(self.scale + ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_scale(self.scale - ZOOM_STEP);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Panning only starts when zoomed in
    pub fn pointer_down(&mut self) {
        if self.scale > 1.0 {
            self.is_panning = true;
        }
    }

    pub fn pointer_move(&mut self, dx: f32, dy: f32) {
        if self.is_panning {
            self.offset.x += dx;
            self.offset.y += dy;
        }
    }

    pub fn pointer_up(&mut self) {
        self.is_panning = false;
    }

    pub fn pointer_leave(&mut self) {
        self.is_panning = false;
    }

    pub fn cursor(&self) -> PointerCursor {
        if self.is_panning {
            PointerCursor::Grabbing
        } else if self.scale > 1.0 {
            PointerCursor::Grab
        } else {
            PointerCursor::Default
        }
    }

    /// CSS-style transform string for the current state
    pub fn transform(&self) -> String {
        format!(
            "scale({}) translate({}px, {}px)",
            self.scale, self.offset.x, self.offset.y
        )
    }

    fn set_scale(&mut self, scale: f32) {
        if scale.is_finite() {
            self.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        }
    }
}

/// Render model of one thumbnail
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub view: ViewId,
    pub title: String,
    pub active: bool,
    pub regenerating: bool,
}

/// Holds which result is shown and how
#[derive(Debug, Default)]
pub struct ResultViewer {
    active_index: usize,
    zoom: ZoomPan,
    confirmed: HashMap<ViewId, Instant>,
}

impl ResultViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zoom(&self) -> &ZoomPan {
        &self.zoom
    }

    pub fn zoom_mut(&mut self) -> &mut ZoomPan {
        &mut self.zoom
    }

    /// Index of the shown image, clamped to the current list
    pub fn active_index(&self, images: &[GeneratedImage]) -> Option<usize> {
        if images.is_empty() {
            None
        } else {
            Some(self.active_index.min(images.len() - 1))
        }
    }

    pub fn active<'a>(&self, images: &'a [GeneratedImage]) -> Option<&'a GeneratedImage> {
        self.active_index(images).map(|i| &images[i])
    }

    /// Switch thumbnails. Zoom and pan never carry over to another image.
    pub fn select(&mut self, index: usize, images: &[GeneratedImage], regenerating: &HashSet<ViewId>) -> bool {
        let Some(image) = images.get(index) else {
            return false;
        };
        if regenerating.contains(&image.view) {
            return false;
        }

        self.active_index = index;
        self.zoom.reset();
        true
    }

    pub fn thumbnails(&self, images: &[GeneratedImage], regenerating: &HashSet<ViewId>) -> Vec<Thumbnail> {
        let active = self.active_index(images);
        images
            .iter()
            .enumerate()
            .map(|(i, image)| Thumbnail {
                view: image.view,
                title: image.title.clone(),
                active: Some(i) == active,
                regenerating: regenerating.contains(&image.view),
            })
            .collect()
    }

    /// Write the active image as PNG into `dir` and start its confirmation window
    pub fn export(&mut self, images: &[GeneratedImage], dir: &Path, now: Instant) -> Result<PathBuf, ExportError> {
        let image = self.active(images).ok_or(ExportError::NoActiveImage)?;
        let path = dir.join(export_file_name(&image.title));

        std::fs::create_dir_all(dir)?;
        std::fs::write(&path, png_bytes(image)?)?;

        tracing::info!(view = %image.view, path = %path.display(), "image exported");

        self.confirmed.insert(image.view, now);
        Ok(path)
    }

    /// True for two seconds after the view was exported
    pub fn is_download_confirmed(&self, view: ViewId, now: Instant) -> bool {
        self.confirmed
            .get(&view)
            .is_some_and(|at| now.saturating_duration_since(*at) < DOWNLOAD_CONFIRM)
    }
}

/// "Front View" -> "Front_View.png"
pub fn export_file_name(title: &str) -> String {
    format!("{}.png", title.split_whitespace().collect::<Vec<_>>().join("_"))
}

/// PNG payload for an image, re-encoding when the backend returned another format
pub fn png_bytes(image: &GeneratedImage) -> Result<Vec<u8>, ExportError> {
    if image.image.mime_type == "image/png" {
        return Ok(image.image.data.clone());
    }

    let decoded = image::load_from_memory(&image.image.data)?;
    let mut out = Vec::new();
    decoded.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)?;
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No image to export")]
    NoActiveImage,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] image::ImageError),
}
