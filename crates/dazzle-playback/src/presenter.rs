//! Image presentation seam
//!
//! Playback tells a [`Presenter`] which image to show; how it is drawn
//! (full-screen window, framebuffer, terminal) is up to the implementation.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresentationError {
    #[error("Image not found: {0}")]
    NotFound(PathBuf),

    #[error("Presentation failed: {0}")]
    Failed(String),
}

/// Details shown over the image while paused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseInfo {
    /// 1-based step number
    pub step_number: usize,
    pub step_count: usize,
    pub name: Option<String>,
    pub image_ref: String,
    /// Backlight the step asks for
    pub target_percent: u8,
    /// Backlight actually applied while paused
    pub pause_percent: u8,
}

impl PauseInfo {
    pub fn boosted(&self) -> bool {
        self.pause_percent != self.target_percent
    }
}

/// Shows step images on the display under test
pub trait Presenter: Send {
    /// Show `image_ref`, replacing the current image
    fn present(&mut self, image_ref: &str) -> Result<(), PresentationError>;

    fn show_pause_info(&mut self, _info: &PauseInfo) {}

    fn hide_pause_info(&mut self) {}

    /// Remove any image at the end of a session
    fn clear(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl Presenter for Silent {
        fn present(&mut self, _image_ref: &str) -> Result<(), PresentationError> {
            Ok(())
        }
    }

    #[test]
    fn test_default_overlay_methods() {
        let mut presenter = Silent;
        let info = PauseInfo {
            step_number: 2,
            step_count: 3,
            name: None,
            image_ref: "b.png".to_string(),
            target_percent: 10,
            pause_percent: 80,
        };
        presenter.show_pause_info(&info);
        presenter.hide_pause_info();
        presenter.clear();
        assert!(info.boosted());
    }
}
