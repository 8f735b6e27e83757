//! Test plan model and JSON persistence
//!
//! A plan is an ordered list of steps, each pairing an image with the
//! backlight percentage the display should show it at.
//!
//! ```json
//! {
//!   "version": "1",
//!   "display": "DELL U2720Q",
//!   "steps": [
//!     { "name": "White", "image": "white.png", "backlight": 50 },
//!     { "image": "gray10.png", "backlight": 10 }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Test plan is empty")]
    Empty,

    #[error("Malformed test plan: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PlanError {
    fn from(e: serde_json::Error) -> Self {
        PlanError::Malformed(e.to_string())
    }
}

/// One image shown at one backlight level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Opaque image reference resolved by the presenter
    #[serde(rename = "image")]
    pub image_ref: String,
    /// Target backlight, 0-100
    #[serde(rename = "backlight")]
    pub backlight_percent: u8,
}

impl Step {
    pub fn new(image_ref: impl Into<String>, backlight_percent: u8) -> Result<Self, PlanError> {
        if backlight_percent > 100 {
            return Err(PlanError::Malformed(format!(
                "backlight {} is above 100",
                backlight_percent
            )));
        }
        Ok(Self {
            name: None,
            image_ref: image_ref.into(),
            backlight_percent,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Shift the backlight by `delta`, clamped to 0-100, returning the new value
    pub fn adjust_backlight(&mut self, delta: i32) -> u8 {
        let adjusted = (self.backlight_percent as i32 + delta).clamp(0, 100);
        self.backlight_percent = adjusted as u8;
        self.backlight_percent
    }

    /// Name for display, falling back to the image reference
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.image_ref)
    }
}

/// Ordered sequence of steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Display the plan was written for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl TestPlan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            version: None,
            display: None,
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Load a plan from a JSON file
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let file = fs::File::open(path)?;
        let plan = Self::load_from_reader(file)?;
        tracing::info!("Loaded {} steps from {}", plan.len(), path.display());
        Ok(plan)
    }

    /// Load a plan from any JSON source
    pub fn load_from_reader(mut reader: impl Read) -> Result<Self, PlanError> {
        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Err(PlanError::Empty);
        }

        let plan: Self = serde_json::from_str(&contents)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Save a plan as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), PlanError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = fs::File::create(path)?;
        self.save_to_writer(file)?;
        tracing::info!("Test plan saved to {}", path.display());
        Ok(())
    }

    pub fn save_to_writer(&self, mut writer: impl Write) -> Result<(), PlanError> {
        self.validate()?;
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), PlanError> {
        for (index, step) in self.steps.iter().enumerate() {
            if step.backlight_percent > 100 {
                return Err(PlanError::Malformed(format!(
                    "step {} ({}): backlight {} is above 100",
                    index + 1,
                    step.label(),
                    step.backlight_percent
                )));
            }
        }
        Ok(())
    }
}
