//! Playback state machine
//!
//! Converts intents into state changes, backlight writes and presenter
//! calls. Every intent is processed to completion before the next one.
//!
//! Hardware and presentation failures never block a transition: they come
//! back as [`Warning`]s on the [`Transition`]. Only intents that make no
//! sense in the current status are rejected.
//!
//! # Pause boost
//!
//! Pausing on a step dimmer than `dim_threshold` raises the backlight to
//! `inspection_percent` so the operator can look at the panel. Resuming
//! writes the pre-pause value back exactly. Nudging or navigating while
//! paused drops the boost and applies the step's own value.

use crate::intent::Intent;
use crate::presenter::{PauseInfo, PresentationError, Presenter};
use crate::state::{PlaybackState, Status};
use dazzle_config::{PlaybackConfig, Step, TestPlan};
use dazzle_ddc::{BacklightControl, BacklightError};
use thiserror::Error;

/// An intent that cannot be applied in the current status
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Cannot start: the test plan has no steps")]
    EmptyPlan,

    #[error("{0:?} requires an active test")]
    NotActive(Intent),

    #[error("Nudge is only accepted while paused (test is {0})")]
    NotPaused(Status),
}

/// A non-fatal failure during a transition
#[derive(Debug, Error)]
pub enum Warning {
    #[error("Backlight: {0}")]
    Backlight(BacklightError),

    #[error("Presentation: {0}")]
    Presentation(PresentationError),
}

/// Outcome of an applied intent
#[derive(Debug)]
pub struct Transition {
    pub status: Status,
    pub index: Option<usize>,
    /// The current step or its backlight changed
    pub step_changed: bool,
    pub status_changed: bool,
    pub warnings: Vec<Warning>,
}

impl Transition {
    /// Nothing happened (e.g. Next on the last step)
    pub fn is_noop(&self) -> bool {
        !self.step_changed && !self.status_changed && self.warnings.is_empty()
    }
}

/// Playback over one test plan on one display
pub struct PlaybackMachine<B, P> {
    steps: Vec<Step>,
    config: PlaybackConfig,
    state: PlaybackState,
    backlight: B,
    presenter: P,
    /// An unsupported backlight is reported on the first write only
    unsupported_reported: bool,
}

impl<B: BacklightControl, P: Presenter> PlaybackMachine<B, P> {
    /// The machine works on its own copy of the plan's steps
    pub fn new(plan: &TestPlan, config: PlaybackConfig, backlight: B, presenter: P) -> Self {
        Self {
            steps: plan.steps.clone(),
            config,
            state: PlaybackState::default(),
            backlight,
            presenter,
            unsupported_reported: false,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn status(&self) -> Status {
        self.state.status
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Steps including nudged backlight values
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.state.current_index.and_then(|i| self.steps.get(i))
    }

    pub fn backlight(&self) -> &B {
        &self.backlight
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    /// Overlay contents for the current step, if paused
    pub fn pause_info(&self) -> Option<PauseInfo> {
        if self.state.status != Status::Paused {
            return None;
        }
        let index = self.state.current_index?;
        let step = self.steps.get(index)?;
        let pause_percent = if self.state.boost_active {
            self.config.inspection_percent
        } else {
            self.state
                .pre_pause_backlight
                .unwrap_or(step.backlight_percent)
        };

        Some(PauseInfo {
            step_number: index + 1,
            step_count: self.steps.len(),
            name: step.name.clone(),
            image_ref: step.image_ref.clone(),
            target_percent: step.backlight_percent,
            pause_percent,
        })
    }

    /// Apply one intent
    pub fn apply(&mut self, intent: Intent) -> Result<Transition, TransitionError> {
        let status_before = self.state.status;
        let mut warnings = Vec::new();

        let step_changed = match intent {
            Intent::Start => self.start(&mut warnings)?,
            Intent::Next | Intent::Previous => self.navigate(intent, &mut warnings)?,
            Intent::TogglePause => self.toggle_pause(&mut warnings)?,
            Intent::Nudge(delta) => self.nudge(delta, &mut warnings)?,
            Intent::Stop => {
                self.stop(&mut warnings);
                false
            }
        };

        Ok(Transition {
            status: self.state.status,
            index: self.state.current_index,
            step_changed,
            status_changed: status_before != self.state.status,
            warnings,
        })
    }

    fn start(&mut self, warnings: &mut Vec<Warning>) -> Result<bool, TransitionError> {
        if self.steps.is_empty() {
            return Err(TransitionError::EmptyPlan);
        }

        if self.state.is_active() {
            tracing::info!("Restarting test from the first step");
        } else {
            tracing::info!("Starting test with {} steps", self.steps.len());
        }
        if self.state.status == Status::Paused {
            self.presenter.hide_pause_info();
        }

        self.state = PlaybackState {
            status: Status::Running,
            current_index: Some(0),
            pre_pause_backlight: None,
            boost_active: false,
        };
        self.enter_step(0, warnings);
        Ok(true)
    }

    fn navigate(&mut self, intent: Intent, warnings: &mut Vec<Warning>) -> Result<bool, TransitionError> {
        let index = match self.state.current_index {
            Some(index) if self.state.is_active() => index,
            _ => return Err(TransitionError::NotActive(intent)),
        };

        let target = match intent {
            Intent::Next => (index + 1).min(self.steps.len() - 1),
            _ => index.saturating_sub(1),
        };
        if target == index {
            tracing::debug!("{:?} ignored at step {}", intent, index + 1);
            return Ok(false);
        }

        self.state.current_index = Some(target);
        let paused = self.state.status == Status::Paused;
        if paused {
            self.state.boost_active = false;
            self.state.pre_pause_backlight = Some(self.steps[target].backlight_percent);
        }

        self.enter_step(target, warnings);
        if paused {
            self.refresh_pause_info();
        }
        Ok(true)
    }

    fn toggle_pause(&mut self, warnings: &mut Vec<Warning>) -> Result<bool, TransitionError> {
        match self.state.status {
            Status::Stopped => Err(TransitionError::NotActive(Intent::TogglePause)),
            Status::Running => {
                let current = self.current_step().map(|s| s.backlight_percent);
                self.state.status = Status::Paused;
                self.state.pre_pause_backlight = current;

                if let Some(percent) = current
                    && percent < self.config.dim_threshold
                    && self.backlight.capability().supports_backlight
                {
                    tracing::info!(
                        "Paused on dim step ({}%), boosting to {}%",
                        percent,
                        self.config.inspection_percent
                    );
                    self.state.boost_active = true;
                    self.apply_backlight(self.config.inspection_percent, warnings);
                } else {
                    tracing::info!("Paused");
                }

                self.refresh_pause_info();
                Ok(false)
            }
            Status::Paused => {
                if self.state.boost_active
                    && let Some(percent) = self.state.pre_pause_backlight
                {
                    tracing::info!("Resumed, restoring backlight to {}%", percent);
                    self.apply_backlight(percent, warnings);
                } else {
                    tracing::info!("Resumed");
                }

                self.state.status = Status::Running;
                self.state.boost_active = false;
                self.state.pre_pause_backlight = None;
                self.presenter.hide_pause_info();
                Ok(false)
            }
        }
    }

    fn nudge(&mut self, delta: i32, warnings: &mut Vec<Warning>) -> Result<bool, TransitionError> {
        if self.state.status != Status::Paused {
            return Err(TransitionError::NotPaused(self.state.status));
        }
        let Some(step) = self
            .state
            .current_index
            .and_then(|i| self.steps.get_mut(i))
        else {
            return Err(TransitionError::NotActive(Intent::Nudge(delta)));
        };

        let before = step.backlight_percent;
        let percent = step.adjust_backlight(delta);
        tracing::info!("Nudged backlight {}% -> {}%", before, percent);

        self.state.pre_pause_backlight = Some(percent);
        self.state.boost_active = false;
        self.apply_backlight(percent, warnings);
        self.refresh_pause_info();
        Ok(percent != before)
    }

    fn stop(&mut self, warnings: &mut Vec<Warning>) {
        if !self.state.is_active() {
            return;
        }

        if self.state.status == Status::Paused {
            self.presenter.hide_pause_info();
        }
        if self.config.restore_on_stop
            && let Some(initial) = self.backlight.initial_backlight()
        {
            tracing::info!("Restoring initial backlight {}%", initial);
            let result = self.backlight.restore_initial();
            self.record_backlight(result, warnings);
        }

        self.presenter.clear();
        self.state = PlaybackState::default();
        tracing::info!("Test stopped");
    }

    fn enter_step(&mut self, index: usize, warnings: &mut Vec<Warning>) {
        let step = &self.steps[index];
        let percent = step.backlight_percent;
        tracing::info!(
            "Step {}/{}: {} at {}%",
            index + 1,
            self.steps.len(),
            step.label(),
            percent
        );

        if let Err(e) = self.presenter.present(&step.image_ref) {
            tracing::warn!("Failed to present {}: {}", step.image_ref, e);
            warnings.push(Warning::Presentation(e));
        }
        self.apply_backlight(percent, warnings);
    }

    fn apply_backlight(&mut self, percent: u8, warnings: &mut Vec<Warning>) {
        tracing::trace!("Applying backlight {}%", percent);
        let result = self.backlight.set_backlight(percent);
        self.record_backlight(result, warnings);
    }

    fn record_backlight(
        &mut self,
        result: Result<(), BacklightError>,
        warnings: &mut Vec<Warning>,
    ) {
        match result {
            Ok(()) => {}
            Err(BacklightError::Unsupported) if self.unsupported_reported => {
                tracing::trace!("Backlight unsupported, skipping");
            }
            Err(e) => {
                if matches!(e, BacklightError::Unsupported) {
                    self.unsupported_reported = true;
                }
                tracing::warn!("Backlight not applied: {}", e);
                warnings.push(Warning::Backlight(e));
            }
        }
    }

    fn refresh_pause_info(&mut self) {
        if let Some(info) = self.pause_info() {
            self.presenter.show_pause_info(&info);
        }
    }
}

impl<B, P> std::fmt::Debug for PlaybackMachine<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackMachine")
            .field("steps", &self.steps.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
