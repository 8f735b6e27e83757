//! Test playback for DazzleTest
//!
//! Plays a test plan on a display: a state machine moves through the steps
//! in response to operator intents, drives the backlight through
//! `dazzle-ddc` and hands images to a [`Presenter`].
//!
//! # Example
//!
//! ```no_run
//! use dazzle_config::{PlaybackConfig, TestPlan};
//! use dazzle_ddc::{BacklightController, VCP_LUMINANCE};
//! use dazzle_playback::{Intent, PlaybackMachine, PresentationError, Presenter, Session};
//!
//! struct Log;
//!
//! impl Presenter for Log {
//!     fn present(&mut self, image_ref: &str) -> Result<(), PresentationError> {
//!         println!("showing {}", image_ref);
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let plan = TestPlan::load("plan.json".as_ref())?;
//!     let backlight = BacklightController::detached(VCP_LUMINANCE);
//!     let machine = PlaybackMachine::new(&plan, PlaybackConfig::default(), backlight, Log);
//!
//!     let (events, _rx) = tokio::sync::mpsc::unbounded_channel();
//!     let session = Session::spawn(machine, events)?;
//!     session.send(Intent::Start);
//!     session.send(Intent::Next);
//!     let adjusted = session.finish()?;
//!     println!("{} steps", adjusted.len());
//!     Ok(())
//! }
//! ```

pub mod intent;
pub mod machine;
pub mod presenter;
pub mod session;
pub mod state;

pub use intent::{Intent, IntentQueue, IntentSender, Key, QueueClosed};
pub use machine::{PlaybackMachine, Transition, TransitionError, Warning};
pub use presenter::{PauseInfo, PresentationError, Presenter};
pub use session::{PlaybackEvent, Session, SessionError};
pub use state::{PlaybackState, Status};
