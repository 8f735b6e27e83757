//! Session worker
//!
//! Runs a [`PlaybackMachine`] on a dedicated thread, fed by the intent
//! queue. Input handling only enqueues, so a slow display never stalls the
//! keyboard, and queued intents are applied strictly in order.

use crate::intent::{Intent, IntentQueue, IntentSender};
use crate::machine::{PlaybackMachine, TransitionError, Warning};
use crate::presenter::Presenter;
use crate::state::Status;
use dazzle_config::Step;
use dazzle_ddc::BacklightControl;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to spawn session worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Session worker panicked")]
    WorkerPanicked,
}

/// Published by the worker after each applied intent
#[derive(Debug)]
pub enum PlaybackEvent {
    StepChanged { index: usize, step: Step },
    StatusChanged(Status),
    Warning(Warning),
    Rejected {
        intent: Intent,
        error: TransitionError,
    },
}

/// Handle to a running session worker
#[derive(Debug)]
pub struct Session {
    sender: IntentSender,
    worker: Option<JoinHandle<Vec<Step>>>,
}

impl Session {
    /// Move `machine` onto a worker thread and start consuming intents
    pub fn spawn<B, P>(
        machine: PlaybackMachine<B, P>,
        events: UnboundedSender<PlaybackEvent>,
    ) -> Result<Self, SessionError>
    where
        B: BacklightControl + 'static,
        P: Presenter + 'static,
    {
        let (sender, queue) = IntentQueue::channel();
        let worker = thread::Builder::new()
            .name("dazzle-session".to_string())
            .spawn(move || run_worker(machine, queue, events))?;

        Ok(Self {
            sender,
            worker: Some(worker),
        })
    }

    /// A sender for input threads
    pub fn sender(&self) -> IntentSender {
        self.sender.clone()
    }

    /// Enqueue an intent
    pub fn send(&self, intent: Intent) -> bool {
        self.sender.send(intent).is_ok()
    }

    /// Drain the queue, stop playback and return the session's steps
    ///
    /// The steps carry any backlight values nudged during the session.
    pub fn finish(mut self) -> Result<Vec<Step>, SessionError> {
        // An already exited worker has closed its queue
        let _ = self.sender.shutdown();
        let worker = self.worker.take().ok_or(SessionError::WorkerPanicked)?;
        worker.join().map_err(|_| SessionError::WorkerPanicked)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.sender.shutdown();
        }
    }
}

fn run_worker<B, P>(
    mut machine: PlaybackMachine<B, P>,
    mut queue: IntentQueue,
    events: UnboundedSender<PlaybackEvent>,
) -> Vec<Step>
where
    B: BacklightControl,
    P: Presenter,
{
    tracing::debug!("Session worker started");

    while let Some(intent) = queue.recv() {
        tracing::debug!("Applying {:?}", intent);
        publish(&mut machine, intent, &events);
    }

    if machine.status() != Status::Stopped {
        publish(&mut machine, Intent::Stop, &events);
    }

    tracing::debug!("Session worker finished");
    machine.into_steps()
}

fn publish<B, P>(
    machine: &mut PlaybackMachine<B, P>,
    intent: Intent,
    events: &UnboundedSender<PlaybackEvent>,
) where
    B: BacklightControl,
    P: Presenter,
{
    // A closed receiver only means nobody is watching
    match machine.apply(intent) {
        Ok(transition) => {
            if transition.step_changed
                && let (Some(index), Some(step)) = (transition.index, machine.current_step())
            {
                let _ = events.send(PlaybackEvent::StepChanged {
                    index,
                    step: step.clone(),
                });
            }
            if transition.status_changed {
                let _ = events.send(PlaybackEvent::StatusChanged(transition.status));
            }
            for warning in transition.warnings {
                let _ = events.send(PlaybackEvent::Warning(warning));
            }
        }
        Err(error) => {
            tracing::debug!("Rejected {:?}: {}", intent, error);
            let _ = events.send(PlaybackEvent::Rejected { intent, error });
        }
    }
}
