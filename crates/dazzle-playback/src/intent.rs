//! Operator intents and the queue carrying them to the session worker

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;
use thiserror::Error;

/// Something the operator asked playback to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Start, or restart from the first step
    Start,
    Next,
    Previous,
    TogglePause,
    /// Shift the current step's backlight by a signed percentage
    Nudge(i32),
    Stop,
}

/// Keys bound to playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Left,
    Right,
    Space,
    Up,
    Down,
    Escape,
}

impl Key {
    /// Intent bound to this key; arrows up/down nudge by `nudge_step`
    pub fn intent(self, nudge_step: u8) -> Intent {
        match self {
            Key::Left => Intent::Previous,
            Key::Right => Intent::Next,
            Key::Space => Intent::TogglePause,
            Key::Up => Intent::Nudge(nudge_step as i32),
            Key::Down => Intent::Nudge(-(nudge_step as i32)),
            Key::Escape => Intent::Stop,
        }
    }
}

#[derive(Debug, Error)]
#[error("Intent queue is closed")]
pub struct QueueClosed;

enum QueueMessage {
    Intent(Intent),
    Shutdown,
}

/// Sending half of the intent queue, cheap to clone into input threads
#[derive(Clone)]
pub struct IntentSender {
    tx: Sender<QueueMessage>,
}

impl IntentSender {
    /// Enqueue an intent; never blocks
    pub fn send(&self, intent: Intent) -> Result<(), QueueClosed> {
        self.tx
            .send(QueueMessage::Intent(intent))
            .map_err(|_| QueueClosed)
    }

    /// Ask the consumer to stop after the intents already queued
    pub(crate) fn shutdown(&self) -> Result<(), QueueClosed> {
        self.tx.send(QueueMessage::Shutdown).map_err(|_| QueueClosed)
    }
}

impl std::fmt::Debug for IntentSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentSender").finish_non_exhaustive()
    }
}

/// Receiving half of the intent queue
///
/// Intents come out in the order they were sent. Once a shutdown is read
/// the queue reports itself closed.
pub struct IntentQueue {
    rx: Receiver<QueueMessage>,
    closed: bool,
}

impl IntentQueue {
    pub fn channel() -> (IntentSender, IntentQueue) {
        let (tx, rx) = mpsc::channel();
        (IntentSender { tx }, IntentQueue { rx, closed: false })
    }

    /// Wait for the next intent; `None` once closed
    pub fn recv(&mut self) -> Option<Intent> {
        if self.closed {
            return None;
        }
        let message = self.rx.recv().ok();
        self.unwrap_message(message)
    }

    /// Next intent if one is queued
    pub fn try_recv(&mut self) -> Option<Intent> {
        if self.closed {
            return None;
        }
        match self.rx.try_recv() {
            Ok(message) => self.unwrap_message(Some(message)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.unwrap_message(None),
        }
    }

    /// Wait up to `timeout` for the next intent
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Intent> {
        if self.closed {
            return None;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(message) => self.unwrap_message(Some(message)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => self.unwrap_message(None),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn unwrap_message(&mut self, message: Option<QueueMessage>) -> Option<Intent> {
        match message {
            Some(QueueMessage::Intent(intent)) => Some(intent),
            Some(QueueMessage::Shutdown) | None => {
                self.closed = true;
                None
            }
        }
    }
}
