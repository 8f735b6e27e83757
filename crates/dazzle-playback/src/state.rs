//! Playback status and state

/// Run status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Stopped => "stopped",
            Status::Running => "running",
            Status::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// State owned by the playback machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub status: Status,
    /// Current step; `None` while stopped
    pub current_index: Option<usize>,
    /// Backlight percent to return to when resuming
    pub pre_pause_backlight: Option<u8>,
    /// The inspection brightness is applied in place of the step's value
    pub boost_active: bool,
}

impl PlaybackState {
    pub fn is_active(&self) -> bool {
        self.status != Status::Stopped
    }
}
