//! Integration tests for playback against a simulated DDC/CI monitor

use dazzle_config::{PlaybackConfig, Step, TestPlan};
use dazzle_ddc::mock::{Fault, MockMonitor};
use dazzle_ddc::{
    BacklightController, BacklightError, DisplayHandle, TransportConfig, VCP_LUMINANCE,
};
use dazzle_playback::{
    Intent, PauseInfo, PlaybackEvent, PlaybackMachine, PresentationError, Presenter, Session,
    Status, TransitionError, Warning,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;

/// Presenter that records what it was asked to show
#[derive(Clone, Default)]
struct RecordingPresenter {
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingPresenter {
    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl Presenter for RecordingPresenter {
    fn present(&mut self, image_ref: &str) -> Result<(), PresentationError> {
        self.log.lock().unwrap().push(format!("present {}", image_ref));
        Ok(())
    }

    fn show_pause_info(&mut self, info: &PauseInfo) {
        self.log
            .lock()
            .unwrap()
            .push(format!("pause {}@{}", info.step_number, info.pause_percent));
    }

    fn hide_pause_info(&mut self) {
        self.log.lock().unwrap().push("resume".to_string());
    }
}

fn fast_transport() -> TransportConfig {
    TransportConfig {
        command_interval: Duration::from_millis(2),
        reply_delay: Duration::ZERO,
        max_retries: 2,
        retry_backoff: Duration::from_millis(1),
        ..TransportConfig::default()
    }
}

fn two_step_plan() -> TestPlan {
    TestPlan::new(vec![
        Step::new("a.png", 50).unwrap(),
        Step::new("b.png", 10).unwrap(),
    ])
}

fn controller(monitor: &MockMonitor) -> BacklightController {
    let handle = Arc::new(DisplayHandle::new(monitor.clone(), fast_transport()));
    BacklightController::open(handle, VCP_LUMINANCE)
}

#[test]
fn test_pause_boost_scenario() {
    let monitor = MockMonitor::new("panel").with_feature(VCP_LUMINANCE, 70, 100);
    let presenter = RecordingPresenter::default();
    let mut machine = PlaybackMachine::new(
        &two_step_plan(),
        PlaybackConfig::default(),
        controller(&monitor),
        presenter.clone(),
    );

    machine.apply(Intent::Start).unwrap();
    assert_eq!(monitor.writes(VCP_LUMINANCE), vec![50]);

    machine.apply(Intent::Next).unwrap();
    assert_eq!(monitor.writes(VCP_LUMINANCE), vec![50, 10]);

    machine.apply(Intent::TogglePause).unwrap();
    assert_eq!(monitor.writes(VCP_LUMINANCE), vec![50, 10, 80]);
    assert_eq!(machine.state().pre_pause_backlight, Some(10));
    assert!(machine.state().boost_active);

    machine.apply(Intent::TogglePause).unwrap();
    assert_eq!(monitor.writes(VCP_LUMINANCE), vec![50, 10, 80, 10]);
    assert_eq!(monitor.value(VCP_LUMINANCE), Some(10));

    let t = machine.apply(Intent::Stop).unwrap();
    assert_eq!(t.status, Status::Stopped);
    // Stop leaves the last commanded value
    assert_eq!(monitor.writes(VCP_LUMINANCE).len(), 4);

    assert_eq!(
        presenter.entries(),
        vec!["present a.png", "present b.png", "pause 2@80", "resume"]
    );
}

#[test]
fn test_device_range_is_scaled() {
    let monitor = MockMonitor::new("panel").with_feature(VCP_LUMINANCE, 0, 255);
    let mut machine = PlaybackMachine::new(
        &two_step_plan(),
        PlaybackConfig::default(),
        controller(&monitor),
        RecordingPresenter::default(),
    );

    machine.apply(Intent::Start).unwrap();
    machine.apply(Intent::Next).unwrap();
    // 50% -> 127.5 -> 128, 10% -> 25.5 -> 26
    assert_eq!(monitor.writes(VCP_LUMINANCE), vec![128, 26]);
}

#[test]
fn test_queued_next_intents_clamp_at_last_step() {
    let monitor = MockMonitor::new("panel");
    let machine = PlaybackMachine::new(
        &two_step_plan(),
        PlaybackConfig::default(),
        controller(&monitor),
        RecordingPresenter::default(),
    );

    let (tx, mut rx) = unbounded_channel();
    let session = Session::spawn(machine, tx).unwrap();
    let sender = session.sender();
    sender.send(Intent::Start).unwrap();
    for _ in 0..3 {
        sender.send(Intent::Next).unwrap();
    }
    session.finish().unwrap();

    let mut last_index = None;
    while let Ok(event) = rx.try_recv() {
        if let PlaybackEvent::StepChanged { index, .. } = event {
            last_index = Some(index);
        }
    }
    assert_eq!(last_index, Some(1));
    // Start and one effective Next
    assert_eq!(monitor.writes(VCP_LUMINANCE), vec![50, 10]);
}

#[test]
fn test_intents_from_input_thread_apply_in_order() {
    let monitor = MockMonitor::new("panel");
    let machine = PlaybackMachine::new(
        &two_step_plan(),
        PlaybackConfig::default(),
        controller(&monitor),
        RecordingPresenter::default(),
    );

    let (tx, _rx) = unbounded_channel();
    let session = Session::spawn(machine, tx).unwrap();
    let sender = session.sender();
    let input = std::thread::spawn(move || {
        for intent in [
            Intent::Start,
            Intent::Next,
            Intent::TogglePause,
            Intent::Nudge(2),
            Intent::Nudge(2),
            Intent::TogglePause,
        ] {
            sender.send(intent).unwrap();
        }
    });
    input.join().unwrap();

    let steps = session.finish().unwrap();
    assert_eq!(steps[1].backlight_percent, 14);
    assert_eq!(monitor.writes(VCP_LUMINANCE), vec![50, 10, 80, 12, 14]);
}

#[test]
fn test_nudge_rejected_while_running() {
    let monitor = MockMonitor::new("panel");
    let machine = PlaybackMachine::new(
        &two_step_plan(),
        PlaybackConfig::default(),
        controller(&monitor),
        RecordingPresenter::default(),
    );

    let (tx, mut rx) = unbounded_channel();
    let session = Session::spawn(machine, tx).unwrap();
    session.send(Intent::Start);
    session.send(Intent::Nudge(5));
    let steps = session.finish().unwrap();

    assert_eq!(steps[0].backlight_percent, 50);
    let rejected = std::iter::from_fn(|| rx.try_recv().ok()).any(|event| {
        matches!(
            event,
            PlaybackEvent::Rejected {
                intent: Intent::Nudge(5),
                error: TransitionError::NotPaused(Status::Running),
            }
        )
    });
    assert!(rejected);
    assert_eq!(monitor.writes(VCP_LUMINANCE), vec![50]);
}

#[test]
fn test_unsupported_display_plays_images_only() {
    let monitor = MockMonitor::new("tv").without_feature(VCP_LUMINANCE);
    let presenter = RecordingPresenter::default();
    let mut machine = PlaybackMachine::new(
        &two_step_plan(),
        PlaybackConfig::default(),
        controller(&monitor),
        presenter.clone(),
    );

    let t = machine.apply(Intent::Start).unwrap();
    assert!(matches!(
        t.warnings.as_slice(),
        [Warning::Backlight(BacklightError::Unsupported)]
    ));
    for intent in [
        Intent::Next,
        Intent::TogglePause,
        Intent::Previous,
        Intent::TogglePause,
        Intent::Stop,
    ] {
        let t = machine.apply(intent).unwrap();
        assert!(t.warnings.is_empty(), "{:?} warned again", intent);
    }

    assert!(monitor.writes(VCP_LUMINANCE).is_empty());
    assert_eq!(
        presenter.entries(),
        vec![
            "present a.png",
            "present b.png",
            "pause 2@10",
            "present a.png",
            "pause 1@50",
            "resume"
        ]
    );
}

#[test]
fn test_flaky_display_produces_warnings_not_failures() {
    let monitor = MockMonitor::new("panel");
    let mut machine = PlaybackMachine::new(
        &two_step_plan(),
        PlaybackConfig::default(),
        controller(&monitor),
        RecordingPresenter::default(),
    );

    for _ in 0..3 {
        monitor.inject(Fault::Nack);
    }
    let t = machine.apply(Intent::Start).unwrap();
    assert_eq!(t.status, Status::Running);
    assert!(matches!(t.warnings.as_slice(), [Warning::Backlight(_)]));

    // The display recovers for the next step
    let t = machine.apply(Intent::Next).unwrap();
    assert!(t.warnings.is_empty());
    assert_eq!(monitor.writes(VCP_LUMINANCE), vec![10]);
}

#[test]
fn test_restore_on_stop_writes_probed_value() {
    let monitor = MockMonitor::new("panel").with_feature(VCP_LUMINANCE, 35, 100);
    let config = PlaybackConfig {
        restore_on_stop: true,
        ..PlaybackConfig::default()
    };
    let mut machine = PlaybackMachine::new(
        &two_step_plan(),
        config,
        controller(&monitor),
        RecordingPresenter::default(),
    );

    machine.apply(Intent::Start).unwrap();
    machine.apply(Intent::Stop).unwrap();
    assert_eq!(monitor.writes(VCP_LUMINANCE), vec![50, 35]);
}

#[test]
fn test_restore_on_stop_is_exact_on_wide_range() {
    let monitor = MockMonitor::new("panel").with_feature(VCP_LUMINANCE, 70, 255);
    let config = PlaybackConfig {
        restore_on_stop: true,
        ..PlaybackConfig::default()
    };
    let mut machine = PlaybackMachine::new(
        &two_step_plan(),
        config,
        controller(&monitor),
        RecordingPresenter::default(),
    );

    machine.apply(Intent::Start).unwrap();
    let t = machine.apply(Intent::Stop).unwrap();
    assert!(t.warnings.is_empty());
    assert_eq!(monitor.writes(VCP_LUMINANCE), vec![128, 70]);
    assert_eq!(monitor.value(VCP_LUMINANCE), Some(70));
}
