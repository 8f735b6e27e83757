//! DazzleTest runner
//!
//! Plays a test plan on the display under test: steps through the images,
//! drives the backlight over DDC/CI and takes keyboard navigation in a raw
//! terminal.

mod cli;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};

use cli::Cli;
use dazzle_config::{ChecksumMode, DazzleConfig, DdcConfig, TestPlan};
use dazzle_ddc::mock::MockMonitor;
use dazzle_ddc::{
    BacklightControl, BacklightController, ChecksumPolicy, DiscoveredBus, DisplayHandle,
    TransportConfig,
};
use dazzle_playback::{
    Intent, PlaybackEvent, PlaybackMachine, Session, Status, TransitionError,
};
use terminal::{TerminalGuard, TerminalPresenter, spawn_input_task};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_file.as_deref())?;

    let mut config = match &cli.config {
        Some(path) => DazzleConfig::load(path)
            .with_context(|| format!("load configuration {}", path.display()))?,
        None => DazzleConfig::load_default().context("load configuration")?,
    };
    if let Some(bus) = cli.bus {
        config.ddc.bus = Some(bus);
    }

    if cli.list_displays {
        list_displays(&config.ddc);
        return Ok(());
    }

    let plan_path = cli.plan.clone().context("a test plan is required")?;
    let plan = TestPlan::load(&plan_path)
        .with_context(|| format!("load test plan {}", plan_path.display()))?;

    let image_dir = cli
        .image_dir
        .clone()
        .or_else(|| config.presentation.image_dir.clone())
        .or_else(|| plan_path.parent().map(Path::to_path_buf));

    let backlight = open_backlight(&cli, &config.ddc);
    if !backlight.capability().supports_backlight {
        info!("Backlight control unavailable, running image-only");
    }
    let verifier = if cli.verify {
        backlight
            .handle()
            .map(|handle| BacklightController::new(Arc::clone(handle), *backlight.capability()))
    } else {
        None
    };

    let machine = PlaybackMachine::new(
        &plan,
        config.playback.clone(),
        backlight,
        TerminalPresenter::new(image_dir),
    );

    let (event_tx, mut event_rx) = unbounded_channel();
    let session = Session::spawn(machine, event_tx).context("start playback session")?;

    let guard = TerminalGuard::enter().context("enter raw terminal mode")?;
    let running = Arc::new(AtomicBool::new(true));
    let input = spawn_input_task(
        session.sender(),
        config.playback.nudge_step,
        Arc::clone(&running),
    );

    if !session.send(Intent::Start) {
        error!("Playback session stopped before the test started");
    }
    let outcome = run_event_loop(&session, &mut event_rx, verifier).await;

    running.store(false, Ordering::Relaxed);
    if let Err(e) = input.await {
        warn!("Input task failed: {}", e);
    }
    drop(guard);

    let steps = session.finish().context("finish playback session")?;
    outcome?;

    if let Some(path) = &cli.save_adjusted {
        let mut adjusted = plan.clone();
        adjusted.steps = steps;
        adjusted
            .save(path)
            .with_context(|| format!("save adjusted plan {}", path.display()))?;
    }

    Ok(())
}

/// Consume session events until playback stops
async fn run_event_loop(
    session: &Session,
    events: &mut tokio::sync::mpsc::UnboundedReceiver<PlaybackEvent>,
    mut verifier: Option<BacklightController>,
) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    PlaybackEvent::StepChanged { index, step } => {
                        info!("Now at step {}: {} ({}%)", index + 1, step.label(), step.backlight_percent);
                        if let Some(controller) = verifier.take() {
                            tokio::spawn(verify_backlight(controller, step.backlight_percent));
                        }
                    }
                    PlaybackEvent::StatusChanged(Status::Stopped) => break,
                    PlaybackEvent::StatusChanged(status) => info!("Playback {}", status),
                    PlaybackEvent::Warning(warning) => warn!("{}", warning),
                    PlaybackEvent::Rejected { error: TransitionError::EmptyPlan, .. } => {
                        anyhow::bail!("the test plan has no steps");
                    }
                    PlaybackEvent::Rejected { intent, error } => {
                        info!("Ignored {:?}: {}", intent, error);
                    }
                }
            }
            result = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = result {
                    error!("Unable to listen for interrupt: {}", e);
                }
                info!("Interrupted, stopping");
                if !session.send(Intent::Stop) {
                    warn!("Playback session already finished");
                }
            }
        }
    }

    Ok(())
}

/// Read the backlight back once, off the async runtime
async fn verify_backlight(mut controller: BacklightController, requested: u8) {
    let result = tokio::task::spawn_blocking(move || controller.get_backlight()).await;
    match result {
        Ok(Ok(percent)) if percent == requested => {
            info!("Display confirms backlight at {}%", percent)
        }
        Ok(Ok(percent)) => warn!(
            "Display reports backlight at {}%, requested {}%",
            percent, requested
        ),
        Ok(Err(e)) => warn!("Backlight read-back failed: {}", e),
        Err(e) => warn!("Backlight read-back task failed: {}", e),
    }
}

fn open_backlight(cli: &Cli, ddc: &DdcConfig) -> BacklightController {
    let code = ddc.feature_code;
    let transport = transport_config(ddc);

    if cli.mock {
        info!("Using simulated monitor");
        let monitor = MockMonitor::new("Simulated display").with_feature(code, 75, 100);
        let handle = DisplayHandle::new(monitor, transport);
        return BacklightController::open(Arc::new(handle), code);
    }

    let bus = ddc.bus.or_else(|| {
        let found = dazzle_ddc::discover(&transport);
        if found.len() > 1 {
            info!(
                "{} DDC/CI displays found, using i2c-{} ({}), pass --bus to choose",
                found.len(),
                found[0].bus,
                found[0].label()
            );
        }
        found.first().map(|d| d.bus)
    });

    match bus {
        Some(bus) => match dazzle_ddc::open_display(bus, transport) {
            Ok(handle) => BacklightController::open(Arc::new(handle), code),
            Err(e) => {
                warn!("Cannot open DDC/CI on i2c-{}: {}", bus, e);
                BacklightController::detached(code)
            }
        },
        None => {
            warn!("No DDC/CI display found");
            BacklightController::detached(code)
        }
    }
}

fn list_displays(ddc: &DdcConfig) {
    let found = dazzle_ddc::discover(&transport_config(ddc));
    if found.is_empty() {
        println!("No DDC/CI displays found");
        return;
    }
    for display in found {
        println!("{}", display_line(&display));
    }
}

fn display_line(display: &DiscoveredBus) -> String {
    format!(
        "i2c-{}\t{}\t{}\t{}",
        display.bus,
        display.path.display(),
        display.model.as_deref().unwrap_or("-"),
        display.adapter
    )
}

fn transport_config(ddc: &DdcConfig) -> TransportConfig {
    TransportConfig {
        command_interval: std::time::Duration::from_millis(ddc.command_interval_ms),
        reply_delay: std::time::Duration::from_millis(ddc.reply_delay_ms),
        max_retries: ddc.max_retries,
        retry_backoff: std::time::Duration::from_millis(ddc.retry_backoff_ms),
        checksum: match ddc.checksum {
            ChecksumMode::Strict => ChecksumPolicy::Strict,
            ChecksumMode::Warn => ChecksumPolicy::Warn,
            ChecksumMode::Ignore => ChecksumPolicy::Ignore,
        },
    }
}

fn setup_logging(log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            registry
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            registry
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(io::stderr),
                )
                .init();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dazzle_config::{PlaybackConfig, Step};
    use dazzle_ddc::VCP_LUMINANCE;
    use dazzle_playback::{PresentationError, Presenter};
    use std::time::{Duration, Instant};

    struct Blank;

    impl Presenter for Blank {
        fn present(&mut self, _image_ref: &str) -> Result<(), PresentationError> {
            Ok(())
        }
    }

    #[test]
    fn test_transport_config_from_ddc_section() {
        let ddc = DdcConfig {
            command_interval_ms: 60,
            reply_delay_ms: 45,
            max_retries: 5,
            retry_backoff_ms: 10,
            checksum: ChecksumMode::Warn,
            ..DdcConfig::default()
        };
        let transport = transport_config(&ddc);
        assert_eq!(transport.command_interval, Duration::from_millis(60));
        assert_eq!(transport.reply_delay, Duration::from_millis(45));
        assert_eq!(transport.max_retries, 5);
        assert_eq!(transport.retry_backoff, Duration::from_millis(10));
        assert_eq!(transport.checksum, ChecksumPolicy::Warn);
    }

    #[test]
    fn test_mock_backlight_is_supported() {
        let cli = Cli::try_parse_from(["dazzletest", "plan.json", "--mock"]).unwrap();
        let mut ddc = DdcConfig::default();
        ddc.command_interval_ms = 1;
        ddc.reply_delay_ms = 0;

        let mut backlight = open_backlight(&cli, &ddc);
        assert!(backlight.capability().supports_backlight);
        assert_eq!(backlight.initial_backlight(), Some(75));
        backlight.set_backlight(40).unwrap();
        assert_eq!(backlight.get_backlight().unwrap(), 40);
    }

    #[test]
    fn test_display_line_shows_model() {
        let display = DiscoveredBus {
            bus: 6,
            path: "/dev/i2c-6".into(),
            adapter: "AMDGPU DM i2c hw bus 2".to_string(),
            model: Some("DELL U2720Q".to_string()),
        };
        assert_eq!(
            display_line(&display),
            "i2c-6\t/dev/i2c-6\tDELL U2720Q\tAMDGPU DM i2c hw bus 2"
        );

        let unnamed = DiscoveredBus { model: None, ..display };
        assert!(display_line(&unnamed).contains("\t-\t"));
    }

    #[tokio::test]
    async fn test_slow_verification_does_not_hold_up_events() {
        let slow = TransportConfig {
            command_interval: Duration::from_millis(1),
            reply_delay: Duration::from_millis(800),
            max_retries: 0,
            ..TransportConfig::default()
        };
        let monitor = MockMonitor::new("slow").with_feature(VCP_LUMINANCE, 75, 100);
        let handle = Arc::new(DisplayHandle::new(monitor, slow));
        let backlight = BacklightController::open(Arc::clone(&handle), VCP_LUMINANCE);
        let verifier = BacklightController::new(handle, *backlight.capability());

        let plan = TestPlan::new(vec![Step::new("a.png", 40).unwrap()]);
        let machine = PlaybackMachine::new(&plan, PlaybackConfig::default(), backlight, Blank);
        let (tx, mut rx) = unbounded_channel();
        let session = Session::spawn(machine, tx).unwrap();
        assert!(session.send(Intent::Start));
        assert!(session.send(Intent::Stop));

        let started = Instant::now();
        run_event_loop(&session, &mut rx, Some(verifier)).await.unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(400),
            "event loop waited {:?} for the read-back",
            started.elapsed()
        );
        session.finish().unwrap();
    }
}
