//! Terminal front end: raw-mode keyboard input and a text presenter

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, queue,
    style::Print,
    terminal::{
        Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
        enable_raw_mode,
    },
};
use dazzle_playback::{Intent, IntentSender, Key, PauseInfo, PresentationError, Presenter};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Raw mode and alternate screen for the lifetime of the guard
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, Hide)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

/// Map a terminal key to a playback key
pub fn map_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::Left => Some(Key::Left),
        KeyCode::Right => Some(Key::Right),
        KeyCode::Char(' ') => Some(Key::Space),
        KeyCode::Up => Some(Key::Up),
        KeyCode::Down => Some(Key::Down),
        KeyCode::Esc => Some(Key::Escape),
        _ => None,
    }
}

/// Intent for a key press; Ctrl+C stops like Esc since raw mode swallows SIGINT
pub fn key_intent(key: &KeyEvent, nudge_step: u8) -> Option<Intent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Intent::Stop);
    }
    map_key(key.code).map(|k| k.intent(nudge_step))
}

/// Poll the keyboard on a blocking thread and enqueue intents
pub fn spawn_input_task(
    sender: IntentSender,
    nudge_step: u8,
    running: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while running.load(Ordering::Relaxed) {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        if let Some(intent) = key_intent(&key, nudge_step)
                            && sender.send(intent).is_err()
                        {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Keyboard read failed: {}", e);
                        break;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Keyboard poll failed: {}", e);
                    break;
                }
            }
        }
        tracing::debug!("Input task finished");
    })
}

/// Presenter that checks images exist and describes them on the terminal
///
/// Stands in for a full-screen image window: the operator sees which
/// pattern belongs on the panel and the pause overlay as text.
pub struct TerminalPresenter {
    image_dir: Option<PathBuf>,
    current: Option<PathBuf>,
}

impl TerminalPresenter {
    pub fn new(image_dir: Option<PathBuf>) -> Self {
        Self {
            image_dir,
            current: None,
        }
    }

    /// Resolve `image_ref` against the image directory
    pub fn resolve(&self, image_ref: &str) -> PathBuf {
        let path = Path::new(image_ref);
        match &self.image_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn draw(&self, lines: &[String]) -> io::Result<()> {
        let mut out = io::stdout();
        queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
        for (row, line) in lines.iter().enumerate() {
            queue!(out, MoveTo(0, row as u16), Print(line))?;
        }
        out.flush()
    }

    fn image_line(&self) -> String {
        match &self.current {
            Some(path) => format!("Showing {}", path.display()),
            None => "No image".to_string(),
        }
    }
}

impl Presenter for TerminalPresenter {
    fn present(&mut self, image_ref: &str) -> Result<(), PresentationError> {
        let path = self.resolve(image_ref);
        if !path.is_file() {
            return Err(PresentationError::NotFound(path));
        }
        self.current = Some(path);

        let lines = [
            self.image_line(),
            String::new(),
            "Left/Right: step  Space: pause  Esc: stop".to_string(),
        ];
        self.draw(&lines)
            .map_err(|e| PresentationError::Failed(e.to_string()))
    }

    fn show_pause_info(&mut self, info: &PauseInfo) {
        let mut lines = vec![
            self.image_line(),
            String::new(),
            format!(
                "PAUSED  step {}/{}: {}",
                info.step_number,
                info.step_count,
                info.name.as_deref().unwrap_or(&info.image_ref)
            ),
            format!("Target backlight {}%", info.target_percent),
        ];
        if info.boosted() {
            lines.push(format!("Inspecting at {}%", info.pause_percent));
        }
        lines.push("Up/Down: nudge  Space: resume  Esc: stop".to_string());

        if let Err(e) = self.draw(&lines) {
            tracing::debug!("Failed to draw pause overlay: {}", e);
        }
    }

    fn hide_pause_info(&mut self) {
        let lines = [
            self.image_line(),
            String::new(),
            "Left/Right: step  Space: pause  Esc: stop".to_string(),
        ];
        if let Err(e) = self.draw(&lines) {
            tracing::debug!("Failed to redraw: {}", e);
        }
    }

    fn clear(&mut self) {
        self.current = None;
        if let Err(e) = self.draw(&[]) {
            tracing::debug!("Failed to clear screen: {}", e);
        }
    }
}
