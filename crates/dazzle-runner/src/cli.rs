use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(name = "dazzletest")]
#[command(about = "Play a display test plan with DDC/CI backlight control")]
pub struct Cli {
    /// Test plan (JSON) to play.
    #[arg(required_unless_present = "list_displays")]
    pub plan: Option<PathBuf>,

    /// Configuration file instead of the system and user defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// I2C bus of the display under test (skips discovery).
    #[arg(long, conflicts_with = "mock")]
    pub bus: Option<u32>,

    /// List DDC/CI capable displays and exit.
    #[arg(long)]
    pub list_displays: bool,

    /// Drive a simulated monitor instead of real hardware.
    #[arg(long)]
    pub mock: bool,

    /// Directory image references are resolved against.
    #[arg(long)]
    pub image_dir: Option<PathBuf>,

    /// Save the plan with nudged backlight values here when done.
    #[arg(long, value_name = "PATH")]
    pub save_adjusted: Option<PathBuf>,

    /// Read the backlight back after starting and log it.
    #[arg(long)]
    pub verify: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
