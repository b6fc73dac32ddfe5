use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dynamicpad::config::{InputPreference, PadConfig, Theme};
use dynamicpad::ui::TerminalUI;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputArg {
    Auto,
    Keyboard,
    Pointer,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ThemeArg {
    Dusk,
    Light,
}

/// Terminal trigger pad: hold keys or drag the mouse to layer looping audio
/// under pulsing visuals, and record the performance.
#[derive(Debug, Parser)]
#[command(name = "dynamicpad", version, about)]
struct Cli {
    /// Pad manifest (TOML) listing the media to bind
    manifest: PathBuf,

    /// Write debug logs to debug.log
    #[arg(long)]
    debug: bool,

    /// Start in hold (latch) mode
    #[arg(long)]
    hold: bool,

    /// Which input drives the pad
    #[arg(long, value_enum)]
    input: Option<InputArg>,

    /// Where recordings are written
    #[arg(long)]
    record_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    theme: Option<ThemeArg>,
}

impl Cli {
    fn apply(&self, config: &mut PadConfig) {
        if self.hold {
            config.engine.hold_mode = true;
        }
        if let Some(input) = self.input {
            config.engine.input = match input {
                InputArg::Auto => InputPreference::Auto,
                InputArg::Keyboard => InputPreference::Keyboard,
                InputArg::Pointer => InputPreference::Pointer,
            };
        }
        if let Some(dir) = &self.record_dir {
            config.recording.output_dir = dir.clone();
        }
        if let Some(theme) = self.theme {
            config.style.theme = match theme {
                ThemeArg::Dusk => Theme::Dusk,
                ThemeArg::Light => Theme::Light,
            };
        }
    }
}

fn init_logging() -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .context("failed to open debug.log")?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dynamicpad=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The terminal belongs to the UI, so logs only ever go to a file.
    if cli.debug {
        init_logging()?;
        println!("Starting DynamicPad in DEBUG mode...");
    } else {
        println!("Starting DynamicPad...");
    }

    let mut config = PadConfig::load(&cli.manifest)
        .with_context(|| format!("loading {}", cli.manifest.display()))?;
    cli.apply(&mut config);
    config.validate()?;
    tracing::info!(media = config.media.len(), "manifest loaded");

    let mut ui = TerminalUI::new(config).context("UI creation failed")?;
    ui.run().context("UI run failed")?;
    drop(ui);

    println!("DynamicPad stopped.");
    Ok(())
}
