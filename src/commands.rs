// Command-line front end
// Loads one project, prints its summary and toggles playback from stdin
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::audio::{CpalSink, Player, ToggleOutcome};
use crate::scheduler::ScheduleReport;
use crate::settings::AppSettings;

const USAGE: &str = "usage: dawplayer <project.dawproject> [settings.json]";

/// One line of interactive input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Empty line, "p" or "play": play/pause
    Toggle,
    Status,
    /// "v 0.5": output volume, 0.0 to 1.0
    Volume(f32),
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim().to_lowercase();
        if let Some(level) = line.strip_prefix("v ").or_else(|| line.strip_prefix("volume ")) {
            if let Ok(level) = level.trim().parse::<f32>() {
                return Command::Volume(level);
            }
        }
        match line.as_str() {
            "" | "p" | "play" | "pause" => Command::Toggle,
            "s" | "status" => Command::Status,
            "q" | "quit" | "exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Parsed command-line arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub project: PathBuf,
    pub settings: Option<PathBuf>,
}

impl Args {
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut args = args.into_iter().skip(1);
        let Some(project) = args.next() else {
            bail!(USAGE);
        };
        let settings = args.next().map(PathBuf::from);
        if args.next().is_some() {
            bail!(USAGE);
        }
        Ok(Self {
            project: PathBuf::from(project),
            settings,
        })
    }
}

pub async fn run<I: IntoIterator<Item = String>>(args: I) -> Result<()> {
    let args = Args::parse(args)?;
    // Without an explicit path, pick up ./settings.json when present
    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(|| AppSettings::get_settings_path(Path::new(".")));
    let settings = AppSettings::load(&settings_path)?;

    let sink = Arc::new(
        CpalSink::new(settings.playback.volume)
            .map_err(anyhow::Error::msg)
            .context("Failed to open audio output")?,
    );
    println!(
        "Output: {} Hz, {} channels, volume {:.2}",
        sink.sample_rate(),
        sink.channels(),
        sink.volume()
    );
    let mut player = Player::new(sink.clone(), settings.playback.clone());

    let model = player
        .load_file(&args.project)
        .with_context(|| format!("Failed to load project {:?}", args.project))?;
    println!("{}", model);
    if let Some(session) = player.session() {
        println!("Archive: {} entries", session.archive().len());
    }
    println!("Enter: play/pause, s: status, v <0-1>: volume, q: quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Toggle => match player.toggle().await {
                Ok(ToggleOutcome::Started(report)) => print_report(&report),
                Ok(ToggleOutcome::Suspended) => println!("Paused"),
                Ok(ToggleOutcome::Resumed) => println!("Playing"),
                Err(e) => eprintln!("Error: {}", e),
            },
            Command::Status => {
                println!("Transport: {:?}, tempo: {} BPM", player.state(), player.tempo().beats_per_minute());
                if let Some(report) = player.last_report() {
                    print_report(report);
                }
            }
            Command::Volume(level) => {
                sink.set_volume(level);
                println!("Volume {:.2}", sink.volume());
            }
            Command::Quit => break,
            Command::Unknown(other) => println!("Unknown command {:?}", other),
        }
    }

    Ok(())
}

fn print_report(report: &ScheduleReport) {
    for clip in &report.scheduled {
        println!("SCHEDULED: {} at {:.2}s", clip.path, clip.start_offset_seconds);
    }
    for warning in &report.warnings {
        println!("WARNING: {}", warning);
    }
    println!(
        "{} clips scheduled, {} warnings",
        report.scheduled_count(),
        report.warnings.len()
    );
}
