use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use slowdowner::audio_io::{AudioSource, CpalSink};
use slowdowner::cli::run_repl;
use slowdowner::config::Settings;
use slowdowner::playback::PlaybackState;
use slowdowner::session::Session;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Loop a section of a song or video slowed down, without changing its pitch.
#[derive(Parser, Debug)]
#[command(name = "slowdowner", version, about)]
struct Args {
    /// Audio or video file to load at startup.
    file: Option<PathBuf>,

    /// TOML settings file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Window start in seconds.
    #[arg(long, requires = "file")]
    start: Option<f64>,

    /// Window end in seconds.
    #[arg(long, requires = "file")]
    end: Option<f64>,

    /// Slowdown factor (2 = half speed).
    #[arg(short, long)]
    speed: Option<f64>,

    /// Number of loops, 0 to loop until interrupted.
    #[arg(short, long)]
    loops: Option<u32>,

    /// Play FILE once loaded and exit when playback ends instead of opening the prompt.
    #[arg(long, requires = "file")]
    play: bool,
}

fn init_logging() -> anyhow::Result<()> {
    let file = File::create("slowdowner.log").context("failed to create log file")?;
    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_names(true)
        .with_level(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_thread_names(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(console_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging()?;

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(speed) = args.speed {
        settings.playback.slowdown = speed;
    }
    if let Some(loops) = args.loops {
        settings.playback.loops = loops;
    }
    settings.validate()?;

    let source = AudioSource::from_settings(&settings.video);
    let mut session = Session::new(&settings, source, Arc::new(CpalSink::new()))?;

    if let Some(file) = &args.file {
        session
            .load(file)
            .with_context(|| format!("cannot load {}", file.display()))?;
        if args.start.is_some() || args.end.is_some() {
            let (start, end) = session.window();
            session.set_window(args.start.unwrap_or(start), args.end.unwrap_or(end))?;
        }
    }

    if args.play {
        session.play()?;
        println!("▶️  {}", session.status_line());
        loop {
            let state = session.wait(Duration::from_secs(1));
            if !state.is_active() {
                println!("{}", session.status_line());
                if let PlaybackState::Failed(reason) = state {
                    anyhow::bail!("playback failed: {reason}");
                }
                return Ok(());
            }
        }
    }

    run_repl(&mut session);
    Ok(())
}
