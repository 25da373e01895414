//! Interactive command loop over a [`Session`].

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::session::Session;
use crate::traits::AudioSink;

const HELP: &str = "\
Commands:
  load <path>            load an audio or video file
  window <start> <end>   practice window in seconds
  speed <factor>         slowdown factor (2 = half speed)
  loops <n>              times to play the window (0 = until stopped)
  play | pause | resume | stop
  status                 playback state
  info                   loaded file and current parameters
  save <path>            write the processed window as WAV
  help | exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(PathBuf),
    Window(f64, f64),
    Speed(f64),
    Loops(u32),
    Play,
    Pause,
    Resume,
    Stop,
    Status,
    Info,
    Save(PathBuf),
    Help,
    Exit,
}

/// Parse one input line. `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let number = |text: &str, what: &str| -> Result<f64, String> {
        text.parse::<f64>()
            .map_err(|_| format!("{what} must be a number, got '{text}'"))
    };
    let path = |usage: &str| -> Result<PathBuf, String> {
        if rest.is_empty() {
            Err(format!("usage: {usage}"))
        } else {
            Ok(PathBuf::from(rest))
        }
    };

    let command = match word.to_lowercase().as_str() {
        "" => return Ok(None),
        "load" => Command::Load(path("load <path>")?),
        "save" => Command::Save(path("save <path>")?),
        "window" => {
            let args: Vec<&str> = rest.split_whitespace().collect();
            let [start, end] = args[..] else {
                return Err("usage: window <start> <end>".into());
            };
            Command::Window(number(start, "start")?, number(end, "end")?)
        }
        "speed" => Command::Speed(number(rest, "speed")?),
        "loops" => Command::Loops(
            rest.parse()
                .map_err(|_| format!("loops must be a whole number, got '{rest}'"))?,
        ),
        "play" => Command::Play,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "stop" => Command::Stop,
        "status" => Command::Status,
        "info" => Command::Info,
        "help" | "?" => Command::Help,
        "exit" | "quit" => Command::Exit,
        other => return Err(format!("unknown command '{other}', type 'help'")),
    };
    Ok(Some(command))
}

/// Apply `command` to `session`, printing the outcome. False on exit.
pub fn execute<S: AudioSink>(session: &mut Session<S>, command: Command) -> bool {
    let outcome = match command {
        Command::Load(path) => session.load(&path).map(|buffer| {
            println!(
                "📂  Loaded {} ({:.2}s at {} Hz)",
                path.display(),
                buffer.duration_secs(),
                buffer.sample_rate()
            );
        }),
        Command::Window(start, end) => session
            .set_window(start, end)
            .map(|(start, end)| println!("🪟  Window {start:.2}s - {end:.2}s")),
        Command::Speed(factor) => session
            .set_slowdown(factor)
            .map(|()| println!("🐢  Slowdown x{factor}")),
        Command::Loops(n) => {
            session.set_loops(n);
            match n {
                0 => println!("🔁  Looping until stopped"),
                n => println!("🔁  {n} loop(s)"),
            }
            Ok(())
        }
        Command::Play => session.play().map(|()| println!("▶️  {}", session.status_line())),
        Command::Pause => session.pause().map(|()| println!("⏸️  Paused")),
        Command::Resume => session.resume().map(|()| println!("▶️  Resumed")),
        Command::Stop => {
            session.stop();
            println!("⏹️  {}", session.status_line());
            Ok(())
        }
        Command::Status => {
            println!("{}", session.status_line());
            Ok(())
        }
        Command::Info => {
            print_info(session);
            Ok(())
        }
        Command::Save(path) => session
            .save_processed(&path)
            .map(|()| println!("💾  Saved {}", path.display())),
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Exit => {
            session.stop();
            return false;
        }
    };
    if let Err(e) = outcome {
        eprintln!("❌ {e}");
    }
    true
}

const OVERVIEW_WIDTH: usize = 60;
const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One block character per peak in `0.0..=1.0`.
fn sparkline(peaks: &[f32]) -> String {
    peaks
        .iter()
        .map(|&p| {
            let level = (p.clamp(0.0, 1.0) * (LEVELS.len() - 1) as f32).round() as usize;
            LEVELS[level]
        })
        .collect()
}

fn print_info<S: AudioSink>(session: &Session<S>) {
    match (session.path(), session.audio()) {
        (Some(path), Some(audio)) => {
            println!(
                "File: {} ({:.2}s, {} Hz, {} samples)",
                path.display(),
                audio.duration_secs(),
                audio.sample_rate(),
                audio.len()
            );
            println!("      {}", sparkline(&audio.overview(OVERVIEW_WIDTH)));
        }
        _ => println!("File: none"),
    }
    let (start, end) = session.window();
    println!("Window: {start:.2}s - {end:.2}s");
    println!("Slowdown: x{}", session.slowdown());
    match session.loops() {
        0 => println!("Loops: until stopped"),
        n => println!("Loops: {n}"),
    }
    println!("Status: {}", session.status_line());
}

/// Read commands from stdin until `exit` or end of input.
pub fn run_repl<S: AudioSink>(session: &mut Session<S>) {
    println!("\n🎼  slowdowner");
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("Error reading input: {e}");
                continue;
            }
            None => {
                session.stop();
                break;
            }
        };

        match parse_command(&line) {
            Ok(Some(command)) => {
                if !execute(session, command) {
                    break;
                }
            }
            Ok(None) => {}
            Err(message) => eprintln!("❌ {message}"),
        }
    }
    println!("👋  Bye");
}
