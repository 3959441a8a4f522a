// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, Level};

use stagesync::audio::output::list_devices;
use stagesync::config::Settings;
use stagesync::midi::print_destinations;
use stagesync::player::Player;
use stagesync::ui::{App, KeyAction, UiState};

const DEFAULT_SETTINGS: &str = "settings.yaml";

fn print_usage() {
    println!("stagesync - Live stem, MIDI clock and video playback");
    println!();
    println!("Usage: stagesync [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --settings <PATH>   Settings file (default {})", DEFAULT_SETTINGS);
    println!("  --list-midi         List available MIDI destinations");
    println!("  --list-audio        List available audio output devices");
    println!("  --verbose           Debug logging");
    println!("  --help              Show this help message");
}

struct Options {
    settings: PathBuf,
    verbose: bool,
}

/// Parse arguments; `None` when a listing option already did its work
fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut options = Options {
        settings: PathBuf::from(DEFAULT_SETTINGS),
        verbose: false,
    };
    let mut args = args.iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--settings" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--settings requires a path"))?;
                options.settings = PathBuf::from(path);
            }
            "--list-midi" => {
                print_destinations();
                return Ok(None);
            }
            "--list-audio" => {
                for (i, name) in list_devices().iter().enumerate() {
                    println!("  {}: {}", i, name);
                }
                return Ok(None);
            }
            "--verbose" => options.verbose = true,
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            other => {
                print_usage();
                return Err(anyhow!("Unknown option: {}", other));
            }
        }
    }
    Ok(Some(options))
}

/// Log to a file; the terminal belongs to the UI
fn init_logging(path: &Path, verbose: bool) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file: {}", path.display()))?;
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(level)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let Some(options) = parse_args(&args)? else {
        return Ok(());
    };

    let settings = if options.settings.exists() {
        Settings::load(&options.settings)?
    } else {
        Settings::default()
    };
    init_logging(&settings.log_file, options.verbose)?;
    if !options.settings.exists() {
        error!(path = %options.settings.display(), "Settings file not found, using defaults");
    }

    let frame_rate = settings.frame_rate;
    let mut player = Player::open(settings)?;
    if !player.setlist().is_empty() {
        // Failure is shown in the status bar
        let _ = player.load_song();
    }

    let result = run(&mut player, frame_rate);
    player.shutdown();
    info!("Exiting");
    result
}

fn run(player: &mut Player, frame_rate: u32) -> Result<()> {
    let mut app = App::new(frame_rate)?;
    let mut state = UiState::default();
    let mut last_frame = Instant::now();
    let mut frame_carry = 0.0f64;

    while app.is_running() {
        // Without a device the clock is driven from wall time
        if !player.audio().is_connected() {
            let now = Instant::now();
            frame_carry +=
                now.duration_since(last_frame).as_secs_f64() * player.audio().sample_rate() as f64;
            last_frame = now;
            let frames = frame_carry.floor();
            frame_carry -= frames;
            player.pump_audio(frames as usize);
        }

        player.update();
        state.refresh(player);
        app.draw(&state)?;

        let action = app.poll_key(app.frame_period())?;
        if let Err(e) = handle_action(player, &mut app, &mut state, action) {
            state.set_status(format!("{:#}", e));
        }
    }
    Ok(())
}

fn handle_action(
    player: &mut Player,
    app: &mut App,
    state: &mut UiState,
    action: KeyAction,
) -> Result<()> {
    match action {
        KeyAction::None => {}
        KeyAction::Quit => app.quit(),
        KeyAction::Start => player.start_playback(),
        KeyAction::StopAndReload => player.reload()?,
        KeyAction::PreviousSong => player.previous_song()?,
        KeyAction::NextSong => player.next_song()?,
        KeyAction::NextPart => player.jump_to_next_part(),
        KeyAction::PlayNextSong => player.play_next_song()?,
        KeyAction::PlaySong(index) => player.play_song_at(index)?,
        KeyAction::ToggleAutoPlay => {
            let on = player.toggle_auto_play();
            state.set_status(format!("Auto-play {}", if on { "on" } else { "off" }));
        }
        KeyAction::ToggleVideoResync => {
            let on = player.toggle_video_resync();
            state.set_status(format!("Video resync {}", if on { "on" } else { "off" }));
        }
        KeyAction::ToggleLoop => {
            let on = player.toggle_loop();
            state.set_status(format!("Loop {}", if on { "on" } else { "off" }));
        }
        KeyAction::ToggleHelp => state.show_help = !state.show_help,
    }
    Ok(())
}
