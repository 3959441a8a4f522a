// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Terminal UI for stagesync.
//!
//! Provides a ratatui-based terminal interface with the transport, the
//! setlist, the sync diagnostics of both correction loops and a status bar.

mod transport;

pub use transport::{format_ms, PositionWidget, TransportWidget};

use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
    Frame, Terminal,
};

use crate::player::{Player, PlayerState, SyncDiagnostics};
use crate::song::SongTimeline;
use crate::timing::PPQN;
use crate::video::VideoDecoder;

/// How long a status message stays visible
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// UI state rebuilt from the player every frame
#[derive(Debug, Clone, Default)]
pub struct UiState {
    pub transport: TransportState,
    pub setlist: Vec<String>,
    pub song_index: usize,
    pub sync: SyncDiagnostics,
    pub auto_play_next: bool,
    pub loop_mode: bool,
    pub video_resync: bool,
    pub audio_connected: bool,
    /// Help text visible
    pub show_help: bool,
    /// Status message
    pub status_message: Option<String>,
    /// Status message timestamp
    pub status_time: Option<Instant>,
    /// Last status seen on the player
    player_status: Option<String>,
}

impl UiState {
    /// Set a status message that will be displayed temporarily
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_time = Some(Instant::now());
    }

    /// Clear expired status message
    pub fn clear_expired_status(&mut self) {
        if let Some(time) = self.status_time {
            if time.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
                self.status_time = None;
            }
        }
    }

    /// Copy everything displayed from the player
    pub fn refresh<D: VideoDecoder>(&mut self, player: &Player<D>) {
        let clock = player.clock();
        self.transport = match player.timeline() {
            Some(timeline) => TransportState::from_timeline(
                timeline,
                clock.tick_count(),
                clock.current_part_index(),
                player.state() == PlayerState::Playing,
            ),
            None => TransportState::default(),
        };
        self.setlist = (0..player.setlist().len())
            .filter_map(|i| player.setlist().get(i).map(str::to_string))
            .collect();
        self.song_index = player.song_index();
        self.sync = player.diagnostics();
        self.auto_play_next = player.auto_play_next();
        self.loop_mode = player.loop_mode();
        self.video_resync = player.video_resync();
        self.audio_connected = player.audio().is_connected();
        let status = player.status();
        if status != self.player_status.as_deref() {
            self.player_status = status.map(str::to_string);
            if let Some(status) = status {
                self.set_status(status);
            }
        }
        self.clear_expired_status();
    }
}

/// Transport state for UI display
#[derive(Debug, Clone, PartialEq)]
pub struct TransportState {
    pub playing: bool,
    pub song: String,
    pub part_name: String,
    pub part_index: usize,
    /// Real parts, end marker excluded
    pub part_count: usize,
    pub tempo: f64,
    pub ticks_per_beat: u32,
    pub total_ticks: u64,
    pub song_ticks: u64,
    pub position_ms: f64,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            playing: false,
            song: String::new(),
            part_name: String::new(),
            part_index: 0,
            part_count: 0,
            tempo: 120.0,
            ticks_per_beat: PPQN,
            total_ticks: 0,
            song_ticks: 0,
            position_ms: 0.0,
        }
    }
}

impl TransportState {
    pub fn from_timeline(
        timeline: &SongTimeline,
        tick: u64,
        part_index: usize,
        playing: bool,
    ) -> Self {
        let part = timeline.part(part_index);
        Self {
            playing,
            song: timeline.name().to_string(),
            part_name: part.map(|p| p.display_name.clone()).unwrap_or_default(),
            part_index,
            part_count: timeline.last_index(),
            tempo: timeline.tempo_at(part_index),
            ticks_per_beat: timeline.ticks_per_beat(),
            total_ticks: tick,
            song_ticks: timeline.total_ticks(),
            position_ms: timeline.position_ms_at_tick(tick),
        }
    }

    /// Fraction of the song played, 0.0 to 1.0
    pub fn progress(&self) -> f64 {
        if self.song_ticks == 0 {
            return 0.0;
        }
        (self.total_ticks as f64 / self.song_ticks as f64).clamp(0.0, 1.0)
    }
}

/// Key event result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// No action needed
    None,
    /// Quit the application
    Quit,
    /// Start playback at the current part
    Start,
    /// Stop and reload the current song
    StopAndReload,
    PreviousSong,
    NextSong,
    NextPart,
    /// Load the next song and play it
    PlayNextSong,
    /// Load a setlist entry and play it
    PlaySong(usize),
    ToggleAutoPlay,
    ToggleVideoResync,
    ToggleLoop,
    ToggleHelp,
}

/// Map a key press to an action
pub fn map_key(code: KeyCode, modifiers: KeyModifiers) -> KeyAction {
    match (code, modifiers) {
        (KeyCode::Char('q'), KeyModifiers::NONE) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
            KeyAction::Quit
        }
        (KeyCode::Right, _) => KeyAction::Start,
        (KeyCode::Left, _) => KeyAction::StopAndReload,
        (KeyCode::Up, _) => KeyAction::PreviousSong,
        (KeyCode::Down, _) => KeyAction::NextSong,
        (KeyCode::Char('n'), KeyModifiers::NONE) => KeyAction::NextPart,
        (KeyCode::Char('p'), KeyModifiers::NONE) => KeyAction::PlayNextSong,
        (KeyCode::Char(c @ '0'..='9'), KeyModifiers::NONE) => {
            KeyAction::PlaySong((c as usize) - ('0' as usize))
        }
        (KeyCode::Char('w'), KeyModifiers::NONE) => KeyAction::ToggleAutoPlay,
        (KeyCode::Char('x'), KeyModifiers::NONE) => KeyAction::ToggleVideoResync,
        (KeyCode::Char('l'), KeyModifiers::NONE) => KeyAction::ToggleLoop,
        (KeyCode::Char('?'), _) | (KeyCode::Char('h'), KeyModifiers::NONE) => {
            KeyAction::ToggleHelp
        }
        _ => KeyAction::None,
    }
}

/// Terminal UI application
pub struct App {
    /// Terminal handle
    terminal: Terminal<CrosstermBackend<Stdout>>,
    /// Target frame rate
    frame_rate: u32,
    /// Whether to continue running
    running: bool,
}

impl App {
    /// Take over the terminal
    pub fn new(frame_rate: u32) -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            frame_rate: frame_rate.clamp(1, 120),
            running: true,
        })
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stop the app
    pub fn quit(&mut self) {
        self.running = false;
    }

    /// Frame period at the configured rate
    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(1000 / self.frame_rate as u64)
    }

    /// Wait up to `timeout` for a key press
    pub fn poll_key(&self, timeout: Duration) -> io::Result<KeyAction> {
        if !event::poll(timeout)? {
            return Ok(KeyAction::None);
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                Ok(map_key(key.code, key.modifiers))
            }
            _ => Ok(KeyAction::None),
        }
    }

    /// Draw the UI
    pub fn draw(&mut self, state: &UiState) -> io::Result<()> {
        self.terminal.draw(|frame| {
            let area = frame.area();

            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(4), // Transport
                    Constraint::Min(6),    // Setlist and sync
                    Constraint::Length(1), // Status bar
                ])
                .split(area);

            let transport = TransportWidget::new(&state.transport)
                .block(Block::default().borders(Borders::ALL).title(" Transport "));
            frame.render_widget(transport, chunks[0]);

            let body = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(chunks[1]);
            render_setlist(frame, body[0], state);
            render_sync(frame, body[1], state);

            render_status_bar(frame, chunks[2], state);

            if state.show_help {
                render_help_overlay(frame, area);
            }
        })?;

        Ok(())
    }

    /// Restore the terminal
    fn cleanup(&mut self) -> io::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Render setlist section
fn render_setlist(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title(" Setlist ");

    if state.setlist.is_empty() {
        let empty = Paragraph::new("No songs found")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = state
        .setlist
        .iter()
        .enumerate()
        .map(|(i, song)| {
            let style = if i == state.song_index {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            let marker = if i == state.song_index { ">" } else { " " };
            ListItem::new(format!("{} {:2} {}", marker, i, song)).style(style)
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

/// Render sync diagnostics section
fn render_sync(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title(" Sync ");
    let sync = &state.sync;
    let label = Style::default().fg(Color::DarkGray);

    let clock_delay = match &sync.clock {
        Some(decision) => format!(
            "{:+7.1} ms ({:+.2} ticks)",
            decision.delay_ms, decision.ticks_late
        ),
        None => "-".to_string(),
    };
    let video_delay = if sync.video_loaded {
        format!("{:+7.1} ms", sync.video_delay_ms)
    } else {
        "no clip".to_string()
    };
    let speed_style = if (sync.video_speed - 1.0).abs() < f64::EPSILON {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Yellow)
    };

    let lines = vec![
        Line::from(vec![
            Span::styled("Audio        ", label),
            Span::raw(format_ms(sync.audio_position_ms)),
        ]),
        Line::from(vec![
            Span::styled("Clock delay  ", label),
            Span::raw(clock_delay),
        ]),
        Line::from(vec![
            Span::styled("Correction   ", label),
            Span::raw(format!(
                "staged {:+} active {:+}",
                sync.staged_correction, sync.active_correction
            )),
        ]),
        Line::from(vec![
            Span::styled("Video delay  ", label),
            Span::raw(video_delay),
        ]),
        Line::from(vec![
            Span::styled("Video speed  ", label),
            Span::styled(format!("{:.3}", sync.video_speed), speed_style),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn flag(name: &str, on: bool) -> Span<'_> {
    let style = if on {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Span::styled(format!(" {} ", name), style)
}

/// Render status bar
fn render_status_bar(frame: &mut Frame, area: Rect, state: &UiState) {
    let mut spans = vec![
        flag("AUTO", state.auto_play_next),
        flag("LOOP", state.loop_mode),
        flag("RESYNC", state.video_resync),
    ];
    if !state.audio_connected {
        spans.push(Span::styled(" NO AUDIO ", Style::default().fg(Color::Red)));
    }
    match &state.status_message {
        Some(msg) => spans.push(Span::styled(format!(" {}", msg), Style::default().fg(Color::Yellow))),
        None => spans.push(Span::styled(
            " →: Start | ←: Stop | ↑/↓: Song | n: Next part | h: Help | q: Quit",
            Style::default().fg(Color::DarkGray),
        )),
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Render help overlay
fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let width = 50.min(area.width.saturating_sub(4));
    let height = 18.min(area.height.saturating_sub(4));
    let x = (area.width - width) / 2;
    let y = (area.height - height) / 2;
    let help_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, help_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Help ")
        .style(Style::default().bg(Color::Black));

    let help_text = vec![
        Line::from(Span::styled("Transport", Style::default().add_modifier(Modifier::BOLD))),
        Line::from("  Right       Start at current part"),
        Line::from("  Left        Stop and reload song"),
        Line::from("  n           Next part"),
        Line::from(""),
        Line::from(Span::styled("Setlist", Style::default().add_modifier(Modifier::BOLD))),
        Line::from("  Up/Down     Previous/next song"),
        Line::from("  p           Play next song"),
        Line::from("  0-9         Play song by number"),
        Line::from(""),
        Line::from(Span::styled("Options", Style::default().add_modifier(Modifier::BOLD))),
        Line::from("  w           Auto-play next song"),
        Line::from("  x           Video resync"),
        Line::from("  l           Loop current part"),
        Line::from("  h/?         Toggle help"),
        Line::from("  q/Ctrl+c    Quit"),
    ];

    frame.render_widget(Paragraph::new(help_text).block(block), help_area);
}
