// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Transport display widget.

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Gauge, Paragraph, Widget},
};

use super::TransportState;

/// Beats per bar used for the position display
const BEATS_PER_BAR: u8 = 4;

/// Transport widget for displaying playback state
pub struct TransportWidget<'a> {
    state: &'a TransportState,
    block: Option<Block<'a>>,
}

impl<'a> TransportWidget<'a> {
    pub fn new(state: &'a TransportState) -> Self {
        Self { state, block: None }
    }

    /// Set the block wrapper
    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }
}

impl Widget for TransportWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let area = if let Some(block) = self.block {
            let inner = block.inner(area);
            block.render(area, buf);
            inner
        } else {
            area
        };

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Min(0)])
            .split(area);

        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(10), // Play/Stop indicator
                Constraint::Length(2),
                Constraint::Length(12), // Position
                Constraint::Length(2),
                Constraint::Length(12), // Tempo
                Constraint::Length(2),
                Constraint::Min(10), // Song and part
            ])
            .split(rows[0]);

        let (indicator, style) = if self.state.playing {
            ("▶ PLAY", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
        } else {
            ("■ STOP", Style::default().fg(Color::Yellow))
        };
        Paragraph::new(indicator).style(style).render(chunks[0], buf);

        let position = PositionWidget::from_ticks(
            self.state.total_ticks,
            self.state.ticks_per_beat,
            BEATS_PER_BAR,
        );
        position.render(chunks[2], buf);

        let tempo = format!("{:.1} BPM", self.state.tempo);
        Paragraph::new(tempo)
            .style(Style::default().fg(Color::Magenta))
            .render(chunks[4], buf);

        let part = if self.state.part_count > 0 {
            format!(
                "{}  [{}/{}] {}",
                self.state.song,
                self.state.part_index + 1,
                self.state.part_count,
                self.state.part_name
            )
        } else {
            "No song loaded".to_string()
        };
        Paragraph::new(part)
            .style(Style::default().fg(Color::White))
            .render(chunks[6], buf);

        Gauge::default()
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(self.state.progress())
            .label(format_ms(self.state.position_ms))
            .render(rows[1], buf);
    }
}

/// Position display widget
pub struct PositionWidget {
    bar: u64,
    beat: u64,
    tick: u64,
}

impl PositionWidget {
    pub fn new(bar: u64, beat: u64, tick: u64) -> Self {
        Self { bar, beat, tick }
    }

    /// Create from total ticks
    pub fn from_ticks(ticks: u64, ticks_per_beat: u32, beats_per_bar: u8) -> Self {
        let ticks_per_beat = ticks_per_beat.max(1) as u64;
        let ticks_per_bar = ticks_per_beat * beats_per_bar.max(1) as u64;

        let bar = ticks / ticks_per_bar + 1;
        let beat = (ticks % ticks_per_bar) / ticks_per_beat + 1;
        let tick = ticks % ticks_per_beat;

        Self { bar, beat, tick }
    }
}

impl Widget for PositionWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let position = format!("{:03}:{:02}:{:02}", self.bar, self.beat, self.tick);
        Paragraph::new(position)
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .render(area, buf);
    }
}

/// `m:ss.t` display of a song position
pub fn format_ms(ms: f64) -> String {
    let tenths = (ms.max(0.0) / 100.0) as u64;
    format!("{}:{:02}.{}", tenths / 600, (tenths / 10) % 60, tenths % 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_from_ticks() {
        let pos = PositionWidget::from_ticks(0, 24, 4);
        assert_eq!((pos.bar, pos.beat, pos.tick), (1, 1, 0));

        let pos = PositionWidget::from_ticks(24, 24, 4);
        assert_eq!((pos.bar, pos.beat, pos.tick), (1, 2, 0));

        let pos = PositionWidget::from_ticks(96, 24, 4);
        assert_eq!((pos.bar, pos.beat, pos.tick), (2, 1, 0));

        let pos = PositionWidget::from_ticks(110, 24, 4);
        assert_eq!((pos.bar, pos.beat, pos.tick), (2, 1, 14));
    }

    #[test]
    fn test_zero_ticks_per_beat() {
        let pos = PositionWidget::from_ticks(10, 0, 4);
        assert_eq!(pos.bar, 3);
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(0.0), "0:00.0");
        assert_eq!(format_ms(61_250.0), "1:01.2");
        assert_eq!(format_ms(-5.0), "0:00.0");
    }
}
