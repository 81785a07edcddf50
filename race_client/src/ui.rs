use std::collections::VecDeque;

use ratatui::layout::{Constraint, Direction, Layout, Margin};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use race_core::{
    render_strip, CarView, EngineConfig, Particle, ParticleField, ParticleKind, PayoutEstimate,
    Phase, ProgressMapper, RoundState, TerrainSight,
};
use race_proto::{CarId, Round};

pub const TRACK_WIDTH: usize = 48;

pub struct UiState {
    pub logs: VecDeque<String>,
    pub max_logs: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            logs: VecDeque::new(),
            max_logs: 8,
        }
    }
}

impl UiState {
    pub fn push_log<S: Into<String>>(&mut self, line: S) {
        let mut text: String = line.into();
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        if text.is_empty() {
            return;
        }
        self.logs.push_front(text);
        while self.logs.len() > self.max_logs {
            self.logs.pop_back();
        }
    }
}

/// Everything one frame needs, borrowed from the app.
pub struct ViewModel<'a> {
    pub state: &'a RoundState,
    pub config: &'a EngineConfig,
    pub mapper: &'a ProgressMapper,
    pub views: &'a [CarView],
    pub particles: &'a ParticleField,
}

/// Cars ordered by lane; number key `n` selects the `n`th entry.
pub fn cars_by_lane(round: &Round) -> Vec<CarId> {
    let mut assignments = round.assignments.clone();
    assignments.sort_by_key(|assignment| assignment.lane);
    assignments.into_iter().map(|a| a.car_id).collect()
}

pub fn car_for_key(round: &Round, key: usize) -> Option<CarId> {
    key.checked_sub(1)
        .and_then(|index| cars_by_lane(round).get(index).copied())
}

/// One text row of a lane: terrain fill, particles behind the car, then the car.
pub fn track_line<'p>(
    strip: &[TerrainSight],
    width: usize,
    track_length: f32,
    car_distance: f32,
    particles: impl Iterator<Item = &'p Particle>,
) -> String {
    if width == 0 {
        return String::new();
    }
    let segments = strip.len().max(1);
    let mut cells: Vec<char> = (0..width)
        .map(|i| strip.get(i * segments / width).map_or(' ', |s| s.glyph()))
        .collect();
    let cell_of = |distance: f32| -> usize {
        let ratio = if track_length > 0.0 {
            distance / track_length
        } else {
            0.0
        };
        (ratio * (width - 1) as f32).round().clamp(0.0, (width - 1) as f32) as usize
    };
    for particle in particles {
        if particle.x < 0.0 || particle.x > track_length {
            continue;
        }
        cells[cell_of(particle.x)] = match particle.kind {
            ParticleKind::Dust => '.',
            ParticleKind::Splash => '~',
        };
    }
    cells[cell_of(car_distance)] = '>';
    cells.into_iter().collect()
}

pub fn draw_ui(frame: &mut Frame, ui: &UiState, model: &ViewModel) {
    let lanes = model
        .state
        .round
        .as_ref()
        .map_or(1, |round| round.lanes.len().max(1)) as u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(lanes + 2),
            Constraint::Length(7),
            Constraint::Length(3),
            Constraint::Min(5),
        ])
        .split(frame.size());

    draw_header(frame, chunks[0], model.state);
    draw_track(frame, chunks[1], model);
    draw_details(frame, chunks[2], model);
    draw_commands(frame, chunks[3]);
    draw_logs(frame, chunks[4], ui);
}

fn inner(area: Rect) -> Rect {
    area.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    })
}

fn phase_line(state: &RoundState) -> Line<'static> {
    let round = state
        .round
        .as_ref()
        .map(|round| format!("round {} | ", round.number))
        .unwrap_or_default();
    let (text, color) = match state.phase {
        Phase::Waiting => ("waiting for the next round".to_string(), Color::DarkGray),
        Phase::Predictions if state.countdown_secs > 0 => (
            format!("predictions close in {}s", state.countdown_secs),
            Color::Green,
        ),
        Phase::Predictions => ("predictions closing...".to_string(), Color::Yellow),
        Phase::Locked => (
            format!("locked | race starts in {}s", state.locked_countdown_secs),
            Color::Yellow,
        ),
        Phase::Racing => ("racing".to_string(), Color::Magenta),
        Phase::Reveal0 => ("results: your wagers".to_string(), Color::Cyan),
        Phase::Reveal1 => ("results: winner".to_string(), Color::Cyan),
    };
    Line::from(vec![
        Span::raw(round),
        Span::styled(text, Style::default().fg(color).add_modifier(Modifier::BOLD)),
    ])
}

fn draw_header(frame: &mut Frame, area: Rect, state: &RoundState) {
    let block = Block::default().borders(Borders::ALL).title("Lane Race");
    let mut lines = vec![phase_line(state)];
    if let Some(banner) = &state.banner {
        lines.push(Line::from(Span::styled(
            banner.clone(),
            Style::default().fg(Color::Red),
        )));
    } else if let Some(notice) = &state.notice {
        lines.push(Line::from(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Yellow),
        )));
    }
    let text = Paragraph::new(lines).wrap(Wrap { trim: true });
    frame.render_widget(block, area);
    frame.render_widget(text, inner(area));
}

fn draw_track(frame: &mut Frame, area: Rect, model: &ViewModel) {
    let block = Block::default().borders(Borders::ALL).title("Track");
    let mut lines: Vec<Line> = Vec::new();
    if let Some(round) = &model.state.round {
        let order = cars_by_lane(round);
        let backed = model.state.wagers.backed_car();
        let winner = model.state.winner().filter(|_| model.state.phase == Phase::Reveal1);
        for view in model.views {
            let Some(lane) = round.lanes.get(view.row) else {
                continue;
            };
            let strip = model.mapper.lane_strip(lane, model.state.phase);
            let track = track_line(
                &strip,
                TRACK_WIDTH,
                model.mapper.geometry().track_length,
                view.distance,
                model
                    .particles
                    .particles()
                    .iter()
                    .filter(|particle| particle.lane == view.row),
            );
            let key = order
                .iter()
                .position(|car| *car == view.car_id)
                .map_or_else(|| " ".to_string(), |index| (index + 1).to_string());
            let name_style = if winner == Some(view.car_id) {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else if backed == Some(view.car_id) {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            let speed = view
                .speed
                .map_or_else(|| "spd ?".to_string(), |speed| format!("spd {speed}"));
            lines.push(Line::from(vec![
                Span::styled(format!("[{key}] "), Style::default().fg(Color::Yellow)),
                Span::styled(format!("{:<12.12}", view.name), name_style),
                Span::raw(format!(" {} ", render_strip(&strip))),
                Span::styled(track, Style::default().fg(Color::Gray)),
                Span::raw(format!(" {:>5.1}% ", view.progress)),
                Span::styled(speed, Style::default().fg(Color::Cyan)),
            ]));
        }
    } else {
        lines.push(Line::from(Span::styled(
            "no live round",
            Style::default().fg(Color::DarkGray),
        )));
    }
    let paragraph = Paragraph::new(lines);
    frame.render_widget(block, area);
    frame.render_widget(paragraph, inner(area));
}

fn draw_details(frame: &mut Frame, area: Rect, model: &ViewModel) {
    let state = model.state;
    let block = Block::default().borders(Borders::ALL).title("Pool & Wagers");
    let mut lines = Vec::new();
    match state.phase {
        Phase::Reveal0 | Phase::Reveal1 => {
            let settlement = state.settlement().unwrap_or_default();
            let count = state
                .results
                .as_ref()
                .map_or(0, |results| results.settled.len());
            lines.push(Line::from(format!(
                "your wagers: {count} | staked {}",
                settlement.staked
            )));
            if state.phase == Phase::Reveal1 {
                let winner = state
                    .winner()
                    .map(|id| {
                        state
                            .round
                            .as_ref()
                            .and_then(|round| round.car(id))
                            .map_or_else(|| format!("car {id}"), |car| car.name.clone())
                    })
                    .unwrap_or_else(|| "unknown".to_string());
                let net = settlement.net();
                let color = if net >= 0 { Color::Green } else { Color::Red };
                lines.push(Line::from(vec![
                    Span::raw(format!("winner: {winner} | paid {} | net ", settlement.paid)),
                    Span::styled(format!("{net:+}"), Style::default().fg(color)),
                ]));
            }
        }
        Phase::Waiting => lines.push(Line::from("waiting for the server")),
        _ => {
            let pool = state.pool(model.config);
            lines.push(Line::from(format!(
                "wagers {} | pot {} | fee {} | pool {}",
                pool.total_wagers, pool.total_pot, pool.platform_fee, pool.distributable_pool
            )));
            let mine = &state.wagers;
            let backing = mine
                .backed_car()
                .map_or_else(|| "none".to_string(), |car| car.to_string());
            lines.push(Line::from(format!(
                "your wagers: {} on car {backing} | staked {}",
                mine.count(),
                mine.total_staked()
            )));
            if let Some(estimate) = state.estimate(model.config) {
                lines.push(Line::from(Span::styled(
                    format!("{} payout: {}", PayoutEstimate::LABEL, estimate.amount),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            if mine.in_flight().is_some() {
                lines.push(Line::from(Span::styled(
                    "wager request pending...",
                    Style::default().fg(Color::Yellow),
                )));
            }
        }
    }
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(paragraph, inner(area));
}

fn draw_commands(frame: &mut Frame, area: Rect) {
    let key = Style::default().fg(Color::Yellow);
    let line = Line::from(vec![
        Span::styled("1-9", key),
        Span::raw(" add wager  "),
        Span::styled("-", key),
        Span::raw(" remove wager  "),
        Span::styled("r", key),
        Span::raw(" resync  "),
        Span::styled("q", key),
        Span::raw(" quit"),
    ]);
    let block = Block::default().borders(Borders::ALL).title("Commands");
    frame.render_widget(block, area);
    frame.render_widget(Paragraph::new(line), inner(area));
}

fn draw_logs(frame: &mut Frame, area: Rect, ui: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Logs");
    let lines: Vec<Line> = ui
        .logs
        .iter()
        .map(|entry| Line::from(Span::raw(entry)))
        .collect();
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(paragraph, inner(area));
}
