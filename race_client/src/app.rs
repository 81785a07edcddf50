use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode};
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use race_core::{EngineConfig, Input, ParticleField, Phase, ProgressMapper, RoundState};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::ui::{car_for_key, draw_ui, UiState, ViewModel};

const FRAME_INTERVAL: Duration = Duration::from_millis(50);

pub struct RaceApp {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    ui_state: UiState,
    state: watch::Receiver<Arc<RoundState>>,
    inputs: UnboundedSender<Input>,
    config: Arc<EngineConfig>,
    mapper: ProgressMapper,
    particles: ParticleField,
    shutdown_sender: Sender<()>,
    log_receiver: Receiver<String>,
}

impl RaceApp {
    pub fn new(
        state: watch::Receiver<Arc<RoundState>>,
        inputs: UnboundedSender<Input>,
        config: Arc<EngineConfig>,
        shutdown_sender: Sender<()>,
        log_receiver: Receiver<String>,
    ) -> Result<Self> {
        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        crossterm::terminal::enable_raw_mode()?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        let mapper = ProgressMapper::from_config(&config);
        Ok(Self {
            terminal,
            ui_state: UiState::default(),
            state,
            inputs,
            config,
            mapper,
            particles: ParticleField::default(),
            shutdown_sender,
            log_receiver,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let mut last_frame = Instant::now();

        loop {
            while let Ok(line) = self.log_receiver.try_recv() {
                self.ui_state.push_log(line);
            }

            if last_frame.elapsed() >= FRAME_INTERVAL {
                let dt = last_frame.elapsed().as_secs_f32();
                last_frame = Instant::now();
                let snapshot = Arc::clone(&self.state.borrow());
                self.render(&snapshot, dt)?;
            }

            if event::poll(Duration::from_millis(20))? {
                if let Event::Key(key) = event::read()? {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Char(c @ '1'..='9') => {
                            let index = c as usize - '0' as usize;
                            self.place_wager(index);
                        }
                        KeyCode::Char('-') | KeyCode::Char('_') => self.remove_wager(),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            self.send(Input::ForceResync);
                            self.ui_state.push_log("Resync requested");
                        }
                        _ => {}
                    }
                }
            }
        }

        self.terminal.show_cursor()?;
        crossterm::terminal::disable_raw_mode()?;
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    fn render(&mut self, state: &RoundState, dt: f32) -> Result<()> {
        let views = state.car_views(&self.mapper);
        if state.phase == Phase::Racing {
            self.mapper
                .emit_particles(&views, state.phase, &mut self.particles);
        } else if state.phase == Phase::Waiting {
            self.particles.clear();
        }
        self.particles.tick(dt);

        let model = ViewModel {
            state,
            config: &self.config,
            mapper: &self.mapper,
            views: &views,
            particles: &self.particles,
        };
        let ui_state = &self.ui_state;
        self.terminal
            .draw(|frame| draw_ui(frame, ui_state, &model))?;
        Ok(())
    }

    fn place_wager(&mut self, key: usize) {
        let state = Arc::clone(&self.state.borrow());
        match state.round.as_ref().and_then(|round| car_for_key(round, key)) {
            Some(car) => {
                debug!(target: "race::wager", %car, key, "ui.place_wager");
                self.send(Input::PlaceWager(car));
            }
            None => self.ui_state.push_log(format!("No car on key {key}")),
        }
    }

    fn remove_wager(&mut self) {
        let backed = self.state.borrow().wagers.backed_car();
        match backed {
            Some(car) => self.send(Input::RemoveWager(car)),
            None => self.ui_state.push_log("No wager to remove"),
        }
    }

    fn send(&self, input: Input) {
        if self.inputs.send(input).is_err() {
            warn!("engine stopped; input dropped");
        }
    }
}
