//! The per-frame control loop that picks the active State.
//!
//! Once per frame [`Sequencer::tick`]:
//!
//! 1. loads persisted fx levels the first time a preferences directory is
//!    known,
//! 2. applies queued [`Command`]s,
//! 3. advances the clocks by the frame delta scaled by the updated speed,
//! 4. unless a command already picked a State this frame, asks the active
//!    policy: forced selection (once), then the timeline, then the
//!    randomizer,
//! 5. evaluates the active State's graph.
//!
//! A State whose graph fails to build never becomes active; the sequencer
//! stays where it was and keeps the error as [`Sequencer::system_message`].

mod command;

pub use command::{Command, PlaybackMode};

use std::{
    collections::{BTreeMap, VecDeque},
    path::{Path, PathBuf},
    sync::Arc,
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    config::SequencerConfig,
    fx::{fx_load, fx_save, FX_LEVELS_FILE},
    graph::Graph,
    module::FrameContext,
    record::{CaptureRequest, Recorder},
    registry::ModuleRegistry,
    render::RenderFrame,
    sound::AudioFrame,
    state::StateCollection,
    timeline::{PlaybackClock, Timeline, TimelineCue},
    EngineError, Result,
};

/// Host-supplied input for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    /// Wall-clock seconds since the previous frame.
    pub delta_seconds: f64,
    pub audio: AudioFrame,
}

impl FrameInput {
    pub fn new(delta_seconds: f64) -> Self {
        Self {
            delta_seconds,
            audio: AudioFrame::silent(),
        }
    }
}

/// Outcome of one [`Sequencer::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Global frame number, starting at 1.
    pub frame: u64,
    /// State evaluated this frame, `None` while idle.
    pub state: Option<usize>,
    /// Set when a different State became active this frame.
    pub switched_to: Option<usize>,
    pub capture: Option<CaptureRequest>,
    pub shutdown_requested: bool,
}

#[derive(Debug, Clone, Copy)]
struct ForcedSelection {
    target: usize,
    applied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Index(usize),
    /// Uniform over every State, including the active one.
    Random,
    /// Uniform over every State except the active one.
    Other,
}

struct ActiveState {
    index: usize,
    graph: Graph,
}

pub struct Sequencer {
    registry: Arc<ModuleRegistry>,
    states: StateCollection,
    active: Option<ActiveState>,
    randomizer: bool,
    forced: Option<ForcedSelection>,
    timeline: Timeline,
    config: SequencerConfig,
    speed: f32,
    fx_offset: f32,
    total_clock: PlaybackClock,
    state_clock: PlaybackClock,
    randomizer_clock: PlaybackClock,
    frame_counter: u64,
    state_frame: u64,
    commands: VecDeque<Command>,
    rng: StdRng,
    preferences_dir: Option<PathBuf>,
    fx_levels_loaded: bool,
    recorder: Recorder,
    system_message: Option<String>,
    shutdown_requested: bool,
}

impl Sequencer {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        states: StateCollection,
        config: SequencerConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            registry,
            states,
            active: None,
            randomizer: false,
            forced: None,
            timeline: Timeline::default(),
            config,
            speed: 1.0,
            fx_offset: 0.0,
            total_clock: PlaybackClock::default(),
            state_clock: PlaybackClock::default(),
            randomizer_clock: PlaybackClock::default(),
            frame_counter: 0,
            state_frame: 0,
            commands: VecDeque::new(),
            rng,
            preferences_dir: None,
            fx_levels_loaded: false,
            recorder: Recorder::default(),
            system_message: None,
            shutdown_requested: false,
        }
    }

    pub fn with_timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = timeline;
        self
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Makes the fx-levels location known; levels are loaded on the next tick.
    pub fn set_preferences_dir(&mut self, dir: impl Into<PathBuf>) {
        self.preferences_dir = Some(dir.into());
    }

    /// Activates the first State. Leaves the sequencer idle if there is none
    /// or it fails to build.
    pub fn start(&mut self) -> Result<()> {
        let activated = if self.states.is_empty() {
            tracing::warn!("no states loaded, sequencer stays idle");
            Ok(())
        } else {
            self.activate(0).map(|_| ())
        };

        if self.config.preload_all {
            let failures = self.preload_all();
            if !failures.is_empty() {
                let details: Vec<String> = failures.iter().map(ToString::to_string).collect();
                self.system_message = Some(format!(
                    "{} of {} states failed to load: {}",
                    failures.len(),
                    self.states.len(),
                    details.join("; ")
                ));
            }
        }
        activated
    }

    /// Builds and drops every State's graph, returning the failures.
    pub fn preload_all(&self) -> Vec<EngineError> {
        let failures: Vec<EngineError> = self
            .states
            .iter()
            .filter_map(|state| state.build_graph(&self.registry).err())
            .collect();
        for err in &failures {
            tracing::warn!(%err, "state failed preload");
        }
        tracing::info!(
            states = self.states.len(),
            failed = failures.len(),
            "preloaded states"
        );
        failures
    }

    /// Queues a command for the next tick.
    pub fn push_command(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    pub fn speed_inc(&mut self) {
        self.push_command(Command::SpeedUp);
    }

    pub fn speed_dec(&mut self) {
        self.push_command(Command::SpeedDown);
    }

    pub fn fx_level_inc(&mut self) {
        self.push_command(Command::FxLevelUp);
    }

    pub fn fx_level_dec(&mut self) {
        self.push_command(Command::FxLevelDown);
    }

    pub fn select_next_state(&mut self) {
        self.push_command(Command::NextState);
    }

    pub fn select_prev_state(&mut self) {
        self.push_command(Command::PrevState);
    }

    pub fn select_random_state(&mut self) {
        self.push_command(Command::RandomState);
    }

    pub fn select_state(&mut self, index: usize) {
        self.push_command(Command::SelectState(index));
    }

    pub fn toggle_randomizer(&mut self) {
        self.push_command(Command::ToggleRandomizer);
    }

    pub fn force_state(&mut self, index: usize) {
        self.push_command(Command::ForceState(index));
    }

    pub fn clear_forced(&mut self) {
        self.push_command(Command::ClearForced);
    }

    pub fn request_shutdown(&mut self) {
        self.push_command(Command::Shutdown);
    }

    /// Advances and evaluates one frame.
    pub fn tick(&mut self, input: &FrameInput) -> FrameReport {
        self.load_fx_levels_if_ready();

        let mut switched_to = None;
        let manual = self.apply_commands(&mut switched_to);

        let delta = input.delta_seconds.max(0.0) * f64::from(self.speed);
        self.total_clock.advance(delta);
        // A State activated by a command starts this frame at zero.
        if switched_to.is_none() {
            self.state_clock.advance(delta);
            self.randomizer_clock.advance(delta);
        }

        if !manual {
            if let Some(target) = self.scheduled_target() {
                self.switch(target, &mut switched_to);
            }
        }

        let state = self.evaluate_active(delta, &input.audio);
        self.frame_counter += 1;
        let frame = self.frame_counter;

        FrameReport {
            frame,
            state,
            switched_to,
            capture: state.and_then(|index| self.recorder.request(index, frame)),
            shutdown_requested: self.shutdown_requested,
        }
    }

    /// Tears down the active graph and saves fx levels.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(active) = self.active.take() {
            tracing::info!(state = active.index, "tearing down active state");
        }
        match &self.preferences_dir {
            Some(dir) if self.fx_levels_loaded => {
                fx_save(&self.states, dir.join(FX_LEVELS_FILE))
            }
            _ => Ok(()),
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        if self.forced.is_some() {
            PlaybackMode::Forced
        } else if self.randomizer {
            PlaybackMode::Randomized
        } else {
            PlaybackMode::Sequential
        }
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active.as_ref().map(|active| active.index)
    }

    pub fn active_graph(&self) -> Option<&Graph> {
        self.active.as_ref().map(|active| &active.graph)
    }

    /// Render snapshot of the last evaluated frame.
    pub fn render_frame(&self) -> RenderFrame {
        match &self.active {
            Some(active) => {
                RenderFrame::from_graph(&active.graph, active.index, self.frame_counter)
            }
            None => RenderFrame::blank(self.frame_counter),
        }
    }

    /// Effective fx levels of the active State, offset applied.
    pub fn fx_levels(&self) -> BTreeMap<String, f32> {
        self.active
            .as_ref()
            .and_then(|active| self.states.get(active.index))
            .map(|state| state.effective_fx_levels(self.fx_offset))
            .unwrap_or_default()
    }

    pub fn fx_offset(&self) -> f32 {
        self.fx_offset
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Scaled seconds since the active State was activated.
    pub fn elapsed(&self) -> f64 {
        self.state_clock.time_seconds
    }

    /// Scaled seconds since start; timeline boundaries are measured on this.
    pub fn total_time(&self) -> f64 {
        self.total_clock.time_seconds
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn state_frame(&self) -> u64 {
        self.state_frame
    }

    pub fn system_message(&self) -> Option<&str> {
        self.system_message.as_deref()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn states(&self) -> &StateCollection {
        &self.states
    }

    pub fn states_mut(&mut self) -> &mut StateCollection {
        &mut self.states
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn preferences_dir(&self) -> Option<&Path> {
        self.preferences_dir.as_deref()
    }

    fn load_fx_levels_if_ready(&mut self) {
        if self.fx_levels_loaded {
            return;
        }
        let Some(dir) = &self.preferences_dir else {
            return;
        };
        let path = dir.join(FX_LEVELS_FILE);
        if let Err(err) = fx_load(&mut self.states, &path) {
            tracing::warn!(?path, %err, "ignoring unreadable fx levels");
        }
        self.fx_levels_loaded = true;
    }

    /// Drains the queue. Returns true if a command picked a State.
    fn apply_commands(&mut self, switched_to: &mut Option<usize>) -> bool {
        let mut manual = false;
        while let Some(command) = self.commands.pop_front() {
            manual |= command.selects_state();
            match command {
                Command::SpeedUp => {
                    self.speed = (self.speed + self.config.speed_step).min(self.config.max_speed);
                }
                Command::SpeedDown => {
                    self.speed = (self.speed - self.config.speed_step).max(self.config.min_speed);
                }
                Command::FxLevelUp => {
                    self.fx_offset =
                        (self.fx_offset + self.config.fx_step).min(self.config.fx_offset_bound);
                }
                Command::FxLevelDown => {
                    self.fx_offset =
                        (self.fx_offset - self.config.fx_step).max(-self.config.fx_offset_bound);
                }
                Command::NextState => {
                    if let Some(index) = self.neighbour(1) {
                        self.switch(Target::Index(index), switched_to);
                    }
                }
                Command::PrevState => {
                    if let Some(index) = self.neighbour(-1) {
                        self.switch(Target::Index(index), switched_to);
                    }
                }
                Command::RandomState => self.switch(Target::Other, switched_to),
                Command::SelectState(index) => self.switch(Target::Index(index), switched_to),
                Command::ToggleRandomizer => {
                    self.randomizer = !self.randomizer;
                    self.randomizer_clock.reset();
                    tracing::info!(enabled = self.randomizer, "randomizer toggled");
                }
                Command::ForceState(index) => self.enter_forced(index),
                Command::ClearForced => {
                    if self.forced.take().is_some() {
                        tracing::info!("left forced mode");
                    }
                }
                Command::Shutdown => {
                    tracing::info!("shutdown requested");
                    self.shutdown_requested = true;
                }
            }
        }
        manual
    }

    fn enter_forced(&mut self, index: usize) {
        if let Some(forced) = self.forced {
            tracing::debug!(
                current = forced.target,
                requested = index,
                "already forced, ignoring"
            );
            return;
        }
        if index >= self.states.len() {
            tracing::warn!(index, states = self.states.len(), "cannot force missing state");
            return;
        }
        tracing::info!(index, "entering forced mode");
        self.forced = Some(ForcedSelection {
            target: index,
            applied: false,
        });
    }

    fn scheduled_target(&mut self) -> Option<Target> {
        if let Some(forced) = self.forced.as_mut() {
            if forced.applied {
                return None;
            }
            forced.applied = true;
            return Some(Target::Index(forced.target));
        }

        if !self.timeline.is_empty() {
            return match self.timeline.poll(self.total_clock.time_seconds)? {
                TimelineCue::Preset(index) if index < self.states.len() => {
                    tracing::info!(index, "timeline boundary");
                    Some(Target::Index(index))
                }
                TimelineCue::Preset(index) => {
                    tracing::warn!(
                        index,
                        states = self.states.len(),
                        "timeline preset out of range, randomizing"
                    );
                    Some(Target::Random)
                }
                TimelineCue::Random => {
                    tracing::info!("timeline boundary, randomizing");
                    Some(Target::Random)
                }
            };
        }

        if self.randomizer
            && self.randomizer_clock.time_seconds >= self.config.randomizer_interval_seconds
        {
            self.randomizer_clock.reset();
            return Some(Target::Other);
        }
        None
    }

    fn neighbour(&self, step: isize) -> Option<usize> {
        let len = self.states.len() as isize;
        if len == 0 {
            return None;
        }
        let index = match self.active_index() {
            Some(current) => (current as isize + step).rem_euclid(len),
            None if step > 0 => 0,
            None => len - 1,
        };
        Some(index as usize)
    }

    fn resolve(&mut self, target: Target) -> Option<usize> {
        let len = self.states.len();
        if len == 0 {
            return None;
        }
        match target {
            Target::Index(index) => Some(index),
            Target::Random => Some(self.rng.random_range(0..len)),
            Target::Other => match self.active_index() {
                Some(current) if len > 1 => {
                    let pick = self.rng.random_range(0..len - 1);
                    Some(if pick >= current { pick + 1 } else { pick })
                }
                _ => Some(self.rng.random_range(0..len)),
            },
        }
    }

    fn switch(&mut self, target: Target, switched_to: &mut Option<usize>) {
        let Some(index) = self.resolve(target) else {
            return;
        };
        match self.activate(index) {
            Ok(true) => *switched_to = Some(index),
            Ok(false) => {}
            Err(err) => tracing::debug!(%err, "state switch rejected"),
        }
    }

    /// Makes `index` the active State. Selecting the already active State is
    /// a no-op and returns `Ok(false)`.
    fn activate(&mut self, index: usize) -> Result<bool> {
        let len = self.states.len();
        let state = self
            .states
            .get(index)
            .ok_or(EngineError::OutOfRange { index, len })?;
        if self.active_index() == Some(index) {
            tracing::debug!(index, "state already active");
            return Ok(false);
        }

        match state.build_graph(&self.registry) {
            Ok(graph) => {
                tracing::info!(index, state = %state.name(), "activating state");
                // The previous graph drops here, destroying its modules.
                self.active = Some(ActiveState { index, graph });
                self.state_clock.reset();
                self.randomizer_clock.reset();
                self.state_frame = 0;
                self.system_message = None;
                Ok(true)
            }
            Err(err) => {
                tracing::error!(index, %err, "state failed to activate");
                self.system_message = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn evaluate_active(&mut self, delta: f64, audio: &AudioFrame) -> Option<usize> {
        let active = self.active.as_mut()?;
        let fx_levels = self
            .states
            .get(active.index)
            .map(|state| state.effective_fx_levels(self.fx_offset))
            .unwrap_or_default();
        let ctx = FrameContext {
            time: self.state_clock.time_seconds as f32,
            delta: delta as f32,
            frame: self.state_frame,
            fx_levels,
            audio: audio.clone(),
        };
        active.graph.evaluate(&ctx);
        self.state_frame += 1;
        Some(active.index)
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("active", &self.active_index())
            .field("mode", &self.mode())
            .field("states", &self.states.len())
            .field("speed", &self.speed)
            .field("fx_offset", &self.fx_offset)
            .field("frame_counter", &self.frame_counter)
            .finish()
    }
}
