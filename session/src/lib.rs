#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Session composition root that owns one match.
//!
//! The session constructs the event bus, the round systems and the boxed
//! external collaborators, and is the only place that holds all of them at
//! once. Adapters drive it exclusively through [`apply`] and read it through
//! [`query`]. Commands emitted by systems while a command is applied are
//! queued and applied in order before [`apply`] returns.

mod config;

use std::{collections::VecDeque, fmt, time::Duration};

use rampart_bus::EventBus;
use rampart_core::{
    Command, Economy, EnemyDied, EnemyFactory, EventSource, GamePhase, PhasePresenter,
    StructureHealth,
};
use rampart_system_game_state::GameStateManager;
use rampart_system_rounds::{self as rounds, RoundContext, RoundManager};
use rampart_system_spawning::{self as spawning, EnemySpawner};
use rampart_system_victory::VictoryConditionChecker;
use tracing::{debug, info, warn};

pub use config::{load_match_config, ConfigError, MatchConfig, SpawnerSettings};

/// External systems the round core calls into.
///
/// Every collaborator is optional; operations that need a missing one log an
/// error and skip the dependent step.
#[derive(Default)]
pub struct Collaborators {
    /// Creates and removes enemies.
    pub factory: Option<Box<dyn EnemyFactory>>,
    /// Defended structure.
    pub structure: Option<Box<dyn StructureHealth>>,
    /// Player wallet.
    pub economy: Option<Box<dyn Economy>>,
    /// Presentation layer.
    pub presenter: Option<Box<dyn PhasePresenter>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("factory", &self.factory.is_some())
            .field("structure", &self.structure.is_some())
            .field("economy", &self.economy.is_some())
            .field("presenter", &self.presenter.is_some())
            .finish()
    }
}

/// One match: the bus, every round system and the collaborators.
#[derive(Debug)]
pub struct Session {
    bus: EventBus,
    clock: Duration,
    paused: bool,
    game_state: GameStateManager,
    rounds: RoundManager,
    spawner: EnemySpawner,
    victory: VictoryConditionChecker,
    collaborators: Collaborators,
    pending: VecDeque<Command>,
}

impl Session {
    /// Builds a session for `config` wired to `collaborators`.
    #[must_use]
    pub fn new(config: MatchConfig, collaborators: Collaborators) -> Self {
        let bus = EventBus::new();
        let settings = config.spawner;
        let spawner = EnemySpawner::new(
            &bus,
            spawning::Config::new(settings.inter_spawn_delay, settings.seed, settings.regions),
        );
        let victory = VictoryConditionChecker::new(&bus, config.victory);
        let rounds = RoundManager::new(
            &bus,
            rounds::Config::new(settings.settle_delay),
            config.rounds,
        );
        let game_state = GameStateManager::new(&bus);

        info!(
            rounds = rounds.total_rounds(),
            seed = settings.seed,
            "session created"
        );

        Self {
            bus,
            clock: Duration::ZERO,
            paused: false,
            game_state,
            rounds,
            spawner,
            victory,
            collaborators,
            pending: VecDeque::new(),
        }
    }

    /// Event bus shared by every system of the session.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Collaborators wired into the session.
    pub fn collaborators_mut(&mut self) -> &mut Collaborators {
        &mut self.collaborators
    }

    fn dispatch(&mut self, command: Command) {
        let mut emitted = Vec::new();

        match command {
            Command::Tick { dt } => self.tick(dt, &mut emitted),
            Command::StartCombat => {
                let presenter = presenter(&mut self.collaborators.presenter);
                let _ = self.game_state.start_combat(presenter, &mut emitted);
            }
            Command::Continue => {
                let presenter = presenter(&mut self.collaborators.presenter);
                let _ = self.game_state.continue_to_building(presenter);
            }
            Command::ReportEnemyDeath { enemy } => {
                self.bus.publish(EventSource::Combat, &EnemyDied { enemy });
            }
            Command::Pause => {
                if self.paused {
                    debug!("session already paused");
                } else {
                    self.paused = true;
                    self.spawner.pause();
                    info!(clock_secs = self.clock.as_secs_f32(), "session paused");
                }
            }
            Command::Resume => {
                if self.paused {
                    self.paused = false;
                    self.spawner.resume_waves();
                    info!(clock_secs = self.clock.as_secs_f32(), "session resumed");
                } else {
                    debug!("session is not paused");
                }
            }
            Command::Restart => {
                info!("restarting match");
                self.paused = false;
                self.pending.clear();
                self.reset_match();
                self.game_state.discard_pending();
                let presenter = presenter(&mut self.collaborators.presenter);
                self.game_state.force_phase(GamePhase::Building, presenter);
            }
            Command::StartNextRound if self.game_state.phase() != GamePhase::Combat => {
                warn!(
                    phase = ?self.game_state.phase(),
                    "round start ignored outside combat"
                );
            }
            Command::StartNextRound => {
                let mut ctx = round_context(
                    &mut self.spawner,
                    &mut self.victory,
                    &mut self.collaborators,
                    self.clock,
                );
                if !self.rounds.start_next_round(&mut ctx) {
                    warn!(phase = ?self.game_state.phase(), "combat entered without a round");
                }
            }
            Command::ResetMatch => self.reset_match(),
            Command::ForcePhase { phase } => {
                let presenter = presenter(&mut self.collaborators.presenter);
                self.game_state.force_phase(phase, presenter);
            }
        }

        self.pending.extend(emitted);
    }

    fn tick(&mut self, dt: Duration, emitted: &mut Vec<Command>) {
        if self.paused {
            self.spawner.process_events();
            return;
        }

        self.clock += dt;
        self.spawner
            .tick(dt, factory(&mut self.collaborators.factory));

        let mut ctx = round_context(
            &mut self.spawner,
            &mut self.victory,
            &mut self.collaborators,
            self.clock,
        );
        self.rounds.tick(&mut ctx, dt);

        let presenter = presenter(&mut self.collaborators.presenter);
        self.game_state.handle_events(presenter, emitted);
    }

    fn reset_match(&mut self) {
        let mut ctx = round_context(
            &mut self.spawner,
            &mut self.victory,
            &mut self.collaborators,
            self.clock,
        );
        self.rounds.reset(&mut ctx);
        self.victory.reset();
    }
}

/// Applies `command` and every command it causes, in order.
pub fn apply(session: &mut Session, command: Command) {
    session.pending.push_back(command);
    while let Some(command) = session.pending.pop_front() {
        debug!(?command, "applying command");
        session.dispatch(command);
    }
}

fn round_context<'a>(
    spawner: &'a mut EnemySpawner,
    victory: &'a mut VictoryConditionChecker,
    collaborators: &'a mut Collaborators,
    now: Duration,
) -> RoundContext<'a> {
    let Collaborators {
        factory: factory_slot,
        structure,
        economy,
        ..
    } = collaborators;

    RoundContext {
        spawner,
        victory,
        factory: factory(factory_slot),
        structure: structure.as_deref(),
        economy: match economy {
            Some(economy) => Some(&mut **economy),
            None => None,
        },
        now,
    }
}

fn factory(slot: &mut Option<Box<dyn EnemyFactory>>) -> Option<&mut dyn EnemyFactory> {
    match slot {
        Some(factory) => Some(&mut **factory),
        None => None,
    }
}

fn presenter(slot: &mut Option<Box<dyn PhasePresenter>>) -> Option<&mut dyn PhasePresenter> {
    match slot {
        Some(presenter) => Some(&mut **presenter),
        None => None,
    }
}

/// Query functions that provide read-only access to the session state.
pub mod query {
    use std::time::Duration;

    use rampart_core::{EnemyId, GamePhase, RoundConfig, RoundProgress, SpawnerStatus};

    use super::Session;

    /// Active phase.
    #[must_use]
    pub fn phase(session: &Session) -> GamePhase {
        session.game_state.phase()
    }

    /// Simulated time elapsed since the session was created, excluding pauses.
    #[must_use]
    pub fn clock(session: &Session) -> Duration {
        session.clock
    }

    /// Reports whether the session is paused.
    #[must_use]
    pub fn is_paused(session: &Session) -> bool {
        session.paused
    }

    /// Progress through the configured rounds.
    #[must_use]
    pub fn round_progress(session: &Session) -> RoundProgress {
        session.rounds.progress()
    }

    /// Configured rounds in order.
    #[must_use]
    pub fn rounds(session: &Session) -> &[RoundConfig] {
        session.rounds.rounds()
    }

    /// Reports whether the current round was completed.
    #[must_use]
    pub fn is_current_round_completed(session: &Session) -> bool {
        session.rounds.is_current_round_completed()
    }

    /// Spawner state.
    #[must_use]
    pub fn spawner_status(session: &Session) -> SpawnerStatus {
        session.spawner.status()
    }

    /// Enemies currently alive, in ascending handle order.
    #[must_use]
    pub fn live_enemies(session: &Session) -> Vec<EnemyId> {
        session.spawner.live_enemies().collect()
    }

    /// Time left before the round in progress is decided by its time limit.
    ///
    /// `None` without a time limit or without a round in progress.
    #[must_use]
    pub fn round_time_remaining(session: &Session) -> Option<Duration> {
        let config = session.victory.config();
        if !config.has_time_limit() || !session.rounds.is_round_in_progress() {
            return None;
        }
        let elapsed = session.victory.elapsed(session.clock);
        Some(config.round_time_limit().saturating_sub(elapsed))
    }

    /// Reports whether an outcome was already published for the current round.
    #[must_use]
    pub fn has_checked_victory(session: &Session) -> bool {
        session.victory.has_checked_victory()
    }
}
