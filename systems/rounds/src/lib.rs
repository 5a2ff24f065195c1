#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Round orchestration system that drives one round at a time.
//!
//! The round manager owns the ordered round list. Starting a round hands its
//! waves to the spawner; completion is detected from enemy deaths and the end
//! of the spawn schedule, observed through the event bus and confirmed after a
//! short settle delay. The victory checker always adjudicates before a round
//! is completed so that no reward is paid for a lost round.

mod defaults;

use std::time::Duration;

use rampart_bus::{EventBus, Inbox};
use rampart_core::{
    Economy, EnemyDied, EnemyFactory, EventSource, RoundCompleted, RoundConfig, RoundProgress,
    RoundStarted, StructureHealth, StructureStatus, WavesExhausted,
};
use rampart_system_spawning::EnemySpawner;
use rampart_system_victory::{Outcome, VictoryConditionChecker, VictoryInputs};
use tracing::{debug, error, info, warn};

pub use defaults::{default_rounds, validate_rounds, RoundConfigError, DEFAULT_ROUND_COUNT};

/// Configuration parameters required to construct the round manager.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    settle_delay: Duration,
}

impl Config {
    /// Creates a configuration using the provided settle delay.
    #[must_use]
    pub const fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    /// Wait between a death (or the end of the spawn schedule) and the
    /// round-completion check.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        self.settle_delay
    }
}

/// Components and collaborators the round manager works with during a call.
pub struct RoundContext<'a> {
    /// Spawner receiving the round's waves.
    pub spawner: &'a mut EnemySpawner,
    /// Checker adjudicating the round.
    pub victory: &'a mut VictoryConditionChecker,
    /// Factory used to despawn enemies when a round is cut short.
    pub factory: Option<&'a mut dyn EnemyFactory>,
    /// Defended structure.
    pub structure: Option<&'a dyn StructureHealth>,
    /// Wallet credited with round rewards.
    pub economy: Option<&'a mut dyn Economy>,
    /// Session clock.
    pub now: Duration,
}

impl RoundContext<'_> {
    /// Reborrows the enemy factory, if one is attached.
    pub fn factory(&mut self) -> Option<&mut dyn EnemyFactory> {
        reborrow_factory(&mut self.factory)
    }

    /// Reborrows the economy, if one is attached.
    pub fn economy(&mut self) -> Option<&mut dyn Economy> {
        match &mut self.economy {
            Some(economy) => Some(&mut **economy),
            None => None,
        }
    }

    /// Samples the defended structure, treating a missing one as standing.
    #[must_use]
    pub fn structure_status(&self) -> StructureStatus {
        self.structure
            .map_or_else(StructureStatus::unobserved, StructureStatus::observe)
    }

    fn clear_enemies(&mut self) {
        self.spawner
            .clear_all_enemies(reborrow_factory(&mut self.factory));
    }
}

fn reborrow_factory<'s>(
    factory: &'s mut Option<&mut dyn EnemyFactory>,
) -> Option<&'s mut dyn EnemyFactory> {
    match factory {
        Some(factory) => Some(&mut **factory),
        None => None,
    }
}

#[derive(Clone, Copy, Debug)]
enum Signal {
    EnemyDied,
    WavesExhausted,
}

/// Drives the configured rounds one at a time.
#[derive(Debug)]
pub struct RoundManager {
    bus: EventBus,
    config: Config,
    rounds: Vec<RoundConfig>,
    current_round_number: u32,
    current_round_completed: bool,
    round_in_progress: bool,
    round_started_at: Option<Duration>,
    settle: Option<Duration>,
    signals: Inbox<Signal>,
}

impl RoundManager {
    /// Creates a round manager for `rounds`.
    ///
    /// A missing or invalid round list is replaced by the default
    /// ascending-difficulty sequence.
    #[must_use]
    pub fn new(bus: &EventBus, config: Config, rounds: Option<Vec<RoundConfig>>) -> Self {
        let rounds = match rounds {
            Some(rounds) => match validate_rounds(&rounds) {
                Ok(()) => rounds,
                Err(error) => {
                    error!(%error, "invalid round configuration");
                    warn!(
                        rounds = DEFAULT_ROUND_COUNT,
                        "substituting the default round sequence"
                    );
                    default_rounds(DEFAULT_ROUND_COUNT)
                }
            },
            None => {
                info!(
                    rounds = DEFAULT_ROUND_COUNT,
                    "no round configuration supplied; using the default sequence"
                );
                default_rounds(DEFAULT_ROUND_COUNT)
            }
        };

        let mut signals = Inbox::new();
        signals.listen::<EnemyDied, _>(bus, |_, _| Some(Signal::EnemyDied));
        signals.listen::<WavesExhausted, _>(bus, |_, _| Some(Signal::WavesExhausted));

        Self {
            bus: bus.clone(),
            config,
            rounds,
            current_round_number: 1,
            current_round_completed: false,
            round_in_progress: false,
            round_started_at: None,
            settle: None,
            signals,
        }
    }

    /// Starts the round numbered `current_round_number`.
    ///
    /// Returns whether the round was started.
    pub fn start_current_round(&mut self, ctx: &mut RoundContext<'_>) -> bool {
        if self.round_in_progress {
            warn!(
                round = self.current_round_number,
                "round start requested while a round is in progress"
            );
            return false;
        }
        self.begin_round(self.current_round_number, ctx)
    }

    /// Starts the next round to fight: the current one if it has not been
    /// completed yet, otherwise the one after it.
    ///
    /// Returns whether the round was started.
    pub fn start_next_round(&mut self, ctx: &mut RoundContext<'_>) -> bool {
        if self.round_in_progress {
            warn!(
                round = self.current_round_number,
                "round start requested while a round is in progress"
            );
            return false;
        }
        let round_number = if self.current_round_completed {
            self.current_round_number.saturating_add(1)
        } else {
            self.current_round_number
        };
        self.begin_round(round_number, ctx)
    }

    /// Ends the round in progress and pays its reward.
    ///
    /// Returns whether a round was completed.
    pub fn complete_current_round(&mut self, economy: Option<&mut dyn Economy>) -> bool {
        if !self.round_in_progress {
            warn!(
                round = self.current_round_number,
                "round completion requested while no round is in progress"
            );
            return false;
        }

        self.round_in_progress = false;
        self.current_round_completed = true;
        self.settle = None;

        let round_number = self.current_round_number;
        let reward_money = self
            .round_config(round_number)
            .map_or(0, RoundConfig::reward_money);
        match economy {
            Some(economy) => economy.add_money(reward_money),
            None => error!(
                round = round_number,
                reward = reward_money,
                "no economy attached; round reward not paid"
            ),
        }

        info!(round = round_number, reward = reward_money, "round completed");
        self.bus.publish(
            EventSource::Rounds,
            &RoundCompleted {
                round_number,
                reward_money,
            },
        );
        true
    }

    /// Consumes bus traffic and checks whether the round in progress has been
    /// decided.
    ///
    /// Attrition is confirmed once the settle delay after the latest death or
    /// the end of the spawn schedule has elapsed; every new signal restarts
    /// the delay. Defeat and the round time limit are checked on every tick.
    pub fn tick(&mut self, ctx: &mut RoundContext<'_>, dt: Duration) {
        let signals = self.signals.drain();
        if !self.round_in_progress {
            self.settle = None;
            return;
        }

        let settled = if signals.is_empty() {
            match self.settle.take() {
                Some(remaining) if remaining > dt => {
                    self.settle = Some(remaining - dt);
                    false
                }
                Some(_) => true,
                None => false,
            }
        } else {
            debug!(
                round = self.current_round_number,
                signals = signals.len(),
                "round completion check scheduled"
            );
            self.settle = Some(self.config.settle_delay);
            false
        };

        if settled
            && ctx.spawner.are_all_enemies_defeated()
            && !ctx.spawner.is_spawning()
        {
            self.adjudicate(ctx);
            return;
        }

        if ctx.victory.has_checked_victory() {
            return;
        }
        if !ctx.structure_status().alive || ctx.victory.time_limit_reached(ctx.now) {
            self.adjudicate(ctx);
        }
    }

    /// Returns to round one and clears every live enemy.
    pub fn reset(&mut self, ctx: &mut RoundContext<'_>) {
        self.current_round_number = 1;
        self.current_round_completed = false;
        self.round_in_progress = false;
        self.round_started_at = None;
        self.settle = None;
        self.signals.clear();
        ctx.clear_enemies();
        info!("round state reset");
    }

    /// Number of the round being fought, or of the last round fought.
    #[must_use]
    pub const fn current_round_number(&self) -> u32 {
        self.current_round_number
    }

    /// Reports whether a round is in progress.
    #[must_use]
    pub const fn is_round_in_progress(&self) -> bool {
        self.round_in_progress
    }

    /// Reports whether the current round was completed.
    #[must_use]
    pub const fn is_current_round_completed(&self) -> bool {
        self.current_round_completed
    }

    /// Session time at which the round in progress started.
    #[must_use]
    pub const fn round_started_at(&self) -> Option<Duration> {
        self.round_started_at
    }

    /// Number of configured rounds.
    #[must_use]
    pub fn total_rounds(&self) -> u32 {
        u32::try_from(self.rounds.len()).unwrap_or(u32::MAX)
    }

    /// Configured rounds in order.
    #[must_use]
    pub fn rounds(&self) -> &[RoundConfig] {
        &self.rounds
    }

    /// Configuration of round `round_number`, if it exists.
    #[must_use]
    pub fn round_config(&self, round_number: u32) -> Option<&RoundConfig> {
        let index = usize::try_from(round_number.checked_sub(1)?).ok()?;
        self.rounds.get(index)
    }

    /// Read-only view consumed by other systems.
    #[must_use]
    pub fn progress(&self) -> RoundProgress {
        RoundProgress {
            current_round: self.current_round_number,
            total_rounds: self.total_rounds(),
            round_in_progress: self.round_in_progress,
        }
    }

    fn begin_round(&mut self, round_number: u32, ctx: &mut RoundContext<'_>) -> bool {
        let Some(round) = self.round_config(round_number) else {
            error!(
                round = round_number,
                total = self.total_rounds(),
                "round number out of range; round not started"
            );
            return false;
        };
        let waves = round.waves().to_vec();

        self.current_round_number = round_number;
        self.current_round_completed = false;
        self.round_in_progress = true;
        self.settle = None;
        self.signals.clear();

        ctx.victory.reset_round_victory(ctx.now);
        info!(round = round_number, waves = waves.len(), "round started");
        self.bus.publish(
            EventSource::Rounds,
            &RoundStarted {
                round_number,
                waves: waves.clone(),
            },
        );

        ctx.spawner.set_waves(waves);
        ctx.spawner.start_waves();
        self.round_started_at = Some(ctx.now);
        true
    }

    fn adjudicate(&mut self, ctx: &mut RoundContext<'_>) {
        let structure = if ctx.structure.is_some() {
            ctx.structure_status()
        } else {
            error!("no structure attached; assuming it stands");
            StructureStatus::unobserved()
        };
        let status = ctx.spawner.status();
        let inputs = VictoryInputs {
            now: ctx.now,
            remaining_enemies: status.live_enemies,
            spawns_pending: status.spawning,
            current_round: self.current_round_number,
            total_rounds: self.total_rounds(),
            round_in_progress: self.round_in_progress,
            structure,
        };

        match ctx.victory.check_victory_conditions(&inputs) {
            Some(Outcome::Victory(kind)) => {
                if status.live_enemies > 0 || status.spawning {
                    debug!(
                        ?kind,
                        remaining = status.live_enemies,
                        "clearing enemies left over at round end"
                    );
                    ctx.clear_enemies();
                }
                let _ = self.complete_current_round(ctx.economy());
            }
            Some(Outcome::Defeat) => {
                self.settle = None;
                debug!(
                    round = self.current_round_number,
                    "round lost; awaiting reset"
                );
            }
            None => {}
        }
    }
}
