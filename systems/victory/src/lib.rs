#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Victory condition system that adjudicates the outcome of a round.
//!
//! The checker is handed a snapshot of the round state and decides which of
//! defeat, round victory, time victory or final victory holds. It publishes at
//! most one outcome per round; the guard is cleared when the next round starts
//! or when the match is reset.

use std::time::Duration;

use rampart_bus::EventBus;
use rampart_core::{
    DefeatConditionMet, EventSource, StructureStatus, VictoryConditionMet, VictoryConfig,
    VictoryKind, VictoryStats,
};
use tracing::{debug, info, warn};

/// Round state sampled by the caller when an evaluation is requested.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VictoryInputs {
    /// Session clock at the time of evaluation.
    pub now: Duration,
    /// Spawned enemies that are still alive.
    pub remaining_enemies: u32,
    /// Whether the spawner still has enemies left to spawn this round.
    pub spawns_pending: bool,
    /// Round being fought.
    pub current_round: u32,
    /// Number of configured rounds.
    pub total_rounds: u32,
    /// Whether a round is in progress.
    pub round_in_progress: bool,
    /// Health of the defended structure.
    pub structure: StructureStatus,
}

/// Result of an evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The defended structure fell.
    Defeat,
    /// The round, or the match, was won.
    Victory(VictoryKind),
}

/// Decides round outcomes and publishes the matching event.
#[derive(Debug)]
pub struct VictoryConditionChecker {
    bus: EventBus,
    config: VictoryConfig,
    has_checked_victory: bool,
    round_start: Duration,
}

impl VictoryConditionChecker {
    /// Creates a checker publishing on `bus`.
    #[must_use]
    pub fn new(bus: &EventBus, config: VictoryConfig) -> Self {
        Self {
            bus: bus.clone(),
            config,
            has_checked_victory: false,
            round_start: Duration::ZERO,
        }
    }

    /// Configuration the checker evaluates against.
    #[must_use]
    pub const fn config(&self) -> &VictoryConfig {
        &self.config
    }

    /// Reports whether an outcome was already published for the current round.
    #[must_use]
    pub const fn has_checked_victory(&self) -> bool {
        self.has_checked_victory
    }

    /// Session time at which the current round started.
    #[must_use]
    pub const fn round_start(&self) -> Duration {
        self.round_start
    }

    /// Time spent in the current round at `now`.
    #[must_use]
    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.round_start)
    }

    /// Reports whether the configured round time limit has expired at `now`.
    /// Always `false` without a time limit.
    #[must_use]
    pub fn time_limit_reached(&self, now: Duration) -> bool {
        self.config.has_time_limit() && self.elapsed(now) >= self.config.round_time_limit()
    }

    /// Round number from which a round victory counts as the final victory.
    ///
    /// The configured final round is capped at the number of configured
    /// rounds so that the match can always be won.
    #[must_use]
    pub fn final_round_threshold(&self, total_rounds: u32) -> u32 {
        let configured = self.config.final_victory_round().get();
        if total_rounds == 0 {
            configured
        } else {
            configured.min(total_rounds)
        }
    }

    /// Decides which outcome holds for `inputs` without publishing anything.
    ///
    /// Returns `None` when the round is still undecided.
    #[must_use]
    pub fn evaluate(&self, inputs: &VictoryInputs) -> Option<Outcome> {
        if !inputs.structure.alive {
            return Some(Outcome::Defeat);
        }

        let attrition = inputs.remaining_enemies == 0 && !inputs.spawns_pending;
        let timed_out = self.time_limit_reached(inputs.now);
        if !inputs.round_in_progress || !(attrition || timed_out) {
            return None;
        }

        let survived = !self.config.require_center_tower_alive() || inputs.structure.alive;
        let kind = if inputs.current_round >= self.final_round_threshold(inputs.total_rounds)
            && survived
        {
            VictoryKind::Final
        } else if attrition {
            VictoryKind::Round
        } else {
            VictoryKind::Time
        };
        Some(Outcome::Victory(kind))
    }

    /// Evaluates `inputs` and publishes the outcome, at most once per round.
    ///
    /// Returns the outcome that was published by this call.
    pub fn check_victory_conditions(&mut self, inputs: &VictoryInputs) -> Option<Outcome> {
        if self.has_checked_victory {
            debug!(
                round = inputs.current_round,
                "outcome already published for this round"
            );
            return None;
        }

        let outcome = self.evaluate(inputs)?;
        self.has_checked_victory = true;
        let stats = self.stats(inputs);

        match outcome {
            Outcome::Defeat => {
                warn!(
                    round = inputs.current_round,
                    health = stats.structure.current_health,
                    "defended structure destroyed"
                );
                self.bus
                    .publish(EventSource::Victory, &DefeatConditionMet { stats });
            }
            Outcome::Victory(kind) => {
                info!(
                    round = inputs.current_round,
                    ?kind,
                    elapsed_secs = stats.elapsed.as_secs_f32(),
                    remaining = stats.remaining_enemies,
                    "victory condition met"
                );
                self.bus
                    .publish(EventSource::Victory, &VictoryConditionMet { kind, stats });
            }
        }
        Some(outcome)
    }

    /// Snapshot attached to outcome events.
    #[must_use]
    pub fn stats(&self, inputs: &VictoryInputs) -> VictoryStats {
        VictoryStats {
            elapsed: self.elapsed(inputs.now),
            remaining_enemies: inputs.remaining_enemies,
            current_round: inputs.current_round,
            total_rounds: inputs.total_rounds,
            structure: inputs.structure,
        }
    }

    /// Clears the per-round guard and starts the round clock at `now`.
    pub fn reset_round_victory(&mut self, now: Duration) {
        self.has_checked_victory = false;
        self.round_start = now;
        debug!(start_secs = now.as_secs_f32(), "round victory state reset");
    }

    /// Clears every piece of state for a full restart.
    pub fn reset(&mut self) {
        self.has_checked_victory = false;
        self.round_start = Duration::ZERO;
        debug!("victory checker reset");
    }
}
