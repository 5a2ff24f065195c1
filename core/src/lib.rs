#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Rampart round orchestration engine.
//!
//! This crate defines the vocabulary that connects adapters, the session
//! composition root and the round systems. Adapters submit [`Command`] values
//! describing desired transitions, the session routes those commands to the
//! owning system, and systems announce what happened by publishing the event
//! payload types declared here on the event bus. Systems never hold references
//! to one another; cross-system reads go through the status views in this
//! crate and external behaviour goes through the collaborator traits.

use std::{fmt, num::NonZeroU32, time::Duration};

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Canonical banner emitted when the experience boots.
pub const WELCOME_BANNER: &str = "Welcome to Rampart.";

/// Top-level phase of a match. Exactly one phase is active at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    /// Construction interval between rounds where defences are placed.
    Building,
    /// A round is being fought.
    Combat,
    /// The last round was won and the player may continue to building.
    Pass,
    /// The match was won.
    Victory,
    /// The defended structure fell.
    Defeat,
}

/// Identifies the component that published an event on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventSource {
    /// The phase state machine.
    GameState,
    /// The round manager.
    Rounds,
    /// The enemy spawner.
    Spawner,
    /// The victory condition checker.
    Victory,
    /// The external combat layer reporting enemy deaths.
    Combat,
    /// An adapter (UI, CLI, test harness).
    Adapter,
}

/// Commands that express all permissible session transitions.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the session clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// External request to leave the building phase and fight the next round.
    StartCombat,
    /// External request to leave the pass phase and return to building.
    Continue,
    /// Reports that the combat layer killed an enemy.
    ReportEnemyDeath {
        /// Enemy that died.
        enemy: EnemyId,
    },
    /// Suspends the spawn schedule and freezes the session clock.
    Pause,
    /// Resumes a suspended spawn schedule.
    Resume,
    /// Discards all progress and returns to round one in the building phase.
    Restart,
    /// Asks the round manager to start the next round's waves. Ignored
    /// outside the combat phase.
    StartNextRound,
    /// Resets the round manager, the victory checker and all live enemies.
    ResetMatch,
    /// Forces the phase state machine into the provided phase, bypassing the
    /// transition table.
    ForcePhase {
        /// Phase that becomes active.
        phase: GamePhase,
    },
}

/// Unique handle assigned to a spawned enemy by the enemy factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnemyId(u32);

impl EnemyId {
    /// Creates a new enemy identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Reference to an enemy-kind descriptor owned by the enemy factory.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnemyKind(String);

impl EnemyKind {
    /// Creates a kind reference from its descriptor name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Descriptor name used by the enemy factory to resolve the kind.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnemyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a wave: how many enemies of a kind it contains.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemySpawnInfo {
    kind: EnemyKind,
    count: NonZeroU32,
}

impl EnemySpawnInfo {
    /// Creates a spawn entry for `count` enemies of `kind`.
    #[must_use]
    pub const fn new(kind: EnemyKind, count: NonZeroU32) -> Self {
        Self { kind, count }
    }

    /// Kind of enemy spawned by the entry.
    #[must_use]
    pub const fn kind(&self) -> &EnemyKind {
        &self.kind
    }

    /// Number of enemies spawned by the entry.
    #[must_use]
    pub const fn count(&self) -> NonZeroU32 {
        self.count
    }
}

/// A timed batch of enemy spawns within a round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    #[serde(with = "seconds", default)]
    delay_before_wave: Duration,
    enemies: Vec<EnemySpawnInfo>,
}

impl Wave {
    /// Creates a wave that starts after `delay_before_wave` and spawns `enemies`.
    #[must_use]
    pub const fn new(delay_before_wave: Duration, enemies: Vec<EnemySpawnInfo>) -> Self {
        Self {
            delay_before_wave,
            enemies,
        }
    }

    /// Time the spawner waits before the first enemy of this wave appears.
    #[must_use]
    pub const fn delay_before_wave(&self) -> Duration {
        self.delay_before_wave
    }

    /// Entries composing the wave in authored order.
    #[must_use]
    pub fn enemies(&self) -> &[EnemySpawnInfo] {
        &self.enemies
    }

    /// Sum of the counts of every entry in the wave.
    #[must_use]
    pub fn total_enemies(&self) -> u32 {
        self.enemies
            .iter()
            .fold(0_u32, |total, entry| total.saturating_add(entry.count.get()))
    }
}

/// Configuration of a single round. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundConfig {
    round_number: u32,
    waves: Vec<Wave>,
    #[serde(default)]
    reward_money: u32,
}

impl RoundConfig {
    /// Creates a round description.
    #[must_use]
    pub const fn new(round_number: u32, waves: Vec<Wave>, reward_money: u32) -> Self {
        Self {
            round_number,
            waves,
            reward_money,
        }
    }

    /// One-based number of the round.
    #[must_use]
    pub const fn round_number(&self) -> u32 {
        self.round_number
    }

    /// Waves fought during the round, in order.
    #[must_use]
    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Money awarded when the round completes.
    #[must_use]
    pub const fn reward_money(&self) -> u32 {
        self.reward_money
    }

    /// Number of enemies spawned across every wave of the round.
    #[must_use]
    pub fn total_enemies(&self) -> u32 {
        self.waves
            .iter()
            .fold(0_u32, |total, wave| total.saturating_add(wave.total_enemies()))
    }
}

const DEFAULT_FINAL_VICTORY_ROUND: NonZeroU32 = match NonZeroU32::new(10) {
    Some(round) => round,
    None => NonZeroU32::MIN,
};

/// Parameters that decide how a round and the match are won.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VictoryConfig {
    #[serde(with = "seconds", default)]
    round_time_limit: Duration,
    #[serde(default = "default_final_victory_round")]
    final_victory_round: NonZeroU32,
    #[serde(default = "default_require_center_tower_alive")]
    require_center_tower_alive: bool,
}

fn default_final_victory_round() -> NonZeroU32 {
    DEFAULT_FINAL_VICTORY_ROUND
}

fn default_require_center_tower_alive() -> bool {
    true
}

impl VictoryConfig {
    /// Creates a victory configuration. A zero time limit means unlimited.
    #[must_use]
    pub const fn new(
        round_time_limit: Duration,
        final_victory_round: NonZeroU32,
        require_center_tower_alive: bool,
    ) -> Self {
        Self {
            round_time_limit,
            final_victory_round,
            require_center_tower_alive,
        }
    }

    /// Time after which a round is won regardless of surviving enemies.
    #[must_use]
    pub const fn round_time_limit(&self) -> Duration {
        self.round_time_limit
    }

    /// Reports whether a round time limit is configured.
    #[must_use]
    pub const fn has_time_limit(&self) -> bool {
        !self.round_time_limit.is_zero()
    }

    /// Number of rounds that must be won for the overall victory.
    #[must_use]
    pub const fn final_victory_round(&self) -> NonZeroU32 {
        self.final_victory_round
    }

    /// Whether the final victory also requires the defended structure to stand.
    #[must_use]
    pub const fn require_center_tower_alive(&self) -> bool {
        self.require_center_tower_alive
    }
}

impl Default for VictoryConfig {
    fn default() -> Self {
        Self {
            round_time_limit: Duration::ZERO,
            final_victory_round: DEFAULT_FINAL_VICTORY_ROUND,
            require_center_tower_alive: true,
        }
    }
}

/// Axis-aligned rectangle in world units where enemies may appear.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnRegion {
    min: Vec2,
    max: Vec2,
}

impl SpawnRegion {
    /// Creates a region spanning the two corners, in any order.
    #[must_use]
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Lower-left corner of the region.
    #[must_use]
    pub fn min(&self) -> Vec2 {
        self.min.min(self.max)
    }

    /// Upper-right corner of the region.
    #[must_use]
    pub fn max(&self) -> Vec2 {
        self.max.max(self.min)
    }

    /// Reports whether the point lies inside the region, borders included.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        let (min, max) = (self.min(), self.max());
        point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
    }
}

/// Published by the game state manager on every phase transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseChanged {
    /// Phase active before the transition.
    pub old_phase: GamePhase,
    /// Phase active after the transition.
    pub new_phase: GamePhase,
}

/// Published by the round manager when a round begins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundStarted {
    /// Number of the round that started.
    pub round_number: u32,
    /// Waves handed to the spawner for the round.
    pub waves: Vec<Wave>,
}

/// Published by the round manager after a round's reward is paid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundCompleted {
    /// Number of the round that completed.
    pub round_number: u32,
    /// Reward handed to the economy.
    pub reward_money: u32,
}

/// Which victory path decided a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VictoryKind {
    /// Every enemy of the round was defeated.
    Round,
    /// The round time limit expired with the structure standing.
    Time,
    /// The final round was won.
    Final,
}

/// Health of the defended structure at evaluation time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StructureStatus {
    /// Whether the structure is still standing.
    pub alive: bool,
    /// Remaining health points.
    pub current_health: f32,
    /// Maximum health points.
    pub max_health: f32,
}

impl StructureStatus {
    /// Samples the provided structure.
    #[must_use]
    pub fn observe(structure: &dyn StructureHealth) -> Self {
        Self {
            alive: structure.is_alive(),
            current_health: structure.current_health(),
            max_health: structure.max_health(),
        }
    }

    /// Status reported when no structure collaborator is attached. The
    /// structure is considered standing so a missing collaborator cannot
    /// cause a defeat.
    #[must_use]
    pub const fn unobserved() -> Self {
        Self {
            alive: true,
            current_health: 0.0,
            max_health: 0.0,
        }
    }
}

/// Statistics snapshot gathered when an outcome is evaluated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VictoryStats {
    /// Time elapsed since the round started.
    pub elapsed: Duration,
    /// Enemies still alive.
    pub remaining_enemies: u32,
    /// Round being fought.
    pub current_round: u32,
    /// Number of configured rounds.
    pub total_rounds: u32,
    /// Health of the defended structure.
    pub structure: StructureStatus,
}

/// Published when a round (or the match) is won.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VictoryConditionMet {
    /// Path that decided the victory.
    pub kind: VictoryKind,
    /// Inputs the decision was based on.
    pub stats: VictoryStats,
}

/// Published when the defended structure has fallen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DefeatConditionMet {
    /// Inputs the decision was based on.
    pub stats: VictoryStats,
}

/// Published by the combat layer when an enemy dies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnemyDied {
    /// Enemy that died.
    pub enemy: EnemyId,
}

/// Published by the spawner after the enemy factory created an enemy.
#[derive(Clone, Debug, PartialEq)]
pub struct EnemySpawned {
    /// Handle returned by the factory.
    pub enemy: EnemyId,
    /// Kind that was spawned.
    pub kind: EnemyKind,
    /// Position the enemy was placed at.
    pub position: Vec2,
}

/// Published by the spawner when a wave's delay elapsed and spawning begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaveStarted {
    /// Zero-based index of the wave within the round.
    pub wave_index: usize,
    /// Number of enemies the wave will spawn.
    pub enemy_count: u32,
}

/// Published by the spawner when its schedule ran past the last wave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavesExhausted {
    /// Number of waves in the finished schedule.
    pub wave_count: usize,
}

/// Read-only view of the spawner used by other systems.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpawnerStatus {
    /// Spawned enemies that have not died yet.
    pub live_enemies: u32,
    /// Whether a spawn schedule is still running (including paused ones).
    pub spawning: bool,
}

/// Read-only view of the round manager used by other systems.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundProgress {
    /// Round being fought, or the last round fought.
    pub current_round: u32,
    /// Number of configured rounds.
    pub total_rounds: u32,
    /// Whether a round is currently in progress.
    pub round_in_progress: bool,
}

/// Creates enemies in the world on behalf of the spawner.
pub trait EnemyFactory {
    /// Spawns an enemy of `kind` at `position`, returning its handle, or
    /// `None` when the kind cannot be spawned.
    fn spawn(&mut self, kind: &EnemyKind, position: Vec2) -> Option<EnemyId>;

    /// Removes a live enemy without reporting a death.
    fn despawn(&mut self, enemy: EnemyId);
}

/// Health of the structure the player defends.
pub trait StructureHealth {
    /// Whether the structure is still standing.
    fn is_alive(&self) -> bool;

    /// Remaining health points.
    fn current_health(&self) -> f32;

    /// Maximum health points.
    fn max_health(&self) -> f32;
}

/// Player wallet.
pub trait Economy {
    /// Credits the wallet.
    fn add_money(&mut self, amount: u32);

    /// Reports whether the wallet holds at least `amount`.
    fn can_afford(&self, amount: u32) -> bool;

    /// Debits the wallet, returning `false` without change when the balance
    /// is insufficient.
    fn spend_money(&mut self, amount: u32) -> bool;
}

/// Presentation layer notified whenever the phase changes.
pub trait PhasePresenter {
    /// Redraws the presentation for `phase`.
    fn switch_to_phase(&mut self, phase: GamePhase);
}

/// Serde adapter storing durations as floating-point seconds.
///
/// Use with `#[serde(with = "rampart_core::seconds")]`.
pub mod seconds {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    /// Writes `duration` as a number of seconds.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    /// Reads a finite, non-negative number of seconds that fits a
    /// [`Duration`].
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(D::Error::custom(format!(
                "duration must be a finite, non-negative number of seconds, got {secs}"
            )));
        }
        Duration::try_from_secs_f64(secs).map_err(|error| {
            D::Error::custom(format!("duration of {secs} seconds is out of range: {error}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).expect("non-zero count")
    }

    #[test]
    fn wave_total_sums_entry_counts() {
        let wave = Wave::new(
            Duration::ZERO,
            vec![
                EnemySpawnInfo::new(EnemyKind::new("Goblin"), count(3)),
                EnemySpawnInfo::new(EnemyKind::new("Orc"), count(2)),
            ],
        );
        assert_eq!(wave.total_enemies(), 5);

        let round = RoundConfig::new(1, vec![wave.clone(), wave], 40);
        assert_eq!(round.total_enemies(), 10);
    }

    #[test]
    fn round_config_parses_seconds_and_counts() {
        let source = r#"
            round_number = 2
            reward_money = 75

            [[waves]]
            delay_before_wave = 1.5
            enemies = [{ kind = "Goblin", count = 2 }, { kind = "Orc", count = 1 }]
        "#;

        let round: RoundConfig = toml::from_str(source).expect("parse round");
        assert_eq!(round.round_number(), 2);
        assert_eq!(round.reward_money(), 75);
        assert_eq!(round.waves().len(), 1);
        assert_eq!(
            round.waves()[0].delay_before_wave(),
            Duration::from_millis(1500)
        );
        assert_eq!(round.waves()[0].enemies()[0].kind().name(), "Goblin");
        assert_eq!(round.total_enemies(), 3);
    }

    #[test]
    fn negative_wave_delay_is_rejected() {
        let source = r#"
            delay_before_wave = -1.0
            enemies = []
        "#;
        assert!(toml::from_str::<Wave>(source).is_err());
    }

    #[test]
    fn oversized_wave_delay_is_rejected() {
        let source = r#"
            delay_before_wave = 1e300
            enemies = []
        "#;
        let error = toml::from_str::<Wave>(source).expect_err("delay cannot fit a duration");
        assert!(
            error.to_string().contains("out of range"),
            "unexpected error: {error}"
        );

        let limit = toml::from_str::<VictoryConfig>("round_time_limit = 1e300");
        assert!(limit.is_err(), "time limit cannot fit a duration");
    }

    #[test]
    fn zero_enemy_count_is_rejected() {
        let source = r#"
            delay_before_wave = 0.0
            enemies = [{ kind = "Goblin", count = 0 }]
        "#;
        assert!(toml::from_str::<Wave>(source).is_err());
    }

    #[test]
    fn victory_config_fills_missing_fields_with_defaults() {
        let config: VictoryConfig = toml::from_str("round_time_limit = 60.0").expect("parse");
        assert_eq!(config.round_time_limit(), Duration::from_secs(60));
        assert!(config.has_time_limit());
        assert_eq!(config.final_victory_round().get(), 10);
        assert!(config.require_center_tower_alive());

        assert!(!VictoryConfig::default().has_time_limit());
    }

    #[test]
    fn spawn_region_normalises_corners() {
        let region = SpawnRegion::from_corners(Vec2::new(10.0, -2.0), Vec2::new(-4.0, 6.0));
        assert_eq!(region.min(), Vec2::new(-4.0, -2.0));
        assert_eq!(region.max(), Vec2::new(10.0, 6.0));
        assert!(region.contains(Vec2::new(0.0, 0.0)));
        assert!(region.contains(Vec2::new(10.0, 6.0)));
        assert!(!region.contains(Vec2::new(11.0, 0.0)));
    }

    #[test]
    fn unobserved_structure_counts_as_standing() {
        assert!(StructureStatus::unobserved().alive);
    }
}
