#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Wave-driven spawning system that turns a round's waves into timed spawns.
//!
//! The spawn sequence is an explicit state machine advanced by the session
//! tick: each wave waits for its delay, then spawns its enemies one at a time
//! in a shuffled order separated by a fixed inter-spawn delay. All randomness
//! comes from a seeded ChaCha stream so a run is reproducible from its seed.

use std::{
    collections::{BTreeSet, VecDeque},
    time::Duration,
};

use glam::Vec2;
use rampart_bus::{EventBus, Inbox};
use rampart_core::{
    EnemyDied, EnemyFactory, EnemyId, EnemyKind, EnemySpawned, EventSource, SpawnRegion,
    SpawnerStatus, Wave, WaveStarted, WavesExhausted,
};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, trace, warn};

/// Configuration parameters required to construct the spawner.
#[derive(Clone, Debug)]
pub struct Config {
    inter_spawn_delay: Duration,
    rng_seed: u64,
    regions: Vec<SpawnRegion>,
}

impl Config {
    /// Creates a configuration from the spawn cadence, seed and spawn regions.
    #[must_use]
    pub fn new(inter_spawn_delay: Duration, rng_seed: u64, regions: Vec<SpawnRegion>) -> Self {
        Self {
            inter_spawn_delay,
            rng_seed,
            regions,
        }
    }

    /// Delay separating consecutive spawns within a wave.
    #[must_use]
    pub const fn inter_spawn_delay(&self) -> Duration {
        self.inter_spawn_delay
    }

    /// Seed of the spawner's random stream.
    #[must_use]
    pub const fn rng_seed(&self) -> u64 {
        self.rng_seed
    }

    /// Regions enemies are placed in.
    #[must_use]
    pub fn regions(&self) -> &[SpawnRegion] {
        &self.regions
    }
}

#[derive(Clone, Debug)]
enum Stage {
    Delay {
        remaining: Duration,
    },
    Spawning {
        roster: VecDeque<EnemyKind>,
        cooldown: Duration,
    },
}

#[derive(Clone, Debug)]
struct Schedule {
    wave_index: usize,
    stage: Stage,
}

/// Expands a wave into one entry per enemy and shuffles it uniformly.
///
/// Wave composition is authored, spawn order is not: kinds end up interleaved
/// rather than grouped in configuration order.
pub fn shuffled_roster<R: Rng + ?Sized>(wave: &Wave, rng: &mut R) -> Vec<EnemyKind> {
    let mut roster: Vec<EnemyKind> = wave
        .enemies()
        .iter()
        .flat_map(|entry| {
            std::iter::repeat(entry.kind().clone()).take(entry.count().get() as usize)
        })
        .collect();
    roster.shuffle(rng);
    roster
}

/// Spawns the enemies of a wave list and tracks which of them are alive.
#[derive(Debug)]
pub struct EnemySpawner {
    bus: EventBus,
    deaths: Inbox<EnemyId>,
    inter_spawn_delay: Duration,
    regions: Vec<SpawnRegion>,
    rng: ChaCha8Rng,
    waves: Vec<Wave>,
    live: BTreeSet<EnemyId>,
    schedule: Option<Schedule>,
    paused: bool,
}

impl EnemySpawner {
    /// Creates a spawner that listens for enemy deaths on `bus`.
    #[must_use]
    pub fn new(bus: &EventBus, config: Config) -> Self {
        if config.regions.is_empty() {
            warn!("no spawn regions configured; enemies will spawn at the origin");
        }

        let mut deaths = Inbox::new();
        deaths.listen::<EnemyDied, _>(bus, |_, died| Some(died.enemy));

        Self {
            bus: bus.clone(),
            deaths,
            inter_spawn_delay: config.inter_spawn_delay,
            regions: config.regions,
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            waves: Vec::new(),
            live: BTreeSet::new(),
            schedule: None,
            paused: false,
        }
    }

    /// Replaces the pending wave list and resets the live enemy count.
    ///
    /// A schedule still running for the previous list is cancelled.
    pub fn set_waves(&mut self, waves: Vec<Wave>) {
        if self.schedule.take().is_some() {
            warn!("wave list replaced while a spawn schedule was running; schedule cancelled");
        }
        self.deaths.clear();
        self.live.clear();
        self.paused = false;
        debug!(waves = waves.len(), "wave list set");
        self.waves = waves;
    }

    /// Begins walking the wave list from the first wave.
    pub fn start_waves(&mut self) {
        if self.schedule.is_some() {
            warn!("start requested while a spawn schedule is already running; ignored");
            return;
        }

        let Some(first) = self.waves.first() else {
            warn!("start requested without any waves");
            self.bus.publish(
                EventSource::Spawner,
                &WavesExhausted { wave_count: 0 },
            );
            return;
        };

        self.schedule = Some(Schedule {
            wave_index: 0,
            stage: Stage::Delay {
                remaining: first.delay_before_wave(),
            },
        });
        self.paused = false;
        info!(waves = self.waves.len(), "spawn schedule started");
    }

    /// Applies pending death notifications and advances the spawn schedule.
    ///
    /// Spawns are skipped with an error when no `factory` is attached.
    pub fn tick(&mut self, dt: Duration, factory: Option<&mut dyn EnemyFactory>) {
        self.process_events();
        if self.paused {
            return;
        }
        self.advance(dt, factory);
    }

    /// Applies death notifications received from the bus.
    pub fn process_events(&mut self) {
        for enemy in self.deaths.drain() {
            if self.live.remove(&enemy) {
                trace!(enemy = enemy.get(), remaining = self.live.len(), "enemy died");
            } else {
                debug!(
                    enemy = enemy.get(),
                    "death reported for an enemy that is not tracked; ignored"
                );
            }
        }
    }

    /// Destroys every live enemy and stops the spawn schedule immediately.
    pub fn clear_all_enemies(&mut self, factory: Option<&mut dyn EnemyFactory>) {
        self.deaths.clear();
        self.schedule = None;
        self.paused = false;

        let live = std::mem::take(&mut self.live);
        match factory {
            Some(factory) => {
                for enemy in &live {
                    factory.despawn(*enemy);
                }
            }
            None if !live.is_empty() => {
                error!(
                    enemies = live.len(),
                    "no enemy factory attached; live enemies could not be despawned"
                );
            }
            None => {}
        }
        info!(cleared = live.len(), "all enemies cleared");
    }

    /// Suspends the spawn schedule where it stands.
    pub fn pause(&mut self) {
        if self.schedule.is_none() || self.paused {
            debug!("pause requested without a running spawn schedule; ignored");
            return;
        }
        self.paused = true;
        info!("spawn schedule paused");
    }

    /// Resumes a suspended spawn schedule. Resuming a running schedule is a no-op.
    pub fn resume_waves(&mut self) {
        if !self.paused {
            debug!("resume requested while not paused; ignored");
            return;
        }
        self.paused = false;
        if self.schedule.is_some() && !self.waves.is_empty() {
            info!("spawn schedule resumed");
        } else {
            debug!("resume requested without a pending schedule");
        }
    }

    /// Reports whether every spawned enemy has died.
    #[must_use]
    pub fn are_all_enemies_defeated(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of spawned enemies that have not died yet.
    #[must_use]
    pub fn current_enemy_count(&self) -> u32 {
        u32::try_from(self.live.len()).unwrap_or(u32::MAX)
    }

    /// Iterator over the live enemies in ascending handle order.
    pub fn live_enemies(&self) -> impl Iterator<Item = EnemyId> + '_ {
        self.live.iter().copied()
    }

    /// Reports whether a spawn schedule is running or suspended.
    #[must_use]
    pub fn is_spawning(&self) -> bool {
        self.schedule.is_some()
    }

    /// Reports whether the schedule is suspended.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Index of the wave the schedule is working on.
    #[must_use]
    pub fn current_wave_index(&self) -> Option<usize> {
        self.schedule.as_ref().map(|schedule| schedule.wave_index)
    }

    /// Wave list handed to the spawner.
    #[must_use]
    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Read-only view consumed by other systems.
    #[must_use]
    pub fn status(&self) -> SpawnerStatus {
        SpawnerStatus {
            live_enemies: self.current_enemy_count(),
            spawning: self.is_spawning(),
        }
    }

    fn advance(&mut self, dt: Duration, mut factory: Option<&mut dyn EnemyFactory>) {
        let mut budget = dt;

        while let Some(mut schedule) = self.schedule.take() {
            match &mut schedule.stage {
                Stage::Delay { remaining } => {
                    if *remaining > budget {
                        *remaining -= budget;
                        self.schedule = Some(schedule);
                        return;
                    }
                    budget -= *remaining;
                    let roster = self.begin_wave(schedule.wave_index);
                    schedule.stage = Stage::Spawning {
                        roster,
                        cooldown: Duration::ZERO,
                    };
                }
                Stage::Spawning { roster, cooldown } => {
                    if *cooldown > budget {
                        *cooldown -= budget;
                        self.schedule = Some(schedule);
                        return;
                    }
                    budget -= *cooldown;

                    if let Some(kind) = roster.pop_front() {
                        self.spawn_one(&kind, &mut factory);
                        *cooldown = self.inter_spawn_delay;
                    } else {
                        let next = schedule.wave_index + 1;
                        let Some(wave) = self.waves.get(next) else {
                            self.finish();
                            return;
                        };
                        schedule = Schedule {
                            wave_index: next,
                            stage: Stage::Delay {
                                remaining: wave.delay_before_wave(),
                            },
                        };
                    }
                }
            }
            self.schedule = Some(schedule);
        }
    }

    fn begin_wave(&mut self, wave_index: usize) -> VecDeque<EnemyKind> {
        let Some(wave) = self.waves.get(wave_index) else {
            return VecDeque::new();
        };
        let roster = shuffled_roster(wave, &mut self.rng);
        let enemy_count = u32::try_from(roster.len()).unwrap_or(u32::MAX);
        info!(wave = wave_index, enemies = enemy_count, "wave started");
        self.bus.publish(
            EventSource::Spawner,
            &WaveStarted {
                wave_index,
                enemy_count,
            },
        );
        roster.into()
    }

    fn spawn_one(&mut self, kind: &EnemyKind, factory: &mut Option<&mut dyn EnemyFactory>) {
        let Some(factory) = factory.as_mut() else {
            error!(%kind, "no enemy factory attached; spawn skipped");
            return;
        };

        let position = self.pick_position();
        let Some(enemy) = factory.spawn(kind, position) else {
            warn!(%kind, "enemy factory refused to spawn");
            return;
        };

        if !self.live.insert(enemy) {
            warn!(enemy = enemy.get(), "enemy factory reused a live handle");
        }
        debug!(
            enemy = enemy.get(),
            %kind,
            x = position.x,
            y = position.y,
            live = self.live.len(),
            "enemy spawned"
        );
        self.bus.publish(
            EventSource::Spawner,
            &EnemySpawned {
                enemy,
                kind: kind.clone(),
                position,
            },
        );
    }

    fn pick_position(&mut self) -> Vec2 {
        if self.regions.is_empty() {
            return Vec2::ZERO;
        }
        let region = self.regions[self.rng.gen_range(0..self.regions.len())];
        let (min, max) = (region.min(), region.max());
        Vec2::new(
            sample_axis(&mut self.rng, min.x, max.x),
            sample_axis(&mut self.rng, min.y, max.y),
        )
    }

    fn finish(&mut self) {
        self.schedule = None;
        info!(waves = self.waves.len(), "spawn schedule finished");
        self.bus.publish(
            EventSource::Spawner,
            &WavesExhausted {
                wave_count: self.waves.len(),
            },
        );
    }
}

fn sample_axis(rng: &mut ChaCha8Rng, low: f32, high: f32) -> f32 {
    if high > low && (high - low).is_finite() {
        rng.gen_range(low..=high)
    } else {
        low
    }
}
