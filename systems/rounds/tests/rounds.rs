use std::{cell::Cell, cell::RefCell, num::NonZeroU32, rc::Rc, time::Duration};

use glam::Vec2;
use rampart_bus::{EventBus, Subscription};
use rampart_core::{
    Economy, EnemyDied, EnemyFactory, EnemyId, EnemyKind, EnemySpawnInfo, EventSource,
    RoundCompleted, RoundConfig, RoundStarted, SpawnRegion, StructureHealth, VictoryConditionMet,
    VictoryConfig, VictoryKind, Wave,
};
use rampart_system_rounds::{Config, RoundContext, RoundManager, DEFAULT_ROUND_COUNT};
use rampart_system_spawning::{self as spawning, EnemySpawner};
use rampart_system_victory::VictoryConditionChecker;

const STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct RecordingFactory {
    next_id: u32,
    spawned: Vec<(EnemyId, EnemyKind)>,
    despawned: Vec<EnemyId>,
}

impl EnemyFactory for RecordingFactory {
    fn spawn(&mut self, kind: &EnemyKind, _position: Vec2) -> Option<EnemyId> {
        self.next_id += 1;
        let enemy = EnemyId::new(self.next_id);
        self.spawned.push((enemy, kind.clone()));
        Some(enemy)
    }

    fn despawn(&mut self, enemy: EnemyId) {
        self.despawned.push(enemy);
    }
}

#[derive(Debug, Default)]
struct Wallet {
    balance: u32,
}

impl Economy for Wallet {
    fn add_money(&mut self, amount: u32) {
        self.balance += amount;
    }

    fn can_afford(&self, amount: u32) -> bool {
        self.balance >= amount
    }

    fn spend_money(&mut self, amount: u32) -> bool {
        if !self.can_afford(amount) {
            return false;
        }
        self.balance -= amount;
        true
    }
}

#[derive(Debug)]
struct Tower {
    alive: Cell<bool>,
}

impl StructureHealth for Tower {
    fn is_alive(&self) -> bool {
        self.alive.get()
    }

    fn current_health(&self) -> f32 {
        if self.alive.get() {
            100.0
        } else {
            0.0
        }
    }

    fn max_health(&self) -> f32 {
        100.0
    }
}

struct Harness {
    bus: EventBus,
    spawner: EnemySpawner,
    victory: VictoryConditionChecker,
    rounds: RoundManager,
    factory: RecordingFactory,
    wallet: Wallet,
    tower: Tower,
    now: Duration,
    completed: Rc<RefCell<Vec<RoundCompleted>>>,
    started: Rc<RefCell<Vec<u32>>>,
    victories: Rc<RefCell<Vec<VictoryKind>>>,
    _subscriptions: Vec<Subscription>,
}

impl Harness {
    fn new(rounds: Option<Vec<RoundConfig>>, victory: VictoryConfig) -> Self {
        Self::with_settle_delay(rounds, victory, STEP)
    }

    fn with_settle_delay(
        rounds: Option<Vec<RoundConfig>>,
        victory: VictoryConfig,
        settle_delay: Duration,
    ) -> Self {
        let bus = EventBus::new();
        let region = SpawnRegion::from_corners(Vec2::ZERO, Vec2::new(4.0, 4.0));
        let spawner = EnemySpawner::new(
            &bus,
            spawning::Config::new(Duration::from_millis(500), 42, vec![region]),
        );
        let checker = VictoryConditionChecker::new(&bus, victory);
        let rounds = RoundManager::new(&bus, Config::new(settle_delay), rounds);

        let completed = Rc::new(RefCell::new(Vec::new()));
        let started = Rc::new(RefCell::new(Vec::new()));
        let victories = Rc::new(RefCell::new(Vec::new()));

        let completed_sink = Rc::clone(&completed);
        let started_sink = Rc::clone(&started);
        let victory_sink = Rc::clone(&victories);
        let subscriptions = vec![
            bus.subscribe::<RoundCompleted, _>(move |source, completed| {
                assert_eq!(source, EventSource::Rounds);
                completed_sink.borrow_mut().push(*completed);
                Ok(())
            }),
            bus.subscribe::<RoundStarted, _>(move |_, started| {
                started_sink.borrow_mut().push(started.round_number);
                Ok(())
            }),
            bus.subscribe::<VictoryConditionMet, _>(move |_, met| {
                victory_sink.borrow_mut().push(met.kind);
                Ok(())
            }),
        ];

        Self {
            bus,
            spawner,
            victory: checker,
            rounds,
            factory: RecordingFactory::default(),
            wallet: Wallet::default(),
            tower: Tower {
                alive: Cell::new(true),
            },
            now: Duration::ZERO,
            completed,
            started,
            victories,
            _subscriptions: subscriptions,
        }
    }

    fn with_ctx<R>(
        &mut self,
        action: impl FnOnce(&mut RoundManager, &mut RoundContext<'_>) -> R,
    ) -> R {
        let mut ctx = RoundContext {
            spawner: &mut self.spawner,
            victory: &mut self.victory,
            factory: Some(&mut self.factory),
            structure: Some(&self.tower),
            economy: Some(&mut self.wallet),
            now: self.now,
        };
        action(&mut self.rounds, &mut ctx)
    }

    fn step(&mut self) {
        self.now += STEP;
        self.spawner.tick(STEP, Some(&mut self.factory));
        self.with_ctx(|rounds, ctx| rounds.tick(ctx, STEP));
    }

    fn run_for(&mut self, duration: Duration) {
        let end = self.now + duration;
        while self.now < end {
            self.step();
        }
    }

    fn kill_all(&mut self) {
        for (enemy, _) in self.factory.spawned.clone() {
            self.bus.publish(EventSource::Combat, &EnemyDied { enemy });
        }
    }
}

fn entry(kind: &str, count: u32) -> EnemySpawnInfo {
    EnemySpawnInfo::new(
        EnemyKind::new(kind),
        NonZeroU32::new(count).expect("non-zero count"),
    )
}

fn goblin_round(round_number: u32, goblins: u32, reward: u32) -> RoundConfig {
    RoundConfig::new(
        round_number,
        vec![Wave::new(Duration::ZERO, vec![entry("Goblin", goblins)])],
        reward,
    )
}

fn victory_config(time_limit_secs: u64, final_round: u32) -> VictoryConfig {
    VictoryConfig::new(
        Duration::from_secs(time_limit_secs),
        NonZeroU32::new(final_round).expect("non-zero round"),
        true,
    )
}

#[test]
fn single_round_spawns_waits_for_deaths_and_pays_the_reward() {
    let mut harness = Harness::new(
        Some(vec![goblin_round(1, 2, 50)]),
        VictoryConfig::default(),
    );

    assert!(harness.with_ctx(|rounds, ctx| rounds.start_current_round(ctx)));
    harness.run_for(Duration::from_secs(2));

    assert_eq!(harness.factory.spawned.len(), 2, "exactly two goblins spawn");
    assert!(harness
        .factory
        .spawned
        .iter()
        .all(|(_, kind)| kind.name() == "Goblin"));
    assert!(
        harness.rounds.is_round_in_progress(),
        "live enemies keep the round open"
    );
    assert!(harness.completed.borrow().is_empty());

    harness.kill_all();
    harness.run_for(Duration::from_secs(1));

    assert_eq!(harness.spawner.current_enemy_count(), 0);
    assert!(!harness.rounds.is_round_in_progress());
    assert!(harness.rounds.is_current_round_completed());
    assert_eq!(harness.wallet.balance, 50);
    assert_eq!(
        *harness.completed.borrow(),
        vec![RoundCompleted {
            round_number: 1,
            reward_money: 50
        }]
    );
}

#[test]
fn completion_waits_for_the_settle_delay_after_the_last_death() {
    let mut harness = Harness::with_settle_delay(
        Some(vec![goblin_round(1, 2, 50)]),
        VictoryConfig::default(),
        Duration::from_millis(500),
    );
    assert!(harness.with_ctx(|rounds, ctx| rounds.start_current_round(ctx)));
    harness.run_for(Duration::from_secs(2));
    assert_eq!(harness.factory.spawned.len(), 2);
    let first = harness.factory.spawned[0].0;
    let second = harness.factory.spawned[1].0;

    harness
        .bus
        .publish(EventSource::Combat, &EnemyDied { enemy: first });
    for _ in 0..3 {
        harness.step();
    }
    harness
        .bus
        .publish(EventSource::Combat, &EnemyDied { enemy: second });

    harness.step();
    assert_eq!(harness.spawner.current_enemy_count(), 0);
    assert!(
        harness.rounds.is_round_in_progress(),
        "one tick after the last death the round is still settling"
    );

    for _ in 0..4 {
        harness.step();
    }
    assert!(
        harness.rounds.is_round_in_progress(),
        "the second death restarted the settle delay"
    );
    assert!(harness.completed.borrow().is_empty());

    harness.step();
    assert!(
        !harness.rounds.is_round_in_progress(),
        "the round completes once the settle delay has elapsed"
    );
    assert_eq!(harness.wallet.balance, 50);
    assert_eq!(harness.completed.borrow().len(), 1);
}

#[test]
fn starting_a_round_twice_leaves_state_unchanged() {
    let mut harness = Harness::new(
        Some(vec![goblin_round(1, 3, 10), goblin_round(2, 3, 10)]),
        VictoryConfig::default(),
    );

    assert!(harness.with_ctx(|rounds, ctx| rounds.start_current_round(ctx)));
    harness.step();
    let spawned = harness.factory.spawned.len();
    let wave_index = harness.spawner.current_wave_index();

    assert!(!harness.with_ctx(|rounds, ctx| rounds.start_current_round(ctx)));
    assert!(!harness.with_ctx(|rounds, ctx| rounds.start_next_round(ctx)));

    assert_eq!(*harness.started.borrow(), vec![1]);
    assert_eq!(harness.rounds.current_round_number(), 1);
    assert_eq!(harness.factory.spawned.len(), spawned);
    assert_eq!(harness.spawner.current_wave_index(), wave_index);
    assert!(harness.spawner.is_spawning(), "the running schedule is untouched");
}

#[test]
fn next_round_advances_only_after_completion() {
    let mut harness = Harness::new(
        Some(vec![goblin_round(1, 1, 10), goblin_round(2, 1, 20)]),
        VictoryConfig::default(),
    );

    assert!(harness.with_ctx(|rounds, ctx| rounds.start_next_round(ctx)));
    assert_eq!(harness.rounds.current_round_number(), 1);

    harness.run_for(Duration::from_secs(1));
    harness.kill_all();
    harness.run_for(Duration::from_secs(1));
    assert!(harness.rounds.is_current_round_completed());

    assert!(harness.with_ctx(|rounds, ctx| rounds.start_next_round(ctx)));
    assert_eq!(harness.rounds.current_round_number(), 2);
    assert_eq!(*harness.started.borrow(), vec![1, 2]);
    assert_eq!(
        harness.rounds.progress().total_rounds,
        2,
        "progress reports the configured round count"
    );
}

#[test]
fn starting_past_the_last_round_aborts_without_changing_state() {
    let mut harness = Harness::new(Some(vec![goblin_round(1, 1, 10)]), victory_config(0, 5));

    assert!(harness.with_ctx(|rounds, ctx| rounds.start_current_round(ctx)));
    assert!(harness.rounds.complete_current_round(Some(&mut harness.wallet)));

    assert!(!harness.with_ctx(|rounds, ctx| rounds.start_next_round(ctx)));
    assert_eq!(harness.rounds.current_round_number(), 1);
    assert!(!harness.rounds.is_round_in_progress());
    assert_eq!(*harness.started.borrow(), vec![1]);
}

#[test]
fn completing_without_a_round_in_progress_is_refused() {
    let mut harness = Harness::new(Some(vec![goblin_round(1, 1, 10)]), victory_config(0, 1));
    assert!(!harness.rounds.complete_current_round(Some(&mut harness.wallet)));
    assert_eq!(harness.wallet.balance, 0);
    assert!(harness.completed.borrow().is_empty());
}

#[test]
fn missing_economy_still_completes_the_round() {
    let mut harness = Harness::new(Some(vec![goblin_round(1, 1, 30)]), victory_config(0, 1));
    assert!(harness.with_ctx(|rounds, ctx| rounds.start_current_round(ctx)));
    assert!(harness.rounds.complete_current_round(None));
    assert_eq!(harness.completed.borrow().len(), 1);
    assert_eq!(harness.wallet.balance, 0);
}

#[test]
fn lost_rounds_are_never_paid() {
    let mut harness = Harness::new(
        Some(vec![goblin_round(1, 2, 50), goblin_round(2, 2, 50)]),
        VictoryConfig::default(),
    );
    assert!(harness.with_ctx(|rounds, ctx| rounds.start_current_round(ctx)));
    harness.run_for(Duration::from_secs(1));

    harness.tower.alive.set(false);
    harness.kill_all();
    harness.run_for(Duration::from_secs(1));

    assert!(harness.victory.has_checked_victory(), "defeat was adjudicated");
    assert!(harness.victories.borrow().is_empty());
    assert!(harness.completed.borrow().is_empty());
    assert_eq!(harness.wallet.balance, 0);
    assert!(
        harness.rounds.is_round_in_progress(),
        "the round stays open until the match is reset"
    );
}

#[test]
fn time_limit_clears_survivors_and_completes_the_round() {
    let mut harness = Harness::new(
        Some(vec![goblin_round(1, 3, 40), goblin_round(2, 3, 40)]),
        victory_config(5, 10),
    );
    assert!(harness.with_ctx(|rounds, ctx| rounds.start_current_round(ctx)));
    harness.run_for(Duration::from_secs(6));

    assert_eq!(*harness.victories.borrow(), vec![VictoryKind::Time]);
    assert_eq!(harness.wallet.balance, 40);
    assert_eq!(harness.spawner.current_enemy_count(), 0);
    let mut despawned = harness.factory.despawned.clone();
    despawned.sort();
    let spawned: Vec<EnemyId> = harness.factory.spawned.iter().map(|(id, _)| *id).collect();
    assert_eq!(despawned, spawned, "every survivor is despawned");
}

#[test]
fn rounds_without_enemies_complete_once_the_schedule_ends() {
    let mut harness = Harness::new(
        Some(vec![RoundConfig::new(1, Vec::new(), 5), goblin_round(2, 1, 5)]),
        VictoryConfig::default(),
    );
    assert!(harness.with_ctx(|rounds, ctx| rounds.start_current_round(ctx)));
    harness.run_for(Duration::from_millis(500));

    assert_eq!(*harness.victories.borrow(), vec![VictoryKind::Round]);
    assert_eq!(harness.completed.borrow().len(), 1);
}

#[test]
fn reset_returns_to_round_one_and_clears_enemies() {
    let mut harness = Harness::new(
        Some(vec![goblin_round(1, 1, 10), goblin_round(2, 4, 10)]),
        VictoryConfig::default(),
    );
    assert!(harness.with_ctx(|rounds, ctx| rounds.start_current_round(ctx)));
    assert!(harness.rounds.complete_current_round(Some(&mut harness.wallet)));
    assert!(harness.with_ctx(|rounds, ctx| rounds.start_next_round(ctx)));
    harness.run_for(Duration::from_secs(1));
    assert!(harness.spawner.current_enemy_count() > 0);

    harness.with_ctx(|rounds, ctx| rounds.reset(ctx));

    assert_eq!(harness.rounds.current_round_number(), 1);
    assert!(!harness.rounds.is_round_in_progress());
    assert!(!harness.rounds.is_current_round_completed());
    assert_eq!(harness.spawner.current_enemy_count(), 0);
    assert!(!harness.spawner.is_spawning());

    assert!(harness.with_ctx(|rounds, ctx| rounds.start_next_round(ctx)));
    assert_eq!(harness.rounds.current_round_number(), 1);
}

#[test]
fn invalid_round_lists_fall_back_to_defaults() {
    let bus = EventBus::new();
    let rounds = RoundManager::new(
        &bus,
        Config::new(STEP),
        Some(vec![goblin_round(2, 1, 10)]),
    );
    assert_eq!(rounds.total_rounds(), DEFAULT_ROUND_COUNT);

    let synthesized = RoundManager::new(&bus, Config::new(STEP), None);
    assert_eq!(synthesized.total_rounds(), DEFAULT_ROUND_COUNT);
    assert_eq!(synthesized.round_config(1).map(RoundConfig::reward_money), Some(100));
    assert!(synthesized.round_config(0).is_none());
    assert!(synthesized.round_config(11).is_none());
}
