//! Scripted stand-ins for the collaborators a real game would provide.
//!
//! Every collaborator handed to the session shares one arena state, so the
//! command loop can age enemies, knock the structure down and spend money
//! without reaching into the session.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc, time::Duration};

use glam::Vec2;
use rampart_core::{
    Economy, EnemyFactory, EnemyId, EnemyKind, GamePhase, PhasePresenter, StructureHealth,
};
use rampart_session::Collaborators;
use tracing::{debug, info};

const STRUCTURE_HEALTH: f32 = 500.0;

#[derive(Debug)]
struct ArenaState {
    clock: Duration,
    next_enemy: u32,
    alive: BTreeMap<EnemyId, Duration>,
    spawned: u32,
    structure_health: f32,
    balance: u32,
    phases: Vec<GamePhase>,
}

impl Default for ArenaState {
    fn default() -> Self {
        Self {
            clock: Duration::ZERO,
            next_enemy: 1,
            alive: BTreeMap::new(),
            spawned: 0,
            structure_health: STRUCTURE_HEALTH,
            balance: 0,
            phases: Vec::new(),
        }
    }
}

/// Shared world the scripted collaborators act on.
#[derive(Clone, Debug, Default)]
pub(crate) struct Arena {
    state: Rc<RefCell<ArenaState>>,
}

impl Arena {
    /// Collaborators backed by this arena.
    pub(crate) fn collaborators(&self) -> Collaborators {
        Collaborators {
            factory: Some(Box::new(Horde(Rc::clone(&self.state)))),
            structure: Some(Box::new(Tower(Rc::clone(&self.state)))),
            economy: Some(Box::new(Wallet(Rc::clone(&self.state)))),
            presenter: Some(Box::new(Console(Rc::clone(&self.state)))),
        }
    }

    /// Wallet view used by the command loop to buy defences.
    pub(crate) fn wallet(&self) -> impl Economy {
        Wallet(Rc::clone(&self.state))
    }

    pub(crate) fn advance(&self, dt: Duration) {
        self.state.borrow_mut().clock += dt;
    }

    /// Removes and returns the enemies that have been alive for `lifetime`.
    pub(crate) fn take_expired(&self, lifetime: Duration) -> Vec<EnemyId> {
        let mut state = self.state.borrow_mut();
        let now = state.clock;
        let expired: Vec<EnemyId> = state
            .alive
            .iter()
            .filter(|(_, spawned_at)| now.saturating_sub(**spawned_at) >= lifetime)
            .map(|(enemy, _)| *enemy)
            .collect();
        for enemy in &expired {
            let _ = state.alive.remove(enemy);
        }
        expired
    }

    pub(crate) fn destroy_structure(&self) {
        let mut state = self.state.borrow_mut();
        if state.structure_health > 0.0 {
            state.structure_health = 0.0;
            info!("structure destroyed");
        }
    }

    pub(crate) fn is_structure_standing(&self) -> bool {
        self.state.borrow().structure_health > 0.0
    }

    pub(crate) fn balance(&self) -> u32 {
        self.state.borrow().balance
    }

    pub(crate) fn spawned(&self) -> u32 {
        self.state.borrow().spawned
    }

    /// Phases presented since the last call.
    pub(crate) fn take_phases(&self) -> Vec<GamePhase> {
        std::mem::take(&mut self.state.borrow_mut().phases)
    }
}

struct Horde(Rc<RefCell<ArenaState>>);

impl EnemyFactory for Horde {
    fn spawn(&mut self, kind: &EnemyKind, position: Vec2) -> Option<EnemyId> {
        let mut state = self.0.borrow_mut();
        let enemy = EnemyId::new(state.next_enemy);
        state.next_enemy += 1;
        state.spawned += 1;
        let now = state.clock;
        let _ = state.alive.insert(enemy, now);
        debug!(
            enemy = enemy.get(),
            kind = kind.name(),
            x = position.x,
            y = position.y,
            "enemy spawned"
        );
        Some(enemy)
    }

    fn despawn(&mut self, enemy: EnemyId) {
        let _ = self.0.borrow_mut().alive.remove(&enemy);
    }
}

struct Tower(Rc<RefCell<ArenaState>>);

impl StructureHealth for Tower {
    fn is_alive(&self) -> bool {
        self.0.borrow().structure_health > 0.0
    }

    fn current_health(&self) -> f32 {
        self.0.borrow().structure_health
    }

    fn max_health(&self) -> f32 {
        STRUCTURE_HEALTH
    }
}

struct Wallet(Rc<RefCell<ArenaState>>);

impl Economy for Wallet {
    fn add_money(&mut self, amount: u32) {
        let mut state = self.0.borrow_mut();
        state.balance = state.balance.saturating_add(amount);
    }

    fn can_afford(&self, amount: u32) -> bool {
        self.0.borrow().balance >= amount
    }

    fn spend_money(&mut self, amount: u32) -> bool {
        let mut state = self.0.borrow_mut();
        match state.balance.checked_sub(amount) {
            Some(rest) => {
                state.balance = rest;
                true
            }
            None => false,
        }
    }
}

struct Console(Rc<RefCell<ArenaState>>);

impl PhasePresenter for Console {
    fn switch_to_phase(&mut self, phase: GamePhase) {
        info!(?phase, "presenting phase");
        self.0.borrow_mut().phases.push(phase);
    }
}
