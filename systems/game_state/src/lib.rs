#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Phase state machine responsible for the top-level flow of a match.
//!
//! The manager owns the active [`GamePhase`] and only follows the transitions
//! of the phase table. Work that belongs to other systems (starting a round,
//! resetting the match after a defeat) is requested by emitting [`Command`]
//! values that the session applies in order.

use rampart_bus::{EventBus, Inbox};
use rampart_core::{
    Command, DefeatConditionMet, EventSource, GamePhase, PhaseChanged, PhasePresenter,
    VictoryConditionMet, VictoryKind,
};
use tracing::{debug, error, info, warn};

/// Reports whether the phase table allows moving from `from` to `to`.
#[must_use]
pub const fn is_transition_allowed(from: GamePhase, to: GamePhase) -> bool {
    matches!(
        (from, to),
        (GamePhase::Building, GamePhase::Combat)
            | (GamePhase::Combat, GamePhase::Pass)
            | (GamePhase::Combat, GamePhase::Victory)
            | (GamePhase::Combat, GamePhase::Defeat)
            | (GamePhase::Pass, GamePhase::Building)
    )
}

#[derive(Clone, Copy, Debug)]
enum Verdict {
    RoundWon,
    MatchWon,
    Lost,
}

/// Owns the active phase and reacts to round outcomes.
#[derive(Debug)]
pub struct GameStateManager {
    bus: EventBus,
    phase: GamePhase,
    verdicts: Inbox<Verdict>,
}

impl GameStateManager {
    /// Creates a manager in the [`GamePhase::Building`] phase.
    #[must_use]
    pub fn new(bus: &EventBus) -> Self {
        let mut verdicts = Inbox::new();
        verdicts.listen::<VictoryConditionMet, _>(bus, |_, met| {
            Some(match met.kind {
                VictoryKind::Final => Verdict::MatchWon,
                VictoryKind::Round | VictoryKind::Time => Verdict::RoundWon,
            })
        });
        verdicts.listen::<DefeatConditionMet, _>(bus, |_, _| Some(Verdict::Lost));

        Self {
            bus: bus.clone(),
            phase: GamePhase::Building,
            verdicts,
        }
    }

    /// Active phase.
    #[must_use]
    pub const fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Handles the external request to fight the next round.
    ///
    /// Emits [`Command::StartNextRound`] when the phase moved to combat.
    pub fn start_combat(
        &mut self,
        presenter: Option<&mut dyn PhasePresenter>,
        out: &mut Vec<Command>,
    ) -> bool {
        let mut presenter = presenter;
        if !self.transition(GamePhase::Combat, &mut presenter) {
            return false;
        }
        out.push(Command::StartNextRound);
        true
    }

    /// Handles the external request to leave the pass phase.
    pub fn continue_to_building(&mut self, presenter: Option<&mut dyn PhasePresenter>) -> bool {
        let mut presenter = presenter;
        self.transition(GamePhase::Building, &mut presenter)
    }

    /// Moves to `next` if the phase table allows it.
    ///
    /// Requesting the active phase is a no-op. Returns whether the phase
    /// changed.
    pub fn request_phase(
        &mut self,
        next: GamePhase,
        presenter: Option<&mut dyn PhasePresenter>,
    ) -> bool {
        let mut presenter = presenter;
        self.transition(next, &mut presenter)
    }

    /// Moves to `phase` regardless of the phase table.
    pub fn force_phase(&mut self, phase: GamePhase, presenter: Option<&mut dyn PhasePresenter>) {
        if phase == self.phase {
            debug!(?phase, "forced phase already active");
            return;
        }
        let mut presenter = presenter;
        info!(from = ?self.phase, to = ?phase, "phase forced");
        self.enter(phase, &mut presenter);
    }

    /// Applies the round outcomes published since the last call.
    ///
    /// A defeat additionally emits [`Command::ResetMatch`] followed by
    /// [`Command::ForcePhase`] back to building.
    pub fn handle_events(
        &mut self,
        presenter: Option<&mut dyn PhasePresenter>,
        out: &mut Vec<Command>,
    ) {
        let mut presenter = presenter;
        for verdict in self.verdicts.drain() {
            match verdict {
                Verdict::RoundWon => {
                    let _ = self.transition(GamePhase::Pass, &mut presenter);
                }
                Verdict::MatchWon => {
                    let _ = self.transition(GamePhase::Victory, &mut presenter);
                }
                Verdict::Lost => {
                    if self.transition(GamePhase::Defeat, &mut presenter) {
                        out.push(Command::ResetMatch);
                        out.push(Command::ForcePhase {
                            phase: GamePhase::Building,
                        });
                    }
                }
            }
        }
    }

    /// Discards outcomes that have not been handled yet.
    pub fn discard_pending(&mut self) {
        self.verdicts.clear();
    }

    fn transition(
        &mut self,
        next: GamePhase,
        presenter: &mut Option<&mut dyn PhasePresenter>,
    ) -> bool {
        if next == self.phase {
            debug!(phase = ?next, "phase already active");
            return false;
        }
        if !is_transition_allowed(self.phase, next) {
            warn!(from = ?self.phase, to = ?next, "phase transition not allowed");
            return false;
        }
        info!(from = ?self.phase, to = ?next, "phase changed");
        self.enter(next, presenter);
        true
    }

    fn enter(&mut self, next: GamePhase, presenter: &mut Option<&mut dyn PhasePresenter>) {
        let old_phase = std::mem::replace(&mut self.phase, next);
        self.bus.publish(
            EventSource::GameState,
            &PhaseChanged {
                old_phase,
                new_phase: next,
            },
        );
        match presenter {
            Some(presenter) => presenter.switch_to_phase(next),
            None => error!(phase = ?next, "no phase presenter attached; presentation not updated"),
        }
    }
}
