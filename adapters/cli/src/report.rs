//! Per-round summary assembled from bus events.

use std::{cell::RefCell, fmt::Write as _, rc::Rc, time::Duration};

use rampart_bus::{EventBus, Subscription};
use rampart_core::{
    DefeatConditionMet, RoundCompleted, RoundStarted, VictoryConditionMet, VictoryKind,
};

/// How a round ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    Won(VictoryKind),
    Lost,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RoundLine {
    round: u32,
    enemies: u32,
    verdict: Option<Verdict>,
    elapsed: Option<Duration>,
    reward: Option<u32>,
}

impl RoundLine {
    fn started(round: u32, enemies: u32) -> Self {
        Self {
            round,
            enemies,
            verdict: None,
            elapsed: None,
            reward: None,
        }
    }
}

/// Listens to a session bus and records one line per started round.
#[derive(Debug)]
pub(crate) struct Report {
    lines: Rc<RefCell<Vec<RoundLine>>>,
    _subscriptions: Vec<Subscription>,
}

impl Report {
    pub(crate) fn attach(bus: &EventBus) -> Self {
        let lines = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&lines);
        let started = bus.subscribe::<RoundStarted, _>(move |_, started| {
            let enemies = started.waves.iter().map(|wave| wave.total_enemies()).sum();
            sink.borrow_mut()
                .push(RoundLine::started(started.round_number, enemies));
            Ok(())
        });

        let sink = Rc::clone(&lines);
        let won = bus.subscribe::<VictoryConditionMet, _>(move |_, met| {
            if let Some(line) = sink.borrow_mut().last_mut() {
                line.verdict = Some(Verdict::Won(met.kind));
                line.elapsed = Some(met.stats.elapsed);
            }
            Ok(())
        });

        let sink = Rc::clone(&lines);
        let lost = bus.subscribe::<DefeatConditionMet, _>(move |_, met| {
            if let Some(line) = sink.borrow_mut().last_mut() {
                line.verdict = Some(Verdict::Lost);
                line.elapsed = Some(met.stats.elapsed);
            }
            Ok(())
        });

        let sink = Rc::clone(&lines);
        let paid = bus.subscribe::<RoundCompleted, _>(move |_, completed| {
            let mut lines = sink.borrow_mut();
            if let Some(line) = lines
                .iter_mut()
                .rev()
                .find(|line| line.round == completed.round_number)
            {
                line.reward = Some(completed.reward_money);
            }
            Ok(())
        });

        Self {
            lines,
            _subscriptions: vec![started, won, lost, paid],
        }
    }

    /// Reports whether any recorded round was lost.
    pub(crate) fn has_defeat(&self) -> bool {
        self.lines
            .borrow()
            .iter()
            .any(|line| line.verdict == Some(Verdict::Lost))
    }

    pub(crate) fn render(&self) -> String {
        render(&self.lines.borrow())
    }
}

fn render(lines: &[RoundLine]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5}  {:>7}  {:<8}  {:>8}  {:>6}",
        "round", "enemies", "outcome", "time", "reward"
    );
    for line in lines {
        let outcome = match line.verdict {
            Some(Verdict::Won(VictoryKind::Round)) => "cleared",
            Some(Verdict::Won(VictoryKind::Time)) => "survived",
            Some(Verdict::Won(VictoryKind::Final)) => "final",
            Some(Verdict::Lost) => "lost",
            None => "-",
        };
        let time = line
            .elapsed
            .map_or_else(|| "-".to_owned(), |elapsed| {
                format!("{:.1}s", elapsed.as_secs_f32())
            });
        let reward = line
            .reward
            .map_or_else(|| "-".to_owned(), |reward| reward.to_string());
        let _ = writeln!(
            out,
            "{:>5}  {:>7}  {:<8}  {:>8}  {:>6}",
            line.round, line.enemies, outcome, time, reward
        );
    }
    out
}
