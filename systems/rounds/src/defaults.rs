//! Fallback round sequence and validation of supplied round lists.

use std::{num::NonZeroU32, time::Duration};

use rampart_core::{EnemyKind, EnemySpawnInfo, RoundConfig, Wave};
use thiserror::Error;

/// Number of rounds synthesized when no round list is supplied.
pub const DEFAULT_ROUND_COUNT: u32 = 10;

const OPENING_DELAY: Duration = Duration::from_secs(2);
const BETWEEN_WAVES_DELAY: Duration = Duration::from_secs(5);
const BASE_REWARD: u32 = 100;
const REWARD_STEP: u32 = 25;

/// Reasons a supplied round list is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoundConfigError {
    /// The list contains no rounds.
    #[error("round list is empty")]
    Empty,
    /// A round number appears more than once.
    #[error("round {round} is configured more than once")]
    Duplicate {
        /// Repeated round number.
        round: u32,
    },
    /// Rounds are not numbered 1..=N in list order.
    #[error("round at position {position} is numbered {found}, expected {expected}")]
    OutOfSequence {
        /// Zero-based position in the list.
        position: usize,
        /// Number the round should carry.
        expected: u32,
        /// Number the round carries.
        found: u32,
    },
}

/// Checks that `rounds` is non-empty and numbered contiguously from one.
pub fn validate_rounds(rounds: &[RoundConfig]) -> Result<(), RoundConfigError> {
    if rounds.is_empty() {
        return Err(RoundConfigError::Empty);
    }

    for (position, round) in rounds.iter().enumerate() {
        let expected = u32::try_from(position + 1).unwrap_or(u32::MAX);
        let found = round.round_number();
        if found == expected {
            continue;
        }
        if rounds[..position]
            .iter()
            .any(|earlier| earlier.round_number() == found)
        {
            return Err(RoundConfigError::Duplicate { round: found });
        }
        return Err(RoundConfigError::OutOfSequence {
            position,
            expected,
            found,
        });
    }

    Ok(())
}

/// Synthesizes `count` rounds of ascending difficulty.
///
/// Wave count and enemy count both grow with the round number, and later
/// rounds introduce tougher kinds.
#[must_use]
pub fn default_rounds(count: u32) -> Vec<RoundConfig> {
    (1..=count).map(default_round).collect()
}

fn default_round(round_number: u32) -> RoundConfig {
    let wave_count = 1 + (round_number - 1) / 3;
    let waves = (0..wave_count)
        .map(|index| {
            let delay = if index == 0 {
                OPENING_DELAY
            } else {
                BETWEEN_WAVES_DELAY
            };
            let enemies = [
                spawn_info("Grunt", 2 + round_number),
                spawn_info("Runner", round_number / 2),
                spawn_info("Brute", (round_number - 1) / 3),
            ]
            .into_iter()
            .flatten()
            .collect();
            Wave::new(delay, enemies)
        })
        .collect();

    let reward = BASE_REWARD.saturating_add(REWARD_STEP.saturating_mul(round_number - 1));
    RoundConfig::new(round_number, waves, reward)
}

fn spawn_info(kind: &str, count: u32) -> Option<EnemySpawnInfo> {
    NonZeroU32::new(count).map(|count| EnemySpawnInfo::new(EnemyKind::new(kind), count))
}
