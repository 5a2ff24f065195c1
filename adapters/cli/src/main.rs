#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays a scripted, headless Rampart match.
//!
//! Enemies die a fixed time after they spawn, the defended structure can be
//! knocked down at a chosen moment, and the player starts every round as soon
//! as the building phase opens. A per-round summary is printed at the end.

mod arena;
mod report;

use std::{path::PathBuf, time::Duration};

use anyhow::{ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use rampart_core::{Command, Economy, GamePhase, WELCOME_BANNER};
use rampart_session::{apply, load_match_config, query, MatchConfig, Session};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{arena::Arena, report::Report};

/// Price of the defence bought at the start of every building phase.
const DEFENCE_COST: u32 = 75;

#[derive(Debug, Parser)]
#[command(name = "rampart", version, about = "Headless Rampart match runner")]
struct Cli {
    /// Log filter directive; overrides RUST_LOG.
    #[arg(long, global = true)]
    log: Option<String>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Plays a scripted match and prints a per-round summary.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// TOML match configuration; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the spawner seed of the configuration.
    #[arg(long)]
    seed: Option<u64>,
    /// Simulated milliseconds per tick.
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,
    /// Simulated seconds after which the run is abandoned.
    #[arg(long, default_value_t = 900)]
    max_seconds: u64,
    /// Milliseconds an enemy survives before it is reported dead.
    #[arg(long, default_value_t = 1_500)]
    kill_after_ms: u64,
    /// Simulated second at which the defended structure falls.
    #[arg(long)]
    structure_dies_at_s: Option<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref())?;

    match cli.command {
        CliCommand::Run(args) => run(&args),
    }
}

fn init_tracing(directive: Option<&str>) -> Result<()> {
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter `{directive}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

fn match_config(args: &RunArgs) -> Result<MatchConfig> {
    let mut config = match &args.config {
        Some(path) => load_match_config(path)
            .with_context(|| format!("failed to load match config {}", path.display()))?,
        None => MatchConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.spawner.seed = seed;
    }
    Ok(config)
}

fn run(args: &RunArgs) -> Result<()> {
    let tick = Duration::from_millis(args.tick_ms);
    ensure!(!tick.is_zero(), "--tick-ms must be positive");
    let limit = Duration::from_secs(args.max_seconds);
    let lifetime = Duration::from_millis(args.kill_after_ms);
    let collapse_at = args
        .structure_dies_at_s
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("--structure-dies-at-s must be a non-negative number of seconds")?;

    let config = match_config(args)?;
    let arena = Arena::default();
    let mut session = Session::new(config, arena.collaborators());
    let report = Report::attach(session.bus());
    let mut wallet = arena.wallet();

    println!("{WELCOME_BANNER}");
    info!(
        tick_ms = args.tick_ms,
        rounds = query::rounds(&session).len(),
        "match started"
    );

    while query::clock(&session) < limit {
        match query::phase(&session) {
            GamePhase::Building => {
                if wallet.can_afford(DEFENCE_COST) && wallet.spend_money(DEFENCE_COST) {
                    info!(
                        cost = DEFENCE_COST,
                        balance = arena.balance(),
                        "defence purchased"
                    );
                }
                apply(&mut session, Command::StartCombat);
            }
            GamePhase::Pass => apply(&mut session, Command::Continue),
            GamePhase::Victory => break,
            GamePhase::Combat | GamePhase::Defeat => {}
        }

        arena.advance(tick);
        apply(&mut session, Command::Tick { dt: tick });
        for enemy in arena.take_expired(lifetime) {
            apply(&mut session, Command::ReportEnemyDeath { enemy });
        }
        if collapse_at.is_some_and(|at| query::clock(&session) >= at) {
            arena.destroy_structure();
        }

        for phase in arena.take_phases() {
            println!("[{:>7.2}s] {phase:?}", query::clock(&session).as_secs_f32());
        }
        if report.has_defeat() {
            break;
        }
    }

    print!("{}", report.render());
    let phase = query::phase(&session);
    println!(
        "phase {phase:?} after {:.1}s, {} enemies spawned, balance {}, structure {}",
        query::clock(&session).as_secs_f32(),
        arena.spawned(),
        arena.balance(),
        if arena.is_structure_standing() {
            "standing"
        } else {
            "destroyed"
        }
    );

    if phase != GamePhase::Victory && !report.has_defeat() {
        warn!(limit_secs = args.max_seconds, "match not decided before the time limit");
    }
    Ok(())
}
