//! Beam Sequencer entry point
//!
//! Headless host for the core: loads a sequence, drives the executor on a
//! fixed tick, and reports every frame. An operator console would do the
//! same through its own timer.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use env_logger::{Builder, Env};

use beam_sequencer::script;
use beam_sequencer::{BeamModel, Executor, Frame, HostCommand, RunState, SimConfig};

#[derive(Parser, Debug)]
#[command(name = "beam-sequencer")]
#[command(about = "Run an operator sequence against the simulated beam")]
struct Cli {
    /// Sequence document (JSON); runs the built-in demo cycle when omitted
    sequence: Option<PathBuf>,

    /// Simulation configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated seconds per tick (overrides the configuration)
    #[arg(long)]
    tick: Option<f64>,

    /// Sleep one tick interval between ticks
    #[arg(long)]
    realtime: bool,

    /// Print every frame as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// Stop the run after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Print the sequence document and exit
    #[arg(long)]
    dump: bool,
}

fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(tick) = cli.tick {
        config.tick_interval = tick;
        config.validate().context("invalid --tick")?;
    }

    let sequence = match &cli.sequence {
        Some(path) => script::load_sequence(path)
            .with_context(|| format!("failed to load sequence {}", path.display()))?,
        None => script::demo_sequence(),
    };

    if cli.dump {
        println!("{}", script::to_json(&sequence)?);
        return Ok(());
    }

    log::info!("Beam Sequencer starting (tick {}s)", config.tick_interval);
    let mut executor = Executor::new(BeamModel::new(&config));
    executor.load(sequence)?;
    report(&executor.start()?, 0.0, cli.json);

    let pacing = Duration::from_secs_f64(config.tick_interval);
    let mut ticks: u64 = 0;
    let last = executor.run(config.tick_interval, |frame| {
        ticks += 1;
        report(frame, ticks as f64 * config.tick_interval, cli.json);

        if cli.max_ticks.is_some_and(|max| ticks >= max) {
            log::warn!("Tick limit reached, stopping run");
            return HostCommand::Stop;
        }
        if cli.realtime {
            std::thread::sleep(pacing);
        }
        HostCommand::Continue
    })?;

    let beam = last.beam;
    log::info!(
        "Finished after {} ticks: {} | E={:.2} GeV p={:.2} GeV/c I={:.1} {}",
        ticks,
        last.run_state,
        beam.energy,
        beam.momentum(),
        beam.intensity,
        beam.status
    );

    match last.run_state {
        RunState::Completed => Ok(()),
        RunState::Failed => match last.last_error {
            Some(failure) => bail!("sequence failed: {failure}"),
            None => bail!("sequence failed"),
        },
        state => bail!("sequence ended in {state} before completing"),
    }
}

/// Emit one frame for whoever is watching
fn report(frame: &Frame, sim_time: f64, json: bool) {
    if json {
        match serde_json::to_string(frame) {
            Ok(line) => println!("{line}"),
            Err(e) => log::error!("Failed to encode frame: {e}"),
        }
        return;
    }

    log::debug!(
        "t={:.2}s step {}/{} {} | pos={:.3} E={:.2} GeV I={:.1} {}",
        sim_time,
        frame.cursor,
        frame.sequence_len,
        frame.run_state,
        frame.beam.position,
        frame.beam.energy,
        frame.beam.intensity,
        frame.beam.status
    );
}
