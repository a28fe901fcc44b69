//! Command-line driver: run a system file and print complex counts.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use log::info;
use sink::complex::complex_census;
use sink::system::DEFAULT_DEADLOCK_CRITERIA;
use sink::{EventOutcome, SimulationConfig, SimulationEngine};
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "sink", about = "Stochastic simulation of Kappa rule systems", version)]
#[command(group(ArgGroup::new("limit").required(true).args(["time", "steps"])))]
struct Cli {
    /// Simulated time to run for; accepts an `s`, `m`, `h` or `d` suffix
    #[arg(short = 't', long, value_parser = parse_duration)]
    time: Option<f64>,

    /// Number of events to run
    #[arg(short = 'n', long)]
    steps: Option<u64>,

    /// Print the census every this many iterations
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    rpd: u64,

    /// Seed for the event generator
    #[arg(long)]
    seed: Option<u64>,

    /// Consecutive void events tolerated before giving up
    #[arg(long, default_value_t = DEFAULT_DEADLOCK_CRITERIA)]
    deadlock: usize,

    /// System description file
    file: PathBuf,
}

/// Seconds in a duration such as `90`, `1.5m` or `2d`.
fn parse_duration(text: &str) -> Result<f64, String> {
    let text = text.trim();
    let (number, scale) = match text.char_indices().last() {
        Some((i, 's')) => (&text[..i], 1.0),
        Some((i, 'm')) => (&text[..i], 60.0),
        Some((i, 'h')) => (&text[..i], 3600.0),
        Some((i, 'd')) => (&text[..i], 86400.0),
        _ => (text, 1.0),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration `{}`", text))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid duration `{}`", text));
    }
    Ok(value * scale)
}

fn census_line<R: rand::Rng>(iteration: u64, engine: &SimulationEngine<R>) -> Result<String> {
    let census = complex_census(engine.mixture())?;
    let counts: Vec<String> = census
        .iter()
        .map(|(complex, n)| format!("{} -> {}", complex, n))
        .collect();
    Ok(format!(
        "iteration {}: {} (t = {})",
        iteration,
        counts.join(", "),
        engine.time()
    ))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let text = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("reading {}", cli.file.display()))?;
    let config = SimulationConfig {
        deadlock_criteria: cli.deadlock,
        seed: cli.seed,
    };
    let mut engine = SimulationEngine::from_description(&text, config)
        .with_context(|| format!("loading {}", cli.file.display()))?;
    info!(
        "loaded {} agents and {} rules from {}",
        engine.mixture().len(),
        engine.rules().len(),
        cli.file.display()
    );

    let stdout = std::io::stdout();
    let iterations = run(&mut engine, cli.steps, cli.time, cli.rpd, &mut stdout.lock())?;
    info!("stopped after {} iterations at t = {}", iterations, engine.time());
    Ok(())
}

/// Iterates until the step or time limit or until no rule can fire, printing
/// the census every `rpd` iterations. Returns the number of iterations run.
fn run<R: rand::Rng>(
    engine: &mut SimulationEngine<R>,
    steps: Option<u64>,
    time: Option<f64>,
    rpd: u64,
    out: &mut impl Write,
) -> Result<u64> {
    let mut i: u64 = 0;
    let mut printed = None;
    loop {
        let done = match (steps, time) {
            (Some(steps), _) => i >= steps,
            (None, Some(limit)) => engine.time() >= limit,
            (None, None) => true,
        };
        if done {
            break;
        }
        if i % rpd == 0 {
            writeln!(out, "{}", census_line(i, engine)?)?;
            printed = Some(i);
        }
        if engine.iterate()? == EventOutcome::NoEvent {
            info!("no rule can fire at t = {}", engine.time());
            break;
        }
        i += 1;
    }
    // Running dry leaves `i` on the line already printed.
    if i % rpd == 0 && printed != Some(i) {
        writeln!(out, "{}", census_line(i, engine)?)?;
    }
    Ok(i)
}
