//! Maslow belt-control CLI: drives the supervisor loop against the
//! simulated rig.

mod cli;
mod error_fmt;
mod rig;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use maslow_config::Config;
use maslow_core::{BeltStatus, MaslowError, SupervisorState};
use maslow_traits::{Clock, MonotonicClock};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error_fmt::{exit_code_for_error, humanize};
use rig::SimRig;

/// Upper bound for the unpaced batch commands so a wedged simulation can
/// never hang the process.
const BATCH_CYCLE_CAP: u64 = 100_000;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}", humanize(&e));
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();
    init_logging(&args.log_level)?;

    let cfg = load_config(&args)?;
    let ms_per_cycle = cfg.supervisor.ms_per_cycle;

    let mut rig = SimRig::build(cfg).map_err(eyre::Report::new)?;
    rig.supervisor.init().wrap_err("initializing the rig")?;
    // Let every state machine settle into WaitForCommand so the first
    // command is not swept up by the state-entry flag clearing.
    for _ in 0..3 {
        rig.step()?;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .wrap_err("installing Ctrl-C handler")?;
    }

    match args.cmd {
        Commands::Run { cycles, stats } => run_paced(&mut rig, &shutdown, cycles, stats, ms_per_cycle),
        Commands::Test => self_test(&mut rig, &shutdown),
        Commands::Retract { belt } => retract(&mut rig, &shutdown, belt),
        Commands::Extend { belt } => extend(&mut rig, &shutdown, belt),
        Commands::MoveTo { belt, position_mm } => move_to(&mut rig, &shutdown, belt, position_mm),
        Commands::SelfCheck => {
            println!("self-check ok: config valid, simulated rig initialized");
            Ok(())
        }
    }
}

fn init_logging(level: &str) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

fn load_config(args: &Cli) -> eyre::Result<Config> {
    let cfg = if args.config.exists() {
        let text = std::fs::read_to_string(&args.config)
            .wrap_err_with(|| format!("reading {}", args.config.display()))?;
        maslow_config::load_toml(&text)
            .map_err(|e| eyre::Report::new(MaslowError::Config(e.to_string())))?
    } else {
        tracing::info!(path = %args.config.display(), "config file not found, using default rig");
        Config::default_rig()
    };
    cfg.validate()
        .map_err(|e| eyre::Report::new(MaslowError::Config(e.to_string())))?;
    Ok(cfg)
}

/// Real-time loop: one cycle per configured period, until Ctrl-C or the
/// requested cycle count.
fn run_paced(
    rig: &mut SimRig,
    shutdown: &AtomicBool,
    cycles: Option<u64>,
    stats: bool,
    ms_per_cycle: u16,
) -> eyre::Result<()> {
    let clock = MonotonicClock::new();
    let start = clock.now();
    let period = Duration::from_millis(u64::from(ms_per_cycle));
    let mut elapsed = 0u64;
    while !shutdown.load(Ordering::SeqCst) && cycles.is_none_or(|n| elapsed < n) {
        rig.step()?;
        clock.sleep(period);
        elapsed += 1;
    }
    if stats {
        rig.supervisor.request_high_water_report();
        rig.supervisor.request_status_report();
        rig.step()?;
    }
    tracing::info!(cycles = elapsed, elapsed_ms = clock.ms_since(start), "run finished");
    Ok(())
}

/// Run cycles as fast as possible until `done` or the cycle cap.
fn run_until(
    rig: &mut SimRig,
    shutdown: &AtomicBool,
    done: impl Fn(&SimRig) -> bool,
) -> eyre::Result<()> {
    for _ in 0..BATCH_CYCLE_CAP {
        if shutdown.load(Ordering::SeqCst) || done(rig) {
            return Ok(());
        }
        rig.step()?;
    }
    eyre::bail!("simulation did not settle within {BATCH_CYCLE_CAP} cycles")
}

fn self_test(rig: &mut SimRig, shutdown: &AtomicBool) -> eyre::Result<()> {
    rig.supervisor.request_test();
    run_until(rig, shutdown, |r| {
        r.supervisor.state() == SupervisorState::Test
    })?;
    run_until(rig, shutdown, |r| {
        r.supervisor.state() == SupervisorState::WaitForCommand
    })?;

    let mut failed = false;
    for i in 0..4 {
        let belt = rig.supervisor.belt(i);
        println!(
            "belt {i}: homed={} position={:.2}mm status={:?}",
            belt.homed(),
            belt.position(),
            belt.status()
        );
        failed |= belt.status() == BeltStatus::CompletedError;
    }
    if failed {
        eyre::bail!("belt test failed, see log for the faulted belt");
    }
    println!("belt test passed");
    Ok(())
}

fn retract(rig: &mut SimRig, shutdown: &AtomicBool, belt: Option<usize>) -> eyre::Result<()> {
    let selected: Vec<usize> = match belt {
        Some(i) if i < 4 => vec![i],
        Some(i) => eyre::bail!("belt index {i} out of range (0..=3)"),
        None => (0..4).collect(),
    };
    for &i in &selected {
        rig.supervisor.belt_mut(i).request_retract();
    }
    // Let the belts pick the command up before polling for completion.
    for _ in 0..3 {
        rig.step()?;
    }
    run_until(rig, shutdown, |r| {
        selected.iter().all(|&i| r.supervisor.belt(i).status() != BeltStatus::Busy)
    })?;
    for &i in &selected {
        let b = rig.supervisor.belt(i);
        println!("belt {i}: homed={} position={:.2}mm", b.homed(), b.position());
        if b.status() == BeltStatus::CompletedError {
            eyre::bail!("belt {i} faulted while retracting");
        }
    }
    Ok(())
}

fn extend(rig: &mut SimRig, shutdown: &AtomicBool, belt: Option<usize>) -> eyre::Result<()> {
    // Extending requires a home reference, so retract first.
    retract(rig, shutdown, belt)?;

    let selected: Vec<usize> = match belt {
        Some(i) => vec![i],
        None => (0..4).collect(),
    };
    for &i in &selected {
        rig.supervisor.belt_mut(i).request_extend();
    }
    for _ in 0..3 {
        rig.step()?;
    }
    run_until(rig, shutdown, |r| {
        selected.iter().all(|&i| r.supervisor.belt(i).status() != BeltStatus::Busy)
    })?;
    for &i in &selected {
        let b = rig.supervisor.belt(i);
        println!("belt {i}: position={:.2}mm", b.position());
        if b.status() == BeltStatus::CompletedError {
            eyre::bail!("belt {i} faulted while extending");
        }
    }
    Ok(())
}

fn move_to(
    rig: &mut SimRig,
    shutdown: &AtomicBool,
    belt: usize,
    position_mm: f32,
) -> eyre::Result<()> {
    if belt >= 4 {
        eyre::bail!("belt index {belt} out of range (0..=3)");
    }
    retract(rig, shutdown, Some(belt))?;

    rig.supervisor.belt_mut(belt).request_move_to(position_mm);
    run_until(rig, shutdown, |r| {
        (r.supervisor.belt(belt).position() - position_mm).abs() < 0.5
            || r.supervisor.belt(belt).status() == BeltStatus::CompletedError
    })?;
    if rig.supervisor.belt(belt).status() == BeltStatus::CompletedError {
        eyre::bail!("belt {belt} faulted while moving");
    }
    rig.supervisor.belt_mut(belt).end_move();
    for _ in 0..3 {
        rig.step()?;
    }
    println!(
        "belt {belt}: position={:.2}mm",
        rig.supervisor.belt(belt).position()
    );
    Ok(())
}
