//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "maslow", version, about = "Maslow belt-control simulator CLI")]
pub struct Cli {
    /// Path to config TOML; the built-in default rig is used when absent
    #[arg(long, value_name = "FILE", default_value = "etc/maslow_config.toml")]
    pub config: PathBuf,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the supervisor loop against the simulated rig until Ctrl-C
    Run {
        /// Stop after this many cycles instead of running until Ctrl-C
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
        /// Print cycle statistics on exit
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
    },
    /// Run the built-in belt self-test (retract and home all four belts)
    Test,
    /// Retract one belt, or all of them, to the home position
    Retract {
        /// Belt index 0..=3; all belts when omitted
        #[arg(long, value_name = "BELT")]
        belt: Option<usize>,
    },
    /// Home one belt, or all of them, then feed out to the extend length
    Extend {
        /// Belt index 0..=3; all belts when omitted
        #[arg(long, value_name = "BELT")]
        belt: Option<usize>,
    },
    /// Home one belt and drive it to a position under closed-loop control
    MoveTo {
        /// Belt index 0..=3
        #[arg(long, value_name = "BELT", default_value_t = 0)]
        belt: usize,
        /// Target position in mm
        #[arg(long, value_name = "MM")]
        position_mm: f32,
    },
    /// Quick health check (config parses, simulated rig initializes)
    SelfCheck,
}
