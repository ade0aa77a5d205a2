#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Real-time control core for the Maslow four-belt CNC robot arm.
//!
//! All hardware interactions go through the `maslow_traits` traits
//! (`AngleSensor`, `PwmPin`, `CurrentSense`, `MuxSwitch`, `HostMachine`),
//! so the whole control loop runs unchanged against simulated hardware.
//!
//! ## Architecture
//!
//! - **State machines**: one generic cyclic engine (`statemachine` module)
//!   drives both the per-belt and the supervisor protocols
//! - **Encoder**: AS5600 cumulative ticks → signed mm position + velocity
//! - **Motor**: ramped duty actuation with brake-through-zero, filtered
//!   current sensing and overcurrent flags (`motor` module)
//! - **Belt**: closed-loop retract/extend/move-to-target with direction
//!   and stall fault detection (`belt` module)
//! - **Supervisor**: sequences the four belts, bridges the host machine's
//!   jog state, aggregates fan requests (`supervisor` module)
//!
//! ## Timing model
//!
//! Single-threaded and cycle-driven: an external scheduler calls
//! [`Supervisor::update`] once per fixed period. Nothing in this crate
//! blocks or sleeps; every timeout is a cycles-in-state count multiplied
//! by the configured cycle period.

pub mod belt;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod hw_error;
pub mod mocks;
pub mod motor;
pub mod path;
pub mod pid;
pub mod statemachine;
pub mod stats;
pub mod status;
pub mod supervisor;

pub use belt::{Belt, BeltCommands, BeltState};
pub use encoder::Encoder;
pub use error::{BuildError, MaslowError, Result};
pub use filter::RollingAverage;
pub use motor::HBridgeMotor;
pub use path::LogPath;
pub use pid::Pid;
pub use statemachine::{State, StateMachine};
pub use stats::CycleStats;
pub use status::BeltStatus;
pub use supervisor::{BeltHardware, Supervisor, SupervisorBuilder, SupervisorState};
