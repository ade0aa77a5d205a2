//! Top-level supervisor: owns the multiplexer handle and the four belts,
//! sequences them once per tick, and bridges the host machine's jog state.
//!
//! An external scheduler calls [`Supervisor::update`] once per configured
//! cycle period; everything below runs synchronously inside that call.
//! The multiplexer is shared structurally: each encoder selects its port
//! immediately before its own bus transaction, and belt updates never
//! interleave.

use std::time::Instant;

use maslow_config::{Config, SupervisorCfg};
use maslow_traits::{
    AngleSensor, Clock, CurrentSense, HostMachine, HostState, MonotonicClock, MuxSwitch, PwmPin,
};

use crate::belt::Belt;
use crate::error::{BuildError, Result};
use crate::path::LogPath;
use crate::statemachine::{State, StateMachine};
use crate::stats::CycleStats;
use crate::status::BeltStatus;

/// Belt order: top-left, top-right, bottom-left, bottom-right.
const BELT_NAMES: [&str; 4] = ["BeltTL", "BeltTR", "BeltBL", "BeltBR"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Entrypoint,
    WaitForCommand,
    Jog,
    Test,
    Reset,
    FatalError,
}

impl State for SupervisorState {
    fn display_name(&self) -> &'static str {
        match self {
            SupervisorState::Entrypoint => "",
            SupervisorState::WaitForCommand => "WaitForCommand",
            SupervisorState::Jog => "Jog",
            SupervisorState::Test => "Test",
            SupervisorState::Reset => "Reset",
            SupervisorState::FatalError => "FatalError",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SupervisorCommands {
    reset: bool,
    test: bool,
    report_status: bool,
    report_high_water_mark: bool,
}

/// The hardware bundle backing one belt actuator.
pub struct BeltHardware {
    pub sensor: Box<dyn AngleSensor>,
    pub fwd_pin: Box<dyn PwmPin>,
    pub rev_pin: Box<dyn PwmPin>,
    pub current_sense: Box<dyn CurrentSense>,
}

pub struct Supervisor {
    path: LogPath,
    fsm: StateMachine<SupervisorState>,
    cfg: SupervisorCfg,
    mux: Box<dyn MuxSwitch>,
    belts: [Belt; 4],
    host: Box<dyn HostMachine>,
    clock: Box<dyn Clock>,
    epoch: Instant,
    stats: CycleStats,
    commands: SupervisorCommands,
    fan: bool,
}

impl core::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Supervisor").finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn builder(cfg: Config) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    /// Initialize every belt's hardware. Fails without retry; the caller
    /// must not start the control loop on error.
    pub fn init(&mut self) -> Result<()> {
        for belt in &mut self.belts {
            belt.init(self.mux.as_mut())?;
        }
        tracing::info!(path = %self.path, "initialized");
        Ok(())
    }

    /// One supervisor tick: cycle statistics, all four belts in order,
    /// aggregate outputs, one FSM step.
    pub fn update(&mut self) -> Result<()> {
        let now_us = self.clock.us_since(self.epoch);
        let budget_us = u64::from(self.cfg.ms_per_cycle) * 1_000;
        self.stats.track(now_us, budget_us, &self.path);

        for belt in &mut self.belts {
            belt.update(self.mux.as_mut())?;
        }
        self.fan = self.belts.iter().any(Belt::fan_requested);
        self.handle_reports();

        self.fsm.update();

        // Reset has priority over everything except a fatal halt.
        if self.commands.reset && !self.is_fatal() {
            self.fsm.set_state(SupervisorState::Reset);
        }
        // A host state this subsystem has no mapping for means the bridge
        // itself is broken. Halt rather than guess.
        let host_state = self.host.state();
        if host_state == HostState::Unknown && !self.is_fatal() {
            tracing::error!(path = %self.path, "unknown host machine state");
            self.fsm.set_state(SupervisorState::FatalError);
        }

        match self.fsm.state() {
            SupervisorState::Entrypoint => {
                self.fsm.set_state(SupervisorState::WaitForCommand);
            }
            SupervisorState::WaitForCommand => {
                if self.fsm.state_changed() {
                    self.commands.test = false;
                } else if self.commands.test {
                    self.commands.test = false;
                    self.fsm.set_state(SupervisorState::Test);
                } else if host_state == HostState::Jog {
                    self.fsm.set_state(SupervisorState::Jog);
                }
            }
            SupervisorState::Jog => self.jog(host_state),
            SupervisorState::Test => self.test(),
            SupervisorState::Reset => self.reset(),
            SupervisorState::FatalError => {
                if self.fsm.state_changed() {
                    tracing::error!(path = %self.path, "fatal error, belt control halted");
                    for belt in &mut self.belts {
                        belt.request_reset();
                    }
                }
            }
        }
        Ok(())
    }

    /// Closed-loop tracking of manual jog motion: periodically re-aim the
    /// tracked belt at the host's current axis position.
    fn jog(&mut self, host_state: HostState) {
        let tracked = self.cfg.jog_belt;
        if self.fsm.state_changed() {
            self.refresh_jog_target(tracked);
        } else if host_state != HostState::Jog {
            self.belts[tracked].end_move();
            self.fsm.set_state(SupervisorState::WaitForCommand);
        } else if self.fsm.time_in_state() >= self.cfg.jog_refresh_ms {
            self.refresh_jog_target(tracked);
            self.fsm.reset_time_in_state();
        }
    }

    fn refresh_jog_target(&mut self, tracked: usize) {
        let target = self.host.axis_position(tracked);
        tracing::debug!(path = %self.path, belt = tracked, target, "jog target");
        self.belts[tracked].request_move_to(target);
    }

    /// Self-test: retract all four belts and report per-belt results.
    fn test(&mut self) {
        if self.fsm.state_changed() {
            tracing::info!(path = %self.path, "belt test started");
            for belt in &mut self.belts {
                belt.request_retract();
            }
            return;
        }
        // Give the belts a couple of cycles to pick the command up.
        if self.fsm.cycles_in_state() < 3 {
            return;
        }
        if self.belts.iter().any(|b| b.status() == BeltStatus::Busy) {
            return;
        }
        for (i, belt) in self.belts.iter().enumerate() {
            if belt.status() == BeltStatus::CompletedError {
                tracing::warn!(path = %self.path, belt = i, "belt test failed");
            } else {
                tracing::info!(path = %self.path, belt = i, homed = belt.homed(), "belt test passed");
            }
        }
        self.fsm.set_state(SupervisorState::WaitForCommand);
    }

    /// Fan the reset out to every belt for one cycle.
    fn reset(&mut self) {
        for belt in &mut self.belts {
            belt.request_reset();
        }
        self.commands = SupervisorCommands::default();
        tracing::info!(path = %self.path, "reset");
        self.fsm.set_state(SupervisorState::WaitForCommand);
    }

    fn handle_reports(&mut self) {
        if self.commands.report_status {
            self.commands.report_status = false;
            for (i, belt) in self.belts.iter().enumerate() {
                tracing::info!(
                    path = %self.path,
                    belt = i,
                    state = belt.state().display_name(),
                    position = belt.position(),
                    homed = belt.homed(),
                    status = ?belt.status(),
                    "status"
                );
            }
        }
        if self.commands.report_high_water_mark {
            self.commands.report_high_water_mark = false;
            tracing::info!(
                path = %self.path,
                high_water_us = self.stats.high_water_us(),
                "cycle high-water mark"
            );
        }
    }

    fn is_fatal(&self) -> bool {
        self.fsm.state() == SupervisorState::FatalError
    }

    // Command surface.

    pub fn request_reset(&mut self) {
        self.commands.reset = true;
    }

    pub fn request_test(&mut self) {
        self.commands.test = true;
    }

    /// One-shot: log a status line per belt on the next cycle.
    pub fn request_status_report(&mut self) {
        self.commands.report_status = true;
    }

    /// One-shot: log the worst observed cycle time on the next cycle.
    pub fn request_high_water_report(&mut self) {
        self.commands.report_high_water_mark = true;
    }

    // Status surface.

    pub fn state(&self) -> SupervisorState {
        self.fsm.state()
    }

    /// OR of all belts' fan requests; drives the cooling-fan output.
    pub fn fan_requested(&self) -> bool {
        self.fan
    }

    pub fn belt(&self, index: usize) -> &Belt {
        &self.belts[index]
    }

    pub fn belt_mut(&mut self, index: usize) -> &mut Belt {
        &mut self.belts[index]
    }

    pub fn ms_per_cycle(&self) -> u16 {
        self.cfg.ms_per_cycle
    }

    /// Worst observed cycle time since startup, in microseconds.
    pub fn high_water_us(&self) -> u64 {
        self.stats.high_water_us()
    }
}

/// Assembles a [`Supervisor`] from a validated [`Config`] and the hardware
/// handles, real or simulated.
pub struct SupervisorBuilder {
    cfg: Config,
    mux: Option<Box<dyn MuxSwitch>>,
    host: Option<Box<dyn HostMachine>>,
    clock: Option<Box<dyn Clock>>,
    belts: Vec<BeltHardware>,
}

impl SupervisorBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            mux: None,
            host: None,
            clock: None,
            belts: Vec::new(),
        }
    }

    pub fn mux(mut self, mux: Box<dyn MuxSwitch>) -> Self {
        self.mux = Some(mux);
        self
    }

    pub fn host(mut self, host: Box<dyn HostMachine>) -> Self {
        self.host = Some(host);
        self
    }

    /// Override the cycle-statistics clock; defaults to the monotonic
    /// system clock.
    pub fn clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Append one belt's hardware; call exactly four times, in belt order.
    pub fn belt(mut self, hardware: BeltHardware) -> Self {
        self.belts.push(hardware);
        self
    }

    pub fn build(self) -> std::result::Result<Supervisor, BuildError> {
        let mux = self.mux.ok_or(BuildError::MissingMux)?;
        let host = self.host.ok_or(BuildError::MissingHost)?;
        if self.belts.len() != 4 {
            return Err(BuildError::MissingBelts);
        }
        if self.cfg.belts.len() != 4 {
            return Err(BuildError::InvalidConfig(
                "config must define exactly 4 belts",
            ));
        }

        let ms_per_cycle = self.cfg.supervisor.ms_per_cycle;
        let path = LogPath::root("Maslow");
        let fsm_path = path.as_str().to_string();
        let fsm = StateMachine::with_log(SupervisorState::Entrypoint, ms_per_cycle, move |state| {
            tracing::info!(path = %fsm_path, state, "state change");
        });

        let belts: Vec<Belt> = self
            .belts
            .into_iter()
            .zip(&self.cfg.belts)
            .zip(BELT_NAMES)
            .map(|((hw, belt_cfg), name)| {
                Belt::new(
                    name,
                    belt_cfg,
                    ms_per_cycle,
                    &path,
                    hw.sensor,
                    hw.fwd_pin,
                    hw.rev_pin,
                    hw.current_sense,
                )
            })
            .collect();
        let belts: [Belt; 4] = belts.try_into().map_err(|_| BuildError::MissingBelts)?;

        let clock = self.clock.unwrap_or_else(|| Box::new(MonotonicClock::new()));
        let epoch = clock.now();
        let stats = CycleStats::new(self.cfg.supervisor.cycle_report_interval_ms);
        Ok(Supervisor {
            path,
            fsm,
            cfg: self.cfg.supervisor,
            mux,
            belts,
            host,
            clock,
            epoch,
            stats,
            commands: SupervisorCommands::default(),
            fan: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{NoopMux, RecordingPwmPin, ScriptedAngleSensor, ScriptedCurrentSense, ScriptedHost};

    fn belt_hardware() -> BeltHardware {
        let (sensor, _) = ScriptedAngleSensor::new();
        let (fwd, _) = RecordingPwmPin::new(1023);
        let (rev, _) = RecordingPwmPin::new(1023);
        let (sense, _) = ScriptedCurrentSense::new();
        BeltHardware {
            sensor: Box::new(sensor),
            fwd_pin: Box::new(fwd),
            rev_pin: Box::new(rev),
            current_sense: Box::new(sense),
        }
    }

    fn supervisor(host: ScriptedHost) -> Supervisor {
        let mut builder = Supervisor::builder(Config::default_rig())
            .mux(Box::new(NoopMux))
            .host(Box::new(host));
        for _ in 0..4 {
            builder = builder.belt(belt_hardware());
        }
        let mut sup = builder.build().unwrap();
        sup.init().unwrap();
        sup
    }

    #[test]
    fn build_requires_mux_host_and_four_belts() {
        let err = Supervisor::builder(Config::default_rig())
            .host(Box::new(ScriptedHost::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingMux));

        let err = Supervisor::builder(Config::default_rig())
            .mux(Box::new(NoopMux))
            .host(Box::new(ScriptedHost::new()))
            .belt(belt_hardware())
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingBelts));
    }

    #[test]
    fn settles_into_wait_for_command() {
        let mut sup = supervisor(ScriptedHost::new());
        for _ in 0..3 {
            sup.update().unwrap();
        }
        assert_eq!(sup.state(), SupervisorState::WaitForCommand);
        assert!(!sup.fan_requested());
    }

    #[test]
    fn unknown_host_state_is_fatal_and_terminal() {
        let host = ScriptedHost::new();
        let state = host.state.clone();
        let mut sup = supervisor(host);
        for _ in 0..3 {
            sup.update().unwrap();
        }
        state.set(maslow_traits::HostState::Unknown);
        sup.update().unwrap();
        assert_eq!(sup.state(), SupervisorState::FatalError);

        // Not even a reset leaves the fatal state.
        state.set(maslow_traits::HostState::Idle);
        sup.request_reset();
        for _ in 0..5 {
            sup.update().unwrap();
        }
        assert_eq!(sup.state(), SupervisorState::FatalError);
    }

    #[test]
    fn cycle_stats_follow_the_injected_clock() {
        let clock = maslow_traits::TestClock::new();
        let mut cfg = Config::default_rig();
        cfg.supervisor.cycle_report_interval_ms = 10;
        let mut builder = Supervisor::builder(cfg)
            .mux(Box::new(NoopMux))
            .host(Box::new(ScriptedHost::new()))
            .clock(Box::new(clock.clone()));
        for _ in 0..4 {
            builder = builder.belt(belt_hardware());
        }
        let mut sup = builder.build().unwrap();
        sup.init().unwrap();

        // First update only arms the cycle-time baseline.
        sup.update().unwrap();
        assert_eq!(sup.high_water_us(), 0);

        clock.advance(std::time::Duration::from_millis(5));
        sup.update().unwrap();
        assert_eq!(sup.high_water_us(), 5_000);

        // 9ms is past the 6.25ms tolerance band, so this cycle drives the
        // overrun warning inside the interval report; the report then
        // resets the interval counters but not the high-water mark.
        clock.advance(std::time::Duration::from_millis(9));
        sup.update().unwrap();
        clock.advance(std::time::Duration::from_millis(5));
        sup.update().unwrap();
        assert_eq!(sup.high_water_us(), 9_000);
    }

    #[test]
    fn reset_fans_out_to_every_belt() {
        let mut sup = supervisor(ScriptedHost::new());
        for _ in 0..3 {
            sup.update().unwrap();
        }
        for i in 0..4 {
            sup.belt_mut(i).request_retract();
        }
        for _ in 0..3 {
            sup.update().unwrap();
        }
        sup.request_reset();
        for _ in 0..3 {
            sup.update().unwrap();
        }
        assert_eq!(sup.state(), SupervisorState::WaitForCommand);
        for i in 0..4 {
            assert_eq!(sup.belt(i).status(), crate::BeltStatus::Idle);
            assert_eq!(sup.belt(i).duty(), 0.0);
        }
    }
}
