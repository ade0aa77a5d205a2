//! Per-belt controller: one encoder plus one motor under a closed-loop
//! state machine.
//!
//! The belt exposes edge-triggered command flags (`retract`, `extend`,
//! `move_to_target`, `reset`) and runs one FSM step per `update()` call.
//! Retract homes the belt against its mechanical stop by watching motor
//! current; extend feeds belt out while a human takes up the slack; move
//! holds a target position under PID. Direction-mismatch and stall
//! heuristics run every cycle before the FSM switch, and a pending
//! `reset` overrides everything.

use maslow_config::{BeltCfg, BeltControlCfg};
use maslow_traits::{AngleSensor, CurrentSense, MuxSwitch, PwmPin};

use crate::encoder::Encoder;
use crate::error::Result;
use crate::motor::HBridgeMotor;
use crate::path::LogPath;
use crate::pid::Pid;
use crate::statemachine::{State, StateMachine};
use crate::status::BeltStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeltState {
    Entrypoint,
    WaitForCommand,
    Retract,
    StartExtend,
    Extending,
    PauseExtend,
    MoveToTarget,
    Reset,
    Error,
    /// Reachable only through a transition-table bug.
    Undefined,
}

impl State for BeltState {
    fn display_name(&self) -> &'static str {
        match self {
            // Transient; not worth a log line.
            BeltState::Entrypoint => "",
            BeltState::WaitForCommand => "WaitForCommand",
            BeltState::Retract => "Retract",
            BeltState::StartExtend => "StartExtend",
            BeltState::Extending => "Extending",
            BeltState::PauseExtend => "PauseExtend",
            BeltState::MoveToTarget => "MoveToTarget",
            BeltState::Reset => "Reset",
            BeltState::Error => "Error",
            BeltState::Undefined => "Undefined",
        }
    }
}

/// Edge-triggered command flags. All but `reset` are cleared on entry to
/// `WaitForCommand`; `reset` is cleared only by the reset itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct BeltCommands {
    pub retract: bool,
    pub extend: bool,
    pub move_to_target: bool,
    pub reset: bool,
}

pub struct Belt {
    path: LogPath,
    fsm: StateMachine<BeltState>,
    encoder: Encoder,
    motor: HBridgeMotor,
    cfg: BeltControlCfg,
    pid: Pid,
    cycle_s: f32,

    commands: BeltCommands,
    target_position: f32,
    homed: bool,
    status: BeltStatus,

    velocity: f32,
    direction_error_count: u16,
    stall_error_count: u16,

    retract_settling: bool,
    extend_last_position: f32,
    extend_no_advance_cycles: u16,
    pause_coasting: bool,
}

impl Belt {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        cfg: &BeltCfg,
        ms_per_cycle: u16,
        parent: &LogPath,
        sensor: Box<dyn AngleSensor>,
        fwd_pin: Box<dyn PwmPin>,
        rev_pin: Box<dyn PwmPin>,
        current_sense: Box<dyn CurrentSense>,
    ) -> Self {
        let path = parent.child(name);
        let fsm_path = path.as_str().to_string();
        let fsm = StateMachine::with_log(BeltState::Entrypoint, ms_per_cycle, move |state| {
            tracing::info!(path = %fsm_path, state, "state change");
        });
        let encoder = Encoder::new(sensor, &cfg.encoder, &path);
        let motor = HBridgeMotor::new(
            fwd_pin,
            rev_pin,
            current_sense,
            &cfg.motor,
            ms_per_cycle,
            &path,
        );
        let control = cfg.control.clone();
        let pid = Pid::new(control.kp, control.ki, control.kd)
            .with_output_limits(-1.0 + control.min_duty, 1.0 - control.min_duty);
        Self {
            path,
            fsm,
            encoder,
            motor,
            cfg: control,
            pid,
            cycle_s: f32::from(ms_per_cycle) / 1_000.0,
            commands: BeltCommands::default(),
            target_position: 0.0,
            homed: false,
            status: BeltStatus::Idle,
            velocity: 0.0,
            direction_error_count: 0,
            stall_error_count: 0,
            retract_settling: false,
            extend_last_position: 0.0,
            extend_no_advance_cycles: 0,
            pause_coasting: false,
        }
    }

    pub fn init(&mut self, mux: &mut dyn MuxSwitch) -> Result<()> {
        self.encoder.init(mux)?;
        self.motor.init()
    }

    /// One control cycle: sensor updates, fault checks, one FSM step.
    pub fn update(&mut self, mux: &mut dyn MuxSwitch) -> Result<()> {
        self.encoder.update(mux)?;
        self.motor.update()?;
        self.velocity = self.encoder.velocity(self.cycle_s);

        self.fsm.update();
        self.check_direction();
        self.check_stall();
        self.check_overcurrent();

        // Reset overrides every state, including Error.
        if self.commands.reset && self.fsm.state() != BeltState::Reset {
            self.fsm.set_state(BeltState::Reset);
        }

        match self.fsm.state() {
            BeltState::Entrypoint => {
                self.fsm.set_state(BeltState::WaitForCommand);
            }
            BeltState::WaitForCommand => self.wait_for_command(),
            BeltState::Retract => self.retract()?,
            BeltState::StartExtend => self.start_extend()?,
            BeltState::Extending => self.extending()?,
            BeltState::PauseExtend => self.pause_extend()?,
            BeltState::MoveToTarget => self.move_to_target()?,
            BeltState::Reset => self.reset()?,
            BeltState::Error => {}
            BeltState::Undefined => {
                if self.fsm.state_changed() {
                    tracing::error!(path = %self.path, "undefined state reached");
                    self.motor.stop(false)?;
                    self.status = BeltStatus::CompletedError;
                }
            }
        }
        Ok(())
    }

    fn wait_for_command(&mut self) {
        if self.fsm.state_changed() {
            self.commands.retract = false;
            self.commands.extend = false;
            self.commands.move_to_target = false;
            return;
        }
        if self.commands.retract {
            self.status = BeltStatus::Busy;
            self.retract_settling = false;
            self.fsm.set_state(BeltState::Retract);
        } else if self.commands.extend {
            self.status = BeltStatus::Busy;
            self.fsm.set_state(BeltState::StartExtend);
        } else if self.commands.move_to_target {
            self.status = BeltStatus::Busy;
            self.fsm.set_state(BeltState::MoveToTarget);
        }
    }

    /// Drive toward the stop until current rises, settle, re-zero.
    fn retract(&mut self) -> Result<()> {
        if self.fsm.state_changed() {
            self.retract_settling = false;
            self.motor.set_duty(-self.cfg.retract_duty);
            return Ok(());
        }
        if self.retract_settling {
            if self.fsm.time_in_state() >= self.cfg.retract_settle_ms {
                self.encoder.set_position(0.0);
                self.homed = true;
                self.status = BeltStatus::CompletedSuccess;
                tracing::info!(path = %self.path, "homed");
                self.fsm.set_state(BeltState::WaitForCommand);
            }
        } else if self.motor.current() > self.cfg.retract_current_a {
            self.motor.stop(false)?;
            self.retract_settling = true;
            self.fsm.reset_time_in_state();
        }
        Ok(())
    }

    fn start_extend(&mut self) -> Result<()> {
        if self.fsm.state_changed() {
            if !self.homed {
                tracing::warn!(path = %self.path, "extend refused, belt is not homed");
                self.status = BeltStatus::CompletedError;
                self.fsm.set_state(BeltState::WaitForCommand);
                return Ok(());
            }
            // Full dwell at extend duty to break static friction.
            self.motor.set_duty(self.cfg.extend_duty);
            return Ok(());
        }
        if self.fsm.time_in_state() >= self.cfg.extend_min_dwell_ms {
            self.fsm.set_state(BeltState::Extending);
        }
        Ok(())
    }

    /// Feed belt out while something keeps taking it up; pause when the
    /// position stops advancing, finish at the configured length.
    fn extending(&mut self) -> Result<()> {
        if self.fsm.state_changed() {
            self.extend_last_position = self.encoder.position();
            self.extend_no_advance_cycles = 0;
            self.motor.set_duty(self.cfg.extend_duty);
            return Ok(());
        }
        let position = self.encoder.position();
        if position >= self.cfg.extend_length_mm {
            self.motor.stop(false)?;
            self.status = BeltStatus::CompletedSuccess;
            tracing::info!(path = %self.path, position, "extend complete");
            self.fsm.set_state(BeltState::WaitForCommand);
            return Ok(());
        }
        if position - self.extend_last_position >= self.cfg.extend_advance_epsilon_mm {
            self.extend_last_position = position;
            self.extend_no_advance_cycles = 0;
        } else {
            self.extend_no_advance_cycles += 1;
            if self.extend_no_advance_cycles >= self.cfg.extend_stall_cycles {
                self.pause_coasting = false;
                self.fsm.set_state(BeltState::PauseExtend);
            }
        }
        Ok(())
    }

    /// Brake briefly, then coast so the belt can be pulled by hand.
    fn pause_extend(&mut self) -> Result<()> {
        if self.fsm.state_changed() {
            self.motor.stop(false)?;
            return Ok(());
        }
        let elapsed = self.fsm.time_in_state();
        if elapsed >= self.cfg.extend_pause_ms {
            self.fsm.set_state(BeltState::Extending);
        } else if elapsed >= self.cfg.extend_pause_brake_ms && !self.pause_coasting {
            self.motor.stop(true)?;
            self.pause_coasting = true;
        }
        Ok(())
    }

    fn move_to_target(&mut self) -> Result<()> {
        if self.fsm.state_changed() {
            if !self.homed {
                tracing::warn!(path = %self.path, "move refused, belt is not homed");
                self.status = BeltStatus::CompletedError;
                self.commands.move_to_target = false;
                self.fsm.set_state(BeltState::WaitForCommand);
                return Ok(());
            }
            self.pid.reset();
        }
        if !self.commands.move_to_target {
            self.motor.stop(false)?;
            self.status = BeltStatus::CompletedSuccess;
            self.fsm.set_state(BeltState::WaitForCommand);
            return Ok(());
        }
        let error = self.target_position - self.encoder.position();
        let output = self.pid.update(error, self.cycle_s);
        // Dead-zone compensation: offset the output past the duty range
        // where the motor does not move.
        let duty = if output > 0.0 {
            output + self.cfg.min_duty
        } else if output < 0.0 {
            output - self.cfg.min_duty
        } else {
            0.0
        };
        self.motor.set_duty(duty);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.motor.stop(false)?;
        self.commands = BeltCommands::default();
        self.pid.reset();
        self.direction_error_count = 0;
        self.stall_error_count = 0;
        self.status = BeltStatus::Idle;
        tracing::info!(path = %self.path, "reset");
        self.fsm.set_state(BeltState::WaitForCommand);
        Ok(())
    }

    /// Debounced encoder-against-motor direction check. Any agreeing or
    /// dead-band sample resets the counter to zero.
    fn check_direction(&mut self) {
        let duty = self.motor.duty();
        let mismatched = duty.abs() > self.cfg.duty_deadband
            && self.velocity.abs() > self.cfg.velocity_deadband_mm_s
            && duty * self.velocity < 0.0;
        if !mismatched {
            self.direction_error_count = 0;
            return;
        }
        self.direction_error_count += 1;
        if self.direction_error_count < self.cfg.direction_fault_cycles {
            return;
        }
        self.direction_error_count = 0;
        if self.in_extend_phase() {
            // A human pulling against the feed is expected here.
            tracing::warn!(
                path = %self.path,
                duty,
                velocity = self.velocity,
                "encoder direction disagrees with motor"
            );
        } else {
            self.trip("direction mismatch");
        }
    }

    /// Debounced stall check: commanded duty with no belt movement.
    /// Retract is exempt: homing stalls against the hard stop on purpose
    /// and the retract current threshold is its exit condition.
    fn check_stall(&mut self) {
        let stalled = self.motor.duty().abs() >= self.cfg.stall_min_duty
            && self.velocity.abs() < self.cfg.stall_min_velocity_mm_s
            && self.fsm.state() != BeltState::Retract;
        if !stalled {
            self.stall_error_count = 0;
            return;
        }
        self.stall_error_count += 1;
        if self.stall_error_count < self.cfg.stall_fault_cycles {
            return;
        }
        self.stall_error_count = 0;
        if self.in_extend_phase() {
            tracing::warn!(path = %self.path, "belt is not moving");
        } else {
            self.trip("stall");
        }
    }

    fn check_overcurrent(&mut self) {
        if self.motor.overcurrent_error() && self.fsm.state() != BeltState::Error {
            self.trip("overcurrent");
        }
    }

    fn in_extend_phase(&self) -> bool {
        matches!(
            self.fsm.state(),
            BeltState::StartExtend | BeltState::Extending | BeltState::PauseExtend
        )
    }

    /// Fault entry: brake now, log once, park in `Error` until reset.
    fn trip(&mut self, fault: &str) {
        tracing::error!(path = %self.path, fault, "belt fault");
        if let Err(e) = self.motor.stop(false) {
            tracing::error!(path = %self.path, error = %e, "brake on fault failed");
        }
        self.status = BeltStatus::CompletedError;
        self.fsm.set_state(BeltState::Error);
    }

    // Command surface.

    pub fn request_retract(&mut self) {
        self.commands.retract = true;
    }

    pub fn request_extend(&mut self) {
        self.commands.extend = true;
    }

    /// Assert the move command and (re)aim it. Re-issuing while a move is
    /// active retargets it without restarting the controller.
    pub fn request_move_to(&mut self, target_mm: f32) {
        self.commands.move_to_target = true;
        self.target_position = target_mm;
    }

    /// Release the move command; the belt brakes and returns to idle on
    /// its next cycle.
    pub fn end_move(&mut self) {
        self.commands.move_to_target = false;
    }

    pub fn request_reset(&mut self) {
        self.commands.reset = true;
    }

    // Status surface.

    pub fn state(&self) -> BeltState {
        self.fsm.state()
    }

    pub fn status(&self) -> BeltStatus {
        self.status
    }

    pub fn position(&self) -> f32 {
        self.encoder.position()
    }

    pub fn homed(&self) -> bool {
        self.homed
    }

    pub fn current(&self) -> f32 {
        self.motor.current()
    }

    pub fn duty(&self) -> f32 {
        self.motor.duty()
    }

    pub fn commands(&self) -> BeltCommands {
        self.commands
    }

    /// The cooling fan is wanted while this belt's motor drives.
    pub fn fan_requested(&self) -> bool {
        self.motor.is_driving()
    }
}
