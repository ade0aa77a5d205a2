#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the Maslow belt-control core.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every tunable carries the range the machine configuration declares
//!   (I2C ports 0..=3, PWM frequency 1-100 kHz, overcurrent thresholds
//!   0.1-100 A, and so on); `validate()` enforces those ranges so the
//!   control core never has to re-check them.

use serde::Deserialize;

/// I2C bus and multiplexer wiring.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct I2cCfg {
    pub sda_pin: u8,
    pub scl_pin: u8,
    /// I2C address of the TCA9546A switch.
    pub address: u8,
    pub frequency_hz: u32,
}

impl Default for I2cCfg {
    fn default() -> Self {
        Self {
            sda_pin: 8,
            scl_pin: 9,
            address: 0x70,
            frequency_hz: 400_000,
        }
    }
}

/// One belt position encoder (AS5600 behind the multiplexer).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EncoderCfg {
    /// Multiplexer port the sensor sits behind.
    pub port: u8,
    /// Belt travel per encoder revolution.
    pub mm_per_revolution: f32,
    /// Flip the sign of the measured position/velocity.
    pub invert: bool,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            port: 0,
            mm_per_revolution: 44.0,
            invert: false,
        }
    }
}

/// One H-bridge motor driver (DRV8876 in PWM control mode).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MotorCfg {
    pub pwm_frequency_hz: u32,
    /// IPROPI sense resistor; millivolts / this value = Amperes.
    pub current_sense_resistor: u32,
    pub overcurrent_warning_a: f32,
    pub overcurrent_error_a: f32,
    /// Grace period after duty first becomes nonzero during which
    /// overcurrent checks are suppressed (inrush). 0 disables.
    pub overcurrent_suppression_ms: u32,
    /// Maximum duty-magnitude increase per control cycle.
    pub max_duty_step: f32,
    /// Swap forward/reverse outputs.
    pub reverse: bool,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self {
            pwm_frequency_hz: 4_000,
            current_sense_resistor: 1_500,
            overcurrent_warning_a: 2.0,
            overcurrent_error_a: 3.5,
            overcurrent_suppression_ms: 250,
            max_duty_step: 0.05,
            reverse: false,
        }
    }
}

/// Per-belt control loop tunables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BeltControlCfg {
    /// Fixed duty used while homing against the end stop.
    pub retract_duty: f32,
    /// Current at which the retract is considered to have hit the stop.
    pub retract_current_a: f32,
    /// Brake-and-settle time after the stop is reached, before zeroing.
    pub retract_settle_ms: u32,

    /// Fixed duty used while feeding belt out.
    pub extend_duty: f32,
    /// Minimum drive time at the start of an extend (breaks static friction).
    pub extend_min_dwell_ms: u32,
    /// Total belt length to feed out before an extend completes.
    pub extend_length_mm: f32,
    /// Position must advance by at least this much to count as progress.
    pub extend_advance_epsilon_mm: f32,
    /// Consecutive no-progress cycles before an extend pauses.
    pub extend_stall_cycles: u16,
    /// Brake time at the start of a pause, before coasting.
    pub extend_pause_brake_ms: u32,
    /// Total pause time before the extend resumes.
    pub extend_pause_ms: u32,

    /// Position PID gains for move-to-target.
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Duty magnitude below which the motor does not move; added to the
    /// PID output as dead-zone compensation.
    pub min_duty: f32,

    /// Duty magnitude below which direction checks are skipped.
    pub duty_deadband: f32,
    /// Velocity magnitude below which direction checks are skipped.
    pub velocity_deadband_mm_s: f32,
    /// Consecutive mismatched samples before a direction fault trips.
    pub direction_fault_cycles: u16,

    /// Minimum commanded duty for stall detection to engage.
    pub stall_min_duty: f32,
    /// Velocity below this while driving counts as a stalled sample.
    pub stall_min_velocity_mm_s: f32,
    /// Consecutive stalled samples before a stall fault trips.
    pub stall_fault_cycles: u16,
}

impl Default for BeltControlCfg {
    fn default() -> Self {
        Self {
            retract_duty: 0.7,
            retract_current_a: 1.3,
            retract_settle_ms: 200,
            extend_duty: 0.6,
            extend_min_dwell_ms: 300,
            extend_length_mm: 2000.0,
            extend_advance_epsilon_mm: 0.02,
            extend_stall_cycles: 20,
            extend_pause_brake_ms: 200,
            extend_pause_ms: 800,
            kp: 0.6,
            ki: 0.1,
            kd: 0.0,
            min_duty: 0.1,
            duty_deadband: 0.05,
            velocity_deadband_mm_s: 1.0,
            direction_fault_cycles: 10,
            stall_min_duty: 0.3,
            stall_min_velocity_mm_s: 0.5,
            stall_fault_cycles: 50,
        }
    }
}

/// One belt actuator: encoder + motor + control tunables.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BeltCfg {
    pub encoder: EncoderCfg,
    pub motor: MotorCfg,
    pub control: BeltControlCfg,
}

/// Supervisor loop timing and jog bridge.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SupervisorCfg {
    /// Expected time between consecutive supervisor update() calls.
    pub ms_per_cycle: u16,
    /// Interval between cycle-statistics report lines.
    pub cycle_report_interval_ms: u32,
    /// How often the jog state refreshes the tracked belt's target.
    pub jog_refresh_ms: u32,
    /// Which belt follows the host axis while jogging.
    pub jog_belt: usize,
}

impl Default for SupervisorCfg {
    fn default() -> Self {
        Self {
            ms_per_cycle: 5,
            cycle_report_interval_ms: 5_000,
            jog_refresh_ms: 500,
            jog_belt: 0,
        }
    }
}

/// Top-level configuration: supervisor + bus + four belts.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub supervisor: SupervisorCfg,
    pub i2c: I2cCfg,
    #[serde(rename = "belt")]
    pub belts: Vec<BeltCfg>,
}

impl Config {
    /// Produce a config with four default belts on ports 0..=3.
    pub fn default_rig() -> Self {
        let mut cfg = Self::default();
        cfg.belts = (0..4)
            .map(|port| {
                let mut belt = BeltCfg::default();
                belt.encoder.port = port;
                belt
            })
            .collect();
        cfg
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.supervisor.ms_per_cycle == 0 {
            eyre::bail!("supervisor.ms_per_cycle must be >= 1");
        }
        if self.supervisor.jog_refresh_ms < u32::from(self.supervisor.ms_per_cycle) {
            eyre::bail!("supervisor.jog_refresh_ms must cover at least one cycle");
        }
        if self.supervisor.jog_belt >= 4 {
            eyre::bail!("supervisor.jog_belt must be in 0..=3");
        }

        if !(100_000..=1_000_000).contains(&self.i2c.frequency_hz) {
            eyre::bail!("i2c.frequency_hz must be in [100000, 1000000]");
        }

        if self.belts.len() != 4 {
            eyre::bail!("exactly 4 [[belt]] entries are required");
        }
        let mut seen_ports = [false; 4];
        for (i, belt) in self.belts.iter().enumerate() {
            belt.validate()
                .map_err(|e| eyre::eyre!("belt {i}: {e}"))?;
            let port = belt.encoder.port as usize;
            if seen_ports[port] {
                eyre::bail!("belt {i}: encoder.port {port} is used twice");
            }
            seen_ports[port] = true;
        }
        Ok(())
    }
}

impl BeltCfg {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.encoder.port > 3 {
            eyre::bail!("encoder.port must be in 0..=3");
        }
        if !(self.encoder.mm_per_revolution > 0.0) {
            eyre::bail!("encoder.mm_per_revolution must be > 0");
        }

        if !(1_000..=100_000).contains(&self.motor.pwm_frequency_hz) {
            eyre::bail!("motor.pwm_frequency_hz must be in [1000, 100000]");
        }
        if !(1..=100_000).contains(&self.motor.current_sense_resistor) {
            eyre::bail!("motor.current_sense_resistor must be in [1, 100000]");
        }
        for (name, v) in [
            ("motor.overcurrent_warning_a", self.motor.overcurrent_warning_a),
            ("motor.overcurrent_error_a", self.motor.overcurrent_error_a),
        ] {
            if !(0.1..=100.0).contains(&v) {
                eyre::bail!("{name} must be in [0.1, 100.0]");
            }
        }
        if self.motor.overcurrent_warning_a > self.motor.overcurrent_error_a {
            eyre::bail!("motor.overcurrent_warning_a must not exceed overcurrent_error_a");
        }
        if !(self.motor.max_duty_step > 0.0 && self.motor.max_duty_step <= 1.0) {
            eyre::bail!("motor.max_duty_step must be in (0.0, 1.0]");
        }

        let c = &self.control;
        for (name, v) in [
            ("control.retract_duty", c.retract_duty),
            ("control.extend_duty", c.extend_duty),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                eyre::bail!("{name} must be in (0.0, 1.0]");
            }
        }
        if !(0.1..=100.0).contains(&c.retract_current_a) {
            eyre::bail!("control.retract_current_a must be in [0.1, 100.0]");
        }
        if !(c.extend_length_mm > 0.0) {
            eyre::bail!("control.extend_length_mm must be > 0");
        }
        if !(0.0..0.5).contains(&c.min_duty) {
            eyre::bail!("control.min_duty must be in [0.0, 0.5)");
        }
        if c.kp < 0.0 || c.ki < 0.0 || c.kd < 0.0 {
            eyre::bail!("control PID gains must be >= 0");
        }
        if c.direction_fault_cycles == 0 {
            eyre::bail!("control.direction_fault_cycles must be >= 1");
        }
        if c.stall_fault_cycles == 0 {
            eyre::bail!("control.stall_fault_cycles must be >= 1");
        }
        if c.extend_stall_cycles == 0 {
            eyre::bail!("control.extend_stall_cycles must be >= 1");
        }
        if c.extend_pause_brake_ms > c.extend_pause_ms {
            eyre::bail!("control.extend_pause_brake_ms must not exceed extend_pause_ms");
        }
        Ok(())
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}
