//! H-bridge motor actuator (DRV8876 in PWM control mode).
//!
//! Converts a signed duty setpoint into ramped, direction-resolved PWM on
//! the IN1/IN2 pins and measures motor current through the IPROPI sense
//! resistor. Abrupt full-duty reversal on a loaded DC motor trips the
//! overcurrent protection and shocks the belt transmission, so the actual
//! duty ramps toward the setpoint and always passes through zero when the
//! sign flips.

use eyre::WrapErr;
use maslow_config::MotorCfg;
use maslow_traits::{CurrentSense, PwmPin};

use crate::error::{MaslowError, Result};
use crate::filter::RollingAverage;
use crate::hw_error::map_hw_error;
use crate::path::LogPath;

/// Rolling-average window for the current-sense samples.
const CURRENT_FILTER_SAMPLES: usize = 8;

/// Duty magnitudes below this are treated as zero (brake/coast).
const DUTY_EPSILON: f32 = 1e-3;

pub struct HBridgeMotor {
    path: LogPath,
    fwd_pin: Box<dyn PwmPin>,
    rev_pin: Box<dyn PwmPin>,
    current_sense: Box<dyn CurrentSense>,

    cfg: MotorCfg,
    ms_per_cycle: u16,
    max_duty: u32,

    duty_setpoint: f32,
    duty_actual: f32,
    current_filter: RollingAverage<CURRENT_FILTER_SAMPLES>,
    current_a: f32,
    overcurrent_warning: bool,
    overcurrent_error: bool,
    warning_active: bool,
    error_active: bool,
    // Cycles since duty_actual last became nonzero; 0 while idle.
    duty_on_cycles: u32,
    // stop(coast) leaves the outputs floating until the next nonzero duty.
    coast_when_idle: bool,
}

impl HBridgeMotor {
    pub fn new(
        fwd_pin: Box<dyn PwmPin>,
        rev_pin: Box<dyn PwmPin>,
        current_sense: Box<dyn CurrentSense>,
        cfg: &MotorCfg,
        ms_per_cycle: u16,
        parent: &LogPath,
    ) -> Self {
        let max_duty = fwd_pin.max_duty();
        Self {
            path: parent.child("Motor"),
            fwd_pin,
            rev_pin,
            current_sense,
            cfg: cfg.clone(),
            ms_per_cycle,
            max_duty,
            duty_setpoint: 0.0,
            duty_actual: 0.0,
            current_filter: RollingAverage::new(),
            current_a: 0.0,
            overcurrent_warning: false,
            overcurrent_error: false,
            warning_active: false,
            error_active: false,
            duty_on_cycles: 0,
            coast_when_idle: false,
        }
    }

    /// Verify the output pins agree on resolution and are drivable, then
    /// park the bridge in coast.
    pub fn init(&mut self) -> Result<()> {
        if self.rev_pin.max_duty() != self.max_duty {
            tracing::error!(path = %self.path, "output pins disagree on PWM resolution");
            return Err(eyre::Report::new(MaslowError::Config(
                "fwd/rev pins must share one PWM resolution".to_string(),
            )));
        }
        self.drive(0, 0).wrap_err("parking bridge in coast")?;
        tracing::info!(
            path = %self.path,
            pwm_hz = self.cfg.pwm_frequency_hz,
            max_duty = self.max_duty,
            "initialized"
        );
        Ok(())
    }

    /// Record the requested duty in [-1.0, 1.0]; the output moves toward
    /// it on subsequent `update()` calls. Non-finite input reads as 0.
    pub fn set_duty(&mut self, duty: f32) {
        let duty = if duty.is_finite() { duty } else { 0.0 };
        self.duty_setpoint = duty.clamp(-1.0, 1.0);
        if self.duty_setpoint.abs() > DUTY_EPSILON {
            self.coast_when_idle = false;
        }
    }

    /// One control cycle: sample current, ramp the actual duty, refresh
    /// the overcurrent flags, drive the bridge.
    pub fn update(&mut self) -> Result<()> {
        let mv = self
            .current_sense
            .read_millivolts()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading current sense")?;
        self.current_a = self
            .current_filter
            .update(mv as f32 / self.cfg.current_sense_resistor as f32);

        self.ramp();
        self.check_overcurrent();

        let counts = (self.duty_actual.abs() * self.max_duty as f32) as u32;
        if self.duty_actual > DUTY_EPSILON {
            if self.cfg.reverse {
                self.drive(0, counts)?;
            } else {
                self.drive(counts, 0)?;
            }
        } else if self.duty_actual < -DUTY_EPSILON {
            if self.cfg.reverse {
                self.drive(counts, 0)?;
            } else {
                self.drive(0, counts)?;
            }
        } else if self.coast_when_idle {
            self.drive(0, 0)?;
        } else {
            // Brake: both outputs high.
            self.drive(self.max_duty, self.max_duty)?;
        }
        Ok(())
    }

    fn ramp(&mut self) {
        let sp = self.duty_setpoint;
        if sp.abs() <= DUTY_EPSILON {
            // Decreases apply at once.
            self.duty_actual = 0.0;
        } else if sp * self.duty_actual < 0.0 {
            // Sign flip: brake through zero before reversing.
            self.duty_actual = 0.0;
        } else if sp.abs() < self.duty_actual.abs() {
            self.duty_actual = sp;
        } else {
            let delta = sp - self.duty_actual;
            if delta.abs() <= self.cfg.max_duty_step {
                self.duty_actual = sp;
            } else {
                self.duty_actual += self.cfg.max_duty_step.copysign(delta);
            }
        }

        if self.duty_actual.abs() > DUTY_EPSILON {
            self.duty_on_cycles = self.duty_on_cycles.saturating_add(1);
        } else {
            self.duty_on_cycles = 0;
        }
    }

    fn check_overcurrent(&mut self) {
        let on_ms = u64::from(self.duty_on_cycles) * u64::from(self.ms_per_cycle);
        let suppressed = self.duty_on_cycles > 0
            && on_ms < u64::from(self.cfg.overcurrent_suppression_ms);

        self.overcurrent_error = !suppressed && self.current_a >= self.cfg.overcurrent_error_a;
        self.overcurrent_warning = !suppressed && self.current_a >= self.cfg.overcurrent_warning_a;

        if self.overcurrent_warning && !self.warning_active {
            tracing::warn!(
                path = %self.path,
                current_a = self.current_a,
                threshold_a = self.cfg.overcurrent_warning_a,
                "overcurrent warning"
            );
        }
        self.warning_active = self.overcurrent_warning;

        if self.overcurrent_error && !self.error_active {
            tracing::error!(
                path = %self.path,
                current_a = self.current_a,
                threshold_a = self.cfg.overcurrent_error_a,
                "overcurrent error"
            );
        }
        self.error_active = self.overcurrent_error;
    }

    /// Immediately zero both setpoint and output. `coast` leaves the
    /// outputs floating so the belt can be pulled by hand; otherwise the
    /// bridge brakes.
    pub fn stop(&mut self, coast: bool) -> Result<()> {
        self.duty_setpoint = 0.0;
        self.duty_actual = 0.0;
        self.duty_on_cycles = 0;
        self.coast_when_idle = coast;
        if coast {
            self.drive(0, 0)
        } else {
            self.drive(self.max_duty, self.max_duty)
        }
    }

    fn drive(&mut self, fwd: u32, rev: u32) -> Result<()> {
        self.fwd_pin
            .set_duty(fwd)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("driving fwd pin")?;
        self.rev_pin
            .set_duty(rev)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("driving rev pin")
    }

    /// Filtered motor current in Amperes.
    pub fn current(&self) -> f32 {
        self.current_a
    }

    /// The ramped duty currently on the outputs, in [-1.0, 1.0].
    pub fn duty(&self) -> f32 {
        self.duty_actual
    }

    pub fn duty_setpoint(&self) -> f32 {
        self.duty_setpoint
    }

    pub fn overcurrent_warning(&self) -> bool {
        self.overcurrent_warning
    }

    pub fn overcurrent_error(&self) -> bool {
        self.overcurrent_error
    }

    /// True while the bridge applies nonzero duty.
    pub fn is_driving(&self) -> bool {
        self.duty_actual.abs() > DUTY_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{RecordingPwmPin, ScriptedCurrentSense};
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Rig {
        motor: HBridgeMotor,
        fwd: Rc<Cell<u32>>,
        rev: Rc<Cell<u32>>,
        mv: Rc<Cell<u32>>,
    }

    fn rig(cfg: MotorCfg) -> Rig {
        let (fwd_pin, fwd) = RecordingPwmPin::new(1023);
        let (rev_pin, rev) = RecordingPwmPin::new(1023);
        let (sense, mv) = ScriptedCurrentSense::new();
        let parent = LogPath::root("BeltTL");
        let motor = HBridgeMotor::new(
            Box::new(fwd_pin),
            Box::new(rev_pin),
            Box::new(sense),
            &cfg,
            5,
            &parent,
        );
        Rig {
            motor,
            fwd,
            rev,
            mv,
        }
    }

    #[test]
    fn increases_are_rate_limited() {
        let mut r = rig(MotorCfg {
            max_duty_step: 0.1,
            ..MotorCfg::default()
        });
        r.motor.set_duty(1.0);
        r.motor.update().unwrap();
        assert!((r.motor.duty() - 0.1).abs() < 1e-6);
        r.motor.update().unwrap();
        assert!((r.motor.duty() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn decreases_apply_immediately() {
        let mut r = rig(MotorCfg {
            max_duty_step: 0.5,
            ..MotorCfg::default()
        });
        r.motor.set_duty(1.0);
        r.motor.update().unwrap();
        r.motor.update().unwrap();
        assert_eq!(r.motor.duty(), 1.0);

        r.motor.set_duty(0.3);
        r.motor.update().unwrap();
        assert!((r.motor.duty() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn reversal_brakes_through_zero() {
        let mut r = rig(MotorCfg {
            max_duty_step: 0.25,
            ..MotorCfg::default()
        });
        r.motor.set_duty(1.0);
        for _ in 0..8 {
            r.motor.update().unwrap();
        }
        assert_eq!(r.motor.duty(), 1.0);

        r.motor.set_duty(-1.0);
        let mut dutys = Vec::new();
        for _ in 0..8 {
            r.motor.update().unwrap();
            dutys.push(r.motor.duty());
        }
        // First post-reversal cycle must be exactly zero, and the duty must
        // never show the new sign before having passed through zero.
        assert_eq!(dutys[0], 0.0);
        assert!(dutys.iter().all(|&d| d <= 0.0));
        assert_eq!(*dutys.last().unwrap(), -1.0);
    }

    #[test]
    fn drives_direction_resolved_outputs_and_brakes_at_zero() {
        let mut r = rig(MotorCfg::default());
        r.motor.set_duty(1.0);
        for _ in 0..30 {
            r.motor.update().unwrap();
        }
        assert_eq!(r.fwd.get(), 1023);
        assert_eq!(r.rev.get(), 0);

        r.motor.set_duty(0.0);
        r.motor.update().unwrap();
        // Brake: both outputs high.
        assert_eq!(r.fwd.get(), 1023);
        assert_eq!(r.rev.get(), 1023);
    }

    #[test]
    fn reverse_flag_swaps_outputs() {
        let mut r = rig(MotorCfg {
            reverse: true,
            ..MotorCfg::default()
        });
        r.motor.set_duty(1.0);
        for _ in 0..30 {
            r.motor.update().unwrap();
        }
        assert_eq!(r.fwd.get(), 0);
        assert_eq!(r.rev.get(), 1023);
    }

    #[test]
    fn stop_coast_floats_outputs() {
        let mut r = rig(MotorCfg::default());
        r.motor.set_duty(-0.8);
        for _ in 0..30 {
            r.motor.update().unwrap();
        }
        r.motor.stop(true).unwrap();
        assert_eq!(r.motor.duty(), 0.0);
        assert_eq!(r.fwd.get(), 0);
        assert_eq!(r.rev.get(), 0);
        // Coast persists across idle cycles.
        r.motor.update().unwrap();
        assert_eq!((r.fwd.get(), r.rev.get()), (0, 0));
    }

    #[test]
    fn overcurrent_flags_follow_filtered_current() {
        let mut r = rig(MotorCfg {
            overcurrent_suppression_ms: 0,
            ..MotorCfg::default()
        });
        // 6000mV / 1500 = 4A, above the 3.5A error threshold once the
        // 8-sample filter warms up.
        r.mv.set(6_000);
        r.motor.set_duty(0.5);
        for _ in 0..CURRENT_FILTER_SAMPLES {
            r.motor.update().unwrap();
        }
        assert!(r.motor.overcurrent_warning());
        assert!(r.motor.overcurrent_error());
        assert!((r.motor.current() - 4.0).abs() < 1e-3);
    }

    proptest! {
        #[test]
        fn ramp_is_rate_limited_and_never_skips_zero(
            setpoints in proptest::collection::vec(-1.0f32..=1.0, 1..60),
            step in 0.01f32..=0.5,
        ) {
            let mut r = rig(MotorCfg {
                max_duty_step: step,
                ..MotorCfg::default()
            });
            let mut prev = 0.0f32;
            for sp in setpoints {
                r.motor.set_duty(sp);
                r.motor.update().unwrap();
                let d = r.motor.duty();
                prop_assert!(d.abs() <= 1.0);
                prop_assert!(d * prev >= 0.0, "sign flipped without a zero cycle");
                prop_assert!(
                    d.abs() - prev.abs() <= step + 1e-6,
                    "magnitude rose faster than the ramp limit"
                );
                prev = d;
            }
        }
    }

    #[test]
    fn startup_window_suppresses_overcurrent() {
        let mut r = rig(MotorCfg {
            overcurrent_suppression_ms: 50, // 10 cycles at 5ms
            ..MotorCfg::default()
        });
        r.mv.set(6_000);
        r.motor.set_duty(0.5);
        for _ in 0..9 {
            r.motor.update().unwrap();
            assert!(!r.motor.overcurrent_error(), "suppressed during startup");
        }
        for _ in 0..3 {
            r.motor.update().unwrap();
        }
        assert!(r.motor.overcurrent_error());
    }
}
