//! Position PID used by the belt's move-to-target state.

/// PID controller with clamped integral and output.
///
/// The output limits are set to leave room for the motor's dead-zone
/// compensation: the belt configures `[-1 + min_duty, 1 - min_duty]` and
/// adds `±min_duty` to the output afterwards.
#[derive(Debug, Clone)]
pub struct Pid {
    kp: f32,
    ki: f32,
    kd: f32,
    output_min: f32,
    output_max: f32,
    integral: f32,
    prev_error: Option<f32>,
}

impl Pid {
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            output_min: -1.0,
            output_max: 1.0,
            integral: 0.0,
            prev_error: None,
        }
    }

    pub fn with_output_limits(mut self, min: f32, max: f32) -> Self {
        debug_assert!(min < max);
        self.output_min = min;
        self.output_max = max;
        self
    }

    /// Clear the integral and derivative history; call on controller entry.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    /// One controller step. `error` is target minus measurement, `dt_s`
    /// the cycle period in seconds.
    pub fn update(&mut self, error: f32, dt_s: f32) -> f32 {
        self.integral += self.ki * error * dt_s;
        // Anti-windup: the integral alone never exceeds the output range.
        self.integral = self.integral.clamp(self.output_min, self.output_max);

        let derivative = match self.prev_error {
            Some(prev) if dt_s > 0.0 => (error - prev) / dt_s,
            _ => 0.0,
        };
        self.prev_error = Some(error);

        (self.kp * error + self.integral + self.kd * derivative)
            .clamp(self.output_min, self.output_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_only_tracks_error() {
        let mut pid = Pid::new(0.5, 0.0, 0.0);
        assert_eq!(pid.update(1.0, 0.005), 0.5);
        assert_eq!(pid.update(-1.0, 0.005), -0.5);
    }

    #[test]
    fn output_respects_limits() {
        let mut pid = Pid::new(10.0, 0.0, 0.0).with_output_limits(-0.9, 0.9);
        assert_eq!(pid.update(5.0, 0.005), 0.9);
        assert_eq!(pid.update(-5.0, 0.005), -0.9);
    }

    #[test]
    fn integral_winds_up_only_to_the_limit() {
        let mut pid = Pid::new(0.0, 1.0, 0.0).with_output_limits(-0.5, 0.5);
        for _ in 0..10_000 {
            pid.update(10.0, 0.01);
        }
        // Long saturation, then the error flips: output must leave the rail
        // without a huge stored integral to burn off.
        let out = pid.update(-1.0, 0.01);
        assert!(out <= 0.5);
        pid.reset();
        assert_eq!(pid.update(0.0, 0.01), 0.0);
    }
}
