//! Belt position encoder: AS5600 magnetic angle sensor behind the I2C
//! multiplexer, converted to a signed linear position.

use eyre::WrapErr;
use maslow_config::EncoderCfg;
use maslow_traits::{AngleSensor, MuxSwitch};

use crate::error::{MaslowError, Result};
use crate::hw_error::map_hw_error;
use crate::path::LogPath;

/// AS5600 resolution: ticks per full revolution.
pub const TICKS_PER_REV: f32 = 4096.0;

pub struct Encoder {
    sensor: Box<dyn AngleSensor>,
    path: LogPath,
    port: u8,
    mm_per_revolution: f32,
    // Cached signed conversion factor to avoid a division per read.
    ticks_to_mm: f32,
    cumulative_ticks: i32,
    previous_ticks: i32,
}

impl Encoder {
    pub fn new(sensor: Box<dyn AngleSensor>, cfg: &EncoderCfg, parent: &LogPath) -> Self {
        let sign = if cfg.invert { -1.0 } else { 1.0 };
        Self {
            sensor,
            path: parent.child("Encoder"),
            port: cfg.port,
            mm_per_revolution: cfg.mm_per_revolution,
            ticks_to_mm: sign * cfg.mm_per_revolution / TICKS_PER_REV,
            cumulative_ticks: 0,
            previous_ticks: 0,
        }
    }

    /// Probe the sensor on its multiplexer port. Fails (without a partial
    /// object) when the switch is unreachable, the sensor does not
    /// acknowledge, or no magnet is detected.
    pub fn init(&mut self, mux: &mut dyn MuxSwitch) -> Result<()> {
        self.select_port(mux)?;

        let acknowledged = self
            .sensor
            .probe()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("probing angle sensor")?;
        if !acknowledged {
            tracing::error!(path = %self.path, port = self.port, "sensor not found");
            return Err(eyre::Report::new(MaslowError::HardwareInit(format!(
                "sensor did not acknowledge on port {}",
                self.port
            ))));
        }

        let magnet = self
            .sensor
            .magnet_detected()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("checking magnet")?;
        if !magnet {
            tracing::error!(path = %self.path, port = self.port, "magnet not detected");
            return Err(eyre::Report::new(MaslowError::HardwareInit(
                "magnet not detected".to_string(),
            )));
        }

        self.cumulative_ticks = self
            .sensor
            .cumulative_ticks()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading initial angle")?;
        self.previous_ticks = self.cumulative_ticks;

        tracing::info!(
            path = %self.path,
            port = self.port,
            ticks = self.cumulative_ticks,
            "initialized"
        );
        Ok(())
    }

    /// Latch the previous tick count and read a fresh one. Called once per
    /// control cycle; selects the multiplexer port immediately before the
    /// sensor transaction.
    pub fn update(&mut self, mux: &mut dyn MuxSwitch) -> Result<()> {
        self.select_port(mux)?;
        self.previous_ticks = self.cumulative_ticks;
        self.cumulative_ticks = self
            .sensor
            .cumulative_ticks()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading angle sensor")?;
        Ok(())
    }

    fn select_port(&mut self, mux: &mut dyn MuxSwitch) -> Result<()> {
        mux.select_port(self.port)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("selecting encoder port")
    }

    /// Belt position in mm.
    pub fn position(&self) -> f32 {
        self.cumulative_ticks as f32 * self.ticks_to_mm
    }

    /// Belt velocity in mm/s over the last cycle of `cycle_s` seconds.
    pub fn velocity(&self, cycle_s: f32) -> f32 {
        (self.cumulative_ticks - self.previous_ticks) as f32 * self.ticks_to_mm / cycle_s
    }

    /// Re-zero: overwrite the tick count so the next `position()` returns
    /// `mm`. Only valid when the belt is at a known physical reference
    /// (post-retract).
    pub fn set_position(&mut self, mm: f32) {
        self.cumulative_ticks = (mm / self.ticks_to_mm).round() as i32;
        // Keep velocity at zero across the jump.
        self.previous_ticks = self.cumulative_ticks;
    }

    pub fn mm_per_revolution(&self) -> f32 {
        self.mm_per_revolution
    }
}
