//! A minimal belt physics model closing the loop between the simulated
//! pins and the simulated encoder.
//!
//! The model is deliberately crude: belt speed is proportional to signed
//! duty, the fully-retracted hard stop clamps travel, and motor current
//! steps between a running and a stalled level. That is enough to exercise
//! homing, extend and move-to-target end to end.

use crate::{CurrentHandle, EncoderHandle, PinHandle};

/// One belt's plant model, stepped once per control cycle.
pub struct BeltModel {
    pub encoder: EncoderHandle,
    pub fwd: PinHandle,
    pub rev: PinHandle,
    pub sense: CurrentHandle,
    /// Tick advance per cycle at |duty| = 1.0, unloaded.
    pub free_ticks_per_cycle: f32,
    /// Hard stop: the fully-retracted tick position.
    pub min_ticks: i32,
    /// Current-sense reading at |duty| = 1.0 while the belt moves freely.
    pub running_millivolts: u32,
    /// Current-sense reading at |duty| = 1.0 against the hard stop.
    pub stalled_millivolts: u32,
    position: f32,
}

impl BeltModel {
    pub fn new(
        encoder: EncoderHandle,
        fwd: PinHandle,
        rev: PinHandle,
        sense: CurrentHandle,
    ) -> Self {
        let start = encoder.ticks();
        Self {
            encoder,
            fwd,
            rev,
            sense,
            free_ticks_per_cycle: 40.0,
            min_ticks: 0,
            running_millivolts: 600,
            stalled_millivolts: 3_000,
            position: start as f32,
        }
    }

    /// Signed duty currently commanded on the pins, in [-1.0, 1.0].
    /// Brake (both high) and coast (both low) both read as 0.
    pub fn signed_duty(&self) -> f32 {
        let fwd = self.fwd.duty();
        let rev = self.rev.duty();
        let max = self.fwd.max_duty() as f32;
        match (fwd > 0, rev > 0) {
            (true, false) => fwd as f32 / max,
            (false, true) => -(rev as f32) / max,
            _ => 0.0,
        }
    }

    /// Advance the plant by one control cycle.
    pub fn step(&mut self) {
        let duty = self.signed_duty();
        if duty == 0.0 {
            self.sense.set_millivolts(0);
            return;
        }

        let next = self.position + duty * self.free_ticks_per_cycle;
        let stalled = next <= self.min_ticks as f32;
        self.position = if stalled { self.min_ticks as f32 } else { next };
        self.encoder.set_ticks(self.position as i32);

        let base = if stalled {
            self.stalled_millivolts
        } else {
            self.running_millivolts
        };
        self.sense.set_millivolts((duty.abs() * base as f32) as u32);
    }
}
