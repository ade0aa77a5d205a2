//! Simulated hardware for the Maslow belt-control core.
//!
//! Real drivers (ESP32 LEDC PWM, AS5600 over I2C, TCA9546A multiplexer)
//! live behind the same traits on the firmware build; this crate provides
//! scriptable stand-ins for tests and the CLI simulator. Every component
//! exposes a cloneable handle backed by `Rc<Cell<...>>` so a test can set
//! sensor values and observe pin outputs while the core owns the boxed
//! component itself.

pub mod error;
pub mod sim;

use std::cell::Cell;
use std::rc::Rc;

use error::HwError;
use maslow_traits::{AngleSensor, CurrentSense, HostMachine, HostState, HwResult, MuxSwitch, PwmPin};

#[derive(Debug)]
struct EncoderShared {
    ticks: Cell<i32>,
    magnet: Cell<bool>,
    ack: Cell<bool>,
}

/// Simulated AS5600 with an externally scripted cumulative tick count.
pub struct SimulatedEncoder {
    shared: Rc<EncoderShared>,
}

/// Scripting handle for a [`SimulatedEncoder`].
#[derive(Clone)]
pub struct EncoderHandle {
    shared: Rc<EncoderShared>,
}

pub fn simulated_encoder() -> (SimulatedEncoder, EncoderHandle) {
    let shared = Rc::new(EncoderShared {
        ticks: Cell::new(0),
        magnet: Cell::new(true),
        ack: Cell::new(true),
    });
    (
        SimulatedEncoder {
            shared: shared.clone(),
        },
        EncoderHandle { shared },
    )
}

impl EncoderHandle {
    pub fn ticks(&self) -> i32 {
        self.shared.ticks.get()
    }
    pub fn set_ticks(&self, ticks: i32) {
        self.shared.ticks.set(ticks);
    }
    pub fn add_ticks(&self, delta: i32) {
        self.shared
            .ticks
            .set(self.shared.ticks.get().saturating_add(delta));
    }
    /// Script a missing magnet to exercise init failure paths.
    pub fn set_magnet(&self, present: bool) {
        self.shared.magnet.set(present);
    }
    /// Script a non-acknowledging sensor to exercise init failure paths.
    pub fn set_ack(&self, ack: bool) {
        self.shared.ack.set(ack);
    }
}

impl AngleSensor for SimulatedEncoder {
    fn probe(&mut self) -> HwResult<bool> {
        Ok(self.shared.ack.get())
    }

    fn magnet_detected(&mut self) -> HwResult<bool> {
        Ok(self.shared.magnet.get())
    }

    fn cumulative_ticks(&mut self) -> HwResult<i32> {
        if !self.shared.ack.get() {
            tracing::warn!("simulated sensor is scripted off the bus");
            return Err(Box::new(HwError::I2c("sensor dropped off the bus".into())));
        }
        Ok(self.shared.ticks.get())
    }
}

/// Simulated PWM output pin recording the last commanded duty.
pub struct SimulatedPwmPin {
    duty: Rc<Cell<u32>>,
    max_duty: u32,
}

/// Observation handle for a [`SimulatedPwmPin`].
#[derive(Clone)]
pub struct PinHandle {
    duty: Rc<Cell<u32>>,
    max_duty: u32,
}

/// 10-bit resolution, matching the LEDC setup on the firmware build.
pub const SIM_MAX_DUTY: u32 = 1023;

pub fn simulated_pwm_pin() -> (SimulatedPwmPin, PinHandle) {
    let duty = Rc::new(Cell::new(0));
    (
        SimulatedPwmPin {
            duty: duty.clone(),
            max_duty: SIM_MAX_DUTY,
        },
        PinHandle {
            duty,
            max_duty: SIM_MAX_DUTY,
        },
    )
}

impl PinHandle {
    pub fn duty(&self) -> u32 {
        self.duty.get()
    }
    pub fn max_duty(&self) -> u32 {
        self.max_duty
    }
}

impl PwmPin for SimulatedPwmPin {
    fn set_duty(&mut self, duty: u32) -> HwResult<()> {
        if duty > self.max_duty {
            return Err(Box::new(HwError::Pwm(format!(
                "duty {duty} exceeds max {}",
                self.max_duty
            ))));
        }
        self.duty.set(duty);
        Ok(())
    }

    fn max_duty(&self) -> u32 {
        self.max_duty
    }
}

/// Simulated current-sense input with a scripted millivolt reading.
pub struct SimulatedCurrentSense {
    millivolts: Rc<Cell<u32>>,
}

#[derive(Clone)]
pub struct CurrentHandle {
    millivolts: Rc<Cell<u32>>,
}

pub fn simulated_current_sense() -> (SimulatedCurrentSense, CurrentHandle) {
    let millivolts = Rc::new(Cell::new(0));
    (
        SimulatedCurrentSense {
            millivolts: millivolts.clone(),
        },
        CurrentHandle { millivolts },
    )
}

impl CurrentHandle {
    pub fn set_millivolts(&self, mv: u32) {
        self.millivolts.set(mv);
    }
    pub fn millivolts(&self) -> u32 {
        self.millivolts.get()
    }
}

impl CurrentSense for SimulatedCurrentSense {
    fn read_millivolts(&mut self) -> HwResult<u32> {
        Ok(self.millivolts.get())
    }
}

#[derive(Debug)]
struct MuxShared {
    selected: Cell<Option<u8>>,
    healthy: Cell<bool>,
}

/// Simulated TCA9546A multiplexer tracking the last selected port.
pub struct SimulatedMux {
    shared: Rc<MuxShared>,
}

#[derive(Clone)]
pub struct MuxHandle {
    shared: Rc<MuxShared>,
}

pub fn simulated_mux() -> (SimulatedMux, MuxHandle) {
    let shared = Rc::new(MuxShared {
        selected: Cell::new(None),
        healthy: Cell::new(true),
    });
    (
        SimulatedMux {
            shared: shared.clone(),
        },
        MuxHandle { shared },
    )
}

impl MuxHandle {
    pub fn selected(&self) -> Option<u8> {
        self.shared.selected.get()
    }
    /// Script a wedged bus so port selection starts failing.
    pub fn set_healthy(&self, healthy: bool) {
        self.shared.healthy.set(healthy);
    }
}

impl MuxSwitch for SimulatedMux {
    fn select_port(&mut self, port: u8) -> HwResult<()> {
        if !self.shared.healthy.get() {
            tracing::warn!(port, "simulated mux is scripted unhealthy");
            return Err(Box::new(HwError::I2c("mux not responding".into())));
        }
        if port > 3 {
            return Err(Box::new(HwError::I2c(format!("mux has no port {port}"))));
        }
        tracing::trace!(port, "mux select");
        self.shared.selected.set(Some(port));
        Ok(())
    }
}

#[derive(Debug)]
struct HostShared {
    state: Cell<HostState>,
    positions: Cell<[f32; 4]>,
}

/// Simulated host machine; the supervisor owns it while the scripting
/// handle mutates its state and axis positions.
pub struct SimulatedHost {
    shared: Rc<HostShared>,
}

/// Scripting handle for a [`SimulatedHost`].
#[derive(Clone)]
pub struct HostHandle {
    shared: Rc<HostShared>,
}

pub fn simulated_host() -> (SimulatedHost, HostHandle) {
    let shared = Rc::new(HostShared {
        state: Cell::new(HostState::Idle),
        positions: Cell::new([0.0; 4]),
    });
    (
        SimulatedHost {
            shared: shared.clone(),
        },
        HostHandle { shared },
    )
}

impl HostHandle {
    pub fn set_state(&self, state: HostState) {
        self.shared.state.set(state);
    }

    pub fn set_axis_position(&self, axis: usize, mm: f32) {
        let mut p = self.shared.positions.get();
        if axis < p.len() {
            p[axis] = mm;
            self.shared.positions.set(p);
        }
    }
}

impl HostMachine for SimulatedHost {
    fn state(&self) -> HostState {
        self.shared.state.get()
    }

    fn axis_position(&self, axis: usize) -> f32 {
        let p = self.shared.positions.get();
        p.get(axis).copied().unwrap_or(0.0)
    }
}
