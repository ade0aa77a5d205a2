//! Test and helper mocks for maslow_core.
//!
//! The full simulated rig lives in `maslow_hardware`; these are the
//! minimal stand-ins used by this crate's own unit tests.

use std::cell::Cell;
use std::rc::Rc;

use maslow_traits::{
    AngleSensor, CurrentSense, HostMachine, HostState, HwResult, MuxSwitch, PwmPin,
};

/// A multiplexer that accepts every port selection.
pub struct NoopMux;

impl MuxSwitch for NoopMux {
    fn select_port(&mut self, _port: u8) -> HwResult<()> {
        Ok(())
    }
}

/// An angle sensor fed from a shared cell.
pub struct ScriptedAngleSensor {
    pub ticks: Rc<Cell<i32>>,
    pub magnet: Rc<Cell<bool>>,
    pub ack: Rc<Cell<bool>>,
}

impl ScriptedAngleSensor {
    pub fn new() -> (Self, Rc<Cell<i32>>) {
        let ticks = Rc::new(Cell::new(0));
        (
            Self {
                ticks: ticks.clone(),
                magnet: Rc::new(Cell::new(true)),
                ack: Rc::new(Cell::new(true)),
            },
            ticks,
        )
    }
}

impl AngleSensor for ScriptedAngleSensor {
    fn probe(&mut self) -> HwResult<bool> {
        Ok(self.ack.get())
    }

    fn magnet_detected(&mut self) -> HwResult<bool> {
        Ok(self.magnet.get())
    }

    fn cumulative_ticks(&mut self) -> HwResult<i32> {
        Ok(self.ticks.get())
    }
}

/// A PWM pin that records the last commanded duty.
pub struct RecordingPwmPin {
    pub duty: Rc<Cell<u32>>,
    max_duty: u32,
}

impl RecordingPwmPin {
    pub fn new(max_duty: u32) -> (Self, Rc<Cell<u32>>) {
        let duty = Rc::new(Cell::new(0));
        (
            Self {
                duty: duty.clone(),
                max_duty,
            },
            duty,
        )
    }
}

impl PwmPin for RecordingPwmPin {
    fn set_duty(&mut self, duty: u32) -> HwResult<()> {
        self.duty.set(duty);
        Ok(())
    }

    fn max_duty(&self) -> u32 {
        self.max_duty
    }
}

/// A current-sense input fed from a shared cell.
pub struct ScriptedCurrentSense {
    pub millivolts: Rc<Cell<u32>>,
}

impl ScriptedCurrentSense {
    pub fn new() -> (Self, Rc<Cell<u32>>) {
        let millivolts = Rc::new(Cell::new(0));
        (
            Self {
                millivolts: millivolts.clone(),
            },
            millivolts,
        )
    }
}

impl CurrentSense for ScriptedCurrentSense {
    fn read_millivolts(&mut self) -> HwResult<u32> {
        Ok(self.millivolts.get())
    }
}

/// A host machine whose state and axis positions are fed from shared cells.
#[derive(Clone)]
pub struct ScriptedHost {
    pub state: Rc<Cell<HostState>>,
    pub axes: Rc<Cell<[f32; 4]>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self {
            state: Rc::new(Cell::new(HostState::Idle)),
            axes: Rc::new(Cell::new([0.0; 4])),
        }
    }
}

impl Default for ScriptedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMachine for ScriptedHost {
    fn state(&self) -> HostState {
        self.state.get()
    }

    fn axis_position(&self, axis: usize) -> f32 {
        self.axes.get()[axis]
    }
}
