pub mod clock;

pub use clock::{Clock, MonotonicClock, TestClock};

/// Boxed error type used at every hardware trait boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A PWM-capable output pin of an H-bridge driver.
///
/// Duty is expressed in raw counts; `max_duty()` reports the full-scale
/// value for the pin's configured resolution.
pub trait PwmPin {
    fn set_duty(&mut self, duty: u32) -> HwResult<()>;
    fn max_duty(&self) -> u32;
}

/// An analog current-sense input (e.g. the IPROPI pin of a DRV8876),
/// read directly in millivolts.
pub trait CurrentSense {
    fn read_millivolts(&mut self) -> HwResult<u32>;
}

/// A magnetic absolute-angle sensor (AS5600-style) exposing a cumulative,
/// signed tick count across full revolutions.
///
/// The caller is responsible for routing the I2C bus to the sensor's port
/// (via [`MuxSwitch`]) before any of these methods are invoked.
pub trait AngleSensor {
    /// Probe the sensor on the bus; `false` means it did not acknowledge.
    fn probe(&mut self) -> HwResult<bool>;
    /// `true` when a magnet is present in front of the sensor.
    fn magnet_detected(&mut self) -> HwResult<bool>;
    /// Cumulative tick count; 4096 ticks per full revolution, signed.
    fn cumulative_ticks(&mut self) -> HwResult<i32>;
}

/// The shared I2C multiplexer (TCA9546A-style) routing the bus to one of
/// the belt encoders at a time.
pub trait MuxSwitch {
    fn select_port(&mut self, port: u8) -> HwResult<()>;
}

/// Operating state of the host machine, as seen by the supervisor.
///
/// `Unknown` is the bridge variant for host states this subsystem has no
/// mapping for; the supervisor treats it as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Idle,
    Run,
    Hold,
    Jog,
    Alarm,
    Sleep,
    Unknown,
}

/// Read-only view of the host machine consumed by the supervisor's jog
/// passthrough.
pub trait HostMachine {
    fn state(&self) -> HostState;
    /// Current commanded position of the given axis, in mm.
    fn axis_position(&self, axis: usize) -> f32;
}
