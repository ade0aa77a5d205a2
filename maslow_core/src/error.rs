use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum MaslowError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("hardware init error: {0}")]
    HardwareInit(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("encoder moves against the commanded motor direction")]
    DirectionMismatch,
    #[error("belt does not move while the motor is driving")]
    Stall,
    #[error("motor overcurrent")]
    Overcurrent,
    #[error("fatal logic error: {0}")]
    FatalLogic(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing i2c multiplexer")]
    MissingMux,
    #[error("missing host machine bridge")]
    MissingHost,
    #[error("missing belts (exactly 4 required)")]
    MissingBelts,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
