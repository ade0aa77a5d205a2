use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("sensor did not acknowledge on port {0}")]
    Nak(u8),
    #[error("magnet not detected")]
    MagnetNotDetected,
    #[error("pwm error: {0}")]
    Pwm(String),
    #[error("adc error: {0}")]
    Adc(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
