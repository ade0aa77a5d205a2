//! Maps `Box<dyn Error>` from trait boundaries to typed `MaslowError`.
//!
//! The traits in `maslow_traits` use `Box<dyn Error + Send + Sync>` for
//! maximum flexibility; this module converts those to our typed error enum,
//! with an optional feature-gated path for `maslow_hardware::HwError`
//! downcasting.

use crate::error::MaslowError;

/// Map a trait-boundary error to a typed `MaslowError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to a generic hardware error carrying the message.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> MaslowError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<maslow_hardware::error::HwError>() {
            use maslow_hardware::error::HwError;
            return match hw {
                HwError::Nak(port) => {
                    MaslowError::HardwareInit(format!("sensor did not acknowledge on port {port}"))
                }
                HwError::MagnetNotDetected => {
                    MaslowError::HardwareInit("magnet not detected".to_string())
                }
                other => MaslowError::HardwareFault(other.to_string()),
            };
        }
    }

    MaslowError::Hardware(e.to_string())
}
