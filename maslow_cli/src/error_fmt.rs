//! Human-readable error descriptions and stable exit codes.

use maslow_core::{BuildError, MaslowError};

/// Map an eyre::Report to an explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingMux => {
                "What happened: No I2C multiplexer was provided to the supervisor.\nLikely causes: The TCA9546A failed to initialize or was not wired into the builder.\nHow to fix: Ensure the multiplexer is created successfully and passed via mux(...).".to_string()
            }
            BuildError::MissingHost => {
                "What happened: No host machine bridge was provided to the supervisor.\nLikely causes: The host state adapter was not wired into the builder.\nHow to fix: Pass the host bridge via host(...).".to_string()
            }
            BuildError::MissingBelts => {
                "What happened: The supervisor was not given exactly four belts.\nLikely causes: A belt's hardware failed to initialize, or a belt(...) call is missing.\nHow to fix: Provide all four belt hardware bundles, in belt order.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(me) = err.downcast_ref::<MaslowError>() {
        if let MaslowError::HardwareInit(msg) = me {
            return format!(
                "What happened: A belt sensor failed to initialize ({msg}).\nLikely causes: Encoder not acknowledging on its multiplexer port, or no magnet in front of the AS5600.\nHow to fix: Check the encoder wiring and the [belt] port assignments in the config."
            );
        }
        return format!(
            "What happened: {me}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = std::error::Error::source(
        err.as_ref() as &(dyn std::error::Error + 'static)
    ) {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {err}"
    )
}

/// Stable exit codes: config problems 2, hardware init 3, everything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(me) = err.downcast_ref::<MaslowError>() {
        return match me {
            MaslowError::Config(_) => 2,
            MaslowError::HardwareInit(_) => 3,
            _ => 1,
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    1
}
