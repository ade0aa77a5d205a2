//! Per-belt status exposed to external callers.

/// Coarse result of the belt's last or current command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeltStatus {
    /// Waiting for a command; nothing completed since the last reset.
    Idle,
    /// A command is executing.
    Busy,
    /// The last command finished successfully.
    CompletedSuccess,
    /// The last command failed, or the belt is faulted.
    CompletedError,
}
