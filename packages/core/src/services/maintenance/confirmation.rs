//! Confirmation gate for destructive maintenance
//!
//! Rebuild and rollback ask the gate before touching the store. A declined
//! prompt ends the operation with `MaintenanceOutcome::Aborted`.

/// Asked once before a destructive step runs
pub trait ConfirmationGate: Send + Sync {
    /// Return `true` to proceed
    fn confirm(&self, prompt: &str) -> bool;
}

/// Explicit override: every prompt is accepted
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl ConfirmationGate for AssumeYes {
    fn confirm(&self, prompt: &str) -> bool {
        tracing::debug!("Confirmation assumed: {}", prompt);
        true
    }
}

/// Parse an interactive answer: only `y`/`yes` (any case) proceed
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
