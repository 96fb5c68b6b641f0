//! Confirmation seam for destructive operations (restore, backup cleanup).
//!
//! Library code never prompts directly; callers inject a [`Confirm`]
//! implementation. Anything other than an explicit "yes" means no action.

/// Answers a yes/no question before a destructive step.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Non-interactive policy: every prompt is answered "yes" (`--yes`, CI, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, prompt: &str) -> bool {
        tracing::debug!(prompt, "auto-confirmed");
        true
    }
}

/// Non-interactive policy: every prompt is declined.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeNo;

impl Confirm for AssumeNo {
    fn confirm(&self, prompt: &str) -> bool {
        tracing::debug!(prompt, "auto-declined");
        false
    }
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}
