use serde::{Deserialize, Serialize};

/// Verdict of the command filter for one command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandCheckResult {
    /// Whether the command may be forwarded to the shell
    pub allowed: bool,

    /// Reason for the decision
    pub reason: String,

    /// Heuristic risk in `0.0..=1.0`; informational unless the command was blocked
    pub risk_score: f64,

    /// The pattern that decided the outcome (if any)
    pub matched_pattern: Option<String>,
}

impl CommandCheckResult {
    /// Create an "allowed" result.
    pub fn allowed(reason: impl Into<String>, risk_score: f64, matched_pattern: Option<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            risk_score,
            matched_pattern,
        }
    }

    /// Create a "blocked" result.
    pub fn blocked(reason: impl Into<String>, risk_score: f64, matched_pattern: Option<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            risk_score,
            matched_pattern,
        }
    }
}
