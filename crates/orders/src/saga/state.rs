//! Checkout saga state machine.

use serde::{Deserialize, Serialize};

/// Progress of one checkout attempt.
///
/// State transitions:
/// ```text
/// Start ──► CartRead ──► Priced ──► Reserved ──► Persisted ──► CartCleared
///   │          │           │           │             │
///   └──────────┴───────────┴───────────┴─────────────┴──► Failed
/// ```
///
/// Failing once `Reserved` or `Persisted` is reached requires releasing the
/// reserved stock first; the orchestrator decides compensation from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStep {
    #[default]
    Start,
    /// Checked cart lines loaded.
    CartRead,
    /// Prices and names snapshotted from the catalog.
    Priced,
    /// Stock decremented by the inventory service.
    Reserved,
    /// Order header and lines written, purchased cart lines deleted.
    Persisted,
    /// Success (terminal state).
    CartCleared,
    /// The attempt failed (terminal state).
    Failed,
}

impl CheckoutStep {
    /// Returns the step that follows on success.
    pub fn next(&self) -> Option<CheckoutStep> {
        match self {
            CheckoutStep::Start => Some(CheckoutStep::CartRead),
            CheckoutStep::CartRead => Some(CheckoutStep::Priced),
            CheckoutStep::Priced => Some(CheckoutStep::Reserved),
            CheckoutStep::Reserved => Some(CheckoutStep::Persisted),
            CheckoutStep::Persisted => Some(CheckoutStep::CartCleared),
            CheckoutStep::CartCleared | CheckoutStep::Failed => None,
        }
    }

    /// Returns true if failing after this step must release reserved stock.
    pub fn requires_compensation(&self) -> bool {
        matches!(self, CheckoutStep::Reserved | CheckoutStep::Persisted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStep::Start => "START",
            CheckoutStep::CartRead => "CART_READ",
            CheckoutStep::Priced => "PRICED",
            CheckoutStep::Reserved => "RESERVED",
            CheckoutStep::Persisted => "PERSISTED",
            CheckoutStep::CartCleared => "CART_CLEARED",
            CheckoutStep::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_step_is_start() {
        assert_eq!(CheckoutStep::default(), CheckoutStep::Start);
    }

    #[test]
    fn test_happy_path_order() {
        let mut step = CheckoutStep::Start;
        let mut seen = vec![step];
        while let Some(next) = step.next() {
            step = next;
            seen.push(step);
        }
        assert_eq!(
            seen,
            vec![
                CheckoutStep::Start,
                CheckoutStep::CartRead,
                CheckoutStep::Priced,
                CheckoutStep::Reserved,
                CheckoutStep::Persisted,
                CheckoutStep::CartCleared,
            ]
        );
        assert!(CheckoutStep::Failed.next().is_none());
    }

    #[test]
    fn test_compensation_only_after_reservation() {
        assert!(!CheckoutStep::Start.requires_compensation());
        assert!(!CheckoutStep::CartRead.requires_compensation());
        assert!(!CheckoutStep::Priced.requires_compensation());
        assert!(CheckoutStep::Reserved.requires_compensation());
        assert!(CheckoutStep::Persisted.requires_compensation());
        assert!(!CheckoutStep::CartCleared.requires_compensation());
    }

    #[test]
    fn test_display_matches_serialization() {
        let json = serde_json::to_value(CheckoutStep::CartRead).unwrap();
        assert_eq!(json, serde_json::json!("CART_READ"));
        assert_eq!(CheckoutStep::CartRead.to_string(), "CART_READ");
    }
}
