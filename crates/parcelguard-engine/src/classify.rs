//! Severity tiers and the automatic policy derived from them.
//!
//! ```text
//!   0%          warning_pct        block_pct        critical_label_pct     100%
//!   ├──── Low ─────┼────── High ──────┼──────────── Blocked ───────────────┤
//!                                                        └── "critical" label (display only)
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Below the warning threshold: allowed, no action.
    Low,
    /// Flagged for admin review; no listing is touched.
    High,
    /// At or above the block threshold.
    Blocked,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::High => "high",
            Severity::Blocked => "blocked",
        }
    }

    pub const ALL: [Severity; 3] = [Severity::Low, Severity::High, Severity::Blocked];
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown severity `{s}` (expected low, high or blocked)"))
    }
}

/// Percentage thresholds for the severity tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub warning_pct: f64,
    pub block_pct: f64,
    /// UI-only label; carries no policy of its own.
    pub critical_label_pct: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            warning_pct: 10.0,
            block_pct: 20.0,
            critical_label_pct: 50.0,
        }
    }
}

impl SeverityThresholds {
    pub fn classify(&self, overlap_percentage: f64) -> Severity {
        if overlap_percentage >= self.block_pct {
            Severity::Blocked
        } else if overlap_percentage >= self.warning_pct {
            Severity::High
        } else {
            Severity::Low
        }
    }

    pub fn is_critical(&self, overlap_percentage: f64) -> bool {
        overlap_percentage >= self.critical_label_pct
    }

    /// Display label: the severity name, or `critical` past the label threshold.
    pub fn label(&self, overlap_percentage: f64) -> &'static str {
        if self.is_critical(overlap_percentage) {
            "critical"
        } else {
            self.classify(overlap_percentage).as_str()
        }
    }
}

pub fn classify(overlap_percentage: f64, thresholds: &SeverityThresholds) -> Severity {
    thresholds.classify(overlap_percentage)
}

/// When a policy decision is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyContext {
    /// A new parcel is being created.
    Submission,
    /// Batch scan over parcels that are already live.
    Retrospective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Warn,
    AutoReject,
}

/// Automatic action for a severity tier.
///
/// Only a submission can be auto-rejected. Retrospective `Blocked` overlaps
/// involve two live listings and go to administrators instead.
pub fn policy_action(severity: Severity, context: PolicyContext) -> PolicyAction {
    match (severity, context) {
        (Severity::Low, _) => PolicyAction::Allow,
        (Severity::High, _) => PolicyAction::Warn,
        (Severity::Blocked, PolicyContext::Submission) => PolicyAction::AutoReject,
        (Severity::Blocked, PolicyContext::Retrospective) => PolicyAction::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundaries() {
        let t = SeverityThresholds::default();
        assert_eq!(t.classify(9.999), Severity::Low);
        assert_eq!(t.classify(10.0), Severity::High);
        assert_eq!(t.classify(19.999), Severity::High);
        assert_eq!(t.classify(20.0), Severity::Blocked);
        assert_eq!(t.classify(100.0), Severity::Blocked);
        assert_eq!(t.classify(0.0), Severity::Low);
    }

    #[test]
    fn critical_is_a_label_only() {
        let t = SeverityThresholds::default();
        assert_eq!(t.classify(75.0), Severity::Blocked);
        assert_eq!(t.label(75.0), "critical");
        assert_eq!(t.label(49.9), "blocked");
        assert_eq!(t.label(12.0), "high");
        assert_eq!(
            policy_action(t.classify(75.0), PolicyContext::Submission),
            policy_action(t.classify(25.0), PolicyContext::Submission)
        );
    }

    #[test]
    fn exact_duplicates_take_the_blocked_path() {
        let t = SeverityThresholds::default();
        assert_eq!(
            policy_action(t.classify(100.0), PolicyContext::Submission),
            PolicyAction::AutoReject
        );
    }

    #[test]
    fn retrospective_blocked_is_surfaced_not_rejected() {
        assert_eq!(
            policy_action(Severity::Blocked, PolicyContext::Retrospective),
            PolicyAction::Warn
        );
        assert_eq!(
            policy_action(Severity::High, PolicyContext::Submission),
            PolicyAction::Warn
        );
        assert_eq!(
            policy_action(Severity::Low, PolicyContext::Submission),
            PolicyAction::Allow
        );
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::High));
        assert!("critical".parse::<Severity>().is_err());
    }
}
