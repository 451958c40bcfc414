//! Batch summary: counts, byte total and a bounded failure listing

use crate::types::{Outcome, OutcomeStatus};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const RULE_WIDTH: usize = 60;

/// One failed item in a [`Report`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureEntry {
    /// Item identifier
    pub id: String,
    /// Item display name
    pub display_name: String,
    /// Final error text
    pub detail: String,
    /// Attempts made
    pub attempts: u32,
}

/// Aggregate of a batch's outcomes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    /// Items stored
    pub succeeded: usize,
    /// Items failed
    pub failed: usize,
    /// Exact sum of body lengths over successful items
    pub total_bytes: u64,
    /// Failed items, in the order the outcomes were given
    pub failures: Vec<FailureEntry>,
}

impl Report {
    /// Aggregate `outcomes`
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let mut report = Report::default();
        for outcome in outcomes {
            match &outcome.status {
                OutcomeStatus::Success { bytes } => {
                    report.succeeded += 1;
                    report.total_bytes += bytes;
                }
                OutcomeStatus::Failure { error } => {
                    report.failed += 1;
                    report.failures.push(FailureEntry {
                        id: outcome.id.clone(),
                        display_name: outcome.display_name.clone(),
                        detail: error.to_string(),
                        attempts: outcome.attempts,
                    });
                }
            }
        }
        report
    }

    /// Items accounted for
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Whether every item was stored
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Byte total in MiB
    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_MB
    }

    /// Text summary listing at most `limit` failures
    pub fn render(&self, limit: usize) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut lines = vec![
            rule.clone(),
            format!("Successfully downloaded: {}", self.succeeded),
            format!("Failed: {}", self.failed),
        ];

        if !self.failures.is_empty() {
            lines.push(String::new());
            if self.failures.len() <= limit {
                lines.push("Failed downloads:".to_string());
            } else {
                lines.push(format!("First {limit} failures:"));
            }
            lines.extend(
                self.failures
                    .iter()
                    .take(limit)
                    .map(|failure| format!("   - {}: {}", failure.id, failure.detail)),
            );
            if self.failures.len() > limit {
                lines.push(format!("   ... and {} more", self.failures.len() - limit));
            }
        }

        lines.push(String::new());
        lines.push(format!("Total downloaded: {:.2} MB", self.total_mb()));
        lines.push(rule);

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}
