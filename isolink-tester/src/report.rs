//! Test run reports
//!
//! A `TestReport` is the completion signal of a test run: one
//! `CheckOutcome` per check per iteration, in execution order, plus totals.
//! Reports serialize to JSON so they can be logged or written to a file.

use isolink_core::ErrorData;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of running one check once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Check name
    pub name: String,
    /// Iteration the check ran in, starting at 0
    pub iteration: u32,
    /// Whether the check passed
    pub passed: bool,
    /// Wall time of the check in milliseconds
    pub elapsed_ms: f64,
    /// Why the check failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorData>,
}

impl CheckOutcome {
    pub fn pass(name: impl Into<String>, iteration: u32, elapsed_ms: f64) -> Self {
        Self {
            name: name.into(),
            iteration,
            passed: true,
            elapsed_ms,
            error: None,
        }
    }

    pub fn fail(name: impl Into<String>, iteration: u32, elapsed_ms: f64, error: ErrorData) -> Self {
        Self {
            name: name.into(),
            iteration,
            passed: false,
            elapsed_ms,
            error: Some(error),
        }
    }
}

/// Outcome of a whole test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    /// Name of the isolate under test
    pub isolate: String,
    /// Every check execution, in order
    pub outcomes: Vec<CheckOutcome>,
    /// Wall time of the run in milliseconds
    pub elapsed_ms: f64,
}

impl TestReport {
    /// Number of check executions
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of passed check executions
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    /// Number of failed check executions
    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    /// True when nothing failed
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Failed outcomes, in order
    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} checks passed in {:.3}ms",
            self.isolate,
            self.passed(),
            self.total(),
            self.elapsed_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> TestReport {
        TestReport {
            isolate: "main".to_string(),
            outcomes: vec![
                CheckOutcome::pass("ping returns pong", 0, 0.2),
                CheckOutcome::fail("ping returns pong", 1, 0.3, ErrorData::timeout()),
            ],
            elapsed_ms: 0.5,
        }
    }

    #[test]
    fn test_report_counts() {
        let report = report();
        assert_eq!(report.total(), 2);
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
        assert_eq!(report.failures().next().unwrap().iteration, 1);
    }

    #[test]
    fn test_report_display() {
        assert_eq!(report().to_string(), "main: 1/2 checks passed in 0.500ms");
    }

    #[test]
    fn test_passed_outcome_omits_error() {
        let json = serde_json::to_value(CheckOutcome::pass("ping", 0, 1.0)).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["passed"], true);
    }

    #[test]
    fn test_empty_report_is_success() {
        let report = TestReport {
            isolate: "main".to_string(),
            outcomes: Vec::new(),
            elapsed_ms: 0.0,
        };
        assert!(report.is_success());
    }
}
