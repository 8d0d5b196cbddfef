//! Results of running test files.

use std::fmt;

/// How one test ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Skipped { reason: String },
    Failed { reason: String },
}

impl TestOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TestOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TestOutcome::Failed { .. })
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::Passed => write!(f, "passed"),
            TestOutcome::Skipped { reason } => write!(f, "skipped ({})", reason),
            TestOutcome::Failed { reason } => write!(f, "FAILED: {}", reason),
        }
    }
}

/// Outcome of one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub description: String,
    pub outcome: TestOutcome,
}

/// Outcome of every test in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub description: String,
    /// Set when the whole file was skipped; `tests` is then empty
    pub skipped: Option<String>,
    pub tests: Vec<TestReport>,
}

impl FileReport {
    pub(crate) fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            skipped: None,
            tests: Vec::new(),
        }
    }

    pub(crate) fn skipped(description: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            skipped: Some(reason.into()),
            tests: Vec::new(),
        }
    }

    pub fn passed(&self) -> usize {
        self.tests.iter().filter(|t| t.outcome.is_passed()).count()
    }

    pub fn skipped_tests(&self) -> usize {
        self.tests.iter().filter(|t| t.outcome.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.tests.iter().filter(|t| t.outcome.is_failed()).count()
    }

    /// No test failed.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Outcome of the test with the given description.
    pub fn outcome(&self, description: &str) -> Option<&TestOutcome> {
        self.tests
            .iter()
            .find(|t| t.description == description)
            .map(|t| &t.outcome)
    }

    /// The failed tests.
    pub fn failures(&self) -> impl Iterator<Item = &TestReport> {
        self.tests.iter().filter(|t| t.outcome.is_failed())
    }
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reason) = &self.skipped {
            return write!(f, "{}: skipped ({})", self.description, reason);
        }
        writeln!(
            f,
            "{}: {} passed, {} skipped, {} failed",
            self.description,
            self.passed(),
            self.skipped_tests(),
            self.failed()
        )?;
        for test in &self.tests {
            writeln!(f, "  {}: {}", test.description, test.outcome)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> FileReport {
        let mut report = FileReport::new("crud");
        report.tests.push(TestReport {
            description: "insert".into(),
            outcome: TestOutcome::Passed,
        });
        report.tests.push(TestReport {
            description: "delete".into(),
            outcome: TestOutcome::Skipped {
                reason: "not yet".into(),
            },
        });
        report.tests.push(TestReport {
            description: "update".into(),
            outcome: TestOutcome::Failed {
                reason: "boom".into(),
            },
        });
        report
    }

    #[test]
    fn counts() {
        let report = report();
        assert_eq!(report.passed(), 1);
        assert_eq!(report.skipped_tests(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.outcome("insert"), Some(&TestOutcome::Passed));
        assert_eq!(report.outcome("missing"), None);
    }

    #[test]
    fn display_lists_tests() {
        let text = report().to_string();
        assert!(text.starts_with("crud: 1 passed, 1 skipped, 1 failed"));
        assert!(text.contains("update: FAILED: boom"));
    }

    #[test]
    fn skipped_file_display() {
        let report = FileReport::skipped("crud", "requirements not met");
        assert!(report.is_success());
        assert_eq!(report.to_string(), "crud: skipped (requirements not met)");
    }
}
