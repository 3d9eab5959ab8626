use infratest_common::HarnessError;
use itertools::Itertools;
use std::{collections::BTreeMap, fmt::Debug};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionResult {
    pub check:   String,
    pub passed:  bool,
    pub message: String,
}

/// Collects check results without stopping at the first failure.
#[derive(Debug, Default)]
pub struct Assertions {
    results: Vec<AssertionResult>,
}

impl Assertions {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, check: &str, passed: bool, message: String) -> bool {
        if passed {
            tracing::debug!(check, "Check passed");
        } else {
            tracing::error!(check, %message, "Check failed");
        }
        self.results.push(AssertionResult {
            check: check.to_owned(),
            passed,
            message,
        });
        passed
    }

    pub fn not_empty(&mut self, check: &str, actual: &str) -> bool {
        let passed = !actual.is_empty();
        let message = if passed {
            format!("{actual:?} is not empty")
        } else {
            "expected a non-empty value, got \"\"".to_owned()
        };
        self.record(check, passed, message)
    }

    pub fn equal<T: PartialEq + Debug + ?Sized>(
        &mut self,
        check: &str,
        expected: &T,
        actual: &T,
    ) -> bool {
        let passed = expected == actual;
        let message = if passed {
            format!("{actual:?} as expected")
        } else {
            format!("expected {expected:?}, got {actual:?}")
        };
        self.record(check, passed, message)
    }

    pub fn is_true(&mut self, check: &str, actual: bool) -> bool {
        self.equal(check, &true, &actual)
    }

    /// Like [`Assertions::equal`] for a value the API may not have reported.
    /// An unreported value fails.
    pub fn reported<T: PartialEq + Debug>(
        &mut self,
        check: &str,
        expected: &T,
        actual: Option<&T>,
    ) -> bool {
        match actual {
            Some(actual) => self.equal(check, expected, actual),
            None => self.record(
                check,
                false,
                format!("expected {expected:?}, value was not reported"),
            ),
        }
    }

    pub fn map_not_empty(&mut self, check: &str, actual: &BTreeMap<String, String>) -> bool {
        let passed = !actual.is_empty();
        let message = if passed {
            format!("{} entries", actual.len())
        } else {
            "expected a non-empty map, got {}".to_owned()
        };
        self.record(check, passed, message)
    }

    /// Presence check only; other keys are allowed.
    pub fn contains_key(
        &mut self,
        check: &str,
        actual: &BTreeMap<String, String>,
        key: &str,
    ) -> bool {
        let passed = actual.contains_key(key);
        let message = if passed {
            format!("{key:?} present")
        } else {
            format!(
                "expected key {key:?}, got keys [{}]",
                actual.keys().join(", ")
            )
        };
        self.record(check, passed, message)
    }

    pub fn results(&self) -> &[AssertionResult] {
        &self.results
    }

    pub fn failed(&self) -> impl Iterator<Item = &AssertionResult> {
        self.results.iter().filter(|result| !result.passed)
    }

    pub fn into_results(self) -> Vec<AssertionResult> {
        self.results
    }

    /// Folds all failed checks into one error, if any.
    pub fn verdict(results: &[AssertionResult]) -> Result<(), HarnessError> {
        let failed = results.iter().filter(|r| !r.passed).collect::<Vec<_>>();
        if failed.is_empty() {
            return Ok(());
        }
        Err(HarnessError::AssertionFailed {
            failed:  failed.len(),
            total:   results.len(),
            summary: failed
                .iter()
                .map(|r| format!("{}: {}", r.check, r.message))
                .join("; "),
        })
    }
}
