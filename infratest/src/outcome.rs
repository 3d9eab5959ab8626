use crate::{assertions::AssertionResult, scenario::Scenario};
use eyre::{eyre, Report};
use infratest_common::HarnessError;

/// What happened to the provisioned infrastructure at the end of a run.
#[derive(Debug)]
pub enum Teardown {
    /// Initialization never succeeded, so there was nothing to destroy.
    NotRequired,
    Destroyed,
    Failed(HarnessError),
}

#[derive(Debug)]
pub struct TestOutcome {
    pub scenario: Scenario,
    pub checks:   Vec<AssertionResult>,
    /// First error that ended the run, if any.
    pub failure:  Option<HarnessError>,
    pub teardown: Teardown,
}

impl TestOutcome {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            checks: Vec::new(),
            failure: None,
            teardown: Teardown::NotRequired,
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none() && !matches!(self.teardown, Teardown::Failed(_))
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &AssertionResult> {
        self.checks.iter().filter(|check| !check.passed)
    }

    /// Folds the run into a single report; a teardown failure is reported
    /// next to, never instead of, the primary failure.
    pub fn into_result(self) -> eyre::Result<()> {
        let scenario = self.scenario;
        match (self.failure, self.teardown) {
            (None, Teardown::Failed(teardown)) => {
                Err(Report::new(teardown).wrap_err(format!("scenario {scenario}")))
            }
            (Some(failure), Teardown::Failed(teardown)) => Err(eyre!(
                "scenario {scenario}: {failure}; additionally {teardown}"
            )),
            (Some(failure), _) => Err(Report::new(failure).wrap_err(format!("scenario {scenario}"))),
            (None, _) => Ok(()),
        }
    }
}
