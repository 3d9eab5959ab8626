//! Orchestration of a single scenario run:
//! init -> apply (bounded retry) -> read outputs -> inspect -> assert -> destroy.
//!
//! Once `init` has succeeded the run owns a [`ProvisionedSession`], and the
//! session is always destroyed before `run` returns, whether the exercise
//! phase succeeded, failed, or panicked.

use crate::{
    assertions::Assertions,
    inspector::ResourceInspector,
    outcome::{Teardown, TestOutcome},
    outputs::OutputSet,
    provisioner::Provisioner,
    scenario::Scenario,
};
use futures::FutureExt;
use infratest_common::{config::HarnessOptions, HarnessError, RetryPolicy, REGION_ENV_VAR};
use std::panic::{self, AssertUnwindSafe};
use tracing::Instrument;
use uuid::Uuid;

/// Infrastructure that has been initialized and may hold real resources.
#[derive(Debug)]
pub struct ProvisionedSession {
    options:  HarnessOptions,
    released: bool,
}

impl ProvisionedSession {
    fn new(options: HarnessOptions) -> Self {
        Self {
            options,
            released: false,
        }
    }

    pub fn options(&self) -> &HarnessOptions {
        &self.options
    }

    /// Destroys everything the session provisioned. Single attempt.
    pub async fn destroy<P: Provisioner + ?Sized>(
        mut self,
        provisioner: &P,
    ) -> Result<(), HarnessError> {
        self.released = true;
        tracing::info!(target_dir = %self.options.target_dir.display(), "Destroying infrastructure");
        provisioner
            .destroy(&self.options)
            .await
            .map_err(|e| HarnessError::TeardownFailed(e.to_string()))
    }
}

impl Drop for ProvisionedSession {
    fn drop(&mut self) {
        if !self.released {
            tracing::error!(
                target_dir = %self.options.target_dir.display(),
                "Provisioned session dropped without teardown, resources may be leaking"
            );
        }
    }
}

pub struct Harness<P, I> {
    provisioner: P,
    inspector:   I,
}

impl<P: Provisioner, I: ResourceInspector> Harness<P, I> {
    pub fn new(provisioner: P, inspector: I) -> Self {
        Self {
            provisioner,
            inspector,
        }
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    pub fn inspector(&self) -> &I {
        &self.inspector
    }

    /// Runs one scenario. `region` is both where Terraform provisions (it
    /// overrides `AWS_DEFAULT_REGION` in the options) and where the live
    /// resource is inspected.
    pub async fn run(
        &self,
        scenario: Scenario,
        mut options: HarnessOptions,
        region: &str,
    ) -> TestOutcome {
        let span = tracing::info_span!("scenario", %scenario, region, run_id = %Uuid::new_v4());
        let previous = options
            .env_vars
            .insert(REGION_ENV_VAR.to_owned(), region.to_owned());
        if let Some(previous) = previous.filter(|previous| previous != region) {
            span.in_scope(|| {
                tracing::warn!(%previous, "Replacing AWS_DEFAULT_REGION with the inspection region")
            });
        }

        self.run_inner(scenario, options, region)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        scenario: Scenario,
        options: HarnessOptions,
        region: &str,
    ) -> TestOutcome {
        let mut outcome = TestOutcome::new(scenario);

        let (session, policy) = match self.provision(options).await {
            Ok(acquired) => acquired,
            Err(e) => {
                tracing::error!(error = %e, "Initialization failed, nothing to tear down");
                outcome.failure = Some(e);
                return outcome;
            }
        };

        let mut checks = Assertions::new();
        let exercised = AssertUnwindSafe(self.exercise(
            &session,
            &policy,
            scenario,
            region,
            &mut checks,
        ))
        .catch_unwind()
        .await;

        outcome.teardown = match session.destroy(&self.provisioner).await {
            Ok(()) => {
                tracing::info!("Teardown complete");
                Teardown::Destroyed
            }
            Err(e) => {
                tracing::error!(error = %e, "Teardown failed");
                Teardown::Failed(e)
            }
        };
        outcome.checks = checks.into_results();

        match exercised {
            Ok(Ok(())) => outcome.failure = Assertions::verdict(&outcome.checks).err(),
            Ok(Err(e)) => outcome.failure = Some(e),
            Err(payload) => panic::resume_unwind(payload),
        }

        match &outcome.failure {
            None => tracing::info!(checks = outcome.checks.len(), "Scenario passed"),
            Some(e) => tracing::error!(error = %e, "Scenario failed"),
        }
        outcome
    }

    /// Validates the options and runs `init`. The returned session must be
    /// destroyed.
    async fn provision(
        &self,
        options: HarnessOptions,
    ) -> Result<(ProvisionedSession, RetryPolicy), HarnessError> {
        let target_dir = options.validate()?;
        let policy = options.retry_policy()?;
        tracing::info!(target_dir = %target_dir.display(), "Initializing");

        let provisioner = &self.provisioner;
        let init_options = &options;
        policy
            .run("init", move || provisioner.init(init_options))
            .await?;

        Ok((ProvisionedSession::new(options), policy))
    }

    async fn exercise(
        &self,
        session: &ProvisionedSession,
        policy: &RetryPolicy,
        scenario: Scenario,
        region: &str,
        checks: &mut Assertions,
    ) -> Result<(), HarnessError> {
        let provisioner = &self.provisioner;
        let options = session.options();

        tracing::info!(max_retries = policy.max_retries(), "Applying");
        policy
            .run("apply", move || provisioner.apply(options))
            .await?;

        let outputs =
            OutputSet::capture(provisioner, options, scenario.required_outputs()).await?;

        scenario
            .verify(&outputs, &self.inspector, region, checks)
            .await
    }
}
