use clap::Parser;
use eyre::{bail, Result};
use futures::future::join_all;
use infratest::{ElbInspector, Harness, Scenario, Teardown, TerraformCli, TestOutcome};
use infratest_common::{
    config::{HarnessConfig, Opt},
    tracing::initialize_tracing,
};

const CONFIG_PREFIX: &str = "INFRATEST";

fn print_summary(outcome: &TestOutcome) {
    let status = if outcome.passed() { "PASS" } else { "FAIL" };
    println!("{status} {}", outcome.scenario);
    for check in &outcome.checks {
        let mark = if check.passed { "ok  " } else { "FAIL" };
        println!("    {mark} {}: {}", check.check, check.message);
    }
    if let Some(failure) = &outcome.failure {
        println!("    error: {failure}");
    }
    match &outcome.teardown {
        Teardown::NotRequired => println!("    teardown: not required"),
        Teardown::Destroyed => println!("    teardown: destroyed"),
        Teardown::Failed(e) => println!("    teardown: {e}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let opts = Opt::parse();
    initialize_tracing()?;

    let mut config = HarnessConfig::load_config(CONFIG_PREFIX, opts.config.as_deref())?;
    config.overwrite_defaults_with_cli_args(&opts);

    let scenarios = opts
        .scenario
        .iter()
        .map(|name| name.parse::<Scenario>().map_err(|e| eyre::eyre!(e)))
        .collect::<Result<Vec<_>>>()?;
    if opts.target_dir.is_some() && scenarios.len() > 1 {
        bail!("--target-dir can only be used with a single scenario");
    }

    let harness = Harness::new(
        TerraformCli::new(),
        ElbInspector::new(config.aws.as_ref()),
    );
    let harness = &harness;

    let runs = scenarios.iter().map(|&scenario| {
        let mut options = scenario.options(&config);
        opts.apply_to(&mut options);
        let region = config.region_for(&options);
        tracing::info!(%scenario, %region, ?options, "Starting scenario");
        async move { harness.run(scenario, options, &region).await }
    });
    let outcomes = join_all(runs).await;

    for outcome in &outcomes {
        print_summary(outcome);
    }

    let mut failures = 0;
    for outcome in outcomes {
        if let Err(e) = outcome.into_result() {
            tracing::error!("{e:?}");
            failures += 1;
        }
    }
    if failures > 0 {
        bail!("{failures} scenario(s) failed");
    }

    Ok(())
}
