#![cfg(unix)]

mod common;

use common::{FakeInspector, ALB_ARN};
use infratest::{Harness, Provisioner, Scenario, Teardown, TerraformCli};
use infratest_common::{config::HarnessOptions, HarnessError, ToolError};
use serde_json::json;
use std::{fs, os::unix::fs::PermissionsExt, path::Path};
use tempfile::TempDir;

/// Stand-in for the terraform binary: logs its arguments and answers
/// `output -json` from a fixed table.
const STUB: &str = r#"#!/bin/sh
echo "$*" >> "$STUB_LOG"
for last in "$@"; do :; done
case "$1" in
  output)
    case "$last" in
      alb_dns_name) echo '"infratest-basic-1.us-west-2.elb.amazonaws.com"' ;;
      alb_id) echo "\"$STUB_ALB_ID\"" ;;
      target_group_ids) echo '{"frontend-tg":"tg-1","backend-tg":"tg-2","admin-tg":"tg-3","static-tg":"tg-4"}' ;;
      broken_backend) echo "Error: Failed to load state: S3 bucket \"tf-state\" not found" >&2; exit 1 ;;
      *) echo "Error: Output \"$last\" not found" >&2; exit 1 ;;
    esac
    ;;
  apply)
    if [ -n "$STUB_APPLY_ERROR" ] && [ ! -f "$STUB_LOG.applied" ]; then
      touch "$STUB_LOG.applied"
      echo "$STUB_APPLY_ERROR" >&2
      exit 1
    fi
    ;;
esac
exit 0
"#;

struct Stub {
    dir:    TempDir,
    target: TempDir,
}

impl Stub {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("terraform");
        fs::write(&binary, STUB).unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
        Self {
            dir,
            target: tempfile::tempdir().unwrap(),
        }
    }

    fn log_path(&self) -> std::path::PathBuf {
        self.dir.path().join("calls.log")
    }

    fn options(&self) -> HarnessOptions {
        let mut options = HarnessOptions::new(self.target.path());
        options.terraform_binary = self.dir.path().join("terraform").display().to_string();
        options.env_vars.insert(
            "STUB_LOG".to_owned(),
            self.log_path().display().to_string(),
        );
        options
            .env_vars
            .insert("STUB_ALB_ID".to_owned(), ALB_ARN.to_owned());
        options
    }

    fn calls(&self) -> Vec<String> {
        read_lines(&self.log_path())
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[tokio::test]
async fn test_outputs_are_parsed() {
    let stub = Stub::new();
    let cli = TerraformCli::new();
    let options = stub.options();

    assert_eq!(cli.output(&options, "alb_id").await.unwrap(), ALB_ARN);
    let groups = cli.output_map(&options, "target_group_ids").await.unwrap();
    assert_eq!(groups.len(), 4);
    assert_eq!(groups["static-tg"], "tg-4");

    assert!(matches!(
        cli.output(&options, "alb_arn_suffix").await,
        Err(ToolError::OutputNotFound(_))
    ));
    assert!(matches!(
        cli.output(&options, "broken_backend").await,
        Err(ToolError::Failed { .. })
    ));
    assert_eq!(stub.calls()[0], "output -no-color -json alb_id");
}

#[tokio::test]
async fn test_vars_reach_apply_and_destroy() {
    let stub = Stub::new();
    let cli = TerraformCli::new();
    let mut options = stub.options();
    options.vars.insert("name".to_owned(), json!("alb-ci"));
    options.vars.insert("subnets".to_owned(), json!(["a", "b"]));

    cli.init(&options).await.unwrap();
    cli.apply(&options).await.unwrap();
    cli.destroy(&options).await.unwrap();

    assert_eq!(stub.calls(), vec![
        "init -upgrade=false -input=false -no-color",
        r#"apply -input=false -auto-approve -lock=false -no-color -var name=alb-ci -var subnets=["a","b"]"#,
        r#"destroy -input=false -auto-approve -no-color -var name=alb-ci -var subnets=["a","b"]"#,
    ]);
}

#[tokio::test]
async fn test_failed_command_carries_stderr() {
    let stub = Stub::new();
    let mut options = stub.options();
    options.env_vars.insert(
        "STUB_APPLY_ERROR".to_owned(),
        "Error: creating ELBv2 Load Balancer: AccessDenied".to_owned(),
    );

    let err = TerraformCli::new().apply(&options).await.unwrap_err();
    assert!(err.is_retryable_kind());
    assert!(err.message().contains("AccessDenied"));
}

#[tokio::test]
async fn test_full_run_against_stub_tool() {
    let stub = Stub::new();
    let mut options = stub.options();
    options.env_vars.insert(
        "STUB_APPLY_ERROR".to_owned(),
        "Error: timeout while waiting for state to become 'active'".to_owned(),
    );
    options
        .retryable_errors
        .insert("timeout".to_owned(), "Retry on timeout errors".to_owned());
    options.max_retries = 3;

    let harness = Harness::new(TerraformCli::new(), FakeInspector::active());
    let outcome = harness.run(Scenario::Basic, options, "us-west-2").await;

    assert!(outcome.passed(), "{outcome:?}");
    assert!(matches!(outcome.teardown, Teardown::Destroyed));
    let verbs = stub
        .calls()
        .iter()
        .map(|line| line.split_whitespace().next().unwrap_or_default().to_owned())
        .collect::<Vec<_>>();
    assert_eq!(verbs, vec![
        "init", "apply", "apply", "output", "output", "destroy"
    ]);
}

#[tokio::test]
async fn test_missing_binary_fails_without_retry() {
    let target = tempfile::tempdir().unwrap();
    let mut options = HarnessOptions::new(target.path()).with_default_retryable_errors();
    options.terraform_binary = "/nonexistent/bin/terraform".to_owned();

    let harness = Harness::new(TerraformCli::new(), FakeInspector::active());
    let outcome = harness.run(Scenario::Advanced, options, "us-west-2").await;

    assert!(matches!(
        outcome.failure,
        Some(HarnessError::ProvisioningFailed { attempts: 1, .. })
    ));
    assert!(matches!(outcome.teardown, Teardown::NotRequired));
}
