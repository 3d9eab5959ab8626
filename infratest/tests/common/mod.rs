#![allow(dead_code)]

use async_trait::async_trait;
use infratest::{InspectError, LoadBalancerSnapshot, Provisioner, ResourceInspector};
use infratest_common::{config::HarnessOptions, ToolError, REGION_ENV_VAR};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex},
};

pub const ALB_ARN: &str =
    "arn:aws:elasticloadbalancing:us-west-2:123456789012:loadbalancer/app/infratest-basic/50dc6c495c0c9188";

pub fn failed(output: &str) -> ToolError {
    ToolError::Failed {
        command: "terraform apply".to_owned(),
        status:  "exit status: 1".to_owned(),
        output:  output.to_owned(),
    }
}

/// Scripted provisioner that records every call it receives.
#[derive(Default)]
pub struct FakeProvisioner {
    calls:          Arc<Mutex<Vec<String>>>,
    init_failures:  Mutex<VecDeque<ToolError>>,
    apply_failures: Mutex<VecDeque<ToolError>>,
    destroy_error:  Mutex<Option<ToolError>>,
    apply_regions:  Mutex<Vec<Option<String>>>,
    scalars:        BTreeMap<String, String>,
    maps:           BTreeMap<String, BTreeMap<String, String>>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outputs of a healthy basic deployment.
    pub fn basic() -> Self {
        Self::new()
            .with_output("alb_dns_name", "infratest-basic-1.us-west-2.elb.amazonaws.com")
            .with_output("alb_id", ALB_ARN)
    }

    /// Outputs of a healthy advanced deployment.
    pub fn advanced() -> Self {
        Self::new().with_output("alb_id", ALB_ARN).with_map(
            "target_group_ids",
            &["frontend-tg", "backend-tg", "admin-tg", "static-tg"],
        )
    }

    pub fn with_output(mut self, name: &str, value: &str) -> Self {
        self.scalars.insert(name.to_owned(), value.to_owned());
        self
    }

    pub fn with_map(mut self, name: &str, keys: &[&str]) -> Self {
        let map = keys
            .iter()
            .enumerate()
            .map(|(i, key)| (key.to_string(), format!("arn:aws:elasticloadbalancing:tg/{key}/{i}")))
            .collect();
        self.maps.insert(name.to_owned(), map);
        self
    }

    pub fn fail_init(self, err: ToolError) -> Self {
        self.init_failures.lock().unwrap().push_back(err);
        self
    }

    pub fn fail_apply(self, err: ToolError) -> Self {
        self.apply_failures.lock().unwrap().push_back(err);
        self
    }

    pub fn fail_destroy(self, err: ToolError) -> Self {
        *self.destroy_error.lock().unwrap() = Some(err);
        self
    }

    /// Handle to the call log that outlives the provisioner.
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        count(&self.calls, call)
    }

    /// `AWS_DEFAULT_REGION` as seen by each `apply`.
    pub fn apply_regions(&self) -> Vec<Option<String>> {
        self.apply_regions.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn count(calls: &Mutex<Vec<String>>, call: &str) -> usize {
    calls.lock().unwrap().iter().filter(|c| *c == call).count()
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn init(&self, _options: &HarnessOptions) -> Result<(), ToolError> {
        self.record("init".to_owned());
        match self.init_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn apply(&self, options: &HarnessOptions) -> Result<(), ToolError> {
        self.record("apply".to_owned());
        self.apply_regions
            .lock()
            .unwrap()
            .push(options.env_vars.get(REGION_ENV_VAR).cloned());
        match self.apply_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn output(&self, _options: &HarnessOptions, name: &str) -> Result<String, ToolError> {
        self.record(format!("output {name}"));
        self.scalars
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::OutputNotFound(name.to_owned()))
    }

    async fn output_map(
        &self,
        _options: &HarnessOptions,
        name: &str,
    ) -> Result<BTreeMap<String, String>, ToolError> {
        self.record(format!("output_map {name}"));
        self.maps
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::OutputNotFound(name.to_owned()))
    }

    async fn destroy(&self, _options: &HarnessOptions) -> Result<(), ToolError> {
        self.record("destroy".to_owned());
        match self.destroy_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub enum InspectorBehaviour {
    Snapshot(LoadBalancerSnapshot),
    Error,
    Panic,
}

pub struct FakeInspector {
    behaviour: InspectorBehaviour,
    lookups:   Mutex<Vec<(String, String)>>,
}

impl FakeInspector {
    pub fn new(behaviour: InspectorBehaviour) -> Self {
        Self {
            behaviour,
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn active() -> Self {
        Self::new(InspectorBehaviour::Snapshot(active_snapshot()))
    }

    pub fn lookups(&self) -> Vec<(String, String)> {
        self.lookups.lock().unwrap().clone()
    }
}

pub fn active_snapshot() -> LoadBalancerSnapshot {
    LoadBalancerSnapshot {
        arn: ALB_ARN.to_owned(),
        name: "infratest-basic".to_owned(),
        dns_name: "infratest-basic-1.us-west-2.elb.amazonaws.com".to_owned(),
        scheme: "internet-facing".to_owned(),
        state_code: "active".to_owned(),
        enable_http2: Some(true),
        enable_cross_zone_load_balancing: Some(true),
        idle_timeout: Some(60),
        ..Default::default()
    }
}

#[async_trait]
impl ResourceInspector for FakeInspector {
    async fn load_balancer(
        &self,
        id: &str,
        region: &str,
    ) -> Result<LoadBalancerSnapshot, InspectError> {
        self.lookups
            .lock()
            .unwrap()
            .push((id.to_owned(), region.to_owned()));
        match &self.behaviour {
            InspectorBehaviour::Snapshot(snapshot) => Ok(snapshot.clone()),
            InspectorBehaviour::Error => Err(InspectError::Api("throttled".to_owned())),
            InspectorBehaviour::Panic => panic!("inspector blew up"),
        }
    }
}

/// Options pointing at a real, empty directory with an instant retry policy.
pub fn options_in(dir: &tempfile::TempDir, max_retries: usize) -> HarnessOptions {
    let mut options = HarnessOptions::new(dir.path());
    options.max_retries = max_retries;
    options
        .retryable_errors
        .insert("timeout".to_owned(), "Retry on timeout errors".to_owned());
    options
}
