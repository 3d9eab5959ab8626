//! The load balancer scenarios and the checks each one runs.

use crate::{
    assertions::Assertions,
    inspector::ResourceInspector,
    outputs::{OutputSet, RequiredOutput},
};
use infratest_common::{
    config::{HarnessConfig, HarnessOptions},
    HarnessError, REGION_ENV_VAR,
};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

pub const OUTPUT_ALB_DNS_NAME: &str = "alb_dns_name";
pub const OUTPUT_ALB_ID: &str = "alb_id";
pub const OUTPUT_TARGET_GROUP_IDS: &str = "target_group_ids";

pub const EXPECTED_STATE_CODE: &str = "active";
pub const EXPECTED_IDLE_TIMEOUT: i64 = 60;
pub const EXPECTED_TARGET_GROUPS: [&str; 4] = ["frontend-tg", "backend-tg", "admin-tg", "static-tg"];

const BASIC_OUTPUTS: &[RequiredOutput] = &[
    RequiredOutput::scalar(OUTPUT_ALB_DNS_NAME),
    RequiredOutput::scalar(OUTPUT_ALB_ID),
];
const ADVANCED_OUTPUTS: &[RequiredOutput] = &[
    RequiredOutput::scalar(OUTPUT_ALB_ID),
    RequiredOutput::map(OUTPUT_TARGET_GROUP_IDS),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Load balancer with default settings, verified against the live API.
    Basic,
    /// Load balancer with custom target groups, verified through outputs.
    Advanced,
}

impl Display for Scenario {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Scenario::Basic),
            "advanced" => Ok(Scenario::Advanced),
            _ => Err(format!("Invalid scenario: {}", s)),
        }
    }
}

impl Scenario {
    pub const ALL: [Scenario; 2] = [Scenario::Basic, Scenario::Advanced];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Basic => "basic",
            Scenario::Advanced => "advanced",
        }
    }

    pub fn required_outputs(&self) -> &'static [RequiredOutput] {
        match self {
            Scenario::Basic => BASIC_OUTPUTS,
            Scenario::Advanced => ADVANCED_OUTPUTS,
        }
    }

    /// Options for this scenario: explicit config entry if present, otherwise
    /// `<target_root>/<name>`. The stock retryable errors are always merged in
    /// and `AWS_DEFAULT_REGION` always holds [`HarnessConfig::region_for`].
    pub fn options(&self, config: &HarnessConfig) -> HarnessOptions {
        let mut options = config
            .scenarios
            .get(self.name())
            .cloned()
            .unwrap_or_else(|| HarnessOptions::new(config.target_root.join(self.name())));

        let region = config.region_for(&options);
        options.env_vars.insert(REGION_ENV_VAR.to_owned(), region);

        if *self == Scenario::Basic {
            options
                .retryable_errors
                .entry("timeout".to_owned())
                .or_insert_with(|| "Retry on timeout errors".to_owned());
        }

        options.with_default_retryable_errors()
    }

    /// Evaluates the scenario's fixed checks. Errors are reserved for faults
    /// that prevent checking at all; failed checks are only recorded.
    pub async fn verify<I: ResourceInspector + ?Sized>(
        &self,
        outputs: &OutputSet,
        inspector: &I,
        region: &str,
        checks: &mut Assertions,
    ) -> Result<(), HarnessError> {
        match self {
            Scenario::Basic => {
                let dns_name = outputs.scalar(OUTPUT_ALB_DNS_NAME)?;
                let alb_id = outputs.scalar(OUTPUT_ALB_ID)?;
                checks.not_empty(OUTPUT_ALB_DNS_NAME, dns_name);
                if !checks.not_empty(OUTPUT_ALB_ID, alb_id) {
                    // Nothing to look up.
                    return Ok(());
                }

                let alb = inspector
                    .load_balancer(alb_id, region)
                    .await
                    .map_err(|e| HarnessError::InspectionFailed(e.to_string()))?;

                checks.equal("State.Code", EXPECTED_STATE_CODE, alb.state_code.as_str());
                checks.reported("EnableHttp2", &true, alb.enable_http2.as_ref());
                checks.reported(
                    "EnableCrossZoneLoadBalancing",
                    &true,
                    alb.enable_cross_zone_load_balancing.as_ref(),
                );
                checks.reported(
                    "IdleTimeout",
                    &EXPECTED_IDLE_TIMEOUT,
                    alb.idle_timeout.as_ref(),
                );
            }
            Scenario::Advanced => {
                let alb_id = outputs.scalar(OUTPUT_ALB_ID)?;
                let target_groups = outputs.map(OUTPUT_TARGET_GROUP_IDS)?;
                checks.not_empty(OUTPUT_ALB_ID, alb_id);
                checks.map_not_empty(OUTPUT_TARGET_GROUP_IDS, target_groups);
                for key in EXPECTED_TARGET_GROUPS {
                    checks.contains_key(
                        &format!("{OUTPUT_TARGET_GROUP_IDS}[{key}]"),
                        target_groups,
                        key,
                    );
                }
            }
        }
        Ok(())
    }
}
