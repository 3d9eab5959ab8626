//! Boundary to the cloud API used to read live resource state.

mod elb;

pub use elb::ElbInspector;

use async_trait::async_trait;
use thiserror::Error;

pub const ATTR_HTTP2_ENABLED: &str = "routing.http2.enabled";
pub const ATTR_CROSS_ZONE_ENABLED: &str = "load_balancing.cross_zone.enabled";
pub const ATTR_IDLE_TIMEOUT: &str = "idle_timeout.timeout_seconds";

const APPLICATION_LOAD_BALANCER: &str = "application";

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("load balancer `{0}` not found")]
    NotFound(String),

    #[error("AWS API error: {0}")]
    Api(String),

    #[error("attribute `{key}` has unexpected value `{value}`")]
    MalformedAttribute { key: String, value: String },
}

/// Point-in-time view of a load balancer as reported by the API. Attributes
/// the API did not report stay `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerSnapshot {
    pub arn:                              String,
    pub name:                             String,
    pub dns_name:                         String,
    pub load_balancer_type:               String,
    pub scheme:                           String,
    pub state_code:                       String,
    pub enable_http2:                     Option<bool>,
    pub enable_cross_zone_load_balancing: Option<bool>,
    pub idle_timeout:                     Option<i64>,
}

impl Default for LoadBalancerSnapshot {
    fn default() -> Self {
        Self {
            arn:                              String::new(),
            name:                             String::new(),
            dns_name:                         String::new(),
            load_balancer_type:               APPLICATION_LOAD_BALANCER.to_owned(),
            scheme:                           String::new(),
            state_code:                       String::new(),
            enable_http2:                     None,
            enable_cross_zone_load_balancing: None,
            idle_timeout:                     None,
        }
    }
}

impl LoadBalancerSnapshot {
    pub fn is_application(&self) -> bool {
        self.load_balancer_type == APPLICATION_LOAD_BALANCER
    }

    /// Folds `DescribeLoadBalancerAttributes` key/value pairs into the snapshot.
    /// Unknown keys are ignored. Cross-zone balancing is always on for
    /// application load balancers, so it is filled in when not reported.
    pub fn apply_attributes<'a>(
        &mut self,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<(), InspectError> {
        for (key, value) in attributes {
            match key {
                ATTR_HTTP2_ENABLED => self.enable_http2 = Some(parse_bool(key, value)?),
                ATTR_CROSS_ZONE_ENABLED => {
                    self.enable_cross_zone_load_balancing = Some(parse_bool(key, value)?)
                }
                ATTR_IDLE_TIMEOUT => {
                    self.idle_timeout = Some(value.trim().parse().map_err(|_| {
                        InspectError::MalformedAttribute {
                            key:   key.to_owned(),
                            value: value.to_owned(),
                        }
                    })?)
                }
                _ => {}
            }
        }

        if self.enable_cross_zone_load_balancing.is_none() && self.is_application() {
            self.enable_cross_zone_load_balancing = Some(true);
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, InspectError> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(InspectError::MalformedAttribute {
            key:   key.to_owned(),
            value: value.to_owned(),
        }),
    }
}

#[async_trait]
pub trait ResourceInspector: Send + Sync {
    /// Looks up a load balancer by ARN or name in `region`.
    async fn load_balancer(
        &self,
        id: &str,
        region: &str,
    ) -> Result<LoadBalancerSnapshot, InspectError>;
}
