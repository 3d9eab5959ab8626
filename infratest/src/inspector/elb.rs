use super::{InspectError, LoadBalancerSnapshot, ResourceInspector};
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_elasticloadbalancingv2::{error::DisplayErrorContext, Client};
use infratest_common::config::AwsConfig;

/// Reads load balancer state through the Elastic Load Balancing v2 API.
#[derive(Debug, Clone, Default)]
pub struct ElbInspector {
    endpoint: Option<String>,
}

impl ElbInspector {
    pub fn new(aws: Option<&AwsConfig>) -> Self {
        Self {
            endpoint: aws.and_then(|aws| aws.endpoint.clone()),
        }
    }

    async fn client(&self, region: &str) -> Client {
        let mut loader = aws_config::from_env().region(Region::new(region.to_owned()));
        if let Some(endpoint) = &self.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;
        Client::new(&shared_config)
    }
}

#[async_trait]
impl ResourceInspector for ElbInspector {
    async fn load_balancer(
        &self,
        id: &str,
        region: &str,
    ) -> Result<LoadBalancerSnapshot, InspectError> {
        tracing::info!(id, region, "Describing load balancer");
        let client = self.client(region).await;

        let request = client.describe_load_balancers();
        let request = if id.starts_with("arn:") {
            request.load_balancer_arns(id)
        } else {
            request.names(id)
        };
        let described = request.send().await.map_err(|e| {
            let not_found = e
                .as_service_error()
                .map(|se| se.is_load_balancer_not_found_exception())
                .unwrap_or(false);
            if not_found {
                InspectError::NotFound(id.to_owned())
            } else {
                InspectError::Api(DisplayErrorContext(&e).to_string())
            }
        })?;

        let lb = described
            .load_balancers()
            .first()
            .ok_or_else(|| InspectError::NotFound(id.to_owned()))?;

        let mut snapshot = LoadBalancerSnapshot {
            arn: lb.load_balancer_arn().unwrap_or_default().to_owned(),
            name: lb.load_balancer_name().unwrap_or_default().to_owned(),
            dns_name: lb.dns_name().unwrap_or_default().to_owned(),
            load_balancer_type: lb
                .r#type()
                .map(|t| t.as_str().to_owned())
                .unwrap_or_default(),
            scheme: lb
                .scheme()
                .map(|s| s.as_str().to_owned())
                .unwrap_or_default(),
            state_code: lb
                .state()
                .and_then(|state| state.code())
                .map(|code| code.as_str().to_owned())
                .unwrap_or_default(),
            ..Default::default()
        };

        let attributes = client
            .describe_load_balancer_attributes()
            .load_balancer_arn(&snapshot.arn)
            .send()
            .await
            .map_err(|e| InspectError::Api(DisplayErrorContext(&e).to_string()))?;

        snapshot.apply_attributes(
            attributes
                .attributes()
                .iter()
                .filter_map(|attribute| Some((attribute.key()?, attribute.value()?))),
        )?;

        tracing::debug!(?snapshot, "Load balancer snapshot");
        Ok(snapshot)
    }
}
