pub mod config;
pub mod error;
pub mod retry;
pub mod tracing;

pub use error::{HarnessError, ToolError};
pub use retry::RetryPolicy;

/// Environment variable selecting the region for both Terraform and AWS API calls.
pub const REGION_ENV_VAR: &str = "AWS_DEFAULT_REGION";
pub const DEFAULT_REGION: &str = "us-west-2";
