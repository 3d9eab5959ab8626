use std::io;
use thiserror::Error;

/// Failures of a single invocation of the provisioning tool.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The tool binary could not be started at all.
    #[error("failed to launch `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}: {output}")]
    Failed {
        command: String,
        status:  String,
        output:  String,
    },

    #[error("output `{0}` not found")]
    OutputNotFound(String),

    #[error("output `{name}` is malformed: {reason}")]
    MalformedOutput { name: String, reason: String },
}

impl ToolError {
    /// Text that retryable-error patterns are matched against.
    pub fn message(&self) -> String {
        match self {
            ToolError::Failed { output, .. } => output.clone(),
            other => other.to_string(),
        }
    }

    /// Whether retrying the same invocation could ever succeed.
    pub fn is_retryable_kind(&self) -> bool {
        matches!(self, ToolError::Failed { .. })
    }
}

/// An Error enum capturing the ways a harness run can fail.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("invalid harness configuration: {0}")]
    Config(String),

    #[error("provisioning failed during {step} after {attempts} attempt(s): {message}")]
    ProvisioningFailed {
        step:     String,
        attempts: usize,
        message:  String,
    },

    #[error("required output `{0}` is missing")]
    OutputMissing(String),

    #[error("resource inspection failed: {0}")]
    InspectionFailed(String),

    #[error("{failed} of {total} check(s) failed: {summary}")]
    AssertionFailed {
        failed:  usize,
        total:   usize,
        summary: String,
    },

    #[error("teardown failed: {0}")]
    TeardownFailed(String),
}

impl HarnessError {
    /// Maps a tool error raised while reading outputs.
    pub fn from_output_error(name: &str, err: ToolError) -> Self {
        match err {
            ToolError::OutputNotFound(_) => HarnessError::OutputMissing(name.to_owned()),
            other => HarnessError::ProvisioningFailed {
                step:     format!("output {name}"),
                attempts: 1,
                message:  other.to_string(),
            },
        }
    }
}
