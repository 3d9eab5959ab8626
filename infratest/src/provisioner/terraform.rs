use super::{parse_map_output, parse_scalar_output, render_var, Provisioner};
use async_trait::async_trait;
use infratest_common::{config::HarnessOptions, ToolError};
use itertools::Itertools;
use std::{collections::BTreeMap, process::Stdio};
use tokio::process::Command;

/// Drives the `terraform` (or a compatible) binary as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformCli;

/// Captured result of one tool invocation.
#[derive(Debug)]
struct CommandOutput {
    stdout: String,
    stderr: String,
}

impl TerraformCli {
    pub fn new() -> Self {
        Self
    }

    fn init_args(options: &HarnessOptions) -> Vec<String> {
        let mut args = vec![
            "init".to_owned(),
            "-upgrade=false".to_owned(),
            "-input=false".to_owned(),
        ];
        if options.no_color {
            args.push("-no-color".to_owned());
        }
        args
    }

    fn apply_args(options: &HarnessOptions) -> Vec<String> {
        let mut args = vec![
            "apply".to_owned(),
            "-input=false".to_owned(),
            "-auto-approve".to_owned(),
            "-lock=false".to_owned(),
        ];
        if options.no_color {
            args.push("-no-color".to_owned());
        }
        args.extend(Self::var_args(options));
        args
    }

    fn destroy_args(options: &HarnessOptions) -> Vec<String> {
        let mut args = vec![
            "destroy".to_owned(),
            "-input=false".to_owned(),
            "-auto-approve".to_owned(),
        ];
        if options.no_color {
            args.push("-no-color".to_owned());
        }
        args.extend(Self::var_args(options));
        args
    }

    fn output_args(name: &str) -> Vec<String> {
        vec![
            "output".to_owned(),
            "-no-color".to_owned(),
            "-json".to_owned(),
            name.to_owned(),
        ]
    }

    /// `-var-file` flags first so explicit `-var` values win.
    fn var_args(options: &HarnessOptions) -> Vec<String> {
        let var_files = options
            .var_files
            .iter()
            .map(|path| format!("-var-file={}", path.display()));
        let vars = options
            .vars
            .iter()
            .flat_map(|(name, value)| ["-var".to_owned(), format!("{name}={}", render_var(value))]);
        var_files.chain(vars).collect()
    }

    async fn run(
        &self,
        options: &HarnessOptions,
        args: Vec<String>,
    ) -> Result<CommandOutput, ToolError> {
        let command_line = format!("{} {}", options.terraform_binary, args.iter().join(" "));
        tracing::info!(
            command = %command_line,
            target_dir = %options.target_dir.display(),
            "Running provisioning tool"
        );

        let output = Command::new(&options.terraform_binary)
            .args(&args)
            .current_dir(&options.target_dir)
            .envs(&options.env_vars)
            .env("TF_IN_AUTOMATION", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                binary: options.terraform_binary.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stdout.lines() {
            tracing::debug!(target: "infratest::terraform", "{line}");
        }
        for line in stderr.lines() {
            tracing::debug!(target: "infratest::terraform", stream = "stderr", "{line}");
        }

        if !output.status.success() {
            return Err(ToolError::Failed {
                command: command_line,
                status:  output.status.to_string(),
                output:  format!("{stderr}\n{stdout}"),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    async fn raw_output(&self, options: &HarnessOptions, name: &str) -> Result<String, ToolError> {
        match self.run(options, Self::output_args(name)).await {
            Ok(output) => {
                if !output.stderr.trim().is_empty() {
                    tracing::warn!(output = name, stderr = %output.stderr.trim(), "Output produced warnings");
                }
                Ok(output.stdout)
            }
            Err(ToolError::Failed { output, .. }) if is_missing_output(&output, name) => {
                Err(ToolError::OutputNotFound(name.to_owned()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Terraform's own wording for an output that is absent from the state.
fn is_missing_output(output: &str, name: &str) -> bool {
    output.contains(&format!("Output \"{name}\" not found")) || output.contains("No outputs found")
}

#[async_trait]
impl Provisioner for TerraformCli {
    async fn init(&self, options: &HarnessOptions) -> Result<(), ToolError> {
        self.run(options, Self::init_args(options)).await?;
        Ok(())
    }

    async fn apply(&self, options: &HarnessOptions) -> Result<(), ToolError> {
        self.run(options, Self::apply_args(options)).await?;
        Ok(())
    }

    async fn output(&self, options: &HarnessOptions, name: &str) -> Result<String, ToolError> {
        let raw = self.raw_output(options, name).await?;
        parse_scalar_output(name, &raw)
    }

    async fn output_map(
        &self,
        options: &HarnessOptions,
        name: &str,
    ) -> Result<BTreeMap<String, String>, ToolError> {
        let raw = self.raw_output(options, name).await?;
        parse_map_output(name, &raw)
    }

    async fn destroy(&self, options: &HarnessOptions) -> Result<(), ToolError> {
        self.run(options, Self::destroy_args(options)).await?;
        Ok(())
    }
}
