use crate::{error::HarnessError, retry::RetryPolicy, DEFAULT_REGION, REGION_ENV_VAR};
use clap::Parser;
use eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_TERRAFORM_BINARY: &str = "terraform";
pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_TIME_BETWEEN_RETRIES_SECS: u64 = 5;

/// Transient Terraform failures worth another attempt, keyed by regex.
pub const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    (
        ".*read: connection reset by peer.*",
        "Failed to reach the provider registry.",
    ),
    (".*transport is closing.*", "Failed to reach the remote API."),
    (
        ".*unable to verify signature.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*unable to verify checksum.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*no provider exists with the given name.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*registry service is unreachable.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*Error installing provider.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*Failed to query available provider packages.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*timeout while waiting for plugin to start.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*timed out waiting for server handshake.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "could not query provider registry for",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*Provider produced inconsistent result after apply.*",
        "Provider eventual consistency error.",
    ),
];

#[derive(Debug, Parser)]
pub struct Opt {
    /// Scenarios to run, comma separated.
    #[clap(long, value_delimiter = ',', default_value = "basic")]
    pub scenario: Vec<String>,

    /// Optional TOML file layered under the environment.
    #[clap(long, env = "INFRATEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Terraform directory, only valid with a single scenario.
    #[clap(long)]
    pub target_dir: Option<PathBuf>,

    #[clap(long)]
    pub target_root: Option<PathBuf>,

    #[clap(long)]
    pub region: Option<String>,

    /// Extra input variable, `key=value`; may be repeated.
    #[clap(long = "var", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,

    #[clap(long)]
    pub max_retries: Option<usize>,
}

impl Opt {
    /// Applies the per-run overrides to one scenario's options.
    pub fn apply_to(&self, options: &mut HarnessOptions) {
        if let Some(target_dir) = &self.target_dir {
            options.target_dir = target_dir.clone();
        }

        for (key, value) in &self.vars {
            options
                .vars
                .insert(key.clone(), Value::String(value.clone()));
        }

        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries;
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("invalid KEY=value: no `=` found in `{s}`")),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub aws: Option<AwsConfig>,

    /// Directory holding one Terraform configuration per scenario.
    #[serde(default = "default_target_root")]
    pub target_root: PathBuf,

    /// Explicit options per scenario name; take precedence over `target_root`.
    #[serde(default)]
    pub scenarios: HashMap<String, HarnessOptions>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            region:      default_region(),
            aws:         None,
            target_root: default_target_root(),
            scenarios:   HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AwsConfig {
    /// Useful when using something like LocalStack
    pub endpoint: Option<String>,

    #[serde(default)]
    pub region: Option<String>,
}

impl HarnessConfig {
    pub fn load_config(prefix: &str, config_path: Option<&Path>) -> Result<HarnessConfig> {
        let mut settings = config::Config::builder();

        if let Some(path) = config_path {
            settings = settings.add_source(config::File::from(path).required(true));
        }

        let settings = settings
            .add_source(
                config::Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: HarnessConfig = settings.try_deserialize::<HarnessConfig>()?;

        Ok(config)
    }

    pub fn overwrite_defaults_with_cli_args(&mut self, opts: &Opt) {
        // `--region` replaces every region setting, not just the top-level one.
        if let Some(region) = &opts.region {
            self.region = region.clone();
            if let Some(aws) = &mut self.aws {
                aws.region = None;
            }
            for options in self.scenarios.values_mut() {
                options.env_vars.remove(REGION_ENV_VAR);
            }
        }

        if let Some(target_root) = &opts.target_root {
            self.target_root = target_root.clone();
        }
    }

    /// The one region a scenario is provisioned into and inspected in: an
    /// explicit `AWS_DEFAULT_REGION` in its env vars, then `aws.region`, then
    /// the top-level `region`.
    pub fn region_for(&self, options: &HarnessOptions) -> String {
        options
            .env_vars
            .get(REGION_ENV_VAR)
            .or_else(|| self.aws.as_ref().and_then(|aws| aws.region.as_ref()))
            .unwrap_or(&self.region)
            .clone()
    }
}

/// Options for driving Terraform against one configuration directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessOptions {
    #[serde(default)]
    pub target_dir: PathBuf,

    #[serde(default, with = "named_entries")]
    pub vars: BTreeMap<String, Value>,

    #[serde(default)]
    pub var_files: Vec<PathBuf>,

    #[serde(default, with = "named_entries")]
    pub env_vars: BTreeMap<String, String>,

    #[serde(default = "default_terraform_binary")]
    pub terraform_binary: String,

    #[serde(default = "default_no_color")]
    pub no_color: bool,

    #[serde(default)]
    pub max_retries: usize,

    #[serde(default)]
    pub time_between_retries_secs: u64,

    #[serde(default, with = "pattern_entries")]
    pub retryable_errors: BTreeMap<String, String>,
}

// The `config` crate lowercases table keys, so maps whose keys are
// case-sensitive (env var names, variable names, regexes) are written as
// arrays of `{ name, value }` / `{ pattern, reason }` tables instead.
mod named_entries {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct EntryRef<'a, V> {
        name:  &'a str,
        value: &'a V,
    }

    #[derive(Deserialize)]
    struct Entry<V> {
        name:  String,
        value: V,
    }

    pub fn serialize<S, V>(map: &BTreeMap<String, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_seq(map.iter().map(|(name, value)| EntryRef { name, value }))
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let entries = Vec::<Entry<V>>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.name, e.value)).collect())
    }
}

mod pattern_entries {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct EntryRef<'a> {
        pattern: &'a str,
        reason:  &'a str,
    }

    #[derive(Deserialize)]
    struct Entry {
        pattern: String,
        reason:  String,
    }

    pub fn serialize<S>(map: &BTreeMap<String, String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(
            map.iter()
                .map(|(pattern, reason)| EntryRef { pattern, reason }),
        )
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.pattern, e.reason)).collect())
    }
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            target_dir:                PathBuf::new(),
            vars:                      BTreeMap::new(),
            var_files:                 Vec::new(),
            env_vars:                  BTreeMap::new(),
            terraform_binary:          default_terraform_binary(),
            no_color:                  default_no_color(),
            max_retries:               0,
            time_between_retries_secs: 0,
            retryable_errors:          BTreeMap::new(),
        }
    }
}

impl HarnessOptions {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            ..Default::default()
        }
    }

    /// Merges in the stock transient errors and fills an unset retry policy.
    /// Explicitly configured patterns keep their own justification.
    pub fn with_default_retryable_errors(mut self) -> Self {
        for (pattern, reason) in DEFAULT_RETRYABLE_ERRORS {
            self.retryable_errors
                .entry((*pattern).to_owned())
                .or_insert_with(|| (*reason).to_owned());
        }

        if self.max_retries == 0 {
            self.max_retries = DEFAULT_MAX_RETRIES;
        }

        if self.time_between_retries_secs == 0 {
            self.time_between_retries_secs = DEFAULT_TIME_BETWEEN_RETRIES_SECS;
        }

        self
    }

    pub fn time_between_retries(&self) -> Duration {
        Duration::from_secs(self.time_between_retries_secs)
    }

    /// Checks the options before anything is provisioned and returns the
    /// resolved target directory.
    pub fn validate(&self) -> Result<PathBuf, HarnessError> {
        if self.target_dir.as_os_str().is_empty() {
            return Err(HarnessError::Config("target_dir is not set".to_owned()));
        }

        let target_dir = self.target_dir.canonicalize().map_err(|e| {
            HarnessError::Config(format!(
                "target_dir {} cannot be resolved: {e}",
                self.target_dir.display()
            ))
        })?;

        if !target_dir.is_dir() {
            return Err(HarnessError::Config(format!(
                "target_dir {} is not a directory",
                target_dir.display()
            )));
        }

        for var_file in &self.var_files {
            let path = if var_file.is_absolute() {
                var_file.clone()
            } else {
                target_dir.join(var_file)
            };
            if !path.is_file() {
                return Err(HarnessError::Config(format!(
                    "var file {} does not exist",
                    path.display()
                )));
            }
        }

        if self.terraform_binary.trim().is_empty() {
            return Err(HarnessError::Config(
                "terraform_binary must not be empty".to_owned(),
            ));
        }

        self.retry_policy()?;

        Ok(target_dir)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, HarnessError> {
        RetryPolicy::new(
            self.max_retries,
            self.time_between_retries(),
            &self.retryable_errors,
        )
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_owned()
}

fn default_target_root() -> PathBuf {
    PathBuf::from("examples")
}

fn default_terraform_binary() -> String {
    DEFAULT_TERRAFORM_BINARY.to_owned()
}

fn default_no_color() -> bool {
    true
}
