use crate::provisioner::Provisioner;
use infratest_common::{config::HarnessOptions, HarnessError};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Scalar,
    /// Grouped output such as identifiers keyed by target group name.
    Map,
}

/// An output the scenario cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredOutput {
    pub name: &'static str,
    pub kind: OutputKind,
}

impl RequiredOutput {
    pub const fn scalar(name: &'static str) -> Self {
        Self {
            name,
            kind: OutputKind::Scalar,
        }
    }

    pub const fn map(name: &'static str) -> Self {
        Self {
            name,
            kind: OutputKind::Map,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputValue {
    Scalar(String),
    Map(BTreeMap<String, String>),
}

/// Outputs captured once after a successful apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSet {
    values: BTreeMap<String, OutputValue>,
}

impl OutputSet {
    /// Reads every required output; the first missing one aborts the capture.
    pub async fn capture<P: Provisioner + ?Sized>(
        provisioner: &P,
        options: &HarnessOptions,
        required: &[RequiredOutput],
    ) -> Result<Self, HarnessError> {
        let mut values = BTreeMap::new();
        for output in required {
            let value = match output.kind {
                OutputKind::Scalar => provisioner
                    .output(options, output.name)
                    .await
                    .map(OutputValue::Scalar),
                OutputKind::Map => provisioner
                    .output_map(options, output.name)
                    .await
                    .map(OutputValue::Map),
            }
            .map_err(|e| HarnessError::from_output_error(output.name, e))?;

            tracing::info!(output = output.name, value = ?value, "Captured output");
            values.insert(output.name.to_owned(), value);
        }
        Ok(Self { values })
    }

    pub fn scalar(&self, name: &str) -> Result<&str, HarnessError> {
        match self.values.get(name) {
            Some(OutputValue::Scalar(value)) => Ok(value),
            _ => Err(HarnessError::OutputMissing(name.to_owned())),
        }
    }

    pub fn map(&self, name: &str) -> Result<&BTreeMap<String, String>, HarnessError> {
        match self.values.get(name) {
            Some(OutputValue::Map(value)) => Ok(value),
            _ => Err(HarnessError::OutputMissing(name.to_owned())),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, OutputValue)> for OutputSet {
    fn from_iter<T: IntoIterator<Item = (String, OutputValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
