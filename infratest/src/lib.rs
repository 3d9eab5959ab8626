pub mod assertions;
pub mod harness;
pub mod inspector;
pub mod outcome;
pub mod outputs;
pub mod provisioner;
pub mod scenario;

pub use assertions::{AssertionResult, Assertions};
pub use harness::{Harness, ProvisionedSession};
pub use inspector::{ElbInspector, InspectError, LoadBalancerSnapshot, ResourceInspector};
pub use outcome::{Teardown, TestOutcome};
pub use outputs::{OutputKind, OutputSet, OutputValue, RequiredOutput};
pub use provisioner::{Provisioner, TerraformCli};
pub use scenario::Scenario;
