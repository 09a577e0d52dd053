//! Replica instance naming.

use serde::{Deserialize, Serialize};

/// Environment variable the external orchestrator overrides with the
/// instance name at instance start. Rendering emits the binding point
/// only; its runtime value is never resolved here.
pub const INSTANCE_NAME_ENV: &str = "STRATUM_INSTANCE_NAME";

/// One addressable unit of a horizontally-scaled workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInstance {
    /// Workload the instance belongs to.
    pub workload: String,

    /// Ordinal index within the workload, starting at 0.
    pub ordinal: u64,

    /// Derived instance name, `<workload>-<ordinal>`.
    pub name: String,
}

impl ReplicaInstance {
    pub fn new(workload: &str, ordinal: u64) -> Self {
        Self {
            workload: workload.to_string(),
            ordinal,
            name: instance_name(workload, ordinal),
        }
    }
}

/// Derive the instance name for (workload, ordinal).
/// Stable across re-renders for the same ordinal.
pub fn instance_name(workload: &str, ordinal: u64) -> String {
    format!("{}-{}", workload, ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_name_form() {
        assert_eq!(instance_name("runner", 0), "runner-0");
        assert_eq!(instance_name("runner", 12), "runner-12");
    }

    #[test]
    fn test_new_derives_name() {
        let instance = ReplicaInstance::new("runner", 2);
        assert_eq!(instance.workload, "runner");
        assert_eq!(instance.ordinal, 2);
        assert_eq!(instance.name, "runner-2");
    }

    #[test]
    fn test_names_stable_across_derivations() {
        assert_eq!(ReplicaInstance::new("runner", 1), ReplicaInstance::new("runner", 1));
    }
}
