//! Semantic validation
//!
//! Checks a bound resource set against the semantic invariants. Every
//! violation is collected and returned in one pass so a caller can fix
//! all of them before retrying.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use stratum_model::{
    get_path, is_valid_name, json_type, MergedResourceSet, ResourceId, ResourceKind,
    INSTANCE_NAME_ENV,
};

use crate::overlay::ConfigReference;

/// A single validation violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Resource the violation is on, display form (`kind/name`).
    pub resource: String,

    /// Offending spec field path, when the violation is field-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    pub message: String,
}

impl Violation {
    fn on(id: &ResourceId, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            resource: id.to_string(),
            field: field.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}: {}", self.resource, field, self.message),
            None => write!(f, "{}: {}", self.resource, self.message),
        }
    }
}

/// Error carrying the full violation list.
#[derive(Debug, Clone, thiserror::Error)]
#[error("validation failed with {} violation(s)", .violations.len())]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

/// Validate a bound resource set. Returns every violation found; an
/// empty list means the set may be rendered.
pub fn validate_set(set: &MergedResourceSet, references: &[ConfigReference]) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (id, spec) in set.iter() {
        if !is_valid_name(&id.name) {
            violations.push(Violation::on(
                id,
                None,
                "name is not a valid lowercase DNS label",
            ));
        }

        for &field in id.kind.required_fields() {
            match get_path(spec, field) {
                None => violations.push(Violation::on(
                    id,
                    Some(field),
                    "required field is missing",
                )),
                Some(Value::String(s)) if s.trim().is_empty() => violations.push(Violation::on(
                    id,
                    Some(field),
                    "required field must be non-empty",
                )),
                Some(Value::String(_)) => {}
                Some(other) => violations.push(Violation::on(
                    id,
                    Some(field),
                    format!("required field must be a non-empty string (found {})", json_type(other)),
                )),
            }
        }

        if id.kind == ResourceKind::Workload {
            validate_workload(id, spec, set, &mut violations);
        }
    }

    validate_instance_uniqueness(set, &mut violations);
    validate_reference_targets(set, references, &mut violations);

    violations
}

fn validate_workload(
    id: &ResourceId,
    spec: &Value,
    set: &MergedResourceSet,
    violations: &mut Vec<Violation>,
) {
    match spec.get("replicas") {
        None => violations.push(Violation::on(
            id,
            Some("replicas"),
            "required field is missing",
        )),
        Some(value) if value.as_u64().is_none() => violations.push(Violation::on(
            id,
            Some("replicas"),
            format!("must be a non-negative integer (found {})", preview(value)),
        )),
        Some(_) => {}
    }

    // The runtime instance-name binding point must exist; its value is
    // the orchestrator's to override at instance start.
    let binding = format!("env.{}", INSTANCE_NAME_ENV);
    if get_path(spec, &binding).is_none() {
        violations.push(Violation::on(
            id,
            Some(binding.as_str()),
            "runtime instance-name binding point is missing",
        ));
    }

    if let Some(claims) = spec.get("volume_claims") {
        match claims.as_array() {
            None => violations.push(Violation::on(
                id,
                Some("volume_claims"),
                format!("must be an array of claim names (found {})", json_type(claims)),
            )),
            Some(entries) => {
                for entry in entries {
                    match entry.as_str() {
                        None => violations.push(Violation::on(
                            id,
                            Some("volume_claims"),
                            "claim names must be strings",
                        )),
                        Some(claim) => {
                            let claim_id = ResourceId::new(ResourceKind::VolumeClaim, claim);
                            if !set.contains(&claim_id) {
                                violations.push(Violation::on(
                                    id,
                                    Some("volume_claims"),
                                    format!("references undefined {}", claim_id),
                                ));
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Invariant (b): instance names are unique. Workload names share the
/// instance namespace: an instance name matching another workload's
/// name is just as ambiguous to the orchestrator as two equal instance
/// names.
fn validate_instance_uniqueness(set: &MergedResourceSet, violations: &mut Vec<Violation>) {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for (id, _) in set.iter() {
        if id.kind == ResourceKind::Workload {
            seen.insert(id.name.clone(), format!("workload '{}'", id.name));
        }
    }
    for instance in set.instances() {
        if let Some(earlier) = seen.get(&instance.name) {
            let id = ResourceId::new(ResourceKind::Workload, instance.workload.clone());
            violations.push(Violation::on(
                &id,
                None,
                format!("instance name '{}' collides with {}", instance.name, earlier),
            ));
        } else {
            seen.insert(
                instance.name.clone(),
                format!("instance of workload '{}'", instance.workload),
            );
        }
    }
}

/// Invariant (d): every required reference target holds non-empty
/// content after binding; optional targets may be absent.
fn validate_reference_targets(
    set: &MergedResourceSet,
    references: &[ConfigReference],
    violations: &mut Vec<Violation>,
) {
    for reference in references {
        if reference.optional {
            continue;
        }
        let bound = set
            .get(&reference.target)
            .and_then(|spec| get_path(spec, &reference.field))
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !bound {
            violations.push(Violation::on(
                &reference.target,
                Some(reference.field.as_str()),
                format!("reference '{}' is not bound", reference.key),
            ));
        }
    }
}

fn preview(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        other => json_type(other).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_workload_spec() -> Value {
        json!({
            "replicas": 2,
            "image": "forge/runner:3.2",
            "server_url": "https://ci.example.com",
            "runner": {"id": "abc-123", "organization": "acme"},
            "env": {"STRATUM_INSTANCE_NAME": ""}
        })
    }

    fn set_with(spec: Value) -> MergedResourceSet {
        let mut set = MergedResourceSet::new();
        set.insert(ResourceId::new(ResourceKind::Workload, "runner"), spec)
            .unwrap();
        set
    }

    #[test]
    fn test_valid_workload_passes() {
        let set = set_with(valid_workload_spec());
        assert!(validate_set(&set, &[]).is_empty());
    }

    #[test]
    fn test_all_violations_collected() {
        let set = set_with(json!({
            "replicas": -1,
            "image": "",
            "runner": {"id": "", "organization": "acme"}
        }));

        let violations = validate_set(&set, &[]);
        let fields: Vec<Option<&str>> =
            violations.iter().map(|v| v.field.as_deref()).collect();

        // replicas negative, image empty, server_url missing, runner.id
        // empty, binding point missing -- all in one pass.
        assert!(fields.contains(&Some("replicas")));
        assert!(fields.contains(&Some("image")));
        assert!(fields.contains(&Some("server_url")));
        assert!(fields.contains(&Some("runner.id")));
        assert!(fields.contains(&Some("env.STRATUM_INSTANCE_NAME")));
        assert_eq!(violations.len(), 5);
    }

    #[test]
    fn test_negative_replicas_rejected() {
        let mut spec = valid_workload_spec();
        spec["replicas"] = json!(-3);
        let violations = validate_set(&set_with(spec), &[]);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field.as_deref(), Some("replicas"));
        assert!(violations[0].message.contains("-3"));
    }

    #[test]
    fn test_missing_replicas_rejected() {
        let mut spec = valid_workload_spec();
        spec.as_object_mut().unwrap().remove("replicas");
        let violations = validate_set(&set_with(spec), &[]);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field.as_deref(), Some("replicas"));
    }

    #[test]
    fn test_zero_replicas_allowed() {
        let mut spec = valid_workload_spec();
        spec["replicas"] = json!(0);
        assert!(validate_set(&set_with(spec), &[]).is_empty());
    }

    #[test]
    fn test_invalid_resource_name() {
        let mut set = MergedResourceSet::new();
        set.insert(
            ResourceId::new(ResourceKind::ConfigMap, "Bad_Name"),
            json!({"data": {}}),
        )
        .unwrap();

        let violations = validate_set(&set, &[]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("DNS label"));
    }

    #[test]
    fn test_instance_name_collision_with_workload_name() {
        let mut set = MergedResourceSet::new();
        // "runner" derives instances runner-0 and runner-1; a sibling
        // workload literally named "runner-0" collides with the first.
        set.insert(
            ResourceId::new(ResourceKind::Workload, "runner"),
            valid_workload_spec(),
        )
        .unwrap();
        let mut shadow = valid_workload_spec();
        shadow["replicas"] = json!(1);
        set.insert(ResourceId::new(ResourceKind::Workload, "runner-0"), shadow)
            .unwrap();

        let violations = validate_set(&set, &[]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0]
            .message
            .contains("instance name 'runner-0' collides with workload 'runner-0'"));
    }

    #[test]
    fn test_adjacent_workload_names_do_not_collide() {
        let mut set = MergedResourceSet::new();
        set.insert(
            ResourceId::new(ResourceKind::Workload, "runner"),
            valid_workload_spec(),
        )
        .unwrap();
        let mut other = valid_workload_spec();
        other["replicas"] = json!(3);
        set.insert(ResourceId::new(ResourceKind::Workload, "runner-extra"), other)
            .unwrap();

        assert!(validate_set(&set, &[]).is_empty());
    }

    #[test]
    fn test_volume_claim_reference_checked() {
        let mut spec = valid_workload_spec();
        spec["volume_claims"] = json!(["work-dir"]);
        let violations = validate_set(&set_with(spec.clone()), &[]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("volume-claim/work-dir"));

        let mut set = set_with(spec);
        set.insert(
            ResourceId::new(ResourceKind::VolumeClaim, "work-dir"),
            json!({"storage": "1Gi"}),
        )
        .unwrap();
        assert!(validate_set(&set, &[]).is_empty());
    }

    #[test]
    fn test_unbound_required_reference_target() {
        let set = set_with(valid_workload_spec());
        let references = vec![ConfigReference {
            key: "client-secret".to_string(),
            target: ResourceId::new(ResourceKind::Workload, "runner"),
            field: "env.CLIENT_SECRET".to_string(),
            optional: false,
        }];

        let violations = validate_set(&set, &references);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("client-secret"));
    }

    #[test]
    fn test_volume_claim_requires_storage() {
        let mut set = MergedResourceSet::new();
        set.insert(
            ResourceId::new(ResourceKind::VolumeClaim, "work-dir"),
            json!({}),
        )
        .unwrap();

        let violations = validate_set(&set, &[]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field.as_deref(), Some("storage"));
    }
}
