//! Resource kind registry.
//!
//! Each kind carries an enumerated set of recognized spec fields; loading
//! rejects fields outside this set so misspelled keys fail loudly instead
//! of silently rendering defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Resource kinds the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Horizontally-scaled runner workload.
    Workload,
    /// Plain configuration data.
    ConfigMap,
    /// Secret data; values are redacted in explain output.
    Secret,
    /// Persistent storage claim.
    VolumeClaim,
}

/// Error for a kind string outside the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource kind '{0}'")]
pub struct UnknownKind(pub String);

impl ResourceKind {
    /// String form used in template files and rendered output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Workload => "workload",
            ResourceKind::ConfigMap => "config-map",
            ResourceKind::Secret => "secret",
            ResourceKind::VolumeClaim => "volume-claim",
        }
    }

    /// Spec fields recognized at the top level for this kind.
    pub fn recognized_fields(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Workload => &[
                "replicas",
                "image",
                "server_url",
                "runner",
                "env",
                "volume_claims",
            ],
            ResourceKind::ConfigMap => &["data"],
            ResourceKind::Secret => &["data"],
            ResourceKind::VolumeClaim => &["storage", "access_mode", "storage_class"],
        }
    }

    /// Recognized sub-fields of a nested table, if the field is one.
    pub fn recognized_nested(&self, field: &str) -> Option<&'static [&'static str]> {
        match (self, field) {
            (ResourceKind::Workload, "runner") => Some(&["id", "organization", "labels"]),
            _ => None,
        }
    }

    /// Fields holding free-form maps, not schema-checked below the key.
    pub fn open_fields(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Workload => &["env"],
            ResourceKind::ConfigMap | ResourceKind::Secret => &["data"],
            ResourceKind::VolumeClaim => &[],
        }
    }

    /// Spec field paths that must be present and non-empty after binding.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Workload => &["image", "server_url", "runner.id", "runner.organization"],
            ResourceKind::VolumeClaim => &["storage"],
            ResourceKind::ConfigMap | ResourceKind::Secret => &[],
        }
    }

    /// Paths in `spec` that fall outside the recognized field set.
    pub fn unrecognized_paths(&self, spec: &Value) -> Vec<String> {
        let mut out = Vec::new();
        if let Value::Object(map) = spec {
            for (key, value) in map {
                if self.open_fields().contains(&key.as_str()) {
                    continue;
                }
                if let Some(nested) = self.recognized_nested(key) {
                    if let Value::Object(inner) = value {
                        for inner_key in inner.keys() {
                            if !nested.contains(&inner_key.as_str()) {
                                out.push(format!("{}.{}", key, inner_key));
                            }
                        }
                    }
                    continue;
                }
                if !self.recognized_fields().contains(&key.as_str()) {
                    out.push(key.clone());
                }
            }
        }
        out
    }

    /// Whether a dotted spec field path is within this kind's schema.
    /// Used to check overlay reference targets before any binding runs.
    pub fn recognizes_path(&self, path: &str) -> bool {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        if self.open_fields().contains(&head) {
            return true;
        }
        if let Some(nested) = self.recognized_nested(head) {
            return match rest {
                None => true,
                Some(rest) => !rest.contains('.') && nested.contains(&rest),
            };
        }
        rest.is_none() && self.recognized_fields().contains(&head)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workload" => Ok(ResourceKind::Workload),
            "config-map" => Ok(ResourceKind::ConfigMap),
            "secret" => Ok(ResourceKind::Secret),
            "volume-claim" => Ok(ResourceKind::VolumeClaim),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_strings() {
        for kind in [
            ResourceKind::Workload,
            ResourceKind::ConfigMap,
            ResourceKind::Secret,
            ResourceKind::VolumeClaim,
        ] {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind() {
        let err = "stateful-set".parse::<ResourceKind>().unwrap_err();
        assert_eq!(err.0, "stateful-set");
    }

    #[test]
    fn test_unrecognized_paths_clean_spec() {
        let spec = json!({
            "replicas": 1,
            "image": "runner:v1",
            "runner": {"id": "", "organization": "acme"},
            "env": {"CUSTOM": "anything-goes"}
        });
        assert!(ResourceKind::Workload.unrecognized_paths(&spec).is_empty());
    }

    #[test]
    fn test_unrecognized_top_level_field() {
        let spec = json!({"replicass": 1});
        assert_eq!(
            ResourceKind::Workload.unrecognized_paths(&spec),
            vec!["replicass"]
        );
    }

    #[test]
    fn test_unrecognized_nested_field() {
        let spec = json!({"runner": {"id": "x", "org": "typo"}});
        assert_eq!(
            ResourceKind::Workload.unrecognized_paths(&spec),
            vec!["runner.org"]
        );
    }

    #[test]
    fn test_open_field_not_checked_below_key() {
        let spec = json!({"data": {"anything": "ok", "nested": {"deep": true}}});
        assert!(ResourceKind::ConfigMap.unrecognized_paths(&spec).is_empty());
    }

    #[test]
    fn test_recognizes_path() {
        let kind = ResourceKind::Workload;
        assert!(kind.recognizes_path("replicas"));
        assert!(kind.recognizes_path("runner.id"));
        assert!(kind.recognizes_path("env.ANY_KEY"));
        assert!(!kind.recognizes_path("replicas.nested"));
        assert!(!kind.recognizes_path("runner.bogus"));
        assert!(!kind.recognizes_path("bogus"));
        assert!(ResourceKind::Secret.recognizes_path("data.ssh-key"));
    }

    #[test]
    fn test_serde_kebab_case() {
        let json = serde_json::to_string(&ResourceKind::VolumeClaim).unwrap();
        assert_eq!(json, "\"volume-claim\"");
    }
}
