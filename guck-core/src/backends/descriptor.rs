//! Backend descriptors from the `backends` list of `.guck.json`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BackendKind;
use crate::error::{GuckError, Result};

/// `{type: "local", id?, dir?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalBackendConfig {
    pub id: String,
    /// Store directory override
    #[serde(default)]
    pub dir: Option<String>,
}

/// `{type: "cloudwatch", id?, logGroup, region, profile?, service?, endpoint?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudWatchConfig {
    pub id: String,
    pub log_group: String,
    pub region: String,
    #[serde(default)]
    pub profile: Option<String>,
    /// Service assigned to unstructured lines; defaults to the log group name
    #[serde(default)]
    pub service: Option<String>,
    /// Logs API endpoint override
    #[serde(default)]
    pub endpoint: Option<String>,
    /// STS endpoint override, used for role assumption
    #[serde(default)]
    pub sts_endpoint: Option<String>,
}

/// How a Kubernetes backend authenticates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum K8sAuthMode {
    /// EKS token when `clusterName` and `region` are set, kubeconfig otherwise
    #[default]
    Auto,
    Kubeconfig,
    Eks,
}

/// `{type: "k8s", id?, namespace, selector, context?, container?, service?,
/// clusterName?, region?, profile?, auth?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K8sConfig {
    pub id: String,
    pub namespace: String,
    /// Label selector, e.g. `app=checkout`
    pub selector: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub auth: K8sAuthMode,
    /// Kubeconfig path override
    #[serde(default)]
    pub kubeconfig: Option<String>,
    /// EKS API endpoint override
    #[serde(default)]
    pub eks_endpoint: Option<String>,
    /// STS endpoint override
    #[serde(default)]
    pub sts_endpoint: Option<String>,
}

/// A validated backend descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendDescriptor {
    Local(LocalBackendConfig),
    Cloudwatch(CloudWatchConfig),
    K8s(K8sConfig),
}

impl BackendDescriptor {
    /// Validate one raw descriptor. `id` defaults to the type name.
    pub fn from_value(raw: &Value) -> Result<Self> {
        let Some(object) = raw.as_object() else {
            return Err(GuckError::config("backend descriptor must be an object"));
        };
        let raw_type = object.get("type").and_then(Value::as_str).unwrap_or("");
        let kind = BackendKind::parse(raw_type).ok_or_else(|| GuckError::UnknownBackendType {
            backend_type: raw_type.to_string(),
        })?;

        let id = object
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or(kind.as_str())
            .to_string();

        let required: &[&str] = match kind {
            BackendKind::Local => &[],
            BackendKind::Cloudwatch => &["logGroup", "region"],
            BackendKind::K8s => &["namespace", "selector"],
        };
        for field in required {
            let present = object
                .get(*field)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.trim().is_empty());
            if !present {
                return Err(GuckError::MissingBackendField {
                    backend: id,
                    field: field.to_string(),
                });
            }
        }

        let mut normalized = object.clone();
        normalized.insert("id".to_string(), Value::String(id));
        normalized.remove("type");
        let normalized = Value::Object(normalized);

        Ok(match kind {
            BackendKind::Local => BackendDescriptor::Local(serde_json::from_value(normalized)?),
            BackendKind::Cloudwatch => {
                BackendDescriptor::Cloudwatch(serde_json::from_value(normalized)?)
            }
            BackendKind::K8s => BackendDescriptor::K8s(serde_json::from_value(normalized)?),
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            BackendDescriptor::Local(_) => BackendKind::Local,
            BackendDescriptor::Cloudwatch(_) => BackendKind::Cloudwatch,
            BackendDescriptor::K8s(_) => BackendKind::K8s,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BackendDescriptor::Local(cfg) => &cfg.id,
            BackendDescriptor::Cloudwatch(cfg) => &cfg.id,
            BackendDescriptor::K8s(cfg) => &cfg.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_defaults_to_type() {
        let d = BackendDescriptor::from_value(&json!({"type": "local"})).unwrap();
        assert_eq!(d.id(), "local");
        assert_eq!(d.kind(), BackendKind::Local);
    }

    #[test]
    fn test_cloudwatch_descriptor() {
        let d = BackendDescriptor::from_value(&json!({
            "type": "cloudwatch",
            "id": "prod",
            "logGroup": "/aws/lambda/checkout",
            "region": "eu-west-1",
            "profile": "ops"
        }))
        .unwrap();
        let BackendDescriptor::Cloudwatch(cfg) = d else {
            panic!("expected cloudwatch");
        };
        assert_eq!(cfg.log_group, "/aws/lambda/checkout");
        assert_eq!(cfg.profile.as_deref(), Some("ops"));
        assert_eq!(cfg.endpoint, None);
    }

    #[test]
    fn test_k8s_descriptor_auth_mode() {
        let d = BackendDescriptor::from_value(&json!({
            "type": "k8s",
            "namespace": "default",
            "selector": "app=api",
            "clusterName": "dev",
            "region": "us-east-1",
            "auth": "eks"
        }))
        .unwrap();
        let BackendDescriptor::K8s(cfg) = d else {
            panic!("expected k8s");
        };
        assert_eq!(cfg.id, "k8s");
        assert_eq!(cfg.auth, K8sAuthMode::Eks);
        assert_eq!(cfg.cluster_name.as_deref(), Some("dev"));
    }

    #[test]
    fn test_invalid_descriptors() {
        let err = BackendDescriptor::from_value(&json!({"type": "loki"})).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_BACKEND_TYPE");

        let err = BackendDescriptor::from_value(&json!({"type": "k8s", "namespace": "x"}))
            .unwrap_err();
        assert!(err.to_string().contains("selector"));

        assert!(BackendDescriptor::from_value(&json!("local")).is_err());
    }
}
