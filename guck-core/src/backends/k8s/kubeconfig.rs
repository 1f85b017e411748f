//! Kubeconfig loading and context resolution

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use crate::config::{home_dir, EnvSnapshot};
use crate::error::{GuckError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub current_context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterInfo {
    pub server: String,
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    #[serde(default)]
    pub certificate_authority: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextInfo {
    pub cluster: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: UserInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserInfo {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    #[serde(default)]
    pub client_key_data: Option<String>,
    #[serde(default)]
    pub client_certificate: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub exec: Option<ExecConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Option<Vec<ExecEnv>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecEnv {
    pub name: String,
    pub value: String,
}

/// Cluster and region named by an `aws eks get-token` exec plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EksExecTarget {
    pub cluster_name: String,
    pub region: Option<String>,
    pub profile: Option<String>,
}

fn flag_value(args: &[String], names: &[&str]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        for name in names {
            if arg == name {
                return iter.next().cloned();
            }
            if let Some(value) = arg.strip_prefix(&format!("{}=", name)) {
                return Some(value.to_string());
            }
        }
    }
    None
}

impl ExecConfig {
    fn env_value(&self, name: &str) -> Option<String> {
        self.env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.clone())
    }

    /// Recognize `aws eks get-token --cluster-name <name> [--region <r>]`
    pub fn eks_target(&self) -> Option<EksExecTarget> {
        let program = Path::new(&self.command).file_name()?.to_str()?;
        if program != "aws" && program != "aws.exe" {
            return None;
        }
        let is_get_token = self.args.iter().any(|a| a == "eks")
            && self.args.iter().any(|a| a == "get-token");
        if !is_get_token {
            return None;
        }
        let cluster_name = flag_value(&self.args, &["--cluster-name", "--cluster-id"])?;
        Some(EksExecTarget {
            cluster_name,
            region: flag_value(&self.args, &["--region"])
                .or_else(|| self.env_value("AWS_REGION"))
                .or_else(|| self.env_value("AWS_DEFAULT_REGION")),
            profile: flag_value(&self.args, &["--profile"])
                .or_else(|| self.env_value("AWS_PROFILE")),
        })
    }
}

/// A context with its cluster and user looked up
#[derive(Debug, Clone)]
pub struct ResolvedContext {
    pub context_name: String,
    pub server: String,
    pub ca_pem: Option<Vec<u8>>,
    pub insecure: bool,
    pub user: UserInfo,
}

/// Kubeconfig path: explicit, first entry of `KUBECONFIG`, `~/.kube/config`
pub fn kubeconfig_path(explicit: Option<&str>, env: &EnvSnapshot) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    let separator = if cfg!(windows) { ';' } else { ':' };
    if let Some(first) = env
        .get("KUBECONFIG")
        .and_then(|list| list.split(separator).find(|p| !p.is_empty()))
    {
        return PathBuf::from(first);
    }
    home_dir(env).join(".kube").join("config")
}

/// Inline base64 data or the contents of a file
pub fn read_data_or_file(data: Option<&str>, file: Option<&str>) -> Result<Option<Vec<u8>>> {
    if let Some(data) = data {
        let decoded = STANDARD
            .decode(data.trim())
            .map_err(|e| GuckError::config(format!("invalid base64 in kubeconfig: {}", e)))?;
        return Ok(Some(decoded));
    }
    match file {
        Some(path) => Ok(Some(std::fs::read(path)?)),
        None => Ok(None),
    }
}

impl Kubeconfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GuckError::config(format!("cannot read kubeconfig {}: {}", path.display(), e))
        })?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Resolve `context` (or `current-context`)
    pub fn resolve(&self, context: Option<&str>) -> Result<ResolvedContext> {
        let name = context
            .map(str::to_string)
            .or_else(|| self.current_context.clone())
            .ok_or_else(|| GuckError::config("kubeconfig has no current-context"))?;
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| GuckError::config(format!("kubeconfig context '{}' not found", name)))?;
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.context.cluster)
            .ok_or_else(|| {
                GuckError::config(format!(
                    "kubeconfig cluster '{}' not found",
                    context.context.cluster
                ))
            })?;
        let user = match context.context.user.as_deref() {
            Some(user_name) => self
                .users
                .iter()
                .find(|u| u.name == user_name)
                .map(|u| u.user.clone())
                .ok_or_else(|| {
                    GuckError::config(format!("kubeconfig user '{}' not found", user_name))
                })?,
            None => UserInfo::default(),
        };

        Ok(ResolvedContext {
            context_name: name,
            server: cluster.cluster.server.clone(),
            ca_pem: read_data_or_file(
                cluster.cluster.certificate_authority_data.as_deref(),
                cluster.cluster.certificate_authority.as_deref(),
            )?,
            insecure: cluster.cluster.insecure_skip_tls_verify,
            user,
        })
    }
}
