//! Kubernetes pod-log backend
//!
//! Lists the pods matching a label selector, then reads each pod's log with
//! `timestamps=true`, one pod per page. The connection (API server, TLS
//! material, credentials) is resolved on first use and reused afterwards;
//! EKS tokens are refreshed by [`eks::EksTokenProvider`] before they expire.

pub mod eks;
pub mod kubeconfig;

use std::collections::VecDeque;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::aws::CredentialsProvider;
use super::normalize::{normalize_line, LineContext};
use super::remote::{LogSource, Page, RemoteBackend, TimeWindow};
use super::{BackendKind, K8sAuthMode, K8sConfig};
use crate::config::EnvSnapshot;
use crate::error::{GuckError, Result};
use crate::event::Event;
use crate::time::{format_iso_ms, now_ms, parse_timestamp_ms};
use eks::EksTokenProvider;
use kubeconfig::{kubeconfig_path, read_data_or_file, Kubeconfig};

/// Length of the hex id derived for each log line
const EVENT_ID_LEN: usize = 32;

pub type K8sBackend = RemoteBackend<K8sSource>;

impl RemoteBackend<K8sSource> {
    pub fn from_config(config: K8sConfig, env: &EnvSnapshot) -> Result<Self> {
        Ok(RemoteBackend::new(K8sSource::new(config, env)?))
    }
}

/// A pod and the container whose log is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodTarget {
    pub pod: String,
    pub container: Option<String>,
}

enum Bearer {
    None,
    Static(String),
    Eks(EksTokenProvider),
}

struct Connection {
    base: Url,
    http: reqwest::Client,
    bearer: Bearer,
}

impl Connection {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let mut url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| GuckError::config(format!("invalid Kubernetes URL: {}", e)))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        let mut request = self.http.get(url);
        match &self.bearer {
            Bearer::None => {}
            Bearer::Static(token) => request = request.bearer_auth(token),
            Bearer::Eks(provider) => request = request.bearer_auth(provider.refresh_if_needed().await?),
        }
        Ok(request.send().await?)
    }
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMetadata,
    #[serde(default)]
    spec: Option<PodSpec>,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<Container>,
}

#[derive(Debug, Deserialize)]
struct Container {
    name: String,
}

/// Service name implied by a selector: the value of its first `k=v` term,
/// falling back to the namespace
pub fn service_from_selector(selector: &str, namespace: &str) -> String {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.contains("!="))
        .filter_map(|term| term.split_once("==").or_else(|| term.split_once('=')))
        .map(|(_, value)| value.trim())
        .find(|value| !value.is_empty())
        .unwrap_or(namespace)
        .to_string()
}

/// Split the RFC 3339 prefix added by `timestamps=true`
pub fn split_timestamp(line: &str) -> (Option<i64>, &str) {
    if let Some((head, rest)) = line.split_once(' ') {
        if let Some(ms) = parse_timestamp_ms(head) {
            return (Some(ms), rest);
        }
    }
    (None, line)
}

/// Stable id for a log line
pub fn line_id(pod: &str, container: &str, ts: &str, line: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [pod, container, ts, line] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(EVENT_ID_LEN);
    id
}

pub struct K8sSource {
    config: K8sConfig,
    env: EnvSnapshot,
    service: String,
    connection: OnceCell<Connection>,
}

impl K8sSource {
    /// Validate the configuration. The connection itself is made on first
    /// use.
    pub fn new(config: K8sConfig, env: &EnvSnapshot) -> Result<Self> {
        if config.auth == K8sAuthMode::Eks {
            for (field, value) in [("clusterName", &config.cluster_name), ("region", &config.region)] {
                if value.as_deref().map_or(true, str::is_empty) {
                    return Err(GuckError::MissingBackendField {
                        backend: config.id.clone(),
                        field: field.to_string(),
                    });
                }
            }
        }
        let service = config
            .service
            .clone()
            .unwrap_or_else(|| service_from_selector(&config.selector, &config.namespace));
        Ok(Self {
            config,
            env: env.clone(),
            service,
            connection: OnceCell::new(),
        })
    }

    fn credentials(&self, profile: Option<String>, region: &str) -> CredentialsProvider {
        CredentialsProvider::new(profile, region, self.env.clone())
            .with_sts_endpoint(self.config.sts_endpoint.clone())
    }

    fn eks_provider(&self, cluster: &str, region: &str, profile: Option<String>) -> EksTokenProvider {
        EksTokenProvider::new(cluster, region, self.credentials(profile, region))
            .with_sts_endpoint(self.config.sts_endpoint.clone())
    }

    async fn connection(&self) -> Result<&Connection> {
        self.connection.get_or_try_init(|| self.connect()).await
    }

    async fn connect(&self) -> Result<Connection> {
        let cfg = &self.config;
        let direct_eks = cfg.auth != K8sAuthMode::Kubeconfig
            && cfg.cluster_name.is_some()
            && cfg.region.is_some();

        if let (true, Some(cluster), Some(region)) =
            (direct_eks, cfg.cluster_name.as_deref(), cfg.region.as_deref())
        {
            let provider = self.eks_provider(cluster, region, cfg.profile.clone());
            let endpoint = provider
                .describe_cluster(&reqwest::Client::new(), cfg.eks_endpoint.as_deref())
                .await?;
            debug!("EKS cluster {} at {}", cluster, endpoint.server);
            let mut builder = reqwest::Client::builder();
            if let Some(ca) = endpoint.ca_pem.as_deref() {
                builder = builder.add_root_certificate(reqwest::Certificate::from_pem(ca)?);
            }
            return Ok(Connection {
                base: base_url(&endpoint.server)?,
                http: builder.build()?,
                bearer: Bearer::Eks(provider),
            });
        }

        let path = kubeconfig_path(cfg.kubeconfig.as_deref(), &self.env);
        let resolved = Kubeconfig::load(&path)?.resolve(cfg.context.as_deref())?;
        debug!("Kubernetes context {} at {}", resolved.context_name, resolved.server);

        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(resolved.insecure);
        if let Some(ca) = resolved.ca_pem.as_deref() {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(ca)?);
        }

        let user = &resolved.user;
        let cert = read_data_or_file(
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
        )?;
        let key = read_data_or_file(user.client_key_data.as_deref(), user.client_key.as_deref())?;
        if let (Some(mut pem), Some(key)) = (cert, key) {
            pem.push(b'\n');
            pem.extend_from_slice(&key);
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }

        let bearer = if let Some(token) = user.token.clone() {
            Bearer::Static(token)
        } else if let Some(file) = user.token_file.as_deref() {
            Bearer::Static(std::fs::read_to_string(file)?.trim().to_string())
        } else if let Some(target) = user.exec.as_ref().and_then(|exec| exec.eks_target()) {
            let cluster = cfg.cluster_name.clone().unwrap_or(target.cluster_name);
            let region = cfg
                .region
                .clone()
                .or(target.region)
                .or_else(|| self.env.get("AWS_REGION").map(str::to_string))
                .ok_or_else(|| GuckError::MissingBackendField {
                    backend: cfg.id.clone(),
                    field: "region".to_string(),
                })?;
            let profile = cfg.profile.clone().or(target.profile);
            Bearer::Eks(self.eks_provider(&cluster, &region, profile))
        } else {
            Bearer::None
        };

        Ok(Connection {
            base: base_url(&resolved.server)?,
            http: builder.build()?,
            bearer,
        })
    }

    async fn list_pods(&self, connection: &Connection) -> Result<VecDeque<PodTarget>> {
        let path = format!("api/v1/namespaces/{}/pods", self.config.namespace);
        let response = connection
            .get(&path, &[("labelSelector", self.config.selector.clone())])
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GuckError::remote(
                "k8s",
                format!("listing pods returned {}: {}", status, text),
            ));
        }
        let list: PodList = serde_json::from_str(&text)?;
        let mut targets: Vec<PodTarget> = list
            .items
            .into_iter()
            .map(|pod| PodTarget {
                container: self.config.container.clone().or_else(|| {
                    pod.spec
                        .and_then(|spec| spec.containers.into_iter().next())
                        .map(|c| c.name)
                }),
                pod: pod.metadata.name,
            })
            .collect();
        targets.sort_by(|a, b| a.pod.cmp(&b.pod));
        Ok(targets.into())
    }

    async fn pod_events(
        &self,
        connection: &Connection,
        target: &PodTarget,
        window: &TimeWindow,
    ) -> Result<Vec<Event>> {
        let path = format!(
            "api/v1/namespaces/{}/pods/{}/log",
            self.config.namespace, target.pod
        );
        let mut query = vec![("timestamps", "true".to_string())];
        if let Some(container) = &target.container {
            query.push(("container", container.clone()));
        }
        if let Some(start) = window.start_ms {
            let seconds = ((now_ms() - start).max(1000) + 999) / 1000;
            query.push(("sinceSeconds", seconds.to_string()));
        }

        let response = connection.get(&path, &query).await?;
        let status = response.status();
        let text = response.text().await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GuckError::auth("k8s", format!("{}: {}", status, text)));
        }
        if !status.is_success() {
            // Pods come and go between listing and reading
            warn!("Skipping logs of pod {}: {}", target.pod, status);
            return Ok(Vec::new());
        }

        let container = target.container.as_deref().unwrap_or_default();
        let mut metadata = Map::new();
        metadata.insert("namespace".into(), Value::String(self.config.namespace.clone()));
        metadata.insert("pod".into(), Value::String(target.pod.clone()));
        if !container.is_empty() {
            metadata.insert("container".into(), Value::String(container.to_string()));
        }

        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let (ts_ms, body) = split_timestamp(line);
                let ts = ts_ms.map(format_iso_ms);
                let ctx = LineContext {
                    backend: BackendKind::K8s,
                    backend_id: &self.config.id,
                    service: &self.service,
                    run_id: &target.pod,
                    id: line_id(&target.pod, container, ts.as_deref().unwrap_or_default(), body),
                    ts,
                    metadata: metadata.clone(),
                    accept_aliases: true,
                };
                normalize_line(&ctx, body)
            })
            .collect())
    }
}

fn base_url(server: &str) -> Result<Url> {
    Url::parse(&format!("{}/", server.trim_end_matches('/')))
        .map_err(|e| GuckError::config(format!("invalid Kubernetes server '{}': {}", server, e)))
}

#[async_trait]
impl LogSource for K8sSource {
    type Cursor = VecDeque<PodTarget>;

    fn kind(&self) -> BackendKind {
        BackendKind::K8s
    }

    fn id(&self) -> &str {
        &self.config.id
    }

    async fn fetch_page(
        &self,
        window: &TimeWindow,
        cursor: Option<VecDeque<PodTarget>>,
    ) -> Result<Page<VecDeque<PodTarget>>> {
        let connection = self.connection().await?;
        let mut remaining = match cursor {
            Some(remaining) => remaining,
            None => self.list_pods(connection).await?,
        };
        let Some(target) = remaining.pop_front() else {
            return Ok(Page::last(Vec::new()));
        };
        let events = self.pod_events(connection, &target, window).await?;
        Ok(Page {
            events,
            next: (!remaining.is_empty()).then_some(remaining),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(extra: Value) -> K8sConfig {
        let mut raw = json!({"id": "k8s", "namespace": "shop", "selector": "app=checkout"});
        if let (Some(base), Some(extra)) = (raw.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_service_from_selector() {
        assert_eq!(service_from_selector("app=checkout", "ns"), "checkout");
        assert_eq!(service_from_selector("app.kubernetes.io/name==web,tier=fe", "ns"), "web");
        assert_eq!(service_from_selector("tier!=db", "ns"), "ns");
        assert_eq!(service_from_selector("environment in (prod)", "ns"), "ns");
    }

    #[test]
    fn test_split_timestamp() {
        let (ts, rest) = split_timestamp("2026-01-01T00:00:00.123456789Z hello world");
        assert_eq!(ts, Some(1_767_225_600_123));
        assert_eq!(rest, "hello world");

        let (ts, rest) = split_timestamp("no timestamp here");
        assert_eq!(ts, None);
        assert_eq!(rest, "no timestamp here");
    }

    #[test]
    fn test_line_id_is_deterministic() {
        let a = line_id("pod", "c", "2026-01-01T00:00:00.000Z", "x");
        assert_eq!(a, line_id("pod", "c", "2026-01-01T00:00:00.000Z", "x"));
        assert_ne!(a, line_id("pod", "c", "2026-01-01T00:00:00.000Z", "y"));
        assert_eq!(a.len(), EVENT_ID_LEN);
    }

    #[test]
    fn test_eks_mode_requires_cluster_and_region() {
        let err = K8sSource::new(config(json!({"auth": "eks", "region": "us-east-1"})), &EnvSnapshot::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("clusterName"));

        let source = K8sSource::new(config(json!({})), &EnvSnapshot::default()).unwrap();
        assert_eq!(source.service, "checkout");
    }
}
