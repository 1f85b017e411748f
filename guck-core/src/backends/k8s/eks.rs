//! EKS bearer tokens and cluster discovery
//!
//! A token is `k8s-aws-v1.` followed by the unpadded base64url encoding of a
//! presigned STS `GetCallerIdentity` URL that also signs the
//! `x-k8s-aws-id: <cluster>` header. The API server accepts it for 15
//! minutes; it is treated as valid for 14 and refreshed 30 seconds before
//! that.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backends::aws::sigv4::{presign_url, sign_request, SigningParams};
use crate::backends::aws::{sts_endpoint, AwsCredentials, CredentialsProvider};
use crate::error::{GuckError, Result};

pub const TOKEN_PREFIX: &str = "k8s-aws-v1.";
pub const CLUSTER_ID_HEADER: &str = "x-k8s-aws-id";

const TOKEN_TTL_SECS: i64 = 14 * 60;
const REFRESH_MARGIN_SECS: i64 = 30;
const PRESIGN_EXPIRES_SECS: u64 = 60;

/// A bearer token and when it stops being usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EksToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl EksToken {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) <= now
    }
}

/// Build a token for `cluster_name` signed at `now`
pub fn generate_token(
    credentials: &AwsCredentials,
    cluster_name: &str,
    region: &str,
    sts_base: &str,
    now: DateTime<Utc>,
) -> Result<EksToken> {
    let url = Url::parse(&format!(
        "{}/?Action=GetCallerIdentity&Version=2011-06-15",
        sts_base.trim_end_matches('/')
    ))
    .map_err(|e| GuckError::config(format!("invalid STS endpoint '{}': {}", sts_base, e)))?;
    let params = SigningParams {
        credentials,
        region,
        service: "sts",
        time: now,
    };
    let presigned = presign_url(
        &params,
        &url,
        &[(CLUSTER_ID_HEADER, cluster_name)],
        PRESIGN_EXPIRES_SECS,
    )?;
    Ok(EksToken {
        token: format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(presigned.as_str())),
        expires_at: now + Duration::seconds(TOKEN_TTL_SECS),
    })
}

/// Endpoint and CA of an EKS cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEndpoint {
    pub server: String,
    pub ca_pem: Option<Vec<u8>>,
}

/// Issues EKS tokens for one cluster, caching the current one
#[derive(Debug)]
pub struct EksTokenProvider {
    cluster_name: String,
    region: String,
    credentials: CredentialsProvider,
    sts_endpoint: Option<String>,
    cached: Mutex<Option<EksToken>>,
}

impl EksTokenProvider {
    pub fn new(
        cluster_name: impl Into<String>,
        region: impl Into<String>,
        credentials: CredentialsProvider,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            region: region.into(),
            credentials,
            sts_endpoint: None,
            cached: Mutex::new(None),
        }
    }

    pub fn with_sts_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.sts_endpoint = endpoint;
        self
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// The cached token, or a fresh one if it is missing or about to expire
    pub async fn refresh_if_needed(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if !token.needs_refresh(now) {
                return Ok(token.token.clone());
            }
        }
        debug!("Issuing EKS token for cluster {}", self.cluster_name);
        let credentials = self.credentials.refresh_if_needed().await?;
        let sts_base = self
            .sts_endpoint
            .clone()
            .unwrap_or_else(|| sts_endpoint(&self.region));
        let token = generate_token(&credentials, &self.cluster_name, &self.region, &sts_base, now)?;
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Look up the cluster endpoint and CA with EKS `DescribeCluster`
    pub async fn describe_cluster(
        &self,
        http: &reqwest::Client,
        eks_endpoint: Option<&str>,
    ) -> Result<ClusterEndpoint> {
        let base = eks_endpoint
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://eks.{}.amazonaws.com", self.region));
        let url = Url::parse(&format!(
            "{}/clusters/{}",
            base.trim_end_matches('/'),
            self.cluster_name
        ))
        .map_err(|e| GuckError::config(format!("invalid EKS endpoint '{}': {}", base, e)))?;

        let credentials = self.credentials.refresh_if_needed().await?;
        let params = SigningParams {
            credentials: &credentials,
            region: &self.region,
            service: "eks",
            time: Utc::now(),
        };
        let signed = sign_request(&params, "GET", &url, &[], b"")?;

        let mut request = http.get(url).header("accept", "application/json");
        for (name, value) in signed {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GuckError::remote(
                "eks",
                format!("DescribeCluster {} returned {}: {}", self.cluster_name, status, text),
            ));
        }
        parse_describe_cluster(&text)
    }
}

fn parse_describe_cluster(body: &str) -> Result<ClusterEndpoint> {
    let parsed: Value = serde_json::from_str(body)?;
    let server = parsed
        .pointer("/cluster/endpoint")
        .and_then(Value::as_str)
        .ok_or_else(|| GuckError::remote("eks", "DescribeCluster response has no endpoint"))?
        .to_string();
    let ca_pem = parsed
        .pointer("/cluster/certificateAuthority/data")
        .and_then(Value::as_str)
        .map(|data| STANDARD.decode(data.trim()))
        .transpose()
        .map_err(|e| GuckError::remote("eks", format!("invalid cluster CA: {}", e)))?;
    Ok(ClusterEndpoint { server, ca_pem })
}
