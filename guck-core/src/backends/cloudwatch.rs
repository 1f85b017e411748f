//! CloudWatch Logs backend
//!
//! Pages through `FilterLogEvents` for one log group and time range.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::aws::sigv4::{sign_request, SigningParams};
use super::aws::CredentialsProvider;
use super::normalize::{normalize_line, LineContext};
use super::remote::{LogSource, Page, RemoteBackend, TimeWindow};
use super::{BackendKind, CloudWatchConfig};
use crate::config::EnvSnapshot;
use crate::error::{GuckError, Result};
use crate::event::Event;
use crate::time::format_iso_ms;

const TARGET: &str = "Logs_20140328.FilterLogEvents";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const PAGE_SIZE: u32 = 1000;

pub type CloudWatchBackend = RemoteBackend<CloudWatchSource>;

impl RemoteBackend<CloudWatchSource> {
    pub fn from_config(config: CloudWatchConfig, env: &EnvSnapshot) -> Result<Self> {
        Ok(RemoteBackend::new(CloudWatchSource::new(config, env)?))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FilterLogEventsRequest<'a> {
    log_group_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
    limit: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterLogEventsResponse {
    #[serde(default)]
    events: Vec<FilteredLogEvent>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilteredLogEvent {
    #[serde(default)]
    log_stream_name: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
}

/// Service name derived from a log group: its last path segment
fn service_from_log_group(log_group: &str) -> String {
    log_group
        .trim_end_matches('/')
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(log_group)
        .to_string()
}

pub struct CloudWatchSource {
    config: CloudWatchConfig,
    endpoint: Url,
    service: String,
    http: reqwest::Client,
    credentials: CredentialsProvider,
}

impl CloudWatchSource {
    pub fn new(config: CloudWatchConfig, env: &EnvSnapshot) -> Result<Self> {
        let raw_endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://logs.{}.amazonaws.com", config.region));
        let endpoint = Url::parse(&format!("{}/", raw_endpoint.trim_end_matches('/')))
            .map_err(|e| GuckError::config(format!("invalid CloudWatch endpoint '{}': {}", raw_endpoint, e)))?;
        let service = config
            .service
            .clone()
            .unwrap_or_else(|| service_from_log_group(&config.log_group));
        let credentials = CredentialsProvider::new(config.profile.clone(), &config.region, env.clone())
            .with_sts_endpoint(config.sts_endpoint.clone());
        Ok(Self {
            config,
            endpoint,
            service,
            http: reqwest::Client::new(),
            credentials,
        })
    }

    fn to_event(&self, raw: FilteredLogEvent) -> Event {
        let stream = raw.log_stream_name.unwrap_or_default();
        let mut metadata = Map::new();
        metadata.insert("log_group".into(), Value::String(self.config.log_group.clone()));
        metadata.insert("log_stream".into(), Value::String(stream.clone()));

        let ctx = LineContext {
            backend: BackendKind::Cloudwatch,
            backend_id: &self.config.id,
            service: &self.service,
            run_id: &stream,
            id: raw
                .event_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            ts: raw.timestamp.map(format_iso_ms),
            metadata,
            accept_aliases: false,
        };
        normalize_line(&ctx, raw.message.as_deref().unwrap_or_default().trim_end())
    }
}

#[async_trait]
impl LogSource for CloudWatchSource {
    type Cursor = String;

    fn kind(&self) -> BackendKind {
        BackendKind::Cloudwatch
    }

    fn id(&self) -> &str {
        &self.config.id
    }

    async fn fetch_page(&self, window: &TimeWindow, cursor: Option<String>) -> Result<Page<String>> {
        let body = serde_json::to_vec(&FilterLogEventsRequest {
            log_group_name: &self.config.log_group,
            start_time: window.start_ms,
            end_time: window.end_ms,
            next_token: cursor.as_deref(),
            limit: PAGE_SIZE,
        })?;

        let credentials = self.credentials.refresh_if_needed().await?;
        let params = SigningParams {
            credentials: &credentials,
            region: &self.config.region,
            service: "logs",
            time: Utc::now(),
        };
        let signed = sign_request(
            &params,
            "POST",
            &self.endpoint,
            &[("content-type", CONTENT_TYPE), ("x-amz-target", TARGET)],
            &body,
        )?;

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", TARGET)
            .body(body);
        for (name, value) in signed {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .map(|v| {
                    let kind = v.get("__type").and_then(Value::as_str).unwrap_or("error").to_string();
                    let message = v
                        .get("message")
                        .or_else(|| v.get("Message"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    format!("{}: {}", kind, message)
                })
                .unwrap_or(text);
            return Err(GuckError::remote(
                "cloudwatch",
                format!("FilterLogEvents returned {}: {}", status, detail),
            ));
        }

        let parsed: FilterLogEventsResponse = serde_json::from_str(&text)?;
        let events = parsed.events.into_iter().map(|raw| self.to_event(raw)).collect();
        // An empty or repeated token means the stream is exhausted
        let next = parsed
            .next_token
            .filter(|token| !token.is_empty() && Some(token) != cursor.as_ref());
        Ok(Page { events, next })
    }
}
