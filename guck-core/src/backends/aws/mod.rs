//! AWS credentials, request signing and STS
//!
//! Credentials are resolved on first use and cached until shortly before
//! they expire. Resolution order:
//!
//! 1. `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` (`AWS_SESSION_TOKEN`),
//!    unless a profile was configured explicitly
//! 2. the named profile (configured, `AWS_PROFILE`, or `default`) from the
//!    shared config and credentials files
//! 3. for profiles with `role_arn`, STS `AssumeRole` using the credentials
//!    of `source_profile` (or the environment for
//!    `credential_source = Environment`)

mod profile;
pub mod sigv4;

pub use profile::{IniFile, ProfileFiles};

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::EnvSnapshot;
use crate::error::{GuckError, Result};
use sigv4::{sign_request, uri_encode, SigningParams};

/// Refresh this long before temporary credentials expire
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Source/role chains deeper than this are rejected
const MAX_PROFILE_DEPTH: usize = 4;

const ASSUME_ROLE_SECONDS: u32 = 3600;

/// Static or temporary AWS credentials
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expires_at: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Whether the credentials are unusable at `now` (with margin)
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires| expires - Duration::seconds(EXPIRY_MARGIN_SECS) <= now)
    }

    fn from_env(env: &EnvSnapshot) -> Option<Self> {
        let key = env.get("AWS_ACCESS_KEY_ID")?;
        let secret = env.get("AWS_SECRET_ACCESS_KEY")?;
        let mut credentials = Self::new(key, secret);
        credentials.session_token = env.get("AWS_SESSION_TOKEN").map(str::to_string);
        Some(credentials)
    }

    fn from_profile(settings: &HashMap<String, String>) -> Option<Self> {
        let key = settings.get("aws_access_key_id")?;
        let secret = settings.get("aws_secret_access_key")?;
        let mut credentials = Self::new(key, secret);
        credentials.session_token = settings.get("aws_session_token").cloned();
        Some(credentials)
    }
}

/// STS endpoint for a region
pub fn sts_endpoint(region: &str) -> String {
    format!("https://sts.{}.amazonaws.com", region)
}

/// Lazily resolved, cached credentials for one profile
#[derive(Debug)]
pub struct CredentialsProvider {
    profile: Option<String>,
    region: String,
    env: EnvSnapshot,
    http: reqwest::Client,
    sts_endpoint: Option<String>,
    cached: Mutex<Option<AwsCredentials>>,
}

impl CredentialsProvider {
    pub fn new(profile: Option<String>, region: impl Into<String>, env: EnvSnapshot) -> Self {
        Self {
            profile,
            region: region.into(),
            env,
            http: reqwest::Client::new(),
            sts_endpoint: None,
            cached: Mutex::new(None),
        }
    }

    /// Send STS calls somewhere other than the regional endpoint
    pub fn with_sts_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.sts_endpoint = endpoint;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    /// Cached credentials, re-resolved when missing or about to expire
    pub async fn refresh_if_needed(&self) -> Result<AwsCredentials> {
        let mut cached = self.cached.lock().await;
        if let Some(credentials) = cached.as_ref() {
            if !credentials.needs_refresh(Utc::now()) {
                return Ok(credentials.clone());
            }
            debug!("AWS credentials for {:?} expired, refreshing", self.profile);
        }
        let credentials = self.resolve().await?;
        *cached = Some(credentials.clone());
        Ok(credentials)
    }

    async fn resolve(&self) -> Result<AwsCredentials> {
        if self.profile.is_none() {
            if let Some(credentials) = AwsCredentials::from_env(&self.env) {
                return Ok(credentials);
            }
        }
        let name = self
            .profile
            .clone()
            .or_else(|| self.env.get("AWS_PROFILE").map(str::to_string))
            .unwrap_or_else(|| "default".to_string());
        let files = ProfileFiles::load(&self.env);
        self.resolve_profile(&files, &name).await
    }

    /// Follow `role_arn` / `source_profile` links down to static
    /// credentials, then assume each role on the way back up.
    async fn resolve_profile(&self, files: &ProfileFiles, start: &str) -> Result<AwsCredentials> {
        let mut hops: Vec<HashMap<String, String>> = Vec::new();
        let mut name = start.to_string();

        let base = loop {
            if hops.len() > MAX_PROFILE_DEPTH {
                return Err(GuckError::auth("aws", format!("profile chain too deep at '{}'", name)));
            }
            let settings = files
                .profile(&name)
                .ok_or_else(|| GuckError::auth("aws", format!("profile '{}' not found", name)))?;

            if !settings.contains_key("role_arn") {
                break AwsCredentials::from_profile(&settings).ok_or_else(|| {
                    GuckError::auth("aws", format!("profile '{}' has no credentials", name))
                })?;
            }

            let source_profile = settings.get("source_profile").cloned();
            let credential_source = settings.get("credential_source").cloned();
            let own_keys = AwsCredentials::from_profile(&settings);
            hops.push(settings);

            match (source_profile, credential_source) {
                (Some(source), _) if source == name => {
                    break own_keys.ok_or_else(|| {
                        GuckError::auth("aws", format!("profile '{}' has no source credentials", name))
                    })?;
                }
                (Some(source), _) => name = source,
                (None, Some(kind)) if kind.eq_ignore_ascii_case("environment") => {
                    break AwsCredentials::from_env(&self.env).ok_or_else(|| {
                        GuckError::auth("aws", "credential_source=Environment but no keys are set")
                    })?;
                }
                _ => {
                    return Err(GuckError::auth(
                        "aws",
                        format!("profile '{}' has role_arn but no source_profile", name),
                    ))
                }
            }
        };

        let mut credentials = base;
        for settings in hops.iter().rev() {
            let role_arn = settings.get("role_arn").map(String::as_str).unwrap_or_default();
            let session_name = settings
                .get("role_session_name")
                .cloned()
                .unwrap_or_else(|| format!("guck-{}", Utc::now().timestamp()));
            let region = settings
                .get("region")
                .cloned()
                .unwrap_or_else(|| self.region.clone());
            debug!("Assuming role {}", role_arn);
            credentials = self
                .assume_role(
                    &credentials,
                    &region,
                    role_arn,
                    &session_name,
                    settings.get("external_id").map(String::as_str),
                )
                .await?;
        }
        Ok(credentials)
    }

    /// STS `AssumeRole` with a JSON response
    pub async fn assume_role(
        &self,
        source: &AwsCredentials,
        region: &str,
        role_arn: &str,
        session_name: &str,
        external_id: Option<&str>,
    ) -> Result<AwsCredentials> {
        let endpoint = self
            .sts_endpoint
            .clone()
            .unwrap_or_else(|| sts_endpoint(region));
        let url = Url::parse(&format!("{}/", endpoint.trim_end_matches('/')))
            .map_err(|e| GuckError::config(format!("invalid STS endpoint '{}': {}", endpoint, e)))?;

        let mut form = vec![
            ("Action", "AssumeRole".to_string()),
            ("Version", "2011-06-15".to_string()),
            ("RoleArn", role_arn.to_string()),
            ("RoleSessionName", session_name.to_string()),
            ("DurationSeconds", ASSUME_ROLE_SECONDS.to_string()),
        ];
        if let Some(external_id) = external_id {
            form.push(("ExternalId", external_id.to_string()));
        }
        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", k, uri_encode(v, true)))
            .collect::<Vec<_>>()
            .join("&");

        let content_type = "application/x-www-form-urlencoded; charset=utf-8";
        let params = SigningParams {
            credentials: source,
            region,
            service: "sts",
            time: Utc::now(),
        };
        let signed = sign_request(
            &params,
            "POST",
            &url,
            &[("content-type", content_type)],
            body.as_bytes(),
        )?;

        let mut request = self
            .http
            .post(url)
            .header("content-type", content_type)
            .header("accept", "application/json")
            .body(body);
        for (name, value) in signed {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GuckError::auth("sts", format!("AssumeRole returned {}: {}", status, text)));
        }
        parse_assume_role_response(&text)
    }
}

fn parse_expiration(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            Utc.timestamp_opt(secs as i64, 0).single()
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)),
        _ => None,
    }
}

/// Extract credentials from an STS `AssumeRole` JSON body
pub fn parse_assume_role_response(body: &str) -> Result<AwsCredentials> {
    let parsed: Value = serde_json::from_str(body)?;
    let credentials = parsed
        .pointer("/AssumeRoleResponse/AssumeRoleResult/Credentials")
        .ok_or_else(|| GuckError::auth("sts", "AssumeRole response has no Credentials"))?;
    let field = |name: &str| {
        credentials
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GuckError::auth("sts", format!("AssumeRole response lacks {}", name)))
    };
    Ok(AwsCredentials {
        access_key_id: field("AccessKeyId")?,
        secret_access_key: field("SecretAccessKey")?,
        session_token: Some(field("SessionToken")?),
        expires_at: credentials.get("Expiration").and_then(parse_expiration),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env_with_files(dir: &TempDir, credentials: &str, config: &str) -> EnvSnapshot {
        let credentials_path = dir.path().join("credentials");
        let config_path = dir.path().join("config");
        std::fs::write(&credentials_path, credentials).unwrap();
        std::fs::write(&config_path, config).unwrap();
        EnvSnapshot::from_pairs([
            ("AWS_SHARED_CREDENTIALS_FILE", credentials_path.display().to_string()),
            ("AWS_CONFIG_FILE", config_path.display().to_string()),
        ])
    }

    #[test]
    fn test_needs_refresh() {
        let now = Utc::now();
        let mut credentials = AwsCredentials::new("a", "b");
        assert!(!credentials.needs_refresh(now));
        credentials.expires_at = Some(now + Duration::seconds(30));
        assert!(credentials.needs_refresh(now));
        credentials.expires_at = Some(now + Duration::minutes(30));
        assert!(!credentials.needs_refresh(now));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let credentials = AwsCredentials::new("AKIA", "very-secret").with_session_token("tok");
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("tok\""));
    }

    #[tokio::test]
    async fn test_environment_credentials() {
        let env = EnvSnapshot::from_pairs([
            ("AWS_ACCESS_KEY_ID", "AKIAENV"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_SESSION_TOKEN", "session"),
        ]);
        let provider = CredentialsProvider::new(None, "us-east-1", env);
        let credentials = provider.refresh_if_needed().await.unwrap();
        assert_eq!(credentials.access_key_id, "AKIAENV");
        assert_eq!(credentials.session_token.as_deref(), Some("session"));
    }

    #[tokio::test]
    async fn test_named_profile_from_files() {
        let dir = TempDir::new().unwrap();
        let env = env_with_files(
            &dir,
            "[ops]\naws_access_key_id = AKIAOPS\naws_secret_access_key = s\n",
            "",
        );
        let provider = CredentialsProvider::new(Some("ops".into()), "us-east-1", env);
        assert_eq!(provider.refresh_if_needed().await.unwrap().access_key_id, "AKIAOPS");

        let missing = CredentialsProvider::new(Some("nope".into()), "us-east-1", EnvSnapshot::default());
        assert_eq!(
            missing.refresh_if_needed().await.unwrap_err().error_code(),
            "AUTH_ERROR"
        );
    }

    #[tokio::test]
    async fn test_role_assumption_through_sts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("accept", "application/json")
            .match_body(mockito::Matcher::Regex("Action=AssumeRole".into()))
            .with_status(200)
            .with_body(
                r#"{"AssumeRoleResponse":{"AssumeRoleResult":{"Credentials":{
                    "AccessKeyId":"ASIAROLE","SecretAccessKey":"rs","SessionToken":"rt",
                    "Expiration":4102444800}}}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let env = env_with_files(
            &dir,
            "[base]\naws_access_key_id = AKIABASE\naws_secret_access_key = bs\n",
            "[profile deploy]\nrole_arn = arn:aws:iam::123:role/deploy\nsource_profile = base\n",
        );
        let provider = CredentialsProvider::new(Some("deploy".into()), "us-east-1", env)
            .with_sts_endpoint(Some(server.url()));

        let credentials = provider.refresh_if_needed().await.unwrap();
        assert_eq!(credentials.access_key_id, "ASIAROLE");
        assert_eq!(credentials.session_token.as_deref(), Some("rt"));
        assert_eq!(credentials.expires_at.unwrap().timestamp(), 4_102_444_800);

        // Served from cache
        provider.refresh_if_needed().await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_parse_assume_role_errors() {
        assert!(parse_assume_role_response("{}").is_err());
        assert!(parse_assume_role_response("not json").is_err());
    }
}
