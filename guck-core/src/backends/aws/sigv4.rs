//! AWS Signature Version 4
//!
//! Header signing for JSON/query APIs (CloudWatch Logs, STS, EKS) and query
//! string presigning for the EKS bearer token.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};

use super::AwsCredentials;
use crate::error::{GuckError, Result};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

type HmacSha256 = Hmac<Sha256>;

/// Who signs, where, and when
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    pub credentials: &'a AwsCredentials,
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

impl SigningParams<'_> {
    fn amz_date(&self) -> String {
        self.time.format("%Y%m%dT%H%M%SZ").to_string()
    }

    fn short_date(&self) -> String {
        self.time.format("%Y%m%d").to_string()
    }

    fn scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            self.short_date(),
            self.region,
            self.service
        )
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| GuckError::Internal {
        reason: format!("HMAC key rejected: {}", e),
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// `kSigning` for a secret, date, region and service
pub fn signing_key(secret: &str, short_date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), short_date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding with the SigV4 unreserved set
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| uri_encode(segment, true))
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(pairs: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Lowercased, trimmed, sorted headers with `host` included
fn canonical_headers(url: &Url, headers: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut all: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.trim().to_string()))
        .filter(|(name, _)| name != "host")
        .collect();
    all.push(("host".to_string(), host_header(url)));
    all.sort();
    all
}

fn signature(
    params: &SigningParams<'_>,
    method: &str,
    url: &Url,
    query: &[(String, String)],
    headers: &[(String, String)],
    payload_hash: &str,
) -> Result<(String, String)> {
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let header_block: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri(url),
        canonical_query(query),
        header_block,
        signed_headers,
        payload_hash
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        params.amz_date(),
        params.scope(),
        sha256_hex(canonical_request.as_bytes())
    );
    let key = signing_key(
        &params.credentials.secret_access_key,
        &params.short_date(),
        params.region,
        params.service,
    )?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);
    Ok((signed_headers, signature))
}

/// Headers to add to a request so that it is signed: `x-amz-date`,
/// `x-amz-security-token` for temporary credentials, and `authorization`.
pub fn sign_request(
    params: &SigningParams<'_>,
    method: &str,
    url: &Url,
    headers: &[(&str, &str)],
    body: &[u8],
) -> Result<Vec<(String, String)>> {
    let amz_date = params.amz_date();
    let mut to_sign: Vec<(&str, &str)> = headers.to_vec();
    to_sign.push(("x-amz-date", &amz_date));
    if let Some(token) = params.credentials.session_token.as_deref() {
        to_sign.push(("x-amz-security-token", token));
    }

    let query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let canonical = canonical_headers(url, &to_sign);
    let (signed_headers, signature) =
        signature(params, method, url, &query, &canonical, &sha256_hex(body))?;

    let mut added = vec![("x-amz-date".to_string(), amz_date.clone())];
    if let Some(token) = params.credentials.session_token.as_deref() {
        added.push(("x-amz-security-token".to_string(), token.to_string()));
    }
    added.push((
        "authorization".to_string(),
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            params.credentials.access_key_id,
            params.scope(),
            signed_headers,
            signature
        ),
    ));
    Ok(added)
}

/// Presign a GET URL. `headers` must be sent with the eventual request.
pub fn presign_url(
    params: &SigningParams<'_>,
    url: &Url,
    headers: &[(&str, &str)],
    expires_secs: u64,
) -> Result<Url> {
    let canonical = canonical_headers(url, headers);
    let signed_headers = canonical
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    query.push(("X-Amz-Algorithm".into(), ALGORITHM.into()));
    query.push((
        "X-Amz-Credential".into(),
        format!("{}/{}", params.credentials.access_key_id, params.scope()),
    ));
    query.push(("X-Amz-Date".into(), params.amz_date()));
    query.push(("X-Amz-Expires".into(), expires_secs.to_string()));
    query.push(("X-Amz-SignedHeaders".into(), signed_headers));
    if let Some(token) = params.credentials.session_token.as_deref() {
        query.push(("X-Amz-Security-Token".into(), token.to_string()));
    }

    let (_, signature) = signature(params, "GET", url, &query, &canonical, &sha256_hex(b""))?;

    let mut presigned = url.clone();
    presigned.set_query(Some(&format!(
        "{}&X-Amz-Signature={}",
        canonical_query(&query),
        signature
    )));
    Ok(presigned)
}
