//! Configuration for Guck
//!
//! Configuration comes from `.guck.json` in the repository root (the nearest
//! ancestor of the working directory that contains `.git`), merged section by
//! section over the defaults, then adjusted by environment variables.
//!
//! The environment is captured once into an [`EnvSnapshot`] and passed in
//! explicitly, so loading is deterministic under test.
//!
//! | Variable                         | Effect                                   |
//! |----------------------------------|------------------------------------------|
//! | `GUCK_CONFIG` / `GUCK_CONFIG_PATH` | explicit config file or directory      |
//! | `GUCK_CWD` / `INIT_CWD`          | working directory for discovery          |
//! | `GUCK_DIR`                       | store directory (default `~/.guck/logs`) |
//! | `GUCK_ENABLED`                   | `true` / `false` override                |
//! | `GUCK_SERVICE`                   | default service                          |
//! | `GUCK_RUN_ID` / `GUCK_SESSION_ID`| emit context defaults                    |
//! | `GUCK_STRICT_WRITE_ERRORS`       | `1` turns write errors into failures     |

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::event::EmitContext;

/// Name of the per-repository config file
pub const CONFIG_FILE_NAME: &str = ".guck.json";

/// Point-in-time copy of the environment variables Guck reads
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build from explicit pairs (tests, embedding hosts)
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-empty value of a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn parse_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuckConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Master switch for capture
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Service used when an event does not name one
    #[serde(default = "default_service")]
    pub default_service: String,

    #[serde(default)]
    pub sdk: SdkConfig,

    #[serde(default)]
    pub redaction: RedactionConfig,

    #[serde(default)]
    pub mcp: McpConfig,

    /// `"local"` (default) or `"multi"`
    #[serde(default)]
    pub backend: BackendMode,

    /// Raw backend descriptors, validated when backends are built so that a
    /// bad entry becomes a per-backend error instead of a load failure
    #[serde(default)]
    pub backends: Vec<Value>,
}

fn default_version() -> u32 { 1 }
fn default_true() -> bool { true }
fn default_service() -> String { "guck".to_string() }

impl Default for GuckConfig {
    fn default() -> Self {
        Self {
            version: 1,
            enabled: true,
            default_service: default_service(),
            sdk: SdkConfig::default(),
            redaction: RedactionConfig::default(),
            mcp: McpConfig::default(),
            backend: BackendMode::Local,
            backends: Vec::new(),
        }
    }
}

/// Whether queries use the implicit local store or the `backends` list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    #[default]
    Local,
    Multi,
}

/// SDK auto-capture switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub capture_stdout: bool,
    #[serde(default = "default_true")]
    pub capture_stderr: bool,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_stdout: true,
            capture_stderr: true,
        }
    }
}

/// Redaction rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Object keys whose values are always scrubbed (case-insensitive)
    #[serde(default = "default_redaction_keys")]
    pub keys: Vec<String>,

    /// Regular expressions applied to every string value
    #[serde(default = "default_redaction_patterns")]
    pub patterns: Vec<String>,
}

fn default_redaction_keys() -> Vec<String> {
    ["authorization", "api_key", "token", "secret", "password"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_redaction_patterns() -> Vec<String> {
    vec![
        "sk-[A-Za-z0-9]{20,}".to_string(),
        "Bearer\\s+[A-Za-z0-9._-]+".to_string(),
    ]
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keys: default_redaction_keys(),
            patterns: default_redaction_patterns(),
        }
    }
}

/// Query-side limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// Default and ceiling for `limit`
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Lookback used when `since` is unset and there is no checkpoint
    #[serde(default = "default_lookback_ms")]
    pub default_lookback_ms: i64,

    /// Output cap in characters; 0 means uncapped
    #[serde(default)]
    pub max_output_chars: usize,

    /// Per-message cap in characters; 0 means uncapped
    #[serde(default)]
    pub max_message_chars: usize,
}

fn default_max_results() -> usize { 200 }
fn default_lookback_ms() -> i64 { 300_000 }

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            max_results: 200,
            default_lookback_ms: 300_000,
            max_output_chars: 0,
            max_message_chars: 0,
        }
    }
}

/// Where to look for configuration
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub cwd: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub env: EnvSnapshot,
}

impl LoadOptions {
    pub fn from_process() -> Self {
        Self {
            cwd: None,
            config_path: None,
            env: EnvSnapshot::from_process(),
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }
}

/// Result of configuration discovery
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Directory the config was resolved from
    pub root_dir: PathBuf,
    /// Path of the config file, if one existed
    pub config_path: Option<PathBuf>,
    pub config: GuckConfig,
    /// Resolved JSONL store directory
    pub store_dir: PathBuf,
    /// `GUCK_STRICT_WRITE_ERRORS=1`
    pub strict_write_errors: bool,
    env: EnvSnapshot,
}

impl LoadedConfig {
    /// Environment the configuration was loaded with
    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    /// Emit defaults: configured service, `GUCK_RUN_ID` (or a new id),
    /// `GUCK_SESSION_ID`
    pub fn emit_context(&self) -> EmitContext {
        let mut ctx = EmitContext::new(self.config.default_service.clone());
        if let Some(run_id) = self.env.get("GUCK_RUN_ID") {
            ctx = ctx.with_run_id(run_id);
        }
        if let Some(session_id) = self.env.get("GUCK_SESSION_ID") {
            ctx = ctx.with_session_id(session_id);
        }
        ctx
    }
}

/// Walk up from `start` to the nearest directory containing `.git`.
/// Falls back to `start` itself.
pub fn find_repo_root(start: &Path) -> PathBuf {
    let mut current = start;
    loop {
        if current.join(".git").exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return start.to_path_buf(),
        }
    }
}

/// Store directory: `GUCK_DIR` or `~/.guck/logs`
pub fn resolve_store_dir(env: &EnvSnapshot) -> PathBuf {
    if let Some(dir) = env.get("GUCK_DIR") {
        return PathBuf::from(dir);
    }
    home_dir(env).join(".guck").join("logs")
}

/// Home directory from the environment
pub fn home_dir(env: &EnvSnapshot) -> PathBuf {
    env.get("HOME")
        .or_else(|| env.get("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn read_json_object(path: &Path) -> Option<Value> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Ignoring config {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(parsed) if parsed.is_object() => Some(parsed),
        Ok(_) => {
            warn!("Ignoring config {}: top level is not an object", path.display());
            None
        }
        Err(e) => {
            warn!("Ignoring config {}: {}", path.display(), e);
            None
        }
    }
}

/// Load configuration.
///
/// A missing, unreadable or non-object config file is treated as absent.
/// A config file that is an object but does not fit the schema also falls
/// back to defaults.
pub fn load_config(options: &LoadOptions) -> LoadedConfig {
    let env = &options.env;
    let working_dir = options
        .cwd
        .clone()
        .or_else(|| env.get("GUCK_CWD").map(PathBuf::from))
        .or_else(|| env.get("INIT_CWD").map(PathBuf::from))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let explicit = options
        .config_path
        .clone()
        .or_else(|| env.get("GUCK_CONFIG").map(PathBuf::from))
        .or_else(|| env.get("GUCK_CONFIG_PATH").map(PathBuf::from));

    let (root_dir, candidate) = match explicit {
        Some(path) => {
            let resolved = if path.is_absolute() { path } else { working_dir.join(path) };
            if resolved.is_dir() {
                let file = resolved.join(CONFIG_FILE_NAME);
                (resolved, file)
            } else {
                let root = resolved
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| working_dir.clone());
                (root, resolved)
            }
        }
        None => {
            let root = find_repo_root(&working_dir);
            let file = root.join(CONFIG_FILE_NAME);
            (root, file)
        }
    };

    let exists = candidate.exists();
    let mut config = if exists {
        read_json_object(&candidate)
            .and_then(|value| match serde_json::from_value::<GuckConfig>(value) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!(
                        "Ignoring config {}: {}; using defaults, no configured backends apply",
                        candidate.display(),
                        e
                    );
                    None
                }
            })
            .unwrap_or_default()
    } else {
        GuckConfig::default()
    };

    if let Some(enabled) = env.parse_bool("GUCK_ENABLED") {
        config.enabled = enabled;
    }
    if let Some(service) = env.get("GUCK_SERVICE") {
        config.default_service = service.to_string();
    }

    LoadedConfig {
        root_dir,
        config_path: exists.then_some(candidate),
        config,
        store_dir: resolve_store_dir(env),
        strict_write_errors: env.get("GUCK_STRICT_WRITE_ERRORS") == Some("1"),
        env: env.clone(),
    }
}
