use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::confine::ConfinePolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub root: Root,
    #[serde(default)]
    pub shell: Shell,
    #[serde(default)]
    pub repl: Repl,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub limits: Limits,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Root {
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
}
impl Default for Root {
    fn default() -> Self { Self { root_dir: default_root_dir() } }
}
fn default_root_dir() -> PathBuf { PathBuf::from(".") }

#[derive(Debug, Deserialize, Clone)]
pub struct Shell {
    #[serde(default)]
    pub confine: ConfinePolicy,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}
impl Default for Shell {
    fn default() -> Self { Self { confine: ConfinePolicy::default(), history_limit: default_history_limit() } }
}
fn default_history_limit() -> usize { 50 }

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Repl {
    /// Line-editing history, relative to the root unless absolute.
    #[serde(default)]
    pub history_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}
impl Default for Server {
    fn default() -> Self { Self { bind_addr: default_bind_addr(), port: default_port() } }
}
fn default_bind_addr() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Auth {
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Limits {
    #[serde(default = "default_max_request_kb")]
    pub max_request_kb: usize,
    #[serde(default = "default_max_output_kb")]
    pub max_output_kb: usize,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Web sessions idle this long are dropped.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_request_kb: default_max_request_kb(),
            max_output_kb: default_max_output_kb(),
            requests_per_second: default_rps(),
            burst: default_burst(),
            session_idle_secs: default_session_idle_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}
fn default_max_request_kb() -> usize { 16 }
fn default_max_output_kb() -> usize { 256 }
fn default_rps() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_session_idle_secs() -> u64 { 1800 }
fn default_max_sessions() -> usize { 256 }

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Ok(toml::from_str(&raw)?)
        }
    }

    /// Creates the root when it does not exist yet, then checks the rest.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.root.root_dir.exists() {
            fs::create_dir_all(&self.root.root_dir)?;
        }
        if !self.root.root_dir.is_dir() {
            anyhow::bail!("root_dir is not a directory: {}", self.root.root_dir.display());
        }
        if let Some(token) = &self.auth.bearer_token {
            if token.trim().is_empty() { anyhow::bail!("bearer_token must not be blank when set"); }
        }
        if self.shell.history_limit == 0 { anyhow::bail!("history_limit must be > 0"); }
        if self.limits.max_request_kb == 0 { anyhow::bail!("max_request_kb must be > 0"); }
        if self.limits.max_output_kb == 0 { anyhow::bail!("max_output_kb must be > 0"); }
        if self.limits.requests_per_second == 0 { anyhow::bail!("requests_per_second must be > 0"); }
        if self.limits.burst == 0 { anyhow::bail!("burst must be > 0"); }
        if self.limits.session_idle_secs == 0 { anyhow::bail!("session_idle_secs must be > 0"); }
        if self.limits.max_sessions == 0 { anyhow::bail!("max_sessions must be > 0"); }
        Ok(())
    }

    pub fn history_path(&self, root: &Path) -> Option<PathBuf> {
        self.repl.history_file.as_ref().map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
    }
}

pub fn canonical_root(root: &Path) -> anyhow::Result<PathBuf> {
    let c = dunce::canonicalize(root)?;
    Ok(c)
}
