use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the console sends session and chat requests.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            query_timeout_secs: default_query_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_query_timeout_secs() -> u64 {
    120
}
fn default_connect_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub drop_dir: Option<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            drop_dir: None,
            poll_interval_ms: default_poll_interval_ms(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Upstream OpenAI-compatible chat completions endpoint used by `serve`.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Read from `LLM_API_KEY`, never from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
            system_prompt: default_system_prompt(),
            api_key: None,
        }
    }
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    2
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the provided context to answer questions accurately."
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Log file for this run, or `None` for stderr. The raw-mode console
    /// draws on the terminal, so without `file` it logs to `genterm.log`
    /// in the temp directory.
    pub fn destination(&self, interactive: bool) -> Option<PathBuf> {
        match &self.file {
            Some(path) => Some(path.clone()),
            None if interactive => Some(std::env::temp_dir().join("genterm.log")),
            None => None,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Loads the config file if it exists, otherwise starts from defaults.
/// Environment overrides are applied in both cases.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    apply_env(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Applies `LLM_*`, `GENTERM_GATEWAY_URL`, and `PORT` overrides. The lookup
/// is injected so tests don't touch the process environment.
pub fn apply_env(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = non_empty("LLM_API_KEY") {
        config.llm.api_key = Some(key);
    }
    if let Some(url) = non_empty("LLM_BASE_URL") {
        config.llm.base_url = url;
    }
    if let Some(model) = non_empty("LLM_MODEL") {
        config.llm.model = model;
    }
    if let Some(url) = non_empty("GENTERM_GATEWAY_URL") {
        config.gateway.base_url = url;
    }
    if let Some(port) = non_empty("PORT") {
        let host = config
            .server
            .bind
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.server.bind = format!("{}:{}", host, port.trim());
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.gateway.query_timeout_secs == 0 {
        bail!("gateway.query_timeout_secs must be > 0");
    }
    if !is_http_url(&config.gateway.base_url) {
        bail!(
            "gateway.base_url must start with http:// or https:// (got '{}')",
            config.gateway.base_url
        );
    }
    if config.console.poll_interval_ms < 50 {
        bail!("console.poll_interval_ms must be >= 50");
    }
    if config.server.bind.trim().is_empty() {
        bail!("server.bind must not be empty");
    }
    if config.llm.max_tokens == 0 {
        bail!("llm.max_tokens must be > 0");
    }
    if !is_http_url(&config.llm.base_url) {
        bail!(
            "llm.base_url must start with http:// or https:// (got '{}')",
            config.llm.base_url
        );
    }
    Ok(())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
