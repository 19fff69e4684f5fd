use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use earshot_platforms::PlatformsConfig;
use earshot_provider::{ProviderConfig, ProviderKind};
use earshot_schema::{ListenerConfig, Platform};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_env")]
    pub env: String,
}

fn default_env() -> String {
    "dev".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:8848".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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

fn default_db_path() -> String {
    "data/earshot.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            api_key: None,
            base_url: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl LlmConfig {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            kind: self.kind,
            api_key: self.api_key.clone().filter(|k| !k.is_empty()),
            base_url: self.base_url.clone().filter(|u| !u.is_empty()),
        }
    }
}

fn default_retry_interval_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    256
}

fn default_knowledge_hits() -> usize {
    3
}

fn default_platforms() -> Vec<Platform> {
    vec![Platform::Twitter]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListeningConfig {
    /// Fixed wait before a failed platform stream is reopened.
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    /// Capacity of each session's event queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Knowledge base entries included in a generation prompt.
    #[serde(default = "default_knowledge_hits")]
    pub knowledge_hits: usize,
    #[serde(default = "default_platforms")]
    pub default_platforms: Vec<Platform>,
    #[serde(default)]
    pub default_keywords: Vec<String>,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval_secs(),
            queue_capacity: default_queue_capacity(),
            knowledge_hits: default_knowledge_hits(),
            default_platforms: default_platforms(),
            default_keywords: Vec::new(),
        }
    }
}

impl ListeningConfig {
    /// Session config used when a start request carries no payload.
    pub fn default_listener(&self) -> ListenerConfig {
        ListenerConfig {
            keywords: self.default_keywords.clone(),
            platforms: self.default_platforms.clone(),
            ..ListenerConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarshotConfig {
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub provider: LlmConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
    #[serde(default)]
    pub listening: ListeningConfig,
}

pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

fn resolve_opt(value: &mut Option<String>) {
    if let Some(v) = value {
        *v = resolve_env_var(v);
    }
}

pub fn load_config(root: &Path) -> Result<EarshotConfig> {
    let mut config: EarshotConfig = read_yaml_file(&root.join("main.yaml"))?;
    resolve_config_env(&mut config);
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &EarshotConfig) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        return Err(anyhow!("server.bind must not be empty"));
    }
    if config.database.path.trim().is_empty() {
        return Err(anyhow!("database.path must not be empty"));
    }
    if config.listening.queue_capacity == 0 {
        return Err(anyhow!("listening.queue_capacity must be greater than zero"));
    }
    if config.listening.retry_interval_secs == 0 {
        return Err(anyhow!(
            "listening.retry_interval_secs must be greater than zero"
        ));
    }
    if config.provider.kind == ProviderKind::Anthropic
        && config
            .provider
            .api_key
            .as_deref()
            .map_or(true, |k| k.trim().is_empty())
    {
        return Err(anyhow!("provider kind anthropic requires provider.api_key"));
    }

    let bases = [
        ("platforms.twitter.api_base", &config.platforms.twitter.api_base),
        ("platforms.meta.api_base", &config.platforms.meta.api_base),
        ("platforms.linkedin.api_base", &config.platforms.linkedin.api_base),
    ];
    for (field, base) in bases {
        url::Url::parse(base).with_context(|| format!("invalid url in {field}: {base}"))?;
    }
    if let Some(base) = &config.provider.base_url {
        if !base.is_empty() {
            url::Url::parse(base)
                .with_context(|| format!("invalid url in provider.base_url: {base}"))?;
        }
    }

    Ok(())
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

fn resolve_config_env(config: &mut EarshotConfig) {
    config.app.name = resolve_env_var(&config.app.name);
    config.app.env = resolve_env_var(&config.app.env);
    config.server.bind = resolve_env_var(&config.server.bind);
    config.database.path = resolve_env_var(&config.database.path);

    resolve_opt(&mut config.provider.api_key);
    resolve_opt(&mut config.provider.base_url);
    config.provider.model = resolve_env_var(&config.provider.model);

    let twitter = &mut config.platforms.twitter;
    twitter.api_base = resolve_env_var(&twitter.api_base);
    resolve_opt(&mut twitter.client_id);
    resolve_opt(&mut twitter.client_secret);
    config.platforms.meta.api_base = resolve_env_var(&config.platforms.meta.api_base);
    config.platforms.linkedin.api_base = resolve_env_var(&config.platforms.linkedin.api_base);
}
