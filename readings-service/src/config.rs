use readings_core::domain::DEFAULT_UNIT;
use serde::Deserialize;
use std::{fs, path::PathBuf};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Pgwire,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub kind: StoreKind,
    #[serde(default)]
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
    #[serde(default = "default_base_path")]
    pub base_path: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default = "default_unit")]
    pub unit: String,
    /// CSV loaded into an empty store at startup.
    pub seed_file: Option<PathBuf>,
    pub metrics: Option<MetricsConfig>,
}

fn default_max_connections() -> u32 {
    5
}

fn default_base_path() -> String {
    "/readings".to_string()
}

fn default_channel_capacity() -> usize {
    64
}

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("READINGS_CONFIG").unwrap_or_else(|_| "readings-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        if cfg.store.kind == StoreKind::Pgwire && cfg.store.uri.is_empty() {
            anyhow::bail!("store.uri is required when store.kind = \"pgwire\"");
        }
        Ok(cfg)
    }
}
