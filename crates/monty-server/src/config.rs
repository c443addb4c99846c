use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Upper bound on probes running at the same time across all
    /// endpoints.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Insert a default endpoint on first start so a fresh install
    /// has something to show.
    #[serde(default = "default_seed_default_endpoint")]
    pub seed_default_endpoint: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            seed_default_endpoint: default_seed_default_endpoint(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            probe: ProbeConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_max_concurrent() -> usize {
    16
}

fn default_seed_default_endpoint() -> bool {
    true
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path`, falling back to pure defaults when the file
    /// does not exist.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::load(path)
        } else {
            tracing::info!(path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }
}
