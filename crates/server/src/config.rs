//! Server configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Primary directory scanned for model bundles
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// Comma-separated extra directories scanned after the primary one
    #[serde(default)]
    pub additional_model_dirs: String,

    /// Model served when a request names none; overrides metric election
    #[serde(default)]
    pub default_model: Option<String>,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Fixed seed for synthetic history noise; unset means entropy-seeded
    #[serde(default)]
    pub sequence_seed: Option<u64>,
}

fn default_model_dir() -> String {
    "models".to_string()
}

fn default_api_port() -> u16 {
    8000
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("LONGEVITY"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| ServerConfig {
            model_dir: default_model_dir(),
            additional_model_dirs: String::new(),
            default_model: None,
            api_port: default_api_port(),
            sequence_seed: None,
        }))
    }

    /// All bundle directories, primary first
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(&self.model_dir)];
        for dir in self.additional_model_dirs.split(',') {
            let dir = dir.trim();
            if !dir.is_empty() {
                paths.push(PathBuf::from(dir));
            }
        }
        paths
    }
}
