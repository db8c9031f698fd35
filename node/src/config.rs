//! Node configuration (§ ambient node crate): defaults, an optional TOML
//! file, and `CRYPTONOTE_`-prefixed environment overrides, following the
//! `config`/`toml` layering the rest of the pack uses for daemon config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub p2p_port: u16,
    pub p2p_bind_addr: String,
    pub max_connections: usize,
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            data_dir: PathBuf::from("./cryptonote-data"),
            p2p_port: 18080,
            p2p_bind_addr: "0.0.0.0".to_string(),
            max_connections: 8,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Layers the defaults, an optional TOML file at `path`, and
    /// `CRYPTONOTE__`-prefixed environment variables (double underscore
    /// separating nested keys), in that order of increasing priority.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = NodeConfig::default();
        let mut builder = config::Config::builder()
            .set_default("data_dir", defaults.data_dir.to_string_lossy().into_owned())?
            .set_default("p2p_port", i64::from(defaults.p2p_port))?
            .set_default("p2p_bind_addr", defaults.p2p_bind_addr)?
            .set_default("max_connections", defaults.max_connections as i64)?
            .set_default("log_level", defaults.log_level)?;
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("CRYPTONOTE").separator("__"));
        Ok(builder.build()?.try_deserialize()?)
    }

    #[must_use]
    pub fn p2p_listen_addr(&self) -> String {
        format!("{}:{}", self.p2p_bind_addr, self.p2p_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let config = NodeConfig::load(None).unwrap();
        assert_eq!(config.p2p_port, 18080);
        assert_eq!(config.p2p_listen_addr(), "0.0.0.0:18080");
    }
}
