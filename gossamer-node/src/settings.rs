//! Loading and validation of settings.
//!
//! Values defined in the configuration file can be overridden by
//! environment variables with the `GOSSAMER` prefix, e.g.
//! `GOSSAMER_CLUSTER__LOCAL_INDEX=2`. An example configuration file
//! lives in the `configs/` directory at the repository root.

use std::{fmt, net::SocketAddr, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationError, ValidationErrors};

use gossamer_core::{BlockLayout, Topology, TopologyError, MAX_BLOCK_LEN};

#[derive(Debug, Error)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
/// The combined settings.
///
/// Each section in the configuration file corresponds to the
/// identically named settings field.
pub struct Settings {
    #[validate]
    pub cluster: ClusterSettings,
    #[validate]
    pub params: ParamSettings,
    pub log: LoggingSettings,
}

impl Settings {
    /// Loads and validates the settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its
    /// validation failed. Either happens before any socket or thread
    /// resource is allocated.
    pub fn new(path: PathBuf) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: PathBuf) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        config.merge(config::File::from(path))?;
        config.merge(Environment::with_prefix("gossamer").separator("__"))?;
        config.try_into()
    }
}

#[derive(Debug, Validate, Deserialize, Clone)]
#[validate(schema(function = "validate_cluster"))]
/// Cluster topology settings.
pub struct ClusterSettings {
    /// The ordered list of node gossip addresses. The length must be
    /// a power of two; it determines block ownership.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [cluster]
    /// nodes = ["10.0.0.1:7700", "10.0.0.2:7700"]
    /// ```
    pub nodes: Vec<SocketAddr>,

    /// The local node's position in the node list.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [cluster]
    /// local_index = 0
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// GOSSAMER_CLUSTER__LOCAL_INDEX=0
    /// ```
    pub local_index: usize,

    #[serde(default = "default_block_len")]
    /// Number of parameters per gossip block. Must leave the block
    /// datagram within a single unfragmented UDP payload; defaults to
    /// the largest such value. All nodes must agree on it.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [cluster]
    /// block_len = 100
    /// ```
    pub block_len: usize,
}

fn default_block_len() -> usize {
    MAX_BLOCK_LEN
}

fn validate_cluster(settings: &ClusterSettings) -> Result<(), ValidationError> {
    if !settings.nodes.len().is_power_of_two() {
        return Err(ValidationError::new("node count must be a power of two"));
    }
    if settings.local_index >= settings.nodes.len() {
        return Err(ValidationError::new("local_index out of range"));
    }
    if BlockLayout::new(settings.block_len).is_err() {
        return Err(ValidationError::new(
            "block_len does not fit an unfragmented datagram",
        ));
    }
    Ok(())
}

impl ClusterSettings {
    /// The validated topology.
    pub fn topology(&self) -> Result<Topology, TopologyError> {
        Topology::new(self.nodes.clone(), self.local_index)
    }

    /// The validated block layout.
    pub fn layout(&self) -> BlockLayout {
        // Validation already vouched for the length.
        BlockLayout::new(self.block_len).unwrap_or_else(|_| BlockLayout::max())
    }
}

#[derive(Debug, Validate, Deserialize, Clone)]
/// Parameter vector settings.
pub struct ParamSettings {
    #[validate(range(min = 1))]
    /// Minimum number of parameters; the vector is padded up to a
    /// block multiple.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [params]
    /// len = 1000000
    /// ```
    pub len: usize,

    /// Seed for randomized initialization. Leave unset for a
    /// zero-filled vector.
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
/// Logging settings.
pub struct LoggingSettings {
    #[serde(default = "default_env_filter")]
    #[serde(deserialize_with = "deserialize_env_filter")]
    /// A tracing filter directive, e.g. `info` or
    /// `gossamer_node=debug`.
    pub filter: EnvFilter,
}

fn default_env_filter() -> EnvFilter {
    EnvFilter::try_new("info").unwrap()
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a valid tracing filter directive")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value).map_err(E::custom)
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "gossamer-settings-{}-{}.toml",
            std::process::id(),
            name
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    const VALID: &str = r#"
        [cluster]
        nodes = ["127.0.0.1:7700", "127.0.0.1:7701"]
        local_index = 1
        block_len = 100

        [params]
        len = 1000

        [log]
        filter = "debug"
    "#;

    #[test]
    fn loads_a_valid_configuration() {
        let path = write_config("valid", VALID);
        let settings = Settings::new(path).unwrap();
        assert_eq!(settings.cluster.nodes.len(), 2);
        assert_eq!(settings.cluster.local_index, 1);
        assert_eq!(settings.cluster.block_len, 100);
        assert_eq!(settings.params.len, 1000);
        assert_eq!(settings.params.seed, None);

        let topology = settings.cluster.topology().unwrap();
        assert_eq!(topology.local_index(), 1);
        assert_eq!(settings.cluster.layout().block_len(), 100);
    }

    #[test]
    fn block_len_defaults_to_a_full_datagram() {
        let path = write_config(
            "default-block",
            r#"
            [cluster]
            nodes = ["127.0.0.1:7700"]
            local_index = 0

            [params]
            len = 10

            [log]
            "#,
        );
        let settings = Settings::new(path).unwrap();
        assert_eq!(settings.cluster.block_len, MAX_BLOCK_LEN);
    }

    #[test]
    fn rejects_a_non_power_of_two_cluster() {
        let path = write_config("bad-count", &VALID.replace(
            r#"nodes = ["127.0.0.1:7700", "127.0.0.1:7701"]"#,
            r#"nodes = ["127.0.0.1:7700", "127.0.0.1:7701", "127.0.0.1:7702"]"#,
        ));
        assert!(matches!(
            Settings::new(path).unwrap_err(),
            SettingsError::Validation(_)
        ));
    }

    #[test]
    fn rejects_an_out_of_range_local_index() {
        let path = write_config("bad-index", &VALID.replace("local_index = 1", "local_index = 2"));
        assert!(matches!(
            Settings::new(path).unwrap_err(),
            SettingsError::Validation(_)
        ));
    }

    #[test]
    fn rejects_an_oversized_block() {
        let path = write_config("bad-block", &VALID.replace("block_len = 100", "block_len = 368"));
        assert!(matches!(
            Settings::new(path).unwrap_err(),
            SettingsError::Validation(_)
        ));
    }

    #[test]
    fn rejects_an_empty_parameter_vector() {
        let path = write_config("bad-len", &VALID.replace("len = 1000", "len = 0"));
        assert!(matches!(
            Settings::new(path).unwrap_err(),
            SettingsError::Validation(_)
        ));
    }
}
