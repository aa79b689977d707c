use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Process-wide configuration, resolved once per environment construction
/// and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    pub runtime: RuntimeConfig,
    pub pools: PoolConfig,
    pub oversubmission: OversubmissionConfig,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            runtime: RuntimeConfig::default(),
            pools: PoolConfig::default(),
            oversubmission: OversubmissionConfig::default(),
        }
    }
}

impl GridConfig {
    pub fn load(path: &Path) -> crate::Result<GridConfig> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Location and memory budget of the execution runtime that is shipped to the
/// target resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub location: PathBuf,
    pub memory_mb: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            location: PathBuf::from("runtime.tar.gz"),
            memory_mb: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Maximum number of live services kept per pool; the least-recently-used
    /// service is evicted when a new one would exceed it.
    pub eviction_threshold: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            eviction_threshold: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OversubmissionConfig {
    /// Target fraction of queued jobs that may receive a backup submission.
    pub ratio_waiting: f64,
    /// Target fraction of executing jobs that may receive a backup submission.
    pub ratio_running: f64,
    pub epsilon: f64,
    #[serde(with = "duration_format", rename = "check-interval")]
    pub check_interval: Duration,
}

impl Default for OversubmissionConfig {
    fn default() -> Self {
        OversubmissionConfig {
            ratio_waiting: 0.5,
            ratio_running: 0.05,
            epsilon: 0.01,
            check_interval: Duration::from_secs(60),
        }
    }
}

mod duration_format {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?;
        humantime::parse_duration(&value).map_err(serde::de::Error::custom)
    }
}
