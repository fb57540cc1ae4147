use crate::anyhow_loc;
use crate::logging::LogConfig;
use crate::path_util::CaseSensitivity;
use crate::producer_guard::StripedProducerGuard;
use crate::snapshotter::{DefaultExcludes, HashMode};
use anyhow::Result;
use camino::Utf8Path;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", deny_unknown_fields)]
pub enum ProducerGuardConfig {
    /// Fixed pool of locks shared by all keys.
    Striped {
        #[serde(default = "StripedProducerGuard::default_stripes")]
        stripes: usize,
    },
    /// One lock per key in flight.
    Adaptive,
}

impl Default for ProducerGuardConfig {
    fn default() -> Self {
        ProducerGuardConfig::Striped {
            stripes: StripedProducerGuard::default_stripes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VfsConfig {
    #[serde(default = "CaseSensitivity::platform_default")]
    pub case_sensitivity: CaseSensitivity,

    #[serde(default)]
    pub producer_guard: ProducerGuardConfig,

    #[serde(default = "default_hash_mode")]
    pub hash_mode: HashMode,

    /// File and directory names the snapshotter skips. `*` matches any run of
    /// characters.
    #[serde(default = "default_excludes")]
    pub default_excludes: Vec<String>,

    #[serde(default)]
    pub logging: LogConfig,
}

fn default_hash_mode() -> HashMode {
    HashMode::Full
}

fn default_excludes() -> Vec<String> {
    DefaultExcludes::DEFAULT_PATTERNS.iter().map(|s| s.to_string()).collect()
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            case_sensitivity: CaseSensitivity::platform_default(),
            producer_guard: ProducerGuardConfig::default(),
            hash_mode: default_hash_mode(),
            default_excludes: default_excludes(),
            logging: LogConfig::default(),
        }
    }
}

impl VfsConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow_loc!("Invalid VFS config: {}", e))
    }

    pub fn load(path: &Utf8Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow_loc!("Failed to read config file [{}]: {}", path, e))?;
        Self::from_json_str(&json).map_err(|e| e.context(format!("while loading [{}]", path)))
    }
}
