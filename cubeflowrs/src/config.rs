//! Configuration for the engine.
//!
//! TOML-based, with defaults suitable for interactive use. Covers the
//! member cache and the URI prefix table used by the codec.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::uri::DEFAULT_PREFIXES;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub member_cache: MemberCacheConfig,
    /// Namespace prefixes for URI/name compression (prefix -> namespace).
    /// Prefixes must not collide with URI schemes.
    pub prefixes: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            member_cache: MemberCacheConfig::default(),
            prefixes: DEFAULT_PREFIXES.clone(),
        }
    }
}

/// Member cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemberCacheConfig {
    /// Cache TTL in seconds (default: 3600).
    pub ttl_secs: u64,
    /// Maximum cached members (default: 10000).
    pub max_size: usize,
}

impl Default for MemberCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_size: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config = EngineConfig::from_toml_str("[member_cache]\nttl_secs = 60\n").unwrap();
        assert_eq!(config.member_cache.ttl_secs, 60);
        assert_eq!(config.member_cache.max_size, 10_000);
        assert!(config.prefixes.contains_key("qb"));
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.member_cache.ttl_secs, 3600);
    }
}
