//! Persisted settings file.
//!
//! The file is TOML by default; a `.json` extension selects JSON. Keys accept
//! both `snake_case` and the capitalised spelling used by older deployments
//! (`Module`, `ProcessID`, ...).

use crate::{ConfigError, ConfigResult, DEFAULT_PROCESS_ID};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Complete settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// RPC behaviour
    #[serde(alias = "Rpc", alias = "RPC")]
    pub rpc: RpcSettings,
    /// Client-facing network knobs
    #[serde(alias = "Network")]
    pub network: NetworkSettings,
    /// Logger settings, passed through untouched to the logging backend
    #[serde(alias = "Log")]
    pub log: Map<String, Value>,
    /// Module instances keyed by module type
    #[serde(alias = "Module")]
    pub module: BTreeMap<String, Vec<ModuleSettings>>,
    /// Free-form application settings
    #[serde(alias = "Settings")]
    pub settings: Map<String, Value>,
}

/// RPC settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Maximum concurrent handlers per module
    #[serde(alias = "MaxCoroutine")]
    pub max_coroutine: usize,
    /// Call expiry in seconds
    #[serde(alias = "RpcExpired")]
    pub rpc_expired: u64,
    /// Log each RPC
    #[serde(alias = "Log")]
    pub log: bool,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            max_coroutine: 100,
            rpc_expired: 5,
            log: true,
        }
    }
}

/// Network settings for client-facing listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Listen port
    #[serde(alias = "Host")]
    pub host: String,
    /// Outbound packet queue depth, must be > 1
    #[serde(alias = "WirteLoopChanNum")]
    pub write_loop_chan_num: usize,
    /// Inbound packet queue depth
    #[serde(alias = "ReadPackLoop")]
    pub read_pack_loop: usize,
    /// Read timeout in seconds (0 = none)
    #[serde(alias = "ReadTimeout")]
    pub read_timeout: u64,
    /// Write timeout in seconds (0 = none)
    #[serde(alias = "WriteTimeout")]
    pub write_timeout: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            host: "8080".to_string(),
            write_loop_chan_num: 2,
            read_pack_loop: 0,
            read_timeout: 0,
            write_timeout: 0,
        }
    }
}

/// One configured instance of a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    /// Instance id, unique within the module type
    #[serde(alias = "Id", alias = "ID")]
    pub id: String,
    /// Optional listen host for the instance
    #[serde(alias = "Host")]
    pub host: Option<String>,
    /// Process group the instance runs in
    #[serde(alias = "ProcessID")]
    pub process_id: String,
    /// Instance-specific settings
    #[serde(alias = "Settings")]
    pub settings: Map<String, Value>,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            id: String::new(),
            host: None,
            process_id: DEFAULT_PROCESS_ID.to_string(),
            settings: Map::new(),
        }
    }
}

impl ModuleSettings {
    /// Settings for a module that is not driven by the settings file
    pub fn for_module(id: impl Into<String>, process_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            process_id: process_id.into(),
            ..Self::default()
        }
    }

    /// Reads a string entry from the instance settings
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }
}

impl Settings {
    /// Loads settings from a file, choosing the format from its extension
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let settings = if is_json {
            debug!(path = %path.display(), "parsing JSON settings");
            serde_json::from_str::<Settings>(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            debug!(path = %path.display(), "parsing TOML settings");
            toml::from_str::<Settings>(&content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        };

        settings.validate()?;
        info!(
            path = %path.display(),
            module_types = settings.module.len(),
            "settings loaded"
        );
        Ok(settings)
    }

    /// Saves settings as TOML
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("cannot serialize settings: {e}")))?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validates settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.network.write_loop_chan_num < 2 {
            return Err(ConfigError::Invalid(
                "network.write_loop_chan_num must be greater than 1".to_string(),
            ));
        }

        for (module_type, instances) in &self.module {
            let mut seen = std::collections::HashSet::new();
            for instance in instances {
                if instance.id.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "module {module_type} has an instance without id"
                    )));
                }
                if !seen.insert(instance.id.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "module {module_type} declares instance {} twice",
                        instance.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Module instances of `module_type` assigned to `process_id`
    pub fn module_instances<'a>(
        &'a self,
        module_type: &str,
        process_id: &'a str,
    ) -> impl Iterator<Item = &'a ModuleSettings> + 'a {
        self.module
            .get(module_type)
            .into_iter()
            .flatten()
            .filter(move |instance| instance.process_id == process_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.rpc.max_coroutine, 100);
        assert_eq!(settings.rpc.rpc_expired, 5);
        assert!(settings.rpc.log);
        assert_eq!(settings.network.host, "8080");
        assert_eq!(settings.network.write_loop_chan_num, 2);
    }

    #[test]
    fn test_module_instances_filters_by_process() {
        let mut settings = Settings::default();
        settings.module.insert(
            "Gate".to_string(),
            vec![
                ModuleSettings::for_module("gate-1", "development"),
                ModuleSettings::for_module("gate-2", "edge"),
            ],
        );

        let ids: Vec<&str> = settings
            .module_instances("Gate", "development")
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["gate-1"]);
        assert_eq!(settings.module_instances("Missing", "development").count(), 0);
    }

    #[test]
    fn test_duplicate_instance_rejected() {
        let mut settings = Settings::default();
        settings.module.insert(
            "Chat".to_string(),
            vec![
                ModuleSettings::for_module("chat-1", "development"),
                ModuleSettings::for_module("chat-1", "development"),
            ],
        );
        let err = settings.validate().expect_err("duplicate ids should fail");
        assert!(err.to_string().contains("twice"));
    }
}
