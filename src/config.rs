use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DbsError;
use crate::models::EngineConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub db_path: PathBuf,
    pub batch_size: u32,
    pub nprobes: u32,
    pub log_level: String,
    pub log_serialize: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./lancedb_dbs_vector"),
            batch_size: 64,
            nprobes: 20,
            log_level: "info".to_string(),
            log_serialize: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub system: SystemConfig,
    pub engines: HashMap<String, EngineConfig>,
}

impl Settings {
    pub fn engine(&self, tag: &str) -> Result<&EngineConfig, DbsError> {
        self.engines
            .get(tag)
            .ok_or_else(|| DbsError::UnknownEngine(tag.to_string()))
    }
}

/// Resolve the config file path per the documented precedence:
/// explicit `--config-file`, then `DBS_CONFIG_FILE`, then `config.yaml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(p) = std::env::var("DBS_CONFIG_FILE") {
        return PathBuf::from(p);
    }
    PathBuf::from("config.yaml")
}

/// Load settings from YAML, falling back to defaults if the file is
/// absent, then apply `DBS_`-prefixed environment overrides to scalar
/// `system` fields.
pub fn load_settings(config_path: &Path) -> Result<Settings, DbsError> {
    let mut settings = match std::fs::read_to_string(config_path) {
        Ok(text) => serde_yaml::from_str::<Settings>(&text)
            .map_err(|e| DbsError::Config(format!("{}: {e}", config_path.display())))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
        Err(e) => {
            return Err(DbsError::Config(format!(
                "failed to read {}: {e}",
                config_path.display()
            )))
        }
    };

    apply_env_overrides(&mut settings.system);
    Ok(settings)
}

fn apply_env_overrides(system: &mut SystemConfig) {
    if let Ok(v) = std::env::var("DBS_DB_PATH") {
        system.db_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("DBS_BATCH_SIZE") {
        if let Ok(n) = v.parse() {
            system.batch_size = n;
        }
    }
    if let Ok(v) = std::env::var("DBS_NPROBES") {
        if let Ok(n) = v.parse() {
            system.nprobes = n;
        }
    }
    if let Ok(v) = std::env::var("DBS_LOG_LEVEL") {
        system.log_level = v;
    }
    if let Ok(v) = std::env::var("DBS_LOG_SERIALIZE") {
        system.log_serialize = matches!(v.as_str(), "1" | "true" | "TRUE" | "yes");
    }
}

/// Initialize the global `tracing` subscriber from system config. Safe to
/// call once at process start; a second call is a silent no-op.
pub fn init_logging(system: &SystemConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&system.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if system.log_serialize {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let settings = load_settings(Path::new("/nonexistent/config.yaml")).unwrap();
        assert_eq!(settings.system.batch_size, 64);
        assert_eq!(settings.system.nprobes, 20);
    }

    #[test]
    fn resolves_explicit_path_first() {
        let explicit = PathBuf::from("/tmp/explicit.yaml");
        assert_eq!(resolve_config_path(Some(&explicit)), explicit);
    }
}
