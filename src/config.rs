use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "gradebookd.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Per-workspace settings read from `gradebookd.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub db_file_name: String,
    pub max_upsert_entries: usize,
    pub weight_tolerance: f64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_file_name: "gradebook.sqlite3".to_string(),
            max_upsert_entries: 5000,
            weight_tolerance: 0.01,
        }
    }
}

/// Missing file means defaults.
pub fn load_config(workspace: &Path) -> Result<DaemonConfig, ConfigError> {
    let path = workspace.join(CONFIG_FILE_NAME);
    let display = path.to_string_lossy().to_string();
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(DaemonConfig::default()),
        Err(e) => {
            return Err(ConfigError::Io {
                path: display,
                source: e,
            })
        }
    };
    toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: display,
        source: e,
    })
}
