use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::LastSelection;
use crate::error::Result;
use crate::store::StoredProperty;

pub const CONFIG_DIR_NAME: &str = "linux-wallpaperengine-gui";
pub const CONFIG_FILE_NAME: &str = "wpe_gui_config.json";

/// The persisted configuration document. Loaded and saved wholesale; keys
/// this engine does not own are carried through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GuiConfig {
    #[serde(default)]
    pub properties_by_wallpaper: BTreeMap<String, BTreeMap<String, StoredProperty>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_wallpaper: Option<LastSelection>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// Wholesale load/save of [`GuiConfig`] at a fixed path. Load failures
/// degrade to defaults; save failures are the caller's to log, the process
/// keeps running on in-memory state.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    pub data: GuiConfig,
}

impl ConfigStore {
    /// `$XDG_CONFIG_HOME/linux-wallpaperengine-gui/wpe_gui_config.json`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    pub fn load_default() -> Self {
        Self::open(Self::default_path())
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(data) => data,
                Err(err) => {
                    warn!(path = %path.display(), %err, "unreadable config, starting fresh");
                    GuiConfig::default()
                }
            },
            Err(err) => {
                info!(path = %path.display(), %err, "no config loaded, starting fresh");
                GuiConfig::default()
            }
        };
        Self { path, data }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.data)
            .map_err(|err| crate::error::EngineError::Config(err.to_string()))?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}
