use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::utils::{read, write};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "settings";

use crate::log_warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerSettings {
    pub show_overlay: bool,
    pub enable_notifications: bool,
    /// Per-prompt energy (Wh) above which a notification is raised.
    pub energy_threshold: f64,
    pub auto_optimize: bool,
    /// Selectors tried ahead of the built-in input patterns.
    pub extra_input_patterns: Vec<String>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            show_overlay: true,
            enable_notifications: true,
            energy_threshold: 5.0,
            auto_optimize: false,
            extra_input_patterns: Vec::new(),
        }
    }
}

/// Fields to overwrite; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub show_overlay: Option<bool>,
    pub enable_notifications: Option<bool>,
    pub energy_threshold: Option<f64>,
    pub auto_optimize: Option<bool>,
    pub extra_input_patterns: Option<Vec<String>>,
}

impl TrackerSettings {
    fn apply(&mut self, patch: SettingsPatch) {
        if let Some(value) = patch.show_overlay {
            self.show_overlay = value;
        }
        if let Some(value) = patch.enable_notifications {
            self.enable_notifications = value;
        }
        if let Some(value) = patch.energy_threshold {
            self.energy_threshold = value;
        }
        if let Some(value) = patch.auto_optimize {
            self.auto_optimize = value;
        }
        if let Some(value) = patch.extra_input_patterns {
            self.extra_input_patterns = value;
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<TrackerSettings>,
}

impl SettingsStore {
    /// Default settings that will be written to `path` on the first update.
    pub fn with_defaults(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(TrackerSettings::default()),
        }
    }

    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("{} is not valid settings JSON ({err}), using defaults", path.display());
                TrackerSettings::default()
            })
        } else {
            TrackerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> TrackerSettings {
        read(&self.data).clone()
    }

    /// Shallow-merge `patch` into the stored settings and persist them.
    pub fn update(&self, patch: SettingsPatch) -> Result<TrackerSettings> {
        let mut guard = write(&self.data);
        let mut next = guard.clone();
        next.apply(patch);
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    fn persist(&self, data: &TrackerSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

}
