use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::{
    capture::CaptureConfig,
    fingerprint,
    worker::{
        background_sync::BackoffPolicy,
        cache::{DEFAULT_CACHE_NAME, DEFAULT_SEED_PATHS},
        WorkerOptions,
    },
};

/// `FRAMESYNC_DEBUG=1` shortens the connectivity probe and the sync backoff.
pub fn debug_mode() -> bool {
    std::env::var("FRAMESYNC_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationSettings {
    /// Answer given when the recorder first asks for permission.
    pub enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncBackoffSettings {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub max_attempts: u32,
}

impl Default for SyncBackoffSettings {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            initial_ms: policy.initial.as_millis() as u64,
            max_ms: policy.max.as_millis() as u64,
            max_attempts: policy.max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentSettings {
    pub fps: f64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub components_x: u32,
    pub components_y: u32,
    pub punch: f32,
    pub worker_enabled: bool,
    pub cache_name: String,
    pub seed_paths: Vec<String>,
    /// In-memory cache when unset.
    pub cache_db_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub probe_interval_secs: u64,
    pub notifications: NotificationSettings,
    pub sync_backoff: SyncBackoffSettings,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            fps: 1.0,
            canvas_width: 300,
            canvas_height: 150,
            components_x: fingerprint::DEFAULT_COMPONENTS_X,
            components_y: fingerprint::DEFAULT_COMPONENTS_Y,
            punch: fingerprint::DEFAULT_PUNCH,
            worker_enabled: true,
            cache_name: DEFAULT_CACHE_NAME.into(),
            seed_paths: DEFAULT_SEED_PATHS.iter().map(|path| path.to_string()).collect(),
            cache_db_path: None,
            request_timeout_secs: 30,
            probe_interval_secs: 10,
            notifications: NotificationSettings::default(),
            sync_backoff: SyncBackoffSettings::default(),
        }
    }
}

const MIN_FPS: f64 = 0.01;
const MAX_FPS: f64 = 1000.0;

impl AgentSettings {
    pub fn capture_config(&self) -> CaptureConfig {
        let fps = if self.fps.is_finite() && self.fps > 0.0 {
            self.fps.clamp(MIN_FPS, MAX_FPS)
        } else {
            1.0
        };
        CaptureConfig {
            interval: Duration::from_secs_f64(1.0 / fps),
            canvas_width: self.canvas_width.max(1),
            canvas_height: self.canvas_height.max(1),
            components_x: self.components_x.clamp(1, 9),
            components_y: self.components_y.clamp(1, 9),
            punch: self.punch,
        }
    }

    pub fn worker_options(&self, debug: bool) -> WorkerOptions {
        let backoff = if debug {
            BackoffPolicy {
                initial: Duration::from_millis(500),
                max: Duration::from_secs(5),
                max_attempts: self.sync_backoff.max_attempts,
            }
        } else {
            BackoffPolicy {
                initial: Duration::from_millis(self.sync_backoff.initial_ms),
                max: Duration::from_millis(self.sync_backoff.max_ms),
                max_attempts: self.sync_backoff.max_attempts.max(1),
            }
        };

        WorkerOptions {
            cache_name: self.cache_name.clone(),
            seed_paths: self.seed_paths.clone(),
            backoff,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn probe_interval(&self, debug: bool) -> Duration {
        if debug {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(self.probe_interval_secs.max(1))
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    agent: AgentSettings,
}

/// Agent settings backed by an optional JSON file.
pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let data = match &path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings from {}", path.display()))?;
                serde_json::from_str(&contents).unwrap_or_else(|err| {
                    warn!("Ignoring malformed settings in {}: {err}", path.display());
                    UserSettings::default()
                })
            }
            _ => UserSettings::default(),
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn agent(&self) -> AgentSettings {
        self.read().agent.clone()
    }

    pub fn update_agent(&self, settings: AgentSettings) -> Result<()> {
        let mut guard = self.write();
        guard.agent = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
