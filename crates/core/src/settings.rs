use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::CompletionStrategy;

pub const DEFAULT_APP_PATH: &str = r"C:\Program Files (x86)\Crestron\VtPro-e\vtpro.exe";
/// Environment override for the application path.
pub const APP_PATH_ENV: &str = "VTPRO_PATH";

/// Millisecond serde adapter for `Duration` fields.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Every wait, settle delay and poll interval used while driving the application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    #[serde(with = "millis")]
    pub window_appear: Duration,
    #[serde(with = "millis")]
    pub window_ready: Duration,
    #[serde(with = "millis")]
    pub ui_settle: Duration,
    #[serde(with = "millis")]
    pub focus_verification: Duration,
    #[serde(with = "millis")]
    pub focus_retry: Duration,
    #[serde(with = "millis")]
    pub window_message: Duration,
    #[serde(with = "millis")]
    pub keystroke: Duration,
    #[serde(with = "millis")]
    pub compile: Duration,
    #[serde(with = "millis")]
    pub dialog_response: Duration,
    #[serde(with = "millis")]
    pub dialog_confirmation: Duration,
    #[serde(with = "millis")]
    pub state_poll: Duration,
    #[serde(with = "millis")]
    pub stability_check: Duration,
    #[serde(with = "millis")]
    pub monitor_poll: Duration,
    #[serde(with = "millis")]
    pub cleanup: Duration,
    #[serde(with = "millis")]
    pub close_wait: Duration,
    #[serde(with = "millis")]
    pub detail_grace: Duration,
    #[serde(with = "millis")]
    pub responsive_probe: Duration,
    #[serde(with = "millis")]
    pub post_load: Duration,
    #[serde(with = "millis")]
    pub load_quiet: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            window_appear: Duration::from_secs(180),
            window_ready: Duration::from_secs(30),
            ui_settle: Duration::from_secs(5),
            focus_verification: Duration::from_secs(1),
            focus_retry: Duration::from_millis(500),
            window_message: Duration::from_millis(500),
            keystroke: Duration::from_millis(50),
            compile: Duration::from_secs(300),
            dialog_response: Duration::from_millis(300),
            dialog_confirmation: Duration::from_secs(2),
            state_poll: Duration::from_millis(100),
            stability_check: Duration::from_millis(500),
            monitor_poll: Duration::from_millis(500),
            cleanup: Duration::from_secs(1),
            close_wait: Duration::from_secs(3),
            detail_grace: Duration::from_secs(2),
            responsive_probe: Duration::from_secs(1),
            post_load: Duration::from_secs(3),
            load_quiet: Duration::from_secs(2),
        }
    }
}

impl Timeouts {
    /// Millisecond-scale delays for the simulated desktop.
    pub fn quick() -> Self {
        Self {
            window_appear: Duration::from_secs(2),
            window_ready: Duration::from_secs(1),
            ui_settle: Duration::ZERO,
            focus_verification: Duration::ZERO,
            focus_retry: Duration::ZERO,
            window_message: Duration::from_millis(1),
            keystroke: Duration::ZERO,
            compile: Duration::from_secs(5),
            dialog_response: Duration::ZERO,
            dialog_confirmation: Duration::from_millis(150),
            state_poll: Duration::from_millis(5),
            stability_check: Duration::from_millis(2),
            monitor_poll: Duration::from_millis(5),
            cleanup: Duration::ZERO,
            close_wait: Duration::from_millis(100),
            detail_grace: Duration::from_millis(100),
            responsive_probe: Duration::from_millis(10),
            post_load: Duration::from_millis(50),
            load_quiet: Duration::from_millis(40),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Overrides the default application install path
    pub app_path: Option<PathBuf>,
    pub completion: CompletionStrategy,
    pub verbose: bool,
    pub timeouts: Timeouts,
}

impl Settings {
    /// Missing or unreadable files fall back to defaults.
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Configured path, then `VTPRO_PATH`, then the default install location.
    pub fn app_path(&self) -> PathBuf {
        if let Some(p) = &self.app_path {
            return p.clone();
        }
        match std::env::var(APP_PATH_ENV) {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => PathBuf::from(DEFAULT_APP_PATH),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let s: Settings = serde_json::from_str(
            r#"{ "completion": "main_window_log", "timeouts": { "compile": 1500 } }"#,
        )
        .unwrap();
        assert_eq!(s.completion, CompletionStrategy::MainWindowLog);
        assert_eq!(s.timeouts.compile, Duration::from_millis(1500));
        assert_eq!(s.timeouts.window_ready, Duration::from_secs(30));
        assert!(s.app_path.is_none());
    }

    #[test]
    fn configured_app_path_wins() {
        let s = Settings { app_path: Some(PathBuf::from("D:/Tools/vtpro.exe")), ..Default::default() };
        assert_eq!(s.app_path(), PathBuf::from("D:/Tools/vtpro.exe"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let s = Settings::load(Path::new("/nonexistent/vtpc.json"));
        assert_eq!(s.timeouts, Timeouts::default());
        assert!(!s.verbose);
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("vtpc-settings-{}.json", std::process::id()));
        let mut s = Settings::default();
        s.verbose = true;
        s.timeouts = Timeouts::quick();
        s.save(&path).unwrap();
        let loaded = Settings::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(loaded.verbose);
        assert_eq!(loaded.timeouts, Timeouts::quick());
    }
}
