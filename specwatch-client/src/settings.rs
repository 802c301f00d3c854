// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted user settings.
//!
//! Settings live in a small TOML file under the user's configuration
//! directory. A missing file means defaults; a malformed file is a typed
//! error rather than silently reset.

use crate::errors::SettingsError;
use camino::{Utf8Path, Utf8PathBuf};
use etcetera::BaseStrategy;
use serde::{Deserialize, Serialize};

/// User-facing behavior toggles.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Show tip messages. Turning this off is "hard mode".
    pub show_tips: bool,

    /// Clear previous output when a new run starts (never on the first run
    /// of a session, so the welcome banner survives).
    pub clear_on_test_run: bool,

    /// Skip the welcome banner on startup.
    pub hide_welcome_message: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_tips: true,
            clear_on_test_run: false,
            hide_welcome_message: false,
        }
    }
}

/// Loads, mutates and saves the settings file.
#[derive(Clone, Debug)]
pub struct SettingsManager {
    path: Utf8PathBuf,
    /// The current settings.
    pub settings: Settings,
}

impl SettingsManager {
    /// The default settings file location:
    /// `<config dir>/specwatch/config.toml`.
    pub fn default_path() -> Result<Utf8PathBuf, SettingsError> {
        let strategy = etcetera::choose_base_strategy()?;
        let path = strategy.config_dir().join("specwatch").join("config.toml");
        Ok(Utf8PathBuf::try_from(path)?)
    }

    /// Loads settings from `path`. A missing file yields defaults.
    pub fn load(path: Utf8PathBuf) -> Result<Self, SettingsError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.as_std_path())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|source| SettingsError::Read {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, settings })
    }

    /// Loads settings from the default location.
    pub fn load_default() -> Result<Self, SettingsError> {
        Self::load(Self::default_path()?)
    }

    /// The settings file location.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Writes the current settings to disk.
    pub fn save(&self) -> Result<(), SettingsError> {
        let serialized =
            toml::to_string_pretty(&self.settings).map_err(SettingsError::Serialize)?;
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent).map_err(|source| SettingsError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        fs_err::write(&self.path, serialized).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Restores the defaults and saves them.
    pub fn reset(&mut self) -> Result<(), SettingsError> {
        self.settings = Settings::default();
        self.save()
    }

    /// Sets a setting by its kebab-case key, as typed on the command line.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let parsed: bool = value.parse().map_err(|_| SettingsError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        })?;
        match key {
            "show-tips" => self.settings.show_tips = parsed,
            "clear-on-test-run" => self.settings.clear_on_test_run = parsed,
            "hide-welcome-message" => self.settings.hide_welcome_message = parsed,
            _ => {
                return Err(SettingsError::UnknownKey {
                    key: key.to_owned(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn round_trip_and_defaults() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("specwatch").join("config.toml");

        // missing file yields defaults
        let mut manager = SettingsManager::load(path.clone()).unwrap();
        assert_eq!(manager.settings, Settings::default());
        assert!(manager.settings.show_tips);

        manager.settings.show_tips = false;
        manager.settings.clear_on_test_run = true;
        manager.save().unwrap();

        let reloaded = SettingsManager::load(path.clone()).unwrap();
        assert!(!reloaded.settings.show_tips);
        assert!(reloaded.settings.clear_on_test_run);
        assert!(!reloaded.settings.hide_welcome_message);

        let mut reloaded = reloaded;
        reloaded.reset().unwrap();
        assert_eq!(
            SettingsManager::load(path).unwrap().settings,
            Settings::default(),
        );
    }

    #[test]
    fn malformed_files_error_out() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs_err::write(&path, "show-tips = \"definitely\"").unwrap();

        let error = SettingsManager::load(path).unwrap_err();
        assert!(matches!(error, SettingsError::Read { .. }));
    }

    #[test]
    fn set_accepts_known_keys_only() {
        let dir = Utf8TempDir::new().unwrap();
        let mut manager = SettingsManager::load(dir.path().join("config.toml")).unwrap();

        manager.set("show-tips", "false").unwrap();
        assert!(!manager.settings.show_tips);

        let error = manager.set("show-tips", "maybe").unwrap_err();
        assert!(matches!(error, SettingsError::InvalidValue { .. }));

        let error = manager.set("font-size", "true").unwrap_err();
        assert!(matches!(error, SettingsError::UnknownKey { .. }));
    }
}
