pub mod events;
pub mod version;

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};

    fn default_true() -> bool {
        true
    }

    #[derive(Debug, thiserror::Error)]
    pub enum SettingsError {
        #[error("Could not read settings file {path}: {source}")]
        Read {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("Settings file {path} is not valid JSON: {source}")]
        Parse {
            path: PathBuf,
            source: serde_json::Error,
        },
        #[error("Could not write settings file {path}: {source}")]
        Write {
            path: PathBuf,
            source: std::io::Error,
        },
    }

    /// Inference service connection
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct OllamaSettings {
        pub base_url: String, // e.g., "http://localhost:11434"
        pub model: String,    // e.g., "llama2" (also matches "llama2:latest")
        /// Ask the service to stream fragments instead of one final object
        pub stream: bool,
        /// Applies to generation requests only
        pub request_timeout_secs: u64,
    }

    impl Default for OllamaSettings {
        fn default() -> Self {
            Self {
                base_url: "http://localhost:11434".into(),
                model: "llama2".into(),
                stream: false,
                request_timeout_secs: 60,
            }
        }
    }

    /// Where "Check for updates" looks
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct UpdateSettings {
        pub repo_url: String,
        pub local_repo_path: PathBuf,
    }

    impl Default for UpdateSettings {
        fn default() -> Self {
            Self {
                repo_url: "https://github.com/onlyzerosonce/SigmaOne".into(),
                local_repo_path: PathBuf::from("./app_repo"),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct WindowSettings {
        /// Hide to the system tray on close/minimize (tray builds only)
        #[serde(default = "default_true")]
        pub minimize_to_tray: bool,
    }

    impl Default for WindowSettings {
        fn default() -> Self {
            Self {
                minimize_to_tray: true,
            }
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(default)]
    pub struct AppSettings {
        pub ollama: OllamaSettings,
        pub updates: UpdateSettings,
        pub window: WindowSettings,
    }

    impl AppSettings {
        /// Load settings from `path`.
        ///
        /// Returns `Ok(None)` when the file does not exist yet (first run).
        pub fn load(path: &Path) -> Result<Option<Self>, SettingsError> {
            if !path.exists() {
                return Ok(None);
            }
            let bytes = std::fs::read(path).map_err(|source| SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let settings =
                serde_json::from_slice(&bytes).map_err(|source| SettingsError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            Ok(Some(settings))
        }

        pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            // Serializing plain structs of strings/bools cannot fail
            let bytes = serde_json::to_vec_pretty(self).unwrap_or_default();
            std::fs::write(path, bytes).map_err(|source| SettingsError::Write {
                path: path.to_path_buf(),
                source,
            })
        }

        /// Apply environment overrides on top of the persisted values.
        pub fn apply_env_overrides(&mut self) {
            self.apply_overrides(|key| std::env::var(key).ok());
        }

        fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
            if let Some(base) = lookup("OLLAMA_BASE_URL").filter(|v| !v.trim().is_empty()) {
                self.ollama.base_url = base.trim().trim_end_matches('/').to_string();
            }
            if let Some(url) = lookup("GPA_REPO_URL").filter(|v| !v.trim().is_empty()) {
                self.updates.repo_url = url.trim().to_string();
            }
            if let Some(path) = lookup("GPA_REPO_PATH").filter(|v| !v.trim().is_empty()) {
                self.updates.local_repo_path = PathBuf::from(path.trim());
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::collections::HashMap;
        use tempfile::TempDir;

        #[test]
        fn test_default_settings() {
            let s = AppSettings::default();
            assert_eq!(s.ollama.base_url, "http://localhost:11434");
            assert_eq!(s.ollama.model, "llama2");
            assert!(!s.ollama.stream);
            assert_eq!(s.ollama.request_timeout_secs, 60);
            assert_eq!(s.updates.local_repo_path, PathBuf::from("./app_repo"));
            assert!(s.window.minimize_to_tray);
        }

        #[test]
        fn test_missing_file_is_first_run() {
            let dir = TempDir::new().unwrap();
            let loaded = AppSettings::load(&dir.path().join("settings.json")).unwrap();
            assert!(loaded.is_none());
        }

        #[test]
        fn test_partial_file_fills_defaults() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("settings.json");
            std::fs::write(&path, r#"{"ollama":{"model":"mistral"}}"#).unwrap();

            let s = AppSettings::load(&path).unwrap().unwrap();
            assert_eq!(s.ollama.model, "mistral");
            assert_eq!(s.ollama.base_url, "http://localhost:11434");
            assert_eq!(s.updates.repo_url, UpdateSettings::default().repo_url);
        }

        #[test]
        fn test_malformed_file_is_parse_error() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("settings.json");
            std::fs::write(&path, "{not json").unwrap();
            assert!(matches!(
                AppSettings::load(&path),
                Err(SettingsError::Parse { .. })
            ));
        }

        #[test]
        fn test_save_creates_parent_dirs() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("nested").join("settings.json");
            let mut s = AppSettings::default();
            s.ollama.stream = true;
            s.save(&path).unwrap();

            let loaded = AppSettings::load(&path).unwrap().unwrap();
            assert!(loaded.ollama.stream);
        }

        #[test]
        fn test_env_overrides() {
            let env: HashMap<&str, &str> = [
                ("OLLAMA_BASE_URL", "http://10.0.0.5:11434/"),
                ("GPA_REPO_PATH", "/tmp/checkout"),
                ("GPA_REPO_URL", "  "),
            ]
            .into_iter()
            .collect();
            let mut s = AppSettings::default();
            s.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

            assert_eq!(s.ollama.base_url, "http://10.0.0.5:11434");
            assert_eq!(s.updates.local_repo_path, PathBuf::from("/tmp/checkout"));
            // Blank values are ignored
            assert_eq!(s.updates.repo_url, UpdateSettings::default().repo_url);
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    /// Body of `POST /api/generate`
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GenerateRequest {
        pub model: String,
        pub prompt: String,
        pub stream: bool,
    }
}
