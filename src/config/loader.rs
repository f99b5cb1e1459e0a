//! Loads [`Settings`] from layered TOML files and `BEACON_*` environment variables.

use std::path::{Path, PathBuf};

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};

use crate::config::environment::Environment as AppEnvironment;
use crate::config::error::ConfigError;
use crate::config::settings::Settings;

const CONFIG_DIR_ENV: &str = "BEACON_CONFIG_DIR";

const CONFIG_FILE_ENV: &str = "BEACON_CONFIG_FILE";

const DEFAULT_CONFIG_DIR: &str = "config";

const ENV_PREFIX: &str = "BEACON";

const ENV_SEPARATOR: &str = "__";

/// Resolves where configuration comes from and loads it.
///
/// `default.toml` is required in layered mode; the environment overlay and
/// `local.toml` are optional. Environment variables always win, so
/// `BEACON_DISPATCHER__MAX_CONCURRENT_JOBS=8` overrides `dispatcher.max_concurrent_jobs`.
#[derive(Debug)]
pub struct ConfigLoader {
    config_dir: PathBuf,
    config_file: Option<PathBuf>,
    environment: AppEnvironment,
}

impl ConfigLoader {
    /// Build a loader from `BEACON_CONFIG_DIR`, `BEACON_CONFIG_FILE` and `BEACON_APP_ENV`.
    ///
    /// # Errors
    ///
    /// Fails when both the directory and the single-file variables are set.
    pub fn new() -> Result<Self, ConfigError> {
        let dir_var = std::env::var(CONFIG_DIR_ENV).ok();
        let config_file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);

        if dir_var.is_some() && config_file.is_some() {
            return Err(ConfigError::MutualExclusivityError(format!(
                "{} and {} cannot both be set",
                CONFIG_DIR_ENV, CONFIG_FILE_ENV
            )));
        }

        Ok(Self {
            config_dir: dir_var
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
            config_file,
            environment: AppEnvironment::from_env(),
        })
    }

    /// Loader reading a single file, bypassing the layered directory lookup.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            config_file: Some(path.into()),
            environment: AppEnvironment::from_env(),
        }
    }

    /// Select the overlay explicitly instead of reading `BEACON_APP_ENV`.
    pub fn with_environment(mut self, environment: AppEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn environment(&self) -> AppEnvironment {
        self.environment
    }

    /// Load, deserialize and validate the settings.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let settings: Settings = self.build_config()?.try_deserialize().map_err(|e| {
            ConfigError::ParseError(format!("Failed to deserialize configuration: {}", e))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    fn build_config(&self) -> Result<Config, ConfigError> {
        let builder = match self.config_file {
            Some(ref file) => Self::add_file_source(Config::builder(), file, true)?,
            None => self.build_layered_config(Config::builder())?,
        };

        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(ENV_SEPARATOR)
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()
            .map_err(ConfigError::from)
    }

    fn build_layered_config(
        &self,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let builder = Self::add_file_source(builder, &self.config_dir.join("default.toml"), true)?;
        let overlay = self
            .config_dir
            .join(format!("{}.toml", self.environment.as_str()));
        let builder = Self::add_file_source(builder, &overlay, false)?;
        Self::add_file_source(builder, &self.config_dir.join("local.toml"), false)
    }

    fn add_file_source(
        builder: ConfigBuilder<DefaultState>,
        path: &Path,
        required: bool,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        if required && !path.exists() {
            return Err(ConfigError::file_not_found(format!(
                "Required configuration file not found: {}",
                path.display()
            )));
        }

        Ok(builder.add_source(
            File::new(&path.to_string_lossy(), FileFormat::Toml).required(required),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Tests touching process environment run one at a time.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn config_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().expect("temp dir");
        for (name, content) in files {
            fs::write(dir.path().join(name), content).expect("write config file");
        }
        dir
    }

    /// Restores touched environment variables on drop.
    struct EnvGuard(Vec<(String, Option<String>)>);

    impl EnvGuard {
        fn new() -> Self {
            let mut guard = Self(Vec::new());
            for key in [CONFIG_DIR_ENV, CONFIG_FILE_ENV, AppEnvironment::ENV_VAR] {
                guard.remove(key);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            self.0.push((key.to_string(), std::env::var(key).ok()));
            unsafe { std::env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            self.0.push((key.to_string(), std::env::var(key).ok()));
            unsafe { std::env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.0.iter().rev() {
                unsafe {
                    match value {
                        Some(v) => std::env::set_var(key, v),
                        None => std::env::remove_var(key),
                    }
                }
            }
        }
    }

    const DEFAULT_TOML: &str = r#"
[database]
url = "postgres://localhost/beacon"

[dispatcher]
max_concurrent_jobs = 5
poll_interval_secs = 30

[batch_queue]
concurrency = 3
"#;

    #[test]
    fn test_defaults_without_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvGuard::new();

        let loader = ConfigLoader::new().unwrap();
        assert_eq!(loader.config_dir, PathBuf::from("config"));
        assert!(loader.config_file.is_none());
        assert_eq!(loader.environment(), AppEnvironment::Development);
    }

    #[test]
    fn test_dir_and_file_are_mutually_exclusive() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut env = EnvGuard::new();
        env.set(CONFIG_DIR_ENV, "/etc/beacon");
        env.set(CONFIG_FILE_ENV, "/etc/beacon/beacon.toml");

        let err = ConfigLoader::new().unwrap_err();
        assert!(matches!(err, ConfigError::MutualExclusivityError(msg) if msg.contains("BEACON_CONFIG_DIR")));
    }

    #[test]
    fn test_missing_default_toml() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut env = EnvGuard::new();
        let dir = config_dir(&[]);
        env.set(CONFIG_DIR_ENV, dir.path().to_str().unwrap());

        let err = ConfigLoader::new().unwrap().load().unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(msg) if msg.contains("default.toml")));
    }

    #[test]
    fn test_layered_precedence() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut env = EnvGuard::new();
        let dir = config_dir(&[
            ("default.toml", DEFAULT_TOML),
            ("production.toml", "[dispatcher]\nmax_concurrent_jobs = 10\n"),
            ("local.toml", "[batch_queue]\nconcurrency = 6\n"),
        ]);
        env.set(CONFIG_DIR_ENV, dir.path().to_str().unwrap());
        env.set(AppEnvironment::ENV_VAR, "production");
        env.set("BEACON_DISPATCHER__POLL_INTERVAL_SECS", "10");

        let settings = ConfigLoader::new().unwrap().load().unwrap();
        assert_eq!(settings.dispatcher.max_concurrent_jobs, 10);
        assert_eq!(settings.dispatcher.poll_interval_secs, 10);
        assert_eq!(settings.batch_queue.concurrency, 6);
        assert_eq!(settings.database.url, "postgres://localhost/beacon");
    }

    #[test]
    fn test_single_file_mode() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvGuard::new();
        let dir = config_dir(&[("beacon.toml", "[scheduler]\ncron = \"0 0 * * * *\"\n")]);

        let settings = ConfigLoader::from_file(dir.path().join("beacon.toml"))
            .load()
            .unwrap();
        assert_eq!(settings.scheduler.cron, "0 0 * * * *");
        assert_eq!(settings.dispatcher.max_concurrent_jobs, 5);
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvGuard::new();
        let dir = config_dir(&[("beacon.toml", "[batch_queue]\nconcurrency = 0\n")]);

        let err = ConfigLoader::from_file(dir.path().join("beacon.toml"))
            .load()
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { field, .. } if field == "batch_queue.concurrency")
        );
    }
}
