//! Layered configuration.
//!
//! Values come from, in increasing priority: built-in defaults, a TOML, YAML
//! or JSON file, and `PARCEL_`-prefixed environment variables where `__`
//! separates nested keys (`PARCEL_HUB__TIMEOUT=5`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "PARCEL_";
const CONFIG_FILE: &str = "config.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "parcel")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Absolute directory holding libraries, content and settings.
    pub root: PathBuf,
}
impl Default for StorageConfig {
    fn default() -> Self {
        let root = project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("/var/lib/parcel"));
        Self { root }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// SQLite database for cached library data and hub settings; cached
    /// entries only live in memory when unset.
    pub database: Option<PathBuf>,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, database: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub validation: parcel_validate::Config,
    pub hub: parcel_hub::Config,
    pub log: LogConfig,
}
impl Config {
    /// The config file used when none is given explicitly.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Merge every source without extracting; `path` replaces the default
    /// config file location.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) if !path.exists() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => figment = merge_file(figment, path)?,
            None => {
                if let Some(path) = Self::default_path().filter(|path| path.exists()) {
                    tracing::debug!(path = %path.display(), "using default config file");
                    figment = merge_file(figment, &path)?;
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(path)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later, deep inside an operation.
    pub fn validate(&self) -> Result<()> {
        if !self.storage.root.is_absolute() {
            exn::bail!(ErrorKind::invalid("storage.root", "must be an absolute path"));
        }
        let validation = &self.validation;
        if validation.package_extension.is_empty() {
            exn::bail!(ErrorKind::invalid("validation.package_extension", "must not be empty"));
        }
        if validation.max_file_size == 0 {
            exn::bail!(ErrorKind::invalid("validation.max_file_size", "must be greater than zero"));
        }
        if validation.max_total_size < validation.max_file_size {
            exn::bail!(ErrorKind::invalid("validation.max_total_size", "must be at least max_file_size"));
        }
        if validation.content_whitelist.is_empty() {
            exn::bail!(ErrorKind::invalid("validation.content_whitelist", "must not be empty"));
        }
        for (field, url) in
            [("hub.registration_url", &self.hub.registration_url), ("hub.content_types_url", &self.hub.content_types_url)]
        {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                exn::bail!(ErrorKind::invalid(field, format!("`{url}` is not an http(s) URL")));
            }
        }
        if self.hub.timeout == 0 {
            exn::bail!(ErrorKind::invalid("hub.timeout", "must be greater than zero"));
        }
        if self.log.level.trim().is_empty() {
            exn::bail!(ErrorKind::invalid("log.level", "must not be empty"));
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "parcel.toml",
                r#"
                    [storage]
                    root = "/srv/parcel"

                    [validation]
                    max_file_size = 1024
                    max_total_size = 4096

                    [hub]
                    timeout = 10
                "#,
            )?;
            jail.set_env("PARCEL_HUB__TIMEOUT", "5");
            jail.set_env("PARCEL_CACHE__ENABLED", "false");
            let config = Config::load(Some(Path::new("parcel.toml"))).unwrap();
            assert_eq!(config.storage.root, PathBuf::from("/srv/parcel"));
            assert_eq!(config.validation.max_file_size, 1024);
            assert_eq!(config.validation.package_extension, "h5p");
            assert_eq!(config.hub.timeout, 5);
            assert!(!config.cache.enabled);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_unsupported_format() {
        Jail::expect_with(|jail| {
            jail.create_file("parcel.ini", "")?;
            let err = Config::load(Some(Path::new("parcel.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[rstest]
    #[case::relative_root("PARCEL_STORAGE__ROOT", "data", "storage.root")]
    #[case::zero_file_size("PARCEL_VALIDATION__MAX_FILE_SIZE", "0", "validation.max_file_size")]
    #[case::total_below_file_size("PARCEL_VALIDATION__MAX_TOTAL_SIZE", "10", "validation.max_total_size")]
    #[case::bad_endpoint("PARCEL_HUB__CONTENT_TYPES_URL", "ftp://hub", "hub.content_types_url")]
    #[case::zero_timeout("PARCEL_HUB__TIMEOUT", "0", "hub.timeout")]
    fn test_rejects(#[case] variable: &str, #[case] value: &str, #[case] expected: &str) {
        Jail::expect_with(|jail| {
            jail.set_env(variable, value);
            let err = Config::load(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid { field, .. } if *field == expected), "{err:?}");
            Ok(())
        });
    }
}
