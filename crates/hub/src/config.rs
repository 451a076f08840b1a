//! Hub endpoints and the platform details sent with every request.

use parcel_model::ApiVersion;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registration_url: String,
    pub content_types_url: String,
    /// Seconds after which the cached catalog is considered outdated.
    pub refresh_interval: u64,
    /// Seconds before a hub request is abandoned.
    pub timeout: u64,
    pub platform_name: String,
    pub platform_version: String,
    /// Version of the package format implementation reported to the hub.
    pub core_version: String,
    pub core_api: ApiVersion,
    /// Include author counts and library usage in catalog requests.
    pub send_usage_statistics: bool,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            registration_url: "https://api.h5p.org/v1/sites".to_string(),
            content_types_url: "https://api.h5p.org/v1/content-types/".to_string(),
            refresh_interval: 24 * 60 * 60,
            timeout: 30,
            platform_name: "parcel".to_string(),
            platform_version: env!("CARGO_PKG_VERSION").to_string(),
            core_version: "1.24".to_string(),
            core_api: ApiVersion::new(1, 24),
            send_usage_statistics: false,
        }
    }
}
impl Config {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Stable identifier of this installation, derived from the platform name.
    pub fn local_id(&self) -> String {
        crc32fast::hash(self.platform_name.as_bytes()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_id_is_stable() {
        let config = Config::default();
        assert_eq!(config.local_id(), config.clone().local_id());
        let other = Config { platform_name: "other".to_string(), ..Config::default() };
        assert_ne!(config.local_id(), other.local_id());
        assert!(config.local_id().chars().all(|c| c.is_ascii_digit()));
    }
}
