//! Configuration.
//!
//! Values are layered, highest first: command line (or its environment
//! variable), the service's own table in the TOML file, the file's top-level
//! keys, then built-in defaults.
//!
//! ```toml
//! region = "us-west-2"
//!
//! [lightsail]
//! region = "us-east-2"
//!
//! [dynamodb]
//! hash_key = "id"
//! expires_attribute = "expires"
//! batch_size = 25
//! batch_delay_ms = 5000
//! ```
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use snafu::prelude::*;

use crate::{
    aws::{dynamodb, dynamodb::SessionSettings, lightsail, mediaconvert},
    ConfigParseSnafu, ConfigReadSnafu, Result,
};

/// Read from the working directory when no file is named explicitly.
pub const DEFAULT_CONFIG_FILE: &str = "telecall.toml";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceKind {
    MediaConvert,
    Lightsail,
    DynamoDb,
}

impl ServiceKind {
    pub fn default_region(self) -> &'static str {
        match self {
            ServiceKind::MediaConvert => mediaconvert::DEFAULT_REGION,
            ServiceKind::Lightsail => lightsail::DEFAULT_REGION,
            ServiceKind::DynamoDb => dynamodb::DEFAULT_REGION,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSection {
    pub region: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    pub region: Option<String>,
    pub hash_key: Option<String>,
    pub expires_attribute: Option<String>,
    pub batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub region: Option<String>,
    pub mediaconvert: ServiceSection,
    pub lightsail: ServiceSection,
    pub dynamodb: SessionSection,
}

impl Config {
    /// Parses `contents`. `path` is only used in errors.
    pub fn from_toml_str(contents: &str, path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = path.into();
        toml::from_str(contents).context(ConfigParseSnafu { path })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("reading config from {}", path.display());
        let contents = std::fs::read_to_string(path).context(ConfigReadSnafu { path })?;
        Self::from_toml_str(&contents, path)
    }

    /// Loads `path` if given (it must exist), otherwise [`DEFAULT_CONFIG_FILE`]
    /// if present, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Config::default()),
        }
    }

    /// Picks the region for `service`, preferring `flag` when given.
    pub fn region_for(&self, service: ServiceKind, flag: Option<&str>) -> String {
        let section = match service {
            ServiceKind::MediaConvert => self.mediaconvert.region.as_deref(),
            ServiceKind::Lightsail => self.lightsail.region.as_deref(),
            ServiceKind::DynamoDb => self.dynamodb.region.as_deref(),
        };
        flag.or(section)
            .or(self.region.as_deref())
            .unwrap_or(service.default_region())
            .to_owned()
    }

    /// Session table settings, with `batch_delay_ms` overriding the file.
    pub fn session_settings(&self, batch_delay_ms: Option<u64>) -> Result<SessionSettings> {
        let defaults = SessionSettings::default();
        let section = &self.dynamodb;
        SessionSettings {
            hash_key: section.hash_key.clone().unwrap_or(defaults.hash_key),
            expires_attribute: section
                .expires_attribute
                .clone()
                .unwrap_or(defaults.expires_attribute),
            batch_size: section.batch_size.unwrap_or(defaults.batch_size),
            batch_delay: batch_delay_ms
                .or(section.batch_delay_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_delay),
        }
        .validate()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    const FILE: &str = r#"
region = "eu-central-1"

[lightsail]
region = "ap-south-1"

[dynamodb]
hash_key = "session_id"
batch_size = 10
batch_delay_ms = 5000
"#;

    #[test]
    fn region_layers() {
        let config = Config::from_toml_str(FILE, "telecall.toml").unwrap();
        assert_eq!(
            "ca-central-1",
            config.region_for(ServiceKind::Lightsail, Some("ca-central-1"))
        );
        assert_eq!("ap-south-1", config.region_for(ServiceKind::Lightsail, None));
        assert_eq!(
            "eu-central-1",
            config.region_for(ServiceKind::MediaConvert, None)
        );
        assert_eq!(
            "us-west-2",
            Config::default().region_for(ServiceKind::MediaConvert, None)
        );
        assert_eq!(
            "us-east-2",
            Config::default().region_for(ServiceKind::Lightsail, None)
        );
    }

    #[test]
    fn session_settings_layers() {
        let config = Config::from_toml_str(FILE, "telecall.toml").unwrap();
        assert_eq!(
            SessionSettings {
                hash_key: "session_id".into(),
                expires_attribute: "expires".into(),
                batch_size: 10,
                batch_delay: Duration::from_millis(5000),
            },
            config.session_settings(None).unwrap()
        );
        assert_eq!(
            Duration::ZERO,
            config.session_settings(Some(0)).unwrap().batch_delay
        );
        assert_eq!(
            SessionSettings::default(),
            Config::default().session_settings(None).unwrap()
        );
    }

    #[test]
    fn rejects_bad_files() {
        let unknown = Config::from_toml_str("regoin = \"us-east-1\"", "bad.toml");
        assert!(matches!(unknown, Err(crate::Error::ConfigParse { .. })));

        let oversized = Config::from_toml_str("[dynamodb]\nbatch_size = 100", "big.toml")
            .unwrap()
            .session_settings(None);
        assert!(matches!(oversized, Err(crate::Error::ConfigInvalid { .. })));

        let missing = Config::load("definitely/not/here.toml");
        assert!(matches!(missing, Err(crate::Error::ConfigRead { .. })));
    }
}
