// src/config.rs

use serde::Deserialize;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::{Error, Result};

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "crmscraper.yaml";

/// Run configuration. Every key is optional in the YAML file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Three-line secrets file: username, password, security token.
    pub credentials_path: PathBuf,
    /// Directory the exported files land in.
    pub output_dir: PathBuf,
    /// Inserted between the run date and the table suffix; empty to omit.
    pub file_prefix: String,
    pub login_url: String,
    pub api_version: String,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials-salesforce.txt"),
            output_dir: PathBuf::from("data/raw"),
            file_prefix: "salesforce".to_string(),
            login_url: "https://login.salesforce.com".to_string(),
            api_version: "59.0".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl Config {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        if cfg.api_version.trim().is_empty() {
            return Err(Error::Config("api_version must not be empty".into()));
        }
        Ok(cfg)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!(path = %path.display(), "loading config");
            Self::from_path(path)
        } else {
            debug!(path = %path.display(), "no config file; using defaults");
            Ok(Self::default())
        }
    }
}

/// Username, password and API security token, in that order.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub security_token: String,
}

// Keep secrets out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("security_token", &"***")
            .finish()
    }
}

impl Credentials {
    /// Read the secrets file. Anything unreadable or incomplete surfaces as
    /// `SourceUnavailable`, the same as a rejected login.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::unavailable(&format!("reading {}", path.display()), e))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));
        let mut next = |what: &str| -> Result<String> {
            match lines.next() {
                Some(l) if !l.is_empty() => Ok(l.to_string()),
                _ => Err(Error::SourceUnavailable(format!(
                    "credentials file is missing the {}",
                    what
                ))),
            }
        };
        Ok(Self {
            username: next("username")?,
            password: next("password")?,
            security_token: next("security token")?,
        })
    }
}
