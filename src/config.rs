use crate::error::{Error, Result};

use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root of the APT configuration, holding `sources.list` and `sources.list.d`
    pub apt_dir: PathBuf,
    /// Where imported repository keys are stored
    pub trusted_keys_dir: PathBuf,
    /// Native architecture. Asked from dpkg when unset
    pub arch: Option<String>,
    /// Seconds a package tool may run before it is terminated
    pub timeout: Option<u64>,
    /// Elevate with `sudo -n` when not running as root
    pub sudo: bool,
    /// Keyserver lookup URL, `{}` is replaced by the key id
    pub keyserver: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            apt_dir: PathBuf::from("/etc/apt"),
            trusted_keys_dir: PathBuf::from("/etc/apt/trusted.gpg.d"),
            arch: None,
            timeout: None,
            sudo: true,
            keyserver: "https://keyserver.ubuntu.com/pks/lookup?op=get&options=mr&exact=on&search=0x{}"
                .to_owned(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&data).map_err(|e| match e {
            Error::Config { reason, .. } => Error::Config {
                path: path.to_owned(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        let config: Config = toml::from_str(data).map_err(|e| Error::Config {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        if !config.keyserver.contains("{}") {
            return Err(Error::Config {
                path: PathBuf::new(),
                reason: "keyserver must contain a {} placeholder for the key id".to_owned(),
            });
        }
        Ok(config)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    pub fn keyserver_url(&self, key_id: &str) -> String {
        self.keyserver.replacen("{}", key_id, 1)
    }

    pub fn sources_list(&self) -> PathBuf {
        self.apt_dir.join("sources.list")
    }

    pub fn sources_list_d(&self) -> PathBuf {
        self.apt_dir.join("sources.list.d")
    }
}
