mod ord;
mod parse;

pub use ord::compare_fragment;
pub use parse::parse_version;

use crate::error::Error;

use serde::{Deserialize, Serialize, Serializer};
use std::{convert::TryFrom, fmt, str::FromStr};

/// dpkg style package version: `[epoch:]upstream[-revision]`.
///
/// Equality follows the dpkg ordering rather than the surface string, so
/// `1.01` equals `1.1` and `0:2` equals `2`.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "String")]
pub struct PkgVersion {
    epoch: u32,
    upstream: String,
    revision: Option<String>,
}

impl PkgVersion {
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}

impl fmt::Display for PkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}:", self.epoch)?;
        }
        f.write_str(&self.upstream)?;
        if let Some(revision) = &self.revision {
            write!(f, "-{}", revision)?;
        }
        Ok(())
    }
}

impl FromStr for PkgVersion {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_version(s)
    }
}

impl TryFrom<&str> for PkgVersion {
    type Error = Error;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        parse_version(s)
    }
}

impl TryFrom<String> for PkgVersion {
    type Error = Error;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        parse_version(&s)
    }
}

impl Serialize for PkgVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
