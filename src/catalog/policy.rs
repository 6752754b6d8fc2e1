use super::split_arch;
use crate::{
    error::{Error, Result},
    types::PkgVersion,
};

use lazy_static::lazy_static;
use regex::Regex;
use std::str::FromStr;

const TOOL: &str = "apt-cache policy";
/// What apt-cache prints instead of a version
const NONE_MARKER: &str = "(none)";

lazy_static! {
    static ref HEADER: Regex = Regex::new(r"^(\S+):$").unwrap();
    static ref FIELD: Regex = Regex::new(r"^\s+(Installed|Candidate): (.+)$").unwrap();
    static ref VERSION_ROW: Regex = Regex::new(r"^ (\*\*\*| {3}) (\S+) (-?\d+)$").unwrap();
    static ref ORIGIN_ROW: Regex = Regex::new(r"^ {6,}(-?\d+) (.+)$").unwrap();
}

/// Where a version in the version table can be fetched from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    pub priority: i32,
    /// Either an archive line like `http://archive.ubuntu.com/ubuntu jammy/main amd64 Packages`
    /// or `/var/lib/dpkg/status` for the installed copy
    pub location: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionEntry {
    pub version: PkgVersion,
    pub priority: i32,
    pub origins: Vec<Origin>,
    /// Marked with `***`
    pub installed: bool,
}

impl VersionEntry {
    /// Whether any repository offers this version, as opposed to the local dpkg database only.
    pub fn is_downloadable(&self) -> bool {
        self.origins
            .iter()
            .any(|o| !o.location.starts_with("/var/lib/dpkg/status"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyRecord {
    pub name: String,
    pub arch: Option<String>,
    pub installed: Option<PkgVersion>,
    pub candidate: Option<PkgVersion>,
    pub versions: Vec<VersionEntry>,
}

fn parse_field(text: &str, field: &str, value: &str) -> Result<Option<PkgVersion>> {
    if value == NONE_MARKER {
        return Ok(None);
    }
    PkgVersion::from_str(value)
        .map(Some)
        .map_err(|e| Error::malformed_output(TOOL, format!("bad {} version: {}", field, e), text))
}

/// Parse the policy block of a single package.
///
/// Fails with [`Error::MalformedOutput`] when the block lacks the
/// `Installed:` or `Candidate:` lines.
pub fn parse_policy_block(text: &str) -> Result<PolicyRecord> {
    let mut lines = text.lines().skip_while(|l| l.trim().is_empty());
    let header = lines
        .next()
        .and_then(|l| HEADER.captures(l))
        .ok_or_else(|| Error::malformed_output(TOOL, "missing package header", text))?;
    let (name, arch) = split_arch(&header[1]);

    let mut installed = None;
    let mut candidate = None;
    let mut versions: Vec<VersionEntry> = Vec::new();
    for line in lines {
        if let Some(c) = FIELD.captures(line) {
            let value = parse_field(text, &c[1], c[2].trim())?;
            match &c[1] {
                "Installed" => installed = Some(value),
                _ => candidate = Some(value),
            }
        } else if let Some(c) = VERSION_ROW.captures(line) {
            let version = PkgVersion::from_str(&c[2]).map_err(|e| {
                Error::malformed_output(TOOL, format!("bad version in version table: {}", e), text)
            })?;
            versions.push(VersionEntry {
                version,
                priority: c[3].parse().unwrap_or_default(),
                origins: Vec::new(),
                installed: &c[1] == "***",
            });
        } else if let Some(c) = ORIGIN_ROW.captures(line) {
            let entry = versions.last_mut().ok_or_else(|| {
                Error::malformed_output(TOOL, "origin line before any version", text)
            })?;
            entry.origins.push(Origin {
                priority: c[1].parse().unwrap_or_default(),
                location: c[2].trim().to_owned(),
            });
        }
        // Anything else (`Version table:`, pin lines) carries nothing we need
    }

    let installed = installed
        .ok_or_else(|| Error::malformed_output(TOOL, "no Installed: line", text))?;
    let candidate = candidate
        .ok_or_else(|| Error::malformed_output(TOOL, "no Candidate: line", text))?;

    Ok(PolicyRecord {
        name: name.to_owned(),
        arch: arch.map(str::to_owned),
        installed,
        candidate,
        versions,
    })
}

/// Split the output of `apt-cache policy a b c` into blocks and parse each.
///
/// Packages apt does not know produce no block at all, so the result may be
/// shorter than the argument list.
pub fn parse_policy_output(text: &str) -> Result<Vec<PolicyRecord>> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in text.lines() {
        if HEADER.is_match(line) {
            blocks.push(vec![line]);
        } else if let Some(block) = blocks.last_mut() {
            block.push(line);
        } else if !line.trim().is_empty() && !is_notice(line) {
            return Err(Error::malformed_output(
                TOOL,
                "text before the first package header",
                text,
            ));
        }
    }

    blocks
        .into_iter()
        .map(|b| parse_policy_block(&b.join("\n")))
        .collect()
}

fn is_notice(line: &str) -> bool {
    line.starts_with("N: ") || line.starts_with("W: ")
}

#[cfg(test)]
mod test {
    use super::*;

    const NGINX: &str = "nginx:
  Installed: 1.18.0-0ubuntu1
  Candidate: 1.18.0-6ubuntu14
  Version table:
     1.18.0-6ubuntu14 500
        500 http://archive.ubuntu.com/ubuntu jammy-updates/main amd64 Packages
        500 http://security.ubuntu.com/ubuntu jammy-security/main amd64 Packages
 *** 1.18.0-0ubuntu1 100
        100 /var/lib/dpkg/status
";

    fn v(s: &str) -> PkgVersion {
        PkgVersion::from_str(s).unwrap()
    }

    #[test]
    fn policy_block() {
        let record = parse_policy_block(NGINX).unwrap();
        assert_eq!(record.name, "nginx");
        assert_eq!(record.arch, None);
        assert_eq!(record.installed, Some(v("1.18.0-0ubuntu1")));
        assert_eq!(record.candidate, Some(v("1.18.0-6ubuntu14")));
        assert_eq!(record.versions.len(), 2);

        let newest = &record.versions[0];
        assert_eq!(newest.priority, 500);
        assert!(!newest.installed);
        assert_eq!(newest.origins.len(), 2);
        assert!(newest.is_downloadable());

        let local = &record.versions[1];
        assert!(local.installed);
        assert_eq!(
            local.origins,
            vec![Origin {
                priority: 100,
                location: "/var/lib/dpkg/status".to_owned()
            }]
        );
        assert!(!local.is_downloadable());
    }

    #[test]
    fn none_markers() {
        let text = "libfoo:i386:\n  Installed: (none)\n  Candidate: (none)\n  Version table:\n";
        let record = parse_policy_block(text).unwrap();
        assert_eq!(record.name, "libfoo");
        assert_eq!(record.arch.as_deref(), Some("i386"));
        assert_eq!(record.installed, None);
        assert_eq!(record.candidate, None);
        assert!(record.versions.is_empty());
    }

    #[test]
    fn drifted_output() {
        let source = vec![
            "nginx:\n  Candidate: 1.0\n",
            "nginx:\n  Installed: 1.0\n",
            "nginx:\n  Installiert: 1.0\n  Kandidat: 1.0\n",
            "  Installed: 1.0\n  Candidate: 1.0\n",
            "nginx:\n  Installed: 1.0 beta\n  Candidate: 1.0\n",
            "nginx:\n  Installed: 1.0\n  Candidate: 1.0\n        500 http://example.com\n",
        ];
        for text in source {
            assert!(
                matches!(parse_policy_block(text), Err(Error::MalformedOutput { .. })),
                "{}",
                text
            );
        }
    }

    #[test]
    fn concatenated_output() {
        let text = format!(
            "{}zsh:\n  Installed: (none)\n  Candidate: 5.8.1-1\n  Version table:\n     5.8.1-1 500\n        500 http://archive.ubuntu.com/ubuntu jammy/main amd64 Packages\n",
            NGINX
        );
        let records = parse_policy_output(&text).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["nginx", "zsh"]);
        assert_eq!(records[1].candidate, Some(v("5.8.1-1")));

        assert!(parse_policy_output("").unwrap().is_empty());
        assert!(parse_policy_output("N: Unable to locate package nope\n")
            .unwrap()
            .is_empty());
        assert!(parse_policy_output("garbage\n").is_err());
    }
}
