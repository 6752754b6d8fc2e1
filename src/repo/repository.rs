use super::{deb822, oneline};
use crate::error::{Error, Result};

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    /// `deb`
    Binary,
    /// `deb-src`
    Source,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Binary => "deb",
            SourceKind::Source => "deb-src",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deb" => Ok(SourceKind::Binary),
            "deb-src" => Ok(SourceKind::Source),
            other => Err(Error::malformed_repo(
                s,
                format!("unknown source type {:?}, expected deb or deb-src", other),
            )),
        }
    }
}

/// How a repository names the key its metadata is signed with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SigningKey {
    /// Hex key id or fingerprint, looked up in the trusted key store
    KeyId(String),
    /// Armored key material embedded in the definition
    Material(String),
    /// A keyring file on disk
    Keyring(PathBuf),
}

impl SigningKey {
    /// Read a single-line `signed-by` value.
    pub(crate) fn from_reference(value: &str) -> Self {
        if value.starts_with('/') {
            SigningKey::Keyring(PathBuf::from(value))
        } else {
            SigningKey::KeyId(value.to_owned())
        }
    }

    /// How the key is written in a definition, `None` for inline material.
    pub fn reference(&self) -> Option<String> {
        match self {
            SigningKey::KeyId(id) => Some(id.clone()),
            SigningKey::Keyring(path) => Some(path.display().to_string()),
            SigningKey::Material(_) => None,
        }
    }
}

impl fmt::Display for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SigningKey::KeyId(id) => write!(f, "key {}", id),
            SigningKey::Material(_) => f.write_str("inline key material"),
            SigningKey::Keyring(path) => write!(f, "keyring {}", path.display()),
        }
    }
}

/// The syntax a definition is read from and written back in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceSyntax {
    /// `deb [opts] uri suite components...` in `.list` files
    OneLine,
    /// Key/value stanzas in `.sources` files
    Deb822,
}

impl SourceSyntax {
    /// Detect the syntax of a definition.
    pub fn detect(text: &str) -> Self {
        let first = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'));
        match first.and_then(|l| l.split_once(':')) {
            Some((field, _)) if deb822::is_field_name(field) => SourceSyntax::Deb822,
            _ => SourceSyntax::OneLine,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SourceSyntax::OneLine => "list",
            SourceSyntax::Deb822 => "sources",
        }
    }
}

/// `(kind, uri, suite)`. Two entries with the same identity are duplicates.
pub type Identity = (SourceKind, String, String);

/// One APT source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repository {
    pub kind: SourceKind,
    pub uri: String,
    pub suite: String,
    pub components: Vec<String>,
    /// Options other than the signing key, keyed the way one-line
    /// definitions spell them (`arch`, `lang`, ...)
    pub options: BTreeMap<String, String>,
    pub signing_key: Option<SigningKey>,
    pub enabled: bool,
    pub syntax: SourceSyntax,
}

impl Repository {
    pub fn new<S: Into<String>>(kind: SourceKind, uri: &str, suite: &str, components: Vec<S>) -> Self {
        Repository {
            kind,
            uri: uri.to_owned(),
            suite: suite.to_owned(),
            components: components.into_iter().map(Into::into).collect(),
            options: BTreeMap::new(),
            signing_key: None,
            enabled: true,
            syntax: SourceSyntax::OneLine,
        }
    }

    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_syntax(mut self, syntax: SourceSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Parse one definition in either syntax.
    ///
    /// A deb822 stanza expanding to more than one repository is rejected,
    /// use [`parse_stanza`](Self::parse_stanza) for those.
    pub fn from_line(text: &str) -> Result<Self> {
        match SourceSyntax::detect(text) {
            SourceSyntax::OneLine => {
                let mut lines = text.lines().filter(|l| !l.trim().is_empty());
                let line = lines
                    .next()
                    .ok_or_else(|| Error::malformed_repo(text, "empty definition"))?;
                if lines.next().is_some() {
                    return Err(Error::malformed_repo(
                        text,
                        "one-line definitions must be a single line",
                    ));
                }
                oneline::parse(line)
            }
            SourceSyntax::Deb822 => {
                let mut repos = Self::parse_stanza(text)?;
                if repos.len() != 1 {
                    return Err(Error::malformed_repo(
                        text,
                        format!("stanza defines {} repositories, expected one", repos.len()),
                    ));
                }
                Ok(repos.remove(0))
            }
        }
    }

    /// Expand a deb822 stanza into one repository per type, URI and suite.
    pub fn parse_stanza(text: &str) -> Result<Vec<Self>> {
        let lines: Vec<(usize, &str)> = text.lines().enumerate().map(|(n, l)| (n + 1, l)).collect();
        let mut stanzas: Vec<_> = deb822::split_stanzas(&lines)
            .into_iter()
            .filter(|s| deb822::has_fields(s))
            .collect();
        if stanzas.len() != 1 {
            return Err(Error::malformed_repo(
                text,
                format!("expected one stanza, found {}", stanzas.len()),
            ));
        }
        deb822::parse(&stanzas.remove(0))
    }

    /// Render the definition in its own syntax.
    pub fn to_line(&self) -> String {
        match self.syntax {
            SourceSyntax::OneLine => oneline::render(self),
            SourceSyntax::Deb822 => deb822::render(std::slice::from_ref(self)),
        }
    }

    pub fn identity(&self) -> Identity {
        (self.kind, self.uri.clone(), self.suite.clone())
    }

    /// File a new definition is written to when no file is named:
    /// `sources.list.d/<uri path or host>-<suite>.list` (`.sources` for deb822).
    pub fn default_filename(&self, apt_dir: &Path) -> PathBuf {
        let prefix = match url::Url::parse(&self.uri) {
            Ok(url) => {
                let path = url.path().trim_matches('/').replace('/', "-");
                if path.is_empty() {
                    url.host_str().unwrap_or_default().to_owned()
                } else {
                    path
                }
            }
            Err(_) => self.uri.trim_matches('/').replace('/', "-"),
        };
        apt_dir.join("sources.list.d").join(format!(
            "{}-{}.{}",
            prefix,
            self.suite.trim_matches('/').replace('/', "-"),
            self.syntax.extension()
        ))
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.kind, self.uri, self.suite)
    }
}

impl FromStr for Repository {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::from_line(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn syntax_detection() {
        let source = vec![
            ("deb http://archive.ubuntu.com/ubuntu jammy main", SourceSyntax::OneLine),
            ("# deb http://archive.ubuntu.com/ubuntu jammy main", SourceSyntax::OneLine),
            ("deb [arch=amd64] http://example.com stable main", SourceSyntax::OneLine),
            ("Types: deb\nURIs: http://example.com\n", SourceSyntax::Deb822),
            ("# comment\nEnabled: no\nTypes: deb\n", SourceSyntax::Deb822),
            ("", SourceSyntax::OneLine),
        ];
        for (text, expected) in source {
            assert_eq!(SourceSyntax::detect(text), expected, "{}", text);
        }
    }

    #[test]
    fn from_line_dispatch() {
        let repo = Repository::from_line("deb http://archive.ubuntu.com/ubuntu jammy main").unwrap();
        assert_eq!(repo.syntax, SourceSyntax::OneLine);

        let repo = Repository::from_line(
            "Types: deb\nURIs: http://archive.ubuntu.com/ubuntu\nSuites: jammy\nComponents: main\n",
        )
        .unwrap();
        assert_eq!(repo.syntax, SourceSyntax::Deb822);
        assert_eq!(
            repo.identity(),
            (
                SourceKind::Binary,
                "http://archive.ubuntu.com/ubuntu".to_owned(),
                "jammy".to_owned()
            )
        );

        let multi = "Types: deb deb-src\nURIs: http://archive.ubuntu.com/ubuntu\nSuites: jammy jammy-updates\nComponents: main\n";
        assert!(matches!(
            Repository::from_line(multi),
            Err(Error::MalformedRepository { .. })
        ));
        assert_eq!(Repository::parse_stanza(multi).unwrap().len(), 4);

        assert!(Repository::from_line("deb http://a.com x main\ndeb http://b.com y main").is_err());
        assert!(Repository::from_line("   ").is_err());
    }

    #[test]
    fn default_filenames() {
        let apt = Path::new("/etc/apt");
        let source = vec![
            (
                Repository::new(SourceKind::Binary, "https://ppa.launchpadcontent.net/deadsnakes/ppa/ubuntu", "jammy", vec!["main"]),
                "/etc/apt/sources.list.d/deadsnakes-ppa-ubuntu-jammy.list",
            ),
            (
                Repository::new(SourceKind::Binary, "http://repo.example.com", "stable", vec!["main"]),
                "/etc/apt/sources.list.d/repo.example.com-stable.list",
            ),
            (
                Repository::new(SourceKind::Binary, "http://archive.ubuntu.com/ubuntu/", "jammy/updates", vec!["main"])
                    .with_syntax(SourceSyntax::Deb822),
                "/etc/apt/sources.list.d/ubuntu-jammy-updates.sources",
            ),
        ];
        for (repo, expected) in source {
            assert_eq!(repo.default_filename(apt), PathBuf::from(expected));
        }
    }
}
