//! `deb [option=value ...] uri suite [component ...]`
use super::repository::{Repository, SigningKey, SourceKind, SourceSyntax};
use crate::error::{Error, Result};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till},
    character::complete::{char, space0, space1},
    combinator::opt,
    sequence::{delimited, terminated},
    IResult,
};
use std::{collections::BTreeMap, str::FromStr};

const SIGNED_BY: &str = "signed-by";

fn kind(i: &str) -> IResult<&str, &str> {
    terminated(alt((tag("deb-src"), tag("deb"))), space1)(i)
}

fn options(i: &str) -> IResult<&str, Option<&str>> {
    opt(terminated(
        delimited(char('['), take_till(|c| c == ']'), char(']')),
        space0,
    ))(i)
}

fn parse_options(line: &str, raw: &str) -> Result<BTreeMap<String, String>> {
    let mut res = BTreeMap::new();
    for pair in raw.split_whitespace() {
        match pair.split_once('=') {
            Some((k, v)) if !k.is_empty() && !v.is_empty() => {
                res.insert(k.to_owned(), v.to_owned());
            }
            _ => return Err(Error::malformed_repo(line, format!("invalid option {:?}", pair))),
        }
    }
    Ok(res)
}

/// Parse one line of a `.list` file. A leading `#` marks a disabled entry.
pub fn parse(line: &str) -> Result<Repository> {
    let mut body = line.trim();
    let mut enabled = true;
    if let Some(rest) = body.strip_prefix('#') {
        enabled = false;
        body = rest.trim_start();
    }
    // Trailing comment
    if let Some(pos) = body.find('#') {
        body = body[..pos].trim_end();
    }

    let (rest, kind) = kind(body)
        .map_err(|_| Error::malformed_repo(line, "expected deb or deb-src followed by a URI"))?;
    let (rest, raw_options) =
        options(rest).map_err(|_| Error::malformed_repo(line, "unterminated option list"))?;

    let mut options = match raw_options {
        Some(raw) => parse_options(line, raw)?,
        None => BTreeMap::new(),
    };
    let signing_key = options
        .remove(SIGNED_BY)
        .map(|v| SigningKey::from_reference(&v));

    let mut tokens = rest.split_whitespace();
    let (uri, suite) = match (tokens.next(), tokens.next()) {
        (Some(uri), Some(suite)) => (uri, suite),
        _ => return Err(Error::malformed_repo(line, "missing URI or suite")),
    };
    if url::Url::parse(uri).is_err() {
        return Err(Error::malformed_repo(line, format!("invalid URI {:?}", uri)));
    }
    let components: Vec<String> = tokens.map(str::to_owned).collect();
    if components.is_empty() && !suite.ends_with('/') {
        return Err(Error::malformed_repo(
            line,
            "components are required unless the suite is an exact path",
        ));
    }

    Ok(Repository {
        kind: SourceKind::from_str(kind)?,
        uri: uri.to_owned(),
        suite: suite.to_owned(),
        components,
        options,
        signing_key,
        enabled,
        syntax: SourceSyntax::OneLine,
    })
}

/// Inline key material cannot be expressed here and is left out.
pub fn render(repo: &Repository) -> String {
    let mut res = String::new();
    if !repo.enabled {
        res.push_str("# ");
    }
    res.push_str(repo.kind.as_str());
    res.push(' ');

    let mut options: Vec<String> = repo
        .options
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    if let Some(reference) = repo.signing_key.as_ref().and_then(|k| k.reference()) {
        options.push(format!("{}={}", SIGNED_BY, reference));
        options.sort();
    }
    if !options.is_empty() {
        res.push_str(&format!("[{}] ", options.join(" ")));
    }

    res.push_str(&repo.uri);
    res.push(' ');
    res.push_str(&repo.suite);
    for component in &repo.components {
        res.push(' ');
        res.push_str(component);
    }
    res
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn one_line_entries() {
        let repo = parse("deb [arch=amd64 signed-by=/usr/share/keyrings/docker.gpg] https://download.docker.com/linux/ubuntu jammy stable # docker").unwrap();
        assert_eq!(repo.kind, SourceKind::Binary);
        assert_eq!(repo.uri, "https://download.docker.com/linux/ubuntu");
        assert_eq!(repo.suite, "jammy");
        assert_eq!(repo.components, vec!["stable"]);
        assert_eq!(repo.options.get("arch").map(String::as_str), Some("amd64"));
        assert_eq!(
            repo.signing_key,
            Some(SigningKey::Keyring(PathBuf::from("/usr/share/keyrings/docker.gpg")))
        );
        assert!(repo.enabled);

        let repo = parse("#deb-src http://archive.ubuntu.com/ubuntu jammy main restricted").unwrap();
        assert_eq!(repo.kind, SourceKind::Source);
        assert!(!repo.enabled);
        assert_eq!(repo.components, vec!["main", "restricted"]);

        let repo = parse("deb file:/srv/repo ./").unwrap();
        assert!(repo.components.is_empty());
    }

    #[test]
    fn malformed_lines() {
        let source = vec![
            "",
            "# See http://help.ubuntu.com/community/UpgradeNotes",
            "dontload http://archive.ubuntu.com/ubuntu jammy main",
            "debian http://archive.ubuntu.com/ubuntu jammy main",
            "deb http://archive.ubuntu.com/ubuntu",
            "deb http://archive.ubuntu.com/ubuntu jammy",
            "deb [arch=amd64 http://archive.ubuntu.com/ubuntu jammy main",
            "deb [arch] http://archive.ubuntu.com/ubuntu jammy main",
            "deb not-a-uri jammy main",
        ];
        for line in source {
            assert!(
                matches!(parse(line), Err(Error::MalformedRepository { .. })),
                "{:?}",
                line
            );
        }
    }

    #[test]
    fn render_round_trip() {
        let source = vec![
            "deb http://archive.ubuntu.com/ubuntu jammy main restricted",
            "# deb-src http://archive.ubuntu.com/ubuntu jammy main",
            "deb [arch=amd64,arm64 signed-by=/etc/apt/keyrings/x.gpg] https://example.com/apt stable main",
            "deb [signed-by=C0B21F32 trusted=yes] http://example.com/ stable/ ",
        ];
        for line in source {
            let repo = parse(line).unwrap();
            assert_eq!(render(&repo), line.trim_end());
            assert_eq!(parse(&render(&repo)).unwrap(), repo);
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let repo = parse("  deb   [ arch=amd64 ]  http://example.com   stable  main ").unwrap();
        assert_eq!(render(&repo), "deb [arch=amd64] http://example.com stable main");
    }
}
