//! deb822 stanzas of `.sources` files.
//!
//! ```text
//! Types: deb deb-src
//! URIs: http://archive.ubuntu.com/ubuntu
//! Suites: jammy jammy-updates
//! Components: main universe
//! Signed-By: /usr/share/keyrings/ubuntu-archive-keyring.gpg
//! ```
use super::repository::{Repository, SigningKey, SourceKind, SourceSyntax};
use crate::error::{Error, Result};

use std::{collections::BTreeMap, str::FromStr};

/// One-line option names and their deb822 field names.
const OPTION_FIELDS: &[(&str, &str)] = &[
    ("arch", "Architectures"),
    ("lang", "Languages"),
    ("target", "Targets"),
    ("pdiffs", "PDiffs"),
    ("by-hash", "By-Hash"),
    ("allow-insecure", "Allow-Insecure"),
    ("allow-weak", "Allow-Weak"),
    ("allow-downgrade-to-insecure", "Allow-Downgrade-To-Insecure"),
    ("trusted", "Trusted"),
    ("check-valid-until", "Check-Valid-Until"),
    ("valid-until-min", "Valid-Until-Min"),
    ("valid-until-max", "Valid-Until-Max"),
    ("check-date", "Check-Date"),
    ("date-max-future", "Date-Max-Future"),
    ("inrelease-path", "InRelease-Path"),
    ("snapshot", "Snapshot"),
];
/// Options holding lists: comma separated on one line, space separated here
const LIST_OPTIONS: &[&str] = &["arch", "lang", "target"];

type Numbered<'a> = (usize, &'a str);

struct Field {
    name: String,
    lines: Vec<String>,
    line_no: usize,
}

pub fn is_field_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn content(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Group numbered lines into runs of non-blank lines.
pub fn split_stanzas<'a>(lines: &[Numbered<'a>]) -> Vec<Vec<Numbered<'a>>> {
    let mut res = Vec::new();
    let mut current = Vec::new();
    for &(n, line) in lines {
        if line.trim().is_empty() {
            if !current.is_empty() {
                res.push(std::mem::take(&mut current));
            }
        } else {
            current.push((n, line));
        }
    }
    if !current.is_empty() {
        res.push(current);
    }
    res
}

/// Whether a run of lines holds anything besides comments.
pub fn has_fields(stanza: &[Numbered]) -> bool {
    stanza.iter().any(|(_, l)| !content(l).trim().is_empty())
}

fn read_fields(stanza: &[Numbered]) -> Result<Vec<Field>> {
    let mut fields: Vec<Field> = Vec::new();
    for &(n, line) in stanza {
        let body = content(line).trim_end();
        if body.trim().is_empty() {
            continue;
        }
        if body.starts_with(' ') || body.starts_with('\t') {
            match fields.last_mut() {
                Some(field) => field.lines.push(body.trim().to_owned()),
                None => {
                    return Err(Error::malformed_repo(line, "continuation line without a field")
                        .at_line(n))
                }
            }
            continue;
        }
        let (name, value) = body
            .split_once(':')
            .ok_or_else(|| Error::malformed_repo(line, "expected `Field: value`").at_line(n))?;
        let name = name.trim();
        if !is_field_name(name) {
            return Err(Error::malformed_repo(line, format!("invalid field name {:?}", name)).at_line(n));
        }
        if fields.iter().any(|f| f.name.eq_ignore_ascii_case(name)) {
            return Err(Error::malformed_repo(line, format!("duplicate field {}", name)).at_line(n));
        }
        fields.push(Field {
            name: name.to_owned(),
            lines: vec![value.trim().to_owned()],
            line_no: n,
        });
    }
    Ok(fields)
}

fn take(fields: &mut Vec<Field>, name: &str) -> Option<Field> {
    let pos = fields.iter().position(|f| f.name.eq_ignore_ascii_case(name))?;
    Some(fields.remove(pos))
}

fn words(field: &Field) -> Vec<String> {
    field
        .lines
        .iter()
        .flat_map(|l| l.split_whitespace())
        .map(str::to_owned)
        .collect()
}

fn signing_key(field: &Field) -> Option<SigningKey> {
    if field.lines.len() == 1 {
        let value = &field.lines[0];
        return if value.is_empty() {
            None
        } else {
            Some(SigningKey::from_reference(value))
        };
    }
    // Inline key, `.` stands for an empty line
    let mut lines = field.lines.iter();
    let mut material = Vec::new();
    if let Some(first) = lines.next() {
        if !first.is_empty() {
            material.push(first.as_str());
        }
    }
    material.extend(lines.map(|l| if l == "." { "" } else { l.as_str() }));
    Some(SigningKey::Material(material.join("\n")))
}

fn option_name(field: &str) -> String {
    OPTION_FIELDS
        .iter()
        .find(|(_, f)| f.eq_ignore_ascii_case(field))
        .map(|(o, _)| (*o).to_owned())
        .unwrap_or_else(|| field.to_ascii_lowercase())
}

fn field_name(option: &str) -> String {
    match OPTION_FIELDS.iter().find(|(o, _)| *o == option) {
        Some((_, f)) => (*f).to_owned(),
        None => option
            .split('-')
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(c) => c.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join("-"),
    }
}

/// Expand a stanza into every type × URI × suite combination.
///
/// Errors carry the line number inside the stanza's file.
pub fn parse(stanza: &[Numbered]) -> Result<Vec<Repository>> {
    let first_line = stanza.first().map(|(n, _)| *n).unwrap_or(1);
    let text = stanza
        .iter()
        .map(|(_, l)| *l)
        .collect::<Vec<_>>()
        .join("\n");
    let mut fields = read_fields(stanza)?;
    let bad = |field: &Field, reason: String| {
        Error::malformed_repo(&format!("{}: {}", field.name, field.lines.join(" ")), reason)
            .at_line(field.line_no)
    };

    let enabled = match take(&mut fields, "Enabled") {
        None => true,
        Some(f) => match f.lines[0].as_str() {
            "yes" => true,
            "no" => false,
            other => {
                return Err(bad(&f, format!("Enabled must be yes or no, not {:?}", other)))
            }
        },
    };
    let signing_key = take(&mut fields, "Signed-By").and_then(|f| signing_key(&f));

    let mut required = |name: &str| {
        take(&mut fields, name).ok_or_else(|| {
            Error::malformed_repo(&text, format!("missing required field {}", name))
                .at_line(first_line)
        })
    };
    let types = required("Types")?;
    let uris = required("URIs")?;
    let suites = required("Suites")?;

    let mut kinds = Vec::new();
    for t in words(&types) {
        kinds.push(SourceKind::from_str(&t).map_err(|_| bad(&types, format!("unknown type {:?}", t)))?);
    }
    let uri_list = words(&uris);
    for uri in &uri_list {
        if url::Url::parse(uri).is_err() {
            return Err(bad(&uris, format!("invalid URI {:?}", uri)));
        }
    }
    let suite_list = words(&suites);
    if kinds.is_empty() || uri_list.is_empty() || suite_list.is_empty() {
        return Err(Error::malformed_repo(&text, "Types, URIs and Suites must not be empty")
            .at_line(first_line));
    }

    let exact_path = suite_list.len() == 1 && suite_list[0].ends_with('/');
    let components = match (take(&mut fields, "Components"), exact_path) {
        (Some(f), true) => {
            return Err(bad(
                &f,
                "Components must be omitted when Suites is an exact path".to_owned(),
            ))
        }
        (None, true) => Vec::new(),
        (Some(f), false) => words(&f),
        (None, false) => {
            return Err(Error::malformed_repo(
                &text,
                "missing required field Components, Suites is not an exact path",
            )
            .at_line(first_line))
        }
    };

    let mut options = BTreeMap::new();
    for f in fields {
        let name = option_name(&f.name);
        let value = if LIST_OPTIONS.contains(&name.as_str()) {
            words(&f).join(",")
        } else {
            words(&f).join(" ")
        };
        options.insert(name, value);
    }

    let mut res = Vec::new();
    for kind in &kinds {
        for uri in &uri_list {
            for suite in &suite_list {
                res.push(Repository {
                    kind: *kind,
                    uri: uri.clone(),
                    suite: suite.clone(),
                    components: components.clone(),
                    options: options.clone(),
                    signing_key: signing_key.clone(),
                    enabled,
                    syntax: SourceSyntax::Deb822,
                });
            }
        }
    }
    Ok(res)
}

fn render_one(repo: &Repository) -> String {
    let mut lines = vec![
        format!("Types: {}", repo.kind),
        format!("URIs: {}", repo.uri),
        format!("Suites: {}", repo.suite),
    ];
    if !repo.components.is_empty() {
        lines.push(format!("Components: {}", repo.components.join(" ")));
    }
    for (option, value) in &repo.options {
        let value = if LIST_OPTIONS.contains(&option.as_str()) {
            value.split(',').collect::<Vec<_>>().join(" ")
        } else {
            value.clone()
        };
        lines.push(format!("{}: {}", field_name(option), value));
    }
    match &repo.signing_key {
        Some(SigningKey::Material(material)) => {
            lines.push("Signed-By:".to_owned());
            for l in material.lines() {
                lines.push(if l.trim().is_empty() {
                    " .".to_owned()
                } else {
                    format!(" {}", l.trim())
                });
            }
        }
        Some(key) => {
            if let Some(reference) = key.reference() {
                lines.push(format!("Signed-By: {}", reference));
            }
        }
        None => (),
    }
    if !repo.enabled {
        lines.push("Enabled: no".to_owned());
    }
    lines.join("\n")
}

/// One stanza per repository, separated by blank lines.
pub fn render(repos: &[Repository]) -> String {
    repos
        .iter()
        .map(render_one)
        .collect::<Vec<_>>()
        .join("\n\n")
}
