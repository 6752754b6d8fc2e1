use crate::{
    error::{Error, Result},
    types::PkgVersion,
};

use std::{collections::HashMap, convert::TryFrom};

const TOOL: &str = "apt-cache show";

/// One stanza of `apt-cache show`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvailableVersion {
    pub name: String,
    pub arch: String,
    pub version: PkgVersion,
    pub section: Option<String>,
    pub installed_size: Option<u64>,
    /// First line of the description
    pub summary: Option<String>,
}

fn fields_to_version(mut f: HashMap<&str, String>, text: &str) -> Result<AvailableVersion> {
    let mut take = |field: &str| {
        f.remove(field)
            .ok_or_else(|| Error::malformed_output(TOOL, format!("stanza without {}", field), text))
    };
    let name = take("Package")?;
    let arch = take("Architecture")?;
    let version = PkgVersion::try_from(take("Version")?.as_str())
        .map_err(|e| Error::malformed_output(TOOL, e, text))?;

    let summary = f
        .remove("Description")
        .or_else(|| f.remove("Description-en"))
        .and_then(|d| d.lines().next().map(|l| l.trim().to_owned()));
    Ok(AvailableVersion {
        name,
        arch,
        version,
        section: f.remove("Section"),
        installed_size: f.get("Installed-Size").and_then(|s| s.parse().ok()),
        summary,
    })
}

/// Parse every stanza printed by `apt-cache show`.
pub fn parse_show_output(text: &str) -> Result<Vec<AvailableVersion>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let input = format!("{}\n", trimmed);
    let paragraphs = debcontrol::parse_str(&input)
        .map_err(|e| Error::malformed_output(TOOL, format!("invalid control data: {}", e), text))?;

    let mut res = Vec::new();
    for p in paragraphs {
        let mut fields = HashMap::new();
        for field in p.fields {
            fields.insert(field.name, field.value);
        }
        res.push(fields_to_version(fields, text)?);
    }
    Ok(res)
}
