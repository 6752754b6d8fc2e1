use super::PkgVersion;
use crate::error::{Error, Result};

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, digit1},
    combinator::{all_consuming, opt},
    sequence::terminated,
    IResult,
};

fn is_version_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '+' || c == '-' || c == '~'
}

fn epoch(i: &str) -> IResult<&str, Option<&str>> {
    opt(terminated(digit1, char(':')))(i)
}

fn version_body(i: &str) -> IResult<&str, &str> {
    all_consuming(take_while1(is_version_char))(i)
}

fn malformed(input: &str, reason: &str) -> Error {
    Error::MalformedVersion {
        input: input.to_owned(),
        reason: reason.to_owned(),
    }
}

/// Parse a version string as printed by dpkg and apt.
pub fn parse_version(i: &str) -> Result<PkgVersion> {
    if i.is_empty() {
        return Err(malformed(i, "empty version"));
    }
    if let Some(c) = i.chars().find(|c| !is_version_char(*c) && *c != ':') {
        return Err(malformed(i, &format!("illegal character {:?}", c)));
    }

    let (rest, epoch) = epoch(i).map_err(|_| malformed(i, "cannot read epoch"))?;
    if rest.contains(':') {
        return Err(match epoch {
            Some(_) => malformed(i, "colon is only allowed after the epoch"),
            None => malformed(i, "epoch must be numeric"),
        });
    }
    let epoch = match epoch {
        Some(e) => e
            .parse::<u32>()
            .map_err(|_| malformed(i, "epoch is out of range"))?,
        None => 0,
    };

    let (_, body) = version_body(rest).map_err(|_| malformed(i, "missing upstream version"))?;
    // The revision starts after the last hyphen
    let (upstream, revision) = match body.rfind('-') {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };
    if upstream.is_empty() {
        return Err(malformed(i, "missing upstream version"));
    }
    if revision == Some("") {
        return Err(malformed(i, "empty debian revision"));
    }

    Ok(PkgVersion {
        epoch,
        upstream: upstream.to_owned(),
        revision: revision.map(str::to_owned),
    })
}
