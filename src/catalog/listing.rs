use super::{is_arch_name, is_package_name};
use crate::types::PkgVersion;

use std::str::FromStr;

/// What the administrator asked dpkg to do with a package, the first
/// letter of the dpkg status abbreviation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    Unknown,
    Install,
    Hold,
    Remove,
    Purge,
}

impl Selection {
    fn from_flag(c: char) -> Option<Self> {
        Some(match c {
            'u' => Selection::Unknown,
            'i' => Selection::Install,
            'h' => Selection::Hold,
            'r' => Selection::Remove,
            'p' => Selection::Purge,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub arch: String,
    /// `None` unless the package is installed
    pub version: Option<PkgVersion>,
    pub selection: Selection,
    pub installed: bool,
}

/// Result of parsing a full listing.
#[derive(Clone, Debug, Default)]
pub struct Listing {
    pub records: Vec<PackageRecord>,
    /// 1-based numbers of the lines that did not form a record
    pub skipped: Vec<usize>,
}

/// Read `(selection, installed)` out of `*` or an abbreviation like `ii `.
fn parse_status(status: &str) -> Option<(Selection, bool)> {
    if status == "*" {
        return Some((Selection::Install, true));
    }
    let mut flags = status.trim_end().chars();
    let selection = Selection::from_flag(flags.next()?)?;
    let installed = match flags.next()? {
        'i' => true,
        'n' | 'c' | 'H' | 'U' | 'F' | 'W' | 't' => false,
        _ => return None,
    };
    match flags.next() {
        None | Some('R') => Some((selection, installed)),
        _ => None,
    }
}

fn parse_line(line: &str) -> Option<PackageRecord> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 4 {
        return None;
    }
    let (name, arch, version, status) = (fields[0], fields[1], fields[2], fields[3]);
    if !is_package_name(name) || !is_arch_name(arch) {
        return None;
    }
    let (selection, installed) = parse_status(status)?;
    let version = if installed {
        Some(PkgVersion::from_str(version).ok()?)
    } else {
        None
    };

    Some(PackageRecord {
        name: name.to_owned(),
        arch: arch.to_owned(),
        version,
        selection,
        installed,
    })
}

/// Parse the output of `dpkg-query --show` in
/// [`LISTING_FORMAT`](crate::executor::dpkg::LISTING_FORMAT).
///
/// Lines that do not form a record are skipped and reported in
/// [`Listing::skipped`], never fatal.
pub fn parse_installed_listing(text: &str) -> Listing {
    let mut res = Listing::default();
    for (no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(record) => res.records.push(record),
            None => {
                debug!("Skipping unrecognized listing line {}: {:?}", no + 1, line);
                res.skipped.push(no + 1);
            }
        }
    }
    res
}
