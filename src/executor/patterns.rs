//! Failure messages of the package tools that carry a known meaning.
//!
//! Only the conditions listed here are ever translated into something other
//! than [`Error::NonZeroExit`]. Anything unmatched propagates untouched.
use crate::error::Error;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LOCK_HELD: Regex = Regex::new(
        r"(?m)(Could not get lock|Unable to acquire the dpkg frontend lock|Unable to lock the administration directory|dpkg status database is locked by another process)"
    )
    .unwrap();
    static ref UNABLE_TO_LOCATE: Regex =
        Regex::new(r"(?m)^E: Unable to locate package (\S+)").unwrap();
    static ref NO_CANDIDATE: Regex =
        Regex::new(r"(?m)^E: Package '([^']+)' has no installation candidate").unwrap();
    static ref VERSION_NOT_FOUND: Regex =
        Regex::new(r"(?m)^E: Version '([^']+)' for '([^']+)' was not found").unwrap();
}

/// Another process holds the dpkg or apt lock.
pub fn lock_held(stderr: &str) -> bool {
    LOCK_HELD.is_match(stderr)
}

/// Names apt-get could not find in any package index.
pub fn unknown_packages(stderr: &str) -> Vec<String> {
    UNABLE_TO_LOCATE
        .captures_iter(stderr)
        .chain(NO_CANDIDATE.captures_iter(stderr))
        .map(|c| c[1].to_owned())
        .collect()
}

/// `(name, version)` pairs apt-get was asked for but no repository offers.
pub fn missing_versions(stderr: &str) -> Vec<(String, String)> {
    VERSION_NOT_FOUND
        .captures_iter(stderr)
        .map(|c| (c[2].to_owned(), c[1].to_owned()))
        .collect()
}

/// Translate a failed apt-get run into a named error when the cause is known.
pub fn classify(err: Error) -> Error {
    let stderr = match &err {
        Error::NonZeroExit { stderr, .. } => stderr,
        _ => return err,
    };
    if let Some((name, version)) = missing_versions(stderr).into_iter().next() {
        return Error::VersionNotFound { name, version };
    }
    if let Some(name) = unknown_packages(stderr).into_iter().next() {
        return Error::PackageNotFound { name };
    }
    err
}
