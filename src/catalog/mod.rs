//! Parsers turning package tool output into structured records.
//!
//! Nothing here runs a process, every function works on captured text.
mod listing;
mod policy;
mod show;

pub use listing::{parse_installed_listing, Listing, PackageRecord, Selection};
pub use policy::{parse_policy_block, parse_policy_output, Origin, PolicyRecord, VersionEntry};
pub use show::{parse_show_output, AvailableVersion};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PKG_NAME: Regex = Regex::new(r"^[a-z0-9][a-z0-9+.\-]*$").unwrap();
    static ref ARCH_NAME: Regex = Regex::new(r"^[a-z0-9][a-z0-9\-]*$").unwrap();
}

/// Whether `name` is a syntactically valid Debian package name.
pub fn is_package_name(name: &str) -> bool {
    PKG_NAME.is_match(name)
}

pub fn is_arch_name(arch: &str) -> bool {
    ARCH_NAME.is_match(arch)
}

/// Split `name:arch` into its parts.
pub fn split_arch(qualified: &str) -> (&str, Option<&str>) {
    match qualified.split_once(':') {
        Some((name, arch)) => (name, Some(arch)),
        None => (qualified, None),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names() {
        let source = vec![
            ("nginx", true),
            ("libc6", true),
            ("g++", true),
            ("python3.10-minimal", true),
            ("Nginx", false),
            ("-nginx", false),
            ("nginx:amd64", false),
            ("", false),
        ];
        for (name, expected) in source {
            assert_eq!(is_package_name(name), expected, "{}", name);
        }
        assert_eq!(split_arch("libc6:i386"), ("libc6", Some("i386")));
        assert_eq!(split_arch("zsh"), ("zsh", None));
    }
}
