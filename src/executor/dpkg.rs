//! Invocations of dpkg and dpkg-query.
use super::Invocation;

/// One tab separated record per package: name, architecture, version and
/// the abbreviated selection/status flags.
pub const LISTING_FORMAT: &str = "${Package}\t${Architecture}\t${Version}\t${db:Status-Abbrev}\n";

pub fn listing() -> Invocation {
    Invocation::new("dpkg-query")
        .arg("--show")
        .arg(format!("--showformat={}", LISTING_FORMAT))
}

pub fn print_architecture() -> Invocation {
    Invocation::new("dpkg").arg("--print-architecture")
}
