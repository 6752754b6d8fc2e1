mod version;

pub use version::{compare_fragment, parse_version, PkgVersion};
