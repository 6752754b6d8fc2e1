use std::fmt;

/// Where a package stands relative to what the repositories offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PackageState {
    /// Installed at some version
    Present,
    /// Neither installed nor installable
    Absent,
    /// Installed at the candidate version
    Latest,
    /// Not installed, but a candidate exists
    Available,
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            PackageState::Present => "present",
            PackageState::Absent => "absent",
            PackageState::Latest => "latest",
            PackageState::Available => "available",
        })
    }
}
